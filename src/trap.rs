//! Decoded trap messages and their canonical single-line rendering, which
//! the file and exec sinks emit verbatim.
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

/// SNMP protocol versions a source or forwarding target may be configured
/// with. Only v1 and v2c messages are ever decoded from the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnmpVersion {
    V1,
    V2c,
    V3,
}

impl FromStr for SnmpVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" => Ok(SnmpVersion::V1),
            "2c" => Ok(SnmpVersion::V2c),
            "3" => Ok(SnmpVersion::V3),
            _ => Err(format!("Illegal Version, value `{}`", s)),
        }
    }
}

impl fmt::Display for SnmpVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            SnmpVersion::V1 => "1",
            SnmpVersion::V2c => "2c",
            SnmpVersion::V3 => "3",
        })
    }
}

/// An inbound trap, immutable once decoded. Shared read-only across every
/// sink queue that receives it.
#[derive(Debug, Clone)]
pub struct Trap {
    pub source: SocketAddr,
    pub version: SnmpVersion,
    pub pdu_type: PduType,
    pub request_id: i32,
    pub error_status: ErrorStatus,
    pub error_index: u32,
    pub varbinds: Vec<VarBind>,
    /// The original v1 trap envelope, present iff `version` is v1.
    pub v1: Option<V1Envelope>,
}

/// The SNMPv1 trap header fields, kept verbatim from the inbound packet so
/// the forward sink can resend them as-is.
#[derive(Debug, Clone, Default)]
pub struct V1Envelope {
    pub enterprise: String,
    pub agent_addr: String,
    pub generic_trap: i64,
    pub specific_trap: i64,
    pub timestamp: u32,
}

/// An (OID, type, value) triple carried inside a PDU. OIDs are dotted
/// numeric strings with a leading `.`.
#[derive(Debug, Clone)]
pub struct VarBind {
    pub oid: String,
    pub value: Value,
}

/// The closed enumeration of ASN.1/BER SNMP value types. Several tags never
/// come out of the BER decoder but complete the enumeration.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    EndOfContents,
    Boolean(bool),
    Integer(i64),
    BitString(Vec<u8>),
    OctetString(Vec<u8>),
    Null,
    ObjectIdentifier(String),
    ObjectDescription(String),
    IpAddress(String),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u64),
    Opaque(Vec<u8>),
    NsapAddress(Vec<u8>),
    Counter64(u64),
    Uinteger32(u32),
    OpaqueFloat(f32),
    OpaqueDouble(f64),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::EndOfContents => "EndOfContents/UnknownType",
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::BitString(_) => "BitString",
            Value::OctetString(_) => "OctetString",
            Value::Null => "Null",
            Value::ObjectIdentifier(_) => "ObjectIdentifier",
            Value::ObjectDescription(_) => "ObjectDescription",
            Value::IpAddress(_) => "IPAddress",
            Value::Counter32(_) => "Counter32",
            Value::Gauge32(_) => "Gauge32",
            Value::TimeTicks(_) => "TimeTicks",
            Value::Opaque(_) => "Opaque",
            Value::NsapAddress(_) => "NsapAddress",
            Value::Counter64(_) => "Counter64",
            Value::Uinteger32(_) => "Uinteger32",
            Value::OpaqueFloat(_) => "OpaqueFloat",
            Value::OpaqueDouble(_) => "OpaqueDouble",
            Value::NoSuchObject => "NoSuchObject",
            Value::NoSuchInstance => "NoSuchInstance",
            Value::EndOfMibView => "EndOfMibView",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            // Octet strings render as their raw bytes, unescaped.
            Value::OctetString(bytes) => write!(f, "{}", String::from_utf8_lossy(bytes)),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::ObjectIdentifier(oid) => write!(f, "{}", oid),
            Value::ObjectDescription(desc) => write!(f, "{}", desc),
            Value::IpAddress(addr) => write!(f, "{}", addr),
            Value::Counter32(n) | Value::Gauge32(n) | Value::Uinteger32(n) => write!(f, "{}", n),
            Value::TimeTicks(n) => write!(f, "{}", n),
            Value::Counter64(n) => write!(f, "{}", n),
            Value::OpaqueFloat(n) => write!(f, "{}", n),
            Value::OpaqueDouble(n) => write!(f, "{}", n),
            Value::BitString(bytes) | Value::Opaque(bytes) | Value::NsapAddress(bytes) => {
                write!(f, "{:?}", bytes)
            }
            Value::EndOfContents
            | Value::Null
            | Value::NoSuchObject
            | Value::NoSuchInstance
            | Value::EndOfMibView => Ok(()),
        }
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduType {
    Sequence,
    GetRequest,
    GetNextRequest,
    GetResponse,
    SetRequest,
    Trap,
    GetBulkRequest,
    InformRequest,
    SNMPv2Trap,
    Report,
}

impl PduType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PduType::Sequence => "Sequence",
            PduType::GetRequest => "GetRequest",
            PduType::GetNextRequest => "GetNextRequest",
            PduType::GetResponse => "GetResponse",
            PduType::SetRequest => "SetRequest",
            PduType::Trap => "Trap",
            PduType::GetBulkRequest => "GetBulkRequest",
            PduType::InformRequest => "InformRequest",
            PduType::SNMPv2Trap => "SNMPv2Trap",
            PduType::Report => "Report",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStatus {
    NoError,
    TooBig,
    NoSuchName,
    BadValue,
    ReadOnly,
    GenErr,
    NoAccess,
    WrongType,
    WrongLength,
    WrongEncoding,
    WrongValue,
    NoCreation,
    InconsistentValue,
    ResourceUnavailable,
    CommitFailed,
    UndoFailed,
    AuthorizationError,
    NotWritable,
    InconsistentName,
}

impl ErrorStatus {
    /// Statuses outside the enumeration collapse to `GenErr`.
    pub fn from_i64(status: i64) -> Self {
        match status {
            0 => ErrorStatus::NoError,
            1 => ErrorStatus::TooBig,
            2 => ErrorStatus::NoSuchName,
            3 => ErrorStatus::BadValue,
            4 => ErrorStatus::ReadOnly,
            5 => ErrorStatus::GenErr,
            6 => ErrorStatus::NoAccess,
            7 => ErrorStatus::WrongType,
            8 => ErrorStatus::WrongLength,
            9 => ErrorStatus::WrongEncoding,
            10 => ErrorStatus::WrongValue,
            11 => ErrorStatus::NoCreation,
            12 => ErrorStatus::InconsistentValue,
            13 => ErrorStatus::ResourceUnavailable,
            14 => ErrorStatus::CommitFailed,
            15 => ErrorStatus::UndoFailed,
            16 => ErrorStatus::AuthorizationError,
            17 => ErrorStatus::NotWritable,
            18 => ErrorStatus::InconsistentName,
            _ => ErrorStatus::GenErr,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStatus::NoError => "NoError",
            ErrorStatus::TooBig => "TooBig",
            ErrorStatus::NoSuchName => "NoSuchName",
            ErrorStatus::BadValue => "BadValue",
            ErrorStatus::ReadOnly => "ReadOnly",
            ErrorStatus::GenErr => "GenErr",
            ErrorStatus::NoAccess => "NoAccess",
            ErrorStatus::WrongType => "WrongType",
            ErrorStatus::WrongLength => "WrongLength",
            ErrorStatus::WrongEncoding => "WrongEncoding",
            ErrorStatus::WrongValue => "WrongValue",
            ErrorStatus::NoCreation => "NoCreation",
            ErrorStatus::InconsistentValue => "InconsistentValue",
            ErrorStatus::ResourceUnavailable => "ResourceUnavailable",
            ErrorStatus::CommitFailed => "CommitFailed",
            ErrorStatus::UndoFailed => "UndoFailed",
            ErrorStatus::AuthorizationError => "AuthorizationError",
            ErrorStatus::NotWritable => "NotWritable",
            ErrorStatus::InconsistentName => "InconsistentName",
        }
    }
}

impl fmt::Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            r#"{{"Source": "{}", "Type": "{}", "RequestId": "{}", "Error": "{}", "ErrorIndex": "{}", "VarBinds": ["#,
            self.source,
            self.pdu_type.as_str(),
            self.request_id,
            self.error_status.as_str(),
            self.error_index,
        )?;
        for (i, vb) in self.varbinds.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(
                f,
                r#"{{"Oid": "{}", "Type": "{}", "Value": "{}"}}"#,
                vb.oid,
                vb.value.type_name(),
                vb.value
            )?;
        }
        f.write_str("]}")
    }
}
