//! BER codec seam between the wire and the dispatch pipeline. Inbound
//! datagrams decode into [`Trap`]s; the forward sink encodes SNMPv1 trap
//! messages through [`encode_v1_trap`].
use std::net::{Ipv4Addr, SocketAddr};

use rasn::types::{FixedOctetString, Integer, ObjectIdentifier};
use rasn_smi::v1 as smi_v1;
use rasn_smi::v2 as smi_v2;
use rasn_snmp::{v1, v2, v2c};
use thiserror::Error;

use crate::trap::{ErrorStatus, PduType, SnmpVersion, Trap, V1Envelope, Value, VarBind};

/// Placeholder for absent or unparseable OIDs: an OID needs at least two
/// arcs to be BER-encodable, and `.0.0` is the conventional null value.
fn zero_dot_zero() -> ObjectIdentifier {
    ObjectIdentifier::new_unchecked(vec![0, 0].into())
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to decode SNMP message: unsupported format or corrupt data")]
    Malformed,
    #[error("Decoded SNMP message carries no trap PDU")]
    NotATrap,
    #[error("Failed to encode SNMPv1 trap: {0}")]
    Encode(String),
}

/// A decoded message plus the community string it arrived under, which the
/// source gate checks before the trap enters the pipeline.
pub struct Inbound {
    pub trap: Trap,
    pub community: String,
}

/// Decode one datagram. v1 is tried first; the two versions cannot be
/// confused since their trap PDUs carry distinct context tags.
pub fn decode(data: &[u8], source: SocketAddr) -> Result<Inbound, CodecError> {
    if let Ok(msg) = rasn::ber::decode::<v1::Message<v1::Pdus>>(data) {
        return inbound_from_v1(msg, source);
    }

    if let Ok(msg) = rasn::ber::decode::<v2c::Message<v2::Pdus>>(data) {
        return inbound_from_v2c(msg, source);
    }

    Err(CodecError::Malformed)
}

fn inbound_from_v1(msg: v1::Message<v1::Pdus>, source: SocketAddr) -> Result<Inbound, CodecError> {
    let community = String::from_utf8_lossy(&msg.community).to_string();

    match msg.data {
        v1::Pdus::Trap(trap) => Ok(Inbound {
            community,
            trap: Trap {
                source,
                version: SnmpVersion::V1,
                pdu_type: PduType::Trap,
                request_id: 0,
                error_status: ErrorStatus::NoError,
                error_index: 0,
                varbinds: varbinds_from_v1(&trap.variable_bindings),
                v1: Some(V1Envelope {
                    enterprise: oid_to_string(&trap.enterprise),
                    agent_addr: network_addr_to_string(&trap.agent_addr),
                    generic_trap: integer_to_i64(&trap.generic_trap),
                    specific_trap: integer_to_i64(&trap.specific_trap),
                    timestamp: trap.time_stamp.0,
                }),
            },
        }),
        _ => Err(CodecError::NotATrap),
    }
}

fn inbound_from_v2c(
    msg: v2c::Message<v2::Pdus>,
    source: SocketAddr,
) -> Result<Inbound, CodecError> {
    let community = String::from_utf8_lossy(&msg.community).to_string();

    let (pdu_type, pdu) = match msg.data {
        v2::Pdus::Trap(trap) => (PduType::SNMPv2Trap, trap.0),
        v2::Pdus::InformRequest(inform) => (PduType::InformRequest, inform.0),
        _ => return Err(CodecError::NotATrap),
    };

    Ok(Inbound {
        community,
        trap: Trap {
            source,
            version: SnmpVersion::V2c,
            pdu_type,
            request_id: pdu.request_id as i32,
            error_status: ErrorStatus::from_i64(pdu.error_status as i64),
            error_index: pdu.error_index as u32,
            varbinds: varbinds_from_v2(&pdu.variable_bindings),
            v1: None,
        },
    })
}

fn varbinds_from_v1(varbinds: &v1::VarBindList) -> Vec<VarBind> {
    varbinds
        .iter()
        .map(|vb| VarBind {
            oid: oid_to_string(&vb.name),
            value: value_from_v1_syntax(&vb.value),
        })
        .collect()
}

fn varbinds_from_v2(varbinds: &v2::VarBindList) -> Vec<VarBind> {
    varbinds
        .iter()
        .map(|vb| VarBind {
            oid: oid_to_string(&vb.name),
            value: value_from_v2_varbind(&vb.value),
        })
        .collect()
}

fn value_from_v1_syntax(syntax: &smi_v1::ObjectSyntax) -> Value {
    match syntax {
        smi_v1::ObjectSyntax::Simple(simple) => match simple {
            smi_v1::SimpleSyntax::Number(n) => Value::Integer(integer_to_i64(n)),
            smi_v1::SimpleSyntax::String(s) => Value::OctetString(s.to_vec()),
            smi_v1::SimpleSyntax::Object(oid) => Value::ObjectIdentifier(oid_to_string(oid)),
            smi_v1::SimpleSyntax::Empty => Value::Null,
        },
        smi_v1::ObjectSyntax::ApplicationWide(app) => match app {
            smi_v1::ApplicationSyntax::Counter(c) => Value::Counter32(c.0),
            smi_v1::ApplicationSyntax::Gauge(g) => Value::Gauge32(g.0),
            smi_v1::ApplicationSyntax::Ticks(t) => Value::TimeTicks(u64::from(t.0)),
            smi_v1::ApplicationSyntax::Arbitrary(bytes) => Value::Opaque(bytes.as_ref().to_vec()),
            smi_v1::ApplicationSyntax::Address(addr) => {
                Value::IpAddress(network_addr_to_string(addr))
            }
        },
    }
}

fn value_from_v2_varbind(value: &v2::VarBindValue) -> Value {
    match value {
        v2::VarBindValue::Value(syntax) => value_from_v2_syntax(syntax),
        v2::VarBindValue::Unspecified => Value::Null,
        v2::VarBindValue::NoSuchObject => Value::NoSuchObject,
        v2::VarBindValue::NoSuchInstance => Value::NoSuchInstance,
        v2::VarBindValue::EndOfMibView => Value::EndOfMibView,
    }
}

fn value_from_v2_syntax(syntax: &smi_v2::ObjectSyntax) -> Value {
    match syntax {
        smi_v2::ObjectSyntax::Simple(simple) => match simple {
            smi_v2::SimpleSyntax::Integer(n) => Value::Integer(integer_to_i64(n)),
            smi_v2::SimpleSyntax::String(s) => Value::OctetString(s.to_vec()),
            smi_v2::SimpleSyntax::ObjectId(oid) => Value::ObjectIdentifier(oid_to_string(oid)),
        },
        smi_v2::ObjectSyntax::ApplicationWide(app) => match app {
            smi_v2::ApplicationSyntax::Counter(c) => Value::Counter32(c.0),
            smi_v2::ApplicationSyntax::Unsigned(u) => Value::Gauge32(u.0),
            smi_v2::ApplicationSyntax::Ticks(t) => Value::TimeTicks(u64::from(t.0)),
            smi_v2::ApplicationSyntax::Arbitrary(bytes) => Value::Opaque(bytes.as_ref().to_vec()),
            smi_v2::ApplicationSyntax::Address(addr) => Value::IpAddress(format!(
                "{}.{}.{}.{}",
                addr.0[0], addr.0[1], addr.0[2], addr.0[3]
            )),
            smi_v2::ApplicationSyntax::BigCounter(c) => Value::Counter64(c.0),
        },
    }
}

/// Encode an SNMPv1 trap message for the forward sink. Unparseable OIDs and
/// non-IPv4 agent addresses degrade to `.0.0` and `0.0.0.0` respectively
/// rather than fail the whole emission.
pub fn encode_v1_trap(
    envelope: &V1Envelope,
    varbinds: &[VarBind],
    community: &str,
) -> Result<Vec<u8>, CodecError> {
    let enterprise = oid_from_string(&envelope.enterprise).unwrap_or_else(zero_dot_zero);
    let agent: Ipv4Addr = envelope.agent_addr.parse().unwrap_or(Ipv4Addr::UNSPECIFIED);

    let bindings: Vec<v1::VarBind> = varbinds
        .iter()
        .map(|vb| v1::VarBind {
            name: oid_from_string(&vb.oid).unwrap_or_else(zero_dot_zero),
            value: v1_syntax_from_value(&vb.value),
        })
        .collect();

    let trap = v1::Trap {
        enterprise,
        agent_addr: smi_v1::NetworkAddress::Internet(smi_v1::IpAddress(FixedOctetString::new(
            agent.octets(),
        ))),
        generic_trap: envelope.generic_trap.into(),
        specific_trap: envelope.specific_trap.into(),
        time_stamp: smi_v1::TimeTicks(envelope.timestamp),
        variable_bindings: bindings.into(),
    };

    let msg = v1::Message {
        version: 0.into(),
        community: community.as_bytes().to_vec().into(),
        data: v1::Pdus::Trap(trap),
    };

    rasn::ber::encode(&msg).map_err(|e| CodecError::Encode(e.to_string()))
}

/// v1 object syntax for an outbound varbind. TimeTicks have already been
/// narrowed by the forward sink; Counter64 has no v1 form and truncates.
fn v1_syntax_from_value(value: &Value) -> smi_v1::ObjectSyntax {
    use smi_v1::{ApplicationSyntax, ObjectSyntax, SimpleSyntax};

    match value {
        Value::Integer(i) => ObjectSyntax::Simple(SimpleSyntax::Number((*i).into())),
        Value::Boolean(b) => ObjectSyntax::Simple(SimpleSyntax::Number(i64::from(*b).into())),
        Value::OctetString(b)
        | Value::Opaque(b)
        | Value::BitString(b)
        | Value::NsapAddress(b) => ObjectSyntax::Simple(SimpleSyntax::String(b.clone().into())),
        Value::ObjectDescription(s) => {
            ObjectSyntax::Simple(SimpleSyntax::String(s.as_bytes().to_vec().into()))
        }
        Value::ObjectIdentifier(oid) => ObjectSyntax::Simple(SimpleSyntax::Object(
            oid_from_string(oid).unwrap_or_else(zero_dot_zero),
        )),
        Value::IpAddress(addr) => {
            let ip: Ipv4Addr = addr.parse().unwrap_or(Ipv4Addr::UNSPECIFIED);
            ObjectSyntax::ApplicationWide(ApplicationSyntax::Address(
                smi_v1::NetworkAddress::Internet(smi_v1::IpAddress(FixedOctetString::new(
                    ip.octets(),
                ))),
            ))
        }
        Value::Counter32(n) => ObjectSyntax::ApplicationWide(ApplicationSyntax::Counter(
            smi_v1::Counter(*n),
        )),
        Value::Gauge32(n) | Value::Uinteger32(n) => {
            ObjectSyntax::ApplicationWide(ApplicationSyntax::Gauge(smi_v1::Gauge(*n)))
        }
        Value::TimeTicks(n) => ObjectSyntax::ApplicationWide(ApplicationSyntax::Ticks(
            smi_v1::TimeTicks(*n as u32),
        )),
        Value::Counter64(n) => ObjectSyntax::ApplicationWide(ApplicationSyntax::Counter(
            smi_v1::Counter(*n as u32),
        )),
        Value::EndOfContents
        | Value::Null
        | Value::OpaqueFloat(_)
        | Value::OpaqueDouble(_)
        | Value::NoSuchObject
        | Value::NoSuchInstance
        | Value::EndOfMibView => ObjectSyntax::Simple(SimpleSyntax::Empty),
    }
}

/// Dotted rendering with a leading `.`, the form the pipeline matches and
/// classifies on.
pub fn oid_to_string(oid: &ObjectIdentifier) -> String {
    let mut out = String::new();
    for arc in oid.iter() {
        out.push('.');
        out.push_str(&arc.to_string());
    }
    out
}

/// Parse a dotted OID (leading `.` optional). At least two arcs are
/// required for a BER-encodable identifier.
pub fn oid_from_string(oid: &str) -> Option<ObjectIdentifier> {
    let arcs: Vec<u32> = oid
        .trim_start_matches('.')
        .split('.')
        .map(|arc| arc.parse().ok())
        .collect::<Option<_>>()?;

    if arcs.len() < 2 {
        return None;
    }

    Some(ObjectIdentifier::new_unchecked(arcs.into()))
}

fn integer_to_i64(int: &Integer) -> i64 {
    i64::try_from(int).unwrap_or(0)
}

fn network_addr_to_string(addr: &smi_v1::NetworkAddress) -> String {
    match addr {
        smi_v1::NetworkAddress::Internet(ip) => {
            format!("{}.{}.{}.{}", ip.0[0], ip.0[1], ip.0[2], ip.0[3])
        }
    }
}
