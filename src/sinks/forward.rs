//! Forward sink: resends every received trap to a downstream manager as an
//! SNMPv1 trap, collapsing v2c sources into a synthesized v1 envelope.
use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use crossbeam_channel::Receiver;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::SnmpConfig;
use crate::log;
use crate::sinks::{Sink, SinkError};
use crate::snmp;
use crate::trap::{SnmpVersion, Trap, V1Envelope, Value, VarBind};

const QUEUE_DEPTH: usize = 1_000;
const SEND_TIMEOUT: Duration = Duration::from_secs(2);
const RETRIES: u32 = 3;

/// The snmpTrapOID.0 binding a v2c trap identifies itself with.
static SNMP_TRAP_OID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\.1\.3\.6\.1\.6\.3\.1\.1\.4\.1\.0").unwrap());
/// A standard snmpTraps entry; its last arc is the v1 generic-trap number.
static SNMP_TRAPS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\.1\.3\.6\.1\.6\.3\.1\.1\.5\.(\d+)$").unwrap());
/// An enterprise-specific trap OID; enterprise subtree plus specific code.
static ENTERPRISES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\.1\.3\.6\.1\.4\.1\.\d+)+(\.0)?\.(\d+)$").unwrap());

pub struct ForwardSink {
    socket: UdpSocket,
    target: String,
    community: String,
}

impl ForwardSink {
    /// Validate the target and open the persistent UDP client. Everything
    /// that can be rejected is rejected here, at startup.
    pub fn start(config: &SnmpConfig) -> Result<Sink, SinkError> {
        if config.version != SnmpVersion::V1 {
            return Err(SinkError::ForwardVersion(config.version));
        }

        let (host, port) = parse_target(&config.address)?;

        let socket = UdpSocket::bind("0.0.0.0:0")
            .and_then(|socket| {
                socket.set_write_timeout(Some(SEND_TIMEOUT))?;
                socket.connect((host.as_str(), port))?;
                Ok(socket)
            })
            .map_err(|e| SinkError::ForwardConnect(config.address.clone(), e))?;

        let sink = ForwardSink {
            socket,
            target: config.address.clone(),
            community: config.community.clone(),
        };

        Ok(Sink::start(
            format!("forward sink ({})", config.address),
            QUEUE_DEPTH,
            move |traps| sink.run(traps),
        ))
    }

    fn run(self, traps: Receiver<Arc<Trap>>) {
        for trap in traps.iter() {
            if let Err(e) = self.emit(&trap) {
                log::err(format!("Failed to forward trap to {}: {:#}", self.target, e));
            }
        }
    }

    fn emit(&self, trap: &Trap) -> anyhow::Result<()> {
        // a v1 source already carries its envelope and is resent as-is;
        // a v2c source gets one synthesized from its snmpTrapOID.0
        let (envelope, varbinds) = match (&trap.version, &trap.v1) {
            (SnmpVersion::V1, Some(envelope)) => (envelope.clone(), trap.varbinds.clone()),
            _ => synthesize(trap),
        };

        let bytes = snmp::encode_v1_trap(&envelope, &varbinds, &self.community)?;

        let mut attempt = 0;
        loop {
            match self.socket.send(&bytes) {
                Ok(_) => return Ok(()),
                Err(_) if attempt < RETRIES => attempt += 1,
                Err(e) => {
                    return Err(e).with_context(|| format!("send failed after {} retries", RETRIES))
                }
            }
        }
    }
}

fn parse_target(address: &str) -> Result<(String, u16), SinkError> {
    let bad = || SinkError::ForwardAddress(address.to_string());

    let (host, port) = address.rsplit_once(':').ok_or_else(bad)?;
    if host.is_empty() {
        return Err(bad());
    }
    let port: u16 = port.parse().map_err(|_| bad())?;

    Ok((host.to_string(), port))
}

/// Build a v1 envelope for a v2c trap: copy the varbinds (TimeTicks
/// narrowed to 32 bits), take the agent address from the trap source, and
/// classify the first snmpTrapOID.0 value. A value matching neither form
/// leaves the envelope fields empty.
fn synthesize(trap: &Trap) -> (V1Envelope, Vec<VarBind>) {
    let mut envelope = V1Envelope {
        agent_addr: trap.source.ip().to_string(),
        ..V1Envelope::default()
    };

    let mut varbinds = Vec::with_capacity(trap.varbinds.len());
    let mut scanned = false;

    for vb in &trap.varbinds {
        let mut vb = vb.clone();
        if let Value::TimeTicks(ticks) = vb.value {
            vb.value = Value::TimeTicks(u64::from(ticks as u32));
        }

        if !scanned && SNMP_TRAP_OID.is_match(&vb.oid) {
            scanned = true;
            if let Value::ObjectIdentifier(trap_oid) = &vb.value {
                if let Some((enterprise, generic, specific)) = classify(trap_oid) {
                    envelope.enterprise = enterprise;
                    envelope.generic_trap = generic;
                    envelope.specific_trap = specific;
                }
            }
        }

        varbinds.push(vb);
    }

    (envelope, varbinds)
}

fn classify(trap_oid: &str) -> Option<(String, i64, i64)> {
    if let Some(caps) = SNMP_TRAPS.captures(trap_oid) {
        let generic = caps[1].parse().unwrap_or(0);
        return Some((trap_oid.to_string(), generic, 0));
    }

    if let Some(caps) = ENTERPRISES.captures(trap_oid) {
        let specific = caps[3].parse().unwrap_or(0);
        return Some((caps[1].to_string(), 6, specific));
    }

    None
}
