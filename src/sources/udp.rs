//! UDP listener source. Owns the bound socket and the decode gate that
//! stands between raw datagrams and the dispatch pipeline.
use std::net::{SocketAddr, UdpSocket};

use crate::config::SnmpConfig;
use crate::snmp;
use crate::sources::{Source, SourceError};
use crate::trap::Trap;

/// Largest datagram a UDP socket can hand us.
const RECV_BUFFER_SIZE: usize = 65_535;

pub struct UdpSource {
    socket: UdpSocket,
    buffer: Vec<u8>,
    config: SnmpConfig,
}

impl UdpSource {
    pub fn bind(config: &SnmpConfig) -> Result<Self, SourceError> {
        let socket = UdpSocket::bind(&config.address)
            .map_err(|e| SourceError::Bind(config.address.clone(), e))?;

        Ok(Self {
            socket,
            buffer: vec![0; RECV_BUFFER_SIZE],
            config: config.clone(),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }

    /// The source gate: version and community of the decoded message must
    /// match the configured ones, else the packet is dropped.
    fn accepts(&self, inbound: &snmp::Inbound) -> bool {
        inbound.trap.version == self.config.version && inbound.community == self.config.community
    }
}

impl Iterator for UdpSource {
    type Item = Result<Trap, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (len, addr) = match self.socket.recv_from(&mut self.buffer) {
                Ok(received) => received,
                Err(e) => return Some(Err(SourceError::Recv(e))),
            };

            // Undecodable and unauthenticated datagrams are dropped
            // without a trace.
            match snmp::decode(&self.buffer[..len], addr) {
                Ok(inbound) if self.accepts(&inbound) => return Some(Ok(inbound.trap)),
                Ok(_) | Err(_) => continue,
            }
        }
    }
}

impl Source for UdpSource {
    fn describe(&self) -> String {
        format!(
            "UDP listener on {} (SNMPv{})",
            self.config.address, self.config.version
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::trap::SnmpVersion;

    fn listener(version: SnmpVersion, community: &str) -> UdpSource {
        UdpSource::bind(&SnmpConfig {
            address: "127.0.0.1:0".to_string(),
            version,
            community: community.to_string(),
        })
        .unwrap()
    }

    fn v2c_linkdown(community: &str) -> Vec<u8> {
        use rasn_smi::v2 as smi_v2;
        use rasn_snmp::{v2, v2c};

        let pdu = v2::Pdu {
            request_id: 1.into(),
            error_status: 0u32.into(),
            error_index: 0u32.into(),
            variable_bindings: vec![v2::VarBind {
                name: snmp::oid_from_string(".1.3.6.1.6.3.1.1.4.1.0").unwrap(),
                value: v2::VarBindValue::Value(smi_v2::ObjectSyntax::Simple(
                    smi_v2::SimpleSyntax::ObjectId(
                        snmp::oid_from_string(".1.3.6.1.6.3.1.1.5.3").unwrap(),
                    ),
                )),
            }]
            .into(),
        };

        let msg = v2c::Message {
            version: 1.into(),
            community: community.as_bytes().to_vec().into(),
            data: v2::Pdus::Trap(v2::Trap(pdu)),
        };

        rasn::ber::encode(&msg).unwrap()
    }

    #[test]
    fn yields_matching_trap() {
        let mut source = listener(SnmpVersion::V2c, "public");
        let target = source.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(&v2c_linkdown("public"), target).unwrap();

        let trap = source.next().unwrap().unwrap();
        assert_eq!(trap.version, SnmpVersion::V2c);
        assert_eq!(trap.source.ip(), sender.local_addr().unwrap().ip());
    }

    #[test]
    fn drops_wrong_community_then_yields_next() {
        let mut source = listener(SnmpVersion::V2c, "secret");
        let target = source.local_addr().unwrap();

        // a mismatched community and raw garbage are both skipped; the
        // iterator stays silent until an accepted trap arrives
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(&v2c_linkdown("public"), target).unwrap();
        sender.send_to(&[0xde, 0xad, 0xbe, 0xef], target).unwrap();
        sender.send_to(&v2c_linkdown("secret"), target).unwrap();

        let trap = source.next().unwrap().unwrap();
        assert_eq!(trap.version, SnmpVersion::V2c);
    }

    #[test]
    fn bind_failure_is_fatal() {
        let err = UdpSource::bind(&SnmpConfig {
            address: "256.0.0.1:bogus".to_string(),
            version: SnmpVersion::V1,
            community: String::new(),
        });
        assert!(matches!(err, Err(SourceError::Bind(..))));
    }
}
