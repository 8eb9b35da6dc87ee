//! The dispatch pipeline: an ordered walk over handlers, each pairing an
//! OID-prefix filter and drop flag with the sinks it broadcasts into.
use std::sync::Arc;

use crate::config;
use crate::log;
use crate::sinks::{ExecSink, FileSink, ForwardSink, Sink, SinkError};
use crate::trap::Trap;

/// One pipeline stage. Owns the queues of its enabled sinks.
pub struct Handler {
    oid: String,
    drop: bool,
    sinks: Vec<Sink>,
}

impl Handler {
    pub fn start(config: &config::Handle) -> Result<Self, SinkError> {
        let mut sinks = Vec::with_capacity(3);

        if let Some(log) = &config.log {
            sinks.push(FileSink::start(log)?);
        }
        if let Some(cmd) = &config.cmd {
            sinks.push(ExecSink::start(cmd)?);
        }
        if let Some(fwd) = &config.fwd {
            sinks.push(ForwardSink::start(fwd)?);
        }

        Ok(Handler {
            oid: config.oid.clone(),
            drop: config.drop,
            sinks,
        })
    }

    /// An empty prefix (or `.`) matches any trap carrying at least one
    /// varbind; otherwise some varbind OID must extend the prefix at a
    /// component boundary.
    fn matches(&self, trap: &Trap) -> bool {
        trap.varbinds.iter().any(|vb| is_base_oid(&self.oid, &vb.oid))
    }

    /// Broadcast one trap to every sink queue, in declaration order. A
    /// closed queue means the consumer is gone; the trap is skipped there.
    fn broadcast(&self, trap: &Arc<Trap>) {
        for sink in &self.sinks {
            if !sink.send(Arc::clone(trap)) {
                log::warn(format!("{} is gone; trap skipped", sink.describe()));
            }
        }
    }

    fn close(self) {
        for sink in self.sinks {
            sink.close();
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "{} sink(s) behind prefix `{}`{}",
            self.sinks.len(),
            self.oid,
            if self.drop { ", dropping" } else { "" }
        )
    }
}

/// Walks the configured pipeline once per accepted trap.
pub struct Dispatcher {
    handlers: Vec<Handler>,
}

impl Dispatcher {
    pub fn start(handles: &[config::Handle]) -> Result<Self, SinkError> {
        let handlers = handles.iter().map(Handler::start).collect::<Result<_, _>>()?;
        Ok(Dispatcher { handlers })
    }

    pub fn handlers(&self) -> &[Handler] {
        &self.handlers
    }

    /// Deliver one trap: walk the handlers in declaration order, broadcast
    /// on match, and stop the walk at the first matching drop stage.
    pub fn deliver(&self, trap: Trap) {
        let trap = Arc::new(trap);

        for handler in &self.handlers {
            if !handler.matches(&trap) {
                continue;
            }

            handler.broadcast(&trap);

            if handler.drop {
                break;
            }
        }
    }

    /// Close every sink queue exactly once and wait for the consumers to
    /// drain.
    pub fn close(self) {
        for handler in self.handlers {
            handler.close();
        }
    }
}

/// Dotted-prefix containment at a component boundary: `prefix` matches
/// itself and `prefix.suffix`, never `prefix123`. Empty and `.` prefixes
/// match everything. Leading dots are insignificant.
fn is_base_oid(prefix: &str, oid: &str) -> bool {
    let prefix = prefix.trim_start_matches('.');
    if prefix.is_empty() {
        return true;
    }

    match oid.trim_start_matches('.').strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('.'),
        None => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sinks;
    use crate::trap::{ErrorStatus, PduType, SnmpVersion, Value, VarBind};
    use crossbeam_channel::Receiver;
    use std::time::Duration;

    fn trap(oids: &[&str]) -> Trap {
        Trap {
            source: "192.0.2.1:32768".parse().unwrap(),
            version: SnmpVersion::V2c,
            pdu_type: PduType::SNMPv2Trap,
            request_id: 0,
            error_status: ErrorStatus::NoError,
            error_index: 0,
            varbinds: oids
                .iter()
                .map(|oid| VarBind {
                    oid: oid.to_string(),
                    value: Value::Integer(0),
                })
                .collect(),
            v1: None,
        }
    }

    fn capture_handler(oid: &str, drop: bool) -> (Handler, Receiver<Arc<Trap>>) {
        let (sink, seen) = sinks::capture();
        let handler = Handler {
            oid: oid.to_string(),
            drop,
            sinks: vec![sink],
        };
        (handler, seen)
    }

    fn drained(seen: &Receiver<Arc<Trap>>) -> usize {
        let mut count = 0;
        while seen.recv_timeout(Duration::from_millis(200)).is_ok() {
            count += 1;
        }
        count
    }

    #[test]
    fn base_oid_containment() {
        assert!(is_base_oid(".1.3.6.1.4.1.10", ".1.3.6.1.4.1.10"));
        assert!(is_base_oid(".1.3.6.1.4.1.10", ".1.3.6.1.4.1.10.0.1"));
        assert!(!is_base_oid(".1.3.6.1.4.1.10", ".1.3.6.1.4.1.100.1"));
        assert!(!is_base_oid(".1.3.6.1.4.1.10", ".1.3.6.1.4.1.1"));
        assert!(is_base_oid("1.3.6", ".1.3.6.1"));
    }

    #[test]
    fn match_all_sentinels_need_a_varbind() {
        let (handler, _seen) = capture_handler("", false);
        assert!(handler.matches(&trap(&[".1.3.6.1.4.1.10.0.1"])));
        assert!(!handler.matches(&trap(&[])));

        let (handler, _seen) = capture_handler(".", false);
        assert!(handler.matches(&trap(&[".1.2"])));
    }

    #[test]
    fn drop_short_circuits_later_handlers() {
        let (first, seen_first) = capture_handler(".1", true);
        let (second, seen_second) = capture_handler(".1", false);
        let dispatcher = Dispatcher {
            handlers: vec![first, second],
        };

        dispatcher.deliver(trap(&[".1.3.6.1.4.1.10.0.1"]));
        dispatcher.close();

        assert_eq!(drained(&seen_first), 1);
        assert_eq!(drained(&seen_second), 0);
    }

    #[test]
    fn unmatched_stage_is_skipped_not_dropped() {
        let (first, seen_first) = capture_handler(".1.3.6.1.4.1.99", true);
        let (second, seen_second) = capture_handler("", false);
        let dispatcher = Dispatcher {
            handlers: vec![first, second],
        };

        dispatcher.deliver(trap(&[".1.3.6.1.4.1.100.1"]));
        dispatcher.close();

        // the drop flag of a non-matching stage has no effect
        assert_eq!(drained(&seen_first), 0);
        assert_eq!(drained(&seen_second), 1);
    }

    #[test]
    fn no_handler_matches_means_no_sink_fires() {
        let (handler, seen) = capture_handler(".1.3.6.1.4.1.99", false);
        let dispatcher = Dispatcher {
            handlers: vec![handler],
        };

        dispatcher.deliver(trap(&[".1.3.6.1.4.1.100.1"]));
        dispatcher.close();

        assert_eq!(drained(&seen), 0);
    }

    #[test]
    fn sink_receives_traps_in_arrival_order() {
        let (handler, seen) = capture_handler("", false);
        let dispatcher = Dispatcher {
            handlers: vec![handler],
        };

        for n in 0..5 {
            let mut t = trap(&[".1.3.6.1.4.1.10.0.1"]);
            t.request_id = n;
            dispatcher.deliver(t);
        }
        dispatcher.close();

        for n in 0..5 {
            let received = seen.recv_timeout(Duration::from_millis(200)).unwrap();
            assert_eq!(received.request_id, n);
        }
    }

    /// The whole wiring path: a parsed configuration document drives the
    /// dispatcher, and a drop stage hides traps from the stage behind it.
    #[test]
    fn pipeline_from_config_document() {
        let dir = tempfile::tempdir().unwrap();
        let first_log = dir.path().join("first.log");
        let second_log = dir.path().join("second.log");

        let document = format!(
            r#"
            [[Handle]]
            OID = ".1"
            Drop = true
            [Handle.Log]
            Logfile = "{}"

            [[Handle]]
            OID = ".1"
            [Handle.Log]
            Logfile = "{}"
            "#,
            first_log.display(),
            second_log.display()
        );
        let handles: Vec<config::Handle> = {
            #[derive(serde::Deserialize)]
            struct Doc {
                #[serde(rename = "Handle")]
                handles: Vec<config::Handle>,
            }
            toml::from_str::<Doc>(&document).unwrap().handles
        };

        let dispatcher = Dispatcher::start(&handles).unwrap();
        dispatcher.deliver(trap(&[".1.3.6.1.4.1.10.0.1"]));
        dispatcher.close();

        let first = std::fs::read_to_string(&first_log).unwrap();
        let second = std::fs::read_to_string(&second_log).unwrap();
        assert_eq!(first.lines().count(), 1);
        assert_eq!(second.lines().count(), 0);
    }
}
