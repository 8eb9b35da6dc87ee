//! Append-mode file sink: one timestamped line per trap, in arrival order.
use std::fs;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use crossbeam_channel::Receiver;

use crate::config::LogConfig;
use crate::log;
use crate::sinks::{Sink, SinkError};
use crate::trap::Trap;

const QUEUE_DEPTH: usize = 1_000;
const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

pub struct FileSink {
    file: fs::File,
    path: PathBuf,
    prefix: String,
}

impl FileSink {
    /// Open the log file (append, created if absent, mode 0666) and start
    /// the consumer. Open failure is fatal at startup.
    pub fn start(config: &LogConfig) -> Result<Sink, SinkError> {
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .mode(0o666)
            .open(&config.logfile)
            .map_err(|e| SinkError::OpenLogfile(config.logfile.display().to_string(), e))?;

        let sink = FileSink {
            file,
            path: config.logfile.clone(),
            prefix: config.prefix.clone(),
        };

        Ok(Sink::start(
            format!("file sink ({})", config.logfile.display()),
            QUEUE_DEPTH,
            move |traps| sink.run(traps),
        ))
    }

    fn run(mut self, traps: Receiver<Arc<Trap>>) {
        for trap in traps.iter() {
            if let Err(e) = self.append(&trap) {
                // the line is lost; the sink keeps going
                log::err(format!(
                    "Failed to append trap to {}: {}",
                    self.path.display(),
                    e
                ));
            }
        }
    }

    fn append(&mut self, trap: &Trap) -> std::io::Result<()> {
        writeln!(
            self.file,
            "{}{} {}",
            self.prefix,
            Local::now().format(TIMESTAMP_FORMAT),
            trap
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::trap::{ErrorStatus, PduType, SnmpVersion, Value, VarBind};

    fn trap(payload: &str) -> Arc<Trap> {
        Arc::new(Trap {
            source: "192.0.2.1:32768".parse().unwrap(),
            version: SnmpVersion::V2c,
            pdu_type: PduType::SNMPv2Trap,
            request_id: 1,
            error_status: ErrorStatus::NoError,
            error_index: 0,
            varbinds: vec![VarBind {
                oid: ".1.3.6.1.4.1.10.0.1".to_string(),
                value: Value::OctetString(payload.as_bytes().to_vec()),
            }],
            v1: None,
        })
    }

    #[test]
    fn appends_lines_in_arrival_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traps.log");

        let sink = FileSink::start(&LogConfig {
            prefix: "lab: ".to_string(),
            logfile: path.clone(),
        })
        .unwrap();

        assert!(sink.send(trap("first")));
        assert!(sink.send(trap("second")));
        sink.close();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("lab: "));
        assert!(lines[0].contains(r#""Value": "first""#));
        assert!(lines[1].contains(r#""Value": "second""#));
        assert!(lines[0].contains(r#""Type": "OctetString""#));
    }

    #[test]
    fn appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traps.log");
        fs::write(&path, "preexisting\n").unwrap();

        let sink = FileSink::start(&LogConfig {
            prefix: String::new(),
            logfile: path.clone(),
        })
        .unwrap();
        sink.send(trap("appended"));
        sink.close();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("preexisting\n"));
        assert!(contents.contains("appended"));
    }

    #[test]
    fn unopenable_path_fails_startup() {
        let err = FileSink::start(&LogConfig {
            prefix: String::new(),
            logfile: PathBuf::from("/nonexistent-dir/traps.log"),
        });
        assert!(matches!(err, Err(SinkError::OpenLogfile(..))));
    }
}
