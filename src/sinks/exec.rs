//! Exec sink: batches traps over a time window, materializes each batch
//! into a temp file, and hands the file to a subprocess. The file vehicle
//! keeps the contract trivial for consumers written in any language.
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use crossbeam_channel::{select, tick, Receiver};
use tempfile::NamedTempFile;

use crate::config::CmdConfig;
use crate::log;
use crate::sinks::{Sink, SinkError};
use crate::trap::Trap;

const QUEUE_DEPTH: usize = 4_096;
const DEFAULT_INTERVAL_SECS: u64 = 5;
const DATETIME_FORMAT: &str = "%Y%m%d%H%M%S";

pub struct ExecSink {
    command: PathBuf,
    buffer: Vec<Arc<Trap>>,
}

impl ExecSink {
    pub fn start(config: &CmdConfig) -> Result<Sink, SinkError> {
        let ticker = tick(effective_interval(config.interval));
        let sink = ExecSink {
            command: config.command.clone(),
            buffer: Vec::new(),
        };

        Ok(Sink::start(
            format!("exec sink ({})", config.command.display()),
            QUEUE_DEPTH,
            move |traps| sink.run(traps, ticker),
        ))
    }

    fn run(mut self, traps: Receiver<Arc<Trap>>, ticker: Receiver<std::time::Instant>) {
        loop {
            select! {
                recv(traps) -> trap => match trap {
                    Ok(trap) => self.buffer.push(trap),
                    // queue closed and drained; the ticker dies with us
                    Err(_) => break,
                },
                recv(ticker) -> _ => self.flush(),
            }
        }

        // one final batch so nothing buffered at shutdown is lost
        self.flush();
    }

    /// Snapshot and clear the buffer, then run the command over it. An
    /// empty window is a no-op: no subprocess, no temp file.
    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        let batch = std::mem::take(&mut self.buffer);
        let tempfile = match materialize(&batch) {
            Ok(tempfile) => tempfile,
            Err(e) => {
                log::err(format!(
                    "Failed to write batch of {} trap(s) for {}: {}",
                    batch.len(),
                    self.command.display(),
                    e
                ));
                return;
            }
        };

        match Command::new(&self.command).arg(tempfile.path()).status() {
            Ok(status) if !status.success() => log::warn(format!(
                "{} <{}> exited non-zero: {}",
                self.command.display(),
                tempfile.path().display(),
                status
            )),
            Ok(_) => (),
            Err(e) => log::err(format!("Failed to run {}: {}", self.command.display(), e)),
        }

        // unlinked regardless of exit status
        if let Err(e) = tempfile.close() {
            log::warn(format!("Failed to remove batch temp file: {}", e));
        }
    }
}

fn effective_interval(seconds: u64) -> Duration {
    Duration::from_secs(if seconds == 0 {
        DEFAULT_INTERVAL_SECS
    } else {
        seconds
    })
}

/// One rendered trap per line, trailing newline, in a fresh
/// `traphandle_<YYYYMMDDhhmmss>_<random>` file of mode 0666 under the
/// system temp directory.
fn materialize(batch: &[Arc<Trap>]) -> std::io::Result<NamedTempFile> {
    let mut tempfile = tempfile::Builder::new()
        .prefix(&format!(
            "traphandle_{}_",
            Local::now().format(DATETIME_FORMAT)
        ))
        .tempfile()?;

    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(tempfile.path(), std::fs::Permissions::from_mode(0o666))?;
    }

    for trap in batch {
        writeln!(tempfile, "{}", trap)?;
    }
    tempfile.flush()?;

    Ok(tempfile)
}
