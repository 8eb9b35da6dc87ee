//! `traphandle`: an SNMP trap receiver that routes each decoded trap
//! through an ordered, OID-filtered pipeline of file, exec, and forward
//! sinks.
use std::path::PathBuf;
use std::thread;

use anyhow::Context;
use crossbeam_channel as channel;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use structopt::StructOpt;
use thiserror::Error;

mod config;
mod dispatch;
mod log;
mod sinks;
mod snmp;
mod sources;
mod trap;

use sources::Source;

#[derive(Debug, StructOpt)]
#[structopt(name = "traphandle", about = "SNMP trap receiver and dispatcher")]
struct Opts {
    /// Path to the TOML configuration file.
    #[structopt(short = "c", long = "config", default_value = "config.toml")]
    config: PathBuf,
}

#[derive(Debug, Error)]
pub enum TraphandleError {
    // transparent errors
    #[error(transparent)]
    ConfigError(#[from] config::ConfigError),
    #[error(transparent)]
    SourceError(#[from] sources::SourceError),
    #[error(transparent)]
    SinkError(#[from] sinks::SinkError),

    // everything else
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn main() {
    if let Err(e) = main_try() {
        log::err(format!("{:#}", e));
        if matches!(e, TraphandleError::ConfigError(_)) {
            log::hint("See config.toml.example for a working configuration".to_string());
        }
        std::process::exit(1);
    }
}

fn main_try() -> Result<(), TraphandleError> {
    let opts = Opts::from_args();

    let config = config::load(&opts.config)?;
    let dispatcher = dispatch::Dispatcher::start(&config.handles)?;
    let source = sources::UdpSource::bind(&config.source)?;

    log::status("Listening", source.describe());
    for (i, handler) in dispatcher.handlers().iter().enumerate() {
        log::status("Handler", format!("{}: {}", i, handler.describe()));
    }

    let dispatched = run_loop(Box::new(source), &dispatcher)?;

    dispatcher.close();
    log::status("Stopped", format!("{} trap(s) dispatched.", dispatched));

    Ok(())
}

/// Feed traps from the source into the dispatcher until a shutdown signal
/// arrives. Returns the number of dispatched traps.
fn run_loop(
    source: Box<dyn Source>,
    dispatcher: &dispatch::Dispatcher,
) -> Result<u64, TraphandleError> {
    let halt = install_signal_handler()?;

    // A rendezvous channel: the reader hands over one trap at a time, so
    // dispatch order is packet arrival order and sink backpressure reaches
    // the socket.
    let (tx, traps) = channel::bounded(0);
    let reader = thread::spawn(move || {
        for trap in source {
            match trap {
                Ok(trap) => {
                    if tx.send(trap).is_err() {
                        break;
                    }
                }
                Err(e) => log::warn(format!("{}", e)),
            }
        }
    });

    let mut dispatched: u64 = 0;
    loop {
        channel::select! {
            recv(traps) -> trap => match trap {
                Ok(trap) => {
                    dispatcher.deliver(trap);
                    dispatched += 1;
                }
                Err(_) => break,
            },
            recv(halt) -> signal => {
                log::status(
                    "Shutdown",
                    format!("received signal {:?}, draining sinks...", signal.unwrap_or(0)),
                );
                break;
            }
        }
    }

    // The reader is most likely blocked on the next datagram and cannot be
    // interrupted portably; it holds no sink resources, so it is left for
    // the OS to reap when the process exits after the drain.
    drop(reader);

    Ok(dispatched)
}

/// SIGHUP, SIGINT, SIGTERM and SIGQUIT all mean the same thing: stop
/// accepting traps and drain.
fn install_signal_handler() -> Result<channel::Receiver<i32>, TraphandleError> {
    let (tx, halt) = channel::bounded(1);

    let mut signals = Signals::new([SIGHUP, SIGINT, SIGTERM, SIGQUIT])
        .context("Failed to install signal handler")?;
    thread::spawn(move || {
        for signal in signals.forever() {
            if tx.try_send(signal).is_err() {
                break;
            }
        }
    });

    Ok(halt)
}
