//! TOML configuration document: one `[Source]` table for the UDP listener
//! and an ordered list of `[[Handle]]` tables, one per pipeline stage.
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::{self, Deserializer};
use serde::Deserialize;
use thiserror::Error;

use crate::trap::SnmpVersion;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {}: {}", .0.display(), .1)]
    Read(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse configuration file {}: {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("Handle {0} enables no sink; every [[Handle]] needs at least one of Log, Cmd, Fwd")]
    EmptyHandle(usize),
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(rename = "Source")]
    pub source: SnmpConfig,
    #[serde(rename = "Handle", default)]
    pub handles: Vec<Handle>,
}

/// Listener endpoint, also reused for `[Handle.Fwd]` since a forwarding
/// target is described by the same three fields.
#[derive(Debug, Clone, Deserialize)]
pub struct SnmpConfig {
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Version", deserialize_with = "version_literal")]
    pub version: SnmpVersion,
    #[serde(rename = "Community")]
    pub community: String,
}

/// One pipeline stage: an OID prefix filter (empty or `.` matches all), a
/// drop flag that short-circuits later stages, and up to three sinks.
#[derive(Debug, Deserialize)]
pub struct Handle {
    #[serde(rename = "OID", default)]
    pub oid: String,
    #[serde(rename = "Drop", default)]
    pub drop: bool,
    #[serde(rename = "Log")]
    pub log: Option<LogConfig>,
    #[serde(rename = "Cmd")]
    pub cmd: Option<CmdConfig>,
    #[serde(rename = "Fwd")]
    pub fwd: Option<SnmpConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(rename = "Prefix", default)]
    pub prefix: String,
    #[serde(rename = "Logfile")]
    pub logfile: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CmdConfig {
    #[serde(rename = "Command")]
    pub command: PathBuf,
    /// Batch window in seconds; zero or absent selects the default of 5.
    #[serde(rename = "Interval", default)]
    pub interval: u64,
}

fn version_literal<'de, D>(deserializer: D) -> Result<SnmpVersion, D::Error>
where
    D: Deserializer<'de>,
{
    struct Literal;

    impl<'de> de::Visitor<'de> for Literal {
        type Value = SnmpVersion;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an SNMP version literal: \"1\", \"2c\" or \"3\"")
        }

        fn visit_str<E: de::Error>(self, s: &str) -> Result<SnmpVersion, E> {
            s.parse().map_err(E::custom)
        }
    }

    deserializer.deserialize_str(Literal)
}

/// Load and validate a configuration document. Any error here is fatal at
/// startup.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let document = fs::read_to_string(path)
        .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    let config: Config =
        toml::from_str(&document).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;

    for (i, handle) in config.handles.iter().enumerate() {
        if handle.log.is_none() && handle.cmd.is_none() && handle.fwd.is_none() {
            return Err(ConfigError::EmptyHandle(i));
        }
    }

    Ok(config)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn load_str(document: &str) -> Result<Config, ConfigError> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(document.as_bytes()).unwrap();
        load(file.path())
    }

    #[test]
    fn parses_full_document() {
        let config = load_str(
            r#"
            [Source]
            Address = "0.0.0.0:162"
            Version = "2c"
            Community = "public"

            [[Handle]]
            OID = ".1.3.6.1.4.1.10"
            Drop = true
            [Handle.Log]
            Prefix = "lab: "
            Logfile = "/var/log/traps.log"

            [[Handle]]
            [Handle.Cmd]
            Command = "/usr/local/bin/notify"
            Interval = 30
            [Handle.Fwd]
            Address = "203.0.113.1:162"
            Version = "1"
            Community = "private"
            "#,
        )
        .unwrap();

        assert_eq!(config.source.version, SnmpVersion::V2c);
        assert_eq!(config.handles.len(), 2);

        let first = &config.handles[0];
        assert_eq!(first.oid, ".1.3.6.1.4.1.10");
        assert!(first.drop);
        assert_eq!(first.log.as_ref().unwrap().prefix, "lab: ");
        assert!(first.cmd.is_none());

        let second = &config.handles[1];
        assert_eq!(second.oid, "");
        assert!(!second.drop);
        assert_eq!(second.cmd.as_ref().unwrap().interval, 30);
        assert_eq!(second.fwd.as_ref().unwrap().version, SnmpVersion::V1);
    }

    #[test]
    fn interval_defaults_to_zero_when_absent() {
        let config = load_str(
            r#"
            [Source]
            Address = "0.0.0.0:162"
            Version = "2c"
            Community = "public"

            [[Handle]]
            [Handle.Cmd]
            Command = "/bin/true"
            "#,
        )
        .unwrap();

        assert_eq!(config.handles[0].cmd.as_ref().unwrap().interval, 0);
    }

    #[test]
    fn rejects_handle_without_sinks() {
        let err = load_str(
            r#"
            [Source]
            Address = "0.0.0.0:162"
            Version = "1"
            Community = "public"

            [[Handle]]
            OID = ".1.3"
            Drop = true
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::EmptyHandle(0)));
    }

    #[test]
    fn rejects_unknown_version_literal() {
        let err = load_str(
            r#"
            [Source]
            Address = "0.0.0.0:162"
            Version = "2"
            Community = "public"
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::Parse(..)));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        assert!(matches!(
            load(Path::new("/nonexistent/traphandle.toml")),
            Err(ConfigError::Read(..))
        ));
    }
}
