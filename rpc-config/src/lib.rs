// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Application Bootstrap: a small, immutable configuration value parsed
//! from a `key=value` deployment file.
//!
//! Grounded on the teacher's data-model style (`exports::Export`, a plain
//! struct built once at startup) for the value type, and on
//! `xdr_codegen::scanner`'s hand-rolled line scanning for the parser idiom
//! (schema compilation itself is out of scope here, see DESIGN.md).

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    MalformedLine { line: usize, text: String },
    MissingKey(&'static str),
    InvalidPort { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "i/o error: {e}"),
            Self::MalformedLine { line, text } => {
                write!(f, "line {line}: expected key=value, got {text:?}")
            }
            Self::MissingKey(key) => write!(f, "missing required key: {key}"),
            Self::InvalidPort { key, value } => {
                write!(f, "key {key} is not a valid port: {value:?}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// A fully-validated configuration value. Built once, by value, and never
/// mutated afterward (REDESIGN FLAGS §9: configuration is a plain immutable
/// value, not a process-wide singleton).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub rpc_server_ip: String,
    pub rpc_server_port: u16,
    pub zookeeper_ip: String,
    pub zookeeper_port: u16,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parse `key=value` lines, ignoring blank lines and `#`-prefixed
    /// comments (a comment may also trail a value on the same line).
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();

        for (idx, raw_line) in text.lines().enumerate() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::MalformedLine {
                    line: idx + 1,
                    text: raw_line.to_string(),
                });
            };
            values.insert(key.trim().to_string(), value.trim().to_string());
        }

        Ok(Self {
            rpc_server_ip: required(&values, "rpcserverip")?,
            rpc_server_port: required_port(&values, "rpcserverport")?,
            zookeeper_ip: required(&values, "zookeeperip")?,
            zookeeper_port: required_port(&values, "zookeeperport")?,
        })
    }

    pub fn zookeeper_connect_string(&self) -> String {
        format!("{}:{}", self.zookeeper_ip, self.zookeeper_port)
    }
}

fn required(values: &HashMap<String, String>, key: &'static str) -> Result<String, ConfigError> {
    values
        .get(key)
        .cloned()
        .ok_or(ConfigError::MissingKey(key))
}

fn required_port(values: &HashMap<String, String>, key: &'static str) -> Result<u16, ConfigError> {
    let raw = required(values, key)?;
    raw.parse()
        .map_err(|_| ConfigError::InvalidPort { key, value: raw })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_config() {
        let text = "\
            # deployment config\n\
            rpcserverip = 10.0.0.1\n\
            rpcserverport=9000 # the provider port\n\
            zookeeperip=10.0.0.9\n\
            zookeeperport=2181\n\
        ";
        let config = Config::parse(text).unwrap();
        assert_eq!(config.rpc_server_ip, "10.0.0.1");
        assert_eq!(config.rpc_server_port, 9000);
        assert_eq!(config.zookeeper_connect_string(), "10.0.0.9:2181");
    }

    #[test]
    fn blank_and_comment_only_lines_are_ignored() {
        let text = "\n# just a comment\n   \nrpcserverip=1.2.3.4\nrpcserverport=1\nzookeeperip=5.6.7.8\nzookeeperport=2\n";
        assert!(Config::parse(text).is_ok());
    }

    #[test]
    fn missing_key_is_an_error() {
        let text = "rpcserverip=1.2.3.4\nrpcserverport=9000\n";
        let err = Config::parse(text).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey("zookeeperip")));
    }

    #[test]
    fn invalid_port_is_an_error() {
        let text =
            "rpcserverip=1.2.3.4\nrpcserverport=not-a-port\nzookeeperip=5.6.7.8\nzookeeperport=2181\n";
        let err = Config::parse(text).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort { key: "rpcserverport", .. }));
    }

    #[test]
    fn malformed_line_is_an_error() {
        let text = "rpcserverip 1.2.3.4 with no equals sign\n";
        let err = Config::parse(text).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedLine { line: 1, .. }));
    }
}
