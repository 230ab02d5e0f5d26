//! # Configuration
//!
//! Optional TOML file with a `[broker]` and a `[graph]` table. Every key has
//! a default, so an empty file (or no file at all) is a valid configuration.
//!
//! ```toml
//! [broker]
//! capacity = 100
//! pub_timeout_ms = 5000
//! recv_timeout_ms = 5000
//! sink = "fan-in"
//! topic = "topology"
//!
//! [graph]
//! directed = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use toposcrape_core::primitives::{
    DEFAULT_CAPACITY, DEFAULT_PUB_TIMEOUT, DEFAULT_RECV_TIMEOUT, DEFAULT_TOPIC,
};
use toposcrape_core::{BrokerConfig, GraphKind, Sink, TopoError};
use tracing::debug;

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV: &str = "TOPOSCRAPE_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub broker: BrokerSection,
    pub graph: GraphSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerSection {
    /// Queue capacity per topic; 0 makes every publish a hand-over.
    pub capacity: usize,
    pub pub_timeout_ms: u64,
    /// Also the idle period after which a draining digester stops.
    pub recv_timeout_ms: u64,
    /// `fan-in` or `fan-out`.
    pub sink: String,
    pub topic: String,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            pub_timeout_ms: DEFAULT_PUB_TIMEOUT.as_millis() as u64,
            recv_timeout_ms: DEFAULT_RECV_TIMEOUT.as_millis() as u64,
            sink: "fan-in".to_string(),
            topic: DEFAULT_TOPIC.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GraphSection {
    pub directed: bool,
}

impl Default for GraphSection {
    fn default() -> Self {
        Self { directed: true }
    }
}

// ============================================================
// Loading
// ============================================================

impl Config {
    /// Parse a config file.
    pub fn load(path: &Path) -> Result<Self, TopoError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            TopoError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        Self::parse(&raw).map_err(|e| match e {
            TopoError::DeserializationError(msg) => {
                TopoError::DeserializationError(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, TopoError> {
        let config: Self =
            toml::from_str(raw).map_err(|e| TopoError::DeserializationError(e.to_string()))?;
        config.broker.sink()?;
        Ok(config)
    }

    /// Load `explicit` if given, else the file named by `TOPOSCRAPE_CONFIG`,
    /// else the defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, TopoError> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        match path {
            Some(path) => {
                debug!(path = %path.display(), "loading config");
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Graph kind from the file, forced undirected by the CLI flag.
    #[must_use]
    pub fn graph_kind(&self, undirected: bool) -> GraphKind {
        if undirected || !self.graph.directed {
            GraphKind::Undirected
        } else {
            GraphKind::Directed
        }
    }

    pub fn broker_config(&self) -> Result<BrokerConfig, TopoError> {
        Ok(BrokerConfig {
            capacity: self.broker.capacity,
            pub_timeout: Duration::from_millis(self.broker.pub_timeout_ms),
            recv_timeout: Duration::from_millis(self.broker.recv_timeout_ms),
            sink: self.broker.sink()?,
        })
    }
}

impl BrokerSection {
    fn sink(&self) -> Result<Sink, TopoError> {
        match self.sink.as_str() {
            "fan-in" | "fan_in" => Ok(Sink::FanIn),
            "fan-out" | "fan_out" => Ok(Sink::FanOut),
            other => Err(TopoError::Unsupported(format!("broker sink '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = Config::parse("").expect("parse");
        assert_eq!(config, Config::default());
        assert_eq!(config.broker.capacity, DEFAULT_CAPACITY);
        assert_eq!(config.graph_kind(false), GraphKind::Directed);

        let broker = config.broker_config().expect("broker");
        assert_eq!(broker.pub_timeout, DEFAULT_PUB_TIMEOUT);
        assert_eq!(broker.sink, Sink::FanIn);
    }

    #[test]
    fn tables_override_defaults() {
        let config = Config::parse(
            r#"
            [broker]
            capacity = 0
            recv_timeout_ms = 250
            sink = "fan-out"

            [graph]
            directed = false
            "#,
        )
        .expect("parse");

        let broker = config.broker_config().expect("broker");
        assert_eq!(broker.capacity, 0);
        assert_eq!(broker.recv_timeout, Duration::from_millis(250));
        assert_eq!(broker.pub_timeout, DEFAULT_PUB_TIMEOUT);
        assert_eq!(broker.sink, Sink::FanOut);
        assert_eq!(config.graph_kind(false), GraphKind::Undirected);
    }

    #[test]
    fn flag_forces_undirected() {
        assert_eq!(Config::default().graph_kind(true), GraphKind::Undirected);
    }

    #[test]
    fn unknown_sink_is_rejected() {
        assert!(matches!(
            Config::parse("[broker]\nsink = \"broadcast\"\n"),
            Err(TopoError::Unsupported(_))
        ));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            Config::parse("[broker]\nqueue = 3\n"),
            Err(TopoError::DeserializationError(_))
        ));
    }
}
