//! JSON network declarations and the topology model built from them.

pub mod topology;

use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use crate::error::NetworkError;

pub use topology::{Node, NodeKind, Pipe, Topology, TopologyBuilder, Transport};

/// The only network file format version this crate reads.
pub const ACCEPTED_FORMAT: &str = "1.0";

#[derive(Debug, Deserialize)]
struct NetworkFile {
    #[serde(rename = "networkDescription")]
    network_description: NetworkDescription,
}

/// Declarative network description: a named list of pipes.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkDescription {
    /// File format version. Optional; when present it must be [`ACCEPTED_FORMAT`].
    #[serde(default)]
    pub format: Option<String>,
    /// Network name (informational).
    #[serde(default)]
    pub name: String,
    /// Pipes in declaration order.
    pub pipelines: Vec<PipeDeclaration>,
}

/// One pipe entry of a network description.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipeDeclaration {
    pub name: String,
    pub start_node: String,
    pub end_node: String,
    /// Transport delay (s); numbers and numeric strings are accepted.
    #[serde(default, deserialize_with = "quantity")]
    pub delay: f64,
    #[serde(default, deserialize_with = "quantity")]
    pub jitter: f64,
    #[serde(default, deserialize_with = "quantity")]
    pub loss: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Quantity {
    Number(f64),
    Text(String),
}

/// Older network files quote their transport parameters, newer ones don't.
fn quantity<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Quantity::deserialize(deserializer)? {
        Quantity::Number(n) => Ok(n),
        Quantity::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("expected a number, got \"{s}\""))),
    }
}

impl NetworkDescription {
    /// Reads a network description from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns a `NetworkError` if the file cannot be read, is not valid JSON,
    /// or declares an unsupported format.
    pub fn from_json_file(path: &Path) -> Result<Self, NetworkError> {
        let content = fs::read_to_string(path).map_err(|source| NetworkError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Parses a network description from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns a `NetworkError` on malformed JSON or an unsupported format.
    pub fn from_json_str(s: &str) -> Result<Self, NetworkError> {
        let file: NetworkFile = serde_json::from_str(s)?;
        let description = file.network_description;
        if let Some(found) = &description.format {
            if found != ACCEPTED_FORMAT {
                return Err(NetworkError::UnsupportedFormat {
                    found: found.clone(),
                    expected: ACCEPTED_FORMAT,
                });
            }
        }
        Ok(description)
    }

    /// Registers every pipe in declaration order and freezes the topology.
    ///
    /// # Errors
    ///
    /// Returns a `NetworkError::Topology` on duplicate or empty names.
    pub fn to_topology(&self) -> Result<Topology, NetworkError> {
        let mut builder = TopologyBuilder::new();
        for pipe in &self.pipelines {
            builder.register_pipe(
                &pipe.name,
                &pipe.start_node,
                &pipe.end_node,
                Transport {
                    delay: pipe.delay,
                    jitter: pipe.jitter,
                    loss: pipe.loss,
                },
            )?;
        }
        Ok(builder.classify_and_allocate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAIN: &str = r#"{
        "networkDescription": {
            "format": "1.0",
            "name": "chain",
            "pipelines": [
                {"name": "p1", "startNode": "A", "endNode": "B", "delay": "0.5", "jitter": "0", "loss": "0"},
                {"name": "p2", "startNode": "B", "endNode": "C", "delay": 0.25}
            ]
        }
    }"#;

    #[test]
    fn parses_quoted_and_bare_quantities() {
        let desc = NetworkDescription::from_json_str(CHAIN).expect("valid network");
        assert_eq!(desc.name, "chain");
        assert_eq!(desc.pipelines.len(), 2);
        assert_eq!(desc.pipelines[0].delay, 0.5);
        assert_eq!(desc.pipelines[1].delay, 0.25);
        assert_eq!(desc.pipelines[1].loss, 0.0);
    }

    #[test]
    fn rejects_other_formats() {
        let json = r#"{"networkDescription": {"format": "2.0", "pipelines": []}}"#;
        let err = NetworkDescription::from_json_str(json);
        assert!(matches!(err, Err(NetworkError::UnsupportedFormat { .. })));
    }

    #[test]
    fn format_is_optional() {
        let json = r#"{"networkDescription": {"pipelines": [
            {"name": "p", "startNode": "in", "endNode": "out"}
        ]}}"#;
        let desc = NetworkDescription::from_json_str(json).expect("format may be omitted");
        assert!(desc.format.is_none());
    }

    #[test]
    fn rejects_non_numeric_delay() {
        let json = r#"{"networkDescription": {"pipelines": [
            {"name": "p", "startNode": "in", "endNode": "out", "delay": "soon"}
        ]}}"#;
        assert!(matches!(
            NetworkDescription::from_json_str(json),
            Err(NetworkError::Parse(_))
        ));
    }

    #[test]
    fn builds_topology_with_transport() {
        let desc = NetworkDescription::from_json_str(CHAIN).expect("valid network");
        let topo = desc.to_topology().expect("valid topology");
        assert_eq!(topo.pipe("p1").map(|p| p.transport.delay), Some(0.5));
        assert!(topo.has_relay());
    }

    #[test]
    fn duplicate_pipe_surfaces_as_topology_error() {
        let json = r#"{"networkDescription": {"pipelines": [
            {"name": "p", "startNode": "a", "endNode": "b"},
            {"name": "p", "startNode": "c", "endNode": "d"}
        ]}}"#;
        let desc = NetworkDescription::from_json_str(json).expect("valid JSON");
        assert!(matches!(desc.to_topology(), Err(NetworkError::Topology(_))));
    }
}
