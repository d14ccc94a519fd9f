//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use pipeline_cosim::description::{DescriptionHeader, ModelDescription, emit};
use pipeline_cosim::network::NetworkDescription;

/// Three-node chain `A -> B -> C` with a relay in the middle.
pub const CHAIN_NETWORK: &str = r#"{
    "networkDescription": {
        "format": "1.0",
        "name": "chain",
        "pipelines": [
            {"name": "p1", "startNode": "A", "endNode": "B", "delay": "0.5", "jitter": "0", "loss": "0"},
            {"name": "p2", "startNode": "B", "endNode": "C", "delay": 0.25}
        ]
    }
}"#;

/// Two inputs merging into one relay that fans out to two outputs.
pub const MANIFOLD_NETWORK: &str = r#"{
    "networkDescription": {
        "format": "1.0",
        "name": "manifold",
        "pipelines": [
            {"name": "in1", "startNode": "S1", "endNode": "M"},
            {"name": "in2", "startNode": "S2", "endNode": "M"},
            {"name": "out1", "startNode": "M", "endNode": "D1"},
            {"name": "out2", "startNode": "M", "endNode": "D2"}
        ]
    }
}"#;

/// Run configuration stepping the chain for five seconds with one injection.
pub const CHAIN_RUN_CONFIG: &str = r#"
[component]
instance_name = "chain"
transport_delay = 1.5

[session]
start_time = 0.0
stop_time = 5.0
step_size = 1.0

[[session.injections]]
time = 1.0
variable = "A"
value = 17
"#;

/// Model description of [`CHAIN_NETWORK`] with the default header.
pub fn chain_description() -> ModelDescription {
    let network = NetworkDescription::from_json_str(CHAIN_NETWORK).expect("chain parses");
    let topology = network.to_topology().expect("chain is valid");
    emit(&topology, &DescriptionHeader::default())
}

/// Writes `contents` to `dir/name` and returns the path.
pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write fixture");
    path
}
