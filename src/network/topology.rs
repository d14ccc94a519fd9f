//! Directed pipe graph, node classification, and dependency resolution.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::ValueReference;
use crate::error::TopologyError;

/// First value reference handed to an input signal.
pub const INPUT_REFERENCE_BASE: ValueReference = 1001;
/// First value reference handed to an output signal.
pub const OUTPUT_REFERENCE_BASE: ValueReference = 2001;
/// Distance between consecutive signal references; the gap holds the clock.
pub const REFERENCE_STRIDE: ValueReference = 2;

/// Transport parameters carried by a pipe declaration.
///
/// Delays add up along a path, see [`Topology::upstream_delays`]. Jitter
/// and loss are carried for components that model them.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Transport {
    /// Nominal transport delay (s).
    pub delay: f64,
    /// Delay jitter (s).
    pub jitter: f64,
    /// Loss probability (0.0-1.0).
    pub loss: f64,
}

/// Role of a node, derived from its pipe connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Only outgoing pipes.
    Input,
    /// Only incoming pipes.
    Output,
    /// Both incoming and outgoing pipes.
    Relay,
}

/// A named endpoint in the network.
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    incoming: Vec<String>,
    outgoing: Vec<String>,
    input_reference: Option<ValueReference>,
    output_reference: Option<ValueReference>,
}

impl Node {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            incoming: Vec::new(),
            outgoing: Vec::new(),
            input_reference: None,
            output_reference: None,
        }
    }

    /// Node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Incoming pipe names in registration order.
    pub fn incoming(&self) -> &[String] {
        &self.incoming
    }

    /// Outgoing pipe names in registration order.
    pub fn outgoing(&self) -> &[String] {
        &self.outgoing
    }

    /// Returns `true` when the node has outgoing pipes and no incoming ones.
    pub fn is_input(&self) -> bool {
        !self.outgoing.is_empty() && self.incoming.is_empty()
    }

    /// Returns `true` when the node has incoming pipes and no outgoing ones.
    pub fn is_output(&self) -> bool {
        !self.incoming.is_empty() && self.outgoing.is_empty()
    }

    /// Classifies the node from its connectivity.
    pub fn kind(&self) -> NodeKind {
        if self.is_input() {
            NodeKind::Input
        } else if self.is_output() {
            NodeKind::Output
        } else {
            NodeKind::Relay
        }
    }

    /// Signal reference allocated to an input node.
    pub fn input_reference(&self) -> Option<ValueReference> {
        self.input_reference
    }

    /// Signal reference allocated to an output node.
    pub fn output_reference(&self) -> Option<ValueReference> {
        self.output_reference
    }
}

/// A directed, named connection between two nodes.
#[derive(Debug, Clone)]
pub struct Pipe {
    pub name: String,
    pub start: String,
    pub end: String,
    pub transport: Transport,
}

/// Collects pipe registrations before the graph is frozen.
///
/// Nodes are created lazily the first time a pipe names them, so node
/// order follows pipe declaration order (start node before end node).
#[derive(Debug, Default)]
pub struct TopologyBuilder {
    nodes: Vec<Node>,
    node_index: HashMap<String, usize>,
    pipes: Vec<Pipe>,
    pipe_index: HashMap<String, usize>,
}

impl TopologyBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pipe and attaches it to both endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::DuplicatePipeName`] if `name` is already
    /// registered and [`TopologyError::EmptyName`] if any name is empty.
    pub fn register_pipe(
        &mut self,
        name: &str,
        start: &str,
        end: &str,
        transport: Transport,
    ) -> Result<(), TopologyError> {
        for (field, value) in [("name", name), ("start node", start), ("end node", end)] {
            if value.is_empty() {
                return Err(TopologyError::EmptyName {
                    pipe: name.to_string(),
                    field,
                });
            }
        }
        if self.pipe_index.contains_key(name) {
            return Err(TopologyError::DuplicatePipeName(name.to_string()));
        }

        let start_idx = self.node_or_insert(start);
        self.nodes[start_idx].outgoing.push(name.to_string());
        let end_idx = self.node_or_insert(end);
        self.nodes[end_idx].incoming.push(name.to_string());

        self.pipe_index.insert(name.to_string(), self.pipes.len());
        self.pipes.push(Pipe {
            name: name.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            transport,
        });
        Ok(())
    }

    fn node_or_insert(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.node_index.get(name) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(Node::new(name));
        self.node_index.insert(name.to_string(), idx);
        idx
    }

    /// Classifies every node and allocates signal references, freezing the graph.
    ///
    /// Input and output references are handed out in node discovery order,
    /// each advancing by [`REFERENCE_STRIDE`] so the odd reference in
    /// between is free for the signal's clock.
    pub fn classify_and_allocate(mut self) -> Topology {
        let mut next_input = INPUT_REFERENCE_BASE;
        let mut next_output = OUTPUT_REFERENCE_BASE;
        let mut has_relay = false;

        for node in &mut self.nodes {
            match node.kind() {
                NodeKind::Input => {
                    node.input_reference = Some(next_input);
                    next_input += REFERENCE_STRIDE;
                }
                NodeKind::Output => {
                    node.output_reference = Some(next_output);
                    next_output += REFERENCE_STRIDE;
                }
                NodeKind::Relay => has_relay = true,
            }
        }

        debug!(
            nodes = self.nodes.len(),
            pipes = self.pipes.len(),
            has_relay,
            "topology allocated"
        );

        Topology {
            nodes: self.nodes,
            node_index: self.node_index,
            pipes: self.pipes,
            pipe_index: self.pipe_index,
            has_relay,
        }
    }
}

/// A frozen pipe network with allocated signal references.
#[derive(Debug, Clone)]
pub struct Topology {
    nodes: Vec<Node>,
    node_index: HashMap<String, usize>,
    pipes: Vec<Pipe>,
    pipe_index: HashMap<String, usize>,
    has_relay: bool,
}

impl Topology {
    /// All nodes in discovery order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All pipes in declaration order.
    pub fn pipes(&self) -> &[Pipe] {
        &self.pipes
    }

    /// Looks up a node by name.
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.node_index.get(name).map(|&idx| &self.nodes[idx])
    }

    /// Looks up a pipe by name.
    pub fn pipe(&self, name: &str) -> Option<&Pipe> {
        self.pipe_index.get(name).map(|&idx| &self.pipes[idx])
    }

    /// Input nodes in allocation order.
    pub fn inputs(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_input())
    }

    /// Output nodes in allocation order.
    pub fn outputs(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_output())
    }

    /// Returns `true` if at least one relay node exists.
    pub fn has_relay(&self) -> bool {
        self.has_relay
    }

    /// Returns `true` when no pipes were registered.
    pub fn is_empty(&self) -> bool {
        self.pipes.is_empty()
    }

    /// Input references that transitively feed `node`.
    ///
    /// Walks incoming pipes depth-first, first pipe first, using an explicit
    /// stack. Input nodes are terminal and contribute their reference; relay
    /// nodes are descended into. Every node is visited at most once, so
    /// cycles among relays terminate and no reference appears twice. Relays
    /// with no input node upstream contribute nothing and are not an error.
    ///
    /// Returns `None` if `node` is not part of the network.
    pub fn resolve_dependencies(&self, node: &str) -> Option<Vec<ValueReference>> {
        self.upstream_delays(node)
            .map(|found| found.into_iter().map(|(reference, _)| reference).collect())
    }

    /// Like [`resolve_dependencies`](Self::resolve_dependencies), paired with
    /// the summed pipe delay along the path the walk reached each input by.
    pub fn upstream_delays(&self, node: &str) -> Option<Vec<(ValueReference, f64)>> {
        let root = *self.node_index.get(node)?;
        let mut visited = HashSet::from([root]);
        let mut found = Vec::new();
        // (node index, next incoming pipe to explore, delay from node to root)
        let mut stack = vec![(root, 0_usize, 0.0_f64)];

        while let Some(&(current, position, delay)) = stack.last() {
            let Some(pipe_name) = self.nodes[current].incoming.get(position) else {
                stack.pop();
                continue;
            };
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }

            let Some(pipe) = self.pipe(pipe_name) else {
                continue;
            };
            let Some(&upstream) = self.node_index.get(&pipe.start) else {
                continue;
            };
            if !visited.insert(upstream) {
                continue;
            }

            let delay = delay + pipe.transport.delay;
            let upstream_node = &self.nodes[upstream];
            if upstream_node.is_input() {
                if let Some(reference) = upstream_node.input_reference {
                    found.push((reference, delay));
                }
            } else {
                stack.push((upstream, 0, delay));
            }
        }

        if found.is_empty() && !self.nodes[root].incoming.is_empty() {
            debug!(node, "no input node upstream");
        }
        Some(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(pipes: &[(&str, &str, &str)]) -> Topology {
        let mut builder = TopologyBuilder::new();
        for (name, start, end) in pipes {
            builder
                .register_pipe(name, start, end, Transport::default())
                .expect("pipe should register");
        }
        builder.classify_and_allocate()
    }

    #[test]
    fn classifies_chain() {
        let topo = build(&[("p1", "A", "B"), ("p2", "B", "C")]);
        assert_eq!(topo.node("A").map(Node::kind), Some(NodeKind::Input));
        assert_eq!(topo.node("B").map(Node::kind), Some(NodeKind::Relay));
        assert_eq!(topo.node("C").map(Node::kind), Some(NodeKind::Output));
        assert!(topo.has_relay());
    }

    #[test]
    fn duplicate_pipe_rejected() {
        let mut builder = TopologyBuilder::new();
        builder
            .register_pipe("p1", "A", "B", Transport::default())
            .expect("first registration");
        let err = builder.register_pipe("p1", "C", "D", Transport::default());
        assert_eq!(err, Err(TopologyError::DuplicatePipeName("p1".into())));
    }

    #[test]
    fn empty_endpoint_rejected() {
        let mut builder = TopologyBuilder::new();
        let err = builder.register_pipe("p1", "A", "", Transport::default());
        assert!(matches!(
            err,
            Err(TopologyError::EmptyName {
                field: "end node",
                ..
            })
        ));
    }

    #[test]
    fn allocation_follows_discovery_order() {
        let topo = build(&[("p1", "X", "out1"), ("p2", "Y", "out2"), ("p3", "Z", "out1")]);
        let inputs: Vec<_> = topo.inputs().filter_map(Node::input_reference).collect();
        let outputs: Vec<_> = topo.outputs().filter_map(Node::output_reference).collect();
        assert_eq!(inputs, vec![1001, 1003, 1005]);
        assert_eq!(outputs, vec![2001, 2003]);
    }

    #[test]
    fn fan_in_dependencies_keep_pipe_order() {
        let topo = build(&[("p1", "X", "out"), ("p2", "Y", "out")]);
        assert_eq!(topo.resolve_dependencies("out"), Some(vec![1001, 1003]));
        assert!(!topo.has_relay());
    }

    #[test]
    fn relay_chain_resolves_to_input() {
        let topo = build(&[("p1", "A", "B"), ("p2", "B", "C")]);
        assert_eq!(topo.resolve_dependencies("C"), Some(vec![1001]));
    }

    #[test]
    fn upstream_delays_sum_along_the_path() {
        let mut builder = TopologyBuilder::new();
        for (name, start, end, delay) in [
            ("p1", "A", "R", 0.5),
            ("p2", "B", "R", 0.125),
            ("p3", "R", "OUT", 0.25),
        ] {
            builder
                .register_pipe(name, start, end, Transport { delay, ..Transport::default() })
                .expect("pipe should register");
        }
        let topo = builder.classify_and_allocate();
        assert_eq!(
            topo.upstream_delays("OUT"),
            Some(vec![(1001, 0.75), (1003, 0.375)])
        );
        assert_eq!(topo.resolve_dependencies("OUT"), Some(vec![1001, 1003]));
    }

    #[test]
    fn cyclic_relays_terminate_without_duplicates() {
        let topo = build(&[
            ("in_x", "I", "X"),
            ("xy", "X", "Y"),
            ("yx", "Y", "X"),
            ("x_out", "X", "O"),
            ("y_out", "Y", "O"),
        ]);
        assert_eq!(topo.resolve_dependencies("O"), Some(vec![1001]));
    }

    #[test]
    fn repeated_input_pipes_do_not_duplicate() {
        let topo = build(&[("a", "I", "O"), ("b", "I", "O")]);
        assert_eq!(topo.resolve_dependencies("O"), Some(vec![1001]));
    }

    #[test]
    fn relay_without_inputs_contributes_nothing() {
        // R only feeds itself and the output; no input node lies upstream of it.
        let topo = build(&[("rr", "R", "R"), ("ro", "R", "O"), ("io", "I", "O")]);
        assert_eq!(topo.node("R").map(Node::kind), Some(NodeKind::Relay));
        assert_eq!(topo.resolve_dependencies("O"), Some(vec![1001]));
    }

    #[test]
    fn unknown_node_has_no_dependencies() {
        let topo = build(&[("p1", "A", "B")]);
        assert_eq!(topo.resolve_dependencies("nope"), None);
    }

    #[test]
    fn empty_topology() {
        let topo = TopologyBuilder::new().classify_and_allocate();
        assert!(topo.is_empty());
        assert!(!topo.has_relay());
        assert_eq!(topo.inputs().count(), 0);
    }
}
