//! Audio graph - owns elements and the links between their ports

use core::slice;

use hashbrown::HashMap;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, error, trace, trace_span, warn};

use crate::buffer::{BufferAllocator, InfoTag};
use crate::command::{Command, EventQueue};
use crate::element::{random_id, Element, PrepareParams};
use crate::error::{CreateError, PrepareError};
use crate::factory::create_element;
use crate::format::Format;
use crate::graph_class::GraphClass;
use crate::loader::Loader;
use crate::port::Port;

/// An element's port, by element index and port index
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub element: usize,
    pub port: usize,
}

impl PortRef {
    pub fn new(element: usize, port: usize) -> Self {
        Self { element, port }
    }
}

/// Where the buffers of an output port go
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LinkDst {
    Port(PortRef),
    /// The graph's own output port
    Graph,
}

/// A runtime audio graph
///
/// Elements are processed in topological order on every tick. After an
/// element runs, the buffers in its output ports are moved into the linked
/// input ports. A destination port that is still full leaves the buffer
/// where it is, which stalls the producer on the next tick.
///
/// The graph is itself a source element with a single output port, so a
/// graph can be played through a `GraphSource` or nested in a `MixerSource`.
pub struct Graph {
    name: String,
    id: String,
    elements: Vec<Box<dyn Element>>,
    /// Output port -> destination
    links: HashMap<PortRef, LinkDst>,
    topo_order: Vec<usize>,
    port: Port,
    format: Format,
    done: bool,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: random_id(),
            elements: Vec::new(),
            links: HashMap::new(),
            topo_order: Vec::new(),
            port: Port::new("port"),
            format: Format::default(),
            done: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Instantiate every element of `class` and wire up its links
    ///
    /// Links naming an element or port that does not exist are skipped with
    /// a warning.
    pub fn from_class(class: &GraphClass) -> Result<Self, CreateError> {
        let mut graph = Graph::new(class.name()).with_id(class.id());
        let mut index = HashMap::new();
        for desc in class.elements() {
            let elem = create_element(desc)?;
            index.insert(desc.id.as_str(), graph.add_boxed(elem));
        }

        for link in class.links() {
            let (Some(&src), Some(&dst)) = (
                index.get(link.src_element.as_str()),
                index.get(link.dst_element.as_str()),
            ) else {
                warn!(graph = %graph.name, link = %link.id, "link refers to a missing element");
                continue;
            };
            let (Some(src_port), Some(dst_port)) = (
                graph.elements[src].find_output_port(&link.src_port),
                graph.elements[dst].find_input_port(&link.dst_port),
            ) else {
                warn!(graph = %graph.name, link = %link.id, "link refers to a missing port");
                continue;
            };
            if graph.is_src_port_taken(src, src_port) || graph.is_dst_port_taken(dst, dst_port) {
                warn!(graph = %graph.name, link = %link.id, "link refers to a port that is already linked");
                continue;
            }
            graph.link_elements(src, src_port, dst, dst_port);
        }

        if let Some(&src) = index.get(class.src_elem_id()) {
            match graph.elements[src].find_output_port(class.src_elem_port()) {
                Some(port) if !graph.is_src_port_taken(src, port) => graph.link_graph(src, port),
                _ => warn!(graph = %graph.name, port = %class.src_elem_port(), "graph output port is not available"),
            }
        }
        Ok(graph)
    }

    /// Add an element, returns its index
    pub fn add_element<E: Element + 'static>(&mut self, element: E) -> usize {
        self.add_boxed(Box::new(element))
    }

    pub fn add_boxed(&mut self, element: Box<dyn Element>) -> usize {
        self.elements.push(element);
        self.elements.len() - 1
    }

    /// Link an output port to an input port
    ///
    /// Panics if either port is out of range or already linked.
    pub fn link_elements(&mut self, src: usize, src_port: usize, dst: usize, dst_port: usize) {
        assert!(src_port < self.elements[src].num_output_ports(), "no such output port");
        assert!(dst_port < self.elements[dst].num_input_ports(), "no such input port");
        assert!(!self.is_src_port_taken(src, src_port), "output port is already linked");
        assert!(!self.is_dst_port_taken(dst, dst_port), "input port is already linked");
        self.links
            .insert(PortRef::new(src, src_port), LinkDst::Port(PortRef::new(dst, dst_port)));
    }

    /// Route an output port to the graph's own output
    ///
    /// Panics if the port is out of range or either end is already linked.
    pub fn link_graph(&mut self, src: usize, src_port: usize) {
        assert!(src_port < self.elements[src].num_output_ports(), "no such output port");
        assert!(!self.is_src_port_taken(src, src_port), "output port is already linked");
        assert!(!self.has_graph_link(), "graph output is already linked");
        self.links.insert(PortRef::new(src, src_port), LinkDst::Graph);
    }

    pub fn link_elements_by_name(&mut self, src: &str, src_port: &str, dst: &str, dst_port: &str) -> bool {
        let (Some(src), Some(dst)) = (self.position(src), self.position(dst)) else {
            return false;
        };
        let (Some(src_port), Some(dst_port)) = (
            self.elements[src].find_output_port(src_port),
            self.elements[dst].find_input_port(dst_port),
        ) else {
            return false;
        };
        self.link_elements(src, src_port, dst, dst_port);
        true
    }

    pub fn link_graph_by_name(&mut self, src: &str, src_port: &str) -> bool {
        let Some(src) = self.position(src) else {
            return false;
        };
        let Some(src_port) = self.elements[src].find_output_port(src_port) else {
            return false;
        };
        self.link_graph(src, src_port);
        true
    }

    pub fn is_src_port_taken(&self, elem: usize, port: usize) -> bool {
        self.links.contains_key(&PortRef::new(elem, port))
    }

    pub fn is_dst_port_taken(&self, elem: usize, port: usize) -> bool {
        let dst = LinkDst::Port(PortRef::new(elem, port));
        self.links.values().any(|d| *d == dst)
    }

    fn has_graph_link(&self) -> bool {
        self.links.values().any(|d| *d == LinkDst::Graph)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.elements.iter().position(|e| e.name() == name)
    }

    pub fn find_element_by_id(&self, id: &str) -> Option<&dyn Element> {
        self.elements.iter().find(|e| e.id() == id).map(|e| e.as_ref())
    }

    pub fn find_element_by_name(&self, name: &str) -> Option<&dyn Element> {
        self.elements.iter().find(|e| e.name() == name).map(|e| e.as_ref())
    }

    pub fn find_element_by_name_mut(&mut self, name: &str) -> Option<&mut (dyn Element + 'static)> {
        self.elements
            .iter_mut()
            .find(|e| e.name() == name)
            .map(|e| e.as_mut())
    }

    #[inline]
    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    /// Negotiated output format, valid once prepared
    #[inline]
    pub fn format(&self) -> Format {
        self.format
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Every path from an element without inputs linked to it down to the
    /// end of the graph, as `"src:port -> dst:port ..."` strings
    pub fn describe(&self) -> Vec<String> {
        let mut linked = vec![false; self.elements.len()];
        for dst in self.links.values() {
            if let LinkDst::Port(dst) = dst {
                linked[dst.element] = true;
            }
        }
        (0..self.elements.len())
            .filter(|i| !linked[*i])
            .flat_map(|i| self.describe_paths(i))
            .collect()
    }

    fn describe_paths(&self, elem: usize) -> Vec<String> {
        let src = &self.elements[elem];
        if src.num_output_ports() == 0 {
            return vec![String::new()];
        }

        let mut paths = Vec::new();
        for (i, port) in src.output_ports().iter().enumerate() {
            match self.links.get(&PortRef::new(elem, i)) {
                None => paths.push(format!("{}:{} -> nil", src.name(), port.name())),
                Some(LinkDst::Graph) => paths.push(format!(
                    "{}:{} -> {}:{}",
                    src.name(),
                    port.name(),
                    self.name,
                    self.port.name()
                )),
                Some(LinkDst::Port(dst)) => {
                    let dst_elem = &self.elements[dst.element];
                    let head = format!(
                        "{}:{} -> {}:{}",
                        src.name(),
                        port.name(),
                        dst_elem.name(),
                        dst_elem.input_port(dst.port).name()
                    );
                    for tail in self.describe_paths(dst.element) {
                        match tail.is_empty() {
                            true => paths.push(head.clone()),
                            false => paths.push(format!("{} {}", head, tail)),
                        }
                    }
                }
            }
        }
        paths
    }

    fn topological_order(&self) -> Result<Vec<usize>, PrepareError> {
        let mut dag = DiGraph::<usize, ()>::with_capacity(self.elements.len(), self.links.len());
        let nodes: Vec<NodeIndex> = (0..self.elements.len()).map(|i| dag.add_node(i)).collect();
        for (src, dst) in &self.links {
            if let LinkDst::Port(dst) = dst {
                dag.update_edge(nodes[src.element], nodes[dst.element], ());
            }
        }
        let order = toposort(&dag, None).map_err(|cycle| {
            let elem = self.elements[dag[cycle.node_id()]].name();
            error!(graph = %self.name, elem = %elem, "cycle in audio graph");
            PrepareError::Cycle {
                graph: self.name.clone(),
            }
        })?;
        Ok(order.into_iter().map(|ix| dag[ix]).collect())
    }

    fn port_name(&self, at: PortRef, output: bool) -> String {
        let elem = &self.elements[at.element];
        let port = match output {
            true => elem.output_port(at.port),
            false => elem.input_port(at.port),
        };
        format!("{}:{}", elem.name(), port.name())
    }

    /// Prepare every element in dependency order, pushing each negotiated
    /// output format into the linked input port
    pub fn prepare(&mut self, loader: &dyn Loader, params: &PrepareParams) -> Result<(), PrepareError> {
        if !self.has_graph_link() {
            error!(graph = %self.name, "graph has no output element");
            return Err(PrepareError::NoOutput {
                graph: self.name.clone(),
            });
        }
        let order = self.topological_order()?;

        for &i in &order {
            debug!(graph = %self.name, elem = %self.elements[i].name(), "preparing audio element");
            if let Err(e) = self.elements[i].prepare(loader, params) {
                error!(graph = %self.name, elem = %self.elements[i].name(), error = %e, "audio element failed to prepare");
                return Err(PrepareError::Element {
                    graph: self.name.clone(),
                    elem: self.elements[i].name().to_string(),
                    source: Box::new(e),
                });
            }

            for p in 0..self.elements[i].num_output_ports() {
                let src = PortRef::new(i, p);
                let format = self.elements[i].output_port(p).format();
                let dst_port = match self.links.get(&src).copied() {
                    None => {
                        warn!(graph = %self.name, port = %self.port_name(src, true), "output port is not linked");
                        continue;
                    }
                    Some(LinkDst::Graph) => &mut self.port,
                    Some(LinkDst::Port(dst)) => self.elements[dst.element].input_port_mut(dst.port),
                };
                if !dst_port.can_accept(&format) {
                    let dst = dst_port.name().to_string();
                    error!(graph = %self.name, src = %self.port_name(src, true), dst = %dst, %format, "ports are not compatible");
                    return Err(PrepareError::IncompatibleLink {
                        src: self.port_name(src, true),
                        dst,
                    });
                }
                dst_port.set_format(format);
            }
        }

        for (i, elem) in self.elements.iter().enumerate() {
            for p in 0..elem.num_input_ports() {
                if !self.is_dst_port_taken(i, p) {
                    warn!(graph = %self.name, port = %self.port_name(PortRef::new(i, p), false), "input port is not linked");
                }
            }
        }

        let format = self.port.format();
        if !format.is_valid() {
            error!(graph = %self.name, %format, "invalid graph output format");
            return Err(PrepareError::InvalidOutputFormat {
                graph: self.name.clone(),
                format,
            });
        }

        debug!(graph = %self.name, %format, "graph output format negotiated");
        self.topo_order = order;
        self.format = format;
        self.done = false;
        Ok(())
    }

    /// Run one tick of `ms` milliseconds through every element
    pub fn process(&mut self, allocator: &dyn BufferAllocator, events: &mut EventQueue, ms: u32) {
        let _span = trace_span!("Graph::process", graph = %self.name).entered();

        for n in 0..self.topo_order.len() {
            let i = self.topo_order[n];
            let elem = &mut self.elements[i];
            let finished = elem.is_source() && elem.is_source_done();
            let stalled = !elem.has_internal_queue() && elem.output_ports().iter().any(Port::is_full);
            if finished {
                trace!(elem = %elem.name(), "source is done");
            } else if stalled {
                trace!(elem = %elem.name(), "output is back-pressured");
            } else {
                elem.process(allocator, events, ms);
            }
            self.dispatch_outputs(i);
        }

        let done = self.topo_order.iter().all(|&i| {
            let elem = &self.elements[i];
            (!elem.is_source() || elem.is_source_done())
                && elem.queued_buffers() == 0
                && !elem.output_ports().iter().any(Port::has_buffers)
        });
        if done && !self.done {
            debug!(graph = %self.name, "graph is done");
        }
        self.done = done;
    }

    // move the buffers of element `i` into the linked input ports
    fn dispatch_outputs(&mut self, i: usize) {
        for p in 0..self.elements[i].num_output_ports() {
            let Some(dst) = self.links.get(&PortRef::new(i, p)).copied() else {
                if let Some(buffer) = self.elements[i].output_port_mut(p).pull_buffer() {
                    warn!(graph = %self.name, port = %self.port_name(PortRef::new(i, p), true), bytes = buffer.byte_size(), "output port has no input port assigned");
                }
                continue;
            };

            let dst_full = match dst {
                LinkDst::Graph => self.port.is_full(),
                LinkDst::Port(dst) => self.elements[dst.element].input_port(dst.port).is_full(),
            };
            if dst_full {
                continue;
            }

            let src = &mut self.elements[i];
            let Some(mut buffer) = src.output_port_mut(p).pull_buffer() else {
                continue;
            };
            buffer.add_info_tag(InfoTag::element(
                src.name(),
                src.id(),
                src.is_source(),
                src.is_source_done(),
            ));

            let result = match dst {
                LinkDst::Graph => self.port.push_buffer(buffer),
                LinkDst::Port(dst) => self.elements[dst.element].input_port_mut(dst.port).push_buffer(buffer),
            };
            if let Err(buffer) = result {
                // the producer keeps it and stalls until the link drains
                let _ = self.elements[i].output_port_mut(p).push_buffer(buffer);
            }
        }
    }

    /// Move the timers of every element forward
    pub fn advance(&mut self, ms: u32) {
        for &i in &self.topo_order {
            self.elements[i].advance(ms);
        }
    }

    pub fn shutdown(&mut self) {
        for &i in &self.topo_order {
            debug!(graph = %self.name, elem = %self.elements[i].name(), "shutting down audio element");
            self.elements[i].shutdown();
        }
    }

    /// Deliver `cmd` to the element called `dest`
    ///
    /// Direct children are matched first, then every child is asked to route
    /// the command into its own descendants. The command is handed back if
    /// nothing matched.
    pub fn dispatch_command(&mut self, dest: &str, cmd: Command) -> Result<(), Command> {
        if let Some(elem) = self.elements.iter_mut().find(|e| e.name() == dest) {
            elem.receive_command(cmd);
            return Ok(());
        }
        let mut cmd = cmd;
        for elem in &mut self.elements {
            match elem.dispatch_command(dest, cmd) {
                Ok(()) => return Ok(()),
                Err(unrouted) => cmd = unrouted,
            }
        }
        Err(cmd)
    }
}

impl Element for Graph {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Graph"
    }

    fn is_source(&self) -> bool {
        true
    }

    fn is_source_done(&self) -> bool {
        self.done
    }

    fn prepare(&mut self, loader: &dyn Loader, params: &PrepareParams) -> Result<(), PrepareError> {
        Graph::prepare(self, loader, params)
    }

    fn process(&mut self, allocator: &dyn BufferAllocator, events: &mut EventQueue, ms: u32) {
        Graph::process(self, allocator, events, ms)
    }

    fn advance(&mut self, ms: u32) {
        Graph::advance(self, ms)
    }

    fn shutdown(&mut self) {
        Graph::shutdown(self)
    }

    fn dispatch_command(&mut self, dest: &str, cmd: Command) -> Result<(), Command> {
        Graph::dispatch_command(self, dest, cmd)
    }

    fn output_ports(&self) -> &[Port] {
        slice::from_ref(&self.port)
    }

    fn output_ports_mut(&mut self) -> &mut [Port] {
        slice::from_mut(&mut self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::HeapAllocator;
    use crate::command::SetGainCmd;
    use crate::loader::MemoryLoader;
    use crate::nodes::effect::{Gain, Queue};
    use crate::nodes::sink::Null;
    use crate::nodes::source::SineSource;

    fn sine_gain_graph() -> Graph {
        let mut graph = Graph::new("g");
        let sine = graph.add_element(SineSource::new("sine", Format::float32(8000, 1), 440).with_duration(20));
        let gain = graph.add_element(Gain::new("gain", 0.5));
        graph.link_elements(sine, 0, gain, 0);
        graph.link_graph(gain, 0);
        graph
    }

    #[test]
    fn runs_until_sources_are_done() {
        let mut graph = sine_gain_graph();
        graph.prepare(&MemoryLoader::new(), &PrepareParams::default()).unwrap();
        assert_eq!(graph.format(), Format::float32(8000, 1));

        let mut events = EventQueue::new();
        let mut frames = 0;
        for _ in 0..10 {
            graph.process(&HeapAllocator, &mut events, 5);
            graph.advance(5);
            if let Some(buffer) = graph.output_port_mut(0).pull_buffer() {
                // sine then gain
                assert_eq!(buffer.info_tags().len(), 2);
                frames += buffer.frame_count();
            }
        }
        assert_eq!(frames, 160);
        assert!(graph.is_done());
    }

    #[test]
    fn unconsumed_output_stalls_the_producer() {
        let mut graph = sine_gain_graph();
        graph.prepare(&MemoryLoader::new(), &PrepareParams::default()).unwrap();
        let mut events = EventQueue::new();
        for _ in 0..4 {
            graph.process(&HeapAllocator, &mut events, 5);
        }
        // one buffer in the graph port, one in each element port
        let buffer = graph.output_port_mut(0).pull_buffer().unwrap();
        assert_eq!(buffer.frame_count(), 40);
        assert!(!graph.is_done());
    }

    #[test]
    fn graph_without_output_fails() {
        let mut graph = Graph::new("g");
        graph.add_element(SineSource::new("sine", Format::float32(8000, 1), 440));
        let err = graph.prepare(&MemoryLoader::new(), &PrepareParams::default()).unwrap_err();
        assert!(matches!(err, PrepareError::NoOutput { .. }));
    }

    #[test]
    fn link_into_a_port_of_another_format_fails() {
        let mut graph = sine_gain_graph();
        graph
            .find_element_by_name_mut("gain")
            .unwrap()
            .input_port_mut(0)
            .set_format(Format::int16(8000, 1));
        let err = graph.prepare(&MemoryLoader::new(), &PrepareParams::default()).unwrap_err();
        assert!(matches!(err, PrepareError::IncompatibleLink { .. }));
    }

    #[test]
    fn preparing_twice_keeps_the_negotiated_formats() {
        let mut graph = sine_gain_graph();
        graph.prepare(&MemoryLoader::new(), &PrepareParams::default()).unwrap();
        graph.prepare(&MemoryLoader::new(), &PrepareParams::default()).unwrap();
        assert_eq!(graph.format(), Format::float32(8000, 1));
    }

    #[test]
    fn cycle_is_detected() {
        let mut graph = Graph::new("g");
        let a = graph.add_element(Gain::new("a", 1.0));
        let b = graph.add_element(Queue::new("b"));
        graph.link_elements(a, 0, b, 0);
        graph.link_elements(b, 0, a, 0);
        let c = graph.add_element(SineSource::new("sine", Format::float32(8000, 1), 440));
        graph.link_graph(c, 0);
        let err = graph.prepare(&MemoryLoader::new(), &PrepareParams::default()).unwrap_err();
        assert!(matches!(err, PrepareError::Cycle { .. }));
    }

    #[test]
    #[should_panic]
    fn linking_a_taken_port_panics() {
        let mut graph = sine_gain_graph();
        let null = graph.add_element(Null::new("null"));
        graph.link_elements(0, 0, null, 0);
    }

    #[test]
    fn describe_lists_paths() {
        let mut graph = sine_gain_graph();
        graph.add_element(Gain::new("lonely", 1.0));
        let mut paths = graph.describe();
        paths.sort();
        assert_eq!(
            paths,
            vec![
                "lonely:out -> nil".to_string(),
                "sine:out -> gain:in gain:out -> g:port".to_string(),
            ]
        );
    }

    #[test]
    fn commands_reach_named_elements() {
        let mut graph = sine_gain_graph();
        assert!(graph
            .dispatch_command("gain", SetGainCmd { gain: 2.0 }.into())
            .is_ok());
        let cmd = graph
            .dispatch_command("nobody", SetGainCmd { gain: 2.0 }.into())
            .unwrap_err();
        assert_eq!(cmd.name(), "SetGainCmd");
    }
}
