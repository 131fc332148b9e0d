//! Klanggraph - tick-driven PCM audio element graph
//!
//! Design principles:
//! - Elements pull from and push to single-slot ports, a full port is back-pressure
//! - Every tick runs `process(ms)` over the elements in dependency order, then `advance(ms)`
//! - Integer samples saturate, float samples are left unclamped
//! - Commands go into a live graph by element name, events come back out
//! - A graph can run ahead of the device on its own thread
//!
//! # Example
//!
//! ```no_run
//! use klanggraph::{Format, Graph, GraphSource, MemoryLoader, PrepareParams, Source};
//! use klanggraph::nodes::{Gain, SineSource};
//!
//! let mut graph = Graph::new("tone");
//! let sine = graph.add_element(SineSource::new("sine", Format::float32(44100, 2), 440));
//! let gain = graph.add_element(Gain::new("gain", 0.5));
//! graph.link_elements(sine, 0, gain, 0);
//! graph.link_graph(gain, 0);
//!
//! let mut source = GraphSource::new(graph);
//! source.prepare(&MemoryLoader::new(), &PrepareParams::default()).unwrap();
//!
//! let mut device = vec![0u8; 4096];
//! let written = source.fill_buffer(&mut device).unwrap();
//! ```

pub mod sample;
pub mod algo;
pub mod format;
pub mod buffer;
pub mod port;
pub mod error;
pub mod loader;
pub mod command;
pub mod element;
pub mod factory;
pub mod graph;
pub mod graph_class;
pub mod source;
pub mod proxy;
pub mod nodes;

pub use buffer::{Buffer, BufferAllocator, BufferFlags, BufferHandle, BufferPool, ElementInfoTag, HeapAllocator, InfoTag};
pub use command::{Command, Event, EventQueue, GraphCommand};
pub use element::{Element, PrepareParams};
pub use error::{CreateError, GraphClassError, MixerError, PrepareError, SourceError};
pub use factory::{create_element, find_element_desc, list_elements, ElementArg, ElementDesc, PortDesc};
pub use format::{Format, SampleType};
pub use graph::{Graph, PortRef};
pub use graph_class::{GraphClass, Link};
pub use loader::{FileLoader, IoStrategy, Loader, MemoryLoader, ReadSeek};
pub use port::Port;
pub use proxy::{ProxyConfig, SourceThreadProxy};
pub use source::{GraphSource, Source};
