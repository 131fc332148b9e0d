use tracing::{debug, warn};

use crate::buffer::BufferAllocator;
use crate::command::EventQueue;
use crate::element::{random_id, Element, PrepareParams};
use crate::error::PrepareError;
use crate::loader::Loader;
use crate::port::Port;

/// Fans one stream out to any number of outputs
///
/// Every output gets its own copy of the data, so downstream elements can
/// modify their buffer independently.
pub struct Splitter {
    name: String,
    id: String,
    inp: [Port; 1],
    outs: Vec<Port>,
}

impl Splitter {
    /// Create a splitter with outputs named `out0`, `out1`, ...
    pub fn new(name: impl Into<String>, num_outs: usize) -> Self {
        Self::with_ports(name, (0..num_outs).map(|i| format!("out{}", i)))
    }

    pub fn with_ports<S: Into<String>>(name: impl Into<String>, outs: impl IntoIterator<Item = S>) -> Self {
        let outs: Vec<Port> = outs.into_iter().map(Port::new).collect();
        debug_assert!(!outs.is_empty(), "splitter needs at least one output port");
        Self {
            name: name.into(),
            id: random_id(),
            inp: [Port::new("in")],
            outs,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

impl Element for Splitter {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Splitter"
    }

    fn prepare(&mut self, _loader: &dyn Loader, _params: &PrepareParams) -> Result<(), PrepareError> {
        let format = self.inp[0].format();
        for out in &mut self.outs {
            out.set_format(format);
        }
        debug!(elem = %self.name, output = %format, outputs = self.outs.len(), "splitter prepared");
        Ok(())
    }

    fn process(&mut self, allocator: &dyn BufferAllocator, _events: &mut EventQueue, _ms: u32) {
        let Some(buffer) = self.inp[0].pull_buffer() else {
            return;
        };
        let Some((last, rest)) = self.outs.split_last_mut() else {
            return;
        };
        for out in rest {
            if out.push_buffer(buffer.duplicate(allocator)).is_err() {
                warn!(elem = %self.name, port = %out.name(), "splitter output overrun");
            }
        }
        if last.push_buffer(buffer).is_err() {
            warn!(elem = %self.name, port = %last.name(), "splitter output overrun");
        }
    }

    fn input_ports(&self) -> &[Port] {
        &self.inp
    }

    fn input_ports_mut(&mut self) -> &mut [Port] {
        &mut self.inp
    }

    fn output_ports(&self) -> &[Port] {
        &self.outs
    }

    fn output_ports_mut(&mut self) -> &mut [Port] {
        &mut self.outs
    }
}
