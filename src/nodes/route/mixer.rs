use tracing::{debug, trace_span, warn};

use crate::algo::mix_buffers;
use crate::buffer::{BufferAllocator, BufferHandle};
use crate::command::EventQueue;
use crate::element::{random_id, Element, PrepareParams};
use crate::error::PrepareError;
use crate::loader::Loader;
use crate::port::Port;

/// Sums any number of inputs with equal gain
///
/// Only inputs that have a buffer this tick take part, each with gain
/// `1 / count`. An input without data never stalls the mixer. The output is
/// only gap free when all inputs deliver buffers of the same duration.
pub struct Mixer {
    name: String,
    id: String,
    ins: Vec<Port>,
    out: [Port; 1],
}

impl Mixer {
    /// Create a mixer with inputs named `in0`, `in1`, ...
    pub fn new(name: impl Into<String>, num_srcs: usize) -> Self {
        Self::with_ports(name, (0..num_srcs).map(|i| format!("in{}", i)))
    }

    pub fn with_ports<S: Into<String>>(name: impl Into<String>, ins: impl IntoIterator<Item = S>) -> Self {
        let ins: Vec<Port> = ins.into_iter().map(Port::new).collect();
        debug_assert!(!ins.is_empty(), "mixer needs at least one input port");
        Self {
            name: name.into(),
            id: random_id(),
            ins,
            out: [Port::new("out")],
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

impl Element for Mixer {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Mixer"
    }

    fn prepare(&mut self, _loader: &dyn Loader, _params: &PrepareParams) -> Result<(), PrepareError> {
        let Some(format) = self.ins.first().map(Port::format) else {
            return Err(PrepareError::FormatMismatch {
                elem: self.name.clone(),
                detail: "mixer has no input ports".into(),
            });
        };
        if let Some(port) = self.ins.iter().find(|p| p.format() != format) {
            warn!(elem = %self.name, port = %port.name(), expected = %format, found = %port.format(), "mixer input format mismatch");
            return Err(PrepareError::FormatMismatch {
                elem: self.name.clone(),
                detail: format!("input '{}' is {} but expected {}", port.name(), port.format(), format),
            });
        }
        self.out[0].set_format(format);
        debug!(elem = %self.name, output = %format, "mixer prepared");
        Ok(())
    }

    fn process(&mut self, _allocator: &dyn BufferAllocator, _events: &mut EventQueue, _ms: u32) {
        let _span = trace_span!("Mixer::process", elem = %self.name).entered();

        let buffers: Vec<BufferHandle> = self.ins.iter_mut().filter_map(Port::pull_buffer).collect();
        if buffers.is_empty() {
            return;
        }
        let gain = 1.0 / buffers.len() as f32;
        let Some(out) = mix_buffers(buffers, gain) else {
            warn!(elem = %self.name, "mixer input format is unsupported");
            return;
        };
        if self.out[0].push_buffer(out).is_err() {
            warn!(elem = %self.name, "mixer output overrun");
        }
    }

    fn input_ports(&self) -> &[Port] {
        &self.ins
    }

    fn input_ports_mut(&mut self) -> &mut [Port] {
        &mut self.ins
    }

    fn output_ports(&self) -> &[Port] {
        &self.out
    }

    fn output_ports_mut(&mut self) -> &mut [Port] {
        &mut self.out
    }
}
