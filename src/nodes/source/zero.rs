use core::slice;

use tracing::warn;

use crate::buffer::BufferAllocator;
use crate::command::EventQueue;
use crate::element::{random_id, Element, PrepareParams};
use crate::error::PrepareError;
use crate::format::Format;
use crate::loader::Loader;
use crate::port::Port;

/// Endless silence in a fixed format
pub struct ZeroSource {
    name: String,
    id: String,
    format: Format,
    out: Port,
}

impl ZeroSource {
    pub fn new(name: impl Into<String>, format: Format) -> Self {
        Self {
            name: name.into(),
            id: random_id(),
            format,
            out: Port::new("out"),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

impl Element for ZeroSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "ZeroSource"
    }

    fn is_source(&self) -> bool {
        true
    }

    fn prepare(&mut self, _loader: &dyn Loader, _params: &PrepareParams) -> Result<(), PrepareError> {
        if !self.format.is_valid() {
            return Err(PrepareError::UnsupportedFormat {
                elem: self.name.clone(),
                format: self.format,
            });
        }
        self.out.set_format(self.format);
        Ok(())
    }

    fn process(&mut self, allocator: &dyn BufferAllocator, _events: &mut EventQueue, ms: u32) {
        let bytes = self.format.frame_size() * self.format.frames_in_millis(ms);
        let mut buffer = allocator.allocate(bytes);
        buffer.set_format(self.format);
        buffer.set_byte_size(bytes);
        buffer.clear();
        if self.out.push_buffer(buffer).is_err() {
            warn!(elem = %self.name, "zero source output overrun");
        }
    }

    fn output_ports(&self) -> &[Port] {
        slice::from_ref(&self.out)
    }

    fn output_ports_mut(&mut self) -> &mut [Port] {
        slice::from_mut(&mut self.out)
    }
}
