use core::slice;

use tracing::debug;

use crate::buffer::BufferAllocator;
use crate::command::EventQueue;
use crate::element::{random_id, Element, PrepareParams};
use crate::error::PrepareError;
use crate::loader::Loader;
use crate::port::Port;

/// Swallows everything it is given
pub struct Null {
    name: String,
    id: String,
    inp: Port,
}

impl Null {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: random_id(),
            inp: Port::new("in"),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

impl Element for Null {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Null"
    }

    fn prepare(&mut self, _loader: &dyn Loader, _params: &PrepareParams) -> Result<(), PrepareError> {
        debug!(elem = %self.name, input = %self.inp.format(), "null prepared");
        Ok(())
    }

    fn process(&mut self, _allocator: &dyn BufferAllocator, _events: &mut EventQueue, _ms: u32) {
        self.inp.pull_buffer();
    }

    fn input_ports(&self) -> &[Port] {
        slice::from_ref(&self.inp)
    }

    fn input_ports_mut(&mut self) -> &mut [Port] {
        slice::from_mut(&mut self.inp)
    }
}
