use core::slice;

use tracing::{debug, warn};

use crate::buffer::BufferAllocator;
use crate::command::EventQueue;
use crate::element::{random_id, Element, PrepareParams};
use crate::error::PrepareError;
use crate::loader::Loader;
use crate::port::Port;

/// Holds the stream back for a number of milliseconds
///
/// Until the countdown reaches zero no input is consumed, which
/// back-pressures the producer.
pub struct Delay {
    name: String,
    id: String,
    delay: u32,
    inp: Port,
    out: Port,
}

impl Delay {
    pub fn new(name: impl Into<String>, delay: u32) -> Self {
        Self {
            name: name.into(),
            id: random_id(),
            delay,
            inp: Port::new("in"),
            out: Port::new("out"),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Milliseconds left before the stream starts flowing
    #[inline]
    pub fn remaining(&self) -> u32 {
        self.delay
    }
}

impl Element for Delay {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Delay"
    }

    fn prepare(&mut self, _loader: &dyn Loader, _params: &PrepareParams) -> Result<(), PrepareError> {
        let format = self.inp.format();
        debug!(elem = %self.name, output = %format, delay = self.delay, "delay prepared");
        self.out.set_format(format);
        Ok(())
    }

    fn process(&mut self, _allocator: &dyn BufferAllocator, _events: &mut EventQueue, _ms: u32) {
        if self.delay > 0 {
            return;
        }
        let Some(buffer) = self.inp.pull_buffer() else {
            return;
        };
        if self.out.push_buffer(buffer).is_err() {
            warn!(elem = %self.name, "delay output overrun");
        }
    }

    fn advance(&mut self, ms: u32) {
        self.delay -= ms.min(self.delay);
    }

    fn input_ports(&self) -> &[Port] {
        slice::from_ref(&self.inp)
    }

    fn input_ports_mut(&mut self) -> &mut [Port] {
        slice::from_mut(&mut self.inp)
    }

    fn output_ports(&self) -> &[Port] {
        slice::from_ref(&self.out)
    }

    fn output_ports_mut(&mut self) -> &mut [Port] {
        slice::from_mut(&mut self.out)
    }
}
