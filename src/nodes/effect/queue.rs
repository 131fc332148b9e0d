use core::slice;
use std::collections::VecDeque;

use tracing::debug;

use crate::buffer::{BufferAllocator, BufferHandle};
use crate::command::EventQueue;
use crate::element::{random_id, Element, PrepareParams};
use crate::error::PrepareError;
use crate::loader::Loader;
use crate::port::Port;

/// Unbounded FIFO between a producer and a consumer
///
/// The queue keeps draining its input while its output is back-pressured,
/// so a stalled consumer does not stall the producer.
pub struct Queue {
    name: String,
    id: String,
    fifo: VecDeque<BufferHandle>,
    inp: Port,
    out: Port,
}

impl Queue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: random_id(),
            fifo: VecDeque::new(),
            inp: Port::new("in"),
            out: Port::new("out"),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fifo.is_empty()
    }
}

impl Element for Queue {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Queue"
    }

    fn prepare(&mut self, _loader: &dyn Loader, _params: &PrepareParams) -> Result<(), PrepareError> {
        let format = self.inp.format();
        debug!(elem = %self.name, output = %format, "queue prepared");
        self.out.set_format(format);
        Ok(())
    }

    fn process(&mut self, _allocator: &dyn BufferAllocator, _events: &mut EventQueue, _ms: u32) {
        if let Some(buffer) = self.inp.pull_buffer() {
            self.fifo.push_back(buffer);
        }
        if self.out.is_full() {
            return;
        }
        if let Some(buffer) = self.fifo.pop_front() {
            if let Err(buffer) = self.out.push_buffer(buffer) {
                self.fifo.push_front(buffer);
            }
        }
    }

    fn shutdown(&mut self) {
        self.fifo.clear();
    }

    fn has_internal_queue(&self) -> bool {
        true
    }

    fn queued_buffers(&self) -> usize {
        self.fifo.len()
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
