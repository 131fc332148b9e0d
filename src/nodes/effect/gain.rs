//! Gain/volume control

use core::slice;

use tracing::{debug, warn};

use crate::algo::adjust_gain;
use crate::buffer::BufferAllocator;
use crate::command::{Command, EventQueue};
use crate::element::{random_id, Element, PrepareParams};
use crate::error::PrepareError;
use crate::loader::Loader;
use crate::port::Port;

/// Scales every sample by a gain that can be changed with `SetGainCmd`
///
/// Float streams are not clamped, integer streams saturate at full scale.
pub struct Gain {
    name: String,
    id: String,
    gain: f32,
    inp: Port,
    out: Port,
}

impl Gain {
    pub fn new(name: impl Into<String>, gain: f32) -> Self {
        Self {
            name: name.into(),
            id: random_id(),
            gain,
            inp: Port::new("in"),
            out: Port::new("out"),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    #[inline]
    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }
}

impl Element for Gain {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Gain"
    }

    fn prepare(&mut self, _loader: &dyn Loader, _params: &PrepareParams) -> Result<(), PrepareError> {
        let format = self.inp.format();
        debug!(elem = %self.name, output = %format, "gain prepared");
        self.out.set_format(format);
        Ok(())
    }

    fn process(&mut self, _allocator: &dyn BufferAllocator, _events: &mut EventQueue, _ms: u32) {
        let Some(mut buffer) = self.inp.pull_buffer() else {
            return;
        };
        if !adjust_gain(&mut buffer, self.gain) {
            warn!(elem = %self.name, format = %buffer.format(), "unsupported gain input format");
            return;
        }
        if self.out.push_buffer(buffer).is_err() {
            warn!(elem = %self.name, "gain output overrun");
        }
    }

    fn receive_command(&mut self, cmd: Command) {
        match cmd {
            Command::SetGain(cmd) => {
                debug!(elem = %self.name, gain = cmd.gain, "set gain");
                self.gain = cmd.gain;
            }
            other => panic!("gain '{}' got unexpected command {}", self.name, other.name()),
        }
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
