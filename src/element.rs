//! Core element trait and types

use crate::buffer::BufferAllocator;
use crate::command::{Command, EventQueue};
use crate::error::PrepareError;
use crate::loader::Loader;
use crate::port::Port;

/// Options threaded through every `prepare` call
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PrepareParams {
    /// Keep fully decoded PCM of file sources around for reuse
    pub enable_pcm_caching: bool,
}

/// Generate a fresh identifier for an element or a graph
pub fn random_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// A node in the audio processing graph
///
/// The lifecycle is `prepare` once, then any number of `process`/`advance`
/// ticks, then `shutdown`.
///
/// Elements own their ports. Ports are created at construction and their
/// count never changes afterwards.
pub trait Element: Send {
    /// Stable identifier, generated if none was given
    fn id(&self) -> &str;

    /// Human readable label
    fn name(&self) -> &str;

    /// Type string used by the descriptor table, e.g. `"Gain"`
    fn kind(&self) -> &'static str;

    /// Whether this element originates audio
    fn is_source(&self) -> bool {
        false
    }

    /// Whether a source has produced its last buffer
    fn is_source_done(&self) -> bool {
        false
    }

    /// Negotiate output formats from the (already negotiated) input formats
    ///
    /// An error here is fatal to graph construction.
    fn prepare(&mut self, _loader: &dyn Loader, _params: &PrepareParams) -> Result<(), PrepareError> {
        Ok(())
    }

    /// Process `ms` milliseconds worth of audio
    ///
    /// 1. Pull whatever is available on the input ports
    /// 2. Transform it, allocating from `allocator` when new data is produced
    /// 3. Push the results into the output ports
    ///
    /// Must not block. Non-source elements work on whole buffers and mostly
    /// ignore `ms`.
    fn process(&mut self, _allocator: &dyn BufferAllocator, _events: &mut EventQueue, _ms: u32) {}

    /// Move internal timers forward. Called every tick whether or not any
    /// data flowed.
    fn advance(&mut self, _ms: u32) {}

    fn shutdown(&mut self) {}

    /// Apply a command to this element
    ///
    /// The command set of every element type is fixed, so receiving one the
    /// element does not understand is a bug and panics.
    fn receive_command(&mut self, cmd: Command) {
        panic!(
            "element '{}' ({}) got unexpected command {}",
            self.name(),
            self.kind(),
            cmd.name()
        );
    }

    /// Route a command to a descendant named `dest`
    ///
    /// Composite elements search their children, depth first. The command is
    /// handed back if no descendant matched.
    fn dispatch_command(&mut self, _dest: &str, cmd: Command) -> Result<(), Command> {
        Err(cmd)
    }

    /// Elements that buffer internally keep running while their output is
    /// back-pressured.
    fn has_internal_queue(&self) -> bool {
        false
    }

    /// Number of buffers held inside the element, outside of its ports
    fn queued_buffers(&self) -> usize {
        0
    }

    fn input_ports(&self) -> &[Port] {
        &[]
    }

    fn input_ports_mut(&mut self) -> &mut [Port] {
        &mut []
    }

    fn output_ports(&self) -> &[Port] {
        &[]
    }

    fn output_ports_mut(&mut self) -> &mut [Port] {
        &mut []
    }

    #[inline]
    fn num_input_ports(&self) -> usize {
        self.input_ports().len()
    }

    #[inline]
    fn num_output_ports(&self) -> usize {
        self.output_ports().len()
    }

    /// Panics if `index` is out of range
    fn input_port(&self, index: usize) -> &Port {
        &self.input_ports()[index]
    }

    /// Panics if `index` is out of range
    fn output_port(&self, index: usize) -> &Port {
        &self.output_ports()[index]
    }

    fn input_port_mut(&mut self, index: usize) -> &mut Port {
        &mut self.input_ports_mut()[index]
    }

    fn output_port_mut(&mut self, index: usize) -> &mut Port {
        &mut self.output_ports_mut()[index]
    }

    /// Index of the input port called `name`
    fn find_input_port(&self, name: &str) -> Option<usize> {
        self.input_ports().iter().position(|p| p.name() == name)
    }

    /// Index of the output port called `name`
    fn find_output_port(&self, name: &str) -> Option<usize> {
        self.output_ports().iter().position(|p| p.name() == name)
    }
}
