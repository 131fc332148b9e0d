//! Time-windowed fades

use core::slice;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::algo::fade_buffer;
use crate::buffer::BufferAllocator;
use crate::command::{Command, EventQueue};
use crate::element::{random_id, Element, PrepareParams};
use crate::error::PrepareError;
use crate::loader::Loader;
use crate::port::Port;
use crate::sample::dispatch_format;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectKind {
    #[default]
    FadeIn,
    FadeOut,
}

impl EffectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EffectKind::FadeIn => "FadeIn",
            EffectKind::FadeOut => "FadeOut",
        }
    }
}

/// Fades the stream in or out over `[time, time + duration)` milliseconds
///
/// Past the window a fade out stays silent and a fade in passes the stream
/// through untouched. `SetEffectCmd` restarts the effect with a new window.
pub struct Effect {
    name: String,
    id: String,
    time: u32,
    duration: u32,
    effect: EffectKind,
    current: f32,
    inp: Port,
    out: Port,
}

impl Effect {
    pub fn new(name: impl Into<String>, time: u32, duration: u32, effect: EffectKind) -> Self {
        Self {
            name: name.into(),
            id: random_id(),
            time,
            duration,
            effect,
            current: 0.0,
            inp: Port::new("in"),
            out: Port::new("out"),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    #[inline]
    pub fn effect(&self) -> EffectKind {
        self.effect
    }

    /// Milliseconds of audio that have passed through since the last restart
    #[inline]
    pub fn current_time(&self) -> f32 {
        self.current
    }

    pub fn set_effect(&mut self, effect: EffectKind, time: u32, duration: u32) {
        self.effect = effect;
        self.time = time;
        self.duration = duration;
        self.current = 0.0;
    }
}

impl Element for Effect {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Effect"
    }

    fn prepare(&mut self, _loader: &dyn Loader, _params: &PrepareParams) -> Result<(), PrepareError> {
        let format = self.inp.format();
        debug!(elem = %self.name, output = %format, effect = self.effect.as_str(), "effect prepared");
        self.out.set_format(format);
        Ok(())
    }

    fn process(&mut self, _allocator: &dyn BufferAllocator, _events: &mut EventQueue, _ms: u32) {
        let Some(mut buffer) = self.inp.pull_buffer() else {
            return;
        };
        let format = buffer.format();
        let start = self.time as f32;
        let duration = self.duration as f32;
        let fade_in = self.effect == EffectKind::FadeIn;

        if self.current >= start + duration {
            if !fade_in {
                buffer.clear();
            }
            self.current += format.frames_to_millis(buffer.frame_count());
        } else {
            let current = self.current;
            match dispatch_format!(format, S, N => fade_buffer::<S, N>(&mut buffer, current, start, duration, fade_in)) {
                Some(time) => self.current = time,
                None => {
                    warn!(elem = %self.name, %format, "unsupported effect input format");
                    return;
                }
            }
        }

        if self.out.push_buffer(buffer).is_err() {
            warn!(elem = %self.name, "effect output overrun");
        }
    }

    fn receive_command(&mut self, cmd: Command) {
        match cmd {
            Command::SetEffect(cmd) => {
                debug!(elem = %self.name, effect = cmd.effect.as_str(), time = cmd.time, duration = cmd.duration, "set effect");
                self.set_effect(cmd.effect, cmd.time, cmd.duration);
            }
            other => panic!("effect '{}' got unexpected command {}", self.name, other.name()),
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
