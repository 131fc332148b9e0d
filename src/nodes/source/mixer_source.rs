//! Dynamic mixing of independently controlled sources

use core::slice;

use hashbrown::HashMap;
use tracing::{debug, trace_span, warn};

use crate::algo::{fade_buffer, mix_buffers};
use crate::buffer::{Buffer, BufferAllocator, BufferHandle};
use crate::command::{
    Command, DeleteAllSrcCmd, DeleteSourceCmd, EffectDoneEvent, Event, EventQueue, PauseSourceCmd,
    SourceDoneEvent,
};
use crate::element::{random_id, Element, PrepareParams};
use crate::error::{MixerError, PrepareError};
use crate::format::Format;
use crate::loader::Loader;
use crate::port::Port;
use crate::sample::dispatch_format;

/// A per-source effect applied by a [`MixerSource`] before mixing
pub trait SourceEffect: Send {
    fn apply(&mut self, buffer: &mut Buffer);

    fn is_done(&self) -> bool;

    fn name(&self) -> &'static str;
}

struct Fade {
    duration: f32,
    time: f32,
    fade_in: bool,
}

impl Fade {
    fn apply(&mut self, buffer: &mut Buffer) {
        let format = buffer.format();
        let (time, duration, fade_in) = (self.time, self.duration, self.fade_in);
        match dispatch_format!(format, S, N => fade_buffer::<S, N>(buffer, time, 0.0, duration, fade_in)) {
            Some(time) => self.time = time,
            None => warn!(%format, fade_in, "unsupported fade effect buffer format"),
        }
    }
}

/// Ramp the source gain up from 0.0 to 1.0
pub struct FadeIn(Fade);

impl FadeIn {
    pub fn from_millis(ms: u32) -> Self {
        Self(Fade {
            duration: ms as f32,
            time: 0.0,
            fade_in: true,
        })
    }

    pub fn from_secs(seconds: f32) -> Self {
        Self(Fade {
            duration: seconds * 1000.0,
            time: 0.0,
            fade_in: true,
        })
    }
}

impl SourceEffect for FadeIn {
    fn apply(&mut self, buffer: &mut Buffer) {
        self.0.apply(buffer);
    }

    fn is_done(&self) -> bool {
        self.0.time >= self.0.duration
    }

    fn name(&self) -> &'static str {
        "FadeIn"
    }
}

/// Ramp the source gain down from 1.0 to 0.0
pub struct FadeOut(Fade);

impl FadeOut {
    pub fn from_millis(ms: u32) -> Self {
        Self(Fade {
            duration: ms as f32,
            time: 0.0,
            fade_in: false,
        })
    }

    pub fn from_secs(seconds: f32) -> Self {
        Self(Fade {
            duration: seconds * 1000.0,
            time: 0.0,
            fade_in: false,
        })
    }
}

impl SourceEffect for FadeOut {
    fn apply(&mut self, buffer: &mut Buffer) {
        self.0.apply(buffer);
    }

    fn is_done(&self) -> bool {
        self.0.time >= self.0.duration
    }

    fn name(&self) -> &'static str {
        "FadeOut"
    }
}

struct Slot {
    element: Box<dyn Element>,
    effect: Option<Box<dyn SourceEffect>>,
    paused: bool,
}

enum LateCommand {
    Pause(PauseSourceCmd),
    Delete(DeleteSourceCmd),
    DeleteAll(DeleteAllSrcCmd),
}

impl LateCommand {
    fn millisecs(&mut self) -> &mut u32 {
        match self {
            LateCommand::Pause(cmd) => &mut cmd.millisecs,
            LateCommand::Delete(cmd) => &mut cmd.millisecs,
            LateCommand::DeleteAll(cmd) => &mut cmd.millisecs,
        }
    }

    fn targets(&self, name: &str) -> bool {
        match self {
            LateCommand::Pause(cmd) => cmd.name == name,
            LateCommand::Delete(cmd) => cmd.name == name,
            LateCommand::DeleteAll(_) => false,
        }
    }
}

/// Wraps any number of source elements into a single source
///
/// Every added source must produce the mixer's format. Sources are addressed
/// by name and controlled through commands, which may be delayed. Finished
/// sources are handed back through a [`SourceDoneEvent`].
pub struct MixerSource {
    name: String,
    id: String,
    format: Format,
    sources: HashMap<String, Slot>,
    commands: Vec<LateCommand>,
    never_done: bool,
    out: Port,
}

impl MixerSource {
    pub fn new(name: impl Into<String>, format: Format) -> Self {
        let mut out = Port::new("out");
        out.set_format(format);
        Self {
            name: name.into(),
            id: random_id(),
            format,
            sources: HashMap::new(),
            commands: Vec::new(),
            never_done: false,
            out,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Add a source element keyed by its name
    ///
    /// The element must be a source with at least one output port, and
    /// every output port must carry the mixer's format. A source with the
    /// same name is replaced.
    pub fn add_source(&mut self, source: Box<dyn Element>, paused: bool) -> Result<(), MixerError> {
        if !source.is_source() {
            return Err(MixerError::NotASource(source.name().to_string()));
        }
        if source.num_output_ports() == 0 {
            return Err(MixerError::NoOutputPorts(source.name().to_string()));
        }
        if let Some(port) = source.output_ports().iter().find(|p| p.format() != self.format) {
            return Err(MixerError::FormatMismatch {
                elem: source.name().to_string(),
                expected: self.format,
                found: port.format(),
            });
        }

        let key = source.name().to_string();
        debug!(elem = %self.name, source = %key, paused, "add mixer source");
        self.sources.insert(
            key,
            Slot {
                element: source,
                effect: None,
                paused,
            },
        );
        Ok(())
    }

    /// When set the mixer never reports itself done, even with no sources
    pub fn set_never_done(&mut self, on: bool) {
        self.never_done = on;
    }

    pub fn cancel_source_commands(&mut self, name: &str) {
        let mut i = 0;
        while i < self.commands.len() {
            if self.commands[i].targets(name) {
                self.commands.swap_remove(i);
            } else {
                i += 1;
            }
        }
    }

    pub fn delete_source(&mut self, name: &str) {
        if self.sources.remove(name).is_some() {
            debug!(elem = %self.name, source = %name, "delete mixer source");
        }
    }

    pub fn delete_sources(&mut self) {
        self.sources.clear();
        debug!(elem = %self.name, "delete all mixer sources");
    }

    pub fn pause_source(&mut self, name: &str, paused: bool) {
        if let Some(slot) = self.sources.get_mut(name) {
            slot.paused = paused;
            debug!(elem = %self.name, source = %name, paused, "pause mixer source");
        }
    }

    /// Replace the effect of the named source. Takes effect immediately.
    pub fn set_source_effect(&mut self, name: &str, effect: Box<dyn SourceEffect>) {
        if let Some(slot) = self.sources.get_mut(name) {
            debug!(elem = %self.name, source = %name, effect = effect.name(), "set mixer source effect");
            slot.effect = Some(effect);
        }
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn has_source(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    pub fn is_paused(&self, name: &str) -> Option<bool> {
        self.sources.get(name).map(|slot| slot.paused)
    }

    /// Number of delayed commands still waiting to run
    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    fn execute(&mut self, cmd: LateCommand) {
        match cmd {
            LateCommand::Pause(cmd) => self.pause_source(&cmd.name, cmd.paused),
            LateCommand::Delete(cmd) => self.delete_source(&cmd.name),
            LateCommand::DeleteAll(_) => self.delete_sources(),
        }
    }

    fn remove_done_effects(&mut self, events: &mut EventQueue) {
        for (key, slot) in self.sources.iter_mut() {
            if !slot.effect.as_ref().is_some_and(|e| e.is_done()) {
                continue;
            }
            if let Some(effect) = slot.effect.take() {
                debug!(elem = %self.name, source = %key, effect = effect.name(), "mixer source effect is done");
                events.push_back(Event::EffectDone(EffectDoneEvent {
                    mixer: self.name.clone(),
                    src: slot.element.name().to_string(),
                    effect,
                }));
            }
        }
    }

    fn remove_done_sources(&mut self, events: &mut EventQueue) {
        let done: Vec<String> = self
            .sources
            .iter()
            .filter(|(_, slot)| slot.element.is_source_done())
            .map(|(key, _)| key.clone())
            .collect();

        for key in done {
            if let Some(mut slot) = self.sources.remove(&key) {
                slot.element.shutdown();
                debug!(elem = %self.name, source = %key, "mixer source is done");
                events.push_back(Event::SourceDone(SourceDoneEvent {
                    mixer: self.name.clone(),
                    src: slot.element,
                }));
            }
        }
    }
}

impl Element for MixerSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "MixerSource"
    }

    fn is_source(&self) -> bool {
        true
    }

    fn is_source_done(&self) -> bool {
        !self.never_done && self.sources.values().all(|slot| slot.element.is_source_done())
    }

    fn prepare(&mut self, _loader: &dyn Loader, _params: &PrepareParams) -> Result<(), PrepareError> {
        debug!(elem = %self.name, output = %self.format, "mixer source prepared");
        Ok(())
    }

    fn process(&mut self, allocator: &dyn BufferAllocator, events: &mut EventQueue, ms: u32) {
        let _span = trace_span!("MixerSource::process", elem = %self.name).entered();

        let mut buffers: Vec<BufferHandle> = Vec::new();
        for slot in self.sources.values_mut() {
            if slot.paused || slot.element.is_source_done() {
                continue;
            }
            slot.element.process(allocator, events, ms);
            for port in slot.element.output_ports_mut() {
                if let Some(mut buffer) = port.pull_buffer() {
                    if let Some(effect) = slot.effect.as_mut() {
                        effect.apply(&mut buffer);
                    }
                    buffers.push(buffer);
                }
            }
        }
        self.remove_done_effects(events);
        self.remove_done_sources(events);

        let out = match buffers.len() {
            0 => return,
            1 => buffers.pop(),
            _ => {
                let _span = trace_span!("MixBuffers").entered();
                mix_buffers(buffers, 1.0)
            }
        };
        let Some(out) = out else {
            warn!(elem = %self.name, format = %self.format, "mixer source output format is unsupported");
            return;
        };
        if self.out.push_buffer(out).is_err() {
            warn!(elem = %self.name, "mixer source output overrun");
        }
    }

    fn advance(&mut self, ms: u32) {
        let mut i = 0;
        while i < self.commands.len() {
            let millisecs = self.commands[i].millisecs();
            *millisecs -= ms.min(*millisecs);
            if *millisecs == 0 {
                let cmd = self.commands.swap_remove(i);
                self.execute(cmd);
            } else {
                i += 1;
            }
        }

        for slot in self.sources.values_mut() {
            slot.element.advance(ms);
        }
    }

    fn shutdown(&mut self) {
        for slot in self.sources.values_mut() {
            slot.element.shutdown();
        }
    }

    fn receive_command(&mut self, cmd: Command) {
        match cmd {
            Command::AddSource(cmd) => {
                let name = cmd.src.name().to_string();
                if let Err(e) = self.add_source(cmd.src, cmd.paused) {
                    warn!(elem = %self.name, source = %name, error = %e, "rejected mixer source");
                }
            }
            Command::CancelSourceCmd(cmd) => self.cancel_source_commands(&cmd.name),
            Command::SetSourceEffect(cmd) => self.set_source_effect(&cmd.src, cmd.effect),
            Command::DeleteSource(cmd) if cmd.millisecs > 0 => self.commands.push(LateCommand::Delete(cmd)),
            Command::DeleteSource(cmd) => self.delete_source(&cmd.name),
            Command::PauseSource(cmd) if cmd.millisecs > 0 => self.commands.push(LateCommand::Pause(cmd)),
            Command::PauseSource(cmd) => self.pause_source(&cmd.name, cmd.paused),
            Command::DeleteAllSrc(cmd) if cmd.millisecs > 0 => self.commands.push(LateCommand::DeleteAll(cmd)),
            Command::DeleteAllSrc(_) => self.delete_sources(),
            other => panic!("mixer source '{}' got unexpected command {}", self.name, other.name()),
        }
    }

    fn dispatch_command(&mut self, dest: &str, cmd: Command) -> Result<(), Command> {
        if let Some(slot) = self.sources.values_mut().find(|slot| slot.element.name() == dest) {
            slot.element.receive_command(cmd);
            return Ok(());
        }
        let mut cmd = cmd;
        for slot in self.sources.values_mut() {
            match slot.element.dispatch_command(dest, cmd) {
                Ok(()) => return Ok(()),
                Err(returned) => cmd = returned,
            }
        }
        Err(cmd)
    }

    fn output_ports(&self) -> &[Port] {
        slice::from_ref(&self.out)
    }

    fn output_ports_mut(&mut self) -> &mut [Port] {
        slice::from_mut(&mut self.out)
    }
}
