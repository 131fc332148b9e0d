//! Control-plane messages
//!
//! Commands travel from the control side into a live graph, events travel
//! back out. Both are plain data and can cross a thread boundary.

use core::fmt;
use std::collections::VecDeque;

use crate::element::Element;
use crate::nodes::effect::EffectKind;
use crate::nodes::source::SourceEffect;

/// Change the gain of a `Gain` element
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SetGainCmd {
    pub gain: f32,
}

/// Restart an `Effect` element with a new fade window
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SetEffectCmd {
    pub time: u32,
    pub duration: u32,
    pub effect: EffectKind,
}

/// Add a prepared source element to a `MixerSource`
pub struct AddSourceCmd {
    pub src: Box<dyn Element>,
    pub paused: bool,
}

/// Remove all sources of a `MixerSource`, optionally after a delay
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeleteAllSrcCmd {
    pub millisecs: u32,
}

/// Remove one source of a `MixerSource`, optionally after a delay
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeleteSourceCmd {
    pub name: String,
    pub millisecs: u32,
}

/// Pause or resume one source of a `MixerSource`, optionally after a delay
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PauseSourceCmd {
    pub name: String,
    pub paused: bool,
    pub millisecs: u32,
}

/// Drop every delayed command that targets the named source
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CancelSourceCmdCmd {
    pub name: String,
}

/// Attach an effect to one source of a `MixerSource`
pub struct SetSourceEffectCmd {
    pub src: String,
    pub effect: Box<dyn SourceEffect>,
}

pub enum Command {
    SetGain(SetGainCmd),
    SetEffect(SetEffectCmd),
    AddSource(AddSourceCmd),
    DeleteAllSrc(DeleteAllSrcCmd),
    DeleteSource(DeleteSourceCmd),
    PauseSource(PauseSourceCmd),
    CancelSourceCmd(CancelSourceCmdCmd),
    SetSourceEffect(SetSourceEffectCmd),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::SetGain(_) => "SetGainCmd",
            Command::SetEffect(_) => "SetEffectCmd",
            Command::AddSource(_) => "AddSourceCmd",
            Command::DeleteAllSrc(_) => "DeleteAllSrcCmd",
            Command::DeleteSource(_) => "DeleteSourceCmd",
            Command::PauseSource(_) => "PauseSourceCmd",
            Command::CancelSourceCmd(_) => "CancelSourceCmdCmd",
            Command::SetSourceEffect(_) => "SetSourceEffectCmd",
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetGain(cmd) => fmt::Debug::fmt(cmd, f),
            Command::SetEffect(cmd) => fmt::Debug::fmt(cmd, f),
            Command::AddSource(cmd) => f
                .debug_struct("AddSourceCmd")
                .field("src", &cmd.src.name())
                .field("paused", &cmd.paused)
                .finish(),
            Command::DeleteAllSrc(cmd) => fmt::Debug::fmt(cmd, f),
            Command::DeleteSource(cmd) => fmt::Debug::fmt(cmd, f),
            Command::PauseSource(cmd) => fmt::Debug::fmt(cmd, f),
            Command::CancelSourceCmd(cmd) => fmt::Debug::fmt(cmd, f),
            Command::SetSourceEffect(cmd) => f
                .debug_struct("SetSourceEffectCmd")
                .field("src", &cmd.src)
                .field("effect", &cmd.effect.name())
                .finish(),
        }
    }
}

macro_rules! command_from {
    ($($cmd:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$cmd> for Command {
                fn from(cmd: $cmd) -> Self {
                    Command::$variant(cmd)
                }
            }
        )*
    };
}

command_from! {
    SetGainCmd => SetGain,
    SetEffectCmd => SetEffect,
    AddSourceCmd => AddSource,
    DeleteAllSrcCmd => DeleteAllSrc,
    DeleteSourceCmd => DeleteSource,
    PauseSourceCmd => PauseSource,
    CancelSourceCmdCmd => CancelSourceCmd,
    SetSourceEffectCmd => SetSourceEffect,
}

/// A command addressed to an element by name somewhere inside a graph
#[derive(Debug)]
pub struct GraphCommand {
    pub dest: String,
    pub cmd: Command,
}

impl GraphCommand {
    pub fn new(dest: impl Into<String>, cmd: impl Into<Command>) -> Self {
        Self {
            dest: dest.into(),
            cmd: cmd.into(),
        }
    }
}

/// A mixer sub-source finished; the element is handed back
pub struct SourceDoneEvent {
    pub mixer: String,
    pub src: Box<dyn Element>,
}

/// A mixer sub-source effect finished; the effect is handed back
pub struct EffectDoneEvent {
    pub mixer: String,
    pub src: String,
    pub effect: Box<dyn SourceEffect>,
}

pub enum Event {
    SourceDone(SourceDoneEvent),
    EffectDone(EffectDoneEvent),
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::SourceDone(ev) => f
                .debug_struct("SourceDoneEvent")
                .field("mixer", &ev.mixer)
                .field("src", &ev.src.name())
                .finish(),
            Event::EffectDone(ev) => f
                .debug_struct("EffectDoneEvent")
                .field("mixer", &ev.mixer)
                .field("src", &ev.src)
                .field("effect", &ev.effect.name())
                .finish(),
        }
    }
}

pub type EventQueue = VecDeque<Event>;
