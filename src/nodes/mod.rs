//! Built-in elements
//!
//! Elements are organized by role:
//!
//! ## Sources ([`source`])
//!
//! Originate audio, no inputs:
//! - [`SineSource`] - Test tone, optionally time-bounded
//! - [`ZeroSource`] - Endless silence
//! - [`FileSource`] - Decoded audio file with looping and PCM caching
//! - [`MixerSource`] - Dynamic set of sub-sources controlled by commands
//!
//! ## Effects ([`effect`])
//!
//! One input, one output:
//! - [`Gain`] - Volume control, changed with `SetGainCmd`
//! - [`Delay`] - Holds the stream back for a while
//! - [`Effect`] - Fade in/out over a time window
//! - [`Queue`] - FIFO that keeps the producer running under back-pressure
//! - [`Resampler`] - Float32 sample rate conversion
//!
//! ## Routing ([`route`])
//!
//! - [`Mixer`] - Equal-gain sum of N inputs
//! - [`Splitter`] - Copy one input to N outputs
//! - [`StereoJoiner`], [`StereoSplitter`], [`StereoMaker`] - Channel routing
//! - [`Playlist`] - Play N inputs one after another
//!
//! ## Sinks ([`sink`])
//!
//! - [`Null`] - Discards its input

pub mod effect;
pub mod route;
pub mod sink;
pub mod source;

pub use effect::{Delay, Effect, EffectKind, Gain, Queue, Resampler};
pub use route::{Channel, Mixer, PlayMode, Playlist, RepeatMode, Splitter, StereoJoiner, StereoMaker, StereoSplitter};
pub use sink::Null;
pub use source::{FileSource, MixerSource, SineSource, ZeroSource};
