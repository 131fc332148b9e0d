//! Elements that transform a single stream

mod delay;
mod effect;
mod gain;
mod queue;
mod resampler;

pub use delay::Delay;
pub use effect::{Effect, EffectKind};
pub use gain::Gain;
pub use queue::Queue;
pub use resampler::{LinearConverter, Resampler, SampleRateConverter};
