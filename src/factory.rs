//! Element descriptors and the type-string factory
//!
//! Every element type has a static descriptor listing its arguments with
//! their default values and its ports. A persisted graph only stores the
//! arguments it knows about, anything missing keeps the default.

use core::hash::{Hash, Hasher};
use std::sync::OnceLock;

use hashbrown::HashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::element::{random_id, Element};
use crate::error::CreateError;
use crate::format::{Format, SampleType};
use crate::loader::IoStrategy;
use crate::nodes::effect::{Delay, Effect, EffectKind, Gain, Queue, Resampler};
use crate::nodes::route::{
    Channel, Mixer, PlayMode, Playlist, RepeatMode, Splitter, StereoJoiner, StereoMaker,
    StereoSplitter,
};
use crate::nodes::sink::Null;
use crate::nodes::source::{FileSource, SineSource, ZeroSource};

/// Value of one element argument
///
/// The variant of an argument is fixed by the descriptor table.
#[derive(Clone, Debug, PartialEq)]
pub enum ElementArg {
    Bool(bool),
    Uint(u32),
    Float(f32),
    String(String),
    Format(Format),
    SampleType(SampleType),
    Effect(EffectKind),
    Channel(Channel),
    PlayMode(PlayMode),
    RepeatMode(RepeatMode),
    IoStrategy(IoStrategy),
}

impl Hash for ElementArg {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            ElementArg::Bool(v) => v.hash(state),
            ElementArg::Uint(v) => v.hash(state),
            ElementArg::Float(v) => v.to_bits().hash(state),
            ElementArg::String(v) => v.hash(state),
            ElementArg::Format(v) => v.hash(state),
            ElementArg::SampleType(v) => v.hash(state),
            ElementArg::Effect(v) => v.hash(state),
            ElementArg::Channel(v) => v.hash(state),
            ElementArg::PlayMode(v) => v.hash(state),
            ElementArg::RepeatMode(v) => v.hash(state),
            ElementArg::IoStrategy(v) => v.hash(state),
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_default()
}

fn read_value<T: DeserializeOwned>(slot: &mut T, value: &Value) -> bool {
    match serde_json::from_value(value.clone()) {
        Ok(v) => {
            *slot = v;
            true
        }
        Err(_) => false,
    }
}

impl ElementArg {
    pub fn to_json(&self) -> Value {
        match self {
            ElementArg::Bool(v) => Value::Bool(*v),
            ElementArg::Uint(v) => Value::from(*v),
            ElementArg::Float(v) => Value::from(*v),
            ElementArg::String(v) => Value::String(v.clone()),
            ElementArg::Format(v) => to_value(v),
            ElementArg::SampleType(v) => to_value(v),
            ElementArg::Effect(v) => to_value(v),
            ElementArg::Channel(v) => to_value(v),
            ElementArg::PlayMode(v) => to_value(v),
            ElementArg::RepeatMode(v) => to_value(v),
            ElementArg::IoStrategy(v) => to_value(v),
        }
    }

    /// Overwrite the value from `value`, keeping the current variant
    ///
    /// Returns false and leaves the argument untouched if `value` does not
    /// hold the right type.
    pub fn read_json(&mut self, value: &Value) -> bool {
        match self {
            ElementArg::Bool(v) => value.as_bool().map(|b| *v = b).is_some(),
            ElementArg::Uint(v) => value
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(|n| *v = n)
                .is_some(),
            ElementArg::Float(v) => value.as_f64().map(|f| *v = f as f32).is_some(),
            ElementArg::String(v) => value.as_str().map(|s| *v = s.to_string()).is_some(),
            ElementArg::Format(v) => read_value(v, value),
            ElementArg::SampleType(v) => read_value(v, value),
            ElementArg::Effect(v) => read_value(v, value),
            ElementArg::Channel(v) => read_value(v, value),
            ElementArg::PlayMode(v) => read_value(v, value),
            ElementArg::RepeatMode(v) => read_value(v, value),
            ElementArg::IoStrategy(v) => read_value(v, value),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PortDesc {
    pub name: String,
}

impl PortDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Blueprint of a single element inside a graph class
#[derive(Clone, Debug, PartialEq)]
pub struct ElementDesc {
    pub id: String,
    pub name: String,
    /// Type string, e.g. `"Gain"`
    pub kind: String,
    pub args: HashMap<String, ElementArg>,
    pub input_ports: Vec<PortDesc>,
    pub output_ports: Vec<PortDesc>,
}

impl ElementDesc {
    /// A descriptor of type `kind` with default arguments and a fresh id
    pub fn from_type(kind: &str, name: impl Into<String>) -> Result<Self, CreateError> {
        let mut desc = find_element_desc(kind)
            .cloned()
            .ok_or_else(|| CreateError::UnknownType(kind.to_string()))?;
        desc.id = random_id();
        desc.name = name.into();
        Ok(desc)
    }

    pub fn with_arg(mut self, name: impl Into<String>, arg: ElementArg) -> Self {
        self.set_arg(name, arg);
        self
    }

    pub fn arg(&self, name: &str) -> Option<&ElementArg> {
        self.args.get(name)
    }

    /// Set an argument. Changing `num_srcs` of a Mixer or `num_outs` of a
    /// Splitter regenerates the matching port list.
    pub fn set_arg(&mut self, name: impl Into<String>, arg: ElementArg) {
        let name = name.into();
        match (self.kind.as_str(), name.as_str(), &arg) {
            ("Mixer", "num_srcs", ElementArg::Uint(n)) => self.input_ports = numbered_ports("in", *n),
            ("Splitter", "num_outs", ElementArg::Uint(n)) => self.output_ports = numbered_ports("out", *n),
            _ => {}
        }
        self.args.insert(name, arg);
    }
}

fn numbered_ports(prefix: &str, count: u32) -> Vec<PortDesc> {
    (0..count).map(|i| PortDesc::new(format!("{}{}", prefix, i))).collect()
}

const ELEMENT_TYPES: [&str; 15] = [
    "SineSource",
    "ZeroSource",
    "FileSource",
    "Resampler",
    "Effect",
    "Gain",
    "Null",
    "StereoSplitter",
    "StereoJoiner",
    "StereoMaker",
    "Splitter",
    "Mixer",
    "Delay",
    "Playlist",
    "Queue",
];

fn desc(kind: &str, args: Vec<(&str, ElementArg)>, ins: &[&str], outs: &[&str]) -> ElementDesc {
    ElementDesc {
        id: String::new(),
        name: String::new(),
        kind: kind.to_string(),
        args: args
            .into_iter()
            .map(|(name, arg)| (name.to_string(), arg))
            .collect(),
        input_ports: ins.iter().copied().map(PortDesc::new).collect(),
        output_ports: outs.iter().copied().map(PortDesc::new).collect(),
    }
}

fn descriptor_table() -> &'static HashMap<&'static str, ElementDesc> {
    static TABLE: OnceLock<HashMap<&'static str, ElementDesc>> = OnceLock::new();
    TABLE.get_or_init(|| {
        use ElementArg as A;
        let stereo = A::Format(Format::float32(44100, 2));
        let descs = [
            desc(
                "SineSource",
                vec![
                    ("frequency", A::Uint(2000)),
                    ("duration", A::Uint(0)),
                    ("format", stereo.clone()),
                ],
                &[],
                &["out"],
            ),
            desc("ZeroSource", vec![("format", stereo)], &[], &["out"]),
            desc(
                "FileSource",
                vec![
                    ("file", A::String(String::new())),
                    ("type", A::SampleType(SampleType::Float32)),
                    ("loops", A::Uint(1)),
                    ("pcm_caching", A::Bool(false)),
                    ("file_caching", A::Bool(false)),
                    ("io_strategy", A::IoStrategy(IoStrategy::Default)),
                ],
                &[],
                &["out"],
            ),
            desc("Resampler", vec![("sample_rate", A::Uint(44100))], &["in"], &["out"]),
            desc(
                "Effect",
                vec![
                    ("time", A::Uint(0)),
                    ("duration", A::Uint(0)),
                    ("effect", A::Effect(EffectKind::FadeIn)),
                ],
                &["in"],
                &["out"],
            ),
            desc("Gain", vec![("gain", A::Float(1.0))], &["in"], &["out"]),
            desc("Null", vec![], &["in"], &[]),
            desc("StereoSplitter", vec![], &["in"], &["left", "right"]),
            desc("StereoJoiner", vec![], &["left", "right"], &["out"]),
            desc("StereoMaker", vec![("channel", A::Channel(Channel::Both))], &["in"], &["out"]),
            desc("Splitter", vec![("num_outs", A::Uint(2))], &["in"], &["out0", "out1"]),
            desc("Mixer", vec![("num_srcs", A::Uint(2))], &["in0", "in1"], &["out"]),
            desc("Delay", vec![("delay", A::Uint(0))], &["in"], &["out"]),
            desc(
                "Playlist",
                vec![
                    ("play_mode", A::PlayMode(PlayMode::Sequential)),
                    ("repeat_mode", A::RepeatMode(RepeatMode::PlayAll)),
                ],
                &["in0", "in1"],
                &["out"],
            ),
            desc("Queue", vec![], &["in"], &["out"]),
        ];
        ELEMENT_TYPES.iter().copied().zip(descs).collect()
    })
}

/// Static descriptor of element type `kind`
pub fn find_element_desc(kind: &str) -> Option<&'static ElementDesc> {
    descriptor_table().get(kind)
}

/// Every element type the factory can create
pub fn list_elements() -> &'static [&'static str] {
    &ELEMENT_TYPES
}

trait FromArg: Sized {
    fn from_arg(arg: &ElementArg) -> Option<Self>;
}

macro_rules! from_arg {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromArg for $ty {
                fn from_arg(arg: &ElementArg) -> Option<Self> {
                    match arg {
                        ElementArg::$variant(v) => Some(v.clone()),
                        _ => None,
                    }
                }
            }
        )*
    };
}

from_arg! {
    bool => Bool,
    u32 => Uint,
    f32 => Float,
    String => String,
    Format => Format,
    SampleType => SampleType,
    EffectKind => Effect,
    Channel => Channel,
    PlayMode => PlayMode,
    RepeatMode => RepeatMode,
    IoStrategy => IoStrategy,
}

fn arg<T: FromArg>(desc: &ElementDesc, name: &str) -> Result<T, CreateError> {
    let value = desc.args.get(name).ok_or_else(|| CreateError::MissingArg {
        elem: desc.name.clone(),
        arg: name.to_string(),
    })?;
    T::from_arg(value).ok_or_else(|| CreateError::ArgType {
        elem: desc.name.clone(),
        arg: name.to_string(),
    })
}

// elements with a variable port count need at least one port
fn port_names(desc: &ElementDesc, ports: &[PortDesc], direction: &str) -> Result<Vec<String>, CreateError> {
    if ports.is_empty() {
        return Err(CreateError::NoPorts {
            elem: desc.name.clone(),
            kind: desc.kind.clone(),
            direction: direction.to_string(),
        });
    }
    Ok(ports.iter().map(|p| p.name.clone()).collect())
}

/// Build a runtime element from its descriptor
pub fn create_element(desc: &ElementDesc) -> Result<Box<dyn Element>, CreateError> {
    let name = desc.name.clone();
    let id = desc.id.clone();

    let elem: Box<dyn Element> = match desc.kind.as_str() {
        "SineSource" => Box::new(
            SineSource::new(name, arg(desc, "format")?, arg(desc, "frequency")?)
                .with_duration(arg(desc, "duration")?)
                .with_id(id),
        ),
        "ZeroSource" => Box::new(ZeroSource::new(name, arg(desc, "format")?).with_id(id)),
        "FileSource" => Box::new(
            FileSource::new(name, arg::<String>(desc, "file")?, arg(desc, "type")?)
                .with_loops(arg(desc, "loops")?)
                .with_pcm_caching(arg(desc, "pcm_caching")?)
                .with_file_caching(arg(desc, "file_caching")?)
                .with_io_strategy(arg(desc, "io_strategy")?)
                .with_id(id),
        ),
        "Resampler" => Box::new(Resampler::new(name, arg(desc, "sample_rate")?).with_id(id)),
        "Effect" => Box::new(
            Effect::new(
                name,
                arg(desc, "time")?,
                arg(desc, "duration")?,
                arg(desc, "effect")?,
            )
            .with_id(id),
        ),
        "Gain" => Box::new(Gain::new(name, arg(desc, "gain")?).with_id(id)),
        "Null" => Box::new(Null::new(name).with_id(id)),
        "StereoSplitter" => Box::new(StereoSplitter::new(name).with_id(id)),
        "StereoJoiner" => Box::new(StereoJoiner::new(name).with_id(id)),
        "StereoMaker" => Box::new(StereoMaker::new(name, arg(desc, "channel")?).with_id(id)),
        "Splitter" => {
            let outs = port_names(desc, &desc.output_ports, "output")?;
            Box::new(Splitter::with_ports(name, outs).with_id(id))
        }
        "Mixer" => {
            let ins = port_names(desc, &desc.input_ports, "input")?;
            Box::new(Mixer::with_ports(name, ins).with_id(id))
        }
        "Delay" => Box::new(Delay::new(name, arg(desc, "delay")?).with_id(id)),
        "Playlist" => {
            let ins = port_names(desc, &desc.input_ports, "input")?;
            Box::new(
                Playlist::with_ports(name, ins)
                    .with_play_mode(arg(desc, "play_mode")?)
                    .with_repeat_mode(arg(desc, "repeat_mode")?)
                    .with_id(id),
            )
        }
        "Queue" => Box::new(Queue::new(name).with_id(id)),
        other => return Err(CreateError::UnknownType(other.to_string())),
    };
    Ok(elem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_type_has_a_descriptor() {
        for kind in list_elements() {
            let desc = ElementDesc::from_type(kind, "elem").unwrap();
            assert_eq!(desc.kind, *kind);
            let elem = create_element(&desc).unwrap();
            assert_eq!(elem.kind(), *kind);
            assert_eq!(elem.id(), desc.id);
            assert_eq!(elem.num_input_ports(), desc.input_ports.len());
            assert_eq!(elem.num_output_ports(), desc.output_ports.len());
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert_eq!(
            ElementDesc::from_type("Reverb", "r").unwrap_err(),
            CreateError::UnknownType("Reverb".into())
        );
    }

    #[test]
    fn mistyped_arg_is_reported() {
        let desc = ElementDesc::from_type("Gain", "g")
            .unwrap()
            .with_arg("gain", ElementArg::Bool(true));
        assert!(matches!(
            create_element(&desc),
            Err(CreateError::ArgType { .. })
        ));
    }

    #[test]
    fn port_count_args_regenerate_ports() {
        let mixer = ElementDesc::from_type("Mixer", "m")
            .unwrap()
            .with_arg("num_srcs", ElementArg::Uint(3));
        let names: Vec<_> = mixer.input_ports.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["in0", "in1", "in2"]);
        assert_eq!(create_element(&mixer).unwrap().num_input_ports(), 3);

        let mut splitter = ElementDesc::from_type("Splitter", "s").unwrap();
        splitter.set_arg("num_outs", ElementArg::Uint(4));
        assert_eq!(splitter.output_ports.len(), 4);
        assert_eq!(create_element(&splitter).unwrap().num_output_ports(), 4);

        assert!(ElementDesc::from_type("Playlist", "p").unwrap().arg("num_srcs").is_none());
    }

    #[test]
    fn elements_without_ports_are_rejected() {
        for (kind, arg) in [("Mixer", "num_srcs"), ("Splitter", "num_outs")] {
            let desc = ElementDesc::from_type(kind, "empty")
                .unwrap()
                .with_arg(arg, ElementArg::Uint(0));
            assert!(matches!(
                create_element(&desc),
                Err(CreateError::NoPorts { .. })
            ));
        }

        let mut playlist = ElementDesc::from_type("Playlist", "empty").unwrap();
        playlist.input_ports.clear();
        assert!(matches!(
            create_element(&playlist),
            Err(CreateError::NoPorts { .. })
        ));
    }

    #[test]
    fn file_source_io_args() {
        let desc = ElementDesc::from_type("FileSource", "f")
            .unwrap()
            .with_arg("io_strategy", ElementArg::IoStrategy(IoStrategy::Buffer))
            .with_arg("file_caching", ElementArg::Bool(true));
        assert_eq!(create_element(&desc).unwrap().kind(), "FileSource");

        let mut arg = ElementArg::IoStrategy(IoStrategy::Default);
        assert!(arg.read_json(&ElementArg::IoStrategy(IoStrategy::Stream).to_json()));
        assert_eq!(arg, ElementArg::IoStrategy(IoStrategy::Stream));
    }

    #[test]
    fn read_json_keeps_variant() {
        let mut arg = ElementArg::Uint(3);
        assert!(!arg.read_json(&Value::String("x".into())));
        assert_eq!(arg, ElementArg::Uint(3));
        assert!(arg.read_json(&Value::from(7)));
        assert_eq!(arg, ElementArg::Uint(7));

        let mut arg = ElementArg::Channel(Channel::Both);
        assert!(arg.read_json(&ElementArg::Channel(Channel::Left).to_json()));
        assert_eq!(arg, ElementArg::Channel(Channel::Left));
    }
}
