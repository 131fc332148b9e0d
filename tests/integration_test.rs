use klanggraph::command::{AddSourceCmd, DeleteSourceCmd, SetGainCmd};
use klanggraph::nodes::{Gain, Mixer, MixerSource, Null, Playlist, Queue, SineSource, Splitter, ZeroSource};
use klanggraph::{
    Buffer, BufferHandle, CreateError, Element, ElementArg, ElementDesc, Event, EventQueue, Format, Graph,
    GraphClass, GraphCommand, GraphSource, HeapAllocator, MemoryLoader, MixerError, PrepareError,
    PrepareParams, Source,
};

fn mono_f32(rate: u32, values: &[f32]) -> BufferHandle {
    let mut buffer = Buffer::with_frames(Format::float32(rate, 1), values.len());
    for (i, v) in values.iter().enumerate() {
        buffer.write_frame::<f32, 1>(i, [*v]);
    }
    buffer
}

fn prepared<E: Element>(mut elem: E, input: Format) -> E {
    for port in elem.input_ports_mut() {
        port.set_format(input);
    }
    elem.prepare(&MemoryLoader::new(), &PrepareParams::default()).unwrap();
    elem
}

fn run(elem: &mut dyn Element, ms: u32) {
    let mut events = EventQueue::new();
    elem.process(&HeapAllocator, &mut events, ms);
}

#[test]
fn float_gain_is_not_clamped() {
    let mut gain = prepared(Gain::new("gain", 2.0), Format::float32(8000, 1));
    gain.input_port_mut(0).push_buffer(mono_f32(8000, &[0.6; 10])).unwrap();
    run(&mut gain, 0);

    let out = gain.output_port_mut(0).pull_buffer().unwrap();
    assert_eq!(out.frame_count(), 10);
    for i in 0..10 {
        let [v] = out.read_frame::<f32, 1>(i);
        assert!((v - 1.2).abs() < 1e-6, "frame {} is {}", i, v);
    }
}

#[test]
fn int16_gain_saturates() {
    let format = Format::int16(8000, 1);
    let mut gain = prepared(Gain::new("gain", 2.0), format);

    let mut buffer = Buffer::with_frames(format, 4);
    buffer.write_frame::<i16, 1>(0, [i16::MAX]);
    buffer.write_frame::<i16, 1>(1, [i16::MIN]);
    buffer.write_frame::<i16, 1>(2, [20000]);
    buffer.write_frame::<i16, 1>(3, [100]);
    gain.input_port_mut(0).push_buffer(buffer).unwrap();
    run(&mut gain, 0);

    let out = gain.output_port_mut(0).pull_buffer().unwrap();
    assert_eq!(out.read_frame::<i16, 1>(0), [i16::MAX]);
    assert_eq!(out.read_frame::<i16, 1>(1), [-i16::MAX]);
    assert_eq!(out.read_frame::<i16, 1>(2), [i16::MAX]);
    assert_eq!(out.read_frame::<i16, 1>(3), [200]);
}

#[test]
fn full_port_keeps_its_buffer() {
    let mut gain = Gain::new("gain", 1.0);
    let port = gain.input_port_mut(0);
    port.push_buffer(mono_f32(8000, &[0.25; 2])).unwrap();

    let refused = port.push_buffer(mono_f32(8000, &[0.5; 3])).unwrap_err();
    assert_eq!(refused.frame_count(), 3);
    assert_eq!(port.pull_buffer().unwrap().frame_count(), 2);
}

#[test]
fn mixer_skips_ports_without_data() {
    let mut mixer = prepared(Mixer::new("mixer", 2), Format::float32(8000, 1));
    // 20ms at 8kHz
    mixer.input_port_mut(0).push_buffer(mono_f32(8000, &[0.5; 160])).unwrap();
    run(&mut mixer, 20);

    let out = mixer.output_port_mut(0).pull_buffer().unwrap();
    assert_eq!(out.frame_count(), 160);
    assert_eq!(out.read_frame::<f32, 1>(159), [0.5]);
}

#[test]
fn shorter_mixer_input_ends_early() {
    let mut mixer = prepared(Mixer::new("mixer", 2), Format::float32(8000, 1));
    mixer.input_port_mut(0).push_buffer(mono_f32(8000, &[1.0; 8])).unwrap();
    mixer.input_port_mut(1).push_buffer(mono_f32(8000, &[1.0; 4])).unwrap();
    run(&mut mixer, 1);

    let out = mixer.output_port_mut(0).pull_buffer().unwrap();
    assert_eq!(out.frame_count(), 8);
    assert_eq!(out.read_frame::<f32, 1>(0), [1.0]);
    // only the longer input is left, at half gain
    assert_eq!(out.read_frame::<f32, 1>(7), [0.5]);
}

#[test]
fn mixer_inputs_must_share_a_format() {
    let mut mixer = Mixer::new("mixer", 2);
    mixer.input_port_mut(0).set_format(Format::float32(8000, 1));
    mixer.input_port_mut(1).set_format(Format::float32(8000, 2));
    let err = mixer
        .prepare(&MemoryLoader::new(), &PrepareParams::default())
        .unwrap_err();
    assert!(matches!(err, PrepareError::FormatMismatch { .. }));
}

#[test]
fn mixer_source_rejects_other_formats() {
    let mut mixer = MixerSource::new("mixer", Format::float32(44100, 2));
    let sine = prepared(SineSource::new("sine", Format::int16(44100, 2), 440), Format::default());
    let err = mixer.add_source(Box::new(sine), false).unwrap_err();
    assert_eq!(
        err,
        MixerError::FormatMismatch {
            elem: "sine".into(),
            expected: Format::float32(44100, 2),
            found: Format::int16(44100, 2),
        }
    );

    let gain = Gain::new("gain", 1.0);
    assert_eq!(
        mixer.add_source(Box::new(gain), false).unwrap_err(),
        MixerError::NotASource("gain".into())
    );
    assert!(!mixer.has_source("sine"));
}

#[test]
fn splitter_copies_to_every_output() {
    let mut splitter = prepared(Splitter::new("split", 3), Format::float32(8000, 1));
    splitter.input_port_mut(0).push_buffer(mono_f32(8000, &[0.1, 0.2])).unwrap();
    run(&mut splitter, 0);

    for port in splitter.output_ports_mut() {
        let buffer = port.pull_buffer().unwrap();
        assert_eq!(buffer.read_frame::<f32, 1>(1), [0.2]);
    }
}

#[test]
fn queue_holds_the_graph_open() {
    let mut graph = Graph::new("g");
    let zero = graph.add_element(ZeroSource::new("zero", Format::float32(8000, 1)));
    let queue = graph.add_element(Queue::new("queue"));
    graph.link_elements(zero, 0, queue, 0);
    graph.link_graph(queue, 0);
    graph.prepare(&MemoryLoader::new(), &PrepareParams::default()).unwrap();

    let mut events = EventQueue::new();
    for _ in 0..3 {
        graph.process(&HeapAllocator, &mut events, 10);
    }
    // the graph port holds one buffer, the rest wait in the queue
    assert!(graph.find_element_by_name("queue").unwrap().queued_buffers() > 0);
    assert!(!graph.is_done());
}

fn tone_class(duration: u32) -> GraphClass {
    let mut class = GraphClass::new("tone");
    let sine = ElementDesc::from_type("SineSource", "sine")
        .unwrap()
        .with_arg("format", ElementArg::Format(Format::float32(8000, 1)))
        .with_arg("duration", ElementArg::Uint(duration))
        .with_arg("frequency", ElementArg::Uint(440));
    let gain = ElementDesc::from_type("Gain", "gain")
        .unwrap()
        .with_arg("gain", ElementArg::Float(0.5));
    let sine = class.add_element(sine).id.clone();
    let gain = class.add_element(gain).id.clone();
    class.link(&sine, "out", &gain, "in");
    class.set_graph_output(&gain, "out");
    class
}

#[test]
fn graph_class_plays_after_a_json_round_trip() {
    let class = tone_class(50);
    let json = class.into_json();
    let loaded = GraphClass::from_json(&json).unwrap();
    assert_eq!(loaded.hash(), class.hash());

    let graph = Graph::from_class(&loaded).unwrap();
    assert_eq!(graph.num_elements(), 2);
    assert_eq!(graph.describe(), vec!["sine:out -> gain:in gain:out -> tone:port".to_string()]);

    let mut source = GraphSource::new(graph);
    source
        .prepare(&MemoryLoader::new(), &PrepareParams::default())
        .unwrap();
    assert_eq!(source.format(), Format::float32(8000, 1));

    // 10ms of mono f32 at 8kHz
    let mut device = [0u8; 320];
    let mut total = 0;
    while source.has_more(total as u64) {
        let n = source.fill_buffer(&mut device).unwrap();
        if n == 0 {
            break;
        }
        total += n;
    }
    assert_eq!(total, 50 * 8 * 4);
}

#[test]
fn commands_reach_nested_elements() {
    let mut inner = Graph::new("inner");
    let sine = inner.add_element(SineSource::new("sine", Format::float32(8000, 1), 440));
    let gain = inner.add_element(Gain::new("gain", 1.0));
    inner.link_elements(sine, 0, gain, 0);
    inner.link_graph(gain, 0);
    inner.prepare(&MemoryLoader::new(), &PrepareParams::default()).unwrap();

    let mut mixer = MixerSource::new("mixer", Format::float32(8000, 1));
    mixer.add_source(Box::new(inner), false).unwrap();

    let mut graph = Graph::new("outer");
    let mixer = graph.add_element(mixer);
    graph.link_graph(mixer, 0);
    let mut source = GraphSource::new(graph);
    source
        .prepare(&MemoryLoader::new(), &PrepareParams::default())
        .unwrap();

    source.receive_command(GraphCommand::new("gain", SetGainCmd { gain: 0.0 }));
    let mut device = [0u8; 320];
    source.fill_buffer(&mut device).unwrap();
    assert!(device
        .chunks_exact(4)
        .all(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]) == 0.0));

    source.receive_command(GraphCommand::new(
        "mixer",
        DeleteSourceCmd {
            name: "inner".into(),
            millisecs: 0,
        },
    ));
    let Some(mixer) = source.graph().find_element_by_name("mixer") else {
        panic!("mixer is missing");
    };
    assert!(mixer.is_source_done());
}

#[test]
fn finished_mixer_sources_come_back_as_events() {
    let mut mixer = MixerSource::new("mixer", Format::float32(8000, 1));
    mixer.set_never_done(true);
    let mut graph = Graph::new("g");
    let mixer = graph.add_element(mixer);
    graph.link_graph(mixer, 0);
    let mut source = GraphSource::new(graph);
    source
        .prepare(&MemoryLoader::new(), &PrepareParams::default())
        .unwrap();

    let sine = prepared(
        SineSource::new("beep", Format::float32(8000, 1), 440).with_duration(20),
        Format::default(),
    );
    source.receive_command(GraphCommand::new(
        "mixer",
        AddSourceCmd {
            src: Box::new(sine),
            paused: false,
        },
    ));

    let mut device = [0u8; 320];
    for _ in 0..3 {
        source.fill_buffer(&mut device).unwrap();
    }
    match source.next_event() {
        Some(Event::SourceDone(done)) => {
            assert_eq!(done.mixer, "mixer");
            assert_eq!(done.src.name(), "beep");
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(source.has_more(0));
}

#[test]
fn playlist_plays_inputs_in_order() {
    let mut graph = Graph::new("g");
    let a = graph.add_element(SineSource::new("a", Format::float32(8000, 1), 440).with_duration(10));
    let b = graph.add_element(SineSource::new("b", Format::float32(8000, 1), 880).with_duration(10));
    let list = graph.add_element(Playlist::new("list", 2));
    graph.link_elements(a, 0, list, 0);
    graph.link_elements(b, 0, list, 1);
    graph.link_graph(list, 0);
    graph.prepare(&MemoryLoader::new(), &PrepareParams::default()).unwrap();

    let mut events = EventQueue::new();
    let mut frames = 0;
    for _ in 0..20 {
        graph.process(&HeapAllocator, &mut events, 5);
        graph.advance(5);
        if let Some(buffer) = graph.output_port_mut(0).pull_buffer() {
            frames += buffer.frame_count();
        }
        if graph.is_done() {
            break;
        }
    }
    assert_eq!(frames, 160);
}

#[test]
fn unlinked_null_sink_is_harmless() {
    let mut graph = Graph::new("g");
    let zero = graph.add_element(ZeroSource::new("zero", Format::float32(8000, 1)));
    let split = graph.add_element(Splitter::new("split", 2));
    let null = graph.add_element(Null::new("null"));
    graph.link_elements(zero, 0, split, 0);
    graph.link_elements(split, 0, null, 0);
    graph.link_graph(split, 1);
    graph.prepare(&MemoryLoader::new(), &PrepareParams::default()).unwrap();

    let mut events = EventQueue::new();
    for _ in 0..4 {
        graph.process(&HeapAllocator, &mut events, 10);
        assert_eq!(graph.output_port_mut(0).pull_buffer().unwrap().frame_count(), 80);
    }
}

#[test]
fn playlist_waits_for_every_source_of_a_mixed_input() {
    let format = Format::float32(8000, 1);
    let mut graph = Graph::new("g");
    let a = graph.add_element(SineSource::new("a", format, 440).with_duration(10));
    let b = graph.add_element(SineSource::new("b", format, 660).with_duration(20));
    let c = graph.add_element(SineSource::new("c", format, 880).with_duration(10));
    let mixer = graph.add_element(Mixer::new("mixer", 2));
    let list = graph.add_element(Playlist::new("list", 2));
    graph.link_elements(a, 0, mixer, 0);
    graph.link_elements(b, 0, mixer, 1);
    graph.link_elements(mixer, 0, list, 0);
    graph.link_elements(c, 0, list, 1);
    graph.link_graph(list, 0);
    graph.prepare(&MemoryLoader::new(), &PrepareParams::default()).unwrap();

    let mut events = EventQueue::new();
    let mut frames = 0;
    for _ in 0..40 {
        graph.process(&HeapAllocator, &mut events, 5);
        graph.advance(5);
        if let Some(buffer) = graph.output_port_mut(0).pull_buffer() {
            frames += buffer.frame_count();
        }
        if graph.is_done() {
            break;
        }
    }
    // 20ms of the mixed input, then 10ms of the second input
    assert_eq!(frames, 240);
}

#[test]
fn stored_mixer_without_inputs_is_a_create_error() {
    let mut class = GraphClass::new("g");
    let mut desc = ElementDesc::from_type("Mixer", "mixer")
        .unwrap()
        .with_arg("num_srcs", ElementArg::Uint(0));
    desc.input_ports.clear();
    let id = desc.id.clone();
    class.add_element(desc);
    class.set_graph_output(id, "out");

    let loaded = GraphClass::from_json(&class.into_json()).unwrap();
    assert!(loaded.elements()[0].input_ports.is_empty());
    match Graph::from_class(&loaded) {
        Err(CreateError::NoPorts { elem, .. }) => assert_eq!(elem, "mixer"),
        Err(other) => panic!("unexpected error {}", other),
        Ok(_) => panic!("a mixer without inputs was created"),
    }
}
