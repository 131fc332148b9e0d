use klanggraph::algo::{adjust_frame_gain, fade_buffer, mix_buffers};
use klanggraph::{Buffer, BufferHandle, ElementArg, ElementDesc, Format, GraphClass, Port};
use proptest::prelude::*;

fn mono_f32(frames: usize, value: f32) -> BufferHandle {
    let mut buffer = Buffer::with_frames(Format::float32(8000, 1), frames);
    for i in 0..frames {
        buffer.write_frame::<f32, 1>(i, [value]);
    }
    buffer
}

fn sine_desc(id: &str, args: &[(&str, ElementArg)]) -> ElementDesc {
    let mut desc = ElementDesc::from_type("SineSource", "sine").unwrap();
    desc.id = id.to_string();
    desc.args.clear();
    for (name, arg) in args {
        desc.set_arg(*name, arg.clone());
    }
    desc
}

proptest! {
    #[test]
    fn int16_gain_stays_in_full_scale(sample in any::<i16>(), gain in -64.0f32..64.0) {
        let mut frame = [sample, sample];
        adjust_frame_gain(&mut frame, gain);
        for s in frame {
            prop_assert!(s >= -i16::MAX && s <= i16::MAX);
        }
    }

    #[test]
    fn int32_gain_stays_in_full_scale(sample in any::<i32>(), gain in -64.0f32..64.0) {
        let mut frame = [sample];
        adjust_frame_gain(&mut frame, gain);
        prop_assert!(frame[0] >= -i32::MAX && frame[0] <= i32::MAX);
    }

    #[test]
    fn mix_output_has_the_largest_size(lengths in prop::collection::vec(0usize..64, 1..8)) {
        let buffers: Vec<BufferHandle> = lengths.iter().map(|n| mono_f32(*n, 0.25)).collect();
        let largest = buffers.iter().map(|b| b.byte_size()).max().unwrap();
        let mixed = mix_buffers(buffers, 1.0).unwrap();
        prop_assert_eq!(mixed.byte_size(), largest);
    }

    #[test]
    fn fade_cursor_is_continuous(
        first in 0usize..512,
        second in 0usize..512,
        rate in prop::sample::select(vec![8000u32, 22050, 44100, 48000]),
        t0 in 0.0f32..1000.0,
    ) {
        let format = Format::float32(rate, 1);
        let mut a = Buffer::with_frames(format, first);
        let mut b = Buffer::with_frames(format, second);
        let t1 = fade_buffer::<f32, 1>(&mut a, t0, 0.0, 500.0, true);
        let t2 = fade_buffer::<f32, 1>(&mut b, t1, 0.0, 500.0, true);

        let expected = t0 + (first + second) as f32 * 1000.0 / rate as f32;
        prop_assert!((t2 - expected).abs() <= 1e-3 * expected.max(1.0));
    }

    #[test]
    fn hash_ignores_arg_insertion_order(frequency in 1u32..20000, duration in 0u32..10000) {
        let args = [
            ("frequency", ElementArg::Uint(frequency)),
            ("duration", ElementArg::Uint(duration)),
            ("format", ElementArg::Format(Format::int16(44100, 2))),
        ];
        let mut reversed = args.clone();
        reversed.reverse();

        let mut a = GraphClass::new("g").with_id("graph");
        a.add_element(sine_desc("sine", &args));
        a.set_graph_output("sine", "out");
        let mut b = GraphClass::new("g").with_id("graph");
        b.add_element(sine_desc("sine", &reversed));
        b.set_graph_output("sine", "out");
        prop_assert_eq!(a.hash(), b.hash());

        let loaded = GraphClass::from_json(&b.into_json()).unwrap();
        prop_assert_eq!(loaded.hash(), a.hash());
    }
}

#[test]
fn hash_follows_element_order() {
    let gain = |id: &str| {
        let mut desc = ElementDesc::from_type("Gain", "gain").unwrap();
        desc.id = id.to_string();
        desc
    };
    let mut a = GraphClass::new("g").with_id("graph");
    a.add_element(gain("1"));
    a.add_element(gain("2"));
    let mut b = GraphClass::new("g").with_id("graph");
    b.add_element(gain("2"));
    b.add_element(gain("1"));
    assert_ne!(a.hash(), b.hash());
}

#[test]
fn ports_reject_a_second_buffer() {
    let mut port = Port::new("in");
    assert!(!port.has_buffers());
    port.push_buffer(mono_f32(4, 0.5)).unwrap();
    assert!(port.is_full());
    let refused = port.push_buffer(mono_f32(2, 0.5)).unwrap_err();
    assert_eq!(refused.frame_count(), 2);
    assert_eq!(port.pull_buffer().unwrap().frame_count(), 4);
    assert!(port.pull_buffer().is_none());
}
