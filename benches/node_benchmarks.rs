use criterion::{black_box, criterion_group, criterion_main, Criterion};
use klanggraph::algo::mix_buffers;
use klanggraph::nodes::{Gain, Mixer, SineSource};
use klanggraph::{
    Buffer, BufferPool, Element, EventQueue, Format, Graph, HeapAllocator, MemoryLoader, PrepareParams,
};

pub fn criterion_benchmark(c: &mut Criterion) {
    let format = Format::float32(48000, 2);

    c.bench_function("SineSource.process()", |b| {
        let mut source = SineSource::new("sine", format, 480);
        source
            .prepare(&MemoryLoader::new(), &PrepareParams::default())
            .unwrap();
        let mut events = EventQueue::new();

        b.iter(|| {
            source.process(&HeapAllocator, &mut events, 10);
            black_box(source.output_ports_mut()[0].pull_buffer());
        })
    });

    c.bench_function("mix_buffers(4 x 10ms)", |b| {
        let buffers: Vec<_> = (0..4).map(|_| Buffer::with_frames(format, 480)).collect();

        b.iter(|| {
            let copies = buffers.iter().map(|buf| buf.duplicate(&HeapAllocator)).collect();
            black_box(mix_buffers(copies, 0.5))
        })
    });

    c.bench_function("Graph.process(sine -> gain -> mixer)", |b| {
        let mut graph = Graph::new("bench");
        let mixer = graph.add_element(Mixer::new("mixer", 2));
        for i in 0..2 {
            let sine = graph.add_element(SineSource::new(format!("sine{}", i), format, 440 + 110 * i as u32));
            let gain = graph.add_element(Gain::new(format!("gain{}", i), 0.5));
            graph.link_elements(sine, 0, gain, 0);
            graph.link_elements(gain, 0, mixer, i);
        }
        graph.link_graph(mixer, 0);
        graph
            .prepare(&MemoryLoader::new(), &PrepareParams::default())
            .unwrap();

        let pool = BufferPool::new(16);
        let mut events = EventQueue::new();
        b.iter(|| {
            graph.process(&pool, &mut events, 10);
            graph.advance(10);
            black_box(graph.output_ports_mut()[0].pull_buffer());
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
