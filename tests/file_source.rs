use std::path::Path;

use klanggraph::nodes::FileSource;
use klanggraph::{
    ElementArg, ElementDesc, FileLoader, Graph, GraphClass, GraphSource, IoStrategy, PrepareError,
    PrepareParams, SampleType, Source,
};

fn write_wav(path: &Path, frames: usize) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 1000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..frames {
        writer.write_sample((i as i16) * 100).unwrap();
    }
    writer.finalize().unwrap();
}

fn file_class(id: &str, caching: bool) -> GraphClass {
    let mut desc = ElementDesc::from_type("FileSource", "file")
        .unwrap()
        .with_arg("file", ElementArg::String("fs://tone.wav".into()))
        .with_arg("pcm_caching", ElementArg::Bool(caching));
    desc.id = id.to_string();

    let mut class = GraphClass::new("files");
    class.add_element(desc);
    class.set_graph_output(id, "out");
    class
}

fn drain(source: &mut GraphSource) -> usize {
    let mut buf = [0u8; 40];
    let mut total = 0;
    for _ in 0..100 {
        if !source.has_more(total as u64) {
            break;
        }
        total += source.fill_buffer(&mut buf).unwrap();
    }
    total
}

#[test]
fn plays_a_wav_file_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    write_wav(&dir.path().join("tone.wav"), 50);
    let loader = FileLoader::new().with_root(dir.path());

    let info = FileSource::file_info(&loader, "tone.wav").unwrap();
    assert_eq!(info.sample_rate, 1000);
    assert_eq!(info.channels, 1);
    assert_eq!(info.frames, 50);

    let graph = Graph::from_class(&file_class("disk-file", false)).unwrap();
    let mut source = GraphSource::new(graph);
    source.prepare(&loader, &PrepareParams::default()).unwrap();
    assert_eq!(source.sample_type(), SampleType::Float32);

    // 50 frames of mono f32
    assert_eq!(drain(&mut source), 200);
}

#[test]
fn missing_files_fail_prepare() {
    let dir = tempfile::tempdir().unwrap();
    let loader = FileLoader::new().with_root(dir.path());

    let mut graph = Graph::from_class(&file_class("missing-file", false)).unwrap();
    match graph.prepare(&loader, &PrepareParams::default()) {
        Err(PrepareError::Element { source, .. }) => {
            assert!(matches!(*source, PrepareError::Open { .. }))
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn preloaded_files_play_from_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    write_wav(&path, 50);
    let loader = FileLoader::new().with_root(dir.path());
    let params = PrepareParams {
        enable_pcm_caching: true,
    };

    let class = file_class("cached-file", true);
    class.preload(&loader, &params);
    std::fs::remove_file(&path).unwrap();

    let mut source = GraphSource::new(Graph::from_class(&class).unwrap());
    source.prepare(&loader, &params).unwrap();
    assert_eq!(drain(&mut source), 200);
}

#[test]
fn cached_files_outlive_the_file_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.wav");
    write_wav(&path, 30);
    let loader = FileLoader::new().with_root(dir.path());

    let mut desc = ElementDesc::from_type("FileSource", "file")
        .unwrap()
        .with_arg("file", ElementArg::String("fs://shared.wav".into()))
        .with_arg("file_caching", ElementArg::Bool(true))
        .with_arg("io_strategy", ElementArg::IoStrategy(IoStrategy::Stream));
    desc.id = "shared-file".to_string();
    let mut class = GraphClass::new("shared");
    class.add_element(desc);
    class.set_graph_output("shared-file", "out");

    let mut first = GraphSource::new(Graph::from_class(&class).unwrap());
    first.prepare(&loader, &PrepareParams::default()).unwrap();
    assert_eq!(loader.cached_files(), 1);
    std::fs::remove_file(&path).unwrap();

    // a clone shares the cache
    let mut second = GraphSource::new(Graph::from_class(&class).unwrap());
    second.prepare(&loader.clone(), &PrepareParams::default()).unwrap();
    assert_eq!(drain(&mut first), 120);
    assert_eq!(drain(&mut second), 120);

    loader.clear_file_cache();
    assert_eq!(loader.cached_files(), 0);
    let mut third = Graph::from_class(&class).unwrap();
    assert!(third.prepare(&loader, &PrepareParams::default()).is_err());
}

#[test]
fn buffered_reads_match_streamed_reads() {
    let dir = tempfile::tempdir().unwrap();
    write_wav(&dir.path().join("tone.wav"), 50);
    let loader = FileLoader::new()
        .with_root(dir.path())
        .with_default_io(IoStrategy::Buffer);

    let graph = Graph::from_class(&file_class("buffered-file", false)).unwrap();
    let mut source = GraphSource::new(graph);
    source.prepare(&loader, &PrepareParams::default()).unwrap();
    assert_eq!(drain(&mut source), 200);
    // buffering without file caching keeps nothing
    assert_eq!(loader.cached_files(), 0);
}
