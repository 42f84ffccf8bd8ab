//! Benchmarks for the analysis and playback pipeline

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use viva_core::{AudioChunk, DEFAULT_SAMPLE_RATE};
use viva_test::{ProducerConfig, Scenario, ScenarioConfig};
use viva_voice::{AnalyzerConfig, ChunkBuffer, SignalAnalyzer};

fn tone(len: usize) -> Vec<f32> {
    let step = 2.0 * std::f32::consts::PI * 220.0 / DEFAULT_SAMPLE_RATE as f32;
    (0..len).map(|i| 0.5 * (step * i as f32).sin()).collect()
}

fn bench_analyze_frame(c: &mut Criterion) {
    let mut analyzer = SignalAnalyzer::new(AnalyzerConfig::default()).unwrap();
    let window = tone(256);

    c.bench_function("analyze_frame_256", |b| {
        b.iter(|| analyzer.analyze(black_box(&window), DEFAULT_SAMPLE_RATE))
    });
}

fn bench_buffer_push_drain(c: &mut Criterion) {
    let chunk = AudioChunk::new(0, tone(2400), DEFAULT_SAMPLE_RATE);

    c.bench_function("buffer_push_drain_16", |b| {
        b.iter(|| {
            let mut buffer = ChunkBuffer::new();
            for i in 0..16 {
                let mut next = chunk.clone();
                next.sequence_index = i;
                let _ = buffer.push(next);
            }
            black_box(buffer.drain().len())
        })
    });
}

fn bench_scenario_session(c: &mut Criterion) {
    let config = ScenarioConfig {
        producer: ProducerConfig {
            chunk_count: 4,
            chunk_duration: Duration::from_millis(250),
            ..Default::default()
        },
        step: Duration::from_millis(4),
        ..Default::default()
    };

    c.bench_function("scenario_session_1s", |b| {
        b.iter(|| {
            let mut scenario = Scenario::new(config.clone()).unwrap();
            let handle = scenario.start("bench").unwrap();
            black_box(scenario.run_to_outcome(handle).played.len())
        })
    });
}

criterion_group!(
    benches,
    bench_analyze_frame,
    bench_buffer_push_drain,
    bench_scenario_session,
);
criterion_main!(benches);
