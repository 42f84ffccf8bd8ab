//! End-to-end session tests
//!
//! Each test runs the full pipeline (producer, coordinator, playback,
//! analysis, lip sync, render target) on the scenario clock.

use std::io::Cursor;
use std::time::Duration;

use proptest::prelude::*;

use viva_core::{MediaTime, SessionState, VivaError, DEFAULT_SAMPLE_RATE};
use viva_runtime::{RuntimeConfig, SessionOutcome, StreamOptions};
use viva_voice::AnalysisMode;
use viva_wire::ProducerEvent;

use crate::producer::ProducerConfig;
use crate::scenario::{Scenario, ScenarioConfig};
use crate::target::{RecordingTarget, MOUTH_FORM, MOUTH_OPEN};

fn scenario(config: ScenarioConfig) -> Scenario {
    Scenario::new(config).unwrap()
}

#[test]
fn test_three_chunk_tone_session() {
    let mut s = scenario(ScenarioConfig::default());
    let handle = s.start("Hello from the other side").unwrap();
    let report = s.run_to_outcome(handle);

    assert_eq!(report.played, vec![0, 1, 2]);
    assert_eq!(report.audible_time, Duration::from_millis(1500));
    assert!(report.elapsed >= Duration::from_millis(1500));
    assert!(report.elapsed < Duration::from_millis(1700));
    assert!(report.max_open > 0.0);
    assert!(report.nonzero_open_writes > 10);
    assert_eq!(report.final_mouth, (0.0, 0.0));
    assert_eq!(report.motions, 1);
    assert_eq!(report.max_concurrent, 1);
    assert_eq!(report.credits_sent, 3);

    // The mouth moves throughout every chunk, not just the first
    for index in 0..3 {
        let frames = report.frames_by_chunk.get(&index).copied().unwrap_or(0);
        let open = report.open_frames_by_chunk.get(&index).copied().unwrap_or(0);
        assert!(frames >= 20, "chunk {index}: {frames} frames");
        assert!(open * 10 >= frames * 9, "chunk {index}: {open} of {frames} frames open");
    }
    assert!(s.samples().iter().filter(|f| f.chunk.is_none()).all(|f| f.signal.is_neutral()));

    let Some(SessionOutcome::Finished { recording, transcript }) = report.outcome else {
        panic!("session did not finish");
    };
    assert!(recording.is_none());
    assert_eq!(transcript, "Hello from the");
    assert_eq!(s.state(), SessionState::Idle);
    assert_eq!(s.coordinator().last_outcome(), Some(SessionState::Finished));
}

#[test]
fn test_talking_motion_comes_from_first_group() {
    let mut s = scenario(ScenarioConfig::default());
    let handle = s.start("hi").unwrap();
    s.run_to_outcome(handle);

    let target = s.target().lock();
    assert_eq!(target.motions[0].group, "TapBody");
    assert!(target.motions[0].index < 3);
    assert_eq!(target.motions[0].priority, 3);
}

#[test]
fn test_idle_group_used_when_tap_body_missing() {
    let target = RecordingTarget::bare()
        .with_parameter(MOUTH_OPEN)
        .with_parameter(MOUTH_FORM)
        .with_motions("Idle", 2);
    let mut s = Scenario::with_target(ScenarioConfig::default(), target).unwrap();
    let handle = s.start("hi").unwrap();
    let report = s.run_to_outcome(handle);

    assert_eq!(report.motions, 1);
    assert_eq!(s.target().lock().motions[0].group, "Idle");
}

#[test]
fn test_model_without_capabilities_still_plays() {
    let mut s = Scenario::with_target(ScenarioConfig::default(), RecordingTarget::bare()).unwrap();
    let handle = s.start("hi").unwrap();
    let report = s.run_to_outcome(handle);

    assert_eq!(report.played, vec![0, 1, 2]);
    assert_eq!(report.motions, 0);
    assert!(s.target().lock().writes.is_empty());
    assert_eq!(report.outcome.map(|o| o.state()), Some(SessionState::Finished));
}

#[test]
fn test_second_start_rejected_while_streaming() {
    let mut s = scenario(ScenarioConfig::default());
    let first = s.start("first").unwrap();
    s.run_for(Duration::from_millis(100));

    let second = s.start("second");
    assert!(matches!(second, Err(VivaError::SessionActive(SessionState::Draining))));
    assert_eq!(s.producer().stats().generations, 1);

    let report = s.run_to_outcome(first);
    assert_eq!(report.played, vec![0, 1, 2]);
}

#[test]
fn test_stop_mid_stream() {
    let mut s = scenario(ScenarioConfig::default());
    let mut handle = s.start("one two three").unwrap();
    s.run_for(Duration::from_millis(700));
    assert_eq!(s.coordinator().engine().cursor().current, Some(1));

    assert!(s.stop());
    assert_eq!(handle.try_outcome(), Some(SessionOutcome::Cancelled));
    assert_eq!(s.probe().playing(), 0);
    assert_eq!(s.probe().stopped().len(), 1);
    assert_eq!(s.producer().stats().stops_received, 1);
    assert!(!s.producer().is_generating());

    s.run_for(Duration::from_secs(2));
    assert_eq!(s.coordinator().engine().played_sequence(), &[0]);
    assert_eq!(s.coordinator().last_outcome(), Some(SessionState::Cancelled));

    let target = s.target().lock();
    assert_eq!(target.param(MOUTH_OPEN), 0.0);
    assert_eq!(target.motion_stops, 1);
    drop(target);

    // Audio still in flight for the cancelled session is discarded
    let now = s.now();
    let late = ProducerEvent::audio(&[0.25f32; 2400], "late");
    s.coordinator_mut().handle_producer_event(late, now);
    assert!(!s.coordinator().engine().is_active());
    assert_eq!(s.coordinator().stats().events_dropped, 1);
    assert!(!s.stop());
}

#[test]
fn test_restart_after_stop() {
    let mut s = scenario(ScenarioConfig::default());
    s.start("one").unwrap();
    s.run_for(Duration::from_millis(100));
    s.stop();

    let handle = s.start("two").unwrap();
    let report = s.run_to_outcome(handle);
    assert_eq!(report.played, vec![0, 1, 2]);
    assert_eq!(s.producer().stats().generations, 2);
    assert_eq!(report.outcome.map(|o| o.state()), Some(SessionState::Finished));
}

#[test]
fn test_gap_in_indices_errors_session() {
    let config = ScenarioConfig {
        producer: ProducerConfig {
            tag_indices: true,
            skip_at: Some(1),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut s = scenario(config);
    let handle = s.start("hi").unwrap();
    let report = s.run_to_outcome(handle);

    assert_eq!(
        report.outcome,
        Some(SessionOutcome::Errored(VivaError::OutOfOrderChunk {
            expected: 1,
            actual: 2
        }))
    );
    assert!(report.played.is_empty());
    assert_eq!(s.probe().playing(), 0);
    assert_eq!(s.producer().stats().stops_received, 1);
    assert_eq!(report.final_mouth, (0.0, 0.0));
}

#[test]
fn test_producer_error_ends_session() {
    let config = ScenarioConfig {
        producer: ProducerConfig {
            fail_at: Some(2),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut s = scenario(config);
    let handle = s.start("hi").unwrap();
    let report = s.run_to_outcome(handle);

    assert!(matches!(
        report.outcome,
        Some(SessionOutcome::Errored(VivaError::ProducerError(_)))
    ));
    assert!(report.elapsed < Duration::from_millis(200));
    assert_eq!(s.probe().playing(), 0);
}

#[test]
fn test_complete_after_playback_finishes() {
    // Slow producer: each chunk ends before the next arrives
    let config = ScenarioConfig {
        producer: ProducerConfig {
            chunk_duration: Duration::from_millis(100),
            generation_latency: Duration::from_millis(300),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut s = scenario(config);
    let handle = s.start("a b c").unwrap();
    let report = s.run_to_outcome(handle);

    assert_eq!(report.played, vec![0, 1, 2]);
    assert_eq!(s.coordinator().stats().underruns, 3);
    // The talking motion is played once, not after every underrun
    assert_eq!(report.motions, 1);
    assert_eq!(report.final_mouth, (0.0, 0.0));
    assert_eq!(report.outcome.map(|o| o.state()), Some(SessionState::Finished));
}

#[test]
fn test_suspended_device_resumes_first() {
    let config = ScenarioConfig {
        suspended_device: true,
        ..Default::default()
    };
    let mut s = scenario(config);
    let handle = s.start("hi").unwrap();
    let report = s.run_to_outcome(handle);

    assert_eq!(s.probe().resume_requests(), 1);
    assert_eq!(report.played, vec![0, 1, 2]);
    assert!(s.probe().started()[0].at > MediaTime::from_millis(20));
}

#[test]
fn test_refused_resume_drops_chunk() {
    let config = ScenarioConfig {
        suspended_device: true,
        ..Default::default()
    };
    let mut s = scenario(config);
    s.probe().refuse_resume(true);
    let handle = s.start("hi").unwrap();
    let report = s.run_to_outcome(handle);

    assert!(report.played.is_empty());
    assert_eq!(s.coordinator().engine().stats().chunks_dropped, 3);
    assert_eq!(report.outcome.map(|o| o.state()), Some(SessionState::Finished));
}

#[test]
fn test_device_failure_skips_chunk() {
    let mut s = scenario(ScenarioConfig::default());
    s.probe().fail_start_of(1);
    let handle = s.start("hi").unwrap();
    let report = s.run_to_outcome(handle);

    assert_eq!(report.played, vec![0, 2]);
    assert_eq!(report.audible_time, Duration::from_millis(1000));
    assert_eq!(report.outcome.map(|o| o.state()), Some(SessionState::Finished));
}

#[test]
fn test_device_failure_mid_chunk() {
    let mut s = scenario(ScenarioConfig::default());
    s.probe().fail_during(0);
    let handle = s.start("hi").unwrap();
    let report = s.run_to_outcome(handle);

    assert_eq!(report.played, vec![1, 2]);
    assert_eq!(s.coordinator().engine().stats().chunks_dropped, 1);
    assert_eq!(report.outcome.map(|o| o.state()), Some(SessionState::Finished));
}

#[test]
fn test_accumulation_mode_speaks_through_model() {
    let mut runtime = RuntimeConfig::default();
    runtime.analyzer.mode = AnalysisMode::ChunkAccumulation;
    let config = ScenarioConfig {
        runtime,
        ..Default::default()
    };
    let target = RecordingTarget::new().speaking();
    let mut s = Scenario::with_target(config, target).unwrap();
    let handle = s.start("hi").unwrap();
    let report = s.run_to_outcome(handle);

    assert_eq!(report.played, vec![0, 1, 2]);
    assert_eq!(report.nonzero_open_writes, 0);

    let target = s.target().lock();
    assert!(!target.spoken.is_empty());
    assert!(target.spoken.iter().all(|(_, volume)| *volume == 0.0));
    // The last hand-off holds the whole session
    let longest = target.spoken.iter().map(|(len, _)| *len).max().unwrap();
    assert_eq!(longest, 44 + 3 * 12_000 * 2);
}

#[test]
fn test_exported_recording_is_valid_wav() {
    let mut runtime = RuntimeConfig::default();
    runtime.coordinator.export_recording = true;
    let config = ScenarioConfig {
        runtime,
        ..Default::default()
    };
    let mut s = scenario(config);
    let handle = s.start("hi").unwrap();
    let report = s.run_to_outcome(handle);

    let Some(SessionOutcome::Finished { recording: Some(wav), .. }) = report.outcome else {
        panic!("no recording");
    };
    let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, DEFAULT_SAMPLE_RATE);
    assert_eq!(spec.bits_per_sample, 16);

    let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(samples.len(), 36_000);
    let peak = samples.iter().map(|s| s.unsigned_abs()).max().unwrap();
    assert!(peak > 14_000 && peak < 17_000);
}

#[test]
fn test_throttle_bounds_occupancy() {
    let mut runtime = RuntimeConfig::default();
    runtime.playback.max_buffered_chunks = 2;
    let config = ScenarioConfig {
        runtime,
        producer: ProducerConfig {
            chunk_count: 8,
            chunk_duration: Duration::from_millis(200),
            duration_jitter: 0.3,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut s = scenario(config);
    let mut handle = s.start("hi").unwrap();

    let mut max_occupancy = 0;
    let mut withheld = false;
    s.run_until(Duration::from_secs(5), |s| {
        max_occupancy = max_occupancy.max(s.coordinator().engine().occupancy());
        withheld |= s.coordinator().withheld_credits() > 0;
        !s.coordinator().state().is_active()
    });

    assert!(max_occupancy <= 2);
    assert!(withheld);
    assert_eq!(handle.try_outcome().map(|o| o.state()), Some(SessionState::Finished));
    assert_eq!(s.coordinator().engine().played_sequence(), &[0, 1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(s.coordinator().withheld_credits(), 0);
}

#[test]
fn test_voice_option_reaches_producer() {
    let mut s = scenario(ScenarioConfig::default());
    let now = s.now();
    s.coordinator_mut()
        .start_streaming("hi", StreamOptions::voice("bf_emma"), now)
        .unwrap();
    let request = s.coordinator_mut().pop_outgoing().unwrap();
    assert_eq!(request, viva_wire::ProducerRequest::generate("hi", "bf_emma"));
}

proptest! {
    #[test]
    fn prop_chunks_play_in_order(
        count in 1u64..6,
        jitter in 0.0f32..0.5,
        credits in 1u32..4,
        max_buffered in 0usize..4,
        seed in any::<u64>(),
    ) {
        let mut runtime = RuntimeConfig::default();
        runtime.playback.max_buffered_chunks = max_buffered;
        let config = ScenarioConfig {
            runtime,
            producer: ProducerConfig {
                chunk_count: count,
                chunk_duration: Duration::from_millis(100),
                duration_jitter: jitter,
                initial_credits: credits,
                seed,
                ..Default::default()
            },
            step: Duration::from_millis(5),
            ..Default::default()
        };
        let mut s = scenario(config);
        let handle = s.start("proptest").unwrap();
        let report = s.run_to_outcome(handle);

        let expected: Vec<u64> = (0..count).collect();
        prop_assert_eq!(report.played, expected);
        prop_assert!(report.max_concurrent <= 1);
        prop_assert_eq!(report.final_mouth, (0.0, 0.0));
        prop_assert_eq!(report.outcome.map(|o| o.state()), Some(SessionState::Finished));
    }
}
