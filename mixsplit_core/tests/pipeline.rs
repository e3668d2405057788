//! End-to-end pipeline scenarios over procedurally generated sessions.
//!
//! Fixtures are synthesized at runtime so the repository carries no binary
//! assets. The low sample rate keeps the suites fast while exercising the
//! same code paths as full-rate material.

use std::f32::consts::TAU;
use std::path::Path;

use mixsplit_core::{
    metadata, run, BitDepth, BusConfig, ChannelAction, ChannelConfig, SectionSplittingConfig,
    SectionType, SessionOptions, SessionReport,
};
use tempfile::tempdir;

const SAMPLE_RATE: u32 = 8_000;

fn write_f32_wav(path: &Path, columns: &[Vec<f32>]) {
    let spec = hound::WavSpec {
        channels: columns.len() as u16,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let frames = columns[0].len();
    assert!(columns.iter().all(|c| c.len() == frames));

    let mut writer = hound::WavWriter::create(path, spec).expect("create fixture");
    for frame in 0..frames {
        for column in columns {
            writer.write_sample(column[frame]).expect("write sample");
        }
    }
    writer.finalize().expect("finalize fixture");
}

fn write_i24_wav(path: &Path, columns: &[Vec<i32>]) {
    let spec = hound::WavSpec {
        channels: columns.len() as u16,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 24,
        sample_format: hound::SampleFormat::Int,
    };
    let frames = columns[0].len();

    let mut writer = hound::WavWriter::create(path, spec).expect("create fixture");
    for frame in 0..frames {
        for column in columns {
            writer.write_sample(column[frame]).expect("write sample");
        }
    }
    writer.finalize().expect("finalize fixture");
}

fn read_i32_samples(path: &Path) -> (hound::WavSpec, Vec<i32>) {
    let mut reader = hound::WavReader::open(path).expect("open output");
    let spec = reader.spec();
    let samples = reader
        .samples::<i32>()
        .collect::<Result<Vec<_>, _>>()
        .expect("read samples");
    (spec, samples)
}

fn frames_of(path: &Path) -> u64 {
    u64::from(hound::WavReader::open(path).expect("open output").duration())
}

fn read_i16_samples(path: &Path) -> (hound::WavSpec, Vec<i16>) {
    let mut reader = hound::WavReader::open(path).expect("open output");
    let spec = reader.spec();
    let samples = reader
        .samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .expect("read samples");
    (spec, samples)
}

/// Beat positions in samples for a steady tempo over `[start, end)` seconds.
fn beat_positions(start_seconds: f64, end_seconds: f64, bpm: f64) -> Vec<u64> {
    let period = 60.0 / bpm;
    let mut beats = Vec::new();
    let mut t = start_seconds;
    while t < end_seconds {
        beats.push((t * f64::from(SAMPLE_RATE)).round() as u64);
        t += period;
    }
    beats
}

/// A click track: short 2 kHz bursts at the given beat positions.
fn click_column(total_frames: usize, beats: &[u64]) -> Vec<f32> {
    let burst = (SAMPLE_RATE as usize / 100).max(8); // 10 ms
    let mut samples = vec![0.0f32; total_frames];
    for &beat in beats {
        for i in 0..burst {
            let index = beat as usize + i;
            if index < total_frames {
                samples[index] =
                    (TAU * 2_000.0 * i as f32 / SAMPLE_RATE as f32).sin() * 0.8;
            }
        }
    }
    samples
}

fn tone_column(total_frames: usize, freq: f32) -> Vec<f32> {
    (0..total_frames)
        .map(|n| (TAU * freq * n as f32 / SAMPLE_RATE as f32).sin() * 0.3)
        .collect()
}

fn seconds(value: f64) -> usize {
    (value * f64::from(SAMPLE_RATE)) as usize
}

fn run_session(
    input_dir: &Path,
    output_dir: &Path,
    channels: Vec<ChannelConfig>,
    buses: Vec<BusConfig>,
    configure: impl FnOnce(&mut SessionOptions),
) -> SessionReport {
    let mut options = SessionOptions::new(input_dir, output_dir);
    options.block_frames = 4_096;
    configure(&mut options);
    run(&options, channels, buses).expect("session")
}

#[test]
fn passthrough_mono_is_bit_exact() {
    let input = tempdir().expect("input");
    let out_base = tempdir().expect("out");
    let output = out_base.path().join("out");

    // Two files, two channels each; channel 1 carries distinct ramps.
    let first_a: Vec<i32> = (0..8_000).map(|n| (n % 4_000) - 2_000).collect();
    let second_a: Vec<i32> = (0..8_000).map(|n| 2_000 - (n % 4_000)).collect();
    let noise: Vec<i32> = (0..8_000).map(|n| (n * 37 % 900) - 450).collect();
    write_i24_wav(&input.path().join("001.wav"), &[first_a.clone(), noise.clone()]);
    write_i24_wav(&input.path().join("002.wav"), &[second_a.clone(), noise]);

    let channels = vec![
        ChannelConfig::new(1, "A", ChannelAction::Process),
        ChannelConfig::new(2, "B", ChannelAction::Skip),
    ];
    let report = run_session(input.path(), &output, channels, vec![], |_| {});

    assert_eq!(report.tracks.len(), 1);
    let track = output.join("01_A.wav");
    assert!(track.exists());
    assert!(!output.join("02_B.wav").exists());

    let (spec, samples) = read_i32_samples(&track);
    assert_eq!(spec.bits_per_sample, 24);
    assert_eq!(spec.channels, 1);
    assert_eq!(samples.len(), 16_000);

    let expected: Vec<i32> = first_a.into_iter().chain(second_a).collect();
    assert_eq!(samples, expected);

    // The temp directory is cleaned up on success.
    assert!(!output.join("temp").exists());
}

#[test]
fn stereo_bus_interleaves_referenced_columns() {
    let input = tempdir().expect("input");
    let out_base = tempdir().expect("out");
    let output = out_base.path().join("out");

    let columns: Vec<Vec<i32>> = (0..4)
        .map(|c| (0..4_000).map(|n| (n as i32 * (c as i32 + 1)) % 5_000 - 2_500).collect())
        .collect();
    write_i24_wav(&input.path().join("001.wav"), &columns);

    let channels = vec![
        ChannelConfig::new(1, "one", ChannelAction::Skip),
        ChannelConfig::new(2, "two", ChannelAction::Skip),
        ChannelConfig::new(3, "OH L", ChannelAction::Bus),
        ChannelConfig::new(4, "OH R", ChannelAction::Bus),
    ];
    let buses = vec![BusConfig::new("Mix", 3, 4)];
    let report = run_session(input.path(), &output, channels, buses, |_| {});

    assert_eq!(report.tracks.len(), 1);
    let (spec, samples) = read_i32_samples(&output.join("Mix.wav"));
    assert_eq!(spec.channels, 2);
    assert_eq!(samples.len(), 8_000);

    for frame in 0..4_000 {
        assert_eq!(samples[frame * 2], columns[2][frame], "left frame {frame}");
        assert_eq!(samples[frame * 2 + 1], columns[3][frame], "right frame {frame}");
    }
}

#[test]
fn float_input_down_converts_to_pcm16() {
    let input = tempdir().expect("input");
    let out_base = tempdir().expect("out");
    let output = out_base.path().join("out");

    let source: Vec<f32> = (0..2_000)
        .map(|n| ((n as f32 / 500.0).sin() * 1.2).clamp(-1.5, 1.5))
        .collect();
    write_f32_wav(&input.path().join("001.wav"), &[source.clone()]);

    let channels = vec![ChannelConfig::new(1, "A", ChannelAction::Process)];
    run_session(input.path(), &output, channels, vec![], |options| {
        options.bit_depth = BitDepth::Int16;
    });

    let (spec, samples) = read_i16_samples(&output.join("01_A.wav"));
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.sample_format, hound::SampleFormat::Int);

    for (frame, (&got, &value)) in samples.iter().zip(&source).enumerate() {
        let expected = (f64::from(value) * 32_768.0)
            .round_ties_even()
            .clamp(-32_768.0, 32_767.0) as i16;
        assert_eq!(got, expected, "frame {frame}");
    }
}

#[test]
fn silent_click_yields_single_full_length_section() {
    let input = tempdir().expect("input");
    let out_base = tempdir().expect("out");
    let output = out_base.path().join("out");

    let total = seconds(5.0);
    write_f32_wav(
        &input.path().join("001.wav"),
        &[tone_column(total, 220.0), vec![0.0; total]],
    );

    let channels = vec![
        ChannelConfig::new(1, "A", ChannelAction::Process),
        ChannelConfig::new(2, "Click", ChannelAction::Click),
    ];
    let report = run_session(input.path(), &output, channels, vec![], |options| {
        options.section_splitting = SectionSplittingConfig {
            enabled: true,
            ..SectionSplittingConfig::default()
        };
    });

    assert_eq!(report.sections.len(), 1);
    assert_eq!(report.sections[0].section_type, SectionType::Speaking);
    assert_eq!(report.sections[0].bpm, None);
    assert_eq!(report.sections[0].start_sample, 0);
    assert_eq!(report.sections[0].end_sample, total as u64);

    for name in ["01_A.wav", "02_Click.wav"] {
        assert!(!output.join(name).exists(), "{name} must be relocated");
        let section_file = output.join("section_01").join(name);
        assert_eq!(frames_of(&section_file), total as u64);
        assert_eq!(metadata::read_bpm(&section_file), None);
    }
}

#[test]
fn tempo_change_splits_into_two_tagged_sections() {
    let input = tempdir().expect("input");
    let out_base = tempdir().expect("out");
    let output = out_base.path().join("out");

    let total = seconds(20.0);
    let mut beats = beat_positions(0.25, 10.0, 100.0);
    let last_old = *beats.last().expect("old beats") as f64 / f64::from(SAMPLE_RATE);
    beats.extend(beat_positions(last_old + 60.0 / 140.0, 19.75, 140.0));

    write_f32_wav(
        &input.path().join("001.wav"),
        &[tone_column(total, 220.0), click_column(total, &beats)],
    );

    let channels = vec![
        ChannelConfig::new(1, "A", ChannelAction::Process),
        ChannelConfig::new(2, "Click", ChannelAction::Click),
    ];
    let report = run_session(input.path(), &output, channels, vec![], |options| {
        options.section_splitting = SectionSplittingConfig {
            enabled: true,
            gap_threshold_seconds: 3.0,
            min_section_length_seconds: 5.0,
            bpm_change_threshold: 1,
        };
    });

    assert_eq!(report.sections.len(), 2, "sections: {:?}", report.sections);
    let first = &report.sections[0];
    let second = &report.sections[1];

    let bpm_first = first.bpm.expect("first section BPM");
    let bpm_second = second.bpm.expect("second section BPM");
    assert!((98..=102).contains(&bpm_first), "first BPM {bpm_first}");
    assert!((138..=142).contains(&bpm_second), "second BPM {bpm_second}");

    // The windowed comparison reacts once the sliding median tips, placing
    // the boundary up to half a BPM window of old-tempo clicks ahead of the
    // 10-second transition and never later than one period after it.
    let transition = seconds(10.0) as i64;
    let period = seconds(0.6) as i64;
    let boundary = first.end_sample as i64;
    assert_eq!(first.end_sample, second.start_sample);
    assert!(
        (transition - 8 * period..=transition + period).contains(&boundary),
        "boundary at {boundary}, transition at {transition}"
    );

    // Every track is split identically and tagged with the section BPM.
    for name in ["01_A.wav", "02_Click.wav"] {
        let first_file = output.join("section_01").join(name);
        let second_file = output.join("section_02").join(name);
        assert_eq!(frames_of(&first_file), first.end_sample);
        assert_eq!(frames_of(&second_file), total as u64 - first.end_sample);
        assert_eq!(metadata::read_bpm(&first_file), Some(bpm_first));
        assert_eq!(metadata::read_bpm(&second_file), Some(bpm_second));
    }
}

#[test]
fn click_gap_produces_speaking_section() {
    let input = tempdir().expect("input");
    let out_base = tempdir().expect("out");
    let output = out_base.path().join("out");

    let total = seconds(25.0);
    let mut beats = beat_positions(0.25, 10.0, 120.0);
    beats.extend(beat_positions(15.0, 24.75, 120.0));

    write_f32_wav(
        &input.path().join("001.wav"),
        &[tone_column(total, 330.0), click_column(total, &beats)],
    );

    let channels = vec![
        ChannelConfig::new(1, "A", ChannelAction::Process),
        ChannelConfig::new(2, "Click", ChannelAction::Click),
    ];
    let json_path = out_base.path().join("session.json");
    let report = run_session(input.path(), &output, channels, vec![], |options| {
        options.section_splitting = SectionSplittingConfig {
            enabled: true,
            gap_threshold_seconds: 3.0,
            min_section_length_seconds: 4.0,
            bpm_change_threshold: 1,
        };
        options.session_json = Some(json_path.clone());
    });

    assert_eq!(report.sections.len(), 3, "sections: {:?}", report.sections);
    let types: Vec<SectionType> = report.sections.iter().map(|s| s.section_type).collect();
    assert_eq!(
        types,
        [SectionType::Song, SectionType::Speaking, SectionType::Song]
    );
    assert!((118..=122).contains(&report.sections[0].bpm.expect("first BPM")));
    assert_eq!(report.sections[1].bpm, None);
    assert!((118..=122).contains(&report.sections[2].bpm.expect("third BPM")));

    // The speaking section starts at the last click before the silence and
    // ends at the first click after it, within one click period each.
    let period = seconds(0.5) as i64;
    let speaking = &report.sections[1];
    assert!(
        (speaking.start_sample as i64 - seconds(9.75) as i64).abs() <= period,
        "speaking starts at {}",
        speaking.start_sample
    );
    assert!(
        (speaking.end_sample as i64 - seconds(15.0) as i64).abs() <= period,
        "speaking ends at {}",
        speaking.end_sample
    );

    // Contiguous cover of the whole session.
    assert_eq!(report.sections[0].start_sample, 0);
    assert_eq!(report.sections[2].end_sample, total as u64);
    for pair in report.sections.windows(2) {
        assert_eq!(pair[0].end_sample, pair[1].start_sample);
    }

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json_path).expect("json"))
            .expect("parse json");
    assert_eq!(json.as_array().expect("array").len(), 3);
    assert_eq!(json[0]["type"], "song");
    assert_eq!(json[1]["type"], "speaking");
}

#[test]
fn single_file_session_matches_multi_file_invariants() {
    let input = tempdir().expect("input");
    let out_base = tempdir().expect("out");
    let output = out_base.path().join("out");

    let column: Vec<i32> = (0..3_000).map(|n| n as i32 % 1_000 - 500).collect();
    write_i24_wav(&input.path().join("take.wav"), &[column.clone()]);

    let channels = vec![ChannelConfig::new(1, "Solo", ChannelAction::Process)];
    let report = run_session(input.path(), &output, channels, vec![], |_| {});

    assert_eq!(report.tracks.len(), 1);
    let (_, samples) = read_i32_samples(&output.join("01_Solo.wav"));
    assert_eq!(samples, column);
}

#[test]
fn output_directory_conflict_is_versioned() {
    let input = tempdir().expect("input");
    let out_base = tempdir().expect("out");
    let output = out_base.path().join("out");
    std::fs::create_dir_all(&output).expect("mkdir");
    std::fs::write(output.join("occupied.wav"), b"x").expect("occupy");

    write_i24_wav(
        &input.path().join("001.wav"),
        &[(0..1_000).map(|n| n as i32).collect()],
    );

    let channels = vec![ChannelConfig::new(1, "A", ChannelAction::Process)];
    let report = run_session(input.path(), &output, channels, vec![], |_| {});

    assert_eq!(report.output_dir, out_base.path().join("out_v2"));
    assert!(report.output_dir.join("01_A.wav").exists());
}

#[test]
fn keep_temp_preserves_segments() {
    let input = tempdir().expect("input");
    let out_base = tempdir().expect("out");
    let output = out_base.path().join("out");

    write_i24_wav(
        &input.path().join("001.wav"),
        &[(0..1_000).map(|n| n as i32).collect::<Vec<i32>>(),
          (0..1_000).map(|n| -(n as i32)).collect::<Vec<i32>>()],
    );

    let channels = vec![
        ChannelConfig::new(1, "A", ChannelAction::Process),
        ChannelConfig::new(2, "B", ChannelAction::Process),
    ];
    run_session(input.path(), &output, channels, vec![], |options| {
        options.keep_temp = true;
    });

    let temp = output.join("temp");
    assert!(temp.join("ch01_0001.wav").exists());
    assert!(temp.join("ch02_0001.wav").exists());
}

#[test]
fn heterogeneous_inputs_are_rejected() {
    let input = tempdir().expect("input");
    let out_base = tempdir().expect("out");

    write_i24_wav(
        &input.path().join("001.wav"),
        &[(0..500).map(|n| n as i32).collect()],
    );
    write_f32_wav(&input.path().join("002.wav"), &[vec![0.1; 500]]);

    let mut options = SessionOptions::new(input.path(), out_base.path().join("out"));
    let channels = vec![ChannelConfig::new(1, "A", ChannelAction::Process)];
    options.block_frames = 1_024;

    let err = run(&options, channels, vec![]).expect_err("mixed subtypes must fail");
    assert!(matches!(
        err,
        mixsplit_core::PipelineError::InputInvalid { .. }
    ));
}
