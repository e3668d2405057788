//! Click track analysis: onset detection, BPM estimation, and section
//! boundary construction.
//!
//! The analyzer reads the already-built click track twice through the block
//! reader. The first pass gathers the novelty statistics that parameterize
//! the peak picker, the second pass collects onsets. Boundaries come from
//! inter-onset gaps (speaking sections) and from tempo changes within a
//! continuous onset run.

use std::path::Path;

use crate::audio::io::BlockReader;
use crate::click::onset::{min_onset_distance, NoveltyChain, NoveltyStats, PeakPicker};
use crate::click::sections::{renumber, SectionInfo};
use crate::config::SectionSplittingConfig;
use crate::error::PipelineError;

/// IOIs per side of the tempo comparison window.
const BPM_WINDOW_IOIS: usize = 12;
/// Fewer IOIs than this produce no BPM estimate.
const MIN_BPM_IOIS: usize = 4;

pub struct ClickAnalyzer<'a> {
    config: &'a SectionSplittingConfig,
    block_frames: usize,
}

impl<'a> ClickAnalyzer<'a> {
    pub fn new(config: &'a SectionSplittingConfig, block_frames: usize) -> Self {
        Self {
            config,
            block_frames,
        }
    }

    /// Analyze the click track and return ordered sections covering
    /// `[0, frame_count)`.
    ///
    /// Fewer than two onsets yield a single speaking section. An empty file
    /// yields an empty list, which deactivates splitting downstream.
    ///
    /// # Errors
    /// Returns [`PipelineError::AnalysisFailed`] when the click track cannot
    /// be read; callers fall back to a single whole-file section.
    pub fn analyze(&self, click_path: &Path) -> Result<Vec<SectionInfo>, PipelineError> {
        let (onsets, total_frames, sample_rate) = self.detect_onsets(click_path)?;

        if total_frames == 0 {
            return Ok(Vec::new());
        }
        if onsets.len() < 2 {
            let mut sections = vec![SectionInfo::new(0, total_frames, None)];
            renumber(&mut sections);
            return Ok(sections);
        }

        let gap_samples =
            (self.config.gap_threshold_seconds * f64::from(sample_rate)).round() as u64;
        let runs = split_runs(&onsets, gap_samples.max(1));

        let mut sections = Vec::new();
        let mut cursor = 0u64;
        for (run_index, &(lo, hi)) in runs.iter().enumerate() {
            if run_index > 0 {
                // The span between two onset runs is a speaking section.
                let run_start = onsets[lo];
                if run_start > cursor {
                    sections.push(SectionInfo::new(cursor, run_start, None));
                    cursor = run_start;
                }
            }

            let mut segment_lo = lo;
            for boundary in tempo_boundaries(
                &onsets[lo..=hi],
                sample_rate,
                self.config.bpm_change_threshold,
            ) {
                let boundary_index = lo + boundary;
                let boundary_sample = onsets[boundary_index];
                if boundary_sample > cursor {
                    sections.push(SectionInfo::new(
                        cursor,
                        boundary_sample,
                        median_bpm(&onsets[segment_lo..boundary_index], sample_rate),
                    ));
                    cursor = boundary_sample;
                    segment_lo = boundary_index;
                }
            }

            let is_last_run = run_index + 1 == runs.len();
            let end = if is_last_run { total_frames } else { onsets[hi] };
            if end > cursor {
                sections.push(SectionInfo::new(
                    cursor,
                    end,
                    median_bpm(&onsets[segment_lo..=hi], sample_rate),
                ));
            }
            cursor = onsets[hi];
        }

        renumber(&mut sections);
        Ok(sections)
    }

    /// Two-pass onset detection over the click file.
    fn detect_onsets(&self, path: &Path) -> Result<(Vec<u64>, u64, u32), PipelineError> {
        let map_err = |err: PipelineError| match err {
            PipelineError::Cancelled => PipelineError::Cancelled,
            other => PipelineError::analysis(path, other.to_string()),
        };

        // Pass one: novelty statistics and total length.
        let mut reader = BlockReader::open(path, self.block_frames).map_err(map_err)?;
        let sample_rate = reader.info().sample_rate;
        let channel_count = reader.channel_count();

        let mut chain = NoveltyChain::new(sample_rate)
            .map_err(|reason| PipelineError::analysis(path, reason))?;
        let mut stats = NoveltyStats::default();
        let mut mono = Vec::new();
        let mut novelty = Vec::new();
        let mut total_frames = 0u64;

        while let Some(block) = reader.next_block().map_err(map_err)? {
            mixdown(block, channel_count, &mut mono);
            total_frames += mono.len() as u64;
            chain.process_into(&mono, &mut novelty);
            stats.update(&novelty);
        }

        if stats.count() == 0 {
            return Ok((Vec::new(), total_frames, sample_rate));
        }

        let mean = stats.mean();
        let std = stats.std();
        // A silent track has zero deviation; the floor keeps numerical dust
        // below the threshold.
        let height = (mean + 2.0 * std).max(1e-9);
        let prominence = 1.5 * std;

        // Pass two: identical chain, now feeding the picker.
        let mut reader = BlockReader::open(path, self.block_frames).map_err(map_err)?;
        let mut chain = NoveltyChain::new(sample_rate)
            .map_err(|reason| PipelineError::analysis(path, reason))?;
        let mut picker = PeakPicker::new(height, prominence, min_onset_distance(sample_rate));

        while let Some(block) = reader.next_block().map_err(map_err)? {
            mixdown(block, channel_count, &mut mono);
            chain.process_into(&mono, &mut novelty);
            picker.push_block(&novelty);
        }

        Ok((picker.finish(), total_frames, sample_rate))
    }
}

fn mixdown(block: &[f32], channel_count: usize, mono: &mut Vec<f32>) {
    mono.clear();
    if channel_count <= 1 {
        mono.extend_from_slice(block);
        return;
    }
    mono.extend(
        block
            .chunks_exact(channel_count)
            .map(|frame| frame.iter().sum::<f32>() / channel_count as f32),
    );
}

/// Split onsets into inclusive index runs separated by gaps of at least
/// `gap_samples`.
fn split_runs(onsets: &[u64], gap_samples: u64) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut lo = 0usize;
    for i in 1..onsets.len() {
        if onsets[i] - onsets[i - 1] >= gap_samples {
            runs.push((lo, i - 1));
            lo = i;
        }
    }
    runs.push((lo, onsets.len() - 1));
    runs
}

fn median(values: &mut [u64]) -> f64 {
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid] as f64
    } else {
        (values[mid - 1] as f64 + values[mid] as f64) / 2.0
    }
}

fn bpm_from_median_ioi(median_ioi: f64, sample_rate: u32) -> u32 {
    (60.0 * f64::from(sample_rate) / median_ioi).round() as u32
}

/// Median-IOI BPM of a run of onsets, or `None` below the IOI minimum.
fn median_bpm(onsets: &[u64], sample_rate: u32) -> Option<u32> {
    if onsets.len() < MIN_BPM_IOIS + 1 {
        return None;
    }
    let mut iois: Vec<u64> = onsets.windows(2).map(|w| w[1] - w[0]).collect();
    let median_ioi = median(&mut iois);
    if median_ioi <= 0.0 {
        return None;
    }
    Some(bpm_from_median_ioi(median_ioi, sample_rate))
}

/// Tempo-change boundaries within one continuous onset run.
///
/// A window of [`BPM_WINDOW_IOIS`] consecutive intervals slides across the
/// run one interval at a time; each window's rounded median BPM is compared
/// against the previous window's. Whenever the difference reaches the
/// threshold, a boundary is inserted at the onset starting the later window
/// of the pair. Returned indices are relative to `onsets`.
fn tempo_boundaries(onsets: &[u64], sample_rate: u32, threshold: u32) -> Vec<usize> {
    let ioi_count = onsets.len().saturating_sub(1);
    let window = BPM_WINDOW_IOIS.min(ioi_count);
    if window < MIN_BPM_IOIS {
        return Vec::new();
    }

    let iois: Vec<u64> = onsets.windows(2).map(|w| w[1] - w[0]).collect();
    let mut scratch = Vec::with_capacity(window);

    let mut window_bpm = |start: usize| {
        scratch.clear();
        scratch.extend_from_slice(&iois[start..start + window]);
        bpm_from_median_ioi(median(&mut scratch), sample_rate)
    };

    let mut boundaries = Vec::new();
    let mut previous = window_bpm(0);
    for start in 1..=(ioi_count - window) {
        let current = window_bpm(start);
        if previous.abs_diff(current) >= threshold {
            boundaries.push(start);
        }
        previous = current;
    }
    boundaries
}
