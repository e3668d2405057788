//! Envelope, novelty, and peak picking for click onset detection.
//!
//! The chain is filter → rectify → moving-average envelope → half-wave
//! rectified first difference. It is driven twice per file: one pass
//! accumulates the novelty statistics that set the pick thresholds, the
//! second pass feeds the same deterministic chain into the peak picker. Both
//! passes carry their state across blocks, so block size never changes the
//! result.

use std::collections::VecDeque;

use crate::click::filter::BandpassFilter;

/// Envelope smoothing window in seconds.
const ENVELOPE_WINDOW_SECONDS: f64 = 0.005;
/// Minimum spacing between onsets, caps detectable tempo near 400 BPM.
pub const MIN_ONSET_DISTANCE_MS: u64 = 150;

/// Minimum spacing between accepted peaks, in samples.
pub fn min_onset_distance(sample_rate: u32) -> u64 {
    (MIN_ONSET_DISTANCE_MS * u64::from(sample_rate) / 1_000).max(1)
}

/// The filter → envelope → novelty chain, producing one novelty sample per
/// input sample.
pub struct NoveltyChain {
    filter: BandpassFilter,
    window: VecDeque<f32>,
    window_len: usize,
    window_sum: f64,
    previous_envelope: Option<f32>,
    filtered: Vec<f32>,
}

impl NoveltyChain {
    pub fn new(sample_rate: u32) -> Result<Self, String> {
        let window_len = ((ENVELOPE_WINDOW_SECONDS * f64::from(sample_rate)) as usize).max(1);
        Ok(Self {
            filter: BandpassFilter::new(sample_rate)?,
            window: VecDeque::with_capacity(window_len + 1),
            window_len,
            window_sum: 0.0,
            previous_envelope: None,
            filtered: Vec::new(),
        })
    }

    /// Process one block, appending the novelty samples to `novelty`.
    pub fn process_into(&mut self, block: &[f32], novelty: &mut Vec<f32>) {
        let mut filtered = std::mem::take(&mut self.filtered);
        self.filter.process_into(block, &mut filtered);

        novelty.clear();
        novelty.reserve(filtered.len());
        for &sample in &filtered {
            let rectified = sample.abs();
            self.window.push_back(rectified);
            self.window_sum += f64::from(rectified);
            if self.window.len() > self.window_len {
                let expired = self.window.pop_front().expect("window non-empty");
                self.window_sum -= f64::from(expired);
            }
            let envelope = (self.window_sum / self.window.len() as f64) as f32;

            let difference = envelope - self.previous_envelope.unwrap_or(envelope);
            novelty.push(difference.max(0.0));
            self.previous_envelope = Some(envelope);
        }

        self.filtered = filtered;
    }
}

/// Running mean/deviation of the novelty signal over one pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoveltyStats {
    count: u64,
    sum: f64,
    sum_squares: f64,
}

impl NoveltyStats {
    pub fn update(&mut self, novelty: &[f32]) {
        for &value in novelty {
            self.count += 1;
            self.sum += f64::from(value);
            self.sum_squares += f64::from(value) * f64::from(value);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            (self.sum / self.count as f64) as f32
        }
    }

    pub fn std(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        let mean = self.sum / self.count as f64;
        let variance = (self.sum_squares / self.count as f64 - mean * mean).max(0.0);
        variance.sqrt() as f32
    }
}

/// Streaming local-maximum picker over the novelty signal.
///
/// Candidates must clear the height threshold and rise at least `prominence`
/// above the lowest novelty value seen since the previous candidate. Among
/// candidates closer together than `min_distance`, the highest wins.
pub struct PeakPicker {
    height: f32,
    prominence: f32,
    min_distance: u64,
    index: u64,
    previous: f32,
    rising: bool,
    valley: f32,
    candidates: Vec<(u64, f32)>,
}

impl PeakPicker {
    pub fn new(height: f32, prominence: f32, min_distance: u64) -> Self {
        Self {
            height,
            prominence,
            min_distance: min_distance.max(1),
            index: 0,
            previous: 0.0,
            rising: false,
            valley: f32::INFINITY,
            candidates: Vec::new(),
        }
    }

    pub fn push_block(&mut self, novelty: &[f32]) {
        for &value in novelty {
            self.push(value);
        }
    }

    fn push(&mut self, value: f32) {
        if self.index == 0 {
            self.previous = value;
            self.valley = value;
            self.index = 1;
            return;
        }

        if value > self.previous {
            self.rising = true;
        } else if value < self.previous {
            if self.rising {
                let peak_value = self.previous;
                if peak_value >= self.height && peak_value - self.valley >= self.prominence {
                    self.candidates.push((self.index - 1, peak_value));
                    self.valley = value;
                }
            }
            self.rising = false;
        }

        self.valley = self.valley.min(value);
        self.previous = value;
        self.index += 1;
    }

    /// Resolve min-distance conflicts and return onset positions in order.
    pub fn finish(self) -> Vec<u64> {
        let candidates = self.candidates;
        let mut keep = vec![true; candidates.len()];

        let mut by_height: Vec<usize> = (0..candidates.len()).collect();
        by_height.sort_by(|&a, &b| {
            candidates[b]
                .1
                .partial_cmp(&candidates[a].1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(candidates[a].0.cmp(&candidates[b].0))
        });

        for &winner in &by_height {
            if !keep[winner] {
                continue;
            }
            let position = candidates[winner].0;
            for lower in (0..winner).rev() {
                if position - candidates[lower].0 >= self.min_distance {
                    break;
                }
                keep[lower] = false;
            }
            for upper in winner + 1..candidates.len() {
                if candidates[upper].0 - position >= self.min_distance {
                    break;
                }
                keep[upper] = false;
            }
        }

        candidates
            .into_iter()
            .zip(keep)
            .filter_map(|((position, _), kept)| kept.then_some(position))
            .collect()
    }
}
