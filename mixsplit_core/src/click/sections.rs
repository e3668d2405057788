//! Section model and post-processing.

use serde::Serialize;

/// Kind of a detected section.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionType {
    Song,
    Speaking,
}

/// One contiguous range of the session, bounded by detected click events.
///
/// Sections are ordered, non-overlapping, and cover the whole track; a
/// section is a song exactly when it carries a BPM estimate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionInfo {
    /// 1-based position in the final section list.
    pub section_number: u32,
    pub start_sample: u64,
    pub end_sample: u64,
    pub section_type: SectionType,
    pub bpm: Option<u32>,
}

impl SectionInfo {
    pub fn new(start_sample: u64, end_sample: u64, bpm: Option<u32>) -> Self {
        Self {
            section_number: 0,
            start_sample,
            end_sample,
            section_type: if bpm.is_some() {
                SectionType::Song
            } else {
                SectionType::Speaking
            },
            bpm,
        }
    }

    pub fn frames(&self) -> u64 {
        self.end_sample.saturating_sub(self.start_sample)
    }

    pub fn start_seconds(&self, sample_rate: u32) -> f64 {
        self.start_sample as f64 / f64::from(sample_rate)
    }

    pub fn duration_seconds(&self, sample_rate: u32) -> f64 {
        self.frames() as f64 / f64::from(sample_rate)
    }
}

/// Directory name for section `number` in a list of `count` sections.
/// Padding widens from two to three digits past 99 sections.
pub fn section_dir_name(number: u32, count: usize) -> String {
    let width = if count > 99 { 3 } else { 2 };
    format!("section_{number:0width$}")
}

/// Merge sections shorter than `min_length_seconds` into a neighbour.
///
/// The first section merges forward into its successor, adopting the
/// successor's BPM and type; every other short section merges backward into
/// its predecessor, which keeps its own BPM and type. Sections are never
/// dropped, the covered sample range is preserved, and a single remaining
/// short section is left alone. Numbers are reassigned `1..` afterwards.
pub fn merge_short(
    sections: Vec<SectionInfo>,
    min_length_seconds: f64,
    sample_rate: u32,
) -> Vec<SectionInfo> {
    let min_frames = (min_length_seconds * f64::from(sample_rate)).ceil() as u64;
    let short = |section: &SectionInfo| section.frames() < min_frames;

    let mut iter = sections.into_iter();
    let mut merged: Vec<SectionInfo> = match iter.next() {
        Some(first) => vec![first],
        None => return Vec::new(),
    };

    for mut next in iter {
        let is_head = merged.len() == 1;
        let last = merged.last_mut().expect("merged list starts non-empty");
        if is_head && short(last) {
            // Head section folds forward, taking the successor's identity.
            next.start_sample = last.start_sample;
            merged.pop();
            merged.push(next);
        } else if short(&next) {
            last.end_sample = next.end_sample;
        } else {
            merged.push(next);
        }
    }

    classify(&mut merged);
    renumber(&mut merged);
    merged
}

/// Set each section's type from its BPM: song iff a BPM is present.
pub fn classify(sections: &mut [SectionInfo]) {
    for section in sections {
        section.section_type = if section.bpm.is_some() {
            SectionType::Song
        } else {
            SectionType::Speaking
        };
    }
}

pub(crate) fn renumber(sections: &mut [SectionInfo]) {
    for (index, section) in sections.iter_mut().enumerate() {
        section.section_number = index as u32 + 1;
    }
}
