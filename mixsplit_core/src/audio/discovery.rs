//! Input file discovery and session validation.
//!
//! Console recorders emit sequentially numbered files (`REC0001.WAV`,
//! `REC0002.WAV`, ...). Ordering follows the first decimal integer in the
//! file stem; files without one sort after all numbered files, by name.

use std::path::{Path, PathBuf};

use crate::audio::io::{self, AudioProbe};
use crate::error::PipelineError;
use crate::report::{Reporter, Stage};

/// One discovered input file with its ordering key.
#[derive(Clone, Debug)]
pub struct InputFile {
    pub path: PathBuf,
    numeric_key: Option<u64>,
}

impl InputFile {
    fn new(path: PathBuf) -> Self {
        let numeric_key = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(first_integer);
        Self { path, numeric_key }
    }

    fn sort_key(&self) -> (u64, String) {
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        (self.numeric_key.unwrap_or(u64::MAX), name)
    }
}

/// Parameters shared by every file of a validated session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioParameters {
    pub sample_rate: u32,
    pub channel_count: usize,
    pub sample_format: crate::audio::convert::SampleFormat,
}

impl From<AudioProbe> for AudioParameters {
    fn from(info: AudioProbe) -> Self {
        Self {
            sample_rate: info.sample_rate,
            channel_count: info.channel_count,
            sample_format: info.sample_format,
        }
    }
}

fn first_integer(stem: &str) -> Option<u64> {
    let digits: String = stem
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        None
    } else {
        // Absurdly long digit runs saturate instead of failing discovery.
        Some(digits.parse().unwrap_or(u64::MAX))
    }
}

/// Find every WAV file in `input_dir`, sorted into recording order.
///
/// # Errors
/// Returns [`PipelineError::InputInvalid`] when the directory cannot be read
/// or contains no WAV files.
pub fn discover(input_dir: &Path) -> Result<Vec<InputFile>, PipelineError> {
    let entries = std::fs::read_dir(input_dir)
        .map_err(|err| PipelineError::input(input_dir, format!("cannot read directory: {err}")))?;

    let mut files: Vec<InputFile> = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|err| PipelineError::input(input_dir, format!("cannot read entry: {err}")))?;
        let path = entry.path();
        let is_wav = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("wav"))
            .unwrap_or(false);
        if is_wav && path.is_file() {
            files.push(InputFile::new(path));
        }
    }

    if files.is_empty() {
        return Err(PipelineError::input(input_dir, "no WAV files found"));
    }

    files.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    Ok(files)
}

/// Verify that every file shares the first file's parameters.
///
/// # Errors
/// Returns [`PipelineError::InputInvalid`] naming the attribute and the file
/// where the first mismatch was found.
pub fn validate(files: &[InputFile], reporter: &dyn Reporter) -> Result<AudioParameters, PipelineError> {
    let first = files
        .first()
        .ok_or_else(|| PipelineError::input("", "no files to validate"))?;

    reporter.begin_stage(Stage::Validate, files.len() as u64);
    let reference = io::probe(&first.path)?;
    reporter.advance(1);

    for file in &files[1..] {
        let info = io::probe(&file.path)?;
        if info.sample_rate != reference.sample_rate {
            return Err(PipelineError::input(
                &file.path,
                format!(
                    "sample rate mismatch: {} Hz (expected {} Hz)",
                    info.sample_rate, reference.sample_rate
                ),
            ));
        }
        if info.channel_count != reference.channel_count {
            return Err(PipelineError::input(
                &file.path,
                format!(
                    "channel count mismatch: {} channels (expected {})",
                    info.channel_count, reference.channel_count
                ),
            ));
        }
        if info.sample_format != reference.sample_format {
            return Err(PipelineError::input(
                &file.path,
                format!(
                    "bit depth mismatch: {} (expected {})",
                    info.sample_format.describe(),
                    reference.sample_format.describe()
                ),
            ));
        }
        reporter.advance(1);
    }
    reporter.finish_stage();

    reporter.info(&format!(
        "Input audio: {} channels @ {} Hz, subtype {}",
        reference.channel_count,
        reference.sample_rate,
        reference.sample_format.describe()
    ));
    Ok(reference.into())
}
