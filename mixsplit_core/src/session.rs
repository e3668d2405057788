//! Session orchestration.
//!
//! Sequences discovery → validation → extraction → track building, then the
//! optional click analysis and section splitting, and owns the output and
//! temp directory lifecycles. The temp directory is released on every exit
//! path, including errors and panics, through a drop guard.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::audio::convert::Converter;
use crate::audio::discovery::{self, AudioParameters};
use crate::audio::extract::Extractor;
use crate::audio::io::{self, DEFAULT_BLOCK_FRAMES};
use crate::click::analyzer::ClickAnalyzer;
use crate::click::sections::{merge_short, renumber, SectionInfo};
use crate::config::{
    click_channel, resolve_channels, BitDepth, BusConfig, ChannelConfig, SectionSplittingConfig,
};
use crate::error::PipelineError;
use crate::report::{LogReporter, Reporter};
use crate::split::SectionSplitter;
use crate::tracks::{mono_track_name, TrackBuilder};

/// Cooperative cancellation flag, checked between pipeline components and
/// between input files inside the extractor.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag {
    inner: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::Relaxed)
    }
}

/// Per-session options besides the channel and bus lists.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub bit_depth: BitDepth,
    /// Frames per block for every reader and writer of the session.
    pub block_frames: usize,
    pub keep_temp: bool,
    pub section_splitting: SectionSplittingConfig,
    /// When set, the final section list is written here as JSON.
    pub session_json: Option<PathBuf>,
}

impl SessionOptions {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            bit_depth: BitDepth::Source,
            block_frames: DEFAULT_BLOCK_FRAMES,
            keep_temp: false,
            section_splitting: SectionSplittingConfig::default(),
            session_json: None,
        }
    }
}

/// Results of a completed session.
#[derive(Debug)]
pub struct SessionReport {
    /// The output directory actually used, after conflict resolution.
    pub output_dir: PathBuf,
    pub parameters: AudioParameters,
    /// Final track paths as produced by the builder. When section splitting
    /// ran, these have been relocated under `section_NN/` directories.
    pub tracks: Vec<PathBuf>,
    /// Sections used by the splitter; empty when splitting did not run.
    pub sections: Vec<SectionInfo>,
}

/// Run a full session with default logging and no cancellation.
pub fn run(
    options: &SessionOptions,
    channels: Vec<ChannelConfig>,
    buses: Vec<BusConfig>,
) -> Result<SessionReport, PipelineError> {
    run_with_reporter(options, channels, buses, &LogReporter, &CancelFlag::new())
}

/// Run a full session, reporting through `reporter` and honouring `cancel`.
pub fn run_with_reporter(
    options: &SessionOptions,
    channels: Vec<ChannelConfig>,
    buses: Vec<BusConfig>,
    reporter: &dyn Reporter,
    cancel: &CancelFlag,
) -> Result<SessionReport, PipelineError> {
    options.section_splitting.validate()?;

    let files = discovery::discover(&options.input_dir)?;
    reporter.info(&format!(
        "Discovered {} input files in {}",
        files.len(),
        options.input_dir.display()
    ));
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    let params = discovery::validate(&files, reporter)?;
    let channels = resolve_channels(channels, &buses, params.channel_count as u32)?;
    let converter = Converter::resolve(options.bit_depth, params.sample_format);

    let output_dir = resolve_output_dir(&options.output_dir, reporter)?;
    fs::create_dir_all(&output_dir)?;
    let temp_dir = output_dir.join("temp");
    let _temp_guard = TempGuard {
        path: temp_dir.clone(),
        keep: options.keep_temp,
        reporter,
    };

    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    let extracted: Vec<u32> = channels
        .iter()
        .filter(|c| c.action.extracted())
        .map(|c| c.channel)
        .collect();
    let extractor = Extractor::new(
        params,
        converter,
        &temp_dir,
        options.block_frames,
        reporter,
        cancel,
    );
    let segments = extractor.extract(&files, &extracted)?;

    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    let builder = TrackBuilder::new(
        params.sample_rate,
        converter,
        &output_dir,
        options.block_frames,
        reporter,
    );
    let tracks = builder.build_all(&channels, &buses, &segments, cancel)?;

    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    let mut sections = Vec::new();
    if options.section_splitting.enabled {
        match click_channel(&channels) {
            Some(click) => {
                let click_path = output_dir.join(mono_track_name(click));
                sections = analyze_click_track(
                    &click_path,
                    options,
                    params.sample_rate,
                    reporter,
                )?;
                if sections.is_empty() {
                    reporter.warning("No sections detected; leaving tracks unsplit");
                } else {
                    report_sections(&sections, params.sample_rate, reporter);
                    let splitter = SectionSplitter::new(
                        &output_dir,
                        converter,
                        options.block_frames,
                        reporter,
                    );
                    splitter.split(&sections)?;
                }
            }
            None => {
                reporter.warning("Section splitting enabled but no CLICK channel is configured");
            }
        }
    }

    if let Some(json_path) = &options.session_json {
        if let Err(err) = write_session_json(json_path, &sections, params.sample_rate) {
            reporter.warning(&format!("session JSON not written: {err}"));
        } else {
            reporter.info(&format!("Session JSON written to {}", json_path.display()));
        }
    }

    Ok(SessionReport {
        output_dir,
        parameters: params,
        tracks,
        sections,
    })
}

/// Analyze the click output; analysis faults degrade to one whole-file
/// speaking section instead of failing the session.
fn analyze_click_track(
    click_path: &Path,
    options: &SessionOptions,
    sample_rate: u32,
    reporter: &dyn Reporter,
) -> Result<Vec<SectionInfo>, PipelineError> {
    let analyzer = ClickAnalyzer::new(&options.section_splitting, options.block_frames);
    let raw = match analyzer.analyze(click_path) {
        Ok(sections) => sections,
        Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
        Err(err) => {
            reporter.warning(&format!("{err}; falling back to a single section"));
            whole_file_section(click_path)
        }
    };

    Ok(merge_short(
        raw,
        options.section_splitting.min_section_length_seconds,
        sample_rate,
    ))
}

fn whole_file_section(click_path: &Path) -> Vec<SectionInfo> {
    match io::probe(click_path) {
        Ok(info) if info.frame_count > 0 => {
            let mut sections = vec![SectionInfo::new(0, info.frame_count, None)];
            renumber(&mut sections);
            sections
        }
        _ => Vec::new(),
    }
}

fn report_sections(sections: &[SectionInfo], sample_rate: u32, reporter: &dyn Reporter) {
    reporter.info(&format!("Detected {} sections", sections.len()));
    for section in sections {
        let bpm = section
            .bpm
            .map(|bpm| format!("{bpm} BPM"))
            .unwrap_or_else(|| "no BPM".into());
        reporter.info(&format!(
            "  section_{:02}: {:?} at {}, {:.1} s, {}",
            section.section_number,
            section.section_type,
            format_hms(section.start_seconds(sample_rate)),
            section.duration_seconds(sample_rate),
            bpm
        ));
    }
}

/// Pick the output directory, suffixing `_v2`, `_v3`, ... when the requested
/// one already holds files. An existing empty directory is reused.
fn resolve_output_dir(requested: &Path, reporter: &dyn Reporter) -> Result<PathBuf, PipelineError> {
    const MAX_VERSIONS: u32 = 9;

    if dir_is_usable(requested) {
        return Ok(requested.to_path_buf());
    }

    let name = requested
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("output");
    for version in 2..=MAX_VERSIONS {
        let candidate = requested.with_file_name(format!("{name}_v{version}"));
        if dir_is_usable(&candidate) {
            reporter.warning(&format!(
                "Output directory {} is in use, writing to {}",
                requested.display(),
                candidate.display()
            ));
            return Ok(candidate);
        }
    }
    Err(PipelineError::OutputDirExhausted(requested.to_path_buf()))
}

fn dir_is_usable(path: &Path) -> bool {
    if !path.exists() {
        return true;
    }
    path.is_dir()
        && fs::read_dir(path)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false)
}

struct TempGuard<'a> {
    path: PathBuf,
    keep: bool,
    reporter: &'a dyn Reporter,
}

impl Drop for TempGuard<'_> {
    fn drop(&mut self) {
        if self.keep {
            self.reporter
                .info(&format!("Keeping temporary directory {}", self.path.display()));
            return;
        }
        if self.path.exists() {
            if let Err(err) = fs::remove_dir_all(&self.path) {
                self.reporter.warning(&format!(
                    "Could not remove temporary directory {}: {err}",
                    self.path.display()
                ));
            } else {
                self.reporter.info(&format!(
                    "Removed temporary directory {}",
                    self.path.display()
                ));
            }
        }
    }
}

#[derive(Serialize)]
struct SectionRecord {
    section: String,
    start_seconds: f64,
    start_hms: String,
    duration_seconds: f64,
    duration_hms: String,
    #[serde(rename = "type")]
    section_type: crate::click::sections::SectionType,
    bpm: Option<u32>,
}

fn format_hms(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!(
        "{:02}:{:02}:{:02}",
        total / 3_600,
        (total % 3_600) / 60,
        total % 60
    )
}

fn round_millis(seconds: f64) -> f64 {
    (seconds * 1_000.0).round() / 1_000.0
}

/// Write the final section list as JSON, staging and renaming so readers
/// never observe a partial file.
pub fn write_session_json(
    path: &Path,
    sections: &[SectionInfo],
    sample_rate: u32,
) -> Result<(), PipelineError> {
    let records: Vec<SectionRecord> = sections
        .iter()
        .map(|section| {
            let start = section.start_seconds(sample_rate);
            let duration = section.duration_seconds(sample_rate);
            SectionRecord {
                section: format!("section_{:02}", section.section_number),
                start_seconds: round_millis(start),
                start_hms: format_hms(start),
                duration_seconds: round_millis(duration),
                duration_hms: format_hms(duration),
                section_type: section.section_type,
                bpm: section.bpm,
            }
        })
        .collect();

    let json = serde_json::to_string_pretty(&records)
        .map_err(|err| PipelineError::Io(std::io::Error::other(err)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, json)?;
    if let Err(err) = fs::rename(&staging, path) {
        let _ = fs::remove_file(&staging);
        return Err(err.into());
    }
    Ok(())
}
