use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while processing a recording session.
///
/// Variants follow the pipeline stages: anything raised before extraction is
/// a configuration or input problem, later variants carry the path that was
/// being read or written when the stage failed.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The input directory or one of its files cannot be used.
    #[error("invalid input {path}: {reason}")]
    InputInvalid { path: PathBuf, reason: String },

    /// The channel, bus, or section-splitting configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// De-interleaving an input file into mono segments failed.
    #[error("extraction failed for {path}: {reason}")]
    ExtractionFailed { path: PathBuf, reason: String },

    /// Concatenating or interleaving segments into a final track failed.
    #[error("track build failed for {path}: {reason}")]
    BuildFailed { path: PathBuf, reason: String },

    /// The click-track signal chain failed; callers may fall back to a
    /// single whole-file section.
    #[error("click analysis failed for {path}: {reason}")]
    AnalysisFailed { path: PathBuf, reason: String },

    /// Splitting final tracks into section directories failed for every file.
    #[error("section split failed for {path}: {reason}")]
    SplitFailed { path: PathBuf, reason: String },

    /// A BPM tag could not be written. Non-fatal at the session level.
    #[error("metadata write failed for {path}: {reason}")]
    MetadataFailed { path: PathBuf, reason: String },

    /// A condition the extractor guarantees was observed to be violated.
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),

    /// No free output directory name could be derived from the requested one.
    #[error("output directory {0} exists and no versioned alternative is free")]
    OutputDirExhausted(PathBuf),

    /// Processing was cancelled cooperatively.
    #[error("processing cancelled")]
    Cancelled,

    /// Wrapper around IO errors raised outside any stage-specific context.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PipelineError {
    pub(crate) fn input(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InputInvalid {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn extraction(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ExtractionFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn build(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::BuildFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn analysis(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::AnalysisFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn split(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SplitFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
