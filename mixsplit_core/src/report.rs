//! Reporting capability used by the pipeline to surface progress and
//! diagnostics without binding the library to a terminal.

/// Pipeline stage a progress sequence belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Validate,
    Extract,
    Build,
    Analyze,
    Split,
}

impl Stage {
    /// Human-readable label for progress rendering.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Validate => "Validating input files",
            Stage::Extract => "Extracting channels",
            Stage::Build => "Building tracks",
            Stage::Analyze => "Analyzing click track",
            Stage::Split => "Splitting sections",
        }
    }
}

/// Sink for structured pipeline events.
///
/// `begin_stage`/`advance`/`finish_stage` bracket each pipeline stage with a
/// known total (files or tracks); the three message levels mirror what a
/// terminal front end would print or a batch runner would persist.
pub trait Reporter {
    fn info(&self, _message: &str) {}
    fn warning(&self, _message: &str) {}
    fn error(&self, _message: &str) {}

    fn begin_stage(&self, _stage: Stage, _total: u64) {}
    fn advance(&self, _delta: u64) {}
    fn finish_stage(&self) {}
}

/// Reporter that swallows every event.
pub struct NullReporter;

impl Reporter for NullReporter {}

/// Reporter that forwards messages to the `log` facade.
pub struct LogReporter;

impl Reporter for LogReporter {
    fn info(&self, message: &str) {
        log::info!("{message}");
    }

    fn warning(&self, message: &str) {
        log::warn!("{message}");
    }

    fn error(&self, message: &str) {
        log::error!("{message}");
    }

    fn begin_stage(&self, stage: Stage, total: u64) {
        log::info!("{} ({total} items)", stage.label());
    }
}
