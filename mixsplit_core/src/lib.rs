//! Core pipeline for de-interleaving multitrack mixing-console recordings.
//!
//! A recording session arrives as a directory of sequentially numbered
//! multichannel WAV files. The pipeline validates them, streams every file
//! once to fan its channels out into mono segments, concatenates those
//! segments into final per-channel tracks and stereo bus tracks, and, when a
//! click channel is configured, detects musical sections on the click track
//! and splits every output at the detected sample positions with the tempo
//! embedded as a `TBPM` tag.
//!
//! The crate never loads a whole file: all frame data moves through the
//! fixed-size block reader in [`audio::io`]. Callers drive a session through
//! [`session::run`] or, with a custom reporter and cancellation flag,
//! [`session::run_with_reporter`]:
//!
//! ```no_run
//! use mixsplit_core::{run, ChannelAction, ChannelConfig, SessionOptions};
//!
//! # fn main() -> Result<(), mixsplit_core::PipelineError> {
//! let options = SessionOptions::new("recording/", "out/");
//! let channels = vec![
//!     ChannelConfig::new(1, "Kick", ChannelAction::Process),
//!     ChannelConfig::new(2, "Click", ChannelAction::Click),
//! ];
//! let report = run(&options, channels, vec![])?;
//! println!("{} tracks written", report.tracks.len());
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod click;
pub mod config;
pub mod error;
pub mod metadata;
pub mod report;
pub mod session;
pub mod split;
pub mod tracks;

pub use audio::convert::{Converter, SampleFormat};
pub use audio::discovery::AudioParameters;
pub use audio::extract::SegmentMap;
pub use audio::io::DEFAULT_BLOCK_FRAMES;
pub use click::sections::{SectionInfo, SectionType};
pub use config::{
    BitDepth, BusConfig, ChannelAction, ChannelConfig, SectionSplittingConfig,
};
pub use error::PipelineError;
pub use report::{LogReporter, NullReporter, Reporter, Stage};
pub use session::{
    run, run_with_reporter, CancelFlag, SessionOptions, SessionReport,
};
