//! Final track assembly: mono concatenation and stereo bus interleaving.
//!
//! Segments of one channel are streamed back to back into a single atomic
//! writer, so the junction between segment `k` and `k + 1` is the plain
//! arithmetic sum of their frame counts. Bus tracks read the left and right
//! segment lists in lock-step and stack each pair of mono blocks into a
//! 2-channel block.

use std::path::{Path, PathBuf};

use crate::audio::convert::Converter;
use crate::audio::extract::SegmentMap;
use crate::audio::io::{AtomicSink, BlockReader};
use crate::config::{BusConfig, ChannelAction, ChannelConfig};
use crate::error::PipelineError;
use crate::report::{Reporter, Stage};
use crate::session::CancelFlag;

/// Filesystem-safe rendition of a display name.
///
/// Whitespace runs collapse to a single `_`, anything outside
/// `[A-Za-z0-9 _.-]` becomes `_`, and leading/trailing whitespace or dots are
/// trimmed. Idempotent; an input that collapses to nothing yields `track`.
pub fn sanitize(name: &str) -> String {
    let trimmed = name.trim_matches(|c: char| c.is_whitespace() || c == '.');

    let mut out = String::with_capacity(trimmed.len());
    let mut pending_gap = false;
    for c in trimmed.chars() {
        if c.is_whitespace() {
            pending_gap = true;
            continue;
        }
        if pending_gap {
            out.push('_');
            pending_gap = false;
        }
        if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
            out.push(c);
        } else {
            out.push('_');
        }
    }

    if out.is_empty() {
        "track".to_owned()
    } else {
        out
    }
}

/// Output file name for a mono channel track.
pub fn mono_track_name(channel: &ChannelConfig) -> String {
    format!("{:02}_{}.wav", channel.output_channel, channel.name)
}

/// Output file name for a stereo bus track.
pub fn bus_track_name(bus: &BusConfig) -> String {
    format!("{}.wav", bus.file_name)
}

pub struct TrackBuilder<'a> {
    sample_rate: u32,
    converter: Converter,
    output_dir: &'a Path,
    block_frames: usize,
    reporter: &'a dyn Reporter,
}

impl<'a> TrackBuilder<'a> {
    pub fn new(
        sample_rate: u32,
        converter: Converter,
        output_dir: &'a Path,
        block_frames: usize,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            sample_rate,
            converter,
            output_dir,
            block_frames,
            reporter,
        }
    }

    /// Build every mono track (PROCESS and CLICK channels) and every stereo
    /// bus, returning the final file paths in creation order.
    pub fn build_all(
        &self,
        channels: &[ChannelConfig],
        buses: &[BusConfig],
        segments: &SegmentMap,
        cancel: &CancelFlag,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        let mono: Vec<&ChannelConfig> = channels
            .iter()
            .filter(|c| matches!(c.action, ChannelAction::Process | ChannelAction::Click))
            .collect();

        self.reporter
            .begin_stage(Stage::Build, (mono.len() + buses.len()) as u64);

        let mut tracks = Vec::with_capacity(mono.len() + buses.len());
        for channel in mono {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let channel_segments = segments.get(&channel.channel).ok_or_else(|| {
                PipelineError::InternalInvariant(format!(
                    "no segments extracted for channel {}",
                    channel.channel
                ))
            })?;
            tracks.push(self.build_mono(channel, channel_segments)?);
            self.reporter.advance(1);
        }

        for bus in buses {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            tracks.push(self.build_stereo(bus, segments)?);
            self.reporter.advance(1);
        }
        self.reporter.finish_stage();

        self.reporter
            .info(&format!("Tracks written to {}", self.output_dir.display()));
        Ok(tracks)
    }

    fn build_mono(
        &self,
        channel: &ChannelConfig,
        segments: &[PathBuf],
    ) -> Result<PathBuf, PipelineError> {
        let dest = self.output_dir.join(mono_track_name(channel));
        let mut sink = AtomicSink::create(&dest, self.sample_rate, 1, self.converter)
            .map_err(|err| PipelineError::build(err.path, err.reason))?;

        for segment in segments {
            let mut reader = BlockReader::open(segment, self.block_frames)
                .map_err(|err| PipelineError::build(&dest, err.to_string()))?;
            while let Some(block) = reader
                .next_block()
                .map_err(|err| PipelineError::build(&dest, err.to_string()))?
            {
                sink.write_block(block)
                    .map_err(|err| PipelineError::build(err.path, err.reason))?;
            }
        }

        sink.finalize()
            .map_err(|err| PipelineError::build(err.path, err.reason))?;
        Ok(dest)
    }

    fn build_stereo(
        &self,
        bus: &BusConfig,
        segments: &SegmentMap,
    ) -> Result<PathBuf, PipelineError> {
        let left = segments.get(&bus.left).ok_or_else(|| {
            PipelineError::InternalInvariant(format!(
                "bus {} left channel {} was not extracted",
                bus.file_name, bus.left
            ))
        })?;
        let right = segments.get(&bus.right).ok_or_else(|| {
            PipelineError::InternalInvariant(format!(
                "bus {} right channel {} was not extracted",
                bus.file_name, bus.right
            ))
        })?;
        if left.len() != right.len() {
            return Err(PipelineError::InternalInvariant(format!(
                "bus {} segment mismatch: {} left vs {} right",
                bus.file_name,
                left.len(),
                right.len()
            )));
        }

        let dest = self.output_dir.join(bus_track_name(bus));
        let mut sink = AtomicSink::create(&dest, self.sample_rate, 2, self.converter)
            .map_err(|err| PipelineError::build(err.path, err.reason))?;

        let mut stereo = Vec::with_capacity(self.block_frames * 2);
        for (left_path, right_path) in left.iter().zip(right) {
            let mut left_reader = BlockReader::open(left_path, self.block_frames)
                .map_err(|err| PipelineError::build(&dest, err.to_string()))?;
            let mut right_reader = BlockReader::open(right_path, self.block_frames)
                .map_err(|err| PipelineError::build(&dest, err.to_string()))?;

            loop {
                let left_block = left_reader
                    .next_block()
                    .map_err(|err| PipelineError::build(&dest, err.to_string()))?;
                let right_block = right_reader
                    .next_block()
                    .map_err(|err| PipelineError::build(&dest, err.to_string()))?;

                match (left_block, right_block) {
                    (None, None) => break,
                    (Some(left_block), Some(right_block)) => {
                        let frames = left_block.len().min(right_block.len());
                        stereo.clear();
                        for frame in 0..frames {
                            stereo.push(left_block[frame]);
                            stereo.push(right_block[frame]);
                        }
                        sink.write_block(&stereo)
                            .map_err(|err| PipelineError::build(err.path, err.reason))?;
                    }
                    _ => {
                        return Err(PipelineError::InternalInvariant(format!(
                            "bus {} segments {} and {} differ in frame count",
                            bus.file_name,
                            left_path.display(),
                            right_path.display()
                        )));
                    }
                }
            }
        }

        sink.finalize()
            .map_err(|err| PipelineError::build(err.path, err.reason))?;
        Ok(dest)
    }
}
