//! De-interleaving of multichannel input files into per-channel mono
//! segments.
//!
//! Each input file is read exactly once. Every extracted channel gets one
//! segment writer per input file, so after a full pass the segment list of a
//! channel mirrors the input file list index for index.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::audio::convert::Converter;
use crate::audio::discovery::{AudioParameters, InputFile};
use crate::audio::io::{BlockReader, FrameSink};
use crate::error::PipelineError;
use crate::report::{Reporter, Stage};
use crate::session::CancelFlag;

/// Segment paths per channel number, in input-file order.
pub type SegmentMap = BTreeMap<u32, Vec<PathBuf>>;

/// Name of the mono segment for `channel` produced from input file
/// `file_index` (1-based).
pub fn segment_name(channel: u32, file_index: usize) -> String {
    format!("ch{channel:02}_{file_index:04}.wav")
}

pub struct Extractor<'a> {
    params: AudioParameters,
    converter: Converter,
    temp_dir: &'a Path,
    block_frames: usize,
    reporter: &'a dyn Reporter,
    cancel: &'a CancelFlag,
}

impl<'a> Extractor<'a> {
    pub fn new(
        params: AudioParameters,
        converter: Converter,
        temp_dir: &'a Path,
        block_frames: usize,
        reporter: &'a dyn Reporter,
        cancel: &'a CancelFlag,
    ) -> Self {
        Self {
            params,
            converter,
            temp_dir,
            block_frames,
            reporter,
            cancel,
        }
    }

    /// De-interleave `files` into mono segments for `channels`.
    ///
    /// `channels` holds the 1-based numbers of every channel whose action
    /// requires extraction. After success, each channel maps to exactly
    /// `files.len()` segments whose frame counts match the input files.
    ///
    /// # Errors
    /// Any read or write fault is fatal and surfaces as
    /// [`PipelineError::ExtractionFailed`]; segments of the failing input
    /// file are removed first. Earlier files' segments are left for the
    /// orchestrator's temp cleanup.
    pub fn extract(
        &self,
        files: &[InputFile],
        channels: &[u32],
    ) -> Result<SegmentMap, PipelineError> {
        fs::create_dir_all(self.temp_dir).map_err(|err| {
            PipelineError::extraction(self.temp_dir, format!("cannot create temp dir: {err}"))
        })?;

        let mut segments: SegmentMap = channels.iter().map(|&ch| (ch, Vec::new())).collect();

        self.reporter.begin_stage(Stage::Extract, files.len() as u64);
        for (index, file) in files.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let file_index = index + 1;
            let paths: Vec<(u32, PathBuf)> = channels
                .iter()
                .map(|&ch| (ch, self.temp_dir.join(segment_name(ch, file_index))))
                .collect();

            if let Err(err) = self.extract_file(&file.path, &paths) {
                for (_, path) in &paths {
                    let _ = fs::remove_file(path);
                }
                return Err(match err {
                    PipelineError::Cancelled => PipelineError::Cancelled,
                    other => PipelineError::extraction(&file.path, other.to_string()),
                });
            }

            for (ch, path) in paths {
                segments
                    .get_mut(&ch)
                    .expect("channel registered above")
                    .push(path);
            }
            self.reporter.advance(1);
        }
        self.reporter.finish_stage();

        self.reporter.info(&format!(
            "Wrote mono segments to {} as {}",
            self.temp_dir.display(),
            self.converter.target_format().describe()
        ));
        Ok(segments)
    }

    fn extract_file(
        &self,
        input: &Path,
        paths: &[(u32, PathBuf)],
    ) -> Result<(), PipelineError> {
        let mut reader = BlockReader::open(input, self.block_frames)?;
        if reader.channel_count() != self.params.channel_count {
            return Err(PipelineError::InternalInvariant(format!(
                "{} changed to {} channels after validation",
                input.display(),
                reader.channel_count()
            )));
        }

        let mut sinks: Vec<(usize, FrameSink)> = Vec::with_capacity(paths.len());
        for (ch, path) in paths {
            let sink = FrameSink::create(path, self.params.sample_rate, 1, self.converter)
                .map_err(|err| PipelineError::extraction(err.path, err.reason))?;
            sinks.push((*ch as usize - 1, sink));
        }

        let channel_count = self.params.channel_count;
        let mut column = Vec::with_capacity(self.block_frames);
        while let Some(block) = reader.next_block()? {
            let frames = block.len() / channel_count;
            for (column_index, sink) in &mut sinks {
                column.clear();
                column.extend(
                    (0..frames).map(|frame| block[frame * channel_count + *column_index]),
                );
                sink.write_block(&column)
                    .map_err(|err| PipelineError::extraction(err.path, err.reason))?;
            }
        }

        for (_, sink) in sinks {
            sink.finalize()
                .map_err(|err| PipelineError::extraction(err.path, err.reason))?;
        }
        Ok(())
    }
}
