//! Post-hoc splitting of final tracks into numbered section directories.
//!
//! Runs after the track builder: every top-level WAV in the output directory
//! is carved into one file per section under `section_NN/`, all spanning
//! identical sample ranges so the section files stay aligned across tracks
//! in a DAW. The original track is deleted only after every one of its
//! section files has landed.

use std::fs;
use std::path::{Path, PathBuf};

use crate::audio::convert::Converter;
use crate::audio::io::{AtomicSink, BlockReader};
use crate::click::sections::{section_dir_name, SectionInfo};
use crate::error::PipelineError;
use crate::metadata;
use crate::report::{Reporter, Stage};

pub struct SectionSplitter<'a> {
    output_dir: &'a Path,
    converter: Converter,
    block_frames: usize,
    reporter: &'a dyn Reporter,
}

impl<'a> SectionSplitter<'a> {
    pub fn new(
        output_dir: &'a Path,
        converter: Converter,
        block_frames: usize,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            output_dir,
            converter,
            block_frames,
            reporter,
        }
    }

    /// Split every top-level track into the given sections and tag song
    /// sections with their BPM.
    ///
    /// A file whose split fails keeps its original in place and loses any
    /// partial section files; the session only fails when no file could be
    /// split at all. Running on an output directory without top-level WAVs
    /// is a no-op, so a second invocation changes nothing.
    pub fn split(&self, sections: &[SectionInfo]) -> Result<(), PipelineError> {
        if sections.is_empty() {
            return Ok(());
        }
        let files = self.top_level_tracks()?;
        if files.is_empty() {
            return Ok(());
        }

        for section in sections {
            let dir = self
                .output_dir
                .join(section_dir_name(section.section_number, sections.len()));
            fs::create_dir_all(&dir)
                .map_err(|err| PipelineError::split(&dir, format!("cannot create: {err}")))?;
        }

        self.reporter.begin_stage(Stage::Split, files.len() as u64);
        let mut survivors: Vec<String> = Vec::new();
        let mut first_failure: Option<PipelineError> = None;
        for file in &files {
            match self.split_file(file, sections) {
                Ok(()) => {
                    fs::remove_file(file).map_err(|err| {
                        PipelineError::split(file, format!("cannot remove original: {err}"))
                    })?;
                    if let Some(name) = file.file_name().and_then(|n| n.to_str()) {
                        survivors.push(name.to_owned());
                    }
                }
                Err(err) => {
                    self.reporter
                        .error(&format!("{err}; keeping {} unsplit", file.display()));
                    first_failure.get_or_insert(err);
                }
            }
            self.reporter.advance(1);
        }
        self.reporter.finish_stage();

        if survivors.is_empty() {
            return Err(first_failure.unwrap_or_else(|| {
                PipelineError::split(self.output_dir, "no track could be split")
            }));
        }

        self.write_bpm_tags(sections, &survivors);
        Ok(())
    }

    fn top_level_tracks(&self) -> Result<Vec<PathBuf>, PipelineError> {
        let entries = fs::read_dir(self.output_dir)
            .map_err(|err| PipelineError::split(self.output_dir, format!("cannot read: {err}")))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .map(|ext| ext.eq_ignore_ascii_case("wav"))
                        .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }

    /// Carve one track into all section files in a single streaming pass.
    fn split_file(&self, file: &Path, sections: &[SectionInfo]) -> Result<(), PipelineError> {
        let name = file
            .file_name()
            .ok_or_else(|| PipelineError::split(file, "track has no file name"))?;

        let mut written: Vec<PathBuf> = Vec::new();
        let result = self.carve(file, name, sections, &mut written);
        if result.is_err() {
            for path in written {
                let _ = fs::remove_file(path);
            }
        }
        result
    }

    fn carve(
        &self,
        file: &Path,
        name: &std::ffi::OsStr,
        sections: &[SectionInfo],
        written: &mut Vec<PathBuf>,
    ) -> Result<(), PipelineError> {
        let mut reader = BlockReader::open(file, self.block_frames)
            .map_err(|err| PipelineError::split(file, err.to_string()))?;
        let info = reader.info();
        let channels = info.channel_count;

        let mut carry: Vec<f32> = Vec::new();
        let mut carry_offset = 0usize;

        for section in sections {
            let dest = self
                .output_dir
                .join(section_dir_name(section.section_number, sections.len()))
                .join(name);
            let mut sink =
                AtomicSink::create(&dest, info.sample_rate, channels as u16, self.converter)
                    .map_err(|err| PipelineError::split(err.path, err.reason))?;

            let mut remaining = section.frames() as usize * channels;
            while remaining > 0 {
                if carry_offset >= carry.len() {
                    match reader
                        .next_block()
                        .map_err(|err| PipelineError::split(file, err.to_string()))?
                    {
                        Some(block) => {
                            carry.clear();
                            carry.extend_from_slice(block);
                            carry_offset = 0;
                        }
                        None => {
                            return Err(PipelineError::split(
                                file,
                                format!(
                                    "track ended before section {} at sample {}",
                                    section.section_number, section.end_sample
                                ),
                            ));
                        }
                    }
                }
                let take = remaining.min(carry.len() - carry_offset);
                sink.write_block(&carry[carry_offset..carry_offset + take])
                    .map_err(|err| PipelineError::split(err.path, err.reason))?;
                carry_offset += take;
                remaining -= take;
            }

            sink.finalize()
                .map_err(|err| PipelineError::split(err.path, err.reason))?;
            written.push(dest);
        }
        Ok(())
    }

    fn write_bpm_tags(&self, sections: &[SectionInfo], survivors: &[String]) {
        for section in sections {
            let Some(bpm) = section.bpm else { continue };
            let dir = self
                .output_dir
                .join(section_dir_name(section.section_number, sections.len()));
            for name in survivors {
                if let Err(err) = metadata::write_bpm(&dir.join(name), Some(bpm)) {
                    self.reporter.warning(&err.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::io::{probe, FrameSink};
    use crate::report::NullReporter;
    use tempfile::tempdir;

    fn write_track(path: &Path, channels: u16, frames: usize) {
        let mut sink = FrameSink::create(path, 8_000, channels, Converter::Float32).expect("sink");
        let mut block = Vec::with_capacity(frames * channels as usize);
        for frame in 0..frames {
            for _ in 0..channels {
                block.push(frame as f32 / frames as f32 * 0.5);
            }
        }
        sink.write_block(&block).expect("write");
        sink.finalize().expect("finalize");
    }

    fn sections_of(bounds: &[(u64, u64, Option<u32>)]) -> Vec<SectionInfo> {
        let mut sections: Vec<SectionInfo> = bounds
            .iter()
            .map(|&(start, end, bpm)| SectionInfo::new(start, end, bpm))
            .collect();
        crate::click::sections::renumber(&mut sections);
        sections
    }

    #[test]
    fn split_relocates_every_track_into_sections() {
        let out = tempdir().expect("out");
        write_track(&out.path().join("01_Kick.wav"), 1, 1_000);
        write_track(&out.path().join("Overheads.wav"), 2, 1_000);

        let sections = sections_of(&[(0, 600, Some(120)), (600, 1_000, None)]);
        let splitter = SectionSplitter::new(out.path(), Converter::Float32, 128, &NullReporter);
        splitter.split(&sections).expect("split");

        for name in ["01_Kick.wav", "Overheads.wav"] {
            assert!(!out.path().join(name).exists(), "{name} must be consumed");
            let first = out.path().join("section_01").join(name);
            let second = out.path().join("section_02").join(name);
            assert_eq!(probe(&first).expect("probe").frame_count, 600);
            assert_eq!(probe(&second).expect("probe").frame_count, 400);
        }

        // Song section carries the BPM tag, speaking section does not.
        assert_eq!(
            metadata::read_bpm(&out.path().join("section_01").join("01_Kick.wav")),
            Some(120)
        );
        assert_eq!(
            metadata::read_bpm(&out.path().join("section_02").join("01_Kick.wav")),
            None
        );
    }

    #[test]
    fn split_preserves_sample_content_across_boundary() {
        let out = tempdir().expect("out");
        write_track(&out.path().join("01_A.wav"), 1, 500);

        let sections = sections_of(&[(0, 200, None), (200, 500, None)]);
        let splitter = SectionSplitter::new(out.path(), Converter::Float32, 64, &NullReporter);
        splitter.split(&sections).expect("split");

        let read = |path: &Path| {
            let mut reader = BlockReader::open(path, 64).expect("open");
            let mut samples = Vec::new();
            while let Some(block) = reader.next_block().expect("block") {
                samples.extend_from_slice(block);
            }
            samples
        };
        let first = read(&out.path().join("section_01").join("01_A.wav"));
        let second = read(&out.path().join("section_02").join("01_A.wav"));

        assert_eq!(first.len(), 200);
        assert_eq!(second.len(), 300);
        // Continuity across the boundary: the ramp continues seamlessly.
        assert!((first[199] - 199.0 / 500.0 * 0.5).abs() < 1e-6);
        assert!((second[0] - 200.0 / 500.0 * 0.5).abs() < 1e-6);
    }

    #[test]
    fn second_split_is_a_no_op() {
        let out = tempdir().expect("out");
        write_track(&out.path().join("01_A.wav"), 1, 300);

        let sections = sections_of(&[(0, 300, None)]);
        let splitter = SectionSplitter::new(out.path(), Converter::Float32, 64, &NullReporter);
        splitter.split(&sections).expect("first split");
        splitter.split(&sections).expect("second split is a no-op");

        assert!(out.path().join("section_01").join("01_A.wav").exists());
    }

    #[test]
    fn failing_file_keeps_original_and_session_continues() {
        let out = tempdir().expect("out");
        write_track(&out.path().join("01_A.wav"), 1, 1_000);
        // 300 frames cannot cover sections ending at 1000.
        write_track(&out.path().join("02_B.wav"), 1, 300);

        let sections = sections_of(&[(0, 1_000, None)]);
        let splitter = SectionSplitter::new(out.path(), Converter::Float32, 128, &NullReporter);
        splitter.split(&sections).expect("one survivor is enough");

        assert!(!out.path().join("01_A.wav").exists());
        assert!(out.path().join("02_B.wav").exists(), "failed file stays");
        assert!(out.path().join("section_01").join("01_A.wav").exists());
        assert!(!out.path().join("section_01").join("02_B.wav").exists());
    }
}
