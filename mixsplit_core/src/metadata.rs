//! BPM metadata on WAV files, stored as an ID3 `TBPM` text frame in the
//! RIFF container. Tag writes never touch the audio samples; the file only
//! grows by the tag chunk.

use std::path::Path;

use id3::{Tag, TagLike, Version};

use crate::error::PipelineError;

/// Write (or remove, when `bpm` is `None`) the `TBPM` frame of `path`.
pub fn write_bpm(path: &Path, bpm: Option<u32>) -> Result<(), PipelineError> {
    let mut tag = Tag::read_from_wav_path(path).unwrap_or_else(|_| Tag::new());
    match bpm {
        Some(value) => tag.set_text("TBPM", value.to_string()),
        None => {
            tag.remove("TBPM");
        }
    }
    tag.write_to_wav_path(path, Version::Id3v24)
        .map_err(|err| PipelineError::MetadataFailed {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
}

/// Read the integer `TBPM` frame of `path`, if present and parseable.
pub fn read_bpm(path: &Path) -> Option<u32> {
    let tag = Tag::read_from_wav_path(path).ok()?;
    let frame = tag.get("TBPM")?;
    frame.content().text()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::convert::Converter;
    use crate::audio::io::{BlockReader, FrameSink};
    use tempfile::tempdir;

    fn write_tone(path: &Path) -> Vec<f32> {
        let samples: Vec<f32> = (0..500).map(|n| (n as f32 * 0.01).sin() * 0.4).collect();
        let mut sink = FrameSink::create(path, 8_000, 1, Converter::Float32).expect("sink");
        sink.write_block(&samples).expect("write");
        sink.finalize().expect("finalize");
        samples
    }

    fn read_samples(path: &Path) -> Vec<f32> {
        let mut reader = BlockReader::open(path, 128).expect("open");
        let mut samples = Vec::new();
        while let Some(block) = reader.next_block().expect("block") {
            samples.extend_from_slice(block);
        }
        samples
    }

    #[test]
    fn bpm_round_trips() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("track.wav");
        write_tone(&path);

        assert_eq!(read_bpm(&path), None);
        write_bpm(&path, Some(128)).expect("write bpm");
        assert_eq!(read_bpm(&path), Some(128));
    }

    #[test]
    fn none_removes_existing_frame() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("track.wav");
        write_tone(&path);

        write_bpm(&path, Some(96)).expect("write bpm");
        write_bpm(&path, None).expect("remove bpm");
        assert_eq!(read_bpm(&path), None);
    }

    #[test]
    fn tag_write_leaves_samples_untouched() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("track.wav");
        let original = write_tone(&path);

        write_bpm(&path, Some(140)).expect("write bpm");
        assert_eq!(read_samples(&path), original);
    }
}
