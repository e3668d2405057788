//! Chunked WAV read/write.
//!
//! Reading goes through Symphonia so the pipeline accepts any WAV-family
//! PCM/float container; writing goes through hound, which produces the plain
//! RIFF layout the rest of the toolchain expects. The [`BlockReader`] is the
//! only path to frame data in the crate: it yields fixed-size interleaved
//! blocks and never loads a whole file.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{
    Decoder, DecoderOptions, CODEC_TYPE_NULL, CODEC_TYPE_PCM_F32LE, CODEC_TYPE_PCM_S16LE,
    CODEC_TYPE_PCM_S24LE,
};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

use crate::audio::convert::{Converter, SampleFormat};
use crate::error::PipelineError;

/// Frames per block yielded by [`BlockReader`] unless overridden.
pub const DEFAULT_BLOCK_FRAMES: usize = 32 * 1024;

/// Static parameters of one audio file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioProbe {
    pub sample_rate: u32,
    pub channel_count: usize,
    pub sample_format: SampleFormat,
    pub frame_count: u64,
}

/// Failure while writing through a sink; the caller maps it onto the
/// pipeline-stage error it belongs to.
#[derive(Debug)]
pub struct SinkError {
    pub path: PathBuf,
    pub reason: String,
}

fn open_format(path: &Path) -> Result<Box<dyn FormatReader>, PipelineError> {
    let file = File::open(path)
        .map_err(|err| PipelineError::input(path, format!("cannot open: {err}")))?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| PipelineError::input(path, format!("unreadable container: {err}")))?;

    Ok(probed.format)
}

fn track_probe(path: &Path, reader: &dyn FormatReader) -> Result<(u32, AudioProbe), PipelineError> {
    let track = reader
        .default_track()
        .ok_or_else(|| PipelineError::input(path, "container provides no default track"))?;
    let params = &track.codec_params;

    if params.codec == CODEC_TYPE_NULL {
        return Err(PipelineError::input(path, "unsupported codec"));
    }

    let sample_format = if params.codec == CODEC_TYPE_PCM_S16LE {
        SampleFormat::Pcm16
    } else if params.codec == CODEC_TYPE_PCM_S24LE {
        SampleFormat::Pcm24
    } else if params.codec == CODEC_TYPE_PCM_F32LE {
        SampleFormat::Float
    } else {
        return Err(PipelineError::input(
            path,
            "subtype is not PCM_16, PCM_24, or FLOAT",
        ));
    };

    let sample_rate = params
        .sample_rate
        .ok_or_else(|| PipelineError::input(path, "stream does not advertise a sample rate"))?;
    let channel_count = params
        .channels
        .map(|channels| channels.count())
        .ok_or_else(|| PipelineError::input(path, "stream does not advertise a channel layout"))?;
    let frame_count = params
        .n_frames
        .ok_or_else(|| PipelineError::input(path, "stream does not advertise a frame count"))?;

    Ok((
        track.id,
        AudioProbe {
            sample_rate,
            channel_count,
            sample_format,
            frame_count,
        },
    ))
}

/// Read the static parameters of a WAV file without decoding it.
pub fn probe(path: &Path) -> Result<AudioProbe, PipelineError> {
    let reader = open_format(path)?;
    let (_, info) = track_probe(path, reader.as_ref())?;
    Ok(info)
}

/// Streaming reader yielding interleaved `f32` blocks of a fixed frame count.
///
/// Every block except the last holds exactly `block_frames` frames, so
/// back-to-back blocks concatenate without gaps. The reader is restartable:
/// opening the same path again starts a fresh pass over the file.
pub struct BlockReader {
    path: PathBuf,
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    info: AudioProbe,
    block_frames: usize,
    pending: std::collections::VecDeque<f32>,
    sample_buf: Option<SampleBuffer<f32>>,
    block: Vec<f32>,
    finished: bool,
}

impl BlockReader {
    pub fn open(path: &Path, block_frames: usize) -> Result<Self, PipelineError> {
        let reader = open_format(path)?;
        let (track_id, info) = track_probe(path, reader.as_ref())?;

        let track = reader
            .default_track()
            .ok_or_else(|| PipelineError::input(path, "container provides no default track"))?;
        let decoder = get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|err| PipelineError::input(path, format!("cannot decode: {err}")))?;

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            decoder,
            track_id,
            info,
            block_frames: block_frames.max(1),
            pending: std::collections::VecDeque::new(),
            sample_buf: None,
            block: Vec::new(),
            finished: false,
        })
    }

    pub fn info(&self) -> AudioProbe {
        self.info
    }

    pub fn channel_count(&self) -> usize {
        self.info.channel_count
    }

    /// The next interleaved block, or `None` once the file is exhausted.
    pub fn next_block(&mut self) -> Result<Option<&[f32]>, PipelineError> {
        let want = self.block_frames * self.info.channel_count;
        while self.pending.len() < want && !self.finished {
            self.pull_packet()?;
        }

        if self.pending.is_empty() {
            return Ok(None);
        }

        let mut take = want.min(self.pending.len());
        take -= take % self.info.channel_count;
        self.block.clear();
        self.block.extend(self.pending.drain(..take));
        Ok(Some(&self.block))
    }

    fn pull_packet(&mut self) -> Result<(), PipelineError> {
        let packet = match self.reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref err))
                if err.kind() == io::ErrorKind::UnexpectedEof =>
            {
                self.finished = true;
                return Ok(());
            }
            Err(SymphoniaError::ResetRequired) => {
                self.finished = true;
                return Ok(());
            }
            Err(err) => {
                return Err(PipelineError::input(
                    &self.path,
                    format!("read failed: {err}"),
                ));
            }
        };

        if packet.track_id() != self.track_id {
            return Ok(());
        }

        match self.decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let frames = decoded.frames();
                let needed = frames * spec.channels.count();
                let recreate = match &self.sample_buf {
                    Some(buf) => buf.capacity() < needed,
                    None => true,
                };
                if recreate {
                    self.sample_buf =
                        Some(SampleBuffer::new(decoded.capacity() as u64, spec));
                }
                let buf = self.sample_buf.as_mut().expect("sample buffer allocated");
                buf.copy_interleaved_ref(decoded);
                self.pending.extend(buf.samples().iter().copied());
                Ok(())
            }
            // Recoverable per-packet decode faults are skipped; the stream
            // continues at the next packet.
            Err(SymphoniaError::DecodeError(_)) => Ok(()),
            Err(err) => Err(PipelineError::input(
                &self.path,
                format!("decode failed: {err}"),
            )),
        }
    }
}

/// Buffered frame sink writing interleaved `f32` blocks through a converter.
///
/// The partial file is removed whenever the sink is dropped without a
/// successful [`FrameSink::finalize`], including on write errors.
pub struct FrameSink {
    writer: Option<hound::WavWriter<io::BufWriter<File>>>,
    path: PathBuf,
    converter: Converter,
}

impl FrameSink {
    pub fn create(
        path: &Path,
        sample_rate: u32,
        channels: u16,
        converter: Converter,
    ) -> Result<Self, SinkError> {
        let spec = converter.target_format().wav_spec(sample_rate, channels);
        let writer = hound::WavWriter::create(path, spec).map_err(|err| SinkError {
            path: path.to_path_buf(),
            reason: format!("cannot create: {err}"),
        })?;
        Ok(Self {
            writer: Some(writer),
            path: path.to_path_buf(),
            converter,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one interleaved block.
    pub fn write_block(&mut self, samples: &[f32]) -> Result<(), SinkError> {
        let writer = match self.writer.as_mut() {
            Some(writer) => writer,
            None => {
                return Err(SinkError {
                    path: self.path.clone(),
                    reason: "write after finalize".into(),
                })
            }
        };

        if let Err(err) = self.converter.write_block(writer, samples) {
            let reason = format!("write failed: {err}");
            self.discard();
            return Err(SinkError {
                path: self.path.clone(),
                reason,
            });
        }
        Ok(())
    }

    /// Flush buffers and finalize the container header.
    pub fn finalize(mut self) -> Result<(), SinkError> {
        if let Some(writer) = self.writer.take() {
            if let Err(err) = writer.finalize() {
                let _ = fs::remove_file(&self.path);
                return Err(SinkError {
                    path: self.path.clone(),
                    reason: format!("finalize failed: {err}"),
                });
            }
        }
        Ok(())
    }

    fn discard(&mut self) {
        if self.writer.take().is_some() {
            let _ = fs::remove_file(&self.path);
        }
    }
}

impl Drop for FrameSink {
    fn drop(&mut self) {
        self.discard();
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("output"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Frame sink that stages into `<name>.tmp` and renames on finalize, so a
/// reader never observes a partial file at the destination path.
pub struct AtomicSink {
    sink: Option<FrameSink>,
    staging: PathBuf,
    dest: PathBuf,
}

impl AtomicSink {
    pub fn create(
        dest: &Path,
        sample_rate: u32,
        channels: u16,
        converter: Converter,
    ) -> Result<Self, SinkError> {
        let staging = staging_path(dest);
        let sink = FrameSink::create(&staging, sample_rate, channels, converter)?;
        Ok(Self {
            sink: Some(sink),
            staging,
            dest: dest.to_path_buf(),
        })
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    pub fn write_block(&mut self, samples: &[f32]) -> Result<(), SinkError> {
        match self.sink.as_mut() {
            Some(sink) => sink.write_block(samples),
            None => Err(SinkError {
                path: self.dest.clone(),
                reason: "write after finalize".into(),
            }),
        }
    }

    /// Finalize the staged file and move it into place.
    pub fn finalize(mut self) -> Result<(), SinkError> {
        if let Some(sink) = self.sink.take() {
            sink.finalize()?;
            if let Err(err) = fs::rename(&self.staging, &self.dest) {
                let _ = fs::remove_file(&self.staging);
                return Err(SinkError {
                    path: self.dest.clone(),
                    reason: format!("rename failed: {err}"),
                });
            }
        }
        Ok(())
    }
}
