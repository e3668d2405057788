//! Bit-depth conversion between the pipeline's floating-point frames and the
//! on-disk sample format.
//!
//! A session resolves its converter once, before anything is written, and
//! every writer shares it. Conversion is stateless per block: scale, round
//! half to even, clip to the integer range, cast.

use crate::config::BitDepth;

/// On-disk sample format of a WAV stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleFormat {
    Pcm16,
    Pcm24,
    Float,
}

impl SampleFormat {
    /// The matching hound spec for `channels` at `sample_rate`.
    pub fn wav_spec(self, sample_rate: u32, channels: u16) -> hound::WavSpec {
        let (bits_per_sample, sample_format) = match self {
            SampleFormat::Pcm16 => (16, hound::SampleFormat::Int),
            SampleFormat::Pcm24 => (24, hound::SampleFormat::Int),
            SampleFormat::Float => (32, hound::SampleFormat::Float),
        };
        hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample,
            sample_format,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            SampleFormat::Pcm16 => "PCM_16",
            SampleFormat::Pcm24 => "PCM_24",
            SampleFormat::Float => "FLOAT",
        }
    }
}

/// Converter from normalized `f32` frames to one target [`SampleFormat`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Converter {
    Int16,
    Int24,
    Float32,
}

impl Converter {
    /// Resolve the requested bit depth against the source format.
    ///
    /// [`BitDepth::Source`] resolves to the variant matching the session's
    /// input subtype; the resolution happens here, once, never mid-pipeline.
    pub fn resolve(requested: BitDepth, source: SampleFormat) -> Self {
        match requested {
            BitDepth::Int16 => Converter::Int16,
            BitDepth::Int24 => Converter::Int24,
            BitDepth::Float32 => Converter::Float32,
            BitDepth::Source => match source {
                SampleFormat::Pcm16 => Converter::Int16,
                SampleFormat::Pcm24 => Converter::Int24,
                SampleFormat::Float => Converter::Float32,
            },
        }
    }

    /// The wire subtype this converter produces.
    pub fn target_format(self) -> SampleFormat {
        match self {
            Converter::Int16 => SampleFormat::Pcm16,
            Converter::Int24 => SampleFormat::Pcm24,
            Converter::Float32 => SampleFormat::Float,
        }
    }

    /// Append a block of interleaved samples to `writer` in the target format.
    pub fn write_block<W>(
        self,
        writer: &mut hound::WavWriter<W>,
        samples: &[f32],
    ) -> Result<(), hound::Error>
    where
        W: std::io::Write + std::io::Seek,
    {
        match self {
            Converter::Int16 => {
                for &sample in samples {
                    writer.write_sample(quantize_i16(sample))?;
                }
            }
            Converter::Int24 => {
                for &sample in samples {
                    writer.write_sample(quantize_i24(sample))?;
                }
            }
            Converter::Float32 => {
                for &sample in samples {
                    writer.write_sample(sample)?;
                }
            }
        }
        Ok(())
    }
}

fn quantize_i16(sample: f32) -> i16 {
    let scaled = (f64::from(sample) * 32_768.0).round_ties_even();
    scaled.clamp(-32_768.0, 32_767.0) as i16
}

fn quantize_i24(sample: f32) -> i32 {
    let scaled = (f64::from(sample) * 8_388_608.0).round_ties_even();
    scaled.clamp(-8_388_608.0, 8_388_607.0) as i32
}
