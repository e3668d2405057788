//! Click-band isolation filter.
//!
//! A 4th-order Butterworth bandpass realized as a cascade of direct-form-II
//! transposed biquad sections (2nd-order high-pass into 2nd-order low-pass).
//! The sections keep their state between blocks, so feeding a file block by
//! block is equivalent to filtering it in one piece.

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type, Q_BUTTERWORTH_F32};

/// Low band edge of the click band, Hz.
pub const BANDPASS_LOW_HZ: f32 = 1_000.0;
/// High band edge of the click band, Hz.
pub const BANDPASS_HIGH_HZ: f32 = 8_000.0;

pub struct BandpassFilter {
    sections: Vec<DirectForm2Transposed<f32>>,
}

impl BandpassFilter {
    /// Build the click bandpass for `sample_rate`.
    ///
    /// The upper edge is clamped below Nyquist so low-rate material stays
    /// processable; the lower edge is kept under the upper one.
    pub fn new(sample_rate: u32) -> Result<Self, String> {
        let fs = (sample_rate as f32).hz();
        let high = BANDPASS_HIGH_HZ.min(sample_rate as f32 * 0.45);
        let low = BANDPASS_LOW_HZ.min(high * 0.5);

        let highpass =
            Coefficients::<f32>::from_params(Type::HighPass, fs, low.hz(), Q_BUTTERWORTH_F32)
                .map_err(|err| format!("high-pass coefficients at {low} Hz: {err:?}"))?;
        let lowpass =
            Coefficients::<f32>::from_params(Type::LowPass, fs, high.hz(), Q_BUTTERWORTH_F32)
                .map_err(|err| format!("low-pass coefficients at {high} Hz: {err:?}"))?;

        Ok(Self {
            sections: vec![
                DirectForm2Transposed::<f32>::new(highpass),
                DirectForm2Transposed::<f32>::new(lowpass),
            ],
        })
    }

    /// Filter one block, appending the result to `output`.
    pub fn process_into(&mut self, input: &[f32], output: &mut Vec<f32>) {
        output.clear();
        output.extend(input.iter().map(|&sample| {
            self.sections
                .iter_mut()
                .fold(sample, |acc, section| section.run(acc))
        }));
    }
}
