//! Channel, bus, and section-splitting configuration.
//!
//! The library receives an already-parsed channel and bus list; loading that
//! list from disk is the caller's concern. [`resolve_channels`] completes a
//! partial channel list against the detected channel count and enforces the
//! cross-channel rules, so that the extractor and track builder can rely on a
//! fully populated, conflict-free configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use log::warn;

use crate::error::PipelineError;
use crate::tracks::sanitize;

/// What to do with a source channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelAction {
    /// Extract and write a mono track.
    Process,
    /// Extract for use by a stereo bus only.
    Bus,
    /// Never extract.
    Skip,
    /// Extract, write a mono track, and feed the click analyzer.
    Click,
}

impl ChannelAction {
    /// Whether a channel with this action must be de-interleaved.
    pub fn extracted(self) -> bool {
        !matches!(self, ChannelAction::Skip)
    }
}

/// Configuration for one source channel.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// 1-based channel number in the source files.
    pub channel: u32,
    /// Sanitized display name used in the output filename.
    pub name: String,
    pub action: ChannelAction,
    /// Channel number used for the `NN_` filename prefix. Defaults to
    /// `channel`, letting a replacement channel keep its original slot.
    pub output_channel: u32,
}

impl ChannelConfig {
    pub fn new(channel: u32, name: &str, action: ChannelAction) -> Self {
        Self {
            channel,
            name: sanitize(name),
            action,
            output_channel: channel,
        }
    }

    pub fn with_output_channel(mut self, output_channel: u32) -> Self {
        self.output_channel = output_channel;
        self
    }

    fn generated(channel: u32, action: ChannelAction) -> Self {
        Self::new(channel, &format!("Ch {channel:02}"), action)
    }
}

/// Configuration for a stereo bus assembled from two extracted channels.
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Sanitized output file stem, e.g. `07_Overheads`.
    pub file_name: String,
    /// Source channel feeding the left column.
    pub left: u32,
    /// Source channel feeding the right column.
    pub right: u32,
}

impl BusConfig {
    pub fn new(file_name: &str, left: u32, right: u32) -> Self {
        Self {
            file_name: sanitize(file_name),
            left,
            right,
        }
    }
}

/// Target bit depth for every written file of a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BitDepth {
    /// Resolve to whatever the input files carry.
    #[default]
    Source,
    Int16,
    Int24,
    Float32,
}

impl fmt::Display for BitDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            BitDepth::Source => "source",
            BitDepth::Int16 => "16",
            BitDepth::Int24 => "24",
            BitDepth::Float32 => "32float",
        };
        f.write_str(token)
    }
}

impl FromStr for BitDepth {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "source" => Ok(BitDepth::Source),
            "16" => Ok(BitDepth::Int16),
            "24" => Ok(BitDepth::Int24),
            "32float" => Ok(BitDepth::Float32),
            other => Err(format!(
                "unknown bit depth '{other}' (expected source, 16, 24, or 32float)"
            )),
        }
    }
}

/// Parameters for click-based section splitting.
#[derive(Clone, Debug)]
pub struct SectionSplittingConfig {
    pub enabled: bool,
    /// Inter-onset gap that separates two sections, in seconds.
    pub gap_threshold_seconds: f64,
    /// Sections shorter than this are merged into a neighbour.
    pub min_section_length_seconds: f64,
    /// Minimum BPM difference that starts a new section within a run.
    pub bpm_change_threshold: u32,
}

impl Default for SectionSplittingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            gap_threshold_seconds: 3.0,
            min_section_length_seconds: 15.0,
            bpm_change_threshold: 1,
        }
    }
}

impl SectionSplittingConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.gap_threshold_seconds.is_finite() || self.gap_threshold_seconds <= 0.0 {
            return Err(PipelineError::ConfigInvalid(format!(
                "gap threshold must be positive, got {}",
                self.gap_threshold_seconds
            )));
        }
        if !self.min_section_length_seconds.is_finite() || self.min_section_length_seconds <= 0.0 {
            return Err(PipelineError::ConfigInvalid(format!(
                "minimum section length must be positive, got {}",
                self.min_section_length_seconds
            )));
        }
        if self.bpm_change_threshold < 1 {
            return Err(PipelineError::ConfigInvalid(
                "BPM change threshold must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Complete a channel list against the detected channel count and check the
/// cross-channel and bus rules.
///
/// Missing channel numbers are auto-created: with action [`ChannelAction::Bus`]
/// when a bus references them, otherwise [`ChannelAction::Process`]. The
/// returned list covers `1..=detected_channels`, sorted by channel number.
///
/// # Errors
/// Returns [`PipelineError::ConfigInvalid`] for duplicate channel numbers,
/// channels or bus slots outside `1..=detected_channels`, buses whose slots
/// collide or reference a `PROCESS`/`SKIP` channel, or more than one click
/// channel.
pub fn resolve_channels(
    channels: Vec<ChannelConfig>,
    buses: &[BusConfig],
    detected_channels: u32,
) -> Result<Vec<ChannelConfig>, PipelineError> {
    if detected_channels == 0 {
        return Err(PipelineError::ConfigInvalid(
            "input files carry no channels".into(),
        ));
    }

    let mut by_number: BTreeMap<u32, ChannelConfig> = BTreeMap::new();
    for channel in channels {
        if channel.channel == 0 || channel.channel > detected_channels {
            return Err(PipelineError::ConfigInvalid(format!(
                "channel {} is outside the detected range 1..={detected_channels}",
                channel.channel
            )));
        }
        if by_number.insert(channel.channel, channel.clone()).is_some() {
            return Err(PipelineError::ConfigInvalid(format!(
                "channel {} is configured more than once",
                channel.channel
            )));
        }
    }

    for bus in buses {
        for slot in [bus.left, bus.right] {
            if slot == 0 || slot > detected_channels {
                return Err(PipelineError::ConfigInvalid(format!(
                    "bus {} references channel {slot} outside 1..={detected_channels}",
                    bus.file_name
                )));
            }
        }
        if bus.left == bus.right {
            return Err(PipelineError::ConfigInvalid(format!(
                "bus {} assigns channel {} to both slots",
                bus.file_name, bus.left
            )));
        }
        for slot in [bus.left, bus.right] {
            match by_number.get(&slot) {
                Some(config) if !matches!(config.action, ChannelAction::Bus | ChannelAction::Click) => {
                    return Err(PipelineError::ConfigInvalid(format!(
                        "bus {} references channel {slot} whose action is {:?}",
                        bus.file_name, config.action
                    )));
                }
                Some(_) => {}
                None => {
                    warn!("auto-creating channel {slot:02} for bus {} with action BUS", bus.file_name);
                    by_number.insert(slot, ChannelConfig::generated(slot, ChannelAction::Bus));
                }
            }
        }
    }

    for channel in 1..=detected_channels {
        by_number.entry(channel).or_insert_with(|| {
            warn!("auto-creating missing channel {channel:02} with action PROCESS");
            ChannelConfig::generated(channel, ChannelAction::Process)
        });
    }

    let completed: Vec<ChannelConfig> = by_number.into_values().collect();

    let clicks = completed
        .iter()
        .filter(|c| c.action == ChannelAction::Click)
        .count();
    if clicks > 1 {
        return Err(PipelineError::ConfigInvalid(format!(
            "{clicks} channels are marked CLICK, at most one is allowed"
        )));
    }

    Ok(completed)
}

/// The single click channel of a completed configuration, if any.
pub fn click_channel(channels: &[ChannelConfig]) -> Option<&ChannelConfig> {
    channels.iter().find(|c| c.action == ChannelAction::Click)
}
