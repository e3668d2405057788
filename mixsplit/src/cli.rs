use std::path::PathBuf;
use std::str::FromStr;

use clap::{builder::ValueParser, value_parser, Arg, ArgAction, Command};
use mixsplit_core::{BitDepth, DEFAULT_BLOCK_FRAMES};

const DEFAULT_BLOCK_FRAMES_STR: &str = "32768";
const DEFAULT_GAP_THRESHOLD_STR: &str = "3";
const DEFAULT_MIN_SECTION_LENGTH_STR: &str = "15";
const DEFAULT_BPM_CHANGE_THRESHOLD_STR: &str = "1";

const NAME_HELP: &str = "Name a channel, e.g. --name 1=Kick. May be repeated. \
Unnamed channels are written as 'Ch NN'.";
const BUS_HELP: &str = "Define a stereo bus as NAME=LEFT,RIGHT, e.g. \
--bus Overheads=7,8. Referenced channels are extracted for the bus instead \
of being written as mono tracks. May be repeated.";

pub fn build_cli() -> Command {
    debug_assert_eq!(
        DEFAULT_BLOCK_FRAMES_STR
            .parse::<usize>()
            .expect("valid block frame default"),
        DEFAULT_BLOCK_FRAMES
    );

    Command::new(env!("CARGO_PKG_NAME"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about("Split multitrack console recordings into per-channel tracks")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("OUTPUT_DIR")
                .help("Directory where the final tracks will be written")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("bit-depth")
                .short('b')
                .long("bit-depth")
                .value_name("DEPTH")
                .help("Output bit depth: source, 16, 24, or 32float")
                .default_value("source")
                .value_parser(ValueParser::new(parse_bit_depth)),
        )
        .arg(
            Arg::new("name")
                .long("name")
                .value_name("CH=NAME")
                .help(NAME_HELP)
                .action(ArgAction::Append)
                .value_parser(ValueParser::new(parse_channel_name)),
        )
        .arg(
            Arg::new("skip")
                .long("skip")
                .value_name("CH")
                .help("Skip a channel entirely. May be repeated.")
                .action(ArgAction::Append)
                .value_parser(value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new("click")
                .long("click")
                .value_name("CH")
                .help("Channel carrying the metronome click")
                .value_parser(value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new("bus")
                .long("bus")
                .value_name("NAME=L,R")
                .help(BUS_HELP)
                .action(ArgAction::Append)
                .value_parser(ValueParser::new(parse_bus)),
        )
        .arg(
            Arg::new("split-sections")
                .long("split-sections")
                .help("Detect sections on the click track and split all outputs")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("gap-threshold")
                .long("gap-threshold")
                .value_name("SECONDS")
                .help("Click gap that separates two sections")
                .default_value(DEFAULT_GAP_THRESHOLD_STR)
                .value_parser(ValueParser::new(parse_positive_seconds)),
        )
        .arg(
            Arg::new("min-section-length")
                .long("min-section-length")
                .value_name("SECONDS")
                .help("Sections shorter than this merge into a neighbour")
                .default_value(DEFAULT_MIN_SECTION_LENGTH_STR)
                .value_parser(ValueParser::new(parse_positive_seconds)),
        )
        .arg(
            Arg::new("bpm-change-threshold")
                .long("bpm-change-threshold")
                .value_name("BPM")
                .help("BPM difference that starts a new section within a song")
                .default_value(DEFAULT_BPM_CHANGE_THRESHOLD_STR)
                .value_parser(value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new("session-json")
                .long("session-json")
                .value_name("PATH")
                .help("Write the detected section list as JSON to this path")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("keep-temp")
                .long("keep-temp")
                .help("Keep the temporary segment directory after processing")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("block-frames")
                .long("block-frames")
                .value_name("FRAMES")
                .help("Frames per processing block")
                .default_value(DEFAULT_BLOCK_FRAMES_STR)
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("input_dir")
                .value_name("INPUT_DIR")
                .help("Directory containing the recorded WAV files")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
}

fn parse_bit_depth(arg: &str) -> Result<BitDepth, String> {
    BitDepth::from_str(arg)
}

/// A named channel assignment, `CH=NAME`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelName {
    pub channel: u32,
    pub name: String,
}

fn parse_channel_name(arg: &str) -> Result<ChannelName, String> {
    let (channel, name) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected CH=NAME, got '{arg}'"))?;
    let channel: u32 = channel
        .trim()
        .parse()
        .map_err(|err| format!("invalid channel number '{channel}': {err}"))?;
    if channel == 0 {
        return Err("channel numbers start at 1".into());
    }
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("channel {channel} has an empty name"));
    }
    Ok(ChannelName {
        channel,
        name: name.to_owned(),
    })
}

/// A stereo bus definition, `NAME=LEFT,RIGHT`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusSpec {
    pub name: String,
    pub left: u32,
    pub right: u32,
}

fn parse_bus(arg: &str) -> Result<BusSpec, String> {
    let (name, slots) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=LEFT,RIGHT, got '{arg}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("bus name must not be empty".into());
    }
    let (left, right) = slots
        .split_once(',')
        .ok_or_else(|| format!("bus '{name}' needs two channels as LEFT,RIGHT"))?;
    let parse_slot = |slot: &str| -> Result<u32, String> {
        let channel: u32 = slot
            .trim()
            .parse()
            .map_err(|err| format!("invalid channel '{slot}' in bus '{name}': {err}"))?;
        if channel == 0 {
            Err(format!("bus '{name}': channel numbers start at 1"))
        } else {
            Ok(channel)
        }
    };
    Ok(BusSpec {
        name: name.to_owned(),
        left: parse_slot(left)?,
        right: parse_slot(right)?,
    })
}

fn parse_positive_seconds(arg: &str) -> Result<f64, String> {
    let value: f64 = arg
        .parse()
        .map_err(|err| format!("invalid duration '{arg}': {err}"))?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(format!("duration must be greater than zero, got '{arg}'"))
    }
}
