use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use mixsplit_core::{
    run_with_reporter, BitDepth, BusConfig, CancelFlag, ChannelAction, ChannelConfig, Reporter,
    SectionSplittingConfig, SessionOptions, Stage,
};

mod cli;

use cli::{BusSpec, ChannelName};

/// Terminal reporter rendering stage progress with indicatif.
struct ConsoleReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn println(&self, line: String) {
        match &*self.bar.lock().expect("reporter lock") {
            Some(bar) => bar.println(line),
            None => println!("{line}"),
        }
    }
}

impl Reporter for ConsoleReporter {
    fn info(&self, message: &str) {
        self.println(message.to_owned());
    }

    fn warning(&self, message: &str) {
        self.println(format!("warning: {message}"));
    }

    fn error(&self, message: &str) {
        self.println(format!("error: {message}"));
    }

    fn begin_stage(&self, stage: Stage, total: u64) {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::with_template("{msg:<24} [{bar:40}] {pos}/{len}")
                .expect("valid progress template")
                .progress_chars("=> "),
        );
        bar.set_message(stage.label());
        *self.bar.lock().expect("reporter lock") = Some(bar);
    }

    fn advance(&self, delta: u64) {
        if let Some(bar) = &*self.bar.lock().expect("reporter lock") {
            bar.inc(delta);
        }
    }

    fn finish_stage(&self) {
        if let Some(bar) = self.bar.lock().expect("reporter lock").take() {
            bar.finish_and_clear();
        }
    }
}

fn collect_channels(
    names: Vec<ChannelName>,
    skips: Vec<u32>,
    click: Option<u32>,
) -> Vec<ChannelConfig> {
    let mut channels: BTreeMap<u32, ChannelConfig> = names
        .into_iter()
        .map(|entry| {
            (
                entry.channel,
                ChannelConfig::new(entry.channel, &entry.name, ChannelAction::Process),
            )
        })
        .collect();

    for channel in skips {
        channels
            .entry(channel)
            .and_modify(|config| config.action = ChannelAction::Skip)
            .or_insert_with(|| {
                ChannelConfig::new(channel, &format!("Ch {channel:02}"), ChannelAction::Skip)
            });
    }

    if let Some(channel) = click {
        channels
            .entry(channel)
            .and_modify(|config| config.action = ChannelAction::Click)
            .or_insert_with(|| ChannelConfig::new(channel, "Click", ChannelAction::Click));
    }

    channels.into_values().collect()
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let matches = cli::build_cli().get_matches();

    let input_dir = matches
        .get_one::<PathBuf>("input_dir")
        .expect("required argument")
        .clone();
    let output_dir = matches
        .get_one::<PathBuf>("output")
        .expect("required argument")
        .clone();

    let names: Vec<ChannelName> = matches
        .get_many::<ChannelName>("name")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let skips: Vec<u32> = matches
        .get_many::<u32>("skip")
        .map(|values| values.copied().collect())
        .unwrap_or_default();
    let click = matches.get_one::<u32>("click").copied();
    let channels = collect_channels(names, skips, click);

    let buses: Vec<BusConfig> = matches
        .get_many::<BusSpec>("bus")
        .map(|values| {
            values
                .map(|bus| BusConfig::new(&bus.name, bus.left, bus.right))
                .collect()
        })
        .unwrap_or_default();

    let mut options = SessionOptions::new(&input_dir, &output_dir);
    options.bit_depth = *matches
        .get_one::<BitDepth>("bit-depth")
        .expect("defaulted argument");
    options.block_frames = *matches
        .get_one::<usize>("block-frames")
        .expect("defaulted argument");
    options.keep_temp = matches.get_flag("keep-temp");
    options.session_json = matches.get_one::<PathBuf>("session-json").cloned();
    options.section_splitting = SectionSplittingConfig {
        enabled: matches.get_flag("split-sections"),
        gap_threshold_seconds: *matches
            .get_one::<f64>("gap-threshold")
            .expect("defaulted argument"),
        min_section_length_seconds: *matches
            .get_one::<f64>("min-section-length")
            .expect("defaulted argument"),
        bpm_change_threshold: *matches
            .get_one::<u32>("bpm-change-threshold")
            .expect("defaulted argument"),
    };

    let reporter = ConsoleReporter::new();
    let cancel = CancelFlag::new();
    let report = run_with_reporter(&options, channels, buses, &reporter, &cancel)
        .with_context(|| format!("failed to process '{}'", input_dir.display()))?;

    println!(
        "Done: {} tracks in {}",
        report.tracks.len(),
        report.output_dir.display()
    );
    Ok(())
}
