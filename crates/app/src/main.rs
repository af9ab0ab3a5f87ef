mod output;
mod spectrum;
mod synth;

use std::{path::PathBuf, thread};

use beat_pulse_core::{
    BeatPulseError, BeatTrackingSession, FeatureMode, FrameClock, SessionConfig,
    SharedSession, SpectralFeatureExtractor, StreamId,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use output::ConsoleSink;
use spectrum::SpectrumAnalyzer;
use tracing_subscriber::EnvFilter;

fn main() -> beat_pulse_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate(args) => run_simulate(args),
        Commands::Taps { timestamps, json } => run_taps(&timestamps, json),
        Commands::Defaults => run_defaults(),
    }
}

fn run_simulate(args: SimulateArgs) -> beat_pulse_core::Result<()> {
    if !(args.bpm.is_finite() && args.bpm > 0.0) {
        return Err(BeatPulseError::msg("--bpm must be a positive number"));
    }
    if args.fft_size < 2 {
        return Err(BeatPulseError::msg("--fft-size must be at least 2"));
    }

    let mut config = match &args.config {
        Some(path) => SessionConfig::from_json_file(path)?,
        None => SessionConfig::default(),
    };
    if let Some(mode) = args.mode {
        config.detector.mode = mode.into();
    }
    config.validate()?;

    tracing::info!(
        bpm = args.bpm,
        seconds = args.seconds,
        mode = ?config.detector.mode,
        sample_rate = args.sample_rate,
        fft_size = args.fft_size,
        "simulating click track"
    );

    let samples = synth::click_track(args.sample_rate, args.bpm, args.seconds);
    let spectrum_config = config.spectrum.clone();
    let mode = config.detector.mode;
    let session = SharedSession::new(config)?;

    let analysis = session.clone();
    let sink = ConsoleSink::new(args.json);
    let (sample_rate, fft_size) = (args.sample_rate, args.fft_size);
    let worker = thread::spawn(move || -> beat_pulse_core::Result<u64> {
        let mut sink = sink;
        let mut clock = FrameClock::for_hop(sample_rate, fft_size)?;
        let mut extractor = SpectralFeatureExtractor::new(spectrum_config);
        let mut analyzer = SpectrumAnalyzer::new(sample_rate);

        for frame in samples.chunks_exact(fft_size) {
            let now = clock.tick();
            let feature = match mode {
                FeatureMode::Energy => extractor.waveform_energy(frame),
                FeatureMode::Flux => {
                    let bin_width = analyzer.bin_width_hz(frame.len());
                    let decibels = analyzer.decibels(frame)?;
                    extractor.spectral_flux(decibels, bin_width)
                }
            };
            analysis.process_feature_frame(feature, now, &mut sink)?;
        }

        tracing::debug!(level = extractor.display_level(), "final display level");
        Ok(clock.frames())
    });

    let frames = worker
        .join()
        .map_err(|_| BeatPulseError::msg("analysis thread panicked"))??;

    match session.current_bpm(StreamId::Track)? {
        Some(bpm) => {
            tracing::info!(bpm, frames, "track tempo locked");
            if !args.json {
                println!("track tempo: {bpm:.1} BPM (synthesized at {:.1})", args.bpm);
            }
        }
        None => {
            tracing::info!(frames, "track tempo never locked");
            if !args.json {
                println!("track tempo: unavailable after {frames} frames");
            }
        }
    }
    Ok(())
}

fn run_taps(timestamps: &[f64], json: bool) -> beat_pulse_core::Result<()> {
    let mut session = BeatTrackingSession::new(SessionConfig::default())?;
    let mut sink = ConsoleSink::new(json);

    for &timestamp in timestamps {
        if session.register_tap(timestamp, &mut sink).is_none() {
            tracing::warn!(timestamp, "ignoring tap that does not follow the previous one");
        }
    }

    if !json {
        match session.current_bpm(StreamId::FreeTap) {
            Some(bpm) => println!("tap tempo: {bpm:.1} BPM"),
            None => println!("tap tempo: unavailable"),
        }
    }
    Ok(())
}

fn run_defaults() -> beat_pulse_core::Result<()> {
    println!("{}", serde_json::to_string_pretty(&SessionConfig::default())?);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Beat and tempo tracking demo host", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Synthesize a click track and run it through the tracker.
    Simulate(SimulateArgs),
    /// Feed tap timestamps (milliseconds) and report the tap tempo.
    Taps {
        /// Monotonic tap timestamps in milliseconds.
        #[arg(required = true)]
        timestamps: Vec<f64>,
        /// Print events as JSON lines.
        #[arg(long)]
        json: bool,
    },
    /// Print the default session configuration as JSON.
    Defaults,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Tempo of the synthesized click track.
    #[arg(long, default_value_t = 120.0)]
    bpm: f64,
    /// Length of the click track in seconds.
    #[arg(long, default_value_t = 20.0)]
    seconds: f64,
    /// Feature fed to the detector; overrides the config file.
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
    #[arg(long, default_value_t = 44_100)]
    sample_rate: u32,
    /// Samples per analysis frame (also the transform size).
    #[arg(long, default_value_t = 1024)]
    fft_size: usize,
    /// JSON session configuration; missing fields use defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Print events as JSON lines.
    #[arg(long)]
    json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Energy,
    Flux,
}

impl From<ModeArg> for FeatureMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Energy => FeatureMode::Energy,
            ModeArg::Flux => FeatureMode::Flux,
        }
    }
}
