//! nadr - audio delivery core driver
//!
//! Plays one file (or a synthetic tone) through the delivery core into a
//! clocked transport that writes the pulled stream to a file or discards it.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nadr_common::{AudioFormat, Config, DsdBitOrder};
use nadr_core::audio::staging::SinkCapabilities;
use nadr_core::audio::{Decoder, FileDecoder, ToneDecoder};
use nadr_core::playback::monitor::PullStats;
use nadr_core::playback::scheduler::SchedulerStats;
use nadr_core::playback::{ClockedTransport, EngineStats, PullMonitor};
use nadr_core::{Engine, Player};

/// Command-line arguments for nadr
#[derive(Parser, Debug)]
#[command(name = "nadr")]
#[command(about = "Real-time audio delivery core")]
#[command(version)]
struct Args {
    /// Audio file to play (a test tone is played when omitted)
    input: Option<PathBuf>,

    /// Test tone frequency in Hz
    #[arg(long, default_value = "440")]
    tone: f64,

    /// Test tone duration in seconds
    #[arg(long, default_value = "5")]
    duration: f64,

    /// Test tone sample rate (DSD: 1-bit rate)
    #[arg(long)]
    rate: Option<u32>,

    /// Test tone bit depth (16, 24, 32)
    #[arg(long, default_value = "16")]
    bits: u16,

    /// Test tone channel count
    #[arg(long, default_value = "2")]
    channels: u16,

    /// Generate a DSD tone instead of PCM
    #[arg(long)]
    dsd: bool,

    /// Configuration file
    #[arg(short, long, env = "NADR_CONFIG")]
    config: Option<PathBuf>,

    /// Transport MTU override
    #[arg(long)]
    mtu: Option<u32>,

    /// Force the copy path in the consumer handoff
    #[arg(long)]
    no_zero_copy: bool,

    /// Write the transport stream to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print final statistics as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Report {
    engine: EngineStats,
    scheduler: Option<SchedulerStats>,
    transport: PullStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::resolve(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("nadr_core={0},nadr_common={0}", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(mtu) = args.mtu {
        config.transport.mtu = mtu;
    }
    if args.no_zero_copy {
        config.transport.zero_copy = false;
    }

    let decoder = open_decoder(&args)?;
    info!("Source: {}", decoder.track_info().format);

    let engine = Arc::new(Engine::new(config, SinkCapabilities::default()).context("Failed to create engine")?);
    let consumer = engine.consumer()?;
    let mut player = Player::new(Arc::clone(&engine))?;
    player.play(decoder).context("Failed to start track")?;

    let timing = engine.transport_timing()?;
    let monitor = Arc::new(PullMonitor::new(timing.cycle, engine.control().clone()));
    let monitor_shutdown = Arc::clone(&monitor).spawn_monitoring_task(tokio::runtime::Handle::current());

    let writer: Box<dyn Write + Send> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(io::sink()),
    };
    let transport = ClockedTransport::spawn(consumer, writer, timing, Some(Arc::clone(&monitor)))?;

    let control = player.playback_control();
    let mut track = tokio::task::spawn_blocking(move || {
        let outcome = player.wait();
        (player, outcome)
    });

    let (player, outcome) = tokio::select! {
        joined = &mut track => joined?,
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, stopping");
            control.request_stop();
            track.await?
        }
    };

    let scheduler = match outcome {
        Ok((outcome, stats)) => {
            info!("Track ended: {:?}", outcome);
            Some(stats)
        }
        Err(e) => {
            warn!("Track failed: {}", e);
            None
        }
    };

    // Let the transport play out what is already in the ring, including a
    // final tail shorter than one pull
    let buffered = engine.stats().ring.available as f64;
    let rate = engine.layout().map_or(0, |l| l.bytes_per_second).max(1) as f64;
    let deadline = Instant::now() + Duration::from_secs_f64(buffered / rate) + Duration::from_secs(1);
    while engine.stats().ring.available > 0 && Instant::now() < deadline && !control.is_stop_requested() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    engine.shutdown();
    drop(player);
    let (_, mut writer) = transport.stop().context("Transport failed")?;
    writer.flush()?;
    monitor_shutdown.store(true, Ordering::Relaxed);

    let report = Report {
        engine: engine.stats(),
        scheduler,
        transport: monitor.stats(),
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let c = report.engine.ring.counters;
        info!(
            "Pulls: {} ({} zero-copy, {} copied, {} silence, {} underruns)",
            c.pulls, c.zero_copy_pulls, c.copy_pulls, c.silence_pulls, c.underruns
        );
    }

    Ok(())
}

fn open_decoder(args: &Args) -> Result<Box<dyn Decoder>> {
    if let Some(path) = &args.input {
        let decoder = FileDecoder::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        return Ok(Box::new(decoder));
    }

    let format = if args.dsd {
        AudioFormat::dsd(args.rate.unwrap_or(2_822_400), args.channels, DsdBitOrder::LsbFirst)
    } else {
        AudioFormat::pcm(args.rate.unwrap_or(44_100), args.bits, args.channels)
    };
    let duration = Duration::from_secs_f64(args.duration.max(0.0));
    let tone = ToneDecoder::new(format, args.tone, duration).context("Invalid tone format")?;
    Ok(Box::new(tone))
}
