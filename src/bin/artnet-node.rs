//! Art-Net Node Application
//!
//! Runs a controller on one universe: answers ArtPoll, prints incoming DMX,
//! and optionally broadcasts a chase pattern and polls for nodes.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use artnet_controller::{
    channel_callback, config::ControllerConfig, protocol::MAX_DMX_SIZE, Controller, PortAddress,
};

#[derive(Parser)]
#[command(name = "artnet-node")]
#[command(about = "Art-Net DMX controller node")]
struct Args {
    /// TOML configuration file; defaults to the per-user config location
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    bind: Option<Ipv4Addr>,

    #[arg(short, long)]
    port: Option<u16>,

    #[arg(long)]
    net: Option<u8>,

    #[arg(long)]
    subnet: Option<u8>,

    #[arg(short, long)]
    universe: Option<u8>,

    #[arg(long, help = "Broadcast address for ArtDmx and ArtPoll")]
    broadcast: Option<Ipv4Addr>,

    #[arg(long, help = "Output frame rate for --chase")]
    fps: Option<u32>,

    #[arg(short, long, action = clap::ArgAction::Count, help = "Increase log verbosity")]
    verbose: u8,

    #[arg(long, help = "Send an ArtPoll every few seconds")]
    poll: bool,

    #[arg(long, help = "Broadcast a moving chase pattern")]
    chase: bool,

    #[arg(long, help = "Channels in the chase frame", default_value_t = MAX_DMX_SIZE)]
    channels: usize,

    #[arg(short, long, help = "Exit after this many seconds")]
    duration: Option<u64>,
}

impl Args {
    fn apply(&self, config: &mut ControllerConfig) {
        if let Some(bind) = self.bind {
            config.bind_address = bind;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(broadcast) = self.broadcast {
            config.broadcast_address = broadcast;
        }
        if let Some(fps) = self.fps {
            config.frame_rate = fps;
        }
        if self.net.is_some() || self.subnet.is_some() || self.universe.is_some() {
            let current = config.address;
            config.address = PortAddress::new(
                self.net.unwrap_or(current.net()),
                self.subnet.unwrap_or(current.subnet()),
                self.universe.unwrap_or(current.universe()),
            );
        }
    }

    fn log_filter(&self, configured: &str) -> String {
        match self.verbose {
            0 => std::env::var("RUST_LOG").unwrap_or_else(|_| configured.to_string()),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    }
}

/// One lit channel sweeping across the frame
fn chase(channels: usize) -> impl FnMut() -> anyhow::Result<Vec<u8>> + Send {
    let channels = channels.clamp(1, MAX_DMX_SIZE);
    let mut position = 0usize;
    move || {
        let mut frame = vec![0u8; channels];
        frame[position] = 255;
        if position > 0 {
            frame[position - 1] = 64;
        }
        position = (position + 1) % channels;
        Ok(frame)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ControllerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ControllerConfig::load_or_default(),
    };
    args.apply(&mut config);

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(args.log_filter(&config.log_level)))
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .init();

    tracing::info!("Starting Art-Net node on {}", config.address);

    let fps = config.frame_rate;
    let address = config.address;
    let mut controller = Controller::new();
    controller.configure(config)?;

    let (callback, dmx_rx) = channel_callback(64);
    controller.register_data_callback(Some(callback));

    if args.chase {
        controller.start_with_generator(Box::new(chase(args.channels)), fps)?;
        tracing::info!("Chase running at {} fps on {}", fps, address);
    } else {
        controller.start()?;
    }

    if args.poll {
        controller.send_poll()?;
    }

    let started = Instant::now();
    let deadline = args.duration.map(Duration::from_secs);
    let mut last_report = Instant::now();
    let mut last_poll = Instant::now();

    tracing::info!("Running - press Ctrl+C to stop");

    loop {
        if deadline.is_some_and(|d| started.elapsed() >= d) {
            break;
        }

        while let Ok(dmx) = dmx_rx.try_recv() {
            let preview: Vec<String> = dmx.data.iter().take(16).map(|b| format!("{:3}", b)).collect();
            println!(
                "DMX {} [{} ch] {}{}",
                dmx.address,
                dmx.data.len(),
                preview.join(" "),
                if dmx.data.len() > 16 { " ..." } else { "" }
            );
        }

        if args.poll && last_poll.elapsed() >= Duration::from_secs(3) {
            if let Err(e) = controller.send_poll() {
                tracing::warn!("ArtPoll failed: {}", e);
            }
            last_poll = Instant::now();
        }

        if last_report.elapsed() >= Duration::from_secs(5) {
            let stats = controller.statistics();
            let rx = controller.receiver_statistics();
            tracing::info!(
                "Frames: {} sent, {} dropped, {} late | Packets: {} received, {} invalid, {} DMX delivered",
                stats.total_frames,
                stats.dropped_frames,
                stats.late_ticks,
                rx.packets_received,
                rx.invalid_packets,
                rx.dmx_delivered
            );
            for node in controller.discovered_nodes() {
                tracing::info!(
                    "Node {} \"{}\" ({}) ports: {:?}",
                    node.ip,
                    node.short_name,
                    node.long_name,
                    node.subscribed_universes
                        .iter()
                        .map(|a| a.to_string())
                        .collect::<Vec<_>>()
                );
            }
            last_report = Instant::now();
        }

        std::thread::sleep(Duration::from_millis(20));
    }

    controller.stop();
    tracing::info!("Art-Net node stopped");
    Ok(())
}
