//! Run the detector bridge against a control server.
//!
//! ```text
//! cargo run --example xspress_sim -- --listen 127.0.0.1:12000 &
//! cargo run --example xspress_ctrl -- --endpoint 127.0.0.1:12000 --num-cards 4 \
//!     --base-ip 192.168.0.1 --set xsp/frames=100 --command start
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde_json::Value;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use xspress_z::{
    Builder, DetectorBuilder, DetectorHandle, config::DetectorConfig, message::Verb,
};

#[derive(Debug, Parser)]
struct Args {
    /// JSON5 detector configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Control server address:port, overrides the file
    #[arg(short, long)]
    endpoint: Option<String>,

    #[arg(long)]
    num_cards: Option<u32>,

    #[arg(long)]
    base_ip: Option<String>,

    /// Comma-separated DAQ endpoints
    #[arg(long)]
    daq_endpoints: Option<String>,

    /// Parameter writes applied after configure, as path=json
    #[arg(long = "set", value_name = "PATH=VALUE")]
    sets: Vec<String>,

    /// Command sent after the writes, e.g. start
    #[arg(long)]
    command: Option<Verb>,

    /// Print the full parameter tree every N seconds (0 disables)
    #[arg(long, default_value = "5")]
    status_secs: u64,

    #[arg(short, long)]
    debug: bool,
}

fn init_logger(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("xspress_z=debug,zenoh=info")
        } else {
            EnvFilter::new("xspress_z=info,zenoh=warn")
        }
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

fn load_config(args: &Args) -> xspress_z::Result<DetectorConfig> {
    let mut config = match &args.config {
        Some(path) => DetectorConfig::from_file(path)?,
        None => DetectorConfig::default(),
    };
    if let Some(endpoint) = &args.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(num_cards) = args.num_cards {
        config.num_cards = num_cards;
    }
    if let Some(base_ip) = &args.base_ip {
        config.base_ip = base_ip.clone();
    }
    if let Some(daq) = &args.daq_endpoints {
        config.daq_endpoints = daq.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn drive(handle: DetectorHandle, sets: Vec<String>, command: Option<Verb>) {
    for set in sets {
        let Some((path, raw)) = set.split_once('=') else {
            eprintln!("ignoring '{set}', expected PATH=VALUE");
            continue;
        };
        // Bare words are taken as strings.
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        match handle.set(path, value).await {
            Ok(()) => println!("set {path} = {raw}"),
            Err(e) if e.is_client_error() => eprintln!("400 {path}: {e}"),
            Err(e) => eprintln!("500 {path}: {e}"),
        }
    }
    if let Some(verb) = command {
        if let Err(e) = handle.command(verb).await {
            eprintln!("{verb} failed: {e}");
        }
    }
}

async fn report(handle: DetectorHandle, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        match handle.get("").await {
            Ok(tree) => println!("{tree:#}"),
            Err(_) => return,
        }
    }
}

#[tokio::main]
async fn main() -> xspress_z::Result<()> {
    let args = Args::parse();
    init_logger(args.debug);

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let mut detector = DetectorBuilder::new(config.clone()).build()?;
    if let Err(e) = detector.configure(&config.settings()) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }

    let handle = detector.handle();
    tokio::spawn(drive(handle.clone(), args.sets, args.command));
    if args.status_secs > 0 {
        tokio::spawn(report(handle.clone(), Duration::from_secs(args.status_secs)));
    }
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = handle.shutdown().await;
        }
    });

    detector.run().await;
    Ok(())
}
