// src/main.rs - Emulator entry point and pulse file tools
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use gf_emu::communication::{ChannelEventSink, EventContext};
use gf_emu::config::{self, EmulatorConfig};
use gf_emu::device::{Device, RequestError, Services};
use gf_emu::pulse::{MotionHeader, PulseFile, STEP_FREQUENCY_KEY, generate_linear_with};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Parser)]
#[command(name = "gf-emu", version, about = "Laser cutter device emulator")]
struct Cli {
    /// Overrides the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve JSON-line requests on stdin, writing events to stdout
    Run {
        /// Configuration file; defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the header and statistics of a pulse file as JSON
    Decode {
        file: PathBuf,
        /// Also list every body byte
        #[arg(long)]
        steps: bool,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Write a pulse file for a straight move
    Generate {
        #[arg(long, allow_hyphen_values = true)]
        dx: i64,
        #[arg(long, allow_hyphen_values = true)]
        dy: i64,
        #[arg(short, long)]
        output: PathBuf,
        /// Step frequency recorded in the header
        #[arg(long, default_value_t = 1000)]
        frequency: u32,
        /// Keep the laser enabled for the whole move
        #[arg(long)]
        laser: bool,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    let config_path = match &cli.command {
        Command::Run { config } | Command::Decode { config, .. } | Command::Generate { config, .. } => config.clone(),
    };
    let config = match &config_path {
        Some(path) => config::load_config(path).map_err(|e| {
            eprintln!("Failed to load config from '{}': {}", path.display(), e);
            Box::new(e) as BoxError
        })?,
        None => EmulatorConfig::default(),
    };

    let level = cli.log_level.as_deref().unwrap_or(config.general.log_level.as_str());
    let level: tracing::Level = level.parse().map_err(|_| format!("invalid log level '{}'", level))?;
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Run { .. } => run(config).await,
        Command::Decode { file, steps, .. } => decode(&config, file, steps),
        Command::Generate {
            dx,
            dy,
            output,
            frequency,
            laser,
            ..
        } => generate(&config, dx, dy, output, frequency, laser),
    }
}

async fn run(config: EmulatorConfig) -> Result<(), BoxError> {
    tracing::info!("Starting gf-emu {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Machine serial: {}", config.machine.serial);
    if config.emulator.bypass_homing {
        tracing::info!("Homing bypassed");
    }

    let (sink, mut lines) = ChannelEventSink::new(EventContext::new());
    let device = Device::start(Services::emulated(&config, Arc::new(sink)))?;

    // Events go out in emission order on a single writer.
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = lines.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err() || stdout.write_all(b"\n").await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let mut requests = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = requests.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match device.submit_json(&line) {
                    Ok(outcome) => tracing::debug!("Request handled: {:?}", outcome),
                    Err(RequestError::UnknownAction(name)) => tracing::warn!("Ignoring unknown action '{}'", name),
                    Err(e) => tracing::error!("Bad request: {}", e),
                },
                Ok(None) => {
                    tracing::info!("Request stream closed");
                    break;
                }
                Err(e) => {
                    tracing::error!("Failed to read request: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    let timeout = config.general.shutdown_timeout();
    let drained = tokio::task::spawn_blocking(move || device.shutdown(timeout)).await?;
    if drained {
        // Workers held the last sink references, so the writer sees the end.
        writer.await?;
    } else {
        tracing::warn!("Exiting with work still running");
    }
    Ok(())
}

fn decode(config: &EmulatorConfig, path: PathBuf, list_steps: bool) -> Result<(), BoxError> {
    let file = PulseFile::load(&path)?;
    let stats = file.stats();
    let mut out = json!({
        "header_data": file.header(),
        "size": file.body().len(),
        "run_time": file.run_time().map(|t| t.as_secs_f64()),
        "laser_on_time": file.laser_on_time().map(|t| t.as_secs_f64()),
        "stats": stats.report(&config.pulse.scale()),
    });
    if list_steps {
        out["steps"] = file
            .body()
            .iter()
            .zip(file.steps())
            .map(|(byte, step)| match step.power {
                Some(power) => json!({"byte": byte, "power": power}),
                None => json!({"byte": byte, "flags": format!("{:?}", step.flags)}),
            })
            .collect();
    }
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn generate(config: &EmulatorConfig, dx: i64, dy: i64, output: PathBuf, frequency: u32, laser: bool) -> Result<(), BoxError> {
    let mut profile = config.pulse.profile();
    profile.laser = laser;
    let body = generate_linear_with(dx, dy, &profile);
    let mut header = MotionHeader::new();
    header.insert(STEP_FREQUENCY_KEY, frequency);
    let file = PulseFile::new(header, body);
    file.save(&output)?;
    tracing::info!(
        "Wrote {} ({} body bytes, {:?})",
        output.display(),
        file.body().len(),
        file.run_time()
    );
    Ok(())
}
