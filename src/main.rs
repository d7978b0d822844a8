use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info, warn};
use panda_pwr_bridge::config::{self, Config};
use panda_pwr_bridge::device::{DeviceApi, PandaClient};
use panda_pwr_bridge::error::Result;
use panda_pwr_bridge::host::{AccessoryCache, PandaPlatform, PandaServices};
use panda_pwr_bridge::telemetry::{normalize_power_data, normalize_voltage_data};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;

#[derive(Parser)]
#[command(name = "panda-pwr-bridge")]
#[command(about = "Expose a PandaPWR smart plug as a switch, voltage sensor and power level accessory")]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, env = "PANDA_PWR_CONFIG")]
    config: Option<PathBuf>,

    /// Device address, overrides the config file
    #[arg(long)]
    ip: Option<String>,

    /// Poll interval in seconds, overrides the config file
    #[arg(long)]
    interval: Option<u64>,

    /// Force debug logging
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge until Ctrl+C (default)
    Run,
    /// Fetch identity and telemetry once and print them
    Status,
    /// Switch the plug once
    Set {
        #[arg(value_enum)]
        state: PowerState,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PowerState {
    On,
    Off,
}

fn init_logger(debug: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.format_timestamp_millis().init();
}

fn main() -> ExitCode {
    // Must run before the runtime starts any threads
    config::load_dotenv(".env");

    let cli = Cli::parse();
    init_logger(cli.debug);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(ip) = cli.ip {
        config.ip = ip;
    }
    if let Some(interval) = cli.interval {
        config.interval_secs = interval;
    }
    config.validate()?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_bridge(config).await.map(|()| ExitCode::SUCCESS),
        Commands::Status => print_status(&config).await,
        Commands::Set { state } => set_once(&config, matches!(state, PowerState::On)).await,
    }
}

fn client(config: &Config) -> Result<PandaClient> {
    let timeout = config.request_timeout_secs.map(Duration::from_secs);
    PandaClient::new(&config.ip, timeout)
}

async fn print_status(config: &Config) -> Result<ExitCode> {
    let client = client(config)?;

    match client.fetch_identity().await {
        Ok(identity) => {
            println!("serial:    {}", identity.serial);
            println!("firmware:  {}", identity.firmware_version);
        }
        Err(e) => warn!("Failed to fetch identity: {}", e),
    }

    let telemetry = match client.fetch_telemetry().await {
        Ok(telemetry) => telemetry,
        Err(e) => {
            error!("Failed to fetch telemetry: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };
    println!("on:        {}", telemetry.is_on());
    println!(
        "power:     {} W (battery level {})",
        telemetry.power,
        normalize_power_data(telemetry.power)
    );
    println!(
        "voltage:   {} V (light level {})",
        telemetry.voltage,
        normalize_voltage_data(telemetry.voltage)
    );
    Ok(ExitCode::SUCCESS)
}

async fn set_once(config: &Config, on: bool) -> Result<ExitCode> {
    let client = client(config)?;
    match client.send_command(on).await {
        Ok(()) => {
            info!("PandaPwr switched {}", if on { "on" } else { "off" });
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("Failed to switch PandaPwr: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run_bridge(config: Config) -> Result<()> {
    info!("Starting PandaPwr bridge");
    info!("  Device: {}", config.ip);
    info!("  Interval: {}s", config.interval_secs);

    let registry = Arc::new(AccessoryCache::open(config.cache_path()));
    let mut platform = PandaPlatform::new(config, registry);
    platform.restore_cached();
    let running = platform.did_finish_launching()?;

    let watcher = tokio::spawn(watch_changes(running.services.clone()));
    let console = tokio::spawn(run_console(running.services.clone()));

    info!("PandaPwr bridge is running");
    info!("  - Type on / off / status on stdin");
    info!("  - Press Ctrl+C to exit");

    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    console.abort();
    watcher.abort();
    running.shutdown().await;

    info!("PandaPwr bridge stopped");
    Ok(())
}

/// Log characteristic values whenever the accessory pushes a change.
async fn watch_changes(services: Arc<PandaServices>) {
    loop {
        services.notifier().changed().await;
        let snapshot = services.snapshot();
        info!(
            "[Host] {}: {} | {}: {:.1} | {}: {}% ({}, {})",
            snapshot.switch_service,
            snapshot.on,
            snapshot.voltage_service,
            snapshot.voltage,
            snapshot.battery_service,
            snapshot.battery_level,
            snapshot.charging_state,
            snapshot.low_battery
        );
    }
}

/// Minimal host UI on stdin: `on`, `off`, `status`.
async fn run_console(services: Arc<PandaServices>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                break;
            }
        };

        match line.trim() {
            "" => {}
            "on" | "off" => {
                let on = line.trim() == "on";
                match services.switch.request_set(on).await {
                    Some(outcome) => info!("[Host] set {} -> {:?}", line.trim(), outcome),
                    None => warn!("[Host] switch has no handler"),
                }
            }
            "status" => match serde_json::to_string_pretty(&services.snapshot()) {
                Ok(json) => println!("{}", json),
                Err(e) => warn!("Failed to render status: {}", e),
            },
            other => warn!("[Host] unknown command: {}", other),
        }
    }
}
