//! Powerbase link - serial driver and race controller for a slot-car powerbase
//!
//! Usage:
//!   powerbase-link --port /dev/ttyS0            Run with logs on stderr
//!   powerbase-link --port /dev/ttyS0 --json     Also print events as JSON lines

use clap::Parser;
use powerbase_link::cli::Cli;
use powerbase_link::constants::CAR_COUNT;
use powerbase_link::director::{Director, JsonLines};
use powerbase_link::events::{spawn_dispatcher, EventQueue};
use powerbase_link::link::SerialOpener;
use powerbase_link::{config, logging, Powerbase, PowerbaseError, Result};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = config::load(&cli.config)?;
    if let Some(port) = cli.port {
        config.link.port = port;
    }
    if config.link.port.is_empty() {
        return Err(PowerbaseError::ConfigValidation {
            field: "link.port",
            reason: "no serial device, pass --port or set it in the config".into(),
        });
    }
    let laps = cli.laps.unwrap_or(config.race.laps);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|source| PowerbaseError::Runtime { source })?;

    let (events, rx) = EventQueue::channel();
    let power_rates: [u8; CAR_COUNT] =
        std::array::from_fn(|slot| config.power_rate_for(slot as u8));
    let powerbase = Powerbase::open(
        Box::new(SerialOpener::new(config.link.port.as_str())),
        events,
        runtime.handle(),
        config.link.watchdog(),
        &power_rates,
    )?;

    let mut director = Director::new(
        powerbase.race().clone(),
        runtime.handle().clone(),
        config.clone(),
        laps,
    )
    .with_config_path(cli.config.clone());
    if cli.json {
        director = director.with_output(JsonLines::stdout());
    }
    // The director holds a race handle, so the queue never closes; the
    // dispatcher thread ends with the process.
    spawn_dispatcher(rx, director).map_err(|source| PowerbaseError::Runtime { source })?;

    info!("powerbase on {}, {} laps per race", config.link.port, laps);

    runtime.block_on(wait_for_signal());

    info!("shutting down");
    let stats = powerbase.stats().to_string();
    powerbase.close();
    info!("link: {}", stats);
    runtime.shutdown_timeout(Duration::from_millis(500));
    Ok(())
}

/// SIGINT or SIGTERM (Ctrl+C elsewhere)
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {},
                    _ = sigint.recv() => {},
                }
            }
            _ => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
