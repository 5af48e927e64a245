use std::sync::Arc;

use clap::Parser;
use pressure_server::{
    actors::{
        messages::CycleEvent,
        monitor::{MonitorContext, MonitorHandle, MonitorSettings},
    },
    api::{ApiConfig, ApiState, spawn_api_server},
    config::read_config_file,
    controller::ActuatorController,
    relay,
    scanner::Scanner,
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,

    /// Log every probe and transition
    #[arg(short, long)]
    verbose: bool,
}

fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };
    let filter = filter::Targets::new().with_targets(vec![
        ("pressure_server", level),
        ("tower_http", LevelFilter::DEBUG.min(level)),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let config = read_config_file(&args.file)?.resolve()?;
    init(args.verbose || config.debug);
    trace!("started with args: {args:?}");

    info!(
        "watching {} devices, interval {:?}, relay off after {} empty cycles",
        config.watchlist.len(),
        config.interval,
        config.off_threshold
    );

    let relay = relay::from_config(&config.relay).await?;
    let controller = ActuatorController::new(relay, config.off_threshold).await;
    let context = MonitorContext::new(controller);

    let api_state = ApiState::new(context.snapshots.clone());
    spawn_api_server(ApiConfig::default(), api_state).await?;

    // give the network time to come up after boot
    if !config.startup_delay.is_zero() {
        debug!("waiting {:?} before the first scan", config.startup_delay);
        tokio::select! {
            _ = tokio::time::sleep(config.startup_delay) => {}
            _ = shutdown_signal() => {
                info!("shutdown requested before the first scan");
                context.power_down().await;
                return Ok(());
            }
        }
    }

    let (event_tx, event_rx) = broadcast::channel(16);
    tokio::spawn(log_cycles(event_rx));

    let scanner = Scanner::with_system_tools(config.scan.clone(), config.watchlist.clone());
    let monitor = MonitorHandle::spawn(
        Arc::new(scanner),
        MonitorSettings::from(&config),
        context,
        event_tx,
    );

    shutdown_signal().await;
    info!("shutdown requested");

    let last = monitor.shutdown(config.shutdown_grace).await;
    info!("relay {}, exiting", last.relay_state);

    Ok(())
}

async fn log_cycles(mut events: broadcast::Receiver<CycleEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => info!(
                "cycle {}: {} devices, watchlist hit: {}, relay {} ({} misses){}",
                event.cycle,
                event.device_count,
                event.watchlist_hit,
                event.relay_state,
                event.miss_count,
                if event.scan_failed { ", scan failed" } else { "" }
            ),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("cycle log lagged by {skipped} events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
