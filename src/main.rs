use dotenvy::dotenv;
use pix_ledger::{
    config::{self, database},
    core::{clock::SystemClock, ledger::Ledger, notify::LogNotifier},
    errors::{Error, Result},
};
use std::{env, sync::Arc, time::Duration};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; variables may also come from the environment
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load ledger settings
    let app_config = config::load_default_config()
        .inspect_err(|e| error!("Critical error loading ledger configuration: {e}"))?;

    // 4. Connect and make sure the schema exists
    if database::get_database_url().starts_with("sqlite://data/") {
        std::fs::create_dir_all("data")?;
    }
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {e}"))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to create tables: {e}"))?;

    let ledger = Ledger::new(
        db,
        Arc::new(SystemClock),
        Arc::new(LogNotifier),
        app_config.ledger,
    )?;

    // 5. Run the requested command
    match env::args().nth(1).as_deref() {
        Some("process-scheduled") => {
            let summary = ledger.process_scheduled_withdrawals().await?;
            info!(
                found = summary.total_found,
                processed = summary.processed_count,
                failed = summary.failed_count,
                skipped = summary.skipped_count,
                "Scheduled withdrawals processed"
            );
            Ok(())
        }
        None | Some("run") => {
            let interval = Duration::from_secs(ledger.settings().scheduler_interval_secs);
            run_scheduler(&ledger, interval).await
        }
        Some(other) => Err(Error::Config {
            message: format!("unknown command '{other}', expected 'run' or 'process-scheduled'"),
        }),
    }
}

/// Settles due withdrawals every `interval` until Ctrl-C.
async fn run_scheduler(ledger: &Ledger, interval: Duration) -> Result<()> {
    info!("Scheduler started, running every {}s", interval.as_secs());
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match ledger.process_scheduled_withdrawals().await {
                    Ok(summary) if summary.total_found > 0 => info!(
                        processed = summary.processed_count,
                        failed = summary.failed_count,
                        skipped = summary.skipped_count,
                        "Settlement run finished"
                    ),
                    Ok(_) => {}
                    Err(e) => warn!("Settlement run failed, retrying next tick: {e}"),
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Shutdown requested, stopping scheduler");
                return Ok(());
            }
        }
    }
}
