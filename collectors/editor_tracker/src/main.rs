use clap::Parser;
use editor_tracker::{
    store::MemoryStore, Gateway, HostEvent, ShutdownOutcome, StoreConfig, Tracker,
};
use std::{sync::Arc, time::Duration};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "editor_tracker", version)]
struct Args {
    /// Store base URL, e.g. http://127.0.0.1:17700
    ///
    /// When unset or blank, events are still tracked but nothing is persisted.
    #[arg(long, env = "STORE_URI")]
    store_uri: Option<String>,

    /// Database name inside the store.
    #[arg(long, env = "STORE_DB")]
    store_db: Option<String>,

    /// Timeout for each store request (milliseconds).
    #[arg(long, default_value_t = 5000)]
    request_timeout_ms: u64,

    /// Track into an in-memory store and log what would have been written.
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout is left alone; the host may be reading it.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "editor_tracker=info".into()),
        )
        .init();

    let args = Args::parse();
    let timeout = Duration::from_millis(args.request_timeout_ms.max(1));

    let dry_run_store = args.dry_run.then(MemoryStore::new);
    let gateway = match &dry_run_store {
        Some(store) => {
            info!("dry run: writes go to memory");
            Gateway::new(Arc::new(store.clone()))
        }
        None => match StoreConfig::new(args.store_uri, args.store_db, timeout) {
            Ok(cfg) => {
                match &cfg.uri {
                    Some(uri) => info!("persisting to {uri} (db {})", cfg.database),
                    None => info!("STORE_URI not set; persistence disabled"),
                }
                cfg.gateway()
            }
            Err(err) => {
                error!("{err}; persistence disabled");
                Gateway::disabled()
            }
        },
    };

    let mut tracker = Tracker::new(gateway);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    info!("Editor tracker started. Reading host events from stdin");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("host closed stdin");
                break;
            }
            Err(err) => {
                error!("reading host events failed: {err}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<HostEvent>(line) {
            Ok(event) => {
                tracker.handle(event).await;
            }
            Err(err) => warn!("skipping malformed host event ({err}): {line}"),
        }
    }

    let totals = tracker.edit_totals();
    if !totals.is_zero() {
        info!("edits this session: {totals:?}");
    }

    if let ShutdownOutcome::Flushed(report) = tracker.shutdown().await {
        info!(
            "final flush: session={:?} activity={:?}",
            report.session_write, report.activity_write
        );
    }

    if let Some(store) = dry_run_store {
        let snap = store.snapshot();
        info!("dry run sessions: {:?}", snap.sessions);
        info!("dry run extension totals: {:?}", snap.extension_times);
        info!("dry run activity: {:?}", snap.activity);
    }

    Ok(())
}
