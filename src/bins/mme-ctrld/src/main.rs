//! NextGCore MME control daemon
//!
//! Hosts the MME task: GUTI/TAI allocation and EPS bearer context handling
//! for the attached UEs.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use mme_core::api::LogSignaling;
use mme_core::config::DEFAULT_CONFIG_PATH;
use mme_core::{MmeConfig, MmeEvent, MmeTask, SnapshotHandle};

/// NextGCore MME - mobility and session control
#[derive(Parser, Debug)]
#[command(name = "mme-ctrld")]
#[command(author = "NextGCore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "EPC Mobility Management Entity control daemon")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Running under a service manager; the process stays in the foreground
    #[arg(short, long)]
    daemon: bool,

    /// Seconds between configuration file checks (0 disables reload)
    #[arg(long, default_value_t = 5)]
    reload_interval: u64,
}

/// MME application state
pub struct MmeApp {
    /// Running flag
    running: Arc<AtomicBool>,
    /// Configuration file
    config_path: String,
    /// Last seen modification time of the configuration file
    config_mtime: Option<SystemTime>,
    /// MME task event channel
    event_tx: Option<mpsc::Sender<MmeEvent>>,
    /// MME task
    worker: Option<JoinHandle<MmeTask>>,
}

impl MmeApp {
    /// Create a new MME application
    pub fn new(config_path: &str) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            config_path: config_path.to_string(),
            config_mtime: None,
            event_tx: None,
            worker: None,
        }
    }

    /// Load the configuration and start the MME task
    pub fn init(&mut self) -> Result<()> {
        log::info!("Initializing MME...");

        let config = MmeConfig::load(&self.config_path)
            .with_context(|| format!("Failed to load configuration from {}", self.config_path))?;
        self.config_mtime = self.current_mtime();

        let snapshot = Arc::new(SnapshotHandle::new(&config).context("Invalid MME configuration")?);
        let current = snapshot.current();
        log::info!(
            "GUMMEI PLMN {} group {} code {}, {} served TAI, {} neighbor TAI",
            current.gummei.plmn_id,
            current.gummei.mme_gid,
            current.gummei.mme_code,
            current.served_tai.len(),
            current.neighbor_tai.len()
        );

        let (tx, rx) = mpsc::channel(1024);
        let task = MmeTask::new(snapshot, Box::new(LogSignaling));
        self.worker = Some(tokio::spawn(task.run(rx)));
        self.event_tx = Some(tx);

        log::info!("MME initialized successfully");
        Ok(())
    }

    /// Sender for submitting events to the MME task
    pub fn event_sender(&self) -> Option<mpsc::Sender<MmeEvent>> {
        self.event_tx.clone()
    }

    /// Run until the running flag is cleared
    pub async fn run(&mut self, reload_interval: Duration) -> Result<()> {
        log::info!("MME running...");

        let mut last_check = tokio::time::Instant::now();
        while self.running.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(100)).await;

            if !reload_interval.is_zero() && last_check.elapsed() >= reload_interval {
                last_check = tokio::time::Instant::now();
                if let Err(e) = self.reload_if_changed().await {
                    log::error!("Configuration reload failed: {:#}", e);
                }
            }
        }

        log::info!("MME main loop exited");
        Ok(())
    }

    fn current_mtime(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.config_path)
            .and_then(|m| m.modified())
            .ok()
    }

    /// Rebuild the capability snapshot when the configuration file changed
    async fn reload_if_changed(&mut self) -> Result<()> {
        let mtime = self.current_mtime();
        if mtime.is_none() || mtime == self.config_mtime {
            return Ok(());
        }
        self.config_mtime = mtime;

        log::info!("Configuration {} changed, reloading", self.config_path);
        let config = MmeConfig::load(&self.config_path)?;
        let tx = self.event_tx.as_ref().context("MME task not started")?;

        let (reply, rx) = oneshot::channel();
        tx.send(MmeEvent::Reload {
            config: Box::new(config),
            reply,
        })
        .await
        .map_err(|_| anyhow::anyhow!("MME task is gone"))?;

        let version = rx.await.context("MME task dropped the reload request")??;
        log::info!("Capability snapshot version {} active", version);
        Ok(())
    }

    /// Stop the MME task and wait for it to drain
    pub async fn shutdown(&mut self) {
        log::info!("Shutting down MME...");

        self.event_tx = None;
        if let Some(worker) = self.worker.take() {
            match worker.await {
                Ok(task) => log::debug!("MME task finished with {} UE contexts", task.store().len()),
                Err(e) => log::error!("MME task failed: {}", e),
            }
        }

        log::info!("MME shutdown complete");
    }

    /// Signal the application to stop
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Get the running flag for signal handlers
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }
}

fn parse_log_level(level: &str) -> log::LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(parse_log_level(&args.log_level))
        .format_timestamp_millis()
        .init();

    log::info!("NextGCore MME v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Configuration: {}", args.config);
    if args.daemon {
        log::info!("Running under a service manager");
    }

    let mut app = MmeApp::new(&args.config);

    let running = app.running_flag();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })?;

    app.init()?;
    app.run(Duration::from_secs(args.reload_interval)).await?;
    app.shutdown().await;

    log::info!("NextGCore MME terminated");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
