use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use raindrop_core::RaindropClient;

use crate::store::MemoryStore;
use crate::sync::engine::{ImportMode, SyncEngine, SyncReport, SyncSettings};

const DEFAULT_TARGET_FOLDER: &str = "Raindrop";
const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 1440;

#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub token: String,
    pub api_base: Option<String>,
    pub settings: SyncSettings,
    pub sync_interval: Duration,
    pub run_on_start: bool,
    pub snapshot_path: PathBuf,
}

impl DaemonConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let token = std::env::var("RAINDROP_API_TOKEN")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .context("RAINDROP_API_TOKEN is not set")?;
        let api_base = std::env::var("RAINDROP_API_BASE").ok();
        let target_folder = std::env::var("RAINDROP_TARGET_FOLDER")
            .unwrap_or_else(|_| DEFAULT_TARGET_FOLDER.to_string());
        let mode = std::env::var("RAINDROP_IMPORT_MODE")
            .unwrap_or_else(|_| "all".to_string())
            .parse::<ImportMode>()
            .map_err(anyhow::Error::msg)?;
        let config_value = std::env::var("RAINDROP_IMPORT_VALUE").unwrap_or_default();
        let flatten = read_bool_env("RAINDROP_FLATTEN", false);
        let sync_interval = Duration::from_secs(
            read_u64_env(
                "RAINDROP_SYNC_INTERVAL_MINUTES",
                DEFAULT_SYNC_INTERVAL_MINUTES,
            ) * 60,
        );
        let run_on_start = read_bool_env("RAINDROP_RUN_ON_START", true);
        let snapshot_path = match std::env::var("RAINDROP_SNAPSHOT_PATH") {
            Ok(path) => PathBuf::from(path),
            Err(_) => dirs::data_dir()
                .context("data directory is unavailable")?
                .join("raindropd")
                .join("bookmarks.json"),
        };

        Ok(Self {
            token,
            api_base,
            settings: SyncSettings {
                target_folder,
                mode,
                config_value,
                flatten,
            },
            sync_interval,
            run_on_start,
            snapshot_path,
        })
    }
}

pub struct DaemonRuntime {
    config: DaemonConfig,
    engine: Arc<SyncEngine<MemoryStore>>,
    run_in_progress: Arc<AtomicBool>,
}

impl DaemonRuntime {
    pub fn bootstrap(config: DaemonConfig) -> anyhow::Result<Self> {
        let client = match &config.api_base {
            Some(base) => RaindropClient::with_base_url(base, &config.token)?,
            None => RaindropClient::new(&config.token)?,
        };
        let engine = Arc::new(SyncEngine::new(client, MemoryStore::new()));
        Ok(Self {
            config,
            engine,
            run_in_progress: Arc::new(AtomicBool::new(false)),
        })
    }

    pub async fn run(self, once: bool) -> anyhow::Result<()> {
        eprintln!(
            "[raindropd] started: target_folder={}, mode={:?}, interval={}m",
            self.config.settings.target_folder,
            self.config.settings.mode,
            self.config.sync_interval.as_secs() / 60,
        );

        let mut progress = self.engine.subscribe_progress();
        tokio::spawn(async move {
            while progress.changed().await.is_ok() {
                let update = *progress.borrow_and_update();
                eprintln!(
                    "[raindropd] progress: {}% ({}/{})",
                    update.percent, update.current, update.total
                );
            }
        });

        if once || self.config.run_on_start {
            self.sync_once().await;
        }
        if once {
            return Ok(());
        }

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.sync_interval) => {
                    self.sync_once().await;
                }
                result = tokio::signal::ctrl_c() => {
                    result.context("failed to listen for shutdown signal")?;
                    eprintln!("[raindropd] shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Runs one sync pass unless one is already in flight; overlapping
    /// triggers are skipped rather than queued.
    async fn sync_once(&self) {
        if self
            .run_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            eprintln!("[raindropd] warning: sync already in progress, skipping");
            return;
        }
        match self.engine.import_all(&self.config.settings).await {
            SyncReport::Success {
                imported,
                target_folder,
            } => {
                eprintln!("[raindropd] sync finished: imported {imported} into {target_folder:?}");
                if let Err(err) = self.write_snapshot().await {
                    eprintln!("[raindropd] warning: failed to write snapshot: {err}");
                }
            }
            SyncReport::Failure { message } => {
                eprintln!("[raindropd] sync failed: {message}");
            }
        }
        self.run_in_progress.store(false, Ordering::SeqCst);
    }

    async fn write_snapshot(&self) -> anyhow::Result<()> {
        let snapshot = self.engine.store().snapshot().await;
        let body = serde_json::to_vec_pretty(&snapshot)?;
        if let Some(parent) = self.config.snapshot_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create snapshot directory at {parent:?}"))?;
        }
        tokio::fs::write(&self.config.snapshot_path, body)
            .await
            .with_context(|| {
                format!(
                    "failed to write snapshot to {:?}",
                    self.config.snapshot_path
                )
            })?;
        Ok(())
    }
}

fn read_u64_env(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_bool_env(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}
