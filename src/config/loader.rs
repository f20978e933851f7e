//! Configuration hot-reload: watches the config file with a debounced
//! `notify` watcher and atomically swaps a validated `Config` behind an
//! `ArcSwap`, the same discipline `ConfigLoader` elsewhere in this
//! family of crates uses for its own live-reloadable state.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_full::{new_debouncer, DebouncedEvent, Debouncer, FileIdMap};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::Result;
use crate::metrics::{CONFIG_RELOAD_ERRORS_TOTAL, CONFIG_RELOAD_TOTAL};

const DEBOUNCE: Duration = Duration::from_millis(500);

/// Loads a `Config` once, then optionally watches its source file and
/// hot-reloads on change. `get()` is lock-free; subscribers can await
/// `subscribe()` for a notification on every successful reload.
pub struct ConfigLoader {
    config: Arc<ArcSwap<Config>>,
    config_path: PathBuf,
    reload_tx: watch::Sender<Arc<Config>>,
    reload_rx: watch::Receiver<Arc<Config>>,
    _watcher: Option<Debouncer<RecommendedWatcher, FileIdMap>>,
}

impl ConfigLoader {
    pub fn new(config_path: PathBuf) -> Result<Self> {
        let initial = Config::from_file(&config_path)?;
        initial.validate()?;

        let config_arc = Arc::new(initial);
        let (reload_tx, reload_rx) = watch::channel(config_arc.clone());
        let config = Arc::new(ArcSwap::from(config_arc));

        info!(path = %config_path.display(), "configuration loaded");

        Ok(Self {
            config,
            config_path,
            reload_tx,
            reload_rx,
            _watcher: None,
        })
    }

    /// Starts the debounced file watcher. Consumes and returns `self` so
    /// callers can chain `ConfigLoader::new(path)?.watch()?`.
    pub fn watch(mut self) -> Result<Self> {
        let config_path = self.config_path.clone();
        let config = self.config.clone();
        let reload_tx = self.reload_tx.clone();

        let mut debouncer = new_debouncer(
            DEBOUNCE,
            None,
            move |result: std::result::Result<Vec<DebouncedEvent>, Vec<notify::Error>>| match result {
                Ok(events) => {
                    if events.iter().any(|e| e.paths.contains(&config_path)) {
                        debug!(path = %config_path.display(), "config file changed");
                        if let Err(e) = Self::reload_internal(&config_path, &config, &reload_tx) {
                            CONFIG_RELOAD_ERRORS_TOTAL.inc();
                            error!(error = %e, "config reload failed, keeping previous configuration");
                        }
                    }
                }
                Err(errors) => {
                    for e in errors {
                        error!(error = %e, "config watcher error");
                    }
                }
            },
        )
        .map_err(|e| crate::error::Error::Config(format!("failed to create file watcher: {e}")))?;

        debouncer
            .watcher()
            .watch(self.config_path.as_path(), RecursiveMode::NonRecursive)
            .map_err(|e| crate::error::Error::Config(format!("failed to watch config file: {e}")))?;

        info!(path = %self.config_path.display(), "watching configuration file for changes");
        self._watcher = Some(debouncer);
        Ok(self)
    }

    pub fn get(&self) -> Arc<Config> {
        self.config.load_full()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Config>> {
        self.reload_rx.clone()
    }

    /// Forces an immediate reload, bypassing the file watcher. Useful
    /// for tests and for an admin-triggered reload.
    pub fn reload(&self) -> Result<()> {
        Self::reload_internal(&self.config_path, &self.config, &self.reload_tx)
    }

    fn reload_internal(
        path: &Path,
        config: &Arc<ArcSwap<Config>>,
        reload_tx: &watch::Sender<Arc<Config>>,
    ) -> Result<()> {
        let new_config = Config::from_file(path)?;
        new_config.validate()?;

        let new_config = Arc::new(new_config);
        config.store(new_config.clone());
        let _ = reload_tx.send(new_config);

        CONFIG_RELOAD_TOTAL.inc();
        info!(path = %path.display(), "configuration reloaded");
        Ok(())
    }
}
