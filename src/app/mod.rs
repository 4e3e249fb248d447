//! Pipeline orchestration: gather, test, normalize, persist, report.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Settings;
use crate::notify::Notifier;
use crate::persist::store::{self, StorageBackend};
use crate::sandbox::engine::ProxyEngine;
use crate::sandbox::probe::{ConnectivityProbe, HttpProbe};
use crate::sandbox::Sandbox;
use crate::subscription::{Gatherer, NodeRegistry};

pub struct App {
    settings: Settings,
    engine: Arc<dyn ProxyEngine>,
    probe: Arc<dyn ConnectivityProbe>,
    backend: Box<dyn StorageBackend>,
    notifier: Arc<dyn Notifier>,
    cancel: CancellationToken,
}

impl App {
    pub fn new(
        settings: Settings,
        engine: Arc<dyn ProxyEngine>,
        backend: Box<dyn StorageBackend>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            settings,
            engine,
            probe: Arc::new(HttpProbe),
            backend,
            notifier,
            cancel: CancellationToken::new(),
        }
    }

    /// Swap the connectivity probe. Tests inject scripted probes here.
    pub fn with_probe(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Token cancelling all in-flight sandbox work.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the whole pipeline once, start to finish.
    pub async fn run(self) -> Result<()> {
        let mut gatherer = Gatherer::new(self.settings.fetch_concurrency)?;
        gatherer.gather_feed_lists(&self.settings.feed_sources).await;
        info!(subs = gatherer.sub_count(), "feed lists gathered");

        let registry = Arc::new(NodeRegistry::new());
        gatherer.gather_nodes(registry.clone()).await;
        let nodes = registry.snapshot().await;
        info!(nodes = nodes.len(), "node gathering finished");

        let sandbox = Arc::new(Sandbox::new(
            self.engine.clone(),
            self.probe.clone(),
            self.cancel.child_token(),
        ));
        if let Some(path) = &self.settings.blacklist_path {
            let loaded = sandbox.load_blacklist(path)?;
            info!(loaded, path = %path, "blacklist loaded");
        }

        let gate = Arc::new(Semaphore::new(self.settings.test_concurrency));
        let total = nodes.len();
        let mut workers = Vec::with_capacity(total);

        for (i, node) in nodes.into_iter().enumerate() {
            let gate = gate.clone();
            let sandbox = sandbox.clone();

            workers.push(tokio::spawn(async move {
                let _permit = match gate.acquire().await {
                    Ok(p) => p,
                    Err(_) => return None,
                };

                match sandbox.test_candidate(&node, i + 1, total).await {
                    Ok(()) => None,
                    Err(err) if err.is_duplicate() => None,
                    Err(err) => Some(format!("{} | {}", node, err)),
                }
            }));
        }

        let mut error_values: Vec<String> = Vec::new();
        for worker in workers {
            match worker.await {
                Ok(Some(value)) => error_values.push(value),
                Ok(None) => {}
                Err(err) => warn!(error = %err, "test worker aborted"),
            }
        }

        if let Some(path) = &self.settings.blacklist_path {
            sandbox.save_blacklist(path)?;
            info!(path = %path, "blacklist saved");
        }

        let sandbox = Arc::try_unwrap(sandbox)
            .map_err(|_| anyhow::anyhow!("sandbox still shared after join"))?;
        let results = sandbox.into_results();
        info!(results = results.len(), failures = error_values.len(), "testing finished");

        if !error_values.is_empty() {
            let timestamp = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            self.notifier
                .send_document(
                    &format!("error_{}.txt", timestamp),
                    &error_values.join("\n"),
                    "Error Values",
                )
                .await;
        }

        let (records, raw_total) = crate::persist::build_records(&results);
        store::save(self.backend.as_ref(), self.notifier.as_ref(), &records, raw_total).await
    }
}
