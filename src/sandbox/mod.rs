//! Ephemeral sandboxed connectivity testing.
//!
//! Per candidate: build the typed descriptor, reject fingerprint
//! duplicates before any network work, then run each test mode against a
//! fresh deep copy of the config through a short-lived engine instance.

pub mod engine;
pub mod probe;
pub mod results;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine as _;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::common::error::SandboxError;
use crate::common::{alloc_free_port, md5_hex};
use crate::outbound::builder::build_descriptor;
use crate::outbound::SandboxConfig;
use self::engine::ProxyEngine;
use self::probe::ConnectivityProbe;
use self::results::{GeoInfo, ResultSet, TestResult};

/// Test modes in attempt order.
pub const TEST_MODES: [&str; 2] = ["cdn", "sni"];

/// Well-known CDN edge IP the CDN mode fronts through.
const CDN_HOST: &str = "104.18.2.2";

/// Benign hostname the SNI mode substitutes into TLS/Host fields.
const SNI_HOST: &str = "meet.google.com";

/// Budget for engine construction + start + probe of one mode.
const MODE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Sandbox {
    engine: Arc<dyn ProxyEngine>,
    probe: Arc<dyn ConnectivityProbe>,
    results: ResultSet,
    /// Content fingerprints already tested, scoped to this sandbox.
    seen: Mutex<HashSet<String>>,
    cancel: CancellationToken,
}

impl Sandbox {
    pub fn new(
        engine: Arc<dyn ProxyEngine>,
        probe: Arc<dyn ConnectivityProbe>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            engine,
            probe,
            results: ResultSet::new(),
            seen: Mutex::new(HashSet::new()),
            cancel,
        }
    }

    /// Seed the fingerprint set from a newline-delimited blacklist file.
    /// A missing file is not an error.
    pub fn load_blacklist(&self, path: &str) -> std::io::Result<usize> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        let mut seen = self.seen.lock().expect("fingerprint lock");
        let mut loaded = 0;
        for line in content.lines() {
            let line = line.trim();
            if !line.is_empty() && seen.insert(line.to_string()) {
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    /// Persist the fingerprint set for the next run.
    pub fn save_blacklist(&self, path: &str) -> std::io::Result<()> {
        let seen = self.seen.lock().expect("fingerprint lock");
        let mut lines: Vec<&str> = seen.iter().map(String::as_str).collect();
        lines.sort();
        std::fs::write(path, lines.join("\n"))
    }

    pub async fn result_count(&self) -> usize {
        self.results.len().await
    }

    pub fn into_results(self) -> Vec<TestResult> {
        self.results.into_inner()
    }

    /// Run all test modes for one candidate URI.
    ///
    /// Mode-level failures degrade that mode only; the returned error is
    /// informational for the caller's logs and never aborts the pipeline.
    pub async fn test_candidate(
        &self,
        raw_uri: &str,
        index: usize,
        total: usize,
    ) -> Result<(), SandboxError> {
        let descriptor =
            build_descriptor(raw_uri).map_err(|e| SandboxError::BuildFailed(e.to_string()))?;

        // Fingerprint over the pre-mutation descriptor content. Checked and
        // recorded before any network call: re-testing identical connection
        // parameters is the expensive part.
        let serialized = serde_json::to_vec(&descriptor)
            .map_err(|e| SandboxError::BuildFailed(e.to_string()))?;
        let fingerprint = md5_hex(&serialized);
        if !self
            .seen
            .lock()
            .expect("fingerprint lock")
            .insert(fingerprint)
        {
            return Err(SandboxError::Duplicate);
        }

        let base = SandboxConfig::new(descriptor.clone());
        let mut test_passed: Vec<String> = Vec::new();
        let mut geo = GeoInfo::default();

        for mode in TEST_MODES {
            // Deep copy per mode so modes never interfere.
            let mut config = base.clone();
            apply_mode(&mut config, mode);

            match self.run_mode(&mut config).await {
                Ok(mode_geo) => {
                    test_passed.push(mode.to_string());
                    geo = mode_geo;
                    info!(
                        "[{}/{}] [{}+{}] {:?} {} {}",
                        index,
                        total,
                        self.results.len().await,
                        test_passed.len(),
                        test_passed,
                        geo.country,
                        geo.as_organization
                    );
                }
                Err(err) => {
                    warn!("[{}/{}] {} failed: {}", index, total, mode, err);
                }
            }
        }

        if !test_passed.is_empty() {
            self.results
                .add(TestResult {
                    outbound: descriptor,
                    raw_config: base64::engine::general_purpose::STANDARD.encode(raw_uri),
                    test_passed,
                    geo,
                })
                .await;
        }

        Ok(())
    }

    /// One mode: fresh local port, engine up, probe through it, engine down.
    ///
    /// The engine instance is stopped on ordinary paths and torn down by
    /// drop when the timeout or cancellation abandons the future.
    async fn run_mode(&self, config: &mut SandboxConfig) -> Result<GeoInfo, SandboxError> {
        let port = alloc_free_port().map_err(|e| SandboxError::Engine(e.to_string()))?;
        config.inbound.listen_port = port;

        let work = async {
            let mut instance = self
                .engine
                .construct(config)
                .await
                .map_err(|e| SandboxError::Engine(e.to_string()))?;

            let outcome = async {
                instance
                    .start()
                    .await
                    .map_err(|e| SandboxError::Engine(e.to_string()))?;
                self.probe
                    .probe(port)
                    .await
                    .map_err(|e| SandboxError::Probe(e.to_string()))
            }
            .await;

            instance.stop();
            outcome
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SandboxError::Cancelled),
            result = tokio::time::timeout(MODE_TIMEOUT, work) => match result {
                Ok(outcome) => outcome,
                Err(_) => Err(SandboxError::Timeout(MODE_TIMEOUT)),
            },
        }
    }
}

/// Mutate a deep-copied config for one test mode.
fn apply_mode(config: &mut SandboxConfig, mode: &str) {
    let outbound = &mut config.outbound;
    match mode {
        "cdn" => {
            // Front through the CDN edge, credentials and paths intact.
            outbound.server = CDN_HOST.to_string();
        }
        "sni" => {
            if let Some(tls) = &mut outbound.tls {
                if tls.enabled {
                    tls.insecure = true;
                    tls.server_name = Some(SNI_HOST.to_string());
                }
            }
            if let Some(transport) = &mut outbound.transport {
                if let Some(host_header) = transport.headers.get_mut("Host") {
                    *host_header = SNI_HOST.to_string();
                }
                if transport.host.is_some() {
                    transport.host = Some(SNI_HOST.to_string());
                }
            }
        }
        other => warn!(mode = other, "unknown test mode ignored"),
    }
}
