//! Proxy engine boundary.
//!
//! The engine accepts a declarative config, exposes a SOCKS forwarding
//! endpoint on the configured local port once started, and must be torn
//! down after every probe. `BinaryEngine` drives a sing-box compatible
//! executable; tests substitute their own implementations.

use std::io::Write;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::outbound::SandboxConfig;

#[async_trait]
pub trait ProxyEngine: Send + Sync {
    /// Construct an instance bound to the given config. The instance is not
    /// serving until `start` succeeds.
    async fn construct(&self, config: &SandboxConfig) -> Result<Box<dyn EngineInstance>>;
}

/// A constructed engine instance.
///
/// Contract: dropping an instance tears it down. Callers still invoke
/// `stop` on ordinary exit paths; the drop guarantee covers timeouts and
/// early returns, so no instance outlives its probe.
#[async_trait]
pub trait EngineInstance: Send {
    async fn start(&mut self) -> Result<()>;
    fn stop(&mut self);
}

/// Engine backed by an external sing-box compatible binary.
pub struct BinaryEngine {
    program: String,
}

impl BinaryEngine {
    pub fn new(program: String) -> Self {
        Self { program }
    }

    fn render_config(config: &SandboxConfig) -> serde_json::Value {
        serde_json::json!({
            "log": { "level": "error" },
            "inbounds": [{
                "type": "mixed",
                "tag": "probe-in",
                "listen": config.inbound.listen,
                "listen_port": config.inbound.listen_port,
            }],
            "outbounds": [
                serde_json::to_value(&config.outbound).unwrap_or_default(),
            ],
        })
    }
}

#[async_trait]
impl ProxyEngine for BinaryEngine {
    async fn construct(&self, config: &SandboxConfig) -> Result<Box<dyn EngineInstance>> {
        let mut file = tempfile::NamedTempFile::with_suffix(".json")?;
        let rendered = Self::render_config(config);
        file.write_all(serde_json::to_vec(&rendered)?.as_slice())?;
        file.flush()?;

        Ok(Box::new(BinaryInstance {
            program: self.program.clone(),
            config_file: file,
            listen_port: config.inbound.listen_port,
            child: None,
        }))
    }
}

pub struct BinaryInstance {
    program: String,
    config_file: tempfile::NamedTempFile,
    listen_port: u16,
    child: Option<Child>,
}

#[async_trait]
impl EngineInstance for BinaryInstance {
    async fn start(&mut self) -> Result<()> {
        let child = Command::new(&self.program)
            .arg("run")
            .arg("-c")
            .arg(self.config_file.path())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow::anyhow!("cannot spawn {}: {}", self.program, e))?;
        self.child = Some(child);

        // Wait for the forwarding endpoint to come up. The caller's probe
        // budget bounds this loop as a whole.
        for _ in 0..50 {
            if tokio::net::TcpStream::connect(("127.0.0.1", self.listen_port))
                .await
                .is_ok()
            {
                debug!(port = self.listen_port, "engine listening");
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("engine never opened port {}", self.listen_port)
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
        }
    }
}

impl Drop for BinaryInstance {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::OutboundDescriptor;

    #[test]
    fn rendered_config_has_inbound_and_outbound() {
        let mut config = SandboxConfig::new(OutboundDescriptor {
            protocol: "trojan".to_string(),
            server: "h".to_string(),
            server_port: 443,
            password: Some("pw".to_string()),
            ..Default::default()
        });
        config.inbound.listen_port = 2080;

        let rendered = BinaryEngine::render_config(&config);
        assert_eq!(rendered["inbounds"][0]["listen_port"], 2080);
        assert_eq!(rendered["inbounds"][0]["type"], "mixed");
        assert_eq!(rendered["outbounds"][0]["type"], "trojan");
        assert_eq!(rendered["outbounds"][0]["password"], "pw");
    }

    #[tokio::test]
    async fn missing_binary_fails_on_start_not_construct() {
        let engine = BinaryEngine::new("definitely-not-a-real-binary".to_string());
        let config = SandboxConfig::new(OutboundDescriptor::default());
        let mut instance = engine.construct(&config).await.unwrap();
        assert!(instance.start().await.is_err());
    }
}
