//! Connectivity probing through a running engine's SOCKS endpoint.

use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use super::results::GeoInfo;

/// Connectivity targets, tried in order. The loop stops at the first
/// target that yields both a country and an organization, so extra
/// fallback targets can be appended without code changes.
pub const CONNECTIVITY_TARGETS: [&str; 1] = ["https://myip.ipeek.workers.dev"];

/// Per-request budget inside a probe.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

fn org_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\w+").expect("static regex"))
}

/// Keep only word tokens of an ISP organization string, joined by single
/// spaces. Strips the punctuation noise ISP names tend to carry.
pub fn sanitize_org(org: &str) -> String {
    org_pattern()
        .find_iter(org)
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Probe the connectivity targets through `socks5://127.0.0.1:{port}`.
    /// Ok means the tunnel worked; the geo payload may still be defaults.
    async fn probe(&self, socks_port: u16) -> Result<GeoInfo>;
}

/// Real probe: HTTPS request through the engine's SOCKS endpoint.
#[derive(Debug, Default)]
pub struct HttpProbe;

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn probe(&self, socks_port: u16) -> Result<GeoInfo> {
        let proxy = reqwest::Proxy::all(format!("socks5://127.0.0.1:{}", socks_port))?;
        let client = reqwest::Client::builder()
            .proxy(proxy)
            .danger_accept_invalid_certs(true)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let mut geo = GeoInfo::default();
        for target in CONNECTIVITY_TARGETS {
            let response = client.get(target).send().await?;
            if response.status() == reqwest::StatusCode::OK {
                if let Ok(parsed) = response.json::<GeoInfo>().await {
                    geo = parsed;
                }
            }

            geo.as_organization = sanitize_org(&geo.as_organization);
            debug!(target, country = %geo.country, org = %geo.as_organization, "probe response");

            if !geo.as_organization.is_empty() && !geo.country.is_empty() {
                break;
            }
        }

        Ok(geo)
    }
}
