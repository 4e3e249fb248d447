//! Field normalization and persistence-key deduplication.
//!
//! One flat record per (test result, passed mode). The persistence key is a
//! semantic composite identity, deliberately independent of the sandbox's
//! content fingerprint: two different raw candidates can normalize to the
//! same logical account.

pub mod geo;
pub mod store;

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::outbound::OutboundDescriptor;
use crate::sandbox::results::{GeoInfo, TestResult};

fn unsafe_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("[^A-Za-z0-9-]").expect("static regex"))
}

/// Storage-ready flat record, one row of the proxies table.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ProxyRecord {
    pub server: String,
    pub ip: String,
    pub server_port: u16,
    pub uuid: String,
    pub password: String,
    pub security: String,
    pub alter_id: u16,
    pub method: String,
    pub plugin: String,
    pub plugin_opts: String,
    pub host: String,
    pub tls: bool,
    pub transport: String,
    pub path: String,
    pub service_name: String,
    pub insecure: bool,
    pub sni: String,
    pub remark: String,
    pub conn_mode: String,
    pub country_code: String,
    pub region: String,
    pub org: String,
    pub vpn: String,
    /// Base64 of the original URI.
    pub raw: String,
}

/// Composite identity for final-batch deduplication.
pub fn persistence_key(record: &ProxyRecord) -> String {
    format!(
        "{}_{}_{}_{}_{}_{}_{}_{}_{}_{}",
        record.server_port,
        record.uuid,
        record.password,
        record.plugin_opts,
        record.path,
        record.transport,
        record.conn_mode,
        record.country_code,
        record.org,
        record.vpn
    )
}

/// First-seen-wins key filter.
#[derive(Debug, Default)]
pub struct KeyDeduper {
    seen: HashSet<String>,
}

impl KeyDeduper {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the key is new and the record should be kept.
    pub fn admit(&mut self, key: String) -> bool {
        self.seen.insert(key)
    }

    pub fn saved(&self) -> usize {
        self.seen.len()
    }
}

/// Normalize all aggregated results into deduplicated records.
///
/// Returns the records plus the raw result total (always ≥ the record
/// count; dropped duplicates stay in the raw total).
pub fn build_records(results: &[TestResult]) -> (Vec<ProxyRecord>, usize) {
    let mut deduper = KeyDeduper::new();
    let mut records: Vec<ProxyRecord> = Vec::new();

    for result in results {
        let base = base_record(&result.outbound, &result.geo, &result.raw_config);

        for mode in &result.test_passed {
            let mut record = base.clone();
            record.conn_mode = mode.clone();

            let tls_tag = if record.tls { "TLS" } else { "NTLS" };
            record.remark = format!(
                "{} {} {} {} {} {}",
                records.len() + 1,
                geo::cc_to_emoji(&record.country_code),
                record.org,
                record.transport,
                mode,
                tls_tag
            )
            .to_uppercase();

            if deduper.admit(persistence_key(&record)) {
                records.push(record);
            }
        }
    }

    (records, results.len())
}

/// Everything except the per-mode fields (`conn_mode`, `remark`).
fn base_record(outbound: &OutboundDescriptor, geo: &GeoInfo, raw: &str) -> ProxyRecord {
    let mut record = ProxyRecord {
        server: outbound.server.clone(),
        server_port: outbound.server_port,
        ip: geo.ip.clone(),
        country_code: geo.country.clone(),
        region: geo::region_from_cc(&geo.country).to_string(),
        org: geo.as_organization.clone(),
        vpn: outbound.protocol.clone(),
        transport: "tcp".to_string(),
        raw: raw.to_string(),
        ..Default::default()
    };

    if let Some(uuid) = &outbound.uuid {
        record.uuid = unsafe_pattern().replace_all(uuid, "").into_owned();
    }
    if let Some(password) = &outbound.password {
        record.password = unsafe_pattern().replace_all(password, "").into_owned();
    }
    if let Some(security) = &outbound.security {
        record.security = security.clone();
    }
    if let Some(alter_id) = outbound.alter_id {
        record.alter_id = alter_id;
    }
    if let Some(method) = &outbound.method {
        record.method = method.clone();
    }
    if let Some(plugin) = &outbound.plugin {
        record.plugin = plugin.clone();
    }
    if let Some(plugin_opts) = &outbound.plugin_opts {
        record.plugin_opts = plugin_opts.clone();
    }

    if let Some(transport) = &outbound.transport {
        record.transport = transport.transport_type.clone();
        if let Some(service_name) = &transport.service_name {
            record.service_name = service_name.clone();
        }
        if let Some(path) = &transport.path {
            record.path = path.clone();
        }
        if let Some(host) = &transport.host {
            record.host = host.clone();
        }
        if let Some(host) = transport.headers.get("Host") {
            record.host = host.clone();
        }
    }

    // TLS inference precedence: explicit sub-descriptor, then a "tls"
    // marker in plugin options, then well-known TLS ports.
    if let Some(tls) = &outbound.tls {
        record.tls = tls.enabled;
        record.insecure = tls.insecure;
        if let Some(sni) = &tls.server_name {
            record.sni = sni.clone();
        }
    } else if outbound
        .plugin_opts
        .as_deref()
        .is_some_and(|opts| opts.contains("tls"))
    {
        record.tls = true;
    } else if record.server_port == 443 || record.server_port == 8443 {
        record.tls = true;
    }

    record
}
