//! Typed outbound descriptor: the parsed form of a candidate node URI.
//!
//! Field presence is explicit optionality; the sandbox and the normalizer
//! never traverse untyped JSON.

pub mod builder;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Structured outbound connection descriptor.
///
/// Immutable for the pipeline except for the two deliberate sandbox
/// mutations (CDN server overwrite, SNI/Host overwrite), which always
/// operate on a deep copy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OutboundDescriptor {
    /// Protocol name: vmess, vless, trojan, shadowsocks.
    #[serde(rename = "type")]
    pub protocol: String,
    pub server: String,
    pub server_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alter_id: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_opts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsOptions>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TransportOptions {
    /// ws, grpc, http, ...
    #[serde(rename = "type")]
    pub transport_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TlsOptions {
    pub enabled: bool,
    #[serde(default)]
    pub insecure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
}

/// Local mixed (HTTP/SOCKS) listener the engine exposes during a probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundOptions {
    pub listen: String,
    pub listen_port: u16,
}

impl Default for InboundOptions {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1".to_string(),
            listen_port: 0,
        }
    }
}

/// Full ephemeral engine config for one probe: one inbound, one outbound.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub inbound: InboundOptions,
    pub outbound: OutboundDescriptor,
}

impl SandboxConfig {
    pub fn new(outbound: OutboundDescriptor) -> Self {
        Self {
            inbound: InboundOptions::default(),
            outbound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_fields_are_omitted_from_serialization() {
        let descriptor = OutboundDescriptor {
            protocol: "trojan".to_string(),
            server: "example.com".to_string(),
            server_port: 443,
            password: Some("pw".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&descriptor).unwrap();
        assert!(json.contains("\"type\":\"trojan\""));
        assert!(!json.contains("uuid"));
        assert!(!json.contains("transport"));
    }

    #[test]
    fn serialization_is_deterministic_for_fingerprinting() {
        let descriptor = OutboundDescriptor {
            protocol: "vless".to_string(),
            server: "h".to_string(),
            server_port: 443,
            uuid: Some("u".to_string()),
            tls: Some(TlsOptions {
                enabled: true,
                insecure: false,
                server_name: Some("h".to_string()),
            }),
            ..Default::default()
        };
        let a = serde_json::to_string(&descriptor).unwrap();
        let b = serde_json::to_string(&descriptor.clone()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn sandbox_config_deep_copy_is_independent() {
        let config = SandboxConfig::new(OutboundDescriptor {
            protocol: "vmess".to_string(),
            server: "origin.example".to_string(),
            server_port: 443,
            ..Default::default()
        });
        let mut copy = config.clone();
        copy.outbound.server = "mutated.example".to_string();
        copy.inbound.listen_port = 1080;
        assert_eq!(config.outbound.server, "origin.example");
        assert_eq!(config.inbound.listen_port, 0);
    }
}
