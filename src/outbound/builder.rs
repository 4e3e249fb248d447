//! Config builder: one candidate URI in, one typed descriptor out.
//!
//! Pure function boundary — no I/O, no shared state. A build failure drops
//! that one candidate and nothing else.

use std::collections::HashMap;

use anyhow::Result;
use base64::Engine;

use super::{OutboundDescriptor, TlsOptions, TransportOptions};

/// Build a structured outbound descriptor from a candidate URI.
pub fn build_descriptor(uri: &str) -> Result<OutboundDescriptor> {
    if let Some(rest) = uri.strip_prefix("ss://") {
        return parse_ss(rest);
    }
    if let Some(rest) = uri.strip_prefix("vmess://") {
        return parse_vmess(rest);
    }
    if let Some(rest) = uri.strip_prefix("trojan://") {
        return parse_userinfo_link("trojan", rest);
    }
    if let Some(rest) = uri.strip_prefix("vless://") {
        return parse_userinfo_link("vless", rest);
    }
    anyhow::bail!("unsupported scheme: {}", uri.chars().take(16).collect::<String>())
}

fn parse_ss(rest: &str) -> Result<OutboundDescriptor> {
    let main = rest.split('#').next().unwrap_or(rest);
    let (main, params) = split_params(main);

    let (user_info, server_part) = match main.rsplit_once('@') {
        Some((user, server)) => (decode_userinfo(user), server.to_string()),
        None => {
            // Entire body base64: method:password@host:port
            let decoded = decode_userinfo(main);
            let (user, server) = decoded
                .rsplit_once('@')
                .ok_or_else(|| anyhow::anyhow!("ss link missing userinfo"))?;
            (user.to_string(), server.to_string())
        }
    };

    let (method, password) = user_info
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("ss userinfo missing method"))?;
    let (server, port) = parse_host_port(&server_part)?;

    let plugin = params.get("plugin").cloned();
    let plugin_opts = plugin.as_ref().and_then(|p| {
        // plugin=obfs-local;obfs=tls;obfs-host=example.com
        p.split_once(';').map(|(_, opts)| opts.to_string())
    });
    let plugin = plugin.map(|p| p.split(';').next().unwrap_or(&p).to_string());

    Ok(OutboundDescriptor {
        protocol: "shadowsocks".to_string(),
        server,
        server_port: port,
        method: Some(method.to_string()),
        password: Some(password.to_string()),
        plugin,
        plugin_opts,
        ..Default::default()
    })
}

fn parse_vmess(rest: &str) -> Result<OutboundDescriptor> {
    let decoded = decode_base64(rest)
        .ok_or_else(|| anyhow::anyhow!("vmess link body is not valid base64"))?;
    let json: serde_json::Value = serde_json::from_str(&decoded)?;

    let server = json
        .get("add")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("vmess link missing server"))?
        .to_string();
    let port = json
        .get("port")
        .and_then(|v| {
            v.as_u64()
                .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        })
        .ok_or_else(|| anyhow::anyhow!("vmess link missing port"))? as u16;
    let uuid = json
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("vmess link missing uuid"))?
        .to_string();

    let alter_id = json.get("aid").and_then(|v| {
        v.as_u64()
            .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
    });
    let str_field = |key: &str| {
        json.get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let transport = match str_field("net").as_deref() {
        Some("tcp") | None => None,
        Some(net) => {
            let mut opts = TransportOptions {
                transport_type: net.to_string(),
                path: str_field("path"),
                host: str_field("host"),
                ..Default::default()
            };
            if net == "grpc" {
                opts.service_name = opts.path.take();
            }
            Some(opts)
        }
    };

    let tls = match str_field("tls").as_deref() {
        Some("tls") => Some(TlsOptions {
            enabled: true,
            insecure: false,
            server_name: str_field("sni").or_else(|| str_field("host")),
        }),
        _ => None,
    };

    Ok(OutboundDescriptor {
        protocol: "vmess".to_string(),
        server,
        server_port: port,
        uuid: Some(uuid),
        alter_id: alter_id.map(|a| a as u16),
        security: str_field("scy"),
        transport,
        tls,
        ..Default::default()
    })
}

/// trojan:// and vless:// share the `credential@host:port?params#name` form.
fn parse_userinfo_link(protocol: &str, rest: &str) -> Result<OutboundDescriptor> {
    let main = rest.split('#').next().unwrap_or(rest);
    let (main, params) = split_params(main);

    let (credential, server_part) = main
        .split_once('@')
        .ok_or_else(|| anyhow::anyhow!("{} link missing credential", protocol))?;
    let (server, port) = parse_host_port(server_part)?;

    let transport = match params.get("type").map(String::as_str) {
        Some("tcp") | None => None,
        Some(kind) => Some(TransportOptions {
            transport_type: kind.to_string(),
            path: params.get("path").cloned(),
            service_name: params.get("serviceName").cloned(),
            host: params.get("host").cloned(),
            ..Default::default()
        }),
    };

    let security = params.get("security").cloned();
    // trojan is TLS by definition; vless only when security says so.
    let tls_enabled = protocol == "trojan"
        || matches!(security.as_deref(), Some("tls") | Some("reality") | Some("xtls"));
    let tls = tls_enabled.then(|| TlsOptions {
        enabled: true,
        insecure: matches!(
            params.get("allowInsecure").map(String::as_str),
            Some("1") | Some("true")
        ),
        server_name: params.get("sni").cloned(),
    });

    let mut descriptor = OutboundDescriptor {
        protocol: protocol.to_string(),
        server,
        server_port: port,
        security,
        transport,
        tls,
        ..Default::default()
    };
    if protocol == "vless" {
        descriptor.uuid = Some(credential.to_string());
    } else {
        descriptor.password = Some(credential.to_string());
    }
    Ok(descriptor)
}

fn split_params(s: &str) -> (&str, HashMap<String, String>) {
    match s.split_once('?') {
        Some((main, query)) => {
            let params = query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .map(|(k, v)| (k.to_string(), url_decode(v)))
                .collect();
            (main, params)
        }
        None => (s, HashMap::new()),
    }
}

fn decode_userinfo(s: &str) -> String {
    decode_base64(s).unwrap_or_else(|| url_decode(s))
}

fn decode_base64(s: &str) -> Option<String> {
    let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&s)
        .or_else(|_| base64::engine::general_purpose::STANDARD_NO_PAD.decode(&s))
        .or_else(|_| base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(&s))
        .ok()?;
    String::from_utf8(bytes).ok()
}

fn parse_host_port(s: &str) -> Result<(String, u16)> {
    // IPv6 literal: [::1]:443
    if let Some(rest) = s.strip_prefix('[') {
        let end = rest
            .find(']')
            .ok_or_else(|| anyhow::anyhow!("unterminated IPv6 literal"))?;
        let host = &rest[..end];
        let port = rest
            .get(end + 2..)
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| anyhow::anyhow!("missing port in {}", s))?;
        return Ok((host.to_string(), port));
    }
    let (host, port_str) = s
        .rsplit_once(':')
        .ok_or_else(|| anyhow::anyhow!("missing port in {}", s))?;
    let port = port_str
        .parse()
        .map_err(|_| anyhow::anyhow!("bad port in {}", s))?;
    Ok((host.to_string(), port))
}

fn url_decode(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '%' {
            let hex: String = chars.by_ref().take(2).collect();
            if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                result.push(byte as char);
            } else {
                result.push('%');
                result.push_str(&hex);
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_vless_descriptor() {
        let uri = "vless://550e8400-e29b-41d4-a716-446655440000@server.com:443?security=tls&sni=cdn.example.com&type=ws&path=%2Fws&host=cdn.example.com#Node";
        let d = build_descriptor(uri).unwrap();
        assert_eq!(d.protocol, "vless");
        assert_eq!(d.server, "server.com");
        assert_eq!(d.server_port, 443);
        assert_eq!(d.uuid.as_deref(), Some("550e8400-e29b-41d4-a716-446655440000"));
        let tls = d.tls.unwrap();
        assert!(tls.enabled);
        assert!(!tls.insecure);
        assert_eq!(tls.server_name.as_deref(), Some("cdn.example.com"));
        let transport = d.transport.unwrap();
        assert_eq!(transport.transport_type, "ws");
        assert_eq!(transport.path.as_deref(), Some("/ws"));
        assert_eq!(transport.host.as_deref(), Some("cdn.example.com"));
    }

    #[test]
    fn build_trojan_descriptor_is_tls_by_default() {
        let d = build_descriptor("trojan://secret@host.com:443?type=grpc&serviceName=svc").unwrap();
        assert_eq!(d.protocol, "trojan");
        assert_eq!(d.password.as_deref(), Some("secret"));
        assert!(d.tls.as_ref().unwrap().enabled);
        assert_eq!(
            d.transport.unwrap().service_name.as_deref(),
            Some("svc")
        );
    }

    #[test]
    fn build_trojan_allow_insecure() {
        let d = build_descriptor("trojan://pw@h:443?allowInsecure=1&sni=x.y").unwrap();
        let tls = d.tls.unwrap();
        assert!(tls.insecure);
        assert_eq!(tls.server_name.as_deref(), Some("x.y"));
    }

    #[test]
    fn build_vmess_descriptor() {
        let json = serde_json::json!({
            "v": "2",
            "ps": "node",
            "add": "example.com",
            "port": "443",
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "aid": "0",
            "net": "ws",
            "path": "/tunnel",
            "host": "front.example.com",
            "tls": "tls",
        });
        let encoded = base64::engine::general_purpose::STANDARD.encode(json.to_string());
        let d = build_descriptor(&format!("vmess://{}", encoded)).unwrap();
        assert_eq!(d.protocol, "vmess");
        assert_eq!(d.server, "example.com");
        assert_eq!(d.server_port, 443);
        assert_eq!(d.alter_id, Some(0));
        assert_eq!(d.transport.as_ref().unwrap().transport_type, "ws");
        assert_eq!(d.transport.as_ref().unwrap().path.as_deref(), Some("/tunnel"));
        assert!(d.tls.as_ref().unwrap().enabled);
        assert_eq!(
            d.tls.unwrap().server_name.as_deref(),
            Some("front.example.com")
        );
    }

    #[test]
    fn build_ss_descriptor_with_plugin() {
        let user = base64::engine::general_purpose::STANDARD.encode("aes-256-gcm:pass123");
        let uri = format!(
            "ss://{}@1.2.3.4:8388?plugin=obfs-local%3Bobfs%3Dtls%3Bobfs-host%3Dexample.com#SS",
            user
        );
        let d = build_descriptor(&uri).unwrap();
        assert_eq!(d.protocol, "shadowsocks");
        assert_eq!(d.method.as_deref(), Some("aes-256-gcm"));
        assert_eq!(d.password.as_deref(), Some("pass123"));
        assert_eq!(d.plugin.as_deref(), Some("obfs-local"));
        assert_eq!(d.plugin_opts.as_deref(), Some("obfs=tls;obfs-host=example.com"));
    }

    #[test]
    fn build_ss_fully_encoded_form() {
        let encoded =
            base64::engine::general_purpose::STANDARD.encode("chacha20-ietf-poly1305:pw@5.6.7.8:8389");
        let d = build_descriptor(&format!("ss://{}", encoded)).unwrap();
        assert_eq!(d.server, "5.6.7.8");
        assert_eq!(d.server_port, 8389);
        assert_eq!(d.method.as_deref(), Some("chacha20-ietf-poly1305"));
    }

    #[test]
    fn ipv6_host_port() {
        let d = build_descriptor("trojan://pw@[2001:db8::1]:443").unwrap();
        assert_eq!(d.server, "2001:db8::1");
        assert_eq!(d.server_port, 443);
    }

    #[test]
    fn unsupported_scheme_fails() {
        assert!(build_descriptor("http://example.com").is_err());
        assert!(build_descriptor("garbage").is_err());
    }

    #[test]
    fn malformed_links_fail_cleanly() {
        assert!(build_descriptor("vless://no-at-sign").is_err());
        assert!(build_descriptor("vmess://!!!notbase64!!!").is_err());
        assert!(build_descriptor("trojan://pw@host-without-port").is_err());
    }
}
