//! Feed-body → candidate URI extraction.
//!
//! Feeds come in two shapes: plain text with one proxy link per line (or
//! separated by pipes/commas/`<br/>`), or the whole body base64 encoded.

use base64::Engine;
use tracing::debug;

/// Connection schemes accepted into the node registry.
pub const ACCEPTED_SCHEMES: [&str; 4] = ["vmess://", "vless://", "trojan://", "ss://"];

/// Separators a feed body is split on. Every separator is applied to the
/// full body and all fragments are accumulated, so a fragment can surface
/// once per separator; the registry's set semantics collapse the repeats.
const SEPARATORS: [&str; 4] = ["\n", "|", ",", "<br/>"];

/// Bodies shorter than this are treated as non-feeds (error pages etc.).
const MIN_BODY_LEN: usize = 100;

/// Extract candidate node URIs from a raw feed body.
pub fn extract_nodes(body: &str) -> Vec<String> {
    if body.len() < MIN_BODY_LEN {
        return Vec::new();
    }

    let decoded;
    let body = if !body.contains("://") {
        decoded = match decode_base64_chain(body) {
            Some(text) => text,
            None => {
                debug!("feed body is neither links nor decodable base64, keeping as-is");
                body.to_string()
            }
        };
        decoded.as_str()
    } else {
        body
    };

    let mut fragments: Vec<&str> = Vec::new();
    for separator in SEPARATORS {
        fragments.extend(body.split(separator));
    }

    fragments
        .into_iter()
        .map(str::trim)
        // Splitting on one separator leaves the others embedded in the
        // fragment; only atomic fragments are candidates.
        .filter(|fragment| !SEPARATORS.iter().any(|sep| fragment.contains(sep)))
        .filter(|fragment| {
            ACCEPTED_SCHEMES
                .iter()
                .any(|scheme| fragment.starts_with(scheme))
        })
        .map(str::to_string)
        .collect()
}

/// Lenient decode first (whitespace stripped, standard alphabet), then the
/// unpadded and url-safe variants. First success wins.
fn decode_base64_chain(body: &str) -> Option<String> {
    let stripped: String = body.chars().filter(|c| !c.is_whitespace()).collect();

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&stripped)
        .or_else(|_| base64::engine::general_purpose::STANDARD_NO_PAD.decode(&stripped))
        .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(&stripped))
        .or_else(|_| base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(&stripped))
        .ok()?;
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    // Bodies below the minimum length are skipped entirely, so test inputs
    // use payloads long enough to clear it.
    fn vmess_link() -> String {
        format!("vmess://{}", "A".repeat(64))
    }

    fn vless_link() -> String {
        format!("vless://{}", "B".repeat(64))
    }

    #[test]
    fn short_bodies_yield_nothing() {
        assert!(extract_nodes("vmess://AAAA").is_empty());
        assert!(extract_nodes("").is_empty());
    }

    #[test]
    fn splits_on_every_separator_and_collapses() {
        let body = format!("{}\n|,{}", vmess_link(), vless_link());
        let mut nodes = extract_nodes(&body);
        nodes.sort();
        nodes.dedup();
        assert_eq!(nodes, vec![vless_link(), vmess_link()]);
    }

    #[test]
    fn fragments_repeat_once_per_matching_separator() {
        // A body with no separators at all survives every split whole.
        let body = format!("{}{}", vmess_link(), "A".repeat(64));
        let nodes = extract_nodes(&body);
        assert_eq!(nodes.len(), SEPARATORS.len());
        assert!(nodes.iter().all(|n| n == &nodes[0]));
    }

    #[test]
    fn pipe_delimited_links_both_survive() {
        let trojan = format!("trojan://{}@host:443", "p".repeat(48));
        let ss = format!("ss://{}@host:8388", "q".repeat(48));
        let body = format!("{}|{}", trojan, ss);
        let nodes = extract_nodes(&body);
        assert!(nodes.contains(&trojan));
        assert!(nodes.contains(&ss));
    }

    #[test]
    fn rejects_unknown_schemes() {
        let body = format!("http://{}\nftp://example.com\n{}", "x".repeat(64), vmess_link());
        assert_eq!(extract_nodes(&body), vec![vmess_link()]);
    }

    #[test]
    fn decodes_base64_bodies() {
        let plain = format!("{}\n{}\n", vmess_link(), vless_link());
        let encoded = base64::engine::general_purpose::STANDARD.encode(&plain);
        let mut nodes = extract_nodes(&encoded);
        nodes.sort();
        nodes.dedup();
        assert_eq!(nodes, vec![vless_link(), vmess_link()]);
    }

    #[test]
    fn decodes_unpadded_base64() {
        // 146 plain bytes encode to 195 chars, not a multiple of four, so
        // the standard engine rejects it and the unpadded fallback decodes.
        let plain = format!("{}\n{}\n", vmess_link(), vless_link());
        let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(&plain);
        let nodes = extract_nodes(&encoded);
        assert!(nodes.contains(&vmess_link()));
        assert!(nodes.contains(&vless_link()));
    }

    #[test]
    fn undecodable_body_without_links_yields_nothing() {
        let body = "?".repeat(MIN_BODY_LEN + 10);
        assert!(extract_nodes(&body).is_empty());
    }
}
