use serde::Deserialize;
use tokio::sync::Mutex;

use crate::outbound::OutboundDescriptor;

/// Geo metadata returned by the connectivity target.
///
/// The defaults signal "unknown" and are preserved downstream; they are not
/// errors.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GeoInfo {
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_org", rename = "asOrganization")]
    pub as_organization: String,
    #[serde(default)]
    pub ip: String,
}

fn default_country() -> String {
    "XX".to_string()
}

fn default_org() -> String {
    "Nodesift".to_string()
}

impl Default for GeoInfo {
    fn default() -> Self {
        Self {
            country: default_country(),
            as_organization: default_org(),
            ip: String::new(),
        }
    }
}

/// Outcome of a candidate that passed at least one test mode.
#[derive(Debug, Clone)]
pub struct TestResult {
    pub outbound: OutboundDescriptor,
    /// Base64 of the original URI, for auditability.
    pub raw_config: String,
    /// Mode names in the order the modes were attempted.
    pub test_passed: Vec<String>,
    pub geo: GeoInfo,
}

/// Thread-safe, purely additive result aggregation. Readers wait for all
/// sandbox workers to join before calling `into_inner`.
#[derive(Debug, Default)]
pub struct ResultSet {
    results: Mutex<Vec<TestResult>>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, result: TestResult) {
        self.results.lock().await.push(result);
    }

    pub async fn len(&self) -> usize {
        self.results.lock().await.len()
    }

    pub fn into_inner(self) -> Vec<TestResult> {
        self.results.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geo_defaults_signal_unknown() {
        let geo = GeoInfo::default();
        assert_eq!(geo.country, "XX");
        assert_eq!(geo.as_organization, "Nodesift");
    }

    #[test]
    fn geo_deserializes_partial_payloads() {
        let geo: GeoInfo = serde_json::from_str(r#"{"country": "DE"}"#).unwrap();
        assert_eq!(geo.country, "DE");
        assert_eq!(geo.as_organization, "Nodesift");
    }

    #[tokio::test]
    async fn result_set_is_additive() {
        let set = ResultSet::new();
        for i in 0..3 {
            set.add(TestResult {
                outbound: OutboundDescriptor::default(),
                raw_config: format!("raw-{}", i),
                test_passed: vec!["cdn".to_string()],
                geo: GeoInfo::default(),
            })
            .await;
        }
        assert_eq!(set.len().await, 3);
        let results = set.into_inner();
        assert_eq!(results[0].raw_config, "raw-0");
        assert_eq!(results[2].raw_config, "raw-2");
    }
}
