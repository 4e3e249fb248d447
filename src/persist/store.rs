//! SQL batch persistence: query building plus a remote HTTP pipeline backend.
//!
//! The whole batch replaces the previous snapshot inside one transaction,
//! so readers never observe a partially written table.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::{error, info};

use super::ProxyRecord;
use crate::notify::Notifier;

/// Rows per INSERT statement.
const INSERT_CHUNK: usize = 100;

pub fn create_table_query() -> String {
    "CREATE TABLE IF NOT EXISTS proxies (
    id INTEGER PRIMARY KEY,
    server STRING,
    ip STRING,
    server_port INT8,
    uuid STRING,
    password STRING,
    security STRING,
    alter_id INT2,
    method STRING,
    plugin STRING,
    plugin_opts STRING,
    host STRING,
    tls INT2,
    transport STRING,
    path STRING,
    service_name STRING,
    insecure INT2,
    sni STRING,
    remark STRING,
    conn_mode STRING,
    country_code STRING,
    region STRING,
    org STRING,
    vpn STRING,
    raw STRING
);"
    .to_string()
}

const INSERT_PREFIX: &str = "INSERT INTO proxies (\
server, ip, server_port, uuid, password, security, alter_id, method, \
plugin, plugin_opts, host, tls, transport, path, service_name, insecure, \
sni, remark, conn_mode, country_code, region, org, vpn, raw) VALUES";

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn record_values(record: &ProxyRecord) -> String {
    format!(
        "({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {})",
        quote(&record.server),
        quote(&record.ip),
        record.server_port,
        quote(&record.uuid),
        quote(&record.password),
        quote(&record.security),
        record.alter_id,
        quote(&record.method),
        quote(&record.plugin),
        quote(&record.plugin_opts),
        quote(&record.host),
        record.tls,
        quote(&record.transport),
        quote(&record.path),
        quote(&record.service_name),
        record.insecure,
        quote(&record.sni),
        quote(&record.remark),
        quote(&record.conn_mode),
        quote(&record.country_code),
        quote(&record.region),
        quote(&record.org),
        quote(&record.vpn),
        quote(&record.raw),
    )
}

/// Full statement list for a batch: schema guard, snapshot wipe, then
/// chunked inserts. Meant to run inside one transaction.
pub fn build_queries(records: &[ProxyRecord]) -> Vec<String> {
    let mut queries = vec![create_table_query(), "DELETE FROM proxies;".to_string()];

    for chunk in records.chunks(INSERT_CHUNK) {
        let values: Vec<String> = chunk.iter().map(record_values).collect();
        queries.push(format!("{} {};", INSERT_PREFIX, values.join(",")));
    }

    queries
}

/// Transactional statement execution. Either every statement applies or
/// none do.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn execute_transaction(&self, statements: &[String]) -> Result<()>;
}

/// libsql-style remote database driven over its HTTP pipeline endpoint.
pub struct RemoteSqlBackend {
    client: reqwest::Client,
    endpoint: String,
    auth_token: Option<String>,
}

impl RemoteSqlBackend {
    pub fn new(url: &str, auth_token: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/v2/pipeline", url.trim_end_matches('/')),
            auth_token: auth_token.map(|t| t.to_string()),
        }
    }
}

#[async_trait]
impl StorageBackend for RemoteSqlBackend {
    async fn execute_transaction(&self, statements: &[String]) -> Result<()> {
        let mut requests = vec![json!({"type": "execute", "stmt": {"sql": "BEGIN"}})];
        for statement in statements {
            requests.push(json!({"type": "execute", "stmt": {"sql": statement}}));
        }
        requests.push(json!({"type": "execute", "stmt": {"sql": "COMMIT"}}));
        requests.push(json!({"type": "close"}));

        let mut request = self.client.post(&self.endpoint).json(&json!({"requests": requests}));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.context("pipeline request failed")?;
        let status = response.status();
        let body: serde_json::Value = response.json().await.context("pipeline response body")?;
        if !status.is_success() {
            return Err(anyhow!("pipeline request returned {}: {}", status, body));
        }

        // The pipeline endpoint reports per-statement failures in the body
        // with an overall 200. A failed statement aborts the batch, so the
        // open transaction never commits.
        if let Some(results) = body.get("results").and_then(|r| r.as_array()) {
            for result in results {
                if result.get("type").and_then(|t| t.as_str()) == Some("error") {
                    let message = result
                        .pointer("/error/message")
                        .and_then(|m| m.as_str())
                        .unwrap_or("unknown statement error");
                    return Err(anyhow!("statement failed, transaction aborted: {}", message));
                }
            }
        }

        Ok(())
    }
}

/// Persist a normalized batch and report the outcome to the operator.
///
/// The full query text goes out as a document before execution so a
/// failing batch can be replayed by hand. On failure the error also goes
/// out as a document and the error propagates to the caller.
pub async fn save(
    backend: &dyn StorageBackend,
    notifier: &dyn Notifier,
    records: &[ProxyRecord],
    raw_total: usize,
) -> Result<()> {
    let queries = build_queries(records);
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    notifier
        .send_document(
            &format!("query_{}.txt", timestamp),
            &queries.join("\n"),
            "DB Query",
        )
        .await;

    if let Err(err) = backend.execute_transaction(&queries).await {
        error!("insert failed: {:#}", err);
        notifier
            .send_document(
                &format!("error_query_{}.txt", timestamp),
                &format!("{:#}", err),
                "Error Query",
            )
            .await;
        return Err(err);
    }

    info!("=========================");
    info!("insert operation succeed");
    info!("total raw account: {}", raw_total);
    info!("total account saved: {}", records.len());
    notifier
        .send_message(&format!("Account saved: {}", records.len()))
        .await;

    Ok(())
}
