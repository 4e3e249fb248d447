//! Subscription gathering: fetch every feed list, then every sub-URL each
//! entry names, and funnel extracted node URIs into the shared registry.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::extractor::extract_nodes;
use super::{NodeRegistry, SubEntry};

/// Per sub-URL fetch budget.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Gatherer {
    client: reqwest::Client,
    concurrency: usize,
    subs: Vec<SubEntry>,
}

impl Gatherer {
    pub fn new(concurrency: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            concurrency,
            subs: Vec::new(),
        })
    }

    pub fn sub_count(&self) -> usize {
        self.subs.len()
    }

    /// Fetch every feed-list URL and decode it into `{url}` entries.
    /// Non-200 responses and decode failures skip that one feed list.
    pub async fn gather_feed_lists(&mut self, feed_sources: &[String]) {
        for source in feed_sources {
            match self.fetch_feed_list(source).await {
                Ok(mut entries) => {
                    info!(url = %source, entries = entries.len(), "feed list loaded");
                    self.subs.append(&mut entries);
                }
                Err(err) => warn!(url = %source, error = %err, "feed list skipped"),
            }
        }
    }

    async fn fetch_feed_list(&self, url: &str) -> Result<Vec<SubEntry>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json::<Vec<SubEntry>>().await?)
    }

    /// Fetch every sub-URL with a bounded worker pool and insert extracted
    /// nodes into the registry. Waits for the whole pool before returning;
    /// individual fetch failures are absorbed.
    pub async fn gather_nodes(&self, registry: Arc<NodeRegistry>) {
        let gate = Arc::new(Semaphore::new(self.concurrency));
        let mut workers = Vec::new();

        for (i, sub) in self.subs.iter().enumerate() {
            let sub_urls: Vec<String> = sub.url.split('|').map(str::to_string).collect();
            let sub_total = sub_urls.len();

            for (x, sub_url) in sub_urls.into_iter().enumerate() {
                let gate = gate.clone();
                let client = self.client.clone();
                let registry = registry.clone();
                let subs_total = self.subs.len();

                workers.push(tokio::spawn(async move {
                    let _permit = match gate.acquire().await {
                        Ok(p) => p,
                        Err(_) => return,
                    };

                    match fetch_and_extract(&client, &sub_url, &registry).await {
                        Ok(added) => {
                            info!(
                                "[[{}/{}]{}/{}] [{}] [{}] {}",
                                x,
                                sub_total,
                                i,
                                subs_total,
                                added,
                                registry.len().await,
                                sub_url
                            );
                        }
                        Err(err) => warn!(url = %sub_url, error = %err, "sub fetch abandoned"),
                    }
                }));
            }
        }

        // The only hard synchronization point: the registry is not read
        // until every worker is done.
        for worker in workers {
            if let Err(err) = worker.await {
                warn!(error = %err, "gather worker aborted");
            }
        }
    }
}

async fn fetch_and_extract(
    client: &reqwest::Client,
    url: &str,
    registry: &NodeRegistry,
) -> Result<usize> {
    let response = client.get(url).send().await?.error_for_status()?;
    let body = response.text().await?;

    let mut added = 0;
    for node in extract_nodes(&body) {
        if registry.insert(node).await {
            added += 1;
        }
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    // Minimal one-shot HTTP server, enough for reqwest to talk to.
    async fn serve_once(body: String, content_type: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 2048];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    content_type,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn feed_list_fetch_and_decode() {
        let url = serve_once(
            r#"[{"url": "https://a.example/sub"}, {"url": "https://b.example/s1|https://b.example/s2"}]"#.to_string(),
            "application/json",
        )
        .await;

        let mut gatherer = Gatherer::new(4).unwrap();
        gatherer.gather_feed_lists(&[url]).await;
        assert_eq!(gatherer.sub_count(), 2);
        assert!(gatherer.subs[1].url.contains('|'));
    }

    #[tokio::test]
    async fn bad_feed_list_is_skipped_not_fatal() {
        let url = serve_once("not json at all".to_string(), "text/plain").await;
        let mut gatherer = Gatherer::new(4).unwrap();
        gatherer
            .gather_feed_lists(&[url, "http://127.0.0.1:1/unreachable".to_string()])
            .await;
        assert_eq!(gatherer.sub_count(), 0);
    }

    #[tokio::test]
    async fn gather_nodes_fills_registry_and_joins() {
        let link = format!("vmess://{}", "A".repeat(96));
        let sub_url = serve_once(format!("{}\n", link), "text/plain").await;

        let mut gatherer = Gatherer::new(2).unwrap();
        gatherer.subs.push(SubEntry { url: sub_url });

        let registry = Arc::new(NodeRegistry::new());
        gatherer.gather_nodes(registry.clone()).await;

        assert_eq!(registry.snapshot().await, vec![link]);
    }

    #[tokio::test]
    async fn unreachable_sub_url_is_absorbed() {
        let mut gatherer = Gatherer::new(2).unwrap();
        gatherer.subs.push(SubEntry {
            url: "http://127.0.0.1:1/nope".to_string(),
        });

        let registry = Arc::new(NodeRegistry::new());
        gatherer.gather_nodes(registry.clone()).await;
        assert!(registry.is_empty().await);
    }
}
