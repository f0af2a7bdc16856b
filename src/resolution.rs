//! Asset resolution: turns a Raw instruction's description into asset
//! references so it can be dispatched.

use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::error::AppError;
use crate::instruction::{Instruction, InstructionState};

/// Looks up asset references for a free-text description.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, desc: &str) -> Result<Vec<String>, AppError>;
}

/// Advance `instruction` to Resolved. Already-resolved instructions pass
/// through; Raw ones get their assets looked up; anything else fails.
pub async fn resolve_instruction(
    resolver: &dyn Resolver,
    instruction: &mut Instruction,
) -> Result<(), AppError> {
    match instruction.state {
        InstructionState::Resolved => Ok(()),
        InstructionState::Raw => {
            let assets = resolver.resolve(&instruction.desc).await?;
            instruction.assets = assets;
            instruction.state = InstructionState::Resolved;
            Ok(())
        }
        state => Err(AppError::Execution {
            message: format!(
                "Cannot resolve '{}' in state {state:?}",
                instruction.action
            ),
        }),
    }
}

// ── HTTP asset search ────────────────────────────────────────────

/// Queries the asset library search service:
/// `GET {base}/search?q=<desc>&type=`. Each query is bounded by `timeout`.
pub struct AssetSearchResolver {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl AssetSearchResolver {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl Resolver for AssetSearchResolver {
    async fn resolve(&self, desc: &str) -> Result<Vec<String>, AppError> {
        let query = if desc.trim().is_empty() {
            "default"
        } else {
            desc.trim()
        };
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query), ("type", "")])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::Api {
                message: format!("Asset search failed: {e}"),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::Api {
                message: format!("Asset search error {status}"),
            });
        }

        let body = response.text().await.map_err(|e| AppError::Api {
            message: format!("Asset search failed: {e}"),
        })?;
        let assets = parse_asset_list(&body);
        if assets.is_empty() {
            return Err(AppError::NotFound {
                what: format!("Assets for '{query}'"),
            });
        }
        tracing::debug!(query, count = assets.len(), "resolved assets");
        Ok(assets)
    }
}

/// Split a search reply such as `['a/b.prefab', 'c/d.prefab']` into paths.
pub fn parse_asset_list(body: &str) -> Vec<String> {
    body.split(", ")
        .flat_map(|part| part.split("',"))
        .map(|part| part.trim().trim_matches(['[', ']', '\'', '"']).trim())
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

// ── Fixed table ──────────────────────────────────────────────────

/// Resolves from a fixed description table (case-insensitive) with an
/// optional fallback list. Backs the in-process demo.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    table: IndexMap<String, Vec<String>>,
    fallback: Vec<String>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, desc: &str, assets: &[&str]) -> Self {
        self.table.insert(
            desc.trim().to_ascii_lowercase(),
            assets.iter().map(|a| (*a).to_string()).collect(),
        );
        self
    }

    pub fn with_fallback(mut self, assets: &[&str]) -> Self {
        self.fallback = assets.iter().map(|a| (*a).to_string()).collect();
        self
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, desc: &str) -> Result<Vec<String>, AppError> {
        let assets = self
            .table
            .get(&desc.trim().to_ascii_lowercase())
            .unwrap_or(&self.fallback);
        if assets.is_empty() {
            return Err(AppError::NotFound {
                what: format!("Assets for '{desc}'"),
            });
        }
        Ok(assets.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn search_reply_splits_into_paths() {
        assert_eq!(
            parse_asset_list("['Props/Crate.prefab', 'Props/Barrel.prefab']"),
            vec!["Props/Crate.prefab", "Props/Barrel.prefab"]
        );
        assert_eq!(parse_asset_list("a.prefab',b.prefab"), vec!["a.prefab", "b.prefab"]);
        assert!(parse_asset_list("[]").is_empty());
    }

    #[tokio::test]
    async fn raw_instruction_becomes_resolved() {
        let resolver = StaticResolver::new().with_entry("Cube", &["Primitives/Cube.prefab"]);
        let mut ins = Instruction::new("create_object", InstructionState::Raw).with_desc("cube");
        resolve_instruction(&resolver, &mut ins).await.unwrap();
        assert_eq!(ins.state, InstructionState::Resolved);
        assert_eq!(ins.assets, vec!["Primitives/Cube.prefab"]);

        let mut missing = Instruction::new("create_object", InstructionState::Raw).with_desc("dragon");
        assert!(resolve_instruction(&resolver, &mut missing).await.is_err());
        assert_eq!(missing.state, InstructionState::Raw);

        let mut init = Instruction::new("create_object", InstructionState::Init);
        assert!(resolve_instruction(&resolver, &mut init).await.is_err());
    }

    #[tokio::test]
    async fn http_resolver_queries_search_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 2048];
            let n = socket.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            let body = "['Props/Crate.prefab', 'Props/Box.prefab']";
            let reply = format!(
                "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            request
        });

        let resolver =
            AssetSearchResolver::new(&format!("http://{addr}/"), Duration::from_secs(10));
        let assets = resolver.resolve("wooden crate").await.unwrap();
        assert_eq!(assets, vec!["Props/Crate.prefab", "Props/Box.prefab"]);

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /search?q=wooden+crate&type= HTTP/1.1"));
    }

    #[tokio::test]
    async fn http_resolver_gives_up_after_its_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let resolver =
            AssetSearchResolver::new(&format!("http://{addr}"), Duration::from_millis(200));
        let started = std::time::Instant::now();
        let err = resolver.resolve("crate").await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(err, AppError::Api { .. }));
        server.abort();
    }
}
