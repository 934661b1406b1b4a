//! Remote adapter over the Cloudflare Workers KV REST API.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use crate::model::{Entry, Namespace, Value};
use crate::source::RemoteSource;

mod http_client;
mod keys;
mod namespaces;
mod types;

pub use self::types::*;

pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

struct Credential {
    account_id: String,
    token: String,
}

pub struct RemoteClient {
    base_url: String,
    client: reqwest::Client,
    connection: RwLock<Option<Credential>>,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("kvx/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build reqwest client")?;
        Ok(Self {
            base_url: base_url.into(),
            client,
            connection: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn account_id(&self) -> Option<String> {
        self.connection
            .read()
            .await
            .as_ref()
            .map(|c| c.account_id.clone())
    }

    /// Token for `account_id`, which must be the connected account.
    async fn token_for(&self, account_id: &str) -> Result<String> {
        let conn = self.connection.read().await;
        conn.as_ref()
            .filter(|c| c.account_id == account_id)
            .map(|c| c.token.clone())
            .ok_or_else(|| anyhow!("no connection for account {}", account_id))
    }
}

#[async_trait]
impl RemoteSource for RemoteClient {
    async fn connect(&self, account_id: &str, api_token: &str) -> Result<()> {
        self.list_namespace_page(account_id, api_token)
            .await
            .context("validate credentials")?;
        *self.connection.write().await = Some(Credential {
            account_id: account_id.to_string(),
            token: api_token.to_string(),
        });
        info!(account = %account_id, "remote credentials accepted");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connection.write().await.take();
        Ok(())
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let (account_id, token) = {
            let conn = self.connection.read().await;
            match conn.as_ref() {
                Some(c) => (c.account_id.clone(), c.token.clone()),
                None => return Ok(Vec::new()),
            }
        };
        self.namespaces_with_counts(&account_id, &token).await
    }

    async fn list_keys(&self, account_id: &str, namespace_id: &str) -> Result<Vec<Entry>> {
        let token = self.token_for(account_id).await?;
        self.fetch_keys(account_id, &token, namespace_id).await
    }

    async fn get_value(&self, account_id: &str, namespace_id: &str, key: &str) -> Result<Value> {
        let token = self.token_for(account_id).await?;
        self.fetch_value(account_id, &token, namespace_id, key)
            .await
    }

    async fn update_value(
        &self,
        account_id: &str,
        namespace_id: &str,
        key: &str,
        value: &Value,
    ) -> Result<()> {
        let token = self.token_for(account_id).await?;
        self.put_value(account_id, &token, namespace_id, key, value)
            .await
    }

    async fn delete_keys(
        &self,
        account_id: &str,
        namespace_id: &str,
        keys: &[String],
    ) -> Result<()> {
        let token = self.token_for(account_id).await?;
        self.remove_keys(account_id, &token, namespace_id, keys)
            .await
    }
}
