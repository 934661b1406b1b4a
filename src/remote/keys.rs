//! Key listing and value reads/writes.

use super::*;
use crate::model::encode_value;

impl RemoteClient {
    pub(super) async fn fetch_keys(
        &self,
        account_id: &str,
        token: &str,
        namespace_id: &str,
    ) -> Result<Vec<Entry>> {
        let url = self.url(account_id, &["kv", "namespaces", namespace_id, "keys"])?;
        let envelope: ApiEnvelope<Vec<ApiKey>> =
            self.get_envelope(url, token, "list keys").await?;
        Ok(envelope
            .result
            .unwrap_or_default()
            .into_iter()
            .map(|key| Entry {
                key: key.name,
                value: None,
                expiration: key.expiration,
                metadata: key.metadata.map(|m| m.to_string()),
            })
            .collect())
    }

    /// Raw value bytes; JSON when they parse, a string otherwise.
    pub(super) async fn fetch_value(
        &self,
        account_id: &str,
        token: &str,
        namespace_id: &str,
        key: &str,
    ) -> Result<Value> {
        let url = self.url(account_id, &["kv", "namespaces", namespace_id, "values", key])?;
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, Self::auth(token))
            .send()
            .await
            .context("get value request")?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            anyhow::bail!("Key not found: {}", key);
        }
        let text = self
            .ensure_ok(resp, "get value")
            .await?
            .text()
            .await
            .context("read value body")?;
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    pub(super) async fn put_value(
        &self,
        account_id: &str,
        token: &str,
        namespace_id: &str,
        key: &str,
        value: &Value,
    ) -> Result<()> {
        let url = self.url(account_id, &["kv", "namespaces", namespace_id, "values", key])?;
        let content_type = if value.is_string() {
            "text/plain"
        } else {
            "application/json"
        };
        let resp = self
            .client
            .put(url)
            .header(reqwest::header::AUTHORIZATION, Self::auth(token))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(encode_value(value).context("serialize value")?)
            .send()
            .await
            .context("put value request")?;
        self.ensure_ok(resp, "update value").await?;
        Ok(())
    }

    /// One key is deleted directly; several go through the bulk endpoint.
    pub(super) async fn remove_keys(
        &self,
        account_id: &str,
        token: &str,
        namespace_id: &str,
        keys: &[String],
    ) -> Result<()> {
        let request = match keys {
            [] => return Ok(()),
            [key] => {
                let url = self.url(
                    account_id,
                    &["kv", "namespaces", namespace_id, "values", key.as_str()],
                )?;
                self.client.delete(url)
            }
            _ => {
                let url = self.url(
                    account_id,
                    &["kv", "namespaces", namespace_id, "bulk", "delete"],
                )?;
                self.client.post(url).json(keys)
            }
        };
        let resp = request
            .header(reqwest::header::AUTHORIZATION, Self::auth(token))
            .send()
            .await
            .context("delete keys request")?;
        self.ensure_ok(resp, "delete keys").await?;
        Ok(())
    }
}
