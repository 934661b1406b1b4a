use serde::de::DeserializeOwned;

use super::types::{ErrorBody, summarize_errors};
use super::*;

impl RemoteClient {
    /// `{base}/accounts/{account}/storage/...`, each segment percent-encoded.
    pub(super) fn url(&self, account_id: &str, segments: &[&str]) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .with_context(|| format!("parse API base url {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("API base url cannot have a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(["accounts", account_id, "storage"])
            .extend(segments);
        Ok(url)
    }

    pub(super) fn auth(token: &str) -> String {
        format!("Bearer {}", token)
    }

    pub(super) async fn ensure_ok(
        &self,
        resp: reqwest::Response,
        label: &str,
    ) -> Result<reqwest::Response> {
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            anyhow::bail!("{}: unauthorized (API token invalid or expired)", label);
        }
        if status == reqwest::StatusCode::FORBIDDEN {
            anyhow::bail!("{}: forbidden (API token lacks Workers KV permissions)", label);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .filter(|b| !b.errors.is_empty())
                .map(|b| summarize_errors(&b.errors));
            match detail {
                Some(detail) => anyhow::bail!("{} failed with status {}: {}", label, status, detail),
                None => anyhow::bail!("{} failed with status {}", label, status),
            }
        }
        Ok(resp)
    }

    /// Sends a GET and unwraps the API envelope.
    pub(super) async fn get_envelope<T: DeserializeOwned>(
        &self,
        url: reqwest::Url,
        token: &str,
        label: &str,
    ) -> Result<ApiEnvelope<T>> {
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, Self::auth(token))
            .send()
            .await
            .with_context(|| format!("{} request", label))?;
        let envelope: ApiEnvelope<T> = self
            .ensure_ok(resp, label)
            .await?
            .json()
            .await
            .with_context(|| format!("parse {} response", label))?;
        if !envelope.success {
            anyhow::bail!("{} failed: {}", label, envelope.error_summary());
        }
        Ok(envelope)
    }
}
