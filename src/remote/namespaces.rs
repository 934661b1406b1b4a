//! Namespace listing and key counts.

use std::collections::HashMap;

use tracing::warn;

use super::*;
use crate::model::Provenance;

impl RemoteClient {
    pub(super) async fn list_namespace_page(
        &self,
        account_id: &str,
        token: &str,
    ) -> Result<Vec<ApiNamespace>> {
        let mut url = self.url(account_id, &["kv", "namespaces"])?;
        url.query_pairs_mut().append_pair("per_page", "100");
        let envelope: ApiEnvelope<Vec<ApiNamespace>> =
            self.get_envelope(url, token, "list namespaces").await?;
        Ok(envelope.result.unwrap_or_default())
    }

    pub(super) async fn namespaces_with_counts(
        &self,
        account_id: &str,
        token: &str,
    ) -> Result<Vec<Namespace>> {
        let listed = self.list_namespace_page(account_id, token).await?;

        let mut counts = match self.analytics_counts(account_id, token).await {
            Ok(counts) => counts,
            Err(err) => {
                warn!(account = %account_id, "stored-keys analytics unavailable: {:#}", err);
                HashMap::new()
            }
        };
        if counts.is_empty() {
            for ns in &listed {
                match self.key_total(account_id, token, &ns.id).await {
                    Ok(Some(total)) => {
                        counts.insert(ns.id.clone(), total);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(namespace = %ns.id, "key count unavailable: {:#}", err);
                    }
                }
            }
        }

        Ok(listed
            .into_iter()
            .map(|ns| Namespace {
                count: counts.get(&ns.id).copied(),
                provenance: Provenance::remote(account_id),
                id: ns.id,
                name: ns.title,
                entries: Vec::new(),
            })
            .collect())
    }

    /// Stored-key counts per namespace from the storage analytics endpoint.
    async fn analytics_counts(
        &self,
        account_id: &str,
        token: &str,
    ) -> Result<HashMap<String, usize>> {
        let mut url = self.url(account_id, &["analytics", "stored"])?;
        url.query_pairs_mut()
            .append_pair("dimensions", "namespaceId")
            .append_pair("metrics", "storedKeys");
        let envelope: ApiEnvelope<Value> =
            self.get_envelope(url, token, "stored-keys analytics").await?;
        Ok(parse_analytics_counts(
            envelope.result.as_ref().unwrap_or(&Value::Null),
        ))
    }

    async fn key_total(
        &self,
        account_id: &str,
        token: &str,
        namespace_id: &str,
    ) -> Result<Option<usize>> {
        let mut url = self.url(account_id, &["kv", "namespaces", namespace_id, "keys"])?;
        url.query_pairs_mut().append_pair("limit", "10");
        let envelope: ApiEnvelope<Value> = self.get_envelope(url, token, "count keys").await?;
        Ok(envelope
            .result_info
            .and_then(|info| info.total_count)
            .map(|n| n as usize))
    }
}

/// Reads `{data: [{dimensions: [id], metrics: [[n]]}]}`.
fn parse_analytics_counts(result: &Value) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    let Some(rows) = result.get("data").and_then(|d| d.as_array()) else {
        return counts;
    };
    for row in rows {
        let id = row
            .get("dimensions")
            .and_then(|d| d.get(0))
            .and_then(|d| d.as_str());
        let stored = row
            .get("metrics")
            .and_then(|m| m.get(0))
            .and_then(|m| m.get(0))
            .and_then(|n| n.as_u64());
        if let (Some(id), Some(stored)) = (id, stored) {
            counts.insert(id.to_string(), stored as usize);
        }
    }
    counts
}
