use super::*;

impl SessionController {
    /// Makes `namespace_id` active. Local entries are already materialized;
    /// remote ones are listed, and the listing is dropped if another
    /// namespace was selected before it resolved.
    pub async fn select_namespace(&self, namespace_id: &str) -> SessionResult<()> {
        let (ticket, account_id, previous) = {
            let mut st = self.state.lock().await;
            let ns = st
                .registry
                .get(namespace_id)
                .cloned()
                .ok_or_else(|| SessionError::NamespaceNotFound(namespace_id.to_string()))?;
            let target = st.target(&ns)?;

            let previous = (st.active.clone(), st.entries.clone(), st.selection.clone());
            st.activate(ns.id.clone());
            match target {
                Target::Local { .. } => {
                    st.entries = ns.entries;
                    return Ok(());
                }
                Target::Remote { account_id } => {
                    let ticket = st.issue(Slot::Entries, Some(ns.id));
                    (ticket, account_id, previous)
                }
            }
        };

        let result = {
            let _loading = self.begin_loading();
            self.remote.list_keys(&account_id, namespace_id).await
        };

        let mut st = self.state.lock().await;
        if !st.is_current(&ticket) {
            debug!(namespace = %namespace_id, generation = ticket.generation, "discarding stale key listing");
            return Ok(());
        }
        match result {
            Ok(entries) => {
                debug!(namespace = %namespace_id, keys = entries.len(), "listed remote keys");
                st.entries = entries;
                Ok(())
            }
            Err(err) => {
                let (active, entries, selection) = previous;
                st.active = active;
                st.entries = entries;
                st.selection = selection;
                st.forget_namespace_requests();
                st.sync_active();
                Err(err.into())
            }
        }
    }

    /// Loads the value under `key` into the preview. Returns `None` when the
    /// response arrived after the user moved on.
    pub async fn view_key(&self, key: &str) -> SessionResult<Option<Value>> {
        let (ticket, value) = self.load_value(key, Slot::Preview).await?;

        let mut st = self.state.lock().await;
        if !st.is_current(&ticket) {
            debug!(key = %key, "discarding stale value preview");
            return Ok(None);
        }
        st.selection.preview = Some(Preview {
            key: key.to_string(),
            value: value.clone(),
        });
        Ok(Some(value))
    }

    /// Resolves a key's current value: inline for local entries, fetched by
    /// key name for remote ones.
    pub(super) async fn load_value(
        &self,
        key: &str,
        slot: Slot,
    ) -> SessionResult<(Ticket, Value)> {
        let (ticket, namespace_id, account_id) = {
            let mut st = self.state.lock().await;
            let ns = st.active_namespace()?;
            let namespace_id = ns.id.clone();
            let target = st.target(ns)?;
            let entry = st
                .entries
                .iter()
                .find(|e| e.key == key)
                .cloned()
                .ok_or_else(|| SessionError::KeyNotFound(key.to_string()))?;

            let ticket = st.issue(slot, Some(namespace_id.clone()));
            match target {
                Target::Local { .. } => {
                    return Ok((ticket, entry.value.unwrap_or(Value::Null)));
                }
                Target::Remote { account_id } => (ticket, namespace_id, account_id),
            }
        };

        let _loading = self.begin_loading();
        let value = self
            .remote
            .get_value(&account_id, &namespace_id, key)
            .await?;
        Ok((ticket, value))
    }
}
