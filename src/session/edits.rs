//! Edit buffer and the mutations that write through an adapter.

use super::*;

impl SessionController {
    /// Opens an edit for `key`, loading its value independently of any preview.
    pub async fn begin_edit(&self, key: &str) -> SessionResult<Option<EditState>> {
        let (ticket, value) = self.load_value(key, Slot::Edit).await?;

        let mut st = self.state.lock().await;
        if !st.is_current(&ticket) {
            debug!(key = %key, "discarding stale edit load");
            return Ok(None);
        }
        let edit = EditState::new(key.to_string(), value);
        st.selection.edit = Some(edit.clone());
        Ok(Some(edit))
    }

    /// Replaces the text of the open edit.
    pub async fn update_edit(&self, text: impl Into<String>) -> SessionResult<()> {
        let mut st = self.state.lock().await;
        let edit = st
            .selection
            .edit
            .as_mut()
            .ok_or(SessionError::NoEditInProgress)?;
        edit.text = text.into();
        Ok(())
    }

    pub async fn cancel_edit(&self) {
        self.state.lock().await.selection.edit = None;
    }

    /// Writes the open edit through the adapter owning the active namespace.
    ///
    /// Local writes reload the whole folder. Remote writes are not re-fetched;
    /// a preview of the same key takes the saved value directly.
    pub async fn save_edit(&self) -> SessionResult<()> {
        let (edit, namespace_id, target) = {
            let st = self.state.lock().await;
            let edit = st
                .selection
                .edit
                .clone()
                .ok_or(SessionError::NoEditInProgress)?;
            let ns = st.active_namespace()?;
            let target = st.target(ns)?;
            (edit, ns.id.clone(), target)
        };
        let value = edit
            .parse()
            .map_err(|err| SessionError::InvalidEdit(err.to_string()))?;

        match target {
            Target::Local { folder_id } => {
                {
                    let _loading = self.begin_loading();
                    self.local
                        .update_value(&folder_id, &namespace_id, &edit.key, &value)
                        .await?;
                }
                self.reload_folder(&folder_id).await?;
            }
            Target::Remote { account_id } => {
                {
                    let _loading = self.begin_loading();
                    self.remote
                        .update_value(&account_id, &namespace_id, &edit.key, &value)
                        .await?;
                }
                let mut st = self.state.lock().await;
                if st.active.as_deref() == Some(namespace_id.as_str())
                    && let Some(preview) = st.selection.preview.as_mut()
                    && preview.key == edit.key
                {
                    preview.value = value;
                }
            }
        }

        let mut st = self.state.lock().await;
        if st.active.as_deref() == Some(namespace_id.as_str())
            && st.selection.edit.as_ref().map(|e| e.key.as_str()) == Some(edit.key.as_str())
        {
            st.selection.edit = None;
        }
        info!(namespace = %namespace_id, key = %edit.key, "saved value");
        Ok(())
    }

    /// Deletes the named keys from the active namespace in one batch.
    ///
    /// Names not present in the materialized entries are dropped; when none
    /// remain, nothing is sent. Returns how many keys were deleted.
    pub async fn delete_keys(&self, keys: &[String]) -> SessionResult<usize> {
        let (names, namespace_id, target) = {
            let st = self.state.lock().await;
            if keys.is_empty() || st.active.is_none() {
                return Ok(0);
            }
            let mut names: Vec<String> = Vec::new();
            for key in keys {
                if st.entries.iter().any(|e| &e.key == key) && !names.contains(key) {
                    names.push(key.clone());
                }
            }
            if names.is_empty() {
                return Ok(0);
            }
            let ns = st.active_namespace()?;
            let target = st.target(ns)?;
            (names, ns.id.clone(), target)
        };

        match target {
            Target::Local { folder_id } => {
                {
                    let _loading = self.begin_loading();
                    self.local
                        .delete_keys(&folder_id, &namespace_id, &names)
                        .await?;
                }
                self.reset_selection_for(&namespace_id).await;
                self.reload_folder(&folder_id).await?;
            }
            Target::Remote { account_id } => {
                {
                    let _loading = self.begin_loading();
                    self.remote
                        .delete_keys(&account_id, &namespace_id, &names)
                        .await?;
                }
                self.reset_selection_for(&namespace_id).await;
                self.relist_remote_keys(&account_id, &namespace_id).await?;
            }
        }

        info!(namespace = %namespace_id, keys = names.len(), "deleted keys");
        Ok(names.len())
    }

    async fn reset_selection_for(&self, namespace_id: &str) {
        let mut st = self.state.lock().await;
        if st.active.as_deref() == Some(namespace_id) {
            st.selection.reset();
            st.issued.remove(&Slot::Preview);
            st.issued.remove(&Slot::Edit);
        }
    }

    async fn relist_remote_keys(&self, account_id: &str, namespace_id: &str) -> SessionResult<()> {
        let ticket = {
            let mut st = self.state.lock().await;
            if st.active.as_deref() != Some(namespace_id) {
                return Ok(());
            }
            st.issue(Slot::Entries, Some(namespace_id.to_string()))
        };

        let entries = {
            let _loading = self.begin_loading();
            self.remote.list_keys(account_id, namespace_id).await?
        };

        let mut st = self.state.lock().await;
        if st.is_current(&ticket) {
            st.entries = entries;
        }
        Ok(())
    }

    /// Deletes every checked key of the active namespace.
    pub async fn delete_checked(&self) -> SessionResult<usize> {
        let checked: Vec<String> = {
            let st = self.state.lock().await;
            st.selection.checked.iter().cloned().collect()
        };
        self.delete_keys(&checked).await
    }
}
