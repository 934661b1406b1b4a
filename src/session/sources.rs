//! Connecting, reloading and dropping sources.

use super::*;

impl SessionController {
    pub async fn select_source(&self, request: SourceRequest) -> SessionResult<SourceOutcome> {
        match request {
            SourceRequest::Local => self.select_local_folder().await,
            SourceRequest::Remote {
                account_id,
                api_token,
            } => self.connect_remote(&account_id, &api_token).await,
        }
    }

    async fn select_local_folder(&self) -> SessionResult<SourceOutcome> {
        let _loading = self.begin_loading();

        let Some(path) = self.picker.choose_folder().await? else {
            debug!("folder selection cancelled");
            return Ok(SourceOutcome::Cancelled);
        };

        let loaded = self.local.add_folder(&path).await?;
        let folder_id = loaded.folder.id.clone();
        let first = loaded.namespaces.first().map(|ns| ns.id.clone());
        let count = loaded.namespaces.len();

        let mut st = self.state.lock().await;
        if let Err(err) = st
            .registry
            .merge(&MergeScope::Folder(folder_id.clone()), loaded.namespaces)
        {
            let known = st.knows_folder(&folder_id);
            drop(st);
            // A newly picked folder that cannot be merged is not remembered.
            if !known
                && let Err(remove_err) = self.local.remove_folder(&folder_id).await
            {
                warn!(folder = %folder_id, "forget folder after failed merge: {:#}", remove_err);
            }
            return Err(err.into());
        }
        st.issue(Slot::Folder(folder_id.clone()), None);
        st.upsert_folder(loaded.folder);
        match first {
            Some(id) => {
                st.activate(id);
                st.sync_active();
            }
            None => st.sync_active(),
        }

        info!(folder = %folder_id, path = %path.display(), namespaces = count, "loaded local folder");
        Ok(SourceOutcome::Loaded { namespaces: count })
    }

    async fn connect_remote(
        &self,
        account_id: &str,
        api_token: &str,
    ) -> SessionResult<SourceOutcome> {
        let reconnect = {
            let st = self.state.lock().await;
            if let Some(current) = &st.remote_account
                && current != account_id
            {
                return Err(SessionError::RemoteAlreadyConnected(current.clone()));
            }
            st.remote_account.is_some()
        };

        {
            let _loading = self.begin_loading();
            self.remote.connect(account_id, api_token).await?;
        }
        self.state.lock().await.remote_account = Some(account_id.to_string());
        info!(account = %account_id, "connected remote account");

        let loaded = async {
            let ids = self.reload_remote().await?;
            if let Some(first) = ids.first() {
                self.select_namespace(first).await?;
            }
            Ok::<_, SessionError>(ids.len())
        }
        .await;

        match loaded {
            Ok(namespaces) => Ok(SourceOutcome::Loaded { namespaces }),
            Err(err) => {
                if !reconnect {
                    self.abandon_remote().await;
                }
                Err(err)
            }
        }
    }

    /// Drops a fresh connection whose namespaces could not be loaded.
    async fn abandon_remote(&self) {
        {
            let mut st = self.state.lock().await;
            st.registry.remove(&MergeScope::Remote);
            st.remote_account = None;
            st.issued.remove(&Slot::RemoteNamespaces);
            st.sync_active();
        }
        if let Err(err) = self.remote.disconnect().await {
            warn!("disconnect after failed load: {:#}", err);
        }
    }

    /// Re-lists every remote namespace, returning their ids in listing order.
    pub async fn reload_remote(&self) -> SessionResult<Vec<String>> {
        let ticket = {
            let mut st = self.state.lock().await;
            if st.remote_account.is_none() {
                return Err(SessionError::NoRemoteConnection);
            }
            st.issue(Slot::RemoteNamespaces, None)
        };

        let namespaces = {
            let _loading = self.begin_loading();
            self.remote.list_namespaces().await?
        };

        let mut st = self.state.lock().await;
        if !st.is_current(&ticket) || st.remote_account.is_none() {
            debug!("discarding stale remote namespace listing");
            return Ok(Vec::new());
        }
        let ids: Vec<String> = namespaces.iter().map(|ns| ns.id.clone()).collect();
        st.registry.merge(&MergeScope::Remote, namespaces)?;
        st.sync_active();
        Ok(ids)
    }

    /// Loads every folder the local adapter already tracks. Folders that
    /// cannot be read are skipped.
    pub async fn load_known_folders(&self) -> SessionResult<usize> {
        let folders = {
            let _loading = self.begin_loading();
            self.local.list_folders().await?
        };

        let mut loaded = 0;
        for folder in folders {
            let ticket = self
                .state
                .lock()
                .await
                .issue(Slot::Folder(folder.id.clone()), None);

            let result = {
                let _loading = self.begin_loading();
                self.local.load_namespaces(&folder.id).await
            };
            let namespaces = match result {
                Ok(namespaces) => namespaces,
                Err(err) => {
                    warn!(folder = %folder.id, path = %folder.path.display(), "skipping folder: {:#}", err);
                    continue;
                }
            };

            let mut st = self.state.lock().await;
            if !st.is_current(&ticket) {
                continue;
            }
            if let Err(err) = st
                .registry
                .merge(&MergeScope::Folder(folder.id.clone()), namespaces)
            {
                warn!(folder = %folder.id, "skipping folder: {}", err);
                continue;
            }
            st.upsert_folder(folder);
            st.sync_active();
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Re-reads one folder from disk, replacing only its namespaces.
    pub async fn reload_folder(&self, folder_id: &str) -> SessionResult<usize> {
        let ticket = {
            let mut st = self.state.lock().await;
            if !st.knows_folder(folder_id) {
                return Err(SessionError::UnknownFolder(folder_id.to_string()));
            }
            st.issue(Slot::Folder(folder_id.to_string()), None)
        };

        let namespaces = {
            let _loading = self.begin_loading();
            self.local.load_namespaces(folder_id).await?
        };

        let mut st = self.state.lock().await;
        if !st.is_current(&ticket) || !st.knows_folder(folder_id) {
            debug!(folder = %folder_id, "discarding stale folder listing");
            return Ok(0);
        }
        let count = namespaces.len();
        st.registry
            .merge(&MergeScope::Folder(folder_id.to_string()), namespaces)?;
        st.sync_active();
        Ok(count)
    }

    pub async fn disconnect_remote(&self) -> SessionResult<()> {
        if self.state.lock().await.remote_account.is_none() {
            return Ok(());
        }

        {
            let _loading = self.begin_loading();
            self.remote.disconnect().await?;
        }

        let mut st = self.state.lock().await;
        let removed = st.registry.remove(&MergeScope::Remote);
        st.remote_account = None;
        st.issued.remove(&Slot::RemoteNamespaces);
        st.sync_active();
        info!(namespaces = removed.len(), "disconnected remote account");
        Ok(())
    }

    pub async fn remove_local_folder(&self, folder_id: &str) -> SessionResult<()> {
        if !self.state.lock().await.knows_folder(folder_id) {
            return Err(SessionError::UnknownFolder(folder_id.to_string()));
        }

        {
            let _loading = self.begin_loading();
            self.local.remove_folder(folder_id).await?;
        }

        let mut st = self.state.lock().await;
        let removed = st
            .registry
            .remove(&MergeScope::Folder(folder_id.to_string()));
        st.folders.retain(|f| f.id != folder_id);
        st.issued.remove(&Slot::Folder(folder_id.to_string()));
        st.sync_active();
        info!(folder = %folder_id, namespaces = removed.len(), "removed local folder");
        Ok(())
    }
}
