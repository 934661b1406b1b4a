use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use kvx::config::ExplorerConfig;
use kvx::local::LocalStore;
use kvx::model::{EntrySort, Namespace, SortDirection, SourceKind, Value, format_expiration};
use kvx::remote::RemoteClient;
use kvx::source::{LocalSource, PresetFolder};
use kvx::{SessionController, SessionError, SourceOutcome, SourceRequest};

use crate::{Action, Cli, Commands, FolderCommands};

#[derive(Serialize)]
struct NamespaceRow {
    id: String,
    name: String,
    count: Option<usize>,
    source: SourceKind,
}

impl From<&Namespace> for NamespaceRow {
    fn from(ns: &Namespace) -> Self {
        Self {
            id: ns.id.clone(),
            name: ns.name.clone(),
            count: ns.count,
            source: ns.kind(),
        }
    }
}

#[derive(Serialize)]
struct FolderRow {
    id: String,
    name: String,
    path: PathBuf,
    namespaces: usize,
}

#[derive(Serialize)]
struct KeyRow {
    key: String,
    expiration: Option<i64>,
}

pub(crate) async fn handle_command(cli: Cli) -> Result<()> {
    let cfg = ExplorerConfig::load(cli.config.as_deref())?;
    let json = cli.json;

    match cli.command {
        Commands::Folders { command } => handle_folders_command(&cfg, command, json).await,
        Commands::Local { path, action } => {
            let session = open_session(&cfg, Arc::new(LocalStore::in_memory()), Some(path))?;
            if let SourceOutcome::Cancelled = session.select_source(SourceRequest::Local).await? {
                anyhow::bail!("no folder selected");
            }
            handle_action(&session, action, json).await
        }
        Commands::Remote {
            account,
            token,
            action,
        } => {
            let session = open_session(&cfg, Arc::new(LocalStore::in_memory()), None)?;
            session
                .select_source(SourceRequest::Remote {
                    account_id: account,
                    api_token: token,
                })
                .await?;
            handle_action(&session, action, json).await
        }
    }
}

fn open_session(
    cfg: &ExplorerConfig,
    local: Arc<LocalStore>,
    folder: Option<PathBuf>,
) -> Result<SessionController> {
    let remote = RemoteClient::new(cfg.api_base_url.clone())?;
    Ok(SessionController::new(
        local,
        Arc::new(remote),
        Arc::new(PresetFolder(folder)),
    ))
}

fn open_catalog(cfg: &ExplorerConfig) -> Result<Arc<LocalStore>> {
    let path = cfg
        .catalog_path
        .as_deref()
        .context("no folder catalog configured (set catalog_path in the config file)")?;
    Ok(Arc::new(LocalStore::open(path)?))
}

async fn handle_folders_command(
    cfg: &ExplorerConfig,
    command: FolderCommands,
    json: bool,
) -> Result<()> {
    let store = open_catalog(cfg)?;

    match command {
        FolderCommands::List => {
            let session = open_session(cfg, store, None)?;
            session.load_known_folders().await?;
            let snapshot = session.snapshot().await;
            let rows: Vec<FolderRow> = snapshot
                .folders
                .iter()
                .map(|folder| FolderRow {
                    id: folder.id.clone(),
                    name: folder.name.clone(),
                    path: folder.path.clone(),
                    namespaces: snapshot
                        .namespaces
                        .iter()
                        .filter(|ns| ns.provenance.folder_id() == Some(folder.id.as_str()))
                        .count(),
                })
                .collect();
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&rows).context("serialize folders json")?
                );
            } else if rows.is_empty() {
                println!("No folders");
            } else {
                for row in rows {
                    println!(
                        "{} {} ({} namespaces) {}",
                        row.id,
                        row.name,
                        row.namespaces,
                        row.path.display()
                    );
                }
            }
        }
        FolderCommands::Add { path } => {
            let session = open_session(cfg, store, Some(path))?;
            let outcome = session.select_source(SourceRequest::Local).await?;
            let snapshot = session.snapshot().await;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&snapshot.folders)
                        .context("serialize folder json")?
                );
            } else if let (SourceOutcome::Loaded { namespaces }, Some(folder)) =
                (outcome, snapshot.folders.first())
            {
                println!(
                    "Added {} {} ({} namespaces)",
                    folder.id, folder.name, namespaces
                );
            }
        }
        FolderCommands::Remove { folder_id } => {
            let session = open_session(cfg, store.clone(), None)?;
            session.load_known_folders().await?;
            match session.remove_local_folder(&folder_id).await {
                Ok(()) => {}
                // Folders whose project vanished never load; forget them directly.
                Err(SessionError::UnknownFolder(_)) => store.remove_folder(&folder_id).await?,
                Err(err) => return Err(err.into()),
            }
            println!("Removed {}", folder_id);
        }
    }

    Ok(())
}

async fn handle_action(session: &SessionController, action: Action, json: bool) -> Result<()> {
    match action {
        Action::Namespaces => {
            let namespaces = session.namespaces().await;
            let rows: Vec<NamespaceRow> = namespaces.iter().map(NamespaceRow::from).collect();
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&rows).context("serialize namespaces json")?
                );
            } else if rows.is_empty() {
                println!("No namespaces");
            } else {
                for row in rows {
                    let count = row
                        .count
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "?".to_string());
                    println!("{} {} ({} keys)", row.id, row.name, count);
                }
            }
        }
        Action::Keys {
            namespace,
            sort,
            desc,
        } => {
            session.select_namespace(&namespace).await?;
            let mut entries = session.entries().await;
            let direction = if desc {
                SortDirection::Desc
            } else {
                SortDirection::Asc
            };
            EntrySort::new(sort.into(), direction).apply(&mut entries);

            if json {
                let rows: Vec<KeyRow> = entries
                    .into_iter()
                    .map(|e| KeyRow {
                        key: e.key,
                        expiration: e.expiration,
                    })
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&rows).context("serialize keys json")?
                );
            } else if entries.is_empty() {
                println!("No keys");
            } else {
                for entry in entries {
                    println!("{}\t{}", entry.key, format_expiration(entry.expiration));
                }
            }
        }
        Action::Get { namespace, key } => {
            session.select_namespace(&namespace).await?;
            let value = session
                .view_key(&key)
                .await?
                .context("value request was superseded")?;
            match value {
                Value::String(s) if !json => println!("{}", s),
                other => println!(
                    "{}",
                    serde_json::to_string_pretty(&other).context("serialize value json")?
                ),
            }
        }
        Action::Put {
            namespace,
            key,
            value,
        } => {
            session.select_namespace(&namespace).await?;
            session
                .begin_edit(&key)
                .await?
                .context("edit request was superseded")?;
            session.update_edit(value).await?;
            session.save_edit().await?;
            println!("Updated {}", key);
        }
        Action::Delete { namespace, keys } => {
            session.select_namespace(&namespace).await?;
            let deleted = session.delete_keys(&keys).await?;
            if deleted == 0 {
                anyhow::bail!("none of the given keys exist in {}", namespace);
            }
            println!("Deleted {} keys", deleted);
        }
    }

    Ok(())
}
