#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use axum::Router;
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use rusqlite::Connection;
use serde_json::json;
use tokio::sync::oneshot;

use kvx::local::KvLayout;
use kvx::model::{Entry, LoadedFolder, LocalFolder, Namespace, Provenance, Value};
use kvx::source::{FolderPicker, LocalSource, RemoteSource};

// ---------------------------------------------------------------------------
// On-disk Miniflare fixture

/// A Wrangler project in a tempdir with Miniflare-shaped KV state.
pub struct KvFixture {
    pub dir: tempfile::TempDir,
}

impl KvFixture {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create fixture tempdir")?;
        fs::create_dir_all(KvLayout::kv_dir_for(dir.path())).context("create kv dir")?;
        Ok(Self { dir })
    }

    /// A project folder without any Wrangler state.
    pub fn bare() -> Result<Self> {
        let dir = tempfile::tempdir().context("create fixture tempdir")?;
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn kv_dir(&self) -> PathBuf {
        KvLayout::kv_dir_for(self.root())
    }

    pub fn namespace(&self, namespace_id: &str) -> Result<()> {
        fs::create_dir_all(self.kv_dir().join(namespace_id).join("blobs"))
            .with_context(|| format!("create namespace {}", namespace_id))
    }

    pub fn db_path(&self, namespace_id: &str) -> PathBuf {
        self.kv_dir()
            .join("miniflare-KVNamespaceObject")
            .join(format!("{}.sqlite", namespace_id))
    }

    pub fn blob_path(&self, namespace_id: &str, key: &str) -> PathBuf {
        self.kv_dir()
            .join(namespace_id)
            .join("blobs")
            .join(blob_id(namespace_id, key))
    }

    /// Writes `blob` under `key` the way Miniflare does: a row in the
    /// namespace database plus a blob file.
    pub fn put(
        &self,
        namespace_id: &str,
        key: &str,
        blob: &str,
        expiration_ms: Option<i64>,
    ) -> Result<()> {
        self.namespace(namespace_id)?;
        let db = self.db_path(namespace_id);
        fs::create_dir_all(db.parent().context("db parent")?).context("create db dir")?;

        let conn = Connection::open(&db).context("open fixture db")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _mf_entries (
                key TEXT PRIMARY KEY,
                blob_id TEXT NOT NULL,
                expiration INTEGER,
                metadata TEXT
            )",
            [],
        )
        .context("create _mf_entries")?;
        conn.execute(
            "INSERT OR REPLACE INTO _mf_entries (key, blob_id, expiration, metadata)
             VALUES (?1, ?2, ?3, NULL)",
            rusqlite::params![key, blob_id(namespace_id, key), expiration_ms],
        )
        .context("insert fixture row")?;

        fs::write(self.blob_path(namespace_id, key), blob).context("write fixture blob")?;
        Ok(())
    }

    pub fn row_count(&self, namespace_id: &str) -> Result<i64> {
        let conn = Connection::open(self.db_path(namespace_id)).context("open fixture db")?;
        conn.query_row("SELECT COUNT(*) FROM _mf_entries", [], |row| row.get(0))
            .context("count rows")
    }

    pub fn read_blob(&self, namespace_id: &str, key: &str) -> Result<String> {
        fs::read_to_string(self.blob_path(namespace_id, key)).context("read fixture blob")
    }
}

fn blob_id(namespace_id: &str, key: &str) -> String {
    let hex: String = key.bytes().map(|b| format!("{:02x}", b)).collect();
    format!("{}-{}", namespace_id, hex)
}

// ---------------------------------------------------------------------------
// Builders

pub fn local_ns(folder_id: &str, id: &str, entries: Vec<Entry>) -> Namespace {
    Namespace {
        id: id.to_string(),
        name: id.to_uppercase(),
        count: Some(entries.len()),
        provenance: Provenance::local(folder_id),
        entries,
    }
}

pub fn remote_ns(account_id: &str, id: &str, count: Option<usize>) -> Namespace {
    Namespace {
        id: id.to_string(),
        name: format!("{}-title", id),
        count,
        provenance: Provenance::remote(account_id),
        entries: Vec::new(),
    }
}

pub fn entry(key: &str, value: Value) -> Entry {
    Entry::new(key).with_value(value)
}

// ---------------------------------------------------------------------------
// Scripted adapters

/// Picker answering with queued choices; `None` entries and an empty queue
/// both mean the user cancelled.
#[derive(Default)]
pub struct QueuedPicker {
    choices: Mutex<VecDeque<Option<PathBuf>>>,
}

impl QueuedPicker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, choice: Option<&Path>) {
        self.choices
            .lock()
            .unwrap()
            .push_back(choice.map(Path::to_path_buf));
    }
}

#[async_trait]
impl FolderPicker for QueuedPicker {
    async fn choose_folder(&self) -> Result<Option<PathBuf>> {
        Ok(self.choices.lock().unwrap().pop_front().flatten())
    }
}

/// Response held by a scripted adapter until the test releases it.
pub struct Hold {
    pub started: oneshot::Receiver<()>,
    pub release: oneshot::Sender<()>,
}

struct Gate {
    started: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

#[derive(Default)]
struct Gates {
    gates: Mutex<HashMap<String, Gate>>,
    failures: Mutex<HashSet<String>>,
}

impl Gates {
    fn hold(&self, op: String) -> Hold {
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(
            op,
            Gate {
                started: started_tx,
                release: release_rx,
            },
        );
        Hold {
            started: started_rx,
            release: release_tx,
        }
    }

    async fn pass(&self, op: &str) -> Result<()> {
        let gate = self.gates.lock().unwrap().remove(op);
        if let Some(gate) = gate {
            let _ = gate.started.send(());
            let _ = gate.release.await;
        }
        if self.failures.lock().unwrap().remove(op) {
            return Err(anyhow!("scripted failure: {}", op));
        }
        Ok(())
    }
}

/// In-memory local adapter. Folders are scripted by path up front.
#[derive(Default)]
pub struct FakeLocal {
    available: Mutex<HashMap<PathBuf, LoadedFolder>>,
    registered: Mutex<Vec<LocalFolder>>,
    calls: Mutex<Vec<String>>,
    gates: Gates,
}

impl FakeLocal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes `path` loadable as folder `folder_id` with `namespaces`.
    pub fn script_folder(&self, path: &str, folder_id: &str, namespaces: Vec<Namespace>) {
        let folder = LocalFolder {
            id: folder_id.to_string(),
            path: PathBuf::from(path),
            name: folder_id.to_string(),
        };
        self.available.lock().unwrap().insert(
            PathBuf::from(path),
            LoadedFolder { folder, namespaces },
        );
    }

    /// Registers a scripted folder as if it had been added in an earlier run.
    pub fn remember(&self, path: &str) {
        let folder = self.available.lock().unwrap()[&PathBuf::from(path)]
            .folder
            .clone();
        self.registered.lock().unwrap().push(folder);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn hold(&self, op: &str) -> Hold {
        self.gates.hold(op.to_string())
    }

    pub fn fail_next(&self, op: &str) {
        self.gates.failures.lock().unwrap().insert(op.to_string());
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn with_folder<T>(&self, folder_id: &str, f: impl FnOnce(&mut LoadedFolder) -> Result<T>) -> Result<T> {
        let mut available = self.available.lock().unwrap();
        let loaded = available
            .values_mut()
            .find(|l| l.folder.id == folder_id)
            .ok_or_else(|| anyhow!("unknown folder {}", folder_id))?;
        f(loaded)
    }
}

#[async_trait]
impl LocalSource for FakeLocal {
    async fn list_folders(&self) -> Result<Vec<LocalFolder>> {
        self.record("list_folders".to_string());
        Ok(self.registered.lock().unwrap().clone())
    }

    async fn add_folder(&self, path: &Path) -> Result<LoadedFolder> {
        self.record(format!("add_folder {}", path.display()));
        self.gates.pass(&format!("add_folder {}", path.display())).await?;
        let loaded = self
            .available
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("No Wrangler KV storage found at {}", path.display()))?;
        let mut registered = self.registered.lock().unwrap();
        if !registered.iter().any(|f| f.id == loaded.folder.id) {
            registered.push(loaded.folder.clone());
        }
        Ok(loaded)
    }

    async fn remove_folder(&self, folder_id: &str) -> Result<()> {
        self.record(format!("remove_folder {}", folder_id));
        self.registered.lock().unwrap().retain(|f| f.id != folder_id);
        Ok(())
    }

    async fn load_namespaces(&self, folder_id: &str) -> Result<Vec<Namespace>> {
        self.record(format!("load_namespaces {}", folder_id));
        self.gates.pass(&format!("load_namespaces {}", folder_id)).await?;
        self.with_folder(folder_id, |loaded| Ok(loaded.namespaces.clone()))
    }

    async fn delete_keys(&self, folder_id: &str, namespace_id: &str, keys: &[String]) -> Result<()> {
        self.record(format!("delete_keys {} {} {}", folder_id, namespace_id, keys.join(",")));
        self.gates.pass("delete_keys").await?;
        self.with_folder(folder_id, |loaded| {
            let ns = loaded
                .namespaces
                .iter_mut()
                .find(|ns| ns.id == namespace_id)
                .ok_or_else(|| anyhow!("namespace not found: {}", namespace_id))?;
            ns.entries.retain(|e| !keys.contains(&e.key));
            ns.count = Some(ns.entries.len());
            Ok(())
        })
    }

    async fn update_value(
        &self,
        folder_id: &str,
        namespace_id: &str,
        key: &str,
        value: &Value,
    ) -> Result<()> {
        self.record(format!("update_value {} {} {}", folder_id, namespace_id, key));
        self.gates.pass("update_value").await?;
        self.with_folder(folder_id, |loaded| {
            let entry = loaded
                .namespaces
                .iter_mut()
                .find(|ns| ns.id == namespace_id)
                .and_then(|ns| ns.entries.iter_mut().find(|e| e.key == key))
                .ok_or_else(|| anyhow!("Key not found: {}", key))?;
            entry.value = Some(value.clone());
            Ok(())
        })
    }
}

/// In-memory remote adapter for a single scripted account.
pub struct FakeRemote {
    account_id: String,
    token: String,
    connected: Mutex<bool>,
    namespaces: Mutex<Vec<Namespace>>,
    keys: Mutex<HashMap<String, Vec<Entry>>>,
    values: Mutex<HashMap<(String, String), Value>>,
    calls: Mutex<Vec<String>>,
    gates: Gates,
}

impl FakeRemote {
    pub fn new(account_id: &str, token: &str) -> Arc<Self> {
        Arc::new(Self {
            account_id: account_id.to_string(),
            token: token.to_string(),
            connected: Mutex::new(false),
            namespaces: Mutex::new(Vec::new()),
            keys: Mutex::new(HashMap::new()),
            values: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            gates: Gates::default(),
        })
    }

    pub fn script_namespace(&self, id: &str, count: Option<usize>, keys: &[(&str, Value)]) {
        self.namespaces
            .lock()
            .unwrap()
            .push(remote_ns(&self.account_id, id, count));
        self.keys.lock().unwrap().insert(
            id.to_string(),
            keys.iter().map(|(k, _)| Entry::new(*k)).collect(),
        );
        let mut values = self.values.lock().unwrap();
        for (k, v) in keys {
            values.insert((id.to_string(), k.to_string()), v.clone());
        }
    }

    pub fn value(&self, namespace_id: &str, key: &str) -> Option<Value> {
        self.values
            .lock()
            .unwrap()
            .get(&(namespace_id.to_string(), key.to_string()))
            .cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn hold(&self, op: &str) -> Hold {
        self.gates.hold(op.to_string())
    }

    pub fn fail_next(&self, op: &str) {
        self.gates.failures.lock().unwrap().insert(op.to_string());
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_account(&self, account_id: &str) -> Result<()> {
        if !*self.connected.lock().unwrap() || account_id != self.account_id {
            anyhow::bail!("no connection for account {}", account_id);
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteSource for FakeRemote {
    async fn connect(&self, account_id: &str, api_token: &str) -> Result<()> {
        self.record(format!("connect {}", account_id));
        self.gates.pass("connect").await?;
        if account_id != self.account_id || api_token != self.token {
            anyhow::bail!("validate credentials: list namespaces: unauthorized");
        }
        *self.connected.lock().unwrap() = true;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.record("disconnect".to_string());
        *self.connected.lock().unwrap() = false;
        Ok(())
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        self.record("list_namespaces".to_string());
        self.gates.pass("list_namespaces").await?;
        if !*self.connected.lock().unwrap() {
            return Ok(Vec::new());
        }
        Ok(self.namespaces.lock().unwrap().clone())
    }

    async fn list_keys(&self, account_id: &str, namespace_id: &str) -> Result<Vec<Entry>> {
        self.record(format!("list_keys {}", namespace_id));
        self.gates.pass(&format!("list_keys {}", namespace_id)).await?;
        self.check_account(account_id)?;
        Ok(self
            .keys
            .lock()
            .unwrap()
            .get(namespace_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_value(&self, account_id: &str, namespace_id: &str, key: &str) -> Result<Value> {
        self.record(format!("get_value {} {}", namespace_id, key));
        self.gates.pass(&format!("get_value {}", key)).await?;
        self.check_account(account_id)?;
        self.value(namespace_id, key)
            .ok_or_else(|| anyhow!("Key not found: {}", key))
    }

    async fn update_value(
        &self,
        account_id: &str,
        namespace_id: &str,
        key: &str,
        value: &Value,
    ) -> Result<()> {
        self.record(format!("update_value {} {}", namespace_id, key));
        self.gates.pass("update_value").await?;
        self.check_account(account_id)?;
        self.values
            .lock()
            .unwrap()
            .insert((namespace_id.to_string(), key.to_string()), value.clone());
        Ok(())
    }

    async fn delete_keys(&self, account_id: &str, namespace_id: &str, keys: &[String]) -> Result<()> {
        self.record(format!("delete_keys {} {}", namespace_id, keys.join(",")));
        self.gates.pass("delete_keys").await?;
        self.check_account(account_id)?;
        if let Some(entries) = self.keys.lock().unwrap().get_mut(namespace_id) {
            entries.retain(|e| !keys.contains(&e.key));
        }
        let mut values = self.values.lock().unwrap();
        for key in keys {
            values.remove(&(namespace_id.to_string(), key.clone()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mock Cloudflare API

#[derive(Default)]
pub struct MockApi {
    pub token: String,
    pub namespaces: Vec<(String, String)>,
    pub keys: HashMap<String, Vec<(String, Option<i64>)>>,
    pub values: HashMap<(String, String), String>,
    /// When false the analytics endpoint fails and counts come from key listings.
    pub analytics: bool,
    pub requests: Vec<String>,
}

impl MockApi {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            analytics: true,
            ..Self::default()
        }
    }

    pub fn with_key(mut self, namespace_id: &str, key: &str, value: &str) -> Self {
        if !self.namespaces.iter().any(|(id, _)| id == namespace_id) {
            self.namespaces
                .push((namespace_id.to_string(), format!("{}-title", namespace_id)));
        }
        self.keys
            .entry(namespace_id.to_string())
            .or_default()
            .push((key.to_string(), None));
        self.values.insert(
            (namespace_id.to_string(), key.to_string()),
            value.to_string(),
        );
        self
    }
}

pub type SharedApi = Arc<Mutex<MockApi>>;

pub struct MockServer {
    pub base_url: String,
    pub api: SharedApi,
}

impl MockServer {
    pub fn requests(&self) -> Vec<String> {
        self.api.lock().unwrap().requests.clone()
    }
}

pub async fn spawn_mock_api(api: MockApi) -> Result<MockServer> {
    let api: SharedApi = Arc::new(Mutex::new(api));
    let app = Router::new()
        .route("/client/v4/accounts/:account/storage/kv/namespaces", get(list_namespaces))
        .route("/client/v4/accounts/:account/storage/analytics/stored", get(analytics))
        .route(
            "/client/v4/accounts/:account/storage/kv/namespaces/:ns/keys",
            get(list_keys),
        )
        .route(
            "/client/v4/accounts/:account/storage/kv/namespaces/:ns/values/:key",
            get(get_value).put(put_value).delete(delete_value),
        )
        .route(
            "/client/v4/accounts/:account/storage/kv/namespaces/:ns/bulk/delete",
            post(bulk_delete),
        )
        .with_state(api.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .context("bind mock api")?;
    let addr = listener.local_addr().context("mock api addr")?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok(MockServer {
        base_url: format!("http://{}/client/v4", addr),
        api,
    })
}

fn envelope(result: Value) -> Response {
    axum::Json(json!({"success": true, "errors": [], "result": result})).into_response()
}

fn failure(status: StatusCode, code: i64, message: &str) -> Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "errors": [{"code": code, "message": message}],
            "result": null
        })),
    )
        .into_response()
}

fn authorize(api: &SharedApi, headers: &HeaderMap, request: String) -> Option<Response> {
    let mut api = api.lock().unwrap();
    api.requests.push(request);
    let expected = format!("Bearer {}", api.token);
    let ok = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if ok {
        None
    } else {
        Some(failure(StatusCode::UNAUTHORIZED, 10000, "Authentication error"))
    }
}

async fn list_namespaces(
    State(api): State<SharedApi>,
    UrlPath(_account): UrlPath<String>,
    headers: HeaderMap,
) -> Response {
    if let Some(denied) = authorize(&api, &headers, "GET namespaces".to_string()) {
        return denied;
    }
    let api = api.lock().unwrap();
    let result: Vec<Value> = api
        .namespaces
        .iter()
        .map(|(id, title)| json!({"id": id, "title": title}))
        .collect();
    envelope(Value::Array(result))
}

async fn analytics(
    State(api): State<SharedApi>,
    UrlPath(_account): UrlPath<String>,
    headers: HeaderMap,
) -> Response {
    if let Some(denied) = authorize(&api, &headers, "GET analytics".to_string()) {
        return denied;
    }
    let api = api.lock().unwrap();
    if !api.analytics {
        return failure(StatusCode::BAD_REQUEST, 8000000, "analytics unavailable");
    }
    let data: Vec<Value> = api
        .namespaces
        .iter()
        .map(|(id, _)| {
            let stored = api.keys.get(id).map(|k| k.len()).unwrap_or(0);
            json!({"dimensions": [id], "metrics": [[stored]]})
        })
        .collect();
    envelope(json!({"data": data}))
}

async fn list_keys(
    State(api): State<SharedApi>,
    UrlPath((_account, ns)): UrlPath<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let request = match query.get("limit") {
        Some(limit) => format!("GET keys {} limit={}", ns, limit),
        None => format!("GET keys {}", ns),
    };
    if let Some(denied) = authorize(&api, &headers, request) {
        return denied;
    }
    let api = api.lock().unwrap();
    let Some(keys) = api.keys.get(&ns) else {
        return failure(StatusCode::NOT_FOUND, 10013, "namespace not found");
    };
    let limit = query
        .get("limit")
        .and_then(|l| l.parse::<usize>().ok())
        .unwrap_or(1000);
    let result: Vec<Value> = keys
        .iter()
        .take(limit)
        .map(|(name, expiration)| match expiration {
            Some(exp) => json!({"name": name, "expiration": exp}),
            None => json!({"name": name}),
        })
        .collect();
    axum::Json(json!({
        "success": true,
        "errors": [],
        "result": result,
        "result_info": {"count": result.len(), "total_count": keys.len(), "cursor": ""}
    }))
    .into_response()
}

async fn get_value(
    State(api): State<SharedApi>,
    UrlPath((_account, ns, key)): UrlPath<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Some(denied) = authorize(&api, &headers, format!("GET value {} {}", ns, key)) {
        return denied;
    }
    let api = api.lock().unwrap();
    match api.values.get(&(ns, key)) {
        Some(value) => value.clone().into_response(),
        None => failure(StatusCode::NOT_FOUND, 10009, "key not found"),
    }
}

async fn put_value(
    State(api): State<SharedApi>,
    UrlPath((_account, ns, key)): UrlPath<(String, String, String)>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if let Some(denied) = authorize(&api, &headers, format!("PUT value {} {}", ns, key)) {
        return denied;
    }
    let mut api = api.lock().unwrap();
    let keys = api.keys.entry(ns.clone()).or_default();
    if !keys.iter().any(|(k, _)| k == &key) {
        keys.push((key.clone(), None));
    }
    api.values.insert((ns, key), body);
    envelope(Value::Null)
}

fn remove_key(api: &mut MockApi, ns: &str, key: &str) {
    if let Some(keys) = api.keys.get_mut(ns) {
        keys.retain(|(k, _)| k != key);
    }
    api.values.remove(&(ns.to_string(), key.to_string()));
}

async fn delete_value(
    State(api): State<SharedApi>,
    UrlPath((_account, ns, key)): UrlPath<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Some(denied) = authorize(&api, &headers, format!("DELETE value {} {}", ns, key)) {
        return denied;
    }
    remove_key(&mut api.lock().unwrap(), &ns, &key);
    envelope(Value::Null)
}

async fn bulk_delete(
    State(api): State<SharedApi>,
    UrlPath((_account, ns)): UrlPath<(String, String)>,
    headers: HeaderMap,
    axum::Json(keys): axum::Json<Vec<String>>,
) -> Response {
    let request = format!("POST bulk/delete {} {}", ns, keys.join(","));
    if let Some(denied) = authorize(&api, &headers, request) {
        return denied;
    }
    let mut api = api.lock().unwrap();
    for key in &keys {
        remove_key(&mut api, &ns, key);
    }
    envelope(json!({"successful_key_count": keys.len()}))
}
