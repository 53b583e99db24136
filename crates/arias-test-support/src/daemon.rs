//! Scripted download daemon speaking the JSON-RPC dialect over an in-memory
//! link.
//!
//! Each download follows the [`Script`] registered for its first URI. Replies
//! are always written before the notifications they trigger, matching the
//! real daemon's ordering.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arias_rpc::transport::memory::{self, MemorySink, MemorySource, PeerSender};
use serde_json::{Map, Value, json};
use tokio::task::JoinHandle;

const GID_NOT_FOUND: i64 = 1;
const METHOD_NOT_FOUND: i64 = -32_601;

/// File produced by a scripted download.
#[derive(Debug, Clone)]
pub struct FakeFile {
    /// Path relative to the download directory.
    pub name: String,
    /// Contents written on completion.
    pub body: Vec<u8>,
}

impl FakeFile {
    /// File with the given relative name and contents.
    pub fn new(name: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }
}

/// How a download for a given URI behaves.
#[derive(Debug, Clone)]
pub enum Script {
    /// Write the files to disk and complete.
    Complete(Vec<FakeFile>),
    /// Fail with the given daemon error code and message.
    Fail {
        /// Daemon exit code.
        code: u8,
        /// Daemon error message.
        message: String,
    },
    /// Stop without completing.
    Stop,
    /// Stay active until removed.
    Hold,
}

/// One request received by the daemon, with any secret token stripped.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Method name.
    pub method: String,
    /// Positional parameters.
    pub params: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Active,
    Waiting,
    Paused,
    Complete,
    Error,
    Removed,
}

impl Phase {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Waiting => "waiting",
            Self::Paused => "paused",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Removed => "removed",
        }
    }

    const fn is_live(self) -> bool {
        matches!(self, Self::Active | Self::Waiting | Self::Paused)
    }
}

struct Download {
    uris: Vec<String>,
    dir: PathBuf,
    files: Vec<(PathBuf, u64)>,
    phase: Phase,
    error_code: u8,
    error_message: String,
}

#[derive(Default)]
struct State {
    next_gid: u64,
    scripts: HashMap<String, Script>,
    downloads: HashMap<String, Download>,
    queue: Vec<String>,
    calls: Vec<RecordedCall>,
    failures: HashMap<String, String>,
}

struct Shared {
    secret: Option<String>,
    download_dir: PathBuf,
    state: Mutex<State>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Configures a [`FakeDaemon`] before it starts.
#[derive(Debug, Default)]
pub struct FakeDaemonBuilder {
    secret: Option<String>,
    download_dir: Option<PathBuf>,
}

impl FakeDaemonBuilder {
    /// Require `token:<secret>` as the first parameter of every call.
    #[must_use]
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Directory used when a download carries no `dir` option.
    #[must_use]
    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }

    /// Start serving; returns the daemon handle plus the client's transport
    /// halves.
    ///
    /// Must be called within a Tokio runtime.
    #[must_use]
    pub fn start(self) -> (FakeDaemon, MemorySink, MemorySource) {
        let (sink, source, peer) = memory::pair();
        let shared = Arc::new(Shared {
            secret: self.secret,
            download_dir: self
                .download_dir
                .unwrap_or_else(|| std::env::temp_dir().join("arias-fake-daemon")),
            state: Mutex::new(State::default()),
        });

        let sender = peer.sender.clone();
        let mut receiver = peer.receiver;
        let worker_shared = Arc::clone(&shared);
        let worker_sender = sender.clone();
        let worker = tokio::spawn(async move {
            while let Some(frame) = receiver.recv().await {
                handle_frame(&worker_shared, &worker_sender, &frame);
            }
        });

        (
            FakeDaemon {
                shared,
                sender,
                worker,
            },
            sink,
            source,
        )
    }
}

/// In-memory stand-in for the download daemon.
pub struct FakeDaemon {
    shared: Arc<Shared>,
    sender: PeerSender,
    worker: JoinHandle<()>,
}

impl FakeDaemon {
    /// Builder for a daemon with a secret or a custom download directory.
    #[must_use]
    pub fn builder() -> FakeDaemonBuilder {
        FakeDaemonBuilder::default()
    }

    /// Start a daemon with default settings.
    ///
    /// Must be called within a Tokio runtime.
    #[must_use]
    pub fn start() -> (Self, MemorySink, MemorySource) {
        Self::builder().start()
    }

    /// Register the behaviour of downloads whose first URI is `uri`.
    /// Unscripted downloads complete with no files.
    pub fn script(&self, uri: impl Into<String>, script: Script) {
        self.shared.lock().scripts.insert(uri.into(), script);
    }

    /// Reject the next call to `method` with `message`, whatever its state.
    pub fn fail_next(&self, method: impl Into<String>, message: impl Into<String>) {
        self.shared
            .lock()
            .failures
            .insert(method.into(), message.into());
    }

    /// Every request received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.shared.lock().calls.clone()
    }

    /// Requests received so far for `method`.
    #[must_use]
    pub fn calls_to(&self, method: &str) -> Vec<RecordedCall> {
        self.shared
            .lock()
            .calls
            .iter()
            .filter(|call| call.method == method)
            .cloned()
            .collect()
    }

    /// Push a notification for `gid` regardless of its state.
    pub fn push_event(&self, method: &str, gid: &str) -> bool {
        self.sender.send(notification(method, gid))
    }

    /// Push a raw frame.
    pub fn push_frame(&self, frame: impl Into<String>) -> bool {
        self.sender.send(frame)
    }

    /// Force a download into the given terminal state and notify the client.
    pub fn finish(&self, gid: &str, script: &Script) {
        let events = {
            let mut state = self.shared.lock();
            let Some(download) = state.downloads.get_mut(gid) else {
                return;
            };
            apply_script(download, script)
        };
        for method in events {
            self.sender.send(notification(method, gid));
        }
    }

    /// Sever the connection.
    pub fn disconnect(&self) {
        self.sender.disconnect();
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

fn notification(method: &str, gid: &str) -> String {
    json!({"jsonrpc": "2.0", "method": method, "params": [{"gid": gid}]}).to_string()
}

fn reply(id: &Value, outcome: Result<Value, (i64, String)>) -> String {
    match outcome {
        Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string(),
        Err((code, message)) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": code, "message": message},
        })
        .to_string(),
    }
}

fn handle_frame(shared: &Shared, sender: &PeerSender, frame: &str) {
    let Ok(request) = serde_json::from_str::<Value>(frame) else {
        return;
    };
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let method = request
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let mut params = match request.get("params") {
        Some(Value::Array(params)) => params.clone(),
        _ => Vec::new(),
    };

    if let Some(secret) = &shared.secret {
        let expected = format!("token:{secret}");
        if params.first().and_then(Value::as_str) != Some(expected.as_str()) {
            sender.send(reply(&id, Err((GID_NOT_FOUND, "Unauthorized".to_string()))));
            return;
        }
        params.remove(0);
    }

    let mut state = shared.lock();
    state.calls.push(RecordedCall {
        method: method.clone(),
        params: params.clone(),
    });
    let (outcome, events) = match state.failures.remove(&method) {
        Some(message) => (Err((GID_NOT_FOUND, message)), Vec::new()),
        None => dispatch(shared, &mut state, &method, &params),
    };
    drop(state);

    sender.send(reply(&id, outcome));
    for (event, gid) in events {
        sender.send(notification(event, &gid));
    }
}

type Dispatched = (Result<Value, (i64, String)>, Vec<(&'static str, String)>);

fn dispatch(shared: &Shared, state: &mut State, method: &str, params: &[Value]) -> Dispatched {
    let gid = params
        .first()
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    match method {
        "aria2.addUri" => add_uri(shared, state, params),
        "aria2.tellStatus" => (
            with_download(state, &gid, |download| {
                project(status_json(&gid, download), params.get(1))
            }),
            Vec::new(),
        ),
        "aria2.getFiles" => (
            with_download(state, &gid, files_json),
            Vec::new(),
        ),
        "aria2.getUris" => (
            with_download(state, &gid, |download| {
                Value::Array(
                    download
                        .uris
                        .iter()
                        .map(|uri| json!({"uri": uri, "status": "used"}))
                        .collect(),
                )
            }),
            Vec::new(),
        ),
        "aria2.remove" | "aria2.forceRemove" => {
            transition(state, &gid, Phase::is_live, Phase::Removed, "aria2.onDownloadStop")
        }
        "aria2.pause" | "aria2.forcePause" => transition(
            state,
            &gid,
            |phase| matches!(phase, Phase::Active | Phase::Waiting),
            Phase::Paused,
            "aria2.onDownloadPause",
        ),
        "aria2.unpause" => match state.downloads.get_mut(&gid) {
            Some(download) if download.phase == Phase::Paused => {
                download.phase = Phase::Waiting;
                (Ok(json!(gid)), Vec::new())
            }
            _ => (Err(not_found(&gid)), Vec::new()),
        },
        "aria2.removeDownloadResult" => match state.downloads.get(&gid) {
            Some(download) if !download.phase.is_live() => {
                state.downloads.remove(&gid);
                (Ok(json!("OK")), Vec::new())
            }
            _ => (Err(not_found(&gid)), Vec::new()),
        },
        "aria2.pauseAll" | "aria2.forcePauseAll" | "aria2.unpauseAll" => {
            (Ok(json!("OK")), Vec::new())
        }
        "aria2.changePosition" => (change_position(state, &gid, params), Vec::new()),
        other => (
            Err((METHOD_NOT_FOUND, format!("Method not found: {other}"))),
            Vec::new(),
        ),
    }
}

fn not_found(gid: &str) -> (i64, String) {
    (GID_NOT_FOUND, format!("GID {gid} is not found"))
}

fn with_download(
    state: &State,
    gid: &str,
    render: impl FnOnce(&Download) -> Value,
) -> Result<Value, (i64, String)> {
    state
        .downloads
        .get(gid)
        .map(render)
        .ok_or_else(|| not_found(gid))
}

fn transition(
    state: &mut State,
    gid: &str,
    allowed: impl Fn(Phase) -> bool,
    next: Phase,
    event: &'static str,
) -> Dispatched {
    match state.downloads.get_mut(gid) {
        Some(download) if allowed(download.phase) => {
            download.phase = next;
            (Ok(json!(gid)), vec![(event, gid.to_string())])
        }
        _ => (
            Err((
                GID_NOT_FOUND,
                format!("Active Download not found for GID#{gid}"),
            )),
            Vec::new(),
        ),
    }
}

fn add_uri(shared: &Shared, state: &mut State, params: &[Value]) -> Dispatched {
    let uris: Vec<String> = params
        .first()
        .and_then(Value::as_array)
        .map(|uris| {
            uris.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let Some(first) = uris.first().cloned() else {
        return (
            Err((GID_NOT_FOUND, "No URI to download.".to_string())),
            Vec::new(),
        );
    };
    let options = params.get(1).and_then(Value::as_object);
    let dir = options
        .and_then(|options| options.get("dir"))
        .and_then(Value::as_str)
        .map_or_else(|| shared.download_dir.clone(), PathBuf::from);

    state.next_gid += 1;
    let gid = format!("{:016x}", state.next_gid);
    let script = state
        .scripts
        .get(&first)
        .cloned()
        .unwrap_or(Script::Complete(Vec::new()));

    let mut download = Download {
        uris,
        files: planned_files(&dir, &script),
        dir,
        phase: Phase::Active,
        error_code: 0,
        error_message: String::new(),
    };
    let mut events = vec![("aria2.onDownloadStart", gid.clone())];
    events.extend(
        apply_script(&mut download, &script)
            .into_iter()
            .map(|event| (event, gid.clone())),
    );
    state.downloads.insert(gid.clone(), download);
    state.queue.push(gid.clone());
    (Ok(json!(gid)), events)
}

fn planned_files(dir: &Path, script: &Script) -> Vec<(PathBuf, u64)> {
    match script {
        Script::Complete(files) => files
            .iter()
            .map(|file| (dir.join(&file.name), file.body.len() as u64))
            .collect(),
        Script::Fail { .. } | Script::Stop | Script::Hold => Vec::new(),
    }
}

fn apply_script(download: &mut Download, script: &Script) -> Vec<&'static str> {
    match script {
        Script::Complete(files) => {
            for file in files {
                let path = download.dir.join(&file.name);
                if let Some(parent) = path.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                let _ = std::fs::write(&path, &file.body);
            }
            download.files = files
                .iter()
                .map(|file| (download.dir.join(&file.name), file.body.len() as u64))
                .collect();
            download.phase = Phase::Complete;
            vec!["aria2.onDownloadComplete"]
        }
        Script::Fail { code, message } => {
            download.phase = Phase::Error;
            download.error_code = *code;
            download.error_message.clone_from(message);
            vec!["aria2.onDownloadError"]
        }
        Script::Stop => {
            download.phase = Phase::Removed;
            vec!["aria2.onDownloadStop"]
        }
        Script::Hold => Vec::new(),
    }
}

fn files_json(download: &Download) -> Value {
    let completed = download.phase == Phase::Complete;
    Value::Array(
        download
            .files
            .iter()
            .enumerate()
            .map(|(index, (path, length))| {
                json!({
                    "index": (index + 1).to_string(),
                    "path": path.to_string_lossy(),
                    "length": length.to_string(),
                    "completedLength": if completed { length.to_string() } else { "0".to_string() },
                    "selected": "true",
                    "uris": download
                        .uris
                        .iter()
                        .map(|uri| json!({"uri": uri, "status": "used"}))
                        .collect::<Vec<_>>(),
                })
            })
            .collect(),
    )
}

fn status_json(gid: &str, download: &Download) -> Value {
    let total: u64 = download.files.iter().map(|(_, length)| length).sum();
    let completed = if download.phase == Phase::Complete {
        total
    } else {
        0
    };
    json!({
        "gid": gid,
        "status": download.phase.as_str(),
        "totalLength": total.to_string(),
        "completedLength": completed.to_string(),
        "uploadLength": "0",
        "downloadSpeed": "0",
        "uploadSpeed": "0",
        "connections": "0",
        "errorCode": download.error_code.to_string(),
        "errorMessage": download.error_message,
        "dir": download.dir.to_string_lossy(),
        "files": files_json(download),
    })
}

fn project(status: Value, keys: Option<&Value>) -> Value {
    let Some(keys) = keys.and_then(Value::as_array) else {
        return status;
    };
    let Value::Object(full) = status else {
        return status;
    };
    let projected: Map<String, Value> = keys
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|key| full.get(key).map(|value| (key.to_string(), value.clone())))
        .collect();
    Value::Object(projected)
}

fn change_position(
    state: &mut State,
    gid: &str,
    params: &[Value],
) -> Result<Value, (i64, String)> {
    let Some(current) = state.queue.iter().position(|entry| entry == gid) else {
        return Err(not_found(gid));
    };
    let offset = params.get(1).and_then(Value::as_i64).unwrap_or_default();
    let last = i64::try_from(state.queue.len()).unwrap_or(i64::MAX) - 1;
    let base = match params.get(2).and_then(Value::as_str) {
        Some("POS_SET") => 0,
        Some("POS_CUR") => i64::try_from(current).unwrap_or(i64::MAX),
        Some("POS_END") => last,
        _ => return Err((GID_NOT_FOUND, "Illegal argument.".to_string())),
    };
    let target = base.saturating_add(offset).clamp(0, last);
    let entry = state.queue.remove(current);
    let index = usize::try_from(target).unwrap_or_default();
    state.queue.insert(index, entry);
    Ok(json!(target))
}
