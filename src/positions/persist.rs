use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::PositionMap;

/// Storage collaborator for per-user node coordinates.
pub trait PositionBackend: Send + Sync + 'static {
    fn load_positions(&self, tree_id: &str, user_id: &str) -> Result<Option<PositionMap>>;
    fn save_positions(&self, tree_id: &str, user_id: &str, positions: &PositionMap) -> Result<()>;
}

/// Keeps one JSON file per tree and user under `directory`.
#[derive(Clone, Debug)]
pub struct JsonFileBackend {
    directory: PathBuf,
}

impl JsonFileBackend {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    fn path_for(&self, tree_id: &str, user_id: &str) -> PathBuf {
        fn sanitize(raw: &str) -> String {
            raw.chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
                .collect()
        }
        self.directory
            .join(format!("{}.{}.json", sanitize(tree_id), sanitize(user_id)))
    }
}

impl PositionBackend for JsonFileBackend {
    fn load_positions(&self, tree_id: &str, user_id: &str) -> Result<Option<PositionMap>> {
        let path = self.path_for(tree_id, user_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read positions {}", path.display()))?;
        let positions = serde_json::from_str(&raw)
            .with_context(|| format!("invalid positions file {}", path.display()))?;
        Ok(Some(positions))
    }

    fn save_positions(&self, tree_id: &str, user_id: &str, positions: &PositionMap) -> Result<()> {
        fs::create_dir_all(&self.directory).with_context(|| {
            format!("failed to create positions dir {}", self.directory.display())
        })?;
        let path = self.path_for(tree_id, user_id);
        let staging = path.with_extension("json.tmp");
        let raw = serde_json::to_string(positions).context("failed to encode positions")?;
        fs::write(&staging, raw)
            .with_context(|| format!("failed to write {}", staging.display()))?;
        fs::rename(&staging, &path)
            .with_context(|| format!("failed to move positions into {}", path.display()))
    }
}

enum SaveRequest {
    Save(PositionMap),
    Flush(Sender<()>),
}

/// Debounced, strictly serialized writer.
///
/// A single worker thread owns the backend. Saves arriving within the debounce
/// window replace each other so only the latest map is written, and a write
/// never starts before the previous one returned.
pub struct SaveQueue {
    tx: Option<Sender<SaveRequest>>,
    worker: Option<JoinHandle<()>>,
}

impl SaveQueue {
    pub fn spawn(
        backend: Arc<dyn PositionBackend>,
        tree_id: String,
        user_id: String,
        debounce: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        let worker = thread::spawn(move || {
            run_save_worker(&rx, backend.as_ref(), &tree_id, &user_id, debounce);
        });

        Self {
            tx: Some(tx),
            worker: Some(worker),
        }
    }

    pub fn schedule(&self, positions: PositionMap) {
        if let Some(tx) = &self.tx
            && tx.send(SaveRequest::Save(positions)).is_err()
        {
            warn!("position save worker is gone; dropping save");
        }
    }

    /// Writes any coalesced save right away and waits for it to finish.
    pub fn flush(&self) {
        let Some(tx) = &self.tx else {
            return;
        };
        let (ack_tx, ack_rx) = mpsc::channel();
        if tx.send(SaveRequest::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl Drop for SaveQueue {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("position save worker panicked");
        }
    }
}

fn run_save_worker(
    rx: &Receiver<SaveRequest>,
    backend: &dyn PositionBackend,
    tree_id: &str,
    user_id: &str,
    debounce: Duration,
) {
    let write = |positions: PositionMap| {
        match backend.save_positions(tree_id, user_id, &positions) {
            Ok(()) => debug!(tree_id, count = positions.len(), "saved node positions"),
            Err(error) => warn!(tree_id, "failed to save node positions: {error:#}"),
        }
    };

    let mut pending: Option<PositionMap> = None;
    loop {
        let request = if pending.is_some() {
            match rx.recv_timeout(debounce) {
                Ok(request) => request,
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(positions) = pending.take() {
                        write(positions);
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        } else {
            match rx.recv() {
                Ok(request) => request,
                Err(_) => break,
            }
        };

        match request {
            SaveRequest::Save(positions) => pending = Some(positions),
            SaveRequest::Flush(ack) => {
                if let Some(positions) = pending.take() {
                    write(positions);
                }
                let _ = ack.send(());
            }
        }
    }

    if let Some(positions) = pending.take() {
        write(positions);
    }
}

enum LoadState {
    Idle,
    Pending(Receiver<Option<PositionMap>>),
    Settled,
}

/// Runs the position load at most once per session and reports when it settled.
pub struct LoadGate {
    state: LoadState,
}

impl Default for LoadGate {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadGate {
    pub fn new() -> Self {
        Self {
            state: LoadState::Idle,
        }
    }

    /// A gate with nothing to load.
    pub fn settled() -> Self {
        Self {
            state: LoadState::Settled,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.state, LoadState::Settled)
    }

    pub fn start(&mut self, backend: Arc<dyn PositionBackend>, tree_id: String, user_id: String) {
        if !matches!(self.state, LoadState::Idle) {
            return;
        }

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let positions = match backend.load_positions(&tree_id, &user_id) {
                Ok(positions) => positions,
                Err(error) => {
                    warn!(tree_id, "failed to load node positions: {error:#}");
                    None
                }
            };
            let _ = tx.send(positions);
        });
        self.state = LoadState::Pending(rx);
    }

    /// Returns the loaded map the one time the load completes with data.
    pub fn poll(&mut self) -> Option<PositionMap> {
        let LoadState::Pending(rx) = &self.state else {
            return None;
        };
        match rx.try_recv() {
            Ok(positions) => {
                self.state = LoadState::Settled;
                positions
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                warn!("position load worker disconnected");
                self.state = LoadState::Settled;
                None
            }
        }
    }

    /// Blocks until a started load settles.
    pub fn wait(&mut self) -> Option<PositionMap> {
        let LoadState::Pending(rx) = &self.state else {
            return None;
        };
        let positions = rx.recv().ok().flatten();
        self.state = LoadState::Settled;
        positions
    }
}
