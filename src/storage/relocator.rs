//! Background relocation of finished recordings
//!
//! A single worker thread copies the staged file to its final location in fixed-size
//! chunks, publishing byte progress after every chunk. The staged file is removed only
//! once the destination has been synced and its size matches. A failed job keeps the
//! staged file, removes whatever it wrote at the destination, and is remembered until a
//! later job succeeds.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

/// Default copy chunk
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Error type for relocation
#[derive(Debug, thiserror::Error)]
pub enum RelocationError {
    #[error("A relocation is already in progress")]
    Busy,

    #[error("Relocation worker has shut down")]
    WorkerGone,

    #[error("Failed to spawn relocation worker: {0}")]
    Spawn(std::io::Error),
}

/// Progress of the current or most recent job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelocationProgress {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub total_bytes: u64,
    pub moved_bytes: u64,
    pub done: bool,
    pub error: Option<String>,
}

impl RelocationProgress {
    fn new(source: PathBuf, destination: PathBuf) -> Self {
        Self {
            source,
            destination,
            total_bytes: 0,
            moved_bytes: 0,
            done: false,
            error: None,
        }
    }

    /// Still copying
    pub fn in_flight(&self) -> bool {
        !self.done && self.error.is_none()
    }

    /// Percentage for display, 0.0 until the size is known
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return if self.done { 100.0 } else { 0.0 };
        }
        self.moved_bytes as f64 * 100.0 / self.total_bytes as f64
    }
}

enum RelocationMessage {
    Relocate { source: PathBuf, destination: PathBuf },
    Shutdown,
}

/// Single-worker file mover
pub struct FileRelocator {
    sender: Sender<RelocationMessage>,
    worker: Mutex<Option<JoinHandle<()>>>,
    progress: Arc<RwLock<Option<RelocationProgress>>>,
    last_failure: Arc<RwLock<Option<RelocationProgress>>>,
    busy: Arc<AtomicBool>,
}

impl FileRelocator {
    pub fn new() -> Result<Self, RelocationError> {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Result<Self, RelocationError> {
        let (sender, receiver) = unbounded::<RelocationMessage>();
        let progress = Arc::new(RwLock::new(None));
        let last_failure = Arc::new(RwLock::new(None));
        let busy = Arc::new(AtomicBool::new(false));

        let worker = {
            let shared = WorkerState {
                progress: progress.clone(),
                last_failure: last_failure.clone(),
                busy: busy.clone(),
            };
            std::thread::Builder::new()
                .name("file-relocator".into())
                .spawn(move || worker_main(receiver, shared, chunk_size.max(1)))
                .map_err(RelocationError::Spawn)?
        };

        Ok(Self {
            sender,
            worker: Mutex::new(Some(worker)),
            progress,
            last_failure,
            busy,
        })
    }

    /// Queue a move. Rejected while another job is still copying.
    pub fn relocate(&self, source: &Path, destination: &Path) -> Result<(), RelocationError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RelocationError::Busy);
        }

        *self.progress.write() = Some(RelocationProgress::new(
            source.to_path_buf(),
            destination.to_path_buf(),
        ));

        let msg = RelocationMessage::Relocate {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
        };
        if self.sender.send(msg).is_err() {
            self.busy.store(false, Ordering::Release);
            return Err(RelocationError::WorkerGone);
        }
        Ok(())
    }

    /// Snapshot of the current or last job
    pub fn progress(&self) -> Option<RelocationProgress> {
        self.progress.read().clone()
    }

    /// Most recent failed job, kept until a later job completes
    pub fn last_failure(&self) -> Option<RelocationProgress> {
        self.last_failure.read().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Finish the queued job (if any) and stop the worker
    pub fn shutdown(&self) {
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        let _ = self.sender.send(RelocationMessage::Shutdown);
        if handle.join().is_err() {
            log::error!("[Relocator] Worker panicked");
        }
    }
}

impl Drop for FileRelocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct WorkerState {
    progress: Arc<RwLock<Option<RelocationProgress>>>,
    last_failure: Arc<RwLock<Option<RelocationProgress>>>,
    busy: Arc<AtomicBool>,
}

fn worker_main(receiver: Receiver<RelocationMessage>, shared: WorkerState, chunk_size: usize) {
    let WorkerState {
        progress,
        last_failure,
        busy,
    } = shared;
    log::debug!("[Relocator] Worker started");

    while let Ok(msg) = receiver.recv() {
        match msg {
            RelocationMessage::Relocate { source, destination } => {
                log::info!(
                    "[Relocator] Moving {} -> {}",
                    source.display(),
                    destination.display()
                );
                match copy_in_chunks(&source, &destination, chunk_size, &progress) {
                    Ok(()) => {
                        if let Err(e) = fs::remove_file(&source) {
                            log::warn!("[Relocator] Copied, but could not remove {}: {}", source.display(), e);
                        }
                        if let Some(p) = progress.write().as_mut() {
                            p.done = true;
                        }
                        *last_failure.write() = None;
                        log::info!("[Relocator] Finished {}", destination.display());
                    }
                    Err(e) => {
                        log::error!("[Relocator] Failed to move {}: {}", source.display(), e);
                        discard_partial(&destination);
                        let mut current = progress.write();
                        if let Some(p) = current.as_mut() {
                            p.error = Some(e.to_string());
                            p.done = false;
                        }
                        *last_failure.write() = (*current).clone();
                    }
                }
                busy.store(false, Ordering::Release);
            }
            RelocationMessage::Shutdown => break,
        }
    }

    log::debug!("[Relocator] Worker stopped");
}

/// Remove a destination left behind by a failed copy
fn discard_partial(destination: &Path) {
    match fs::remove_file(destination) {
        Ok(()) => log::info!("[Relocator] Removed partial {}", destination.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!(
            "[Relocator] Could not remove partial {}: {}",
            destination.display(),
            e
        ),
    }
}

fn copy_in_chunks(
    source: &Path,
    destination: &Path,
    chunk_size: usize,
    progress: &RwLock<Option<RelocationProgress>>,
) -> std::io::Result<()> {
    let mut input = File::open(source)?;
    let total = input.metadata()?.len();
    if let Some(p) = progress.write().as_mut() {
        p.total_bytes = total;
    }

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut output = File::create(destination)?;

    let mut buf = vec![0u8; chunk_size];
    let mut moved: u64 = 0;
    loop {
        let n = input.read(&mut buf)?;
        if n == 0 {
            break;
        }
        output.write_all(&buf[..n])?;
        moved += n as u64;
        if let Some(p) = progress.write().as_mut() {
            p.moved_bytes = moved;
        }
        std::thread::yield_now();
    }

    output.flush()?;
    output.sync_all()?;

    let written = fs::metadata(destination)?.len();
    if written != total {
        return Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("size mismatch after copy: {} of {} bytes", written, total),
        ));
    }
    Ok(())
}
