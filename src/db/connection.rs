use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum Request {
    Run(Job),
    Stop,
}

/// Owns the worker thread; dropping the last `Database` clone stops it.
struct Worker {
    requests: mpsc::Sender<Request>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let handle = match self.thread.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return;
        };

        if self.requests.send(Request::Stop).is_err() {
            warn!("Attendance store worker already gone at shutdown");
        }
        if handle.join().is_err() {
            error!("Attendance store worker panicked");
        }
    }
}

/// Handle to the attendance store.
///
/// A single worker thread owns the SQLite connection; every query is shipped
/// to it as a closure, so statements from one caller run strictly in order.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
}

impl Database {
    /// Open (or create) the store and bring its schema up to date before
    /// returning.
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (request_tx, request_rx) = mpsc::channel::<Request>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let thread_path = db_path.clone();

        let thread = thread::Builder::new()
            .name("rollcall-db".into())
            .spawn(move || {
                let mut conn = match open_connection(&thread_path) {
                    Ok(conn) => {
                        if ready_tx.send(Ok(())).is_err() {
                            return;
                        }
                        conn
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                serve(&mut conn, request_rx);
            })
            .context("failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("Attendance store opened at {}", db_path.display());

        Ok(Self {
            worker: Arc::new(Worker {
                requests: request_tx,
                thread: Mutex::new(Some(thread)),
            }),
        })
    }

    /// Run `task` on the worker thread and wait for its result.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let job: Job = Box::new(move |conn| {
            // The caller may have given up waiting; the work is done either way.
            let _ = reply_tx.send(task(conn));
        });

        self.worker
            .requests
            .send(Request::Run(job))
            .map_err(|_| anyhow!("attendance store worker is not running"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("attendance store worker stopped before replying"))?
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open SQLite database {}", path.display()))?;

    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        warn!("Failed to enable WAL mode: {err}");
    }
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign keys")?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;

    run_migrations(&mut conn).context("failed to run database migrations")?;
    Ok(conn)
}

fn serve(conn: &mut Connection, requests: mpsc::Receiver<Request>) {
    while let Ok(request) = requests.recv() {
        match request {
            Request::Run(job) => job(conn),
            Request::Stop => break,
        }
    }
    info!("Attendance store worker stopped");
}
