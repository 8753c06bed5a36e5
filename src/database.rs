use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use rusqlite::{Connection, InterruptHandle};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::models::error::FirewallError;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS firewall_rules (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        value VARCHAR(255) NOT NULL,
        type VARCHAR(10) NOT NULL,
        mode VARCHAR(10) NOT NULL,
        active BOOLEAN NOT NULL DEFAULT 1,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_firewall_rules_key
        ON firewall_rules(value, type, mode);
";

const CALL_PENDING: u8 = 0;
const CALL_RUNNING: u8 = 1;
const CALL_ABANDONED: u8 = 2;

/// Lifecycle of the store handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    NotReady,
    Ready,
    Failed,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub uri: String,
    pub retry_interval: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub call_timeout: Duration,
}

struct Store {
    conn: Mutex<Connection>,
    interrupt: InterruptHandle,
}

/// Handle to the rule store, built once at startup and shared by every handler.
pub struct Database {
    settings: StoreSettings,
    connection: OnceLock<Arc<Store>>,
    readiness: watch::Sender<Readiness>,
}

impl Database {
    /// Creates a handle in the `NotReady` state. Call [`Database::connect_with_retry`] to open it.
    pub fn new(settings: StoreSettings) -> Self {
        let (readiness, _) = watch::channel(Readiness::NotReady);
        Self {
            settings,
            connection: OnceLock::new(),
            readiness,
        }
    }

    /// Ready-to-use handle on a private in-memory store.
    pub fn open_in_memory() -> Result<Self, FirewallError> {
        let database = Self::new(StoreSettings {
            uri: ":memory:".to_string(),
            retry_interval: Duration::from_millis(0),
            max_retries: 0,
            call_timeout: Duration::from_secs(5),
        });
        database.attach(open_store(":memory:")?);
        Ok(database)
    }

    pub fn readiness(&self) -> Readiness {
        *self.readiness.borrow()
    }

    /// Resolves once the store has either connected or given up.
    pub async fn wait_ready(&self) -> Readiness {
        let mut rx = self.readiness.subscribe();
        let state = match rx.wait_for(|state| *state != Readiness::NotReady).await {
            Ok(state) => *state,
            Err(_) => Readiness::Failed,
        };
        state
    }

    /// Opens the store, retrying with a fixed delay until the retry budget is spent.
    pub async fn connect_with_retry(&self) -> Result<(), FirewallError> {
        let attempts = self.settings.max_retries.saturating_add(1);

        for attempt in 1..=attempts {
            let uri = self.settings.uri.clone();
            let opened = tokio::task::spawn_blocking(move || open_store(&uri))
                .await
                .map_err(|e| FirewallError::StoreUnavailable(format!("connect task failed: {e}")))
                .and_then(|result| result);

            match opened {
                Ok(conn) => {
                    self.attach(conn);
                    info!("Database connection established.");
                    return Ok(());
                }
                Err(e) if attempt < attempts => {
                    warn!(
                        "Database connection failed (attempt {attempt}/{attempts}), retrying in {:?}: {e}",
                        self.settings.retry_interval
                    );
                    tokio::time::sleep(self.settings.retry_interval).await;
                }
                Err(e) => {
                    error!("Database connection failed after {attempts} attempts: {e}");
                    self.readiness.send_replace(Readiness::Failed);
                    return Err(e);
                }
            }
        }

        self.readiness.send_replace(Readiness::Failed);
        Err(FirewallError::StoreUnavailable("no connection attempts made".to_string()))
    }

    /// Runs `f` against the connection on the blocking pool, bounded by the call timeout.
    ///
    /// A call still queued on the lock at the deadline is abandoned and `f` never runs.
    /// A call already running is interrupted and its own outcome is returned, so a
    /// timeout error always means nothing was committed.
    pub async fn call<F, T>(&self, f: F) -> Result<T, FirewallError>
    where
        F: FnOnce(&mut Connection) -> Result<T, FirewallError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self
            .connection
            .get()
            .cloned()
            .ok_or_else(|| FirewallError::StoreUnavailable("store not ready".to_string()))?;

        let timeout = self.settings.call_timeout;
        let deadline = Instant::now() + timeout;
        let phase = Arc::new(AtomicU8::new(CALL_PENDING));

        let mut task = tokio::task::spawn_blocking({
            let store = Arc::clone(&store);
            let phase = Arc::clone(&phase);
            move || {
                let mut guard = store
                    .conn
                    .lock()
                    .map_err(|e| FirewallError::StoreUnavailable(format!("lock error: {e}")))?;
                let started = Instant::now() < deadline
                    && phase
                        .compare_exchange(CALL_PENDING, CALL_RUNNING, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok();
                if !started {
                    return Err(timed_out(timeout));
                }
                f(&mut *guard)
            }
        });

        match tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), &mut task).await {
            Ok(joined) => flatten(joined),
            Err(_) => {
                let abandoned = phase
                    .compare_exchange(CALL_PENDING, CALL_ABANDONED, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok();
                if abandoned {
                    warn!("Store call abandoned after waiting {timeout:?} for the connection");
                    return Err(timed_out(timeout));
                }

                warn!("Store call exceeded {timeout:?}, interrupting");
                store.interrupt.interrupt();
                flatten(task.await)
            }
        }
    }

    fn attach(&self, conn: Connection) {
        let interrupt = conn.get_interrupt_handle();
        // A second attach keeps the first connection.
        let _ = self.connection.set(Arc::new(Store {
            conn: Mutex::new(conn),
            interrupt,
        }));
        self.readiness.send_replace(Readiness::Ready);
    }
}

fn timed_out(timeout: Duration) -> FirewallError {
    FirewallError::StoreUnavailable(format!("store call timed out after {timeout:?}"))
}

fn flatten<T>(
    joined: Result<Result<T, FirewallError>, tokio::task::JoinError>,
) -> Result<T, FirewallError> {
    joined.unwrap_or_else(|e| Err(FirewallError::StoreUnavailable(format!("store task failed: {e}"))))
}

/// Opens the connection named by `uri`, checks it answers, and creates the schema.
fn open_store(uri: &str) -> Result<Connection, FirewallError> {
    let conn = match uri {
        "sqlite::memory:" | ":memory:" => Connection::open_in_memory()?,
        other => {
            let path = other
                .strip_prefix("sqlite://")
                .or_else(|| other.strip_prefix("sqlite:"))
                .unwrap_or(other);
            Connection::open(Path::new(path))?
        }
    };

    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}
