//! Shutdown coordination for the balancer.
//!
//! A single [`Shutdown`] is created at startup and handed to everything that
//! runs in the background. Shutdown is requested at most once; every
//! [`ShutdownListener`] registered before that point is expected to
//! acknowledge before [`Shutdown::wait`] returns. A listener dropped without
//! acknowledging also releases `wait`, but is not counted in
//! [`Shutdown::acknowledged`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch, OwnedRwLockReadGuard, RwLock};
use tokio::time;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Coordinator for graceful shutdown.
#[derive(Debug, Clone)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    requested: AtomicBool,
    notify: watch::Sender<bool>,
    /// Held for reading by [`ShutdownLock`]s, taken for writing by `trigger`.
    locks: Arc<RwLock<()>>,
    /// Cloned into every listener; the receiver closes once all are gone.
    ack_tx: Mutex<Option<mpsc::UnboundedSender<()>>>,
    ack_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<()>>,
    acknowledged: AtomicUsize,
    timeout: Duration,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    ///
    /// `timeout` bounds how long [`Shutdown::wait`] waits for listeners.
    pub fn new(timeout: Duration) -> Self {
        let (notify, _) = watch::channel(false);
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                requested: AtomicBool::new(false),
                notify,
                locks: Arc::new(RwLock::new(())),
                ack_tx: Mutex::new(Some(ack_tx)),
                ack_rx: tokio::sync::Mutex::new(ack_rx),
                acknowledged: AtomicUsize::new(0),
                timeout,
            }),
        }
    }

    /// Register a listener that is notified when shutdown is requested.
    pub fn listener(&self) -> ShutdownListener {
        let ack = self
            .inner
            .ack_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        ShutdownListener {
            rx: self.inner.notify.subscribe(),
            ack,
        }
    }

    /// Prevent shutdown from starting while the returned guard is alive.
    ///
    /// Returns `None` if shutdown has already been requested.
    pub fn lock(&self) -> Option<ShutdownLock> {
        let guard = self.inner.locks.clone().try_read_owned().ok()?;
        if self.is_shutting_down() {
            return None;
        }
        Some(ShutdownLock { _guard: guard })
    }

    /// Whether shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Request shutdown.
    ///
    /// Waits for outstanding [`ShutdownLock`]s, then notifies every listener.
    /// Returns `false` if shutdown had already been requested.
    pub async fn trigger(&self) -> bool {
        if self.inner.requested.swap(true, Ordering::SeqCst) {
            return false;
        }

        let _exclusive = self.inner.locks.write().await;
        self.inner
            .ack_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.inner.notify.send_replace(true);
        tracing::info!("Shutdown requested");
        true
    }

    /// Wait until every registered listener has acknowledged or gone away.
    ///
    /// Returns `false` if the timeout elapsed first.
    pub async fn wait(&self) -> bool {
        let mut acks = self.inner.ack_rx.lock().await;
        let drained = async {
            while acks.recv().await.is_some() {
                self.inner.acknowledged.fetch_add(1, Ordering::SeqCst);
            }
        };
        let completed = time::timeout(self.inner.timeout, drained).await.is_ok();
        if completed {
            tracing::info!(acknowledged = self.acknowledged(), "All tasks stopped");
        } else {
            tracing::warn!(
                timeout_ms = self.inner.timeout.as_millis() as u64,
                acknowledged = self.acknowledged(),
                "Timed out waiting for tasks to acknowledge shutdown"
            );
        }
        completed
    }

    /// Number of explicit acknowledgements received by [`Shutdown::wait`].
    pub fn acknowledged(&self) -> usize {
        self.inner.acknowledged.load(Ordering::SeqCst)
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

/// A registration with the shutdown coordinator.
///
/// Dropping it without calling [`ShutdownListener::acknowledge`] cancels the
/// registration: `wait` stops waiting for it but does not count it.
#[derive(Debug)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
    ack: Option<mpsc::UnboundedSender<()>>,
}

impl ShutdownListener {
    /// Resolve once shutdown has been requested.
    ///
    /// Never resolves if the coordinator is gone without having requested it.
    pub async fn recv(&mut self) {
        let closed = self.rx.wait_for(|requested| *requested).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }

    /// Report that this task has finished shutting down.
    pub fn acknowledge(self) {
        if let Some(ack) = &self.ack {
            let _ = ack.send(());
        }
        tracing::trace!("Shutdown acknowledged");
    }
}

/// Guard returned by [`Shutdown::lock`].
#[derive(Debug)]
pub struct ShutdownLock {
    _guard: OwnedRwLockReadGuard<()>,
}
