//! Process-wide shutdown flag driven by SIGINT and SIGTERM

use crate::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::info;

struct Inner {
    requested: AtomicBool,
    notify: watch::Sender<bool>,
}

/// One-shot shutdown flag.
///
/// Set at most once and never cleared. Clones share the same flag, so the
/// signal listener, the accept loop and every connection handler observe a
/// single request.
#[derive(Clone)]
pub struct ShutdownController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ShutdownController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownController")
            .field("requested", &self.is_requested())
            .finish()
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    /// Create a controller with the flag clear
    pub fn new() -> Self {
        let (notify, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                requested: AtomicBool::new(false),
                notify,
            }),
        }
    }

    /// Set the flag. Returns `true` only for the call that set it.
    pub fn request(&self) -> bool {
        if self.inner.requested.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.notify.send_replace(true);
        true
    }

    /// Returns `true` once shutdown has been requested
    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::Acquire)
    }

    /// Listener that resolves once shutdown is requested
    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.inner.notify.subscribe(),
        }
    }

    /// Install SIGINT and SIGTERM handlers that request shutdown.
    ///
    /// The returned task ends after the first signal.
    pub fn listen_for_signals(&self) -> Result<tokio::task::JoinHandle<()>> {
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let controller = self.clone();

        Ok(tokio::spawn(async move {
            let name = tokio::select! {
                _ = interrupt.recv() => "SIGINT",
                _ = terminate.recv() => "SIGTERM",
            };
            if controller.request() {
                info!(signal = name, "Caught signal, exiting");
            }
        }))
    }
}

/// Waits for a shutdown request
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Resolve once shutdown is requested; immediately if it already was
    pub async fn wait(&mut self) {
        // The sender lives in the controller; if every controller is gone
        // nobody can request shutdown anymore.
        let closed = self.rx.wait_for(|requested| *requested).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}
