//! Listener wrapper with observable bind state and forced shutdown.

use crate::{ConnectionRegistry, ListenerError, ListenerResult};

use std::future::Future;
use std::net::SocketAddr;
use std::panic::Location;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use error_location::ErrorLocation;
use log::{debug, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, watch};

/// A TCP listener whose bind is observable and whose shutdown is forced.
///
/// Cloning yields another handle to the same listener, so one task can run
/// the accept loop while another calls [`force_shutdown`](Self::force_shutdown).
#[derive(Clone)]
pub struct ShutdownableListener {
    inner: Arc<ListenerInner>,
}

struct ListenerInner {
    opening: AtomicBool,
    closed: AtomicBool,
    listener: Mutex<Option<TcpListener>>,
    local_addr: OnceLock<SocketAddr>,
    registry: ConnectionRegistry,
    shutdown_tx: watch::Sender<bool>,
}

/// Conversion into a [`ShutdownableListener`].
///
/// Wrapping is idempotent: an already wrapped listener converts to itself.
pub trait IntoShutdownable {
    fn into_shutdownable(self) -> ShutdownableListener;
}

impl IntoShutdownable for ShutdownableListener {
    fn into_shutdownable(self) -> ShutdownableListener {
        self
    }
}

impl IntoShutdownable for TcpListener {
    fn into_shutdownable(self) -> ShutdownableListener {
        let wrapped = ShutdownableListener::new();
        if let Ok(addr) = self.local_addr() {
            let _ = wrapped.inner.local_addr.set(addr);
        }
        // Fresh wrapper, nobody else can hold the lock yet
        if let Ok(mut slot) = wrapped.inner.listener.try_lock() {
            *slot = Some(self);
        }
        wrapped
    }
}

/// Keeps `opening` raised for as long as a bind attempt is alive.
struct OpeningGuard {
    inner: Arc<ListenerInner>,
}

impl OpeningGuard {
    fn enter(inner: &Arc<ListenerInner>) -> Self {
        inner.opening.store(true, Ordering::SeqCst);
        Self {
            inner: Arc::clone(inner),
        }
    }
}

impl Drop for OpeningGuard {
    fn drop(&mut self) {
        self.inner.opening.store(false, Ordering::SeqCst);
    }
}

impl Default for ShutdownableListener {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownableListener {
    /// Create an unbound listener; bind it with [`listen`](Self::listen).
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            inner: Arc::new(ListenerInner {
                opening: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                listener: Mutex::new(None),
                local_addr: OnceLock::new(),
                registry: ConnectionRegistry::new(),
                shutdown_tx,
            }),
        }
    }

    /// Wrap an existing listener. Wrapping a wrapped listener is a no-op.
    pub fn wrap<L: IntoShutdownable>(listener: L) -> Self {
        listener.into_shutdownable()
    }

    /// Bind to `addr`.
    ///
    /// `is_opening()` reports true from this call until the returned future
    /// resolves (or is dropped), even before the future is first polled.
    pub fn listen(
        &self,
        addr: SocketAddr,
    ) -> impl Future<Output = ListenerResult<SocketAddr>> + Send + 'static {
        let inner = Arc::clone(&self.inner);
        let opening = OpeningGuard::enter(&inner);

        async move {
            let _opening = opening;

            if inner.closed.load(Ordering::SeqCst) {
                return Err(ListenerError::Closed {
                    location: ErrorLocation::from(Location::caller()),
                });
            }

            let mut slot = inner.listener.lock().await;
            if slot.is_some() {
                return Err(ListenerError::AlreadyListening {
                    location: ErrorLocation::from(Location::caller()),
                });
            }

            let listener = TcpListener::bind(addr)
                .await
                .map_err(|source| ListenerError::Bind {
                    addr,
                    source,
                    location: ErrorLocation::from(Location::caller()),
                })?;

            let local = listener.local_addr()?;
            let _ = inner.local_addr.set(local);
            *slot = Some(listener);

            info!("Listening on {local}");
            Ok(local)
        }
    }

    /// True while a bind started by [`listen`](Self::listen) is in progress.
    pub fn is_opening(&self) -> bool {
        self.inner.opening.load(Ordering::SeqCst)
    }

    /// True once [`force_shutdown`](Self::force_shutdown) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Address the listener was bound to, if it ever was.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr.get().copied()
    }

    /// Number of accepted connections that are still open.
    pub async fn connection_count(&self) -> usize {
        self.inner.registry.count().await
    }

    /// Accept connections until shutdown, serving each one in a tracked task.
    ///
    /// A shutdown that lands before the accept loop starts ends it cleanly.
    pub async fn run<H, Fut>(&self, handler: H) -> ListenerResult<()>
    where
        H: Fn(TcpStream, SocketAddr) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown_rx = self.inner.shutdown_tx.subscribe();
        let slot = self.inner.listener.lock().await;

        let Some(listener) = slot.as_ref() else {
            if self.is_closed() {
                debug!("Listener already shut down, nothing to accept");
                return Ok(());
            }
            return Err(ListenerError::NotListening {
                location: ErrorLocation::from(Location::caller()),
            });
        };

        loop {
            tokio::select! {
                _ = async { let _ = shutdown_rx.wait_for(|closed| *closed).await; } => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        self.inner.registry.track(handler(stream, peer)).await;
                    }
                    Err(e) => warn!("Failed to accept connection: {e}"),
                },
            }
        }

        Ok(())
    }

    /// Destroy every open connection, then close the listener.
    ///
    /// Does not wait for connections to finish on their own. Resolves once the
    /// listener socket is closed; later calls resolve immediately.
    pub async fn force_shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inner.shutdown_tx.send_replace(true);

        // The accept loop holds the lock until it observes the shutdown flag.
        let listener = self.inner.listener.lock().await.take();
        let destroyed = self.inner.registry.destroy_all().await;
        drop(listener);

        info!("Listener shut down ({destroyed} connection(s) destroyed)");
    }

    /// Wait for SIGINT or SIGTERM, then force the listener down.
    pub async fn shutdown_on_signal(&self) -> ListenerResult<()> {
        wait_for_termination_signal().await?;
        info!("Termination signal received, forcing listener shutdown");
        self.force_shutdown().await;
        Ok(())
    }
}

#[cfg(unix)]
async fn wait_for_termination_signal() -> ListenerResult<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = terminate.recv() => {}
        _ = interrupt.recv() => {}
    }

    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_termination_signal() -> ListenerResult<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
