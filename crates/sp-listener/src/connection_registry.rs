use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Live connections of one listener, keyed by a per-listener connection id.
///
/// Every connection runs in its own task. The task removes its own entry
/// when it finishes, so the map only ever holds open connections.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<Mutex<HashMap<u64, JoinHandle<()>>>>,
    next_id: Arc<AtomicU64>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `connection` as a tracked task and return its id.
    pub async fn track<F>(&self, connection: F) -> u64
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let connections = Arc::clone(&self.connections);

        // Held across the spawn so the task cannot purge itself before it is inserted.
        let mut map = self.connections.lock().await;
        let handle = tokio::spawn(async move {
            connection.await;
            connections.lock().await.remove(&id);
        });
        map.insert(id, handle);

        id
    }

    /// Number of connections that are still open.
    pub async fn count(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Destroy every tracked connection and wait until their sockets are dropped.
    pub async fn destroy_all(&self) -> usize {
        let handles: Vec<JoinHandle<()>> = {
            let mut map = self.connections.lock().await;
            map.drain().map(|(_, handle)| handle).collect()
        };

        for handle in &handles {
            handle.abort();
        }

        let destroyed = handles.len();
        for handle in handles {
            // Cancelled is the expected outcome
            let _ = handle.await;
        }

        if destroyed > 0 {
            debug!("Destroyed {destroyed} open connection(s)");
        }

        destroyed
    }
}
