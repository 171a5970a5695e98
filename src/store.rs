//! Process-wide handle to the live index.
//!
//! Readers take a snapshot (`Arc<VectorIndex>`) and keep using it for the
//! whole request even if a rebuild swaps in a new index meanwhile. Rebuilds
//! are serialised and run in their own task, off the request path.

use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::{RagError, Result};
use crate::index::{build_index, VectorIndex};

type Live = RwLock<Option<Arc<VectorIndex>>>;

#[derive(Default)]
pub struct IndexStore {
    live: Arc<Live>,
    rebuild_lock: Arc<Mutex<()>>,
}

impl IndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the live index, or [`RagError::NoIndex`] before the
    /// first successful build.
    pub fn current(&self) -> Result<Arc<VectorIndex>> {
        let guard = self
            .live
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.clone().ok_or(RagError::NoIndex)
    }

    /// Swap in `index`; returns the previous one, if any.
    pub fn replace(&self, index: VectorIndex) -> Option<Arc<VectorIndex>> {
        swap(&self.live, Arc::new(index))
    }

    /// Build a new index from the data directory and make it live.
    ///
    /// The lock, the build and the swap all belong to a spawned task, so a
    /// caller that is dropped midway (a client hanging up on `/api/reload`)
    /// neither loses the swap nor lets a second rebuild overlap this one.
    /// On failure the previous index stays live.
    pub async fn rebuild(&self, config: Arc<Config>) -> Result<Arc<VectorIndex>> {
        let live = Arc::clone(&self.live);
        let lock = Arc::clone(&self.rebuild_lock);

        tokio::spawn(async move {
            let _guard = lock.lock_owned().await;
            let index = Arc::new(build_index(&config).await?);

            match swap(&live, Arc::clone(&index)) {
                Some(old) => {
                    tracing::info!(old = %old.generation, new = %index.generation, "index replaced")
                }
                None => tracing::info!(generation = %index.generation, "index initialized"),
            }
            Ok::<_, RagError>(index)
        })
        .await
        .map_err(|e| RagError::IndexInit(format!("index build task failed: {}", e)))?
    }
}

fn swap(live: &Live, next: Arc<VectorIndex>) -> Option<Arc<VectorIndex>> {
    let mut guard = live.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.replace(next)
}
