use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LabelKey = (i64, String);

/// One async mutex per `(owner, label)`, so two runs for the same record
/// never interleave.
#[derive(Default, Clone)]
pub struct LabelLocks {
    inner: Arc<Mutex<HashMap<LabelKey, Arc<AsyncMutex<()>>>>>,
}

impl LabelLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, owner_id: i64, label: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = match self.inner.lock() {
                Ok(map) => map,
                Err(poisoned) => poisoned.into_inner(),
            };
            // Drop entries nobody holds or waits on.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(
                map.entry((owner_id, label.to_string()))
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        entry.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|map| map.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
