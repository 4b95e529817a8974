//! Per-conversation serialization
//!
//! Writes to one conversation run one at a time; writes to different
//! conversations do not contend. Idle locks are dropped from the table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

type LockTable = HashMap<Uuid, Arc<AsyncMutex<()>>>;

#[derive(Default)]
pub(crate) struct ConversationLocks {
    table: Mutex<LockTable>,
}

impl ConversationLocks {
    /// Wait for exclusive access to a conversation
    pub(crate) async fn acquire(&self, conversation_id: Uuid) -> ConversationGuard<'_> {
        let lock = {
            let mut table = self.table();
            Arc::clone(table.entry(conversation_id).or_default())
        };
        let guard = Arc::clone(&lock).lock_owned().await;

        ConversationGuard {
            owner: self,
            conversation_id,
            lock,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table().len()
    }

    fn table(&self) -> MutexGuard<'_, LockTable> {
        // Table updates cannot leave it inconsistent, so a poisoned lock is still usable
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub(crate) struct ConversationGuard<'a> {
    owner: &'a ConversationLocks,
    conversation_id: Uuid,
    lock: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ConversationGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut table = self.owner.table();
        // One reference in the table, one here: nobody else is waiting
        if Arc::strong_count(&self.lock) == 2 {
            table.remove(&self.conversation_id);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_conversation_is_serialized() {
        let locks = Arc::new(ConversationLocks::default());
        let id = Uuid::new_v4();

        let first = locks.acquire(id).await;
        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(first);
        contender.await.unwrap();
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_different_conversations_do_not_block() {
        let locks = ConversationLocks::default();
        let _a = locks.acquire(Uuid::new_v4()).await;
        let _b = locks.acquire(Uuid::new_v4()).await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_idle_lock_is_dropped() {
        let locks = ConversationLocks::default();
        drop(locks.acquire(Uuid::new_v4()).await);
        assert_eq!(locks.len(), 0);
    }
}
