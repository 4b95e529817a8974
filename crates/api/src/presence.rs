//! Agent presence derived from heartbeats
//!
//! An agent is online while its most recent heartbeat is younger than the
//! timeout. Connection state alone never makes an agent online: an agent may
//! hold several sockets, and a socket can linger after the client stalls.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

/// Default heartbeat age after which an agent counts as offline.
/// Clients beat every ~30s, so one late beat does not flap.
pub const DEFAULT_PRESENCE_TIMEOUT: Duration = Duration::from_secs(35);

pub struct PresenceTracker {
    /// agent_id -> last heartbeat
    heartbeats: Arc<RwLock<HashMap<Uuid, Instant>>>,
    timeout: Duration,
}

impl PresenceTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            heartbeats: Arc::new(RwLock::new(HashMap::new())),
            timeout,
        }
    }

    /// Record a heartbeat for an agent at the current instant
    pub async fn heartbeat(&self, agent_id: Uuid) {
        let mut heartbeats = self.heartbeats.write().await;
        let was_online = heartbeats
            .get(&agent_id)
            .is_some_and(|last| last.elapsed() < self.timeout);
        heartbeats.insert(agent_id, Instant::now());

        if !was_online {
            tracing::debug!(agent_id = %agent_id, "Agent came online");
        }
    }

    /// Whether the agent's most recent heartbeat is younger than the timeout
    pub async fn is_online(&self, agent_id: Uuid) -> bool {
        let heartbeats = self.heartbeats.read().await;
        heartbeats
            .get(&agent_id)
            .is_some_and(|last| last.elapsed() < self.timeout)
    }

    /// Age of the agent's most recent heartbeat, if any is on record
    pub async fn last_seen(&self, agent_id: Uuid) -> Option<Duration> {
        let heartbeats = self.heartbeats.read().await;
        heartbeats.get(&agent_id).map(|last| last.elapsed())
    }

    /// Re-derive presence after the agent's last session went away.
    ///
    /// With no live session left to send heartbeats the record is dropped, so
    /// the agent reports offline immediately instead of after the timeout.
    pub async fn recompute(&self, agent_id: Uuid) {
        if self.heartbeats.write().await.remove(&agent_id).is_some() {
            tracing::debug!(agent_id = %agent_id, "Agent went offline (no live sessions)");
        }
    }

    /// Drop records that have aged past the timeout. Returns how many were removed.
    pub async fn prune(&self) -> usize {
        let mut heartbeats = self.heartbeats.write().await;
        let before = heartbeats.len();
        heartbeats.retain(|_, last| last.elapsed() < self.timeout);
        before - heartbeats.len()
    }

    /// Periodically prune stale records so the map stays bounded
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let removed = tracker.prune().await;
                if removed > 0 {
                    tracing::debug!(removed, "Pruned stale presence records");
                }
            }
        })
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_PRESENCE_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_unknown_agent_is_offline() {
        let tracker = PresenceTracker::default();
        assert!(!tracker.is_online(Uuid::new_v4()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_goes_offline_after_timeout() {
        let tracker = PresenceTracker::default();
        let agent = Uuid::new_v4();

        tracker.heartbeat(agent).await;
        assert!(tracker.is_online(agent).await);

        tokio::time::advance(Duration::from_secs(34)).await;
        assert!(tracker.is_online(agent).await);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!tracker.is_online(agent).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_at_34s_keeps_online_at_40s() {
        let tracker = PresenceTracker::default();
        let agent = Uuid::new_v4();

        tracker.heartbeat(agent).await;
        tokio::time::advance(Duration::from_secs(34)).await;
        tracker.heartbeat(agent).await;
        tokio::time::advance(Duration::from_secs(6)).await;

        assert!(tracker.is_online(agent).await);
        assert_eq!(tracker.last_seen(agent).await, Some(Duration::from_secs(6)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recompute_drops_record() {
        let tracker = PresenceTracker::default();
        let agent = Uuid::new_v4();

        tracker.heartbeat(agent).await;
        tracker.recompute(agent).await;

        assert!(!tracker.is_online(agent).await);
        assert_eq!(tracker.last_seen(agent).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_removes_only_stale() {
        let tracker = PresenceTracker::default();
        let stale = Uuid::new_v4();
        let fresh = Uuid::new_v4();

        tracker.heartbeat(stale).await;
        tokio::time::advance(Duration::from_secs(40)).await;
        tracker.heartbeat(fresh).await;

        assert_eq!(tracker.prune().await, 1);
        assert!(tracker.is_online(fresh).await);
        assert_eq!(tracker.last_seen(stale).await, None);
    }
}
