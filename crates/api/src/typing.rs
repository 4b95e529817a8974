//! Typing indicators with automatic expiry
//!
//! Each (conversation, party) pair has at most one live indicator. Starting
//! again while live re-arms the expiry timer without a second start event;
//! the timer firing emits the stop nobody sent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parley_shared::ServerEvent;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::websocket::SessionRegistry;

pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_secs(2);

/// Who is typing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypingParty {
    Agent { id: Uuid, name: String },
    Contact { id: Uuid },
}

impl TypingParty {
    fn key(&self) -> PartyKey {
        match self {
            TypingParty::Agent { id, .. } => PartyKey::Agent(*id),
            TypingParty::Contact { id } => PartyKey::Contact(*id),
        }
    }

    fn event(&self, conversation_id: Uuid, is_typing: bool) -> ServerEvent {
        match self {
            TypingParty::Agent { id, name } => ServerEvent::AgentTyping {
                conversation_id,
                agent_id: *id,
                agent_name: name.clone(),
                is_typing,
            },
            TypingParty::Contact { .. } => ServerEvent::ContactTyping {
                conversation_id,
                is_typing,
            },
        }
    }
}

/// Identity part of a party; the display name does not distinguish indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PartyKey {
    Agent(Uuid),
    Contact(Uuid),
}

struct ActiveIndicator {
    party: TypingParty,
    generation: u64,
    timer: JoinHandle<()>,
}

struct Inner {
    registry: SessionRegistry,
    timeout: Duration,
    active: Mutex<HashMap<(Uuid, PartyKey), ActiveIndicator>>,
    next_generation: AtomicU64,
}

#[derive(Clone)]
pub struct TypingCoordinator {
    inner: Arc<Inner>,
}

impl TypingCoordinator {
    pub fn new(registry: SessionRegistry, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                timeout,
                active: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Mark a party as typing. Emits a start event only on the
    /// not-typing -> typing transition; otherwise just re-arms the timer.
    pub async fn start_typing(&self, conversation_id: Uuid, party: TypingParty) {
        let key = (conversation_id, party.key());
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);

        let mut active = self.inner.active.lock().await;
        let timer = self.arm_timer(key, generation);
        match active.get_mut(&key) {
            Some(indicator) => {
                indicator.timer.abort();
                indicator.timer = timer;
                indicator.generation = generation;
            }
            None => {
                self.inner
                    .registry
                    .broadcast(conversation_id, party.event(conversation_id, true))
                    .await;
                tracing::debug!(conversation_id = %conversation_id, party = ?key.1, "Typing started");
                active.insert(
                    key,
                    ActiveIndicator {
                        party,
                        generation,
                        timer,
                    },
                );
            }
        }
    }

    /// Clear a party's indicator. A stop with no live indicator is ignored.
    pub async fn stop_typing(&self, conversation_id: Uuid, party: &TypingParty) {
        let key = (conversation_id, party.key());
        let mut active = self.inner.active.lock().await;
        if let Some(indicator) = active.remove(&key) {
            indicator.timer.abort();
            self.inner
                .registry
                .broadcast(conversation_id, indicator.party.event(conversation_id, false))
                .await;
            tracing::debug!(conversation_id = %conversation_id, party = ?key.1, "Typing stopped");
        }
    }

    /// Clear every indicator an agent holds, e.g. after their last session closed
    pub async fn clear_agent(&self, agent_id: Uuid) {
        let mut active = self.inner.active.lock().await;
        let keys: Vec<(Uuid, PartyKey)> = active
            .keys()
            .filter(|(_, party)| *party == PartyKey::Agent(agent_id))
            .copied()
            .collect();

        for key in keys {
            if let Some(indicator) = active.remove(&key) {
                indicator.timer.abort();
                self.inner
                    .registry
                    .broadcast(key.0, indicator.party.event(key.0, false))
                    .await;
            }
        }
    }

    /// Whether a party currently has a live indicator in a conversation
    pub async fn is_typing(&self, conversation_id: Uuid, party: &TypingParty) -> bool {
        self.inner
            .active
            .lock()
            .await
            .contains_key(&(conversation_id, party.key()))
    }

    fn arm_timer(&self, key: (Uuid, PartyKey), generation: u64) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.timeout).await;
            inner.expire(key, generation).await;
        })
    }
}

impl Inner {
    async fn expire(&self, key: (Uuid, PartyKey), generation: u64) {
        let mut active = self.active.lock().await;
        // A newer start may have re-armed the indicator after this timer woke
        if active.get(&key).map(|i| i.generation) != Some(generation) {
            return;
        }
        if let Some(indicator) = active.remove(&key) {
            self.registry
                .broadcast(key.0, indicator.party.event(key.0, false))
                .await;
            tracing::debug!(conversation_id = %key.0, party = ?key.1, "Typing expired");
        }
    }
}
