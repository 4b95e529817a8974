//! Application state shared across handlers
//!
//! Collaborators are wired explicitly here, once, and handed to the router.

use std::sync::Arc;

use crate::auth::{Authenticator, JwtManager, RevocationList};
use crate::config::Config;
use crate::dispatcher::{ChannelOutbox, ContactChannel, MessageDispatcher};
use crate::presence::PresenceTracker;
use crate::store::ConversationStore;
use crate::typing::TypingCoordinator;
use crate::websocket::SessionRegistry;

/// Lifetime of tokens minted by this process (tests and tooling only;
/// production tokens come from the platform's auth service)
const TOKEN_EXPIRY_HOURS: i64 = 24;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: Authenticator,
    pub store: Arc<dyn ConversationStore>,
    pub registry: SessionRegistry,
    pub presence: Arc<PresenceTracker>,
    pub typing: TypingCoordinator,
    pub dispatcher: Arc<MessageDispatcher>,
}

impl AppState {
    /// Wire up all components. Spawns the contact-channel worker, so it must
    /// run inside a Tokio runtime.
    pub fn new(
        config: Config,
        store: Arc<dyn ConversationStore>,
        channel: Arc<dyn ContactChannel>,
    ) -> Self {
        let auth = Authenticator::new(
            JwtManager::new(&config.jwt_secret, TOKEN_EXPIRY_HOURS),
            Arc::new(RevocationList::new()),
        );
        let presence = Arc::new(PresenceTracker::new(config.presence_timeout()));
        let registry = SessionRegistry::new(Arc::clone(&store), Arc::clone(&presence));
        let typing = TypingCoordinator::new(registry.clone(), config.typing_timeout());
        let dispatcher = Arc::new(MessageDispatcher::new(
            Arc::clone(&store),
            registry.clone(),
            ChannelOutbox::spawn(channel),
            config.idempotency_window(),
        ));

        Self {
            config: Arc::new(config),
            auth,
            store,
            registry,
            presence,
            typing,
            dispatcher,
        }
    }

    /// Authenticator for the auth middleware
    pub fn auth_state(&self) -> Authenticator {
        self.auth.clone()
    }
}
