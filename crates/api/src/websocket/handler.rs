//! WebSocket handler for Axum
//!
//! Handles authentication at upgrade time, the per-socket read and write
//! loops, and routing of client events.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, CloseFrame, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use parley_shared::{ClientEvent, ServerEvent};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::auth::{bearer_token, AuthError, SessionContext};
use crate::state::AppState;
use crate::typing::TypingParty;

use super::connection::{Connection, DisconnectReason};

/// How long the writer gets to flush a close frame after the session ends
const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    token: Option<String>,
}

/// WebSocket handler - upgrades HTTP connection to WebSocket.
///
/// The bearer token comes from the `Authorization` header or, for browsers
/// that cannot set headers on a handshake, the `token` query parameter.
/// Credentials are checked before the upgrade headers, so an unauthenticated
/// caller always sees 401.
pub async fn ws_handler(
    State(app_state): State<AppState>,
    Query(params): Query<WebSocketQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ctx = match authenticate_upgrade(&app_state, &headers, params.token).await {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket auth failed");
            return e.into_response();
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    tracing::info!(
        user_id = %ctx.user_id,
        company_id = %ctx.company_id,
        "WebSocket connection upgrade requested"
    );

    ws.on_upgrade(move |socket| handle_socket(socket, ctx, app_state))
}

async fn authenticate_upgrade(
    app_state: &AppState,
    headers: &HeaderMap,
    query_token: Option<String>,
) -> Result<SessionContext, AuthError> {
    let token = match bearer_token(headers)? {
        Some(token) => token,
        None => query_token.ok_or(AuthError::MissingAuthorization)?,
    };
    app_state.auth.authenticate(&token).await
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, ctx: SessionContext, app_state: AppState) {
    let (sender, receiver) = socket.split();

    let (tx, rx) = mpsc::unbounded_channel::<ServerEvent>();
    let expires_in = ctx.time_to_expiry();
    let conn = app_state.registry.register(ctx, tx).await;
    let session_id = conn.session_id();
    let user_id = conn.user_id();

    let _ = conn.send(ServerEvent::Connected { session_id });

    let mut send_task = tokio::spawn(write_events(sender, rx, Arc::clone(&conn)));

    read_events(receiver, &conn, &app_state, expires_in).await;

    // Cleanup on disconnect
    if let Some(0) = app_state.registry.disconnect(session_id).await {
        app_state.typing.clear_agent(user_id).await;
    }

    if tokio::time::timeout(CLOSE_GRACE, &mut send_task).await.is_err() {
        send_task.abort();
    }
}

/// Drain the session's queue into the socket until either side closes or the
/// session is terminated. A server-side termination ends with a close frame
/// carrying the reason's code.
async fn write_events<S>(
    mut sender: S,
    mut rx: mpsc::UnboundedReceiver<ServerEvent>,
    conn: Arc<Connection>,
) where
    S: Sink<Message> + Unpin,
{
    let cancelled = conn.cancellation();
    loop {
        tokio::select! {
            biased;
            _ = cancelled.cancelled() => {
                let reason = conn
                    .disconnect_reason()
                    .unwrap_or(DisconnectReason::ClientClosed);
                if reason != DisconnectReason::ClientClosed {
                    let frame = CloseFrame {
                        code: reason.close_code(),
                        reason: Cow::Borrowed(reason.as_str()),
                    };
                    let _ = sender.send(Message::Close(Some(frame))).await;
                }
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if sender.send(Message::Text(json)).await.is_err() {
                            break; // Connection closed
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = ?e, "Failed to serialize WebSocket event");
                    }
                }
            }
        }
    }
}

/// Route client frames until the client leaves, the token expires, or the
/// session is terminated
async fn read_events<S>(
    mut receiver: S,
    conn: &Arc<Connection>,
    app_state: &AppState,
    expires_in: Duration,
) where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let session_id = conn.session_id();
    let cancelled = conn.cancellation();
    let expiry = tokio::time::sleep(expires_in);
    tokio::pin!(expiry);

    loop {
        tokio::select! {
            _ = cancelled.cancelled() => {
                tracing::info!(session_id = %session_id, "Session terminated by server");
                break;
            }
            _ = &mut expiry => {
                tracing::info!(session_id = %session_id, user_id = %conn.user_id(), "Session token expired");
                conn.terminate(DisconnectReason::TokenExpired);
                break;
            }
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => handle_client_event(event, conn, app_state).await,
                    Err(e) => {
                        tracing::warn!(
                            error = ?e,
                            session_id = %session_id,
                            "Failed to parse client event"
                        );
                        let _ = conn.send(ServerEvent::Error {
                            message: "Invalid event format".to_string(),
                        });
                    }
                },
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!(session_id = %session_id, "WebSocket closed by client");
                    break;
                }
                Some(Err(e)) => {
                    tracing::debug!(error = ?e, session_id = %session_id, "WebSocket read error");
                    break;
                }
                // Axum answers pings itself; binary frames are not part of the protocol
                Some(Ok(_)) => {}
            }
        }
    }
}

/// Route one client event
async fn handle_client_event(event: ClientEvent, conn: &Arc<Connection>, app_state: &AppState) {
    match event {
        ClientEvent::JoinConversation { conversation_id } => {
            app_state.registry.join_room(conn, conversation_id).await;
        }

        ClientEvent::LeaveConversation { conversation_id } => {
            app_state.registry.leave_room(conn, conversation_id).await;
        }

        ClientEvent::TypingStart { conversation_id } => {
            if !conn.is_member(conversation_id).await {
                tracing::warn!(
                    session_id = %conn.session_id(),
                    conversation_id = %conversation_id,
                    "Typing event for a conversation the session has not joined"
                );
                return;
            }
            app_state
                .typing
                .start_typing(conversation_id, agent_party(conn))
                .await;
        }

        ClientEvent::TypingStop { conversation_id } => {
            if conn.is_member(conversation_id).await {
                app_state
                    .typing
                    .stop_typing(conversation_id, &agent_party(conn))
                    .await;
            }
        }

        ClientEvent::PresencePing {} => {
            app_state.presence.heartbeat(conn.user_id()).await;
        }
    }
}

fn agent_party(conn: &Connection) -> TypingParty {
    TypingParty::Agent {
        id: conn.user_id(),
        name: conn.ctx.name.clone(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::config::Config;
    use crate::dispatcher::LoggingChannel;
    use crate::store::{ConversationStore, InMemoryStore};
    use crate::websocket::connection::tests::context;
    use axum::http::{header::AUTHORIZATION, HeaderValue};
    use parley_shared::Conversation;
    use uuid::Uuid;

    const SECRET: &str = "handler-test-secret-that-is-long-enough";

    struct Session {
        state: AppState,
        conversation: Conversation,
        conn: Arc<Connection>,
        rx: mpsc::UnboundedReceiver<ServerEvent>,
    }

    impl Session {
        fn events(&mut self) -> Vec<ServerEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.rx.try_recv() {
                events.push(event);
            }
            events
        }
    }

    async fn session() -> Session {
        let store = Arc::new(InMemoryStore::new());
        let state = AppState::new(
            Config::for_tests(SECRET),
            store.clone(),
            Arc::new(LoggingChannel),
        );
        let conversation = Conversation::new(Uuid::new_v4(), Uuid::new_v4());
        store.insert_conversation(&conversation).await.unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        let conn = state
            .registry
            .register(context(conversation.company_id, Uuid::new_v4()), tx)
            .await;

        Session {
            state,
            conversation,
            conn,
            rx,
        }
    }

    /// A second session in the same company that has joined the conversation
    async fn watcher(s: &Session) -> (Arc<Connection>, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = s
            .state
            .registry
            .register(context(s.conversation.company_id, Uuid::new_v4()), tx)
            .await;
        assert!(s.state.registry.join_room(&conn, s.conversation.id).await);
        while rx.try_recv().is_ok() {}
        (conn, rx)
    }

    fn frame(event: serde_json::Value) -> Result<Message, axum::Error> {
        Ok(Message::Text(event.to_string()))
    }

    #[tokio::test]
    async fn test_upgrade_auth_prefers_header_then_query() {
        let s = session().await;
        let (token, jti) = s
            .state
            .auth
            .jwt()
            .generate_access_token(Uuid::new_v4(), Uuid::new_v4(), Role::Agent, "Dana")
            .unwrap();

        let empty = HeaderMap::new();
        assert!(matches!(
            authenticate_upgrade(&s.state, &empty, None).await,
            Err(AuthError::MissingAuthorization)
        ));

        let ctx = authenticate_upgrade(&s.state, &empty, Some(token.clone()))
            .await
            .unwrap();
        assert_eq!(ctx.token_id, jti);

        // A bad header is not rescued by a good query token
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer garbage"));
        assert!(matches!(
            authenticate_upgrade(&s.state, &headers, Some(token)).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_join_then_typing_reaches_room() {
        let mut s = session().await;
        let (_watcher, mut watcher_rx) = watcher(&s).await;

        let join = ClientEvent::JoinConversation {
            conversation_id: s.conversation.id,
        };
        handle_client_event(join, &s.conn, &s.state).await;
        assert!(s.conn.is_member(s.conversation.id).await);
        s.events();

        let start = ClientEvent::TypingStart {
            conversation_id: s.conversation.id,
        };
        handle_client_event(start, &s.conn, &s.state).await;

        let expected = ServerEvent::AgentTyping {
            conversation_id: s.conversation.id,
            agent_id: s.conn.user_id(),
            agent_name: "Dana".to_string(),
            is_typing: true,
        };
        assert_eq!(watcher_rx.try_recv().unwrap(), expected);

        let leave = ClientEvent::LeaveConversation {
            conversation_id: s.conversation.id,
        };
        handle_client_event(leave, &s.conn, &s.state).await;
        assert!(!s.conn.is_member(s.conversation.id).await);
    }

    #[tokio::test]
    async fn test_typing_without_membership_is_dropped() {
        let s = session().await;
        let (_watcher, mut watcher_rx) = watcher(&s).await;

        for event in [
            ClientEvent::TypingStart {
                conversation_id: s.conversation.id,
            },
            ClientEvent::TypingStop {
                conversation_id: s.conversation.id,
            },
        ] {
            handle_client_event(event, &s.conn, &s.state).await;
        }

        assert!(watcher_rx.try_recv().is_err());
        assert!(
            !s.state
                .typing
                .is_typing(s.conversation.id, &agent_party(&s.conn))
                .await
        );
    }

    #[tokio::test]
    async fn test_join_of_foreign_conversation_is_refused() {
        let s = session().await;
        let foreign = Conversation::new(Uuid::new_v4(), Uuid::new_v4());
        s.state.store.insert_conversation(&foreign).await.unwrap();

        let join = ClientEvent::JoinConversation {
            conversation_id: foreign.id,
        };
        handle_client_event(join, &s.conn, &s.state).await;
        assert!(!s.conn.is_member(foreign.id).await);
    }

    #[tokio::test]
    async fn test_presence_ping_marks_online() {
        let s = session().await;
        s.state.presence.recompute(s.conn.user_id()).await;
        assert!(!s.state.presence.is_online(s.conn.user_id()).await);

        handle_client_event(ClientEvent::PresencePing {}, &s.conn, &s.state).await;
        assert!(s.state.presence.is_online(s.conn.user_id()).await);
    }

    #[tokio::test]
    async fn test_read_loop_routes_frames_until_close() {
        let mut s = session().await;
        let frames = futures::stream::iter(vec![
            frame(serde_json::json!({
                "event": "conversation:join",
                "data": { "conversationId": s.conversation.id },
            })),
            Ok(Message::Text("not json".to_string())),
            Ok(Message::Close(None)),
            frame(serde_json::json!({ "event": "presence:ping", "data": {} })),
        ]);

        read_events(frames, &s.conn, &s.state, Duration::from_secs(3600)).await;

        assert!(s.conn.is_member(s.conversation.id).await);
        assert!(s
            .events()
            .iter()
            .any(|e| matches!(e, ServerEvent::Error { .. })));
        assert!(!s.conn.is_terminated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_loop_ends_session_at_token_expiry() {
        let s = session().await;

        read_events(
            futures::stream::pending(),
            &s.conn,
            &s.state,
            Duration::from_secs(30),
        )
        .await;

        assert_eq!(
            s.conn.disconnect_reason(),
            Some(DisconnectReason::TokenExpired)
        );
    }

    #[tokio::test]
    async fn test_read_loop_stops_when_revoked() {
        let s = session().await;
        s.conn.terminate(DisconnectReason::Revoked);

        read_events(
            futures::stream::pending(),
            &s.conn,
            &s.state,
            Duration::from_secs(3600),
        )
        .await;

        assert_eq!(s.conn.disconnect_reason(), Some(DisconnectReason::Revoked));
    }

    /// Frames the writer emits for one queued event followed by `reason`
    async fn written_after(reason: DisconnectReason) -> Vec<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Connection::new(
            context(Uuid::new_v4(), Uuid::new_v4()),
            tx,
        ));
        conn.send(ServerEvent::Connected {
            session_id: conn.session_id(),
        })
        .unwrap();

        let (sink, mut frames) = futures::channel::mpsc::unbounded::<Message>();
        let writer = tokio::spawn(write_events(sink, rx, Arc::clone(&conn)));

        let mut written = vec![frames.next().await.unwrap()];
        conn.terminate(reason);
        writer.await.unwrap();
        written.extend(frames.collect::<Vec<_>>().await);
        written
    }

    fn close_code(frames: &[Message]) -> Option<u16> {
        match frames.last() {
            Some(Message::Close(Some(frame))) => Some(frame.code),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_writer_sends_close_code_on_revoke() {
        let frames = written_after(DisconnectReason::Revoked).await;
        assert!(matches!(&frames[0], Message::Text(text) if text.contains("connected")));
        assert_eq!(close_code(&frames), Some(4003));
    }

    #[tokio::test]
    async fn test_writer_sends_close_code_on_expiry() {
        let frames = written_after(DisconnectReason::TokenExpired).await;
        assert_eq!(close_code(&frames), Some(4001));
    }

    #[tokio::test]
    async fn test_writer_ends_quietly_on_client_close() {
        let frames = written_after(DisconnectReason::ClientClosed).await;
        assert_eq!(close_code(&frames), None);
    }
}
