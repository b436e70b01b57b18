// crates/babel-daemon/src/gateway.rs
//
// WebSocket gateway: one hub subscription per socket, plus a small JSON
// command protocol routed to the Consensus Manager.
//
// Connect: `ws://host:port/?user_id=<id>` (401 without a user id).
//
// Server -> client:
//   - hub events as JSON text frames `{ "type": "CONSENSUS_UPDATE", "data": ... }`
//   - `{ "type": "RESPONSE", "request_id": ..., "data": ... }` per command
//   - `{ "type": "ERROR", "request_id": ..., "code": ..., "message": ... }`
//   - WebSocket pings as liveness probes
//
// Client -> server (any frame, including pongs, counts as a liveness ack):
//   - `{ "type": "submit_content", "content": { "text": ..., ... } }`
//   - `{ "type": "cast_vote", "content_id": ..., "vote": { "kind": ..., ... } }`
//   - `{ "type": "add_context", "parent_id": ..., "context": { "text": ..., ... } }`
//   - `{ "type": "get_content", "content_id": ... }`
//   - `{ "type": "get_user_scores", "user_id"?: ... }`
//   - `{ "type": "refresh_user_scores" }`

use std::sync::Arc;

use babel_consensus::{ConsensusManager, ContextSubmission};
use babel_core::error::BabelError;
use babel_core::{Ballot, Content};
use babel_hub::{HubHandle, Outbound};
use babel_store::InMemoryStore;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

type GatewayError = Box<dyn std::error::Error + Send + Sync>;

/// Content fields a client supplies; the author is the connection's user.
#[derive(Debug, Deserialize)]
pub struct ContentDraft {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    pub text: String,
    #[serde(default)]
    pub media_urls: Vec<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

fn default_content_type() -> String {
    "post".to_string()
}

/// Command received from a client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    SubmitContent {
        #[serde(default)]
        request_id: Option<String>,
        content: ContentDraft,
    },
    CastVote {
        #[serde(default)]
        request_id: Option<String>,
        content_id: String,
        vote: Ballot,
    },
    AddContext {
        #[serde(default)]
        request_id: Option<String>,
        parent_id: String,
        context: ContextSubmission,
    },
    GetContent {
        #[serde(default)]
        request_id: Option<String>,
        content_id: String,
    },
    GetUserScores {
        #[serde(default)]
        request_id: Option<String>,
        #[serde(default)]
        user_id: Option<String>,
    },
    RefreshUserScores {
        #[serde(default)]
        request_id: Option<String>,
    },
}

impl ClientCommand {
    fn request_id(&self) -> Option<String> {
        match self {
            ClientCommand::SubmitContent { request_id, .. }
            | ClientCommand::CastVote { request_id, .. }
            | ClientCommand::AddContext { request_id, .. }
            | ClientCommand::GetContent { request_id, .. }
            | ClientCommand::GetUserScores { request_id, .. }
            | ClientCommand::RefreshUserScores { request_id } => request_id.clone(),
        }
    }
}

/// Direct reply to a command.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerReply {
    Response {
        request_id: Option<String>,
        data: Value,
    },
    Error {
        request_id: Option<String>,
        code: &'static str,
        message: String,
    },
}

fn error_code(e: &BabelError) -> &'static str {
    match e {
        BabelError::Validation(_) => "validation",
        BabelError::NotFound(_) => "not_found",
        BabelError::Forbidden(_) => "forbidden",
        BabelError::AlreadyExists(_) => "already_exists",
        BabelError::Serialization(_) => "bad_request",
        BabelError::Timeout(_) => "timeout",
        _ => "internal",
    }
}

/// Pull `user_id` out of a query string.
fn user_id_from_query(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "user_id")
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Shared state behind every connection.
pub struct Gateway {
    manager: Arc<ConsensusManager>,
    hub: HubHandle,
    users: Arc<InMemoryStore>,
}

impl Gateway {
    pub fn new(manager: Arc<ConsensusManager>, hub: HubHandle, users: Arc<InMemoryStore>) -> Self {
        Self {
            manager,
            hub,
            users,
        }
    }

    /// Accept connections until the listener fails.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            let gateway = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = gateway.handle_connection(stream).await {
                    tracing::debug!(peer = %peer, error = %e, "Connection ended with error");
                }
            });
        }
    }

    async fn handle_connection(&self, stream: TcpStream) -> Result<(), GatewayError> {
        let mut user_id = None;
        let ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
            match user_id_from_query(req.uri().query()) {
                Some(id) => {
                    user_id = Some(id);
                    Ok(resp)
                }
                None => {
                    let mut err = ErrorResponse::new(Some("user_id is required".to_string()));
                    *err.status_mut() = StatusCode::UNAUTHORIZED;
                    Err(err)
                }
            }
        })
        .await?;
        let user_id = user_id.ok_or("handshake completed without a user id")?;

        if self.users.ensure_user(&user_id).await {
            tracing::info!(user_id = %user_id, "New user connected");
        }
        let mut subscription = self.hub.register(&user_id).await?;
        let (mut sink, mut stream) = ws.split();

        loop {
            tokio::select! {
                outbound = subscription.recv() => match outbound {
                    Some(Outbound::Event(event)) => {
                        let text = serde_json::to_string(event.as_ref())?;
                        sink.send(Message::Text(text)).await?;
                    }
                    Some(Outbound::Ping) => sink.send(Message::Ping(Vec::new())).await?,
                    None => {
                        tracing::debug!(user_id = %user_id, "Hub closed subscription");
                        break;
                    }
                },
                inbound = stream.next() => match inbound {
                    Some(Ok(message)) => {
                        subscription.ack().await?;
                        match message {
                            Message::Text(text) => {
                                let reply = self.handle_command(&user_id, &text).await;
                                sink.send(Message::Text(serde_json::to_string(&reply)?)).await?;
                            }
                            Message::Close(_) => break,
                            _ => {}
                        }
                    }
                    Some(Err(e)) => {
                        tracing::debug!(user_id = %user_id, error = %e, "Socket read failed");
                        break;
                    }
                    None => break,
                },
            }
        }

        let _ = sink.close().await;
        subscription.close().await?;
        Ok(())
    }

    /// Parse and execute one command on behalf of `user_id`.
    pub async fn handle_command(&self, user_id: &str, text: &str) -> ServerReply {
        let command: ClientCommand = match serde_json::from_str(text) {
            Ok(command) => command,
            Err(e) => {
                return ServerReply::Error {
                    request_id: None,
                    code: "bad_request",
                    message: e.to_string(),
                }
            }
        };
        let request_id = command.request_id();

        match self.execute(user_id, command).await {
            Ok(data) => ServerReply::Response { request_id, data },
            Err(e) => {
                if !e.is_validation() {
                    tracing::warn!(user_id, error = %e, "Command failed");
                }
                ServerReply::Error {
                    request_id,
                    code: error_code(&e),
                    message: e.to_string(),
                }
            }
        }
    }

    async fn execute(&self, user_id: &str, command: ClientCommand) -> Result<Value, BabelError> {
        let data = match command {
            ClientCommand::SubmitContent { content, .. } => {
                let id = content
                    .id
                    .unwrap_or_else(|| Uuid::now_v7().to_string());
                let mut draft = Content::new(id, user_id, content.content_type, content.text);
                draft.media_urls = content.media_urls;
                draft.parent_id = content.parent_id;
                serde_json::to_value(self.manager.submit(draft).await?)?
            }
            ClientCommand::CastVote {
                content_id, vote, ..
            } => serde_json::to_value(self.manager.record_vote(&content_id, user_id, vote).await?)?,
            ClientCommand::AddContext {
                parent_id, context, ..
            } => serde_json::to_value(self.manager.add_context(&parent_id, user_id, context).await?)?,
            ClientCommand::GetContent { content_id, .. } => {
                serde_json::to_value(self.manager.get(&content_id).await?)?
            }
            ClientCommand::GetUserScores {
                user_id: target, ..
            } => {
                let target = target.unwrap_or_else(|| user_id.to_string());
                serde_json::to_value(self.manager.user_scores(&target).await?)?
            }
            ClientCommand::RefreshUserScores { .. } => {
                serde_json::to_value(self.manager.refresh_user_scores(user_id).await?)?
            }
        };
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use babel_consensus::ManagerConfig;
    use babel_core::traits::AnalysisService;
    use babel_core::{BatchAnalysisRequest, BatchAnalysisResponse, UserActivityRequest, UserAnalysisResponse};
    use babel_hub::{EventHub, HubConfig};
    use std::time::Duration;
    use tokio_tungstenite::tungstenite;

    struct NoAnalysis;

    #[async_trait]
    impl AnalysisService for NoAnalysis {
        async fn analyze_batch(
            &self,
            _request: &BatchAnalysisRequest,
        ) -> Result<BatchAnalysisResponse, BabelError> {
            Ok(BatchAnalysisResponse::default())
        }

        async fn analyze_user(
            &self,
            _request: &UserActivityRequest,
        ) -> Result<UserAnalysisResponse, BabelError> {
            Ok(UserAnalysisResponse::default())
        }
    }

    async fn start() -> String {
        let store = Arc::new(InMemoryStore::new());
        let (hub, _task) = EventHub::spawn(HubConfig::default());
        let manager = Arc::new(ConsensusManager::new(
            store.clone(),
            Arc::new(NoAnalysis),
            Arc::new(hub.clone()),
            ManagerConfig::default(),
        ));
        let gateway = Arc::new(Gateway::new(manager, hub, store));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(gateway.serve(listener));
        format!("ws://{}", addr)
    }

    type Client = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    /// Connect and wait for one command round trip, which the server only
    /// answers once the connection is registered with the hub.
    async fn connect(base: &str, user: &str) -> Client {
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("{}/?user_id={}", base, user))
            .await
            .unwrap();
        ws.send(Message::Text(r#"{"type":"get_user_scores"}"#.to_string()))
            .await
            .unwrap();
        next_of_type(&mut ws, "RESPONSE").await;
        ws
    }

    /// Read text frames until one has the given `type`.
    async fn next_of_type(ws: &mut Client, kind: &str) -> Value {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => {
                        let value: Value = serde_json::from_str(&text).unwrap();
                        if value["type"] == kind {
                            return value;
                        }
                    }
                    Some(Ok(_)) => continue,
                    other => panic!("socket ended: {:?}", other),
                }
            }
        })
        .await
        .unwrap()
    }

    /// Read text frames until the reply to `request_id` arrives.
    async fn reply_to(ws: &mut Client, request_id: &str) -> Value {
        loop {
            let value = next_of_type(ws, "RESPONSE").await;
            if value["request_id"] == request_id {
                return value;
            }
        }
    }

    #[test]
    fn test_user_id_from_query() {
        assert_eq!(user_id_from_query(Some("user_id=alice")), Some("alice".to_string()));
        assert_eq!(user_id_from_query(Some("x=1&user_id=bob")), Some("bob".to_string()));
        assert_eq!(user_id_from_query(Some("user_id=")), None);
        assert_eq!(user_id_from_query(Some("uid=alice")), None);
        assert_eq!(user_id_from_query(None), None);
    }

    #[tokio::test]
    async fn test_rejects_connection_without_user() {
        let base = start().await;
        match tokio_tungstenite::connect_async(format!("{}/", base)).await {
            Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status(), StatusCode::UNAUTHORIZED),
            other => panic!("expected 401, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_submit_broadcasts_and_replies() {
        let base = start().await;
        let mut alice = connect(&base, "alice").await;
        let mut bob = connect(&base, "bob").await;

        alice
            .send(Message::Text(
                r#"{"type":"submit_content","request_id":"r1","content":{"id":"c1","text":"hello"}}"#
                    .to_string(),
            ))
            .await
            .unwrap();

        let reply = next_of_type(&mut alice, "RESPONSE").await;
        assert_eq!(reply["request_id"], "r1");
        assert_eq!(reply["data"]["author_id"], "alice");
        assert_eq!(reply["data"]["processing_status"], "pending");

        let update = next_of_type(&mut bob, "CONTENT_UPDATE").await;
        assert_eq!(update["data"]["content"]["id"], "c1");
    }

    #[tokio::test]
    async fn test_vote_notifies_author_and_rejects_bad_ballots() {
        let base = start().await;
        let mut alice = connect(&base, "alice").await;
        let mut bob = connect(&base, "bob").await;

        alice
            .send(Message::Text(
                r#"{"type":"submit_content","content":{"id":"c1","text":"hello"}}"#.to_string(),
            ))
            .await
            .unwrap();
        next_of_type(&mut alice, "RESPONSE").await;

        bob.send(Message::Text(
            r#"{"type":"cast_vote","request_id":"v0","content_id":"c1","vote":{"kind":"affirm","certainty":0}}"#
                .to_string(),
        ))
        .await
        .unwrap();
        let rejected = next_of_type(&mut bob, "ERROR").await;
        assert_eq!(rejected["code"], "validation");
        assert_eq!(rejected["request_id"], "v0");

        bob.send(Message::Text(
            r#"{"type":"cast_vote","request_id":"v1","content_id":"c1","vote":{"kind":"affirm","certainty":3}}"#
                .to_string(),
        ))
        .await
        .unwrap();
        let accepted = reply_to(&mut bob, "v1").await;
        assert_eq!(accepted["data"]["voter_id"], "bob");
        let notified = next_of_type(&mut alice, "CONTENT_VOTE").await;
        assert_eq!(notified["data"]["voter_id"], "bob");
        assert_eq!(notified["target_user_id"], "alice");

        bob.send(Message::Text(
            r#"{"type":"get_content","request_id":"g1","content_id":"c1"}"#.to_string(),
        ))
        .await
        .unwrap();
        let content = reply_to(&mut bob, "g1").await;
        let truth = content["data"]["truth_score"].as_f64().unwrap();
        assert!((truth - 1.25).abs() < 1e-6);
        assert_eq!(content["data"]["consensus"]["state"], "established");
    }

    #[tokio::test]
    async fn test_context_from_other_user_is_forbidden() {
        let base = start().await;
        let mut alice = connect(&base, "alice").await;
        let mut mallory = connect(&base, "mallory").await;

        alice
            .send(Message::Text(
                r#"{"type":"submit_content","content":{"id":"c1","text":"hello"}}"#.to_string(),
            ))
            .await
            .unwrap();
        next_of_type(&mut alice, "RESPONSE").await;

        mallory
            .send(Message::Text(
                r#"{"type":"add_context","parent_id":"c1","context":{"text":"nope"}}"#.to_string(),
            ))
            .await
            .unwrap();
        let err = next_of_type(&mut mallory, "ERROR").await;
        assert_eq!(err["code"], "forbidden");

        mallory
            .send(Message::Text("not json".to_string()))
            .await
            .unwrap();
        let err = next_of_type(&mut mallory, "ERROR").await;
        assert_eq!(err["code"], "bad_request");

        mallory
            .send(Message::Text(r#"{"type":"get_user_scores"}"#.to_string()))
            .await
            .unwrap();
        let scores = next_of_type(&mut mallory, "RESPONSE").await;
        assert_eq!(scores["data"]["user_id"], "mallory");

        mallory
            .send(Message::Text(
                r#"{"type":"refresh_user_scores","request_id":"u1"}"#.to_string(),
            ))
            .await
            .unwrap();
        let refreshed = reply_to(&mut mallory, "u1").await;
        assert_eq!(refreshed["data"]["user_id"], "mallory");
        assert_eq!(refreshed["data"]["reputation_score"], 0.0);
    }
}
