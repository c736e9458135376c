//! Axum handlers for the bot-channel HTTP surface.
//!
//! Every inbound activity refreshes the stored conversation destination
//! before anything else happens, so relayed bus messages always follow the
//! most recent conversation context.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

use relay_core::activity::{Activity, suggested_actions_activity, welcome_activity};
use relay_core::destination::Destination;

use crate::state::AppState;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

#[derive(Serialize)]
pub struct AckResponse {
    pub delivered: bool,
}

pub enum ApiError {
    UnsupportedMediaType,
    BadRequest(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::UnsupportedMediaType => {
                let message = "Content-Type must be application/json".to_string();
                (
                    StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Receives one bot-channel activity.
///
/// Message activities are forwarded onto the bus (text, or the card submit
/// value when the user tapped a card action); the response reports whether
/// the bus accepted the frame. Conversation updates greet newly added
/// members. Every activity, whatever its kind, overwrites the stored
/// destination wholesale.
pub async fn receive_activity(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<impl IntoResponse, ApiError> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if !is_json {
        return Err(ApiError::UnsupportedMediaType);
    }

    let activity: Activity = serde_json::from_str(&body)
        .map_err(|err| ApiError::BadRequest(format!("invalid activity payload: {err}")))?;

    state
        .router
        .set_destination(Destination::from_activity(&activity))
        .await;

    if activity.is_message() {
        let delivered = match activity.outbound_text() {
            Some(text) => {
                debug!(chars = text.len(), "forwarding channel message to the bus");
                state.conn.send(&text).await.is_delivered()
            }
            None => false,
        };
        return Ok((StatusCode::CREATED, Json(AckResponse { delivered })));
    }

    if activity.is_conversation_update() {
        greet_new_members(&state, &activity).await?;
    }

    Ok((StatusCode::CREATED, Json(AckResponse { delivered: false })))
}

/// Welcomes every newly added member except the bot itself: a greeting
/// message followed by the built-in suggested prompts.
async fn greet_new_members(state: &AppState, activity: &Activity) -> Result<(), ApiError> {
    let bot_id = activity.recipient.as_ref().map(|bot| bot.id.as_str());
    let destination = Destination::from_activity(activity);

    for member in &activity.members_added {
        if Some(member.id.as_str()) == bot_id {
            continue;
        }
        info!(member = %member.id, "welcoming new conversation member");
        state
            .adapter
            .continue_conversation(&destination, welcome_activity())
            .await?;
        state
            .adapter
            .continue_conversation(&destination, suggested_actions_activity())
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::router::create_router;
    use axum::Router;
    use axum::body::Body;
    use axum::http::Request;
    use relay_core::adapter::{ConversationAdapter, RecordingAdapter};
    use relay_core::backoff::RetryPolicy;
    use relay_core::transport::{BusConnector, BusFrame, ConnectParams, LoopbackConnector};
    use relay_core::{ConnectionManager, DestinationRouter};
    use tower::ServiceExt;

    struct Harness {
        connector: Arc<LoopbackConnector>,
        adapter: Arc<RecordingAdapter>,
        state: Arc<AppState>,
        app: Router,
    }

    fn harness() -> Harness {
        let connector = Arc::new(LoopbackConnector::new());
        let adapter = Arc::new(RecordingAdapter::new());
        let conn = Arc::new(ConnectionManager::new(
            connector.clone() as Arc<dyn BusConnector>,
            RetryPolicy::default(),
            ConnectParams::default(),
        ));
        let router = Arc::new(DestinationRouter::new(
            adapter.clone() as Arc<dyn ConversationAdapter>,
        ));
        let config = Config {
            bind_address: "127.0.0.1:3978".parse().unwrap(),
            negotiate_url: "http://localhost:8080/negotiate".to_string(),
            hub: "Hub".to_string(),
            service_url: "http://localhost:3978".to_string(),
            app_id: "test-app".to_string(),
            app_password: None,
            log_level: tracing::Level::INFO,
        };
        let state = Arc::new(AppState {
            conn,
            router,
            adapter: adapter.clone() as Arc<dyn ConversationAdapter>,
            config: Arc::new(config),
        });
        Harness {
            connector,
            adapter,
            state: state.clone(),
            app: create_router(state),
        }
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/messages")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn response_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn outbound_texts(connector: &LoopbackConnector) -> Vec<BusFrame> {
        connector
            .drain_outbound()
            .await
            .into_iter()
            .filter(|frame| matches!(frame, BusFrame::Text(_)))
            .collect()
    }

    #[tokio::test]
    async fn message_text_is_forwarded_to_the_bus() {
        let h = harness();
        let body = r#"{
            "type": "message",
            "text": "Plan a weekend in Sentosa",
            "channelId": "webchat",
            "serviceUrl": "https://channel.example",
            "conversation": {"id": "conv-1"},
            "from": {"id": "user-1", "name": "Sam"},
            "recipient": {"id": "bot-1", "name": "Travel Bot"}
        }"#;

        let response = h.app.oneshot(post_json(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = response_json(response).await;
        assert_eq!(json["delivered"], true);

        assert_eq!(
            outbound_texts(&h.connector).await,
            vec![BusFrame::Text("Plan a weekend in Sentosa".into())]
        );

        // The destination now points at this conversation.
        let destination = h.state.router.current_destination().await.unwrap();
        assert_eq!(destination.conversation.id, "conv-1");
        assert_eq!(destination.user.id, "user-1");
    }

    #[tokio::test]
    async fn card_submit_value_is_forwarded_when_text_is_absent() {
        let h = harness();
        let body = r#"{
            "type": "message",
            "value": "What's the weather like in Singapore?",
            "conversation": {"id": "conv-2"},
            "from": {"id": "user-1"},
            "recipient": {"id": "bot-1"}
        }"#;

        let response = h.app.oneshot(post_json(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            outbound_texts(&h.connector).await,
            vec![BusFrame::Text(
                "What's the weather like in Singapore?".into()
            )]
        );
    }

    #[tokio::test]
    async fn wrong_content_type_is_rejected() {
        let h = harness();
        let request = Request::builder()
            .method("POST")
            .uri("/api/messages")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from(r#"{"type":"message","text":"hi"}"#))
            .unwrap();

        let response = h.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(outbound_texts(&h.connector).await.is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_a_bad_request() {
        let h = harness();
        let response = h.app.oneshot(post_json("{not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn conversation_update_greets_new_members() {
        let h = harness();
        let body = r#"{
            "type": "conversationUpdate",
            "membersAdded": [
                {"id": "bot-1", "name": "Travel Bot"},
                {"id": "user-1", "name": "Sam"}
            ],
            "conversation": {"id": "conv-3"},
            "from": {"id": "user-1"},
            "recipient": {"id": "bot-1", "name": "Travel Bot"}
        }"#;

        let response = h.app.oneshot(post_json(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        // The bot's own join is skipped; the user gets the greeting and
        // the suggested prompts.
        let deliveries = h.adapter.deliveries().await;
        assert_eq!(deliveries.len(), 2);
        assert!(deliveries[0].1.text.as_ref().unwrap().contains("Hello"));
        let actions = &deliveries[1].1.suggested_actions.as_ref().unwrap().actions;
        assert_eq!(actions.len(), 4);
    }

    #[tokio::test]
    async fn unknown_activity_kind_still_updates_the_destination() {
        let h = harness();
        let body = r#"{
            "type": "event",
            "conversation": {"id": "conv-4"},
            "from": {"id": "user-9"},
            "recipient": {"id": "bot-1"}
        }"#;

        let response = h.app.oneshot(post_json(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = response_json(response).await;
        assert_eq!(json["delivered"], false);

        let destination = h.state.router.current_destination().await.unwrap();
        assert_eq!(destination.conversation.id, "conv-4");
        assert_eq!(destination.user.id, "user-9");
    }
}
