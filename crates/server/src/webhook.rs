use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Router,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{info, warn};

use orderdesk_whatsapp::{
    parse_webhook, verify_handshake, verify_signature, EventContext, EventDispatcher,
    SIGNATURE_HEADER,
};

#[derive(Clone)]
pub struct WebhookState {
    pub dispatcher: Arc<EventDispatcher>,
    pub verify_token: SecretString,
    pub app_secret: Option<SecretString>,
}

#[derive(Debug, Deserialize, Default)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

pub fn router(state: WebhookState) -> Router {
    Router::new().route("/webhook", get(verify).post(receive)).with_state(state)
}

async fn verify(
    State(state): State<WebhookState>,
    Query(query): Query<VerifyQuery>,
) -> (StatusCode, String) {
    match verify_handshake(
        query.mode.as_deref(),
        query.verify_token.as_deref(),
        query.challenge.as_deref(),
        state.verify_token.expose_secret(),
    ) {
        Some(challenge) => {
            info!(event_name = "ingress.webhook.verified", "webhook subscription verified");
            (StatusCode::OK, challenge)
        }
        None => {
            warn!(event_name = "ingress.webhook.verify_rejected", "webhook verification failed");
            (StatusCode::FORBIDDEN, "Verification failed".to_string())
        }
    }
}

async fn receive(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let correlation_id = uuid::Uuid::new_v4().to_string();

    if let Some(app_secret) = &state.app_secret {
        let header = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());
        if let Err(error) = verify_signature(app_secret.expose_secret().as_bytes(), &body, header) {
            warn!(
                event_name = "ingress.webhook.rejected",
                correlation_id = %correlation_id,
                error = %error,
                "webhook signature check failed"
            );
            return (StatusCode::UNAUTHORIZED, "Invalid signature");
        }
    }

    let events = match parse_webhook(&body) {
        Ok(events) => events,
        Err(error) => {
            warn!(
                event_name = "ingress.webhook.rejected",
                correlation_id = %correlation_id,
                error = %error,
                "webhook payload is malformed"
            );
            return (StatusCode::BAD_REQUEST, "Malformed payload");
        }
    };

    info!(
        event_name = "ingress.webhook.received",
        correlation_id = %correlation_id,
        events = events.len(),
        "webhook received"
    );
    let ctx = EventContext { correlation_id };
    drop(state.dispatcher.spawn_all(events, &ctx));

    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use orderdesk_core::channel::InboundEvent;
    use orderdesk_whatsapp::{
        EventContext, EventDispatcher, EventHandlerError, TextMessageHandler, TextMessageService,
        SIGNATURE_HEADER,
    };

    use super::{router, WebhookState};

    type TestResult<T = ()> = Result<T, String>;

    const PAYLOAD: &str = r#"{"object":"whatsapp_business_account","entry":[{"changes":[{"value":{"messages":[{"from":"5511988887777","id":"wamid.A","type":"text","text":{"body":"quero cafe"}}]}}]}]}"#;

    struct ForwardingService {
        tx: mpsc::UnboundedSender<InboundEvent>,
    }

    #[async_trait]
    impl TextMessageService for ForwardingService {
        async fn handle_text(
            &self,
            event: &InboundEvent,
            _ctx: &EventContext,
        ) -> Result<(), EventHandlerError> {
            self.tx
                .send(event.clone())
                .map_err(|error| EventHandlerError::TextMessage(error.to_string()))
        }
    }

    fn app(app_secret: Option<&str>) -> (Router, mpsc::UnboundedReceiver<InboundEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(TextMessageHandler::new(ForwardingService { tx }));
        let state = WebhookState {
            dispatcher: Arc::new(dispatcher),
            verify_token: "verify-me".to_string().into(),
            app_secret: app_secret.map(|secret| secret.to_string().into()),
        };
        (router(state), rx)
    }

    fn signature(secret: &str, body: &str) -> TestResult<String> {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .map_err(|error| error.to_string())?;
        mac.update(body.as_bytes());
        let hex = mac
            .finalize()
            .into_bytes()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>();
        Ok(format!("sha256={hex}"))
    }

    fn post(body: &str, signature: Option<String>) -> TestResult<Request<Body>> {
        let mut builder = Request::builder().method("POST").uri("/webhook");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(body.to_string())).map_err(|error| error.to_string())
    }

    #[tokio::test]
    async fn verification_echoes_challenge_or_forbids() -> TestResult {
        let (app, _rx) = app(None);

        let ok = Request::builder()
            .uri("/webhook?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=42")
            .body(Body::empty())
            .map_err(|error| error.to_string())?;
        let response = app.clone().oneshot(ok).await.map_err(|error| error.to_string())?;
        if response.status() != StatusCode::OK {
            return Err(format!("expected 200, got {}", response.status()));
        }
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|error| error.to_string())?;
        if body.as_ref() != b"42" {
            return Err("challenge should be echoed".to_string());
        }

        let bad = Request::builder()
            .uri("/webhook?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=42")
            .body(Body::empty())
            .map_err(|error| error.to_string())?;
        let response = app.oneshot(bad).await.map_err(|error| error.to_string())?;
        if response.status() != StatusCode::FORBIDDEN {
            return Err(format!("expected 403, got {}", response.status()));
        }
        Ok(())
    }

    #[tokio::test]
    async fn signed_payload_is_accepted_and_dispatched() -> TestResult {
        let (app, mut rx) = app(Some("app-secret"));

        let request = post(PAYLOAD, Some(signature("app-secret", PAYLOAD)?))?;
        let response = app.oneshot(request).await.map_err(|error| error.to_string())?;
        if response.status() != StatusCode::OK {
            return Err(format!("expected 200, got {}", response.status()));
        }

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .map_err(|_| "event was not dispatched".to_string())?
            .ok_or_else(|| "dispatcher channel closed".to_string())?;
        if event != InboundEvent::text("5511988887777", "wamid.A", "quero cafe") {
            return Err(format!("unexpected event: {event:?}"));
        }
        Ok(())
    }

    #[tokio::test]
    async fn bad_signature_is_unauthorized() -> TestResult {
        let (app, mut rx) = app(Some("app-secret"));

        for signature in [None, Some(signature("other-secret", PAYLOAD)?)] {
            let response = app
                .clone()
                .oneshot(post(PAYLOAD, signature)?)
                .await
                .map_err(|error| error.to_string())?;
            if response.status() != StatusCode::UNAUTHORIZED {
                return Err(format!("expected 401, got {}", response.status()));
            }
        }
        if rx.try_recv().is_ok() {
            return Err("rejected payloads must not be dispatched".to_string());
        }
        Ok(())
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() -> TestResult {
        let (app, _rx) = app(None);

        let response =
            app.oneshot(post("{not json", None)?).await.map_err(|error| error.to_string())?;
        if response.status() != StatusCode::BAD_REQUEST {
            return Err(format!("expected 400, got {}", response.status()));
        }
        Ok(())
    }
}
