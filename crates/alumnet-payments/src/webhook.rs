use anyhow::Result;
use serde::Deserialize;
use tracing::{info, warn};

/// Gateway webhook envelope. Payload stays untyped — the handlers below
/// acknowledge but do not act on it yet.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    PaymentCaptured,
    PaymentFailed,
    OrderPaid,
    Unknown(String),
}

impl WebhookEvent {
    pub fn parse(event: &str) -> Self {
        match event {
            "payment.captured" => WebhookEvent::PaymentCaptured,
            "payment.failed" => WebhookEvent::PaymentFailed,
            "order.paid" => WebhookEvent::OrderPaid,
            other => WebhookEvent::Unknown(other.to_string()),
        }
    }
}

/// Parse a verified raw body and dispatch on the event type. The known
/// handlers are acknowledged stubs: authenticated, logged, no side effects.
pub fn dispatch(raw_body: &[u8]) -> Result<WebhookEvent> {
    let envelope: WebhookEnvelope = serde_json::from_slice(raw_body)?;
    let event = WebhookEvent::parse(&envelope.event);

    match &event {
        WebhookEvent::PaymentCaptured => {
            info!(event = %envelope.event, "webhook: payment captured");
        }
        WebhookEvent::PaymentFailed => {
            info!(event = %envelope.event, "webhook: payment failed");
        }
        WebhookEvent::OrderPaid => {
            info!(event = %envelope.event, "webhook: order paid");
        }
        WebhookEvent::Unknown(name) => {
            warn!(event = %name, "webhook: unhandled event type");
        }
    }

    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_events_parse() {
        assert_eq!(WebhookEvent::parse("payment.captured"), WebhookEvent::PaymentCaptured);
        assert_eq!(WebhookEvent::parse("payment.failed"), WebhookEvent::PaymentFailed);
        assert_eq!(WebhookEvent::parse("order.paid"), WebhookEvent::OrderPaid);
        assert_eq!(
            WebhookEvent::parse("refund.created"),
            WebhookEvent::Unknown("refund.created".to_string())
        );
    }

    #[test]
    fn dispatch_parses_envelope() {
        let body = br#"{"event":"order.paid","payload":{"order":{"id":"order_1"}}}"#;
        assert_eq!(dispatch(body).unwrap(), WebhookEvent::OrderPaid);

        // Missing payload is fine; missing event is not.
        assert_eq!(
            dispatch(br#"{"event":"payment.failed"}"#).unwrap(),
            WebhookEvent::PaymentFailed
        );
        assert!(dispatch(br#"{"payload":{}}"#).is_err());
        assert!(dispatch(b"not json").is_err());
    }
}
