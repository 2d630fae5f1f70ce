use serde::{Deserialize, Serialize};

/// The only payment-processor event type that moves money for us.
pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

/// Payment-processor webhook event, as delivered.
///
/// Every field is optional: a payload that does not look like a completed
/// checkout is acknowledged and ignored rather than rejected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub data: Option<WebhookEventData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEventData {
    pub object: Option<CheckoutSession>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutSession {
    pub client_reference_id: Option<String>,
    pub payment_status: Option<String>,
    pub status: Option<String>,
}

impl CheckoutSession {
    pub fn is_settled(&self) -> bool {
        self.payment_status.as_deref() == Some("paid") || self.status.as_deref() == Some("complete")
    }
}

impl WebhookEvent {
    /// Order reference carried by a settled `checkout.session.completed`
    /// event. `None` for every other event, or when the reference is missing
    /// or payment has not settled.
    pub fn settled_reference(&self) -> Option<&str> {
        if self.event_type.as_deref() != Some(CHECKOUT_SESSION_COMPLETED) {
            return None;
        }
        let session = self.data.as_ref()?.object.as_ref()?;
        if !session.is_settled() {
            return None;
        }
        session
            .client_reference_id
            .as_deref()
            .filter(|reference| !reference.is_empty())
    }
}

/// Acknowledgement returned to the payment processor for every delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ignored: bool,
}

impl WebhookAck {
    pub fn received() -> Self {
        Self { received: true, ignored: false }
    }

    pub fn ignored() -> Self {
        Self { received: true, ignored: true }
    }
}
