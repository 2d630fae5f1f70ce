use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use zip_db::models::{NewOrder, OrderRow};
use zip_types::api::{
    CheckoutLinkResponse, Claims, CreateOrderRequest, Envelope, OrderPropertySummary, OrderResponse, PaidOrder,
};
use zip_types::events::{WebhookAck, WebhookEvent};
use zip_types::models::{OrderStage, PACKAGE_CURRENCY, VerificationPackage, package_catalog};

use crate::error::ApiError;
use crate::signature::{self, DEFAULT_TOLERANCE_SECS, SIGNATURE_HEADER};
use crate::state::{AppState, blocking, parse_payment_link};

pub async fn list_packages() -> Json<Envelope<Vec<VerificationPackage>>> {
    Json(Envelope::ok(package_catalog()))
}

/// Records an order as paid on the spot. Only served when direct orders
/// are enabled in the server config.
pub async fn create_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.checkout.direct_orders_enabled {
        return Err(ApiError::Forbidden);
    }

    let user_id = claims.sub.to_string();
    let order = blocking(&state, move |db| {
        if !db.property_exists(&req.property_id)? {
            return Err(ApiError::NotFound("Property"));
        }

        let id = Uuid::new_v4().to_string();
        db.create_order(&NewOrder {
            id: &id,
            user_id: &user_id,
            property_id: &req.property_id,
            stage: OrderStage::Paid,
            tier: req.package_type,
            amount: req.package_type.price(),
            currency: PACKAGE_CURRENCY,
        })?;

        db.get_order(&id)?
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("order {} missing after insert", id)))
    })
    .await?;

    info!("Direct {} order {} recorded as paid", order.tier, order.id);

    Ok((StatusCode::CREATED, Json(Envelope::ok(order_response(order)))))
}

pub async fn create_checkout_link(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !req.package_type.supports_hosted_checkout() {
        return Err(ApiError::validation("Hosted checkout currently supports Standard package only"));
    }

    let order_id = Uuid::new_v4().to_string();
    let checkout_url = checkout_url(&state.checkout.payment_link, &order_id)?;

    let user_id = claims.sub.to_string();
    let id = order_id.clone();
    blocking(&state, move |db| {
        if !db.property_exists(&req.property_id)? {
            return Err(ApiError::NotFound("Property"));
        }

        db.create_order(&NewOrder {
            id: &id,
            user_id: &user_id,
            property_id: &req.property_id,
            stage: OrderStage::PendingPayment,
            tier: req.package_type,
            amount: req.package_type.price(),
            currency: PACKAGE_CURRENCY,
        })?;
        Ok(())
    })
    .await?;

    info!("Order {} awaiting hosted checkout", order_id);

    Ok((StatusCode::CREATED, Json(Envelope::ok(CheckoutLinkResponse { checkout_url, order_id }))))
}

pub async fn my_orders(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Envelope<Vec<PaidOrder>>>, ApiError> {
    let user_id = claims.sub.to_string();
    let rows = blocking(&state, move |db| Ok(db.list_paid_orders(&user_id)?)).await?;

    Ok(Json(Envelope::ok(rows.into_iter().map(paid_order).collect())))
}

/// Payment-processor callback. Every delivery that passes the signature
/// check is acknowledged, including ones that change nothing.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Envelope<WebhookAck>>, ApiError> {
    if let Some(secret) = &state.checkout.webhook_secret {
        let header = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        signature::verify(header, &body, secret, Utc::now().timestamp(), DEFAULT_TOLERANCE_SECS).map_err(|e| {
            warn!("Rejected webhook delivery: {}", e);
            ApiError::validation("Invalid webhook signature")
        })?;
    }

    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            debug!("Ignoring unparseable webhook body: {}", e);
            return Ok(Json(Envelope::ok(WebhookAck::ignored())));
        }
    };

    let Some(reference) = event.settled_reference().map(str::to_owned) else {
        debug!("Ignoring webhook event {:?}", event.event_type);
        return Ok(Json(Envelope::ok(WebhookAck::ignored())));
    };

    let order_id = reference.clone();
    let moved = blocking(&state, move |db| Ok(db.mark_order_paid(&order_id)?)).await?;
    if moved > 0 {
        info!("Order {} paid", reference);
    } else {
        info!("Webhook for order {} matched no pending order", reference);
    }

    Ok(Json(Envelope::ok(WebhookAck::received())))
}

/// Append the order reference to the hosted payment link.
fn checkout_url(payment_link: &str, order_id: &str) -> anyhow::Result<String> {
    let mut url = parse_payment_link(payment_link)?;
    url.query_pairs_mut().append_pair("client_reference_id", order_id);
    Ok(url.into())
}

fn order_response(row: OrderRow) -> OrderResponse {
    OrderResponse {
        id: row.id,
        package_type: row.tier,
        stage: row.stage,
        amount: row.amount,
        currency: row.currency,
        created_at: row.created_at,
        paid_at: row.paid_at,
        property: OrderPropertySummary {
            id: row.property_id,
            title: row.property_title,
            city: row.property_city,
            images: None,
        },
    }
}

fn paid_order(row: OrderRow) -> PaidOrder {
    PaidOrder {
        id: row.id,
        package_type: row.tier,
        amount: row.amount,
        currency: row.currency,
        status: row.stage,
        created_at: row.created_at,
        paid_at: row.paid_at,
        property: OrderPropertySummary {
            id: row.property_id,
            title: row.property_title,
            city: row.property_city,
            images: Some(row.property_images),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CheckoutConfig;
    use crate::test_support::{TestApp, register, seed_property};
    use axum::http::Method;
    use serde_json::{Value, json};

    const WEBHOOK_SECRET: &str = "whsec_test";

    fn completed(order_id: &str) -> Value {
        json!({
            "type": "checkout.session.completed",
            "data": { "object": { "client_reference_id": order_id, "payment_status": "paid" } }
        })
    }

    async fn start_checkout(app: &TestApp, token: &str, property: &str) -> String {
        let (status, body) = app
            .send(
                Method::POST,
                "/api/v1/verification/checkout-link",
                Some(token),
                Some(json!({ "propertyId": property, "packageType": "STANDARD" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"]["orderId"].as_str().unwrap().to_string()
    }

    #[test]
    fn checkout_url_appends_the_reference() {
        assert_eq!(
            checkout_url("https://buy.stripe.com/test_abc", "o-1").unwrap(),
            "https://buy.stripe.com/test_abc?client_reference_id=o-1"
        );
        assert_eq!(
            checkout_url("https://pay.example.com/link?prefilled_email=a%40b.c", "o 2").unwrap(),
            "https://pay.example.com/link?prefilled_email=a%40b.c&client_reference_id=o+2"
        );
        assert!(checkout_url("not a url", "o-1").is_err());
        assert!(checkout_url("https://", "o-1").is_err());
    }

    #[tokio::test]
    async fn packages_are_public() {
        let app = TestApp::new();
        let (status, body) = app.send(Method::GET, "/api/v1/verification/packages", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let packages = body["data"].as_array().unwrap();
        assert_eq!(packages.len(), 3);
        assert_eq!(packages[0]["packageType"], "STANDARD");
        assert_eq!(packages[0]["price"], 149);
        assert_eq!(packages[2]["currency"], "USD");
    }

    #[tokio::test]
    async fn hosted_checkout_then_webhook_marks_paid() {
        let app = TestApp::new();
        let (owner, token) = register(&app, "owner@example.com");
        let property = seed_property(&app, &owner, "Toronto", 2100.0);

        let (_, body) = app
            .send(
                Method::POST,
                "/api/v1/verification/checkout-link",
                Some(&token),
                Some(json!({ "propertyId": property, "packageType": "STANDARD" })),
            )
            .await;
        let order_id = body["data"]["orderId"].as_str().unwrap().to_string();
        assert!(
            body["data"]["checkoutUrl"]
                .as_str()
                .unwrap()
                .ends_with(&format!("client_reference_id={}", order_id))
        );

        let pending = app.state.db.get_order(&order_id).unwrap().unwrap();
        assert_eq!(pending.stage, OrderStage::PendingPayment);

        let (_, body) = app.send(Method::GET, "/api/v1/verification/orders/me", Some(&token), None).await;
        assert!(body["data"].as_array().unwrap().is_empty());

        let (status, body) = app
            .send(Method::POST, "/api/v1/verification/webhooks/stripe", None, Some(completed(&order_id)))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!({ "received": true }));

        let (_, body) = app.send(Method::GET, "/api/v1/verification/orders/me", Some(&token), None).await;
        let orders = body["data"].as_array().unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0]["id"], order_id.as_str());
        assert_eq!(orders[0]["packageType"], "STANDARD");
        assert_eq!(orders[0]["status"], "PAID");
        assert_eq!(orders[0]["amount"], 149);
        assert_eq!(orders[0]["currency"], "USD");
        assert_eq!(orders[0]["property"]["title"], "Studio near campus");

        let (_, body) = app.send(Method::GET, &format!("/api/v1/properties/{}", property), None, None).await;
        assert_eq!(body["data"]["verified"], true);
    }

    #[tokio::test]
    async fn duplicate_delivery_is_acknowledged_without_a_second_transition() {
        let app = TestApp::new();
        let (owner, token) = register(&app, "owner@example.com");
        let property = seed_property(&app, &owner, "Toronto", 2100.0);
        let order_id = start_checkout(&app, &token, &property).await;

        app.send(Method::POST, "/api/v1/verification/webhooks/stripe", None, Some(completed(&order_id)))
            .await;
        let first = app.state.db.get_order(&order_id).unwrap().unwrap();

        let (status, body) = app
            .send(Method::POST, "/api/v1/verification/webhooks/stripe", None, Some(completed(&order_id)))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["received"], true);

        let second = app.state.db.get_order(&order_id).unwrap().unwrap();
        assert_eq!(second.stage, OrderStage::Paid);
        assert_eq!(second.paid_at, first.paid_at);
    }

    #[tokio::test]
    async fn irrelevant_or_malformed_events_are_ignored() {
        let app = TestApp::new();
        let (owner, token) = register(&app, "owner@example.com");
        let property = seed_property(&app, &owner, "Toronto", 2100.0);
        let order_id = start_checkout(&app, &token, &property).await;

        let (status, body) = app
            .send(
                Method::POST,
                "/api/v1/verification/webhooks/stripe",
                None,
                Some(json!({ "type": "payment_intent.created", "data": { "object": { "client_reference_id": order_id } } })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!({ "received": true, "ignored": true }));

        let unpaid = json!({
            "type": "checkout.session.completed",
            "data": { "object": { "client_reference_id": order_id, "payment_status": "unpaid" } }
        });
        let (_, body) = app.send(Method::POST, "/api/v1/verification/webhooks/stripe", None, Some(unpaid)).await;
        assert_eq!(body["data"]["ignored"], true);

        let (status, body) = app
            .send_raw(Method::POST, "/api/v1/verification/webhooks/stripe", &[], b"not json".to_vec())
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["ignored"], true);

        let order = app.state.db.get_order(&order_id).unwrap().unwrap();
        assert_eq!(order.stage, OrderStage::PendingPayment);
    }

    #[tokio::test]
    async fn non_standard_hosted_checkout_creates_no_order() {
        let app = TestApp::new();
        let (owner, token) = register(&app, "owner@example.com");
        let property = seed_property(&app, &owner, "Toronto", 2100.0);

        let (status, body) = app
            .send(
                Method::POST,
                "/api/v1/verification/checkout-link",
                Some(&token),
                Some(json!({ "propertyId": property, "packageType": "PREMIUM" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Hosted checkout currently supports Standard package only");

        let count: i64 = app
            .state
            .db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM verification_orders", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn broken_payment_link_leaves_no_pending_order() {
        let app = TestApp::with_checkout(CheckoutConfig { payment_link: "https://".into(), ..Default::default() });
        let (owner, token) = register(&app, "owner@example.com");
        let property = seed_property(&app, &owner, "Toronto", 2100.0);

        let (status, body) = app
            .send(
                Method::POST,
                "/api/v1/verification/checkout-link",
                Some(&token),
                Some(json!({ "propertyId": property, "packageType": "STANDARD" })),
            )
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");

        let count: i64 = app
            .state
            .db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM verification_orders", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn checkout_for_unknown_property_is_not_found() {
        let app = TestApp::new();
        let (_, token) = register(&app, "owner@example.com");

        let (status, _) = app
            .send(
                Method::POST,
                "/api/v1/verification/checkout-link",
                Some(&token),
                Some(json!({ "propertyId": "missing", "packageType": "STANDARD" })),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn direct_orders_are_gated() {
        let body = |property: &str| Some(json!({ "propertyId": property, "packageType": "PREMIUM" }));

        let app = TestApp::new();
        let (owner, token) = register(&app, "owner@example.com");
        let property = seed_property(&app, &owner, "Toronto", 2100.0);
        let (status, _) = app.send(Method::POST, "/api/v1/verification/orders", Some(&token), body(&property)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let app = TestApp::with_checkout(CheckoutConfig { direct_orders_enabled: true, ..Default::default() });
        let (owner, token) = register(&app, "owner@example.com");
        let property = seed_property(&app, &owner, "Toronto", 2100.0);
        let (status, created) =
            app.send(Method::POST, "/api/v1/verification/orders", Some(&token), body(&property)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["data"]["stage"], "PAID");
        assert_eq!(created["data"]["amount"], 399);
        assert!(created["data"]["paidAt"].is_string());
        assert_eq!(created["data"]["property"]["city"], "Toronto");

        let (_, orders) = app.send(Method::GET, "/api/v1/verification/orders/me", Some(&token), None).await;
        assert_eq!(orders["data"][0]["packageType"], "PREMIUM");
    }

    #[tokio::test]
    async fn signed_webhooks_are_verified_when_a_secret_is_set() {
        let app = TestApp::with_checkout(CheckoutConfig {
            webhook_secret: Some(WEBHOOK_SECRET.to_string()),
            ..Default::default()
        });
        let (owner, token) = register(&app, "owner@example.com");
        let property = seed_property(&app, &owner, "Toronto", 2100.0);
        let order_id = start_checkout(&app, &token, &property).await;
        let payload = serde_json::to_vec(&completed(&order_id)).unwrap();
        let uri = "/api/v1/verification/webhooks/stripe";

        let (status, _) = app.send_raw(Method::POST, uri, &[], payload.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let stale = signature::sign(&payload, WEBHOOK_SECRET, Utc::now().timestamp() - 3600);
        let (status, _) = app.send_raw(Method::POST, uri, &[(SIGNATURE_HEADER, stale.as_str())], payload.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let fresh = signature::sign(&payload, WEBHOOK_SECRET, Utc::now().timestamp());
        let mut tampered = payload.clone();
        tampered.extend_from_slice(b" ");
        let (status, body) = app.send_raw(Method::POST, uri, &[(SIGNATURE_HEADER, fresh.as_str())], tampered).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid webhook signature");

        let order = app.state.db.get_order(&order_id).unwrap().unwrap();
        assert_eq!(order.stage, OrderStage::PendingPayment);

        let (status, body) = app.send_raw(Method::POST, uri, &[(SIGNATURE_HEADER, fresh.as_str())], payload).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["received"], true);

        let order = app.state.db.get_order(&order_id).unwrap().unwrap();
        assert_eq!(order.stage, OrderStage::Paid);
    }
}
