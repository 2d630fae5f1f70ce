use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use zip_db::Database;
use zip_db::models::{NewProperty, NewUser, Proximity};
use zip_types::models::{PropertyType, UserRole};

use crate::auth::create_token;
use crate::routes::router;
use crate::state::{AppState, AppStateInner, CheckoutConfig};
use crate::storage::{SignedUpload, UploadSigner};

const TEST_JWT_SECRET: &str = "test-jwt-secret";

pub struct FakeStorage;

#[async_trait]
impl UploadSigner for FakeStorage {
    async fn create_signed_upload_url(&self, path: &str) -> anyhow::Result<SignedUpload> {
        Ok(SignedUpload { path: path.to_string(), token: "test-token".to_string() })
    }

    fn public_url(&self, path: &str) -> String {
        format!("https://storage.test/{}", path)
    }
}

/// The full router over an in-memory database.
pub struct TestApp {
    pub state: AppState,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_checkout(CheckoutConfig::default())
    }

    pub fn with_checkout(checkout: CheckoutConfig) -> Self {
        let state = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            jwt_secret: TEST_JWT_SECRET.to_string(),
            checkout,
            storage: Box::new(FakeStorage),
        });
        let router = router(state.clone());
        Self { state, router }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&value).unwrap())
            }
            None => Body::empty(),
        };

        self.dispatch(builder.body(body).unwrap()).await
    }

    /// Send raw bytes as JSON with extra headers.
    pub async fn send_raw(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: Vec<u8>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        self.dispatch(builder.body(Body::from(body)).unwrap()).await
    }

    async fn dispatch(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();

        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }
}

/// Insert a renter named "Test User" and mint a token for them. Skips
/// password hashing.
pub fn register(app: &TestApp, email: &str) -> (String, String) {
    let id = Uuid::new_v4();
    let inserted = app
        .state
        .db
        .create_user(&NewUser {
            id: &id.to_string(),
            email,
            password_hash: "unused",
            role: UserRole::Renter,
            name: Some("Test User"),
        })
        .unwrap();
    assert!(inserted, "{} already registered", email);

    let token = create_token(&app.state.jwt_secret, id, email).unwrap();
    (id.to_string(), token)
}

/// A studio near UofT, inserted directly.
pub fn seed_property(app: &TestApp, owner_id: &str, city: &str, price: f64) -> String {
    let id = Uuid::new_v4().to_string();
    app.state
        .db
        .create_property(&NewProperty {
            id: id.clone(),
            owner_id: owner_id.to_string(),
            title: "Studio near campus".to_string(),
            description: "Furnished studio, five minutes from the library.".to_string(),
            property_type: PropertyType::Studio,
            address: "100 College St".to_string(),
            city: city.to_string(),
            province: "ON".to_string(),
            postal_code: "M5G 1L5".to_string(),
            latitude: 43.6603,
            longitude: -79.3883,
            size: 38.0,
            bedrooms: 0,
            bathrooms: 1.0,
            max_occupants: 1,
            price,
            currency: "CAD".to_string(),
            utilities_included: true,
            images: vec!["https://cdn.test/studio.jpg".to_string()],
            videos: vec![],
            virtual_tour: None,
            amenities: json!({ "wifi": true }),
            nearby: vec![Proximity { university_id: "seed-uoft".to_string(), distance_km: 0.8 }],
        })
        .unwrap();
    id
}

/// Request body for `POST /properties`.
pub fn property_body(city: &str, price: f64) -> Value {
    json!({
        "title": "Bright studio near campus",
        "description": "South-facing studio with a desk and fast wifi.",
        "type": "STUDIO",
        "address": "200 College St",
        "city": city,
        "province": "ON",
        "postalCode": "M5T 1P9",
        "latitude": 43.6590,
        "longitude": -79.3960,
        "size": 35.5,
        "bedrooms": 0,
        "bathrooms": 1.0,
        "maxOccupants": 1,
        "price": price,
        "amenities": { "wifi": true, "laundry": "shared" },
        "nearbyUniversities": [{ "universityId": "seed-uoft", "distanceKm": 0.4 }]
    })
}
