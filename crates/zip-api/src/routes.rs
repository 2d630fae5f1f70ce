use axum::{
    Router, middleware,
    routing::{delete, get, patch, post},
};

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, health, properties, universities, users, verification};

/// Every API route, nested under `/api/v1`. Routes that need a user sit
/// behind the bearer-token layer; the rest are public.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .route("/auth/signup", post(auth::sign_up))
        .route("/auth/signin", post(auth::sign_in))
        .route("/properties", get(properties::list_properties))
        .route("/properties/{id}", get(properties::get_property))
        .route("/universities", get(universities::list_universities))
        .route("/universities/{id}", get(universities::get_university))
        .route("/verification/packages", get(verification::list_packages))
        .route("/verification/webhooks/stripe", post(verification::stripe_webhook))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/auth/session", get(auth::session))
        .route("/users/me", get(users::me).patch(users::update_me))
        .route("/users/me/saved", get(users::list_saved).post(users::save_property))
        .route("/users/me/saved/{property_id}", delete(users::remove_saved))
        .route("/properties", post(properties::create_property))
        .route("/properties/mine", get(properties::my_properties))
        .route("/properties/{id}", patch(properties::update_property))
        .route("/properties/{id}/upload-url", post(properties::upload_url))
        .route("/verification/orders", post(verification::create_order))
        .route("/verification/checkout-link", post(verification::create_checkout_link))
        .route("/verification/orders/me", get(verification::my_orders))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().nest("/api/v1", public_routes.merge(protected_routes))
}
