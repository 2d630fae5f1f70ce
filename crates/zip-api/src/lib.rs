pub mod auth;
pub mod error;
pub mod health;
pub mod middleware;
pub mod properties;
pub mod routes;
pub mod signature;
pub mod state;
pub mod storage;
pub mod universities;
pub mod users;
pub mod verification;

#[cfg(test)]
mod test_support;

pub use routes::router;
pub use state::{AppState, AppStateInner, CheckoutConfig};
