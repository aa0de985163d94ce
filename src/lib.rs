pub mod auth;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod inspector;
pub mod reconcile;
pub mod routes;
pub mod state;
pub mod types;
pub mod webhook;
