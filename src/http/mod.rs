//! HTTP surface: router, health check and error responses

pub mod routes;

pub use routes::build_router;
