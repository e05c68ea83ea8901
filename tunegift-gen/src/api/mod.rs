//! HTTP API modules

pub mod health;
pub mod jobs;
pub mod sweep;
pub mod webhooks;

pub use health::health_routes;
pub use jobs::job_routes;
pub use sweep::sweep_routes;
pub use webhooks::webhook_routes;
