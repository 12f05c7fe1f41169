//! HTTP handlers, organized by domain:
//! - secrets: create, create many, list, get, update, update many, delete, delete many
//! - health: liveness, readiness, Prometheus scrape

pub mod health;
pub mod secrets;
