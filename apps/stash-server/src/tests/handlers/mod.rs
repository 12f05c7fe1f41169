//! HTTP handler integration tests.
//!
//! Requests go through the real router (`tower::ServiceExt::oneshot`), so
//! extractors, error mapping and middleware are all exercised.

mod secrets;
