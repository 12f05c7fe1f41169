//! Server integration tests.
//!
//! - `common` - shared helpers: in-memory server, request builders, fixtures
//! - `handlers` - HTTP handler tests driven through the router


mod handlers;
