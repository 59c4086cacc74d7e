//! REST adapter for usherd's external scheduler
//!
//! Maps the two scheduler operations onto a small HTTP API:
//! - `PUT {base_url}/schedules/{name}` creates or replaces a trigger
//! - `DELETE {base_url}/schedules/{name}` removes one (404 counts as success)

mod client;

pub use client::*;
