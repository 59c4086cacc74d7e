//! External scheduler trait interface for usherd
//!
//! This crate defines the narrow capability the reconciler consumes:
//! "create-or-update a named, timestamped trigger" and "delete a named
//! trigger". Besides the trait it ships a plain in-memory backend and a
//! test mock; see `usher-scheduler-http` and `usher-store` for durable ones.

mod memory;
mod mock;
mod traits;

pub use memory::*;
pub use mock::*;
pub use traits::*;
