//! Explicit execution-context binding for transactional resources.
//!
//! A [`ResourceContext`] is the key-value store a logical unit of work carries
//! around. It plays the role a thread-local resource registry plays in blocking
//! code, but it is passed explicitly, so asynchronous interleavings of different
//! units of work never observe each other's bindings.

pub mod error;
pub mod key;
pub mod resources;

pub use error::{ContextError, ContextResult};
pub use key::ResourceKey;
pub use resources::ResourceContext;
