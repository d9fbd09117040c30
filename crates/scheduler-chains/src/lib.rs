//! Chain handles for the scheduler.
//!
//! - `registry`: explicitly opened chain handles, looked up by name, closed
//!   together on shutdown
//! - `implementations`: concrete `ChainClient`s; currently an in-memory chain
//!   that models the pallets the scheduler touches

pub mod implementations;
pub mod registry;

pub use implementations::memory::InMemoryChain;
pub use registry::ChainRegistry;
