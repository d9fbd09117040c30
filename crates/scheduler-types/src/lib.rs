//! Shared types for the cross-chain task scheduler.
//!
//! Every crate in the workspace speaks in terms of these types: accounts and
//! weights, the versioned XCM structures that get SCALE encoded on the wire,
//! runtime calls, chain events, tasks, and the `ChainClient` seam through which
//! the engine reaches a chain.

pub mod account;
pub mod calls;
pub mod chain;
pub mod errors;
pub mod events;
pub mod hashing;
pub mod task;
pub mod weight;
pub mod xcm;

pub use account::*;
pub use calls::*;
pub use chain::*;
pub use errors::*;
pub use events::*;
pub use hashing::*;
pub use task::*;
pub use weight::*;
