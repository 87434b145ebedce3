//! Hot reload actor system.
//!
//! ```text
//! FsActor → BuildActor → pipeline → event bus → bridge → HubActor → clients
//! ```

pub mod build;
mod coordinator;
pub mod fs;
pub mod messages;
pub mod ws;

pub use coordinator::Coordinator;
