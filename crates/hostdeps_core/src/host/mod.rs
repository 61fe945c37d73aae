//! Host capability models.
//!
//! These model only the state a host service needs in order to produce
//! events; channel-node variants subscribe to them through [`Emitter`].

pub mod config;
pub mod emitter;
pub mod error;
pub mod packages;
pub mod workspace;

pub use config::ConfigStore;
pub use emitter::{Emitter, Subscription};
pub use error::HostError;
pub use packages::{PackageManager, PackageState};
pub use workspace::{ItemKind, Workspace, WorkspaceItem};
