//! Dependency/event notification core.
//!
//! A [`DependentsGraph`] records "target depends on channel C of source",
//! fires those relationships when the source changes, and tears them down
//! when either side is destroyed.

pub mod dependent;
pub mod error;
pub mod graph;
pub mod node;

pub use dependent::{CallbackResult, DepCallback, DepEvent, Dependent};
pub use error::{CallbackError, DepsError};
pub use graph::{deps, DependentsGraph, WeakGraph};
pub use node::{
    ChannelFirer, ChannelNode, ChannelNodeHandle, ChannelNodeVariant, DefaultChannelNode,
    NodeWiring,
};
