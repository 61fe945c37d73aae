//! Built-in channel-node variants for the host models.
//!
//! Each variant recognizes one host source type, decodes the channel
//! string, and attaches exactly the host listeners the channel needs.

pub mod config;
pub mod packages;
pub mod workspace;

pub use config::ConfigChannelNode;
pub use packages::PackageChannelNode;
pub use workspace::WorkspaceChannelNode;

use crate::deps::{CallbackError, ChannelFirer};
use serde_json::Value;

/// Fires a node's channel from inside a host listener.
pub(crate) fn relay(firer: &ChannelFirer, args: &[Value]) -> Result<(), CallbackError> {
    firer
        .fire(args)
        .map(|_| ())
        .map_err(CallbackError::from_error)
}
