//! Consumer bases built on the dependents graph: plugins and views.

pub mod context;
pub mod error;
pub mod plugin;
pub mod view;

pub use context::HostContext;
pub use error::{PluginError, ViewError};
pub use plugin::{Plugin, PluginHooks, PluginRegistry};
pub use view::{View, ViewHooks, ViewOptions, DESTROYED_CHANNEL};
