//! Dependency/event notification core for editor-host plugins.
//!
//! Objects declare "B depends on channel C of A" in a [`DependentsGraph`];
//! the graph fires those relationships when A changes and tears them down
//! when either side is destroyed.

pub mod channel;
pub mod consumer;
pub mod deps;
pub mod disposables;
pub mod host;
pub mod logging;
pub mod model;
pub mod variants;

pub use channel::{Channel, ChannelParseError, ItemSpec, ANY_CHANNEL};
pub use consumer::{
    HostContext, Plugin, PluginError, PluginHooks, PluginRegistry, View, ViewError, ViewHooks,
    ViewOptions,
};
pub use deps::{
    deps, CallbackError, CallbackResult, ChannelNode, ChannelNodeHandle, ChannelNodeVariant,
    DepCallback, DepEvent, Dependent, DependentsGraph, DepsError,
};
pub use disposables::{Destroyable, Destroying, Disposable, Disposables, Disposing, IntoDisposable};
pub use host::{
    ConfigStore, Emitter, HostError, ItemKind, PackageManager, PackageState, Subscription,
    Workspace, WorkspaceItem,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::{ObjectId, Participant, SourceObject};
pub use variants::{ConfigChannelNode, PackageChannelNode, WorkspaceChannelNode};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
