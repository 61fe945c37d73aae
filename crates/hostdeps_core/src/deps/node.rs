//! Channel nodes and the variant contract that wires them to host events.
//!
//! # Responsibility
//! - Own the host subscriptions for exactly one `(source, channel)` pair.
//! - Carry the default target method name used for callback-less dependents.
//! - Let pluggable variants decide how a source's channel is detected.
//!
//! # Invariants
//! - A node's wiring is disposed exactly once, when the node leaves the graph.
//! - Variants attach only the listeners their decoded channel needs.

use crate::channel::{Channel, ChannelParseError};
use crate::deps::error::DepsError;
use crate::deps::graph::WeakGraph;
use crate::disposables::Disposables;
use crate::model::{ObjectId, SourceObject};
use serde_json::Value;
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};

/// Source-side node for one `(source, channel)` key.
#[derive(Debug)]
pub struct ChannelNode {
    source: ObjectId,
    channel: Channel,
    variant: &'static str,
    disposables: Disposables,
    default_target_method: Mutex<Option<String>>,
}

impl ChannelNode {
    pub(crate) fn new(source: ObjectId, channel: Channel, variant: &'static str) -> Self {
        Self {
            source,
            channel,
            variant,
            disposables: Disposables::new(),
            default_target_method: Mutex::new(None),
        }
    }

    pub fn source(&self) -> ObjectId {
        self.source
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Name of the variant that created and wired this node.
    pub fn variant_name(&self) -> &'static str {
        self.variant
    }

    /// Registry for the host subscriptions backing this node.
    pub fn disposables(&self) -> &Disposables {
        &self.disposables
    }

    pub fn default_target_method(&self) -> Option<String> {
        self.default_target_method
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_default_target_method(&self, method: impl Into<String>) {
        *self
            .default_target_method
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(method.into());
    }
}

/// Node returned by `DependentsGraph::add`.
///
/// `is_new()` is true only on the handle returned by the call that created
/// the node; callers use it to perform one-time wiring of their own.
#[derive(Debug, Clone)]
pub struct ChannelNodeHandle {
    node: Arc<ChannelNode>,
    is_new: bool,
}

impl ChannelNodeHandle {
    pub(crate) fn new(node: Arc<ChannelNode>, is_new: bool) -> Self {
        Self { node, is_new }
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn node(&self) -> &Arc<ChannelNode> {
        &self.node
    }
}

impl Deref for ChannelNodeHandle {
    type Target = ChannelNode;

    fn deref(&self) -> &Self::Target {
        &self.node
    }
}

/// Strategy for detecting changes on one family of sources.
///
/// The graph asks registered variants in registration order and uses the
/// first whose `match_source` accepts the pair. `wire` runs once, while
/// the graph lock is held, and must not call back into the graph
/// synchronously; it should only subscribe to host events.
pub trait ChannelNodeVariant: Send + Sync {
    fn name(&self) -> &'static str;

    fn match_source(&self, source: &dyn SourceObject, channel: &Channel) -> bool;

    /// Attaches host listeners for `wiring.channel()`.
    ///
    /// Returns an error when the channel cannot be served by this variant;
    /// any subscriptions added before the error are disposed by the graph.
    fn wire(&self, wiring: &NodeWiring<'_>) -> Result<(), ChannelParseError>;
}

/// Context handed to [`ChannelNodeVariant::wire`].
pub struct NodeWiring<'a> {
    source: &'a dyn SourceObject,
    node: &'a ChannelNode,
    graph: WeakGraph,
}

impl<'a> NodeWiring<'a> {
    pub(crate) fn new(source: &'a dyn SourceObject, node: &'a ChannelNode, graph: WeakGraph) -> Self {
        Self {
            source,
            node,
            graph,
        }
    }

    pub fn source(&self) -> &'a dyn SourceObject {
        self.source
    }

    pub fn channel(&self) -> &'a Channel {
        &self.node.channel
    }

    pub fn node(&self) -> &'a ChannelNode {
        self.node
    }

    /// Returns a handle host listeners use to fire this node's channel.
    pub fn firer(&self) -> ChannelFirer {
        ChannelFirer {
            graph: self.graph.clone(),
            source: self.node.source,
            channel: self.node.channel.as_str().to_string(),
        }
    }

    /// Builds the error for a channel this variant cannot serve.
    pub fn unsupported(&self, variant: &'static str, reason: impl Into<String>) -> ChannelParseError {
        ChannelParseError::Unsupported {
            variant,
            channel: self.node.channel.as_str().to_string(),
            reason: reason.into(),
        }
    }
}

/// Fires one node's channel without keeping the graph alive.
#[derive(Debug, Clone)]
pub struct ChannelFirer {
    graph: WeakGraph,
    source: ObjectId,
    channel: String,
}

impl ChannelFirer {
    /// Notifies the channel's dependents; returns how many were notified.
    ///
    /// Returns `Ok(0)` once the graph itself has been dropped.
    pub fn fire(&self, args: &[Value]) -> Result<usize, DepsError> {
        match self.graph.upgrade() {
            Some(graph) => graph.fire_by_id(self.source, &self.channel, args),
            None => Ok(0),
        }
    }
}

/// Fallback variant: no host wiring; dependents are fired manually.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultChannelNode;

impl DefaultChannelNode {
    pub const NAME: &'static str = "default";
}

impl ChannelNodeVariant for DefaultChannelNode {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn match_source(&self, _source: &dyn SourceObject, _channel: &Channel) -> bool {
        true
    }

    fn wire(&self, _wiring: &NodeWiring<'_>) -> Result<(), ChannelParseError> {
        Ok(())
    }
}
