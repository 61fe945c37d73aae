//! Channel nodes on a [`ConfigStore`]: the channel is a dotted key path.
//!
//! Listeners receive `[new, old]` whenever the value at the key changes,
//! including through writes to a parent or a child key.

use crate::channel::{Channel, ChannelParseError};
use crate::deps::{ChannelNodeVariant, NodeWiring};
use crate::host::config::{key_assign, key_lookup, ConfigStore, DID_CHANGE};
use crate::model::SourceObject;
use crate::variants::relay;
use serde_json::{Map, Value};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigChannelNode;

impl ConfigChannelNode {
    pub const NAME: &'static str = "config";
    pub const DEFAULT_METHOD: &'static str = "on_config_changed";
}

impl ChannelNodeVariant for ConfigChannelNode {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn match_source(&self, source: &dyn SourceObject, channel: &Channel) -> bool {
        source.as_any().is::<ConfigStore>() && !channel.is_wildcard()
    }

    fn wire(&self, wiring: &NodeWiring<'_>) -> Result<(), ChannelParseError> {
        let Some(store) = wiring.source().as_any().downcast_ref::<ConfigStore>() else {
            return Err(wiring.unsupported(Self::NAME, "source is not a config store"));
        };
        let channel = wiring.channel();
        if channel.item_spec().is_some() {
            return Err(wiring.unsupported(Self::NAME, "config key paths take no item spec"));
        }

        let key = channel.as_str().to_string();
        let last = Mutex::new(store.get(&key));
        let firer = wiring.firer();
        let subscription = store.emitter().on(DID_CHANGE, move |payload| {
            let Some(changed) = payload.get("key").and_then(Value::as_str) else {
                return Ok(());
            };
            let value = payload.get("value").cloned().unwrap_or(Value::Null);
            let (next, old) = {
                let mut last = last.lock().unwrap_or_else(PoisonError::into_inner);
                let Some(next) = project_change(&key, last.as_ref(), changed, value) else {
                    return Ok(());
                };
                if next == *last {
                    return Ok(());
                }
                let old = std::mem::replace(&mut *last, next.clone());
                (next, old)
            };
            relay(
                &firer,
                &[next.unwrap_or(Value::Null), old.unwrap_or(Value::Null)],
            )
        });
        wiring.node().disposables().add(subscription);
        wiring.node().set_default_target_method(Self::DEFAULT_METHOD);
        Ok(())
    }
}

/// Value of `watched` after `changed` was set to `value` (`null` = removed).
///
/// Returns `None` when the change is unrelated to `watched`.
fn project_change(
    watched: &str,
    current: Option<&Value>,
    changed: &str,
    value: Value,
) -> Option<Option<Value>> {
    let value = if value.is_null() { None } else { Some(value) };
    if changed == watched {
        return Some(value);
    }
    if let Some(rest) = child_path(watched, changed) {
        let Some(mut root) = current
            .cloned()
            .or_else(|| value.as_ref().map(|_| Value::Object(Map::new())))
        else {
            return Some(None);
        };
        key_assign(&mut root, rest, value);
        return Some(Some(root));
    }
    if let Some(rest) = child_path(changed, watched) {
        return Some(value.as_ref().and_then(|root| key_lookup(root, rest)).cloned());
    }
    None
}

/// Path of `key` relative to `parent` when `key` lies strictly below it.
fn child_path<'a>(parent: &str, key: &'a str) -> Option<&'a str> {
    key.strip_prefix(parent)?.strip_prefix('.')
}
