//! Channel nodes on a [`PackageManager`].
//!
//! - `packages[(nameSpec)]` fires `[state, name]` on activation changes.
//! - `packages[(nameSpec)].activated` / `.deactivated` fire `[name]`.
//! - `manager.initialPackagesActivated` / `manager.initialPackagesLoaded`
//!   fire `[]` once the startup milestone is reached.
//!
//! A literal name spec is a comma separated list of exact names.

use crate::channel::{Channel, ChannelParseError};
use crate::deps::{ChannelNodeVariant, NodeWiring};
use crate::host::packages::{
    PackageManager, PackageState, DID_ACTIVATE_INITIAL_PACKAGES, DID_ACTIVATE_PACKAGE,
    DID_DEACTIVATE_PACKAGE, DID_LOAD_INITIAL_PACKAGES,
};
use crate::model::SourceObject;
use crate::variants::relay;
use serde_json::{json, Value};

#[derive(Debug, Default, Clone, Copy)]
pub struct PackageChannelNode;

impl PackageChannelNode {
    pub const NAME: &'static str = "packages";
}

impl ChannelNodeVariant for PackageChannelNode {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn match_source(&self, source: &dyn SourceObject, channel: &Channel) -> bool {
        source.as_any().is::<PackageManager>()
            && matches!(channel.obj_type(), "package" | "packages" | "manager")
    }

    fn wire(&self, wiring: &NodeWiring<'_>) -> Result<(), ChannelParseError> {
        let Some(manager) = wiring.source().as_any().downcast_ref::<PackageManager>() else {
            return Err(wiring.unsupported(Self::NAME, "source is not a package manager"));
        };
        let channel = wiring.channel();
        if channel.obj_type() == "manager" {
            return wire_milestone(manager, wiring);
        }

        let (events, method): (&[(&'static str, PackageState)], &'static str) =
            match channel.action() {
                None => (
                    &[
                        (DID_ACTIVATE_PACKAGE, PackageState::Activated),
                        (DID_DEACTIVATE_PACKAGE, PackageState::Deactivated),
                    ],
                    "on_package_changed_state",
                ),
                Some("activated") => (
                    &[(DID_ACTIVATE_PACKAGE, PackageState::Activated)],
                    "on_package_activated",
                ),
                Some("deactivated") => (
                    &[(DID_DEACTIVATE_PACKAGE, PackageState::Deactivated)],
                    "on_package_deactivated",
                ),
                Some(_) => {
                    return Err(wiring.unsupported(
                        Self::NAME,
                        "package actions are `activated` or `deactivated`",
                    ))
                }
            };
        let with_state = channel.action().is_none();

        for (event, state) in events {
            let state = *state;
            let spec = channel.item_spec().cloned();
            let firer = wiring.firer();
            let subscription = manager.emitter().on(event, move |payload| {
                let Some(name) = payload.get("name").and_then(Value::as_str) else {
                    return Ok(());
                };
                if !spec.as_ref().map_or(true, |spec| spec.matches_name_list(name)) {
                    return Ok(());
                }
                if with_state {
                    relay(&firer, &[json!(state.as_str()), json!(name)])
                } else {
                    relay(&firer, &[json!(name)])
                }
            });
            wiring.node().disposables().add(subscription);
        }
        wiring.node().set_default_target_method(method);
        Ok(())
    }
}

fn wire_milestone(manager: &PackageManager, wiring: &NodeWiring<'_>) -> Result<(), ChannelParseError> {
    let channel = wiring.channel();
    if channel.item_spec().is_some() {
        return Err(wiring.unsupported(PackageChannelNode::NAME, "manager channels take no item spec"));
    }
    let (event, method) = match channel.action() {
        Some("initialPackagesActivated") => {
            (DID_ACTIVATE_INITIAL_PACKAGES, "on_initial_packages_activated")
        }
        Some("initialPackagesLoaded") => (DID_LOAD_INITIAL_PACKAGES, "on_initial_packages_loaded"),
        _ => {
            return Err(wiring.unsupported(
                PackageChannelNode::NAME,
                "manager actions are `initialPackagesActivated` or `initialPackagesLoaded`",
            ))
        }
    };
    let firer = wiring.firer();
    let subscription = manager.emitter().on(event, move |_| relay(&firer, &[]));
    wiring.node().disposables().add(subscription);
    wiring.node().set_default_target_method(method);
    Ok(())
}
