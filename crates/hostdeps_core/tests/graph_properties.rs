use hostdeps_core::{
    CallbackResult, DepCallback, DepEvent, Dependent, DependentsGraph, ObjectId, Participant,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<String>>>;

struct Listener {
    id: ObjectId,
    name: &'static str,
    log: Log,
}

impl Listener {
    fn new(name: &'static str, log: &Log) -> Arc<Self> {
        Arc::new(Self {
            id: ObjectId::new(),
            name,
            log: Arc::clone(log),
        })
    }
}

impl Participant for Listener {
    fn object_id(&self) -> ObjectId {
        self.id
    }
}

impl Dependent for Listener {
    fn on_dep_changed(&self, event: &DepEvent<'_>) -> Option<CallbackResult> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}<-{}", self.name, event.channel));
        Some(Ok(()))
    }
}

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[test]
fn removal_during_fire_does_not_affect_the_running_pass() {
    let graph = DependentsGraph::new();
    let log = new_log();
    let source = ObjectId::new();
    let first = Listener::new("first", &log);
    let second = Listener::new("second", &log);

    let remover = {
        let graph = graph.clone();
        let second_id = second.object_id();
        let log = Arc::clone(&log);
        DepCallback::new(move |event| {
            log.lock().unwrap().push("first removes second".to_string());
            graph.remove(&event.source, &second_id, event.channel);
            Ok(())
        })
    };
    graph
        .add(&source, &first, "changed", Some(remover))
        .expect("add first");
    graph.add(&source, &second, "changed", None).expect("add second");

    let notified = graph.fire(&source, "changed", &[]).expect("first fire");
    assert_eq!(notified, 2);
    assert_eq!(
        entries(&log),
        vec!["first removes second", "second<-changed"]
    );

    log.lock().unwrap().clear();
    assert_eq!(graph.fire(&source, "changed", &[]).expect("second fire"), 1);
    assert_eq!(entries(&log), vec!["first removes second"]);
}

#[test]
fn dependents_added_during_fire_wait_for_the_next_pass() {
    let graph = DependentsGraph::new();
    let log = new_log();
    let source = ObjectId::new();
    let first = Listener::new("first", &log);
    let late = Listener::new("late", &log);

    let adder = {
        let graph = graph.clone();
        let late = Arc::clone(&late);
        DepCallback::new(move |event| {
            graph
                .add(&event.source, &late, event.channel, None)
                .map_err(hostdeps_core::CallbackError::from_error)?;
            Ok(())
        })
    };
    graph
        .add(&source, &first, "changed", Some(adder))
        .expect("add first");

    assert_eq!(graph.fire(&source, "changed", &[]).expect("fire"), 1);
    assert!(entries(&log).is_empty());
    assert_eq!(graph.fire(&source, "changed", &[]).expect("fire again"), 2);
    assert_eq!(entries(&log), vec!["late<-changed"]);
}

#[test]
fn destroying_a_target_keeps_other_dependents() {
    let graph = DependentsGraph::new();
    let log = new_log();
    let source_a = ObjectId::new();
    let source_b = ObjectId::new();
    let doomed = Listener::new("doomed", &log);
    let survivor = Listener::new("survivor", &log);

    graph.add(&source_a, &doomed, "x", None).expect("a.x doomed");
    graph.add(&source_a, &survivor, "x", None).expect("a.x survivor");
    graph.add(&source_b, &doomed, "y", None).expect("b.y doomed");

    graph.object_destroyed(doomed.as_ref());
    assert_eq!(graph.dependent_count(&source_a, "x"), 1);
    assert!(graph.node(&source_b, "y").is_none());

    graph.fire(&source_a, "x", &[]).expect("fire");
    assert_eq!(entries(&log), vec!["survivor<-x"]);
}

#[test]
fn destroying_a_source_disposes_each_node_once() {
    let graph = DependentsGraph::new();
    let log = new_log();
    let source = ObjectId::new();
    let other_source = ObjectId::new();
    let target = Listener::new("t", &log);

    for channel in ["a", "b"] {
        let node = graph.add(&source, &target, channel, None).expect("add");
        let log = Arc::clone(&log);
        node.disposables().add(move || {
            log.lock().unwrap().push(format!("disposed {channel}"));
        });
    }
    graph.add(&other_source, &target, "a", None).expect("other source");

    graph.object_destroyed(&source);
    graph.object_destroyed(&source);

    let mut disposed = entries(&log);
    disposed.sort();
    assert_eq!(disposed, vec!["disposed a", "disposed b"]);
    assert_eq!(graph.node_count(), 1);
    assert_eq!(graph.fire(&source, "a", &[]).expect("fire gone"), 0);
    assert_eq!(graph.fire(&other_source, "a", &[]).expect("fire kept"), 1);

    let again = graph.add(&source, &target, "a", None).expect("re-add");
    assert!(again.is_new());
    let sink = Arc::clone(&log);
    again.disposables().add(move || {
        sink.lock().unwrap().push("disposed a again".to_string());
    });
    assert_eq!(graph.node_count(), 2);
    assert_eq!(graph.fire(&source, "a", &[]).expect("fire re-added"), 1);

    graph.object_destroyed(&source);
    let log_entries = entries(&log);
    assert_eq!(
        log_entries
            .iter()
            .filter(|entry| entry.starts_with("disposed"))
            .count(),
        3
    );
    assert_eq!(log_entries.last().map(String::as_str), Some("disposed a again"));
    assert_eq!(graph.node_count(), 1);
}

#[test]
fn explicit_callbacks_receive_source_channel_and_args() {
    let graph = DependentsGraph::new();
    let source = ObjectId::new();
    let target = Arc::new(ObjectId::new());
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);

    graph
        .add(
            &source,
            &target,
            "item(doc).saved",
            Some(DepCallback::new(move |event| {
                *sink.lock().unwrap() = Some((
                    event.source,
                    event.channel.to_string(),
                    event.arg_str(0).map(str::to_string),
                    event.arg(1).cloned(),
                ));
                Ok(())
            })),
        )
        .expect("add");

    graph
        .fire(&source, "item(doc).saved", &[json!("doc-1"), json!(3)])
        .expect("fire");
    assert_eq!(
        seen.lock().unwrap().clone(),
        Some((
            source,
            "item(doc).saved".to_string(),
            Some("doc-1".to_string()),
            Some(json!(3))
        ))
    );
}

#[test]
fn graph_clones_share_relationships() {
    let graph = DependentsGraph::new();
    let clone = graph.clone();
    let log = new_log();
    let source = ObjectId::new();
    let target = Listener::new("t", &log);

    let handle = clone.add(&source, &target, "changed", None).expect("add");
    assert!(handle.is_new());
    assert!(!graph.is_empty());
    assert_eq!(graph.fire(&source, "changed", &[]).expect("fire"), 1);

    let weak = graph.downgrade();
    assert!(weak.upgrade().is_some());
    drop(graph);
    drop(clone);
    assert!(weak.upgrade().is_none());
}

#[test]
fn global_graph_knows_builtin_variants() {
    let context = hostdeps_core::HostContext::global();
    let target = Arc::new(ObjectId::new());

    let handle = context
        .config
        .add_dep(&context.graph, "editor.fontSize", &target, None)
        .expect("add on global graph");
    assert_eq!(handle.variant_name(), "config");
    assert!(hostdeps_core::deps()
        .node(context.config.as_ref(), "editor.fontSize")
        .is_some());
    hostdeps_core::deps().object_destroyed(context.config.as_ref());
    assert!(hostdeps_core::deps()
        .node(context.config.as_ref(), "editor.fontSize")
        .is_none());
}
