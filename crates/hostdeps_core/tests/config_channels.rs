use hostdeps_core::{
    CallbackError, CallbackResult, ConfigStore, DepCallback, DepEvent, Dependent, DependentsGraph,
    DepsError, HostError, ObjectId, Participant,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

type Seen = Arc<Mutex<Vec<Vec<Value>>>>;

fn recording(seen: &Seen) -> DepCallback {
    let seen = Arc::clone(seen);
    DepCallback::new(move |event| {
        seen.lock().unwrap().push(event.args.to_vec());
        Ok(())
    })
}

fn setup() -> (DependentsGraph, ConfigStore, Arc<ObjectId>, Seen) {
    (
        DependentsGraph::with_builtin_variants(),
        ConfigStore::new(),
        Arc::new(ObjectId::new()),
        Arc::new(Mutex::new(Vec::new())),
    )
}

#[test]
fn key_change_delivers_new_and_old_values() {
    let (graph, config, target, seen) = setup();
    let handle = config
        .add_dep(&graph, "editor.fontSize", &target, Some(recording(&seen)))
        .expect("add dep");
    assert!(handle.is_new());
    assert_eq!(handle.variant_name(), "config");

    config.set("editor.fontSize", json!(14)).expect("set 14");
    config.set("editor.fontSize", json!(14)).expect("same value");
    config.set("editor.fontSize", json!(16)).expect("set 16");
    config.unset("editor.fontSize").expect("unset");

    assert_eq!(
        seen.lock().unwrap().clone(),
        vec![
            vec![json!(14), Value::Null],
            vec![json!(16), json!(14)],
            vec![Value::Null, json!(16)],
        ]
    );
}

#[test]
fn destroyed_dependent_stops_hearing_while_others_keep_listening() {
    let (graph, config, x, x_seen) = setup();
    let y = Arc::new(ObjectId::new());
    let y_seen: Seen = Arc::new(Mutex::new(Vec::new()));
    config
        .add_dep(&graph, "editor.fontSize", &x, Some(recording(&x_seen)))
        .expect("x dep");
    let shared = config
        .add_dep(&graph, "editor.fontSize", &y, Some(recording(&y_seen)))
        .expect("y dep");
    assert!(!shared.is_new());

    config.set("editor.fontSize", json!(14)).expect("set 14");
    assert_eq!(x_seen.lock().unwrap().len(), 1);
    assert_eq!(y_seen.lock().unwrap().len(), 1);

    graph.object_destroyed(y.as_ref());
    config.set("editor.fontSize", json!(16)).expect("set 16");

    assert_eq!(
        x_seen.lock().unwrap().clone(),
        vec![vec![json!(14), Value::Null], vec![json!(16), json!(14)]]
    );
    assert_eq!(y_seen.lock().unwrap().clone(), vec![vec![json!(14), Value::Null]]);
    assert_eq!(graph.dependent_count(&config, "editor.fontSize"), 1);
}

#[test]
fn parent_and_child_writes_reach_the_watched_key() {
    let (graph, config, target, seen) = setup();
    config
        .set("editor", json!({ "fontSize": 12, "tabLength": 2 }))
        .expect("seed");
    config
        .add_dep(&graph, "editor.fontSize", &target, Some(recording(&seen)))
        .expect("watch child");
    let parent_seen: Seen = Arc::new(Mutex::new(Vec::new()));
    config
        .add_dep(&graph, "editor", &target, Some(recording(&parent_seen)))
        .expect("watch parent");

    config
        .set("editor", json!({ "fontSize": 18, "tabLength": 2 }))
        .expect("parent write");
    config.set("editor.tabLength", json!(4)).expect("sibling write");

    assert_eq!(
        seen.lock().unwrap().clone(),
        vec![vec![json!(18), json!(12)]]
    );
    assert_eq!(
        parent_seen.lock().unwrap().clone(),
        vec![
            vec![
                json!({ "fontSize": 18, "tabLength": 2 }),
                json!({ "fontSize": 12, "tabLength": 2 })
            ],
            vec![
                json!({ "fontSize": 18, "tabLength": 4 }),
                json!({ "fontSize": 18, "tabLength": 2 })
            ],
        ]
    );
}

#[test]
fn removing_the_last_dependent_unsubscribes_from_the_store() {
    let (graph, config, target, seen) = setup();
    config
        .add_dep(&graph, "core.themes", &target, Some(recording(&seen)))
        .expect("add dep");
    assert_eq!(config.emitter().listener_count("did-change"), 1);

    config.remove_dep(&graph, "core.themes", target.as_ref());
    assert!(graph.is_empty());
    assert_eq!(config.emitter().listener_count("did-change"), 0);

    config.set("core.themes", json!(["one-dark"])).expect("set");
    assert!(seen.lock().unwrap().is_empty());
}

struct Settings {
    id: ObjectId,
    seen: Mutex<Vec<String>>,
}

impl Participant for Settings {
    fn object_id(&self) -> ObjectId {
        self.id
    }
}

impl Dependent for Settings {
    fn on_named_event(&self, method: &str, event: &DepEvent<'_>) -> Option<CallbackResult> {
        if method != "on_config_changed" {
            return None;
        }
        self.seen
            .lock()
            .unwrap()
            .push(format!("{}={}", event.channel, event.args[0]));
        Some(Ok(()))
    }
}

#[test]
fn callbackless_dependents_receive_on_config_changed() {
    let graph = DependentsGraph::with_builtin_variants();
    let config = ConfigStore::new();
    let settings = Arc::new(Settings {
        id: ObjectId::new(),
        seen: Mutex::new(Vec::new()),
    });

    config
        .add_dep(&graph, "editor.softWrap", &settings, None)
        .expect("add dep");
    config.set("editor.softWrap", json!(true)).expect("set");

    assert_eq!(
        settings.seen.lock().unwrap().clone(),
        vec!["editor.softWrap=true"]
    );
}

#[test]
fn failing_listener_surfaces_as_a_host_error() {
    let (graph, config, target, _) = setup();
    config
        .add_dep(
            &graph,
            "editor.fontSize",
            &target,
            Some(DepCallback::new(|_| Err(CallbackError::new("rejected")))),
        )
        .expect("add dep");

    let err = config
        .set("editor.fontSize", json!(20))
        .expect_err("listener failure must propagate");
    assert!(matches!(err, HostError::Listener { ref event, .. } if event == "did-change"));
    assert!(err.to_string().contains("rejected"));
    assert_eq!(config.get("editor.fontSize"), Some(json!(20)));
}

#[test]
fn config_keys_reject_item_specs() {
    let (graph, config, target, _) = setup();
    let err = graph
        .add(&config, &target, "editor(font).size", None)
        .expect_err("item spec on a config key");
    assert!(matches!(err, DepsError::MalformedChannel(_)));
    assert!(graph.is_empty());
    assert_eq!(config.emitter().listener_count("did-change"), 0);
}
