mod helpers;

use helpers::{NAMESPACE, config, node, secret, settings_named, world};
use k8s_openapi::api::core::v1::Node;
use kube::runtime::reflector::{self, Store};
use kube::runtime::watcher;
use wapop_core::PassOutcome;
use wapop_core::mapper::fan_out_cached;

/// Reflector cache fed the same events the controller's node watcher would see.
fn node_cache(nodes: &[Node]) -> Store<Node> {
    let (reader, mut writer) = reflector::store();
    for n in nodes {
        writer.apply_watcher_event(&watcher::Event::Apply(n.clone()));
    }
    reader
}

#[tokio::test]
async fn settings_secret_change_reaches_every_node() {
    let nodes = vec![
        node("rpi-1", &[], "b"),
        node("rpi-2", &[], "b"),
        node("rpi-3", &[], "b"),
    ];
    let cache = node_cache(&nodes);
    let (store, reconciler) = world(nodes).await;
    for name in ["rpi-1", "rpi-2", "rpi-3"] {
        reconciler.reconcile_node(name).await.unwrap();
    }

    let changed = secret(&[("password", b"new")]);
    store.put_secret(changed.clone()).await;

    let requests = fan_out_cached(&changed.metadata, &cache, &config());
    let mut names: Vec<_> = requests.into_iter().map(|r| r.name).collect();
    names.sort();
    assert_eq!(names, ["rpi-1", "rpi-2", "rpi-3"]);

    for name in &names {
        let outcome = reconciler.reconcile_node(name).await.unwrap();
        assert!(
            matches!(outcome, PassOutcome::StaleJobDeleted { .. }),
            "{name}: {outcome:?}"
        );
    }
}

#[test]
fn deleted_nodes_leave_the_fan_out() {
    let nodes = [node("rpi-1", &[], "b"), node("rpi-2", &[], "b")];
    let (reader, mut writer) = reflector::store();
    for n in &nodes {
        writer.apply_watcher_event(&watcher::Event::Apply(n.clone()));
    }
    writer.apply_watcher_event(&watcher::Event::Delete(nodes[0].clone()));

    let changed = settings_named("wifi-settings", NAMESPACE, &[]);
    let requests = fan_out_cached(&changed.metadata, &reader, &config());
    let names: Vec<_> = requests.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["rpi-2"]);
}

#[test]
fn unrelated_settings_objects_request_nothing() {
    let cache = node_cache(&[node("rpi-1", &[], "b")]);
    let other_name = settings_named("kube-root-ca.crt", NAMESPACE, &[]);
    let other_namespace = settings_named("wifi-settings", "default", &[]);

    for changed in [other_name, other_namespace] {
        assert!(fan_out_cached(&changed.metadata, &cache, &config()).is_empty());
    }
}
