//! Snapshot persistence: a reloaded chart behaves exactly like the original.

use tempfile::TempDir;

use orgchart::{Action, ChartBuilder, ChartKind, Event, RoleId, Rule, Store};

mod common;
use common::{deployment, quorum_atom, seal_genesis, signer, user_approval};

#[test]
fn snapshot_roundtrip_preserves_everything() {
    let admin = signer(1);
    let alice = signer(10);
    let a = RoleId::named("a");
    let grant_rule = Rule::new(Action::Grant, false, vec![quorum_atom("admin", 1)]);

    let mut chart = ChartBuilder::new_static(deployment())
        .role("admin", &["a"])
        .role("a", &["aa"])
        .role("aa", &[])
        .rule("a", grant_rule.clone())
        .seed(admin.address, "admin")
        .build()
        .unwrap();
    let base = seal_genesis(&mut chart);

    let grant =
        user_approval(&chart, Action::Grant, &grant_rule, &alice, false, &[(&admin, 0)], &a, base);
    chart.grant_role(&grant, &alice.address, &a).unwrap();

    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();
    store.save(&chart).unwrap();
    let loaded = store.load().unwrap().expect("snapshot exists");

    assert_eq!(loaded.kind(), ChartKind::Static);
    assert_eq!(loaded.domain_separator(), chart.domain_separator());
    assert_eq!(loaded.height(), chart.height());
    assert_eq!(loaded.registry().index(), chart.registry().index());
    assert_eq!(loaded.registry().active_flags(), chart.registry().active_flags());
    assert_eq!(loaded.registry().free_flags(), chart.registry().free_flags());
    assert_eq!(loaded.assignment_count(&a), 1);

    assert!(loaded.strictly_has_role(&alice.address, &a).unwrap());
    assert!(loaded.has_role(&alice.address, &RoleId::named("aa")).unwrap());
    assert!(loaded.has_role(&admin.address, &a).unwrap());
    assert!(!loaded.strictly_has_role(&admin.address, &a).unwrap());
}

#[test]
fn a_reloaded_chart_still_verifies_approvals() {
    let admin = signer(1);
    let bob = signer(11);
    let a = RoleId::named("a");
    let grant_rule = Rule::new(Action::Grant, false, vec![quorum_atom("admin", 1)]);

    let mut chart = ChartBuilder::new_static(deployment())
        .role("admin", &["a"])
        .role("a", &[])
        .rule("a", grant_rule.clone())
        .seed(admin.address, "admin")
        .build()
        .unwrap();
    let base = seal_genesis(&mut chart);

    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();
    store.save(&chart).unwrap();
    let mut loaded = store.load().unwrap().expect("snapshot exists");

    // rule bindings, block window, and domain all survived: a fresh grant
    // signed against the reloaded chart verifies
    let grant =
        user_approval(&loaded, Action::Grant, &grant_rule, &bob, false, &[(&admin, 0)], &a, base);
    let event = loaded.grant_role(&grant, &bob.address, &a).unwrap();
    assert_eq!(event, Event::RoleGranted { user: bob.address, role_id: a });

    // and the mutated chart snapshots over the old one
    store.save(&loaded).unwrap();
    let reloaded = store.load().unwrap().expect("snapshot exists");
    assert!(reloaded.strictly_has_role(&bob.address, &a).unwrap());
    assert_eq!(reloaded.assignment_count(&a), 1);
}

#[test]
fn empty_store_loads_nothing() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();
    assert!(store.load().unwrap().is_none());
}
