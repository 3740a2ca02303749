//! Dynamic administration: adding and removing roles under admin rules.

use orgchart::{
    bits, Action, Chart, ChartBuilder, ChartError, Event, RoleDef, RoleId, Rule,
};
use primitive_types::U256;

mod common;
use common::{
    add_role_approval, deployment, quorum_atom, remove_role_approval, seal_genesis, signer, Signer,
};

/// op (admins) plus a > aa; two operators must sign admin actions.
fn dynamic_org() -> (Chart, [u8; 32], Rule, Vec<Signer>) {
    let operators: Vec<Signer> = (1..=2u8).map(signer).collect();
    let admin_rule = Rule::new(Action::Admin, false, vec![quorum_atom("op", 2)]);
    let mut builder = ChartBuilder::new_dynamic(deployment())
        .role("op", &[])
        .role("a", &["aa"])
        .role("aa", &[])
        .admin_rule(admin_rule.clone());
    for op in &operators {
        builder = builder.seed(op.address, "op");
    }
    let mut chart = builder.build().unwrap();
    let base = seal_genesis(&mut chart);
    (chart, base, admin_rule, operators)
}

fn flag_of(chart: &Chart, name: &str) -> U256 {
    chart.registry().lookup_flag(&RoleId::named(name))
}

fn def(name: &str, flag_bit: u8, seniors: U256, juniors: U256) -> RoleDef {
    RoleDef {
        role_id: RoleId::named(name),
        flag: bits::flag_at(flag_bit),
        senior_flags: seniors,
        junior_flags: juniors,
        rule_hashes: Vec::new(),
    }
}

fn both(operators: &[Signer]) -> Vec<(&Signer, usize)> {
    operators.iter().map(|op| (op, 0)).collect()
}

#[test]
fn add_role_wires_the_graph() {
    let (mut chart, base, rule, operators) = dynamic_org();
    let grant_rule = Rule::new(Action::Grant, false, vec![quorum_atom("op", 1)]);

    // "mid" slots between a and aa
    let mut new_role = def("mid", 10, flag_of(&chart, "a"), flag_of(&chart, "aa"));
    new_role.rule_hashes.push(grant_rule.hash());
    let approval = add_role_approval(&chart, &rule, &new_role, &both(&operators), base);
    let event = chart.add_role(&approval, &new_role).unwrap();
    assert_eq!(
        event,
        Event::RoleAdded {
            role_id: RoleId::named("mid"),
            senior_flags: new_role.senior_flags,
            junior_flags: new_role.junior_flags,
        }
    );

    let registry = chart.registry();
    let mid = registry.lookup_flag(&RoleId::named("mid"));
    assert_eq!(mid, bits::flag_at(10));
    // a now reaches mid and still reaches aa through it
    let a_mask = registry.structure_mask(flag_of(&chart, "a"));
    assert_eq!(a_mask & mid, mid);
    assert_eq!(a_mask & flag_of(&chart, "aa"), flag_of(&chart, "aa"));
    assert_eq!(registry.junior_mask(flag_of(&chart, "a")) & mid, mid);

    assert_masks_consistent(registry);
    assert_reverse_topological(registry);

    // the submitted grant rule is live for the new role
    let alice = signer(10);
    let grant = common::user_approval(
        &chart,
        Action::Grant,
        &grant_rule,
        &alice,
        false,
        &[(&operators[0], 0)],
        &RoleId::named("mid"),
        base,
    );
    chart.grant_role(&grant, &alice.address, &RoleId::named("mid")).unwrap();
}

#[test]
fn cycle_through_juniors_is_rejected() {
    let (mut chart, base, rule, operators) = dynamic_org();

    // seniors={aa}, juniors={a}: a already reaches aa, so aa would become
    // reachable from itself
    let new_role = def("r", 10, flag_of(&chart, "aa"), flag_of(&chart, "a"));
    let approval = add_role_approval(&chart, &rule, &new_role, &both(&operators), base);
    assert_eq!(chart.add_role(&approval, &new_role), Err(ChartError::CycleDetected));
}

#[test]
fn retired_flags_are_never_reissued() {
    let (mut chart, base, rule, operators) = dynamic_org();

    let x = def("x", 10, U256::zero(), U256::zero());
    let approval = add_role_approval(&chart, &rule, &x, &both(&operators), base);
    chart.add_role(&approval, &x).unwrap();

    let removal =
        remove_role_approval(&chart, &rule, &RoleId::named("x"), &both(&operators), base);
    chart.remove_role(&removal, &RoleId::named("x")).unwrap();

    // same flag bit again: rejected, the slot was retired
    let reuse = def("x2", 10, U256::zero(), U256::zero());
    let approval = add_role_approval(&chart, &rule, &reuse, &both(&operators), base);
    assert_eq!(chart.add_role(&approval, &reuse), Err(ChartError::RoleFlagTaken));

    // a fresh flag from the free pool works
    let fresh = def("x2", 11, U256::zero(), U256::zero());
    let approval = add_role_approval(&chart, &rule, &fresh, &both(&operators), base);
    chart.add_role(&approval, &fresh).unwrap();
}

#[test]
fn removal_rebuilds_ancestor_masks() {
    let (mut chart, base, rule, operators) = dynamic_org();

    let mid = def("mid", 10, flag_of(&chart, "a"), flag_of(&chart, "aa"));
    let approval = add_role_approval(&chart, &rule, &mid, &both(&operators), base);
    chart.add_role(&approval, &mid).unwrap();
    let mid_flag = flag_of(&chart, "mid");

    let removal =
        remove_role_approval(&chart, &rule, &RoleId::named("mid"), &both(&operators), base);
    let event = chart.remove_role(&removal, &RoleId::named("mid")).unwrap();
    assert_eq!(event, Event::RoleRemoved { role_id: RoleId::named("mid") });

    let registry = chart.registry();
    assert!(registry.lookup_flag(&RoleId::named("mid")).is_zero());
    // a no longer reaches the removed flag, and the direct edge is gone too
    let a_flag = flag_of(&chart, "a");
    assert!((registry.structure_mask(a_flag) & mid_flag).is_zero());
    assert!((registry.junior_mask(a_flag) & mid_flag).is_zero());
    assert_masks_consistent(registry);
    assert_reverse_topological(registry);

    assert_eq!(
        chart.has_role(&signer(10).address, &RoleId::named("mid")),
        Err(ChartError::UnknownRole)
    );
}

#[test]
fn residual_user_bits_do_not_leak_through_removal() {
    let (mut chart, base, rule, operators) = dynamic_org();
    let grant_rule = Rule::new(Action::Grant, false, vec![quorum_atom("op", 1)]);

    let mut x = def("x", 10, U256::zero(), U256::zero());
    x.rule_hashes.push(grant_rule.hash());
    let approval = add_role_approval(&chart, &rule, &x, &both(&operators), base);
    chart.add_role(&approval, &x).unwrap();

    let alice = signer(10);
    let grant = common::user_approval(
        &chart,
        Action::Grant,
        &grant_rule,
        &alice,
        false,
        &[(&operators[0], 0)],
        &RoleId::named("x"),
        base,
    );
    chart.grant_role(&grant, &alice.address, &RoleId::named("x")).unwrap();

    let removal =
        remove_role_approval(&chart, &rule, &RoleId::named("x"), &both(&operators), base);
    chart.remove_role(&removal, &RoleId::named("x")).unwrap();

    // alice's stale bit is masked out everywhere
    assert!(chart.direct_roles(&alice.address).is_zero());
}

#[test]
fn basic_validation_failures() {
    let (mut chart, base, rule, operators) = dynamic_org();

    // two bits set
    let mut bad_flag = def("r", 10, U256::zero(), U256::zero());
    bad_flag.flag = bits::flag_at(10) | bits::flag_at(11);
    let approval = add_role_approval(&chart, &rule, &bad_flag, &both(&operators), base);
    assert_eq!(chart.add_role(&approval, &bad_flag), Err(ChartError::MalformedRoleFlag));

    // an active flag
    let mut taken = def("r", 10, U256::zero(), U256::zero());
    taken.flag = flag_of(&chart, "a");
    let approval = add_role_approval(&chart, &rule, &taken, &both(&operators), base);
    assert_eq!(chart.add_role(&approval, &taken), Err(ChartError::RoleFlagTaken));

    // an id that is already registered
    let duplicate = def("a", 10, U256::zero(), U256::zero());
    let approval = add_role_approval(&chart, &rule, &duplicate, &both(&operators), base);
    assert_eq!(chart.add_role(&approval, &duplicate), Err(ChartError::RoleIdTaken));

    // seniors/juniors that are not active roles
    let ghost_senior = def("r", 10, bits::flag_at(20), U256::zero());
    let approval = add_role_approval(&chart, &rule, &ghost_senior, &both(&operators), base);
    assert_eq!(chart.add_role(&approval, &ghost_senior), Err(ChartError::SeniorsMissing));

    let ghost_junior = def("r", 10, U256::zero(), bits::flag_at(20));
    let approval = add_role_approval(&chart, &rule, &ghost_junior, &both(&operators), base);
    assert_eq!(chart.add_role(&approval, &ghost_junior), Err(ChartError::JuniorsMissing));

    // too many rule hashes
    let mut crowded = def("r", 10, U256::zero(), U256::zero());
    crowded.rule_hashes = (0..10u8).map(|n| [n; 32]).collect();
    let approval = add_role_approval(&chart, &rule, &crowded, &both(&operators), base);
    assert_eq!(chart.add_role(&approval, &crowded), Err(ChartError::TooManyRules));

    // admin approvals never self-sign
    let plain = def("r", 10, U256::zero(), U256::zero());
    let mut approval = add_role_approval(&chart, &rule, &plain, &both(&operators), base);
    approval.self_sign_required = true;
    assert_eq!(chart.add_role(&approval, &plain), Err(ChartError::UnexpectedSelfSign));
}

#[test]
fn admin_rule_is_required() {
    let (mut chart, base, _, operators) = dynamic_org();

    // a rule body that was never registered as an admin rule
    let not_admin = Rule::new(Action::Admin, false, vec![quorum_atom("op", 1)]);
    let new_role = def("r", 10, U256::zero(), U256::zero());
    let approval = add_role_approval(&chart, &not_admin, &new_role, &both(&operators), base);
    assert_eq!(chart.add_role(&approval, &new_role), Err(ChartError::InvalidAdminRule));
}

#[test]
fn quorum_shortfall_blocks_admin_actions() {
    let (mut chart, base, rule, operators) = dynamic_org();

    let new_role = def("r", 10, U256::zero(), U256::zero());
    let approval = add_role_approval(&chart, &rule, &new_role, &[(&operators[0], 0)], base);
    assert_eq!(chart.add_role(&approval, &new_role), Err(ChartError::NotEnoughSigners(0)));
}

#[test]
fn failed_admin_operations_change_nothing() {
    let (mut chart, base, rule, operators) = dynamic_org();
    let before = fingerprint(&chart);

    let cyclic = def("r", 10, flag_of(&chart, "aa"), flag_of(&chart, "a"));
    let approval = add_role_approval(&chart, &rule, &cyclic, &both(&operators), base);
    assert!(chart.add_role(&approval, &cyclic).is_err());
    assert_eq!(fingerprint(&chart), before);

    let removal =
        remove_role_approval(&chart, &rule, &RoleId::named("ghost"), &[(&operators[0], 0)], base);
    assert_eq!(
        chart.remove_role(&removal, &RoleId::named("ghost")),
        Err(ChartError::UnknownRole)
    );
    assert_eq!(fingerprint(&chart), before);
}

#[test]
fn static_charts_refuse_graph_changes() {
    let operators: Vec<Signer> = (1..=2u8).map(signer).collect();
    let rule = Rule::new(Action::Admin, false, vec![quorum_atom("op", 2)]);
    let mut chart = ChartBuilder::new_static(deployment())
        .role("op", &[])
        .admin_rule(rule.clone())
        .seed(operators[0].address, "op")
        .seed(operators[1].address, "op")
        .build()
        .unwrap();
    let base = seal_genesis(&mut chart);

    let new_role = def("r", 10, U256::zero(), U256::zero());
    let approval = add_role_approval(&chart, &rule, &new_role, &both(&operators), base);
    assert_eq!(chart.add_role(&approval, &new_role), Err(ChartError::ImmutableChart));

    let removal = remove_role_approval(&chart, &rule, &RoleId::named("op"), &both(&operators), base);
    assert_eq!(
        chart.remove_role(&removal, &RoleId::named("op")),
        Err(ChartError::ImmutableChart)
    );
}

// ============================================================================
// Invariant helpers
// ============================================================================

fn fingerprint(chart: &Chart) -> (Vec<U256>, U256, U256, Vec<(U256, U256)>) {
    let registry = chart.registry();
    let masks = registry
        .index()
        .iter()
        .map(|&flag| (registry.structure_mask(flag), registry.junior_mask(flag)))
        .collect();
    (
        registry.index().to_vec(),
        registry.active_flags(),
        registry.free_flags(),
        masks,
    )
}

fn assert_masks_consistent(registry: &orgchart::RoleRegistry) {
    for &flag in registry.index() {
        let mut expected = flag;
        bits::for_each_set_bit(registry.junior_mask(flag), |position| {
            expected = expected | registry.structure_mask(bits::flag_at(position));
        });
        assert_eq!(registry.structure_mask(flag), expected, "mask of {flag:x}");
    }
}

fn assert_reverse_topological(registry: &orgchart::RoleRegistry) {
    let position = |flag: U256| {
        registry
            .index()
            .iter()
            .position(|&entry| entry == flag)
            .expect("active flag is indexed")
    };
    for &senior in registry.index() {
        let reachable = registry.structure_mask(senior) & !senior & registry.active_flags();
        bits::for_each_set_bit(reachable, |junior_bit| {
            let junior = bits::flag_at(junior_bit);
            assert!(
                position(junior) < position(senior),
                "junior {junior:x} listed after senior {senior:x}"
            );
        });
    }
}
