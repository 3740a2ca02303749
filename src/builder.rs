//! Chart construction: declare roles, attach rules, seed assignments.
//!
//! A host (or code generated from a chart description) declares the role
//! graph by name, the rules that govern it, and the initial members, then
//! builds a ready chart. Static charts freeze the graph at this point;
//! dynamic charts additionally accept admin rules for later mutation.

use std::collections::{HashMap, HashSet};

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::atom::RoleId;
use crate::bits;
use crate::blocks::BlockWindow;
use crate::chart::{Chart, ChartKind, ADMIN_RULE_SENTINEL};
use crate::constants::MAX_NUM_RULES;
use crate::error::{ChartError, Result};
use crate::hashing;
use crate::registry::RoleRegistry;
use crate::rule::{Action, Rule, RuleHash};
use crate::sig::Address;

/// Deployment identity folded into the domain separator. Two deployments
/// with different identities never accept each other's approvals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub chain_id: u64,
    pub engine_address: Address,
    #[serde(default)]
    pub salt: [u8; 32],
}

impl Deployment {
    pub fn domain_separator(&self) -> [u8; 32] {
        hashing::domain_separator(self.chain_id, &self.engine_address, &self.salt)
    }
}

struct RoleSpec {
    role_id: RoleId,
    juniors: Vec<RoleId>,
}

/// Assembles a chart. Roles are declared by name; flags are assigned in
/// declaration order.
pub struct ChartBuilder {
    kind: ChartKind,
    deployment: Deployment,
    roles: Vec<RoleSpec>,
    rules: Vec<(RoleId, Rule)>,
    admin_rules: Vec<Rule>,
    seeds: Vec<(Address, RoleId)>,
}

impl ChartBuilder {
    pub fn new_static(deployment: Deployment) -> Self {
        ChartBuilder::new(ChartKind::Static, deployment)
    }

    pub fn new_dynamic(deployment: Deployment) -> Self {
        ChartBuilder::new(ChartKind::Dynamic, deployment)
    }

    fn new(kind: ChartKind, deployment: Deployment) -> Self {
        ChartBuilder {
            kind,
            deployment,
            roles: Vec::new(),
            rules: Vec::new(),
            admin_rules: Vec::new(),
            seeds: Vec::new(),
        }
    }

    /// Declare a role and its direct juniors (seniors inherit juniors).
    pub fn role(mut self, name: &str, juniors: &[&str]) -> Self {
        self.roles.push(RoleSpec {
            role_id: RoleId::named(name),
            juniors: juniors.iter().map(|junior| RoleId::named(junior)).collect(),
        });
        self
    }

    /// Attach a grant or revoke rule to a named role.
    pub fn rule(mut self, role: &str, rule: Rule) -> Self {
        self.rules.push((RoleId::named(role), rule));
        self
    }

    /// Register an admin rule authorizing add/remove operations.
    pub fn admin_rule(mut self, rule: Rule) -> Self {
        self.admin_rules.push(rule);
        self
    }

    /// Assign a role to a user at construction time, without an approval.
    pub fn seed(mut self, user: Address, role: &str) -> Self {
        self.seeds.push((user, RoleId::named(role)));
        self
    }

    pub fn build(self) -> Result<Chart> {
        if self.roles.len() > 256 {
            return Err(ChartError::RoleFlagTaken);
        }

        // flag per declared role, in declaration order
        let mut flag_of: HashMap<RoleId, U256> = HashMap::new();
        for (position, spec) in self.roles.iter().enumerate() {
            if flag_of.insert(spec.role_id, bits::flag_at(position as u8)).is_some() {
                return Err(ChartError::RoleIdTaken);
            }
        }
        for spec in &self.roles {
            for junior in &spec.juniors {
                if !flag_of.contains_key(junior) {
                    return Err(ChartError::JuniorsMissing);
                }
            }
        }

        // place juniors before seniors; a pass without progress means the
        // declared junior relation closes a cycle
        let total = self.roles.len();
        let mut placed: Vec<usize> = Vec::with_capacity(total);
        let mut ready: HashSet<RoleId> = HashSet::new();
        let mut done = vec![false; total];
        while placed.len() < total {
            let mut progressed = false;
            for (position, spec) in self.roles.iter().enumerate() {
                if done[position] {
                    continue;
                }
                if spec.juniors.iter().all(|junior| ready.contains(junior)) {
                    done[position] = true;
                    ready.insert(spec.role_id);
                    placed.push(position);
                    progressed = true;
                }
            }
            if !progressed {
                return Err(ChartError::CycleDetected);
            }
        }

        let mut registry = RoleRegistry::new();
        for position in placed {
            let spec = &self.roles[position];
            let flag = flag_of[&spec.role_id];
            let juniors = spec
                .juniors
                .iter()
                .fold(U256::zero(), |mask, junior| mask | flag_of[junior]);
            registry.validate_new_role(&spec.role_id, flag, U256::zero(), juniors)?;
            let mask = registry.check_cycle(flag, U256::zero(), juniors)?;
            registry.apply_insert(spec.role_id, flag, U256::zero(), juniors, mask);
        }

        let mut rule_flags: HashMap<RuleHash, U256> = HashMap::new();
        let mut per_role: HashMap<RoleId, usize> = HashMap::new();
        for (role_id, rule) in &self.rules {
            let flag = *flag_of.get(role_id).ok_or(ChartError::UnknownRole)?;
            let attached = per_role.entry(*role_id).or_insert(0);
            *attached += 1;
            if *attached >= MAX_NUM_RULES {
                return Err(ChartError::TooManyRules);
            }
            warn_on_odd_self_sign(rule);
            let entry = rule_flags.entry(rule.hash()).or_default();
            *entry = *entry | flag;
        }
        for rule in &self.admin_rules {
            warn_on_odd_self_sign(rule);
            rule_flags.insert(rule.hash(), ADMIN_RULE_SENTINEL);
        }
        if self.kind == ChartKind::Dynamic && self.admin_rules.is_empty() {
            warn!("dynamic chart built without an admin rule; the graph can never change");
        }

        let mut user_roles: HashMap<Address, U256> = HashMap::new();
        let mut assignment_counts: HashMap<RoleId, u64> = HashMap::new();
        for (user, role_id) in &self.seeds {
            let flag = *flag_of.get(role_id).ok_or(ChartError::UnknownRole)?;
            let held = user_roles.entry(*user).or_default();
            if (*held & flag).is_zero() {
                *held = *held | flag;
                *assignment_counts.entry(*role_id).or_default() += 1;
            }
        }

        Ok(Chart {
            kind: self.kind,
            registry,
            user_roles,
            assignment_counts,
            rule_flags,
            domain_separator: self.deployment.domain_separator(),
            blocks: BlockWindow::new(),
        })
    }
}

/// Self-sign only ever matters for grants; a rule carrying it elsewhere is
/// accepted (it still hashes consistently) but flagged.
fn warn_on_odd_self_sign(rule: &Rule) {
    if rule.self_sign_required && rule.action != Action::Grant {
        warn!(action = ?rule.action, "rule requires a self-sign for a non-grant action");
    }
}
