//! The chart aggregate: registry, user assignments, rule map, and the
//! signed operations over them.
//!
//! One `Chart` value owns the entire engine state. Operations are
//! synchronous and bounded; every one of them finishes validation before the
//! first write, so a failed call leaves the chart untouched. Hosts serialize
//! mutations behind a single writer lock.

use std::collections::HashMap;

use primitive_types::U256;

use crate::approval::{self, Approval};
use crate::atom::RoleId;
use crate::blocks::BlockWindow;
use crate::constants::MAX_NUM_RULES;
use crate::error::{ChartError, Result};
use crate::events::Event;
use crate::fulfill;
use crate::registry::RoleRegistry;
use crate::rule::{canonical_hash, Action, RuleHash};
use crate::sig::Address;

/// Rule-map entry marking admin rules; user-management entries carry role
/// flags and can never reach this value.
pub const ADMIN_RULE_SENTINEL: U256 = U256::MAX;

/// Whether the role graph can change after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Static,
    Dynamic,
}

/// Definition of a role submitted to `add_role`.
#[derive(Debug, Clone)]
pub struct RoleDef {
    pub role_id: RoleId,
    /// The flag the new role claims; must come from the free pool.
    pub flag: U256,
    /// Flags of the direct seniors adopting the new role.
    pub senior_flags: U256,
    /// Flags of the direct juniors the new role adopts.
    pub junior_flags: U256,
    /// Rules governing grants/revokes of the new role.
    pub rule_hashes: Vec<RuleHash>,
}

#[derive(Debug, Clone)]
pub struct Chart {
    pub(crate) kind: ChartKind,
    pub(crate) registry: RoleRegistry,
    /// user → directly-assigned role flags.
    pub(crate) user_roles: HashMap<Address, U256>,
    /// role id → number of users holding it directly.
    pub(crate) assignment_counts: HashMap<RoleId, u64>,
    /// rule hash → flags of roles the rule governs, or the admin sentinel.
    pub(crate) rule_flags: HashMap<RuleHash, U256>,
    pub(crate) domain_separator: [u8; 32],
    pub(crate) blocks: BlockWindow,
}

impl Chart {
    pub fn kind(&self) -> ChartKind {
        self.kind
    }

    pub fn domain_separator(&self) -> [u8; 32] {
        self.domain_separator
    }

    pub fn registry(&self) -> &RoleRegistry {
        &self.registry
    }

    /// Height of the last sealed block.
    pub fn height(&self) -> u64 {
        self.blocks.height()
    }

    /// Record the next sealed block hash. Approvals must anchor to one of
    /// the most recent of these.
    pub fn seal_block(&mut self, hash: [u8; 32]) {
        self.blocks.seal(hash);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Direct assignment bits a user holds among active roles.
    pub fn direct_roles(&self, user: &Address) -> U256 {
        self.user_roles.get(user).copied().unwrap_or_default() & self.registry.active_flags()
    }

    /// Effective membership, closed over the junior relation: a user holds a
    /// role if any held role reaches it.
    pub fn has_role(&self, user: &Address, role_id: &RoleId) -> Result<bool> {
        let required = self.registry.require_flag(role_id)?;
        let held = self.direct_roles(user);
        if held & required == required {
            return Ok(true);
        }
        if held.is_zero() {
            return Ok(false);
        }
        let effective = self.registry.build_structure_mask(held);
        Ok(effective & required == required)
    }

    /// Direct membership only; inherited authority does not count.
    pub fn strictly_has_role(&self, user: &Address, role_id: &RoleId) -> Result<bool> {
        let required = self.registry.require_flag(role_id)?;
        Ok(self.direct_roles(user) & required == required)
    }

    /// Users currently holding a role directly. Base for relative quotas.
    pub fn assignment_count(&self, role_id: &RoleId) -> u64 {
        self.assignment_counts.get(role_id).copied().unwrap_or(0)
    }

    // ========================================================================
    // User management
    // ========================================================================

    /// Grant a role to the nominee under a registered grant rule. Granting a
    /// role already held directly is a no-op that still emits.
    pub fn grant_role(
        &mut self,
        approval: &Approval,
        nominee: &Address,
        role_id: &RoleId,
    ) -> Result<Event> {
        let flag = self.verify_user_management(approval, nominee, role_id, Action::Grant)?;
        let held = self.user_roles.entry(*nominee).or_default();
        if (*held & flag).is_zero() {
            *held = *held | flag;
            *self.assignment_counts.entry(*role_id).or_default() += 1;
        }
        Ok(Event::RoleGranted { user: *nominee, role_id: *role_id })
    }

    /// Revoke a role from the nominee under a registered revoke rule.
    /// Revoking a role held only through inheritance is a no-op: the direct
    /// bit is simply absent. TODO: surface a distinct outcome for that case
    /// once product decides whether it should be an error.
    pub fn revoke_role(
        &mut self,
        approval: &Approval,
        nominee: &Address,
        role_id: &RoleId,
    ) -> Result<Event> {
        let flag = self.verify_user_management(approval, nominee, role_id, Action::Revoke)?;
        if let Some(held) = self.user_roles.get_mut(nominee) {
            if !(*held & flag).is_zero() {
                *held = *held & !flag;
                if let Some(count) = self.assignment_counts.get_mut(role_id) {
                    *count = count.saturating_sub(1);
                }
            }
        }
        Ok(Event::RoleRevoked { user: *nominee, role_id: *role_id })
    }

    fn verify_user_management(
        &self,
        approval: &Approval,
        nominee: &Address,
        role_id: &RoleId,
        action: Action,
    ) -> Result<U256> {
        let flag = self.registry.require_flag(role_id)?;
        let inner = approval::user_mgt_digest(nominee, action, role_id, &approval.base_block_hash);
        let signers = self.verify_approval(approval, action, Some(nominee), Some(flag), &inner)?;
        fulfill::check(self, Some(nominee), &signers, &approval.atoms, &approval.assignment)?;
        Ok(flag)
    }

    // ========================================================================
    // Dynamic administration
    // ========================================================================

    /// Introduce a role under an admin rule: validate the definition, verify
    /// the approval, reject cycles, then wire the role into the graph and
    /// bind its rules.
    pub fn add_role(&mut self, approval: &Approval, def: &RoleDef) -> Result<Event> {
        if self.kind == ChartKind::Static {
            return Err(ChartError::ImmutableChart);
        }
        self.registry
            .validate_new_role(&def.role_id, def.flag, def.senior_flags, def.junior_flags)?;
        if def.rule_hashes.len() >= MAX_NUM_RULES {
            return Err(ChartError::TooManyRules);
        }
        if approval.self_sign_required {
            return Err(ChartError::UnexpectedSelfSign);
        }

        let inner = approval::add_role_digest(
            &def.role_id,
            def.flag,
            def.senior_flags,
            def.junior_flags,
            &def.rule_hashes,
            &approval.base_block_hash,
        );
        let signers = self.verify_approval(approval, Action::Admin, None, None, &inner)?;
        fulfill::check(self, None, &signers, &approval.atoms, &approval.assignment)?;

        let structure_mask =
            self.registry.check_cycle(def.flag, def.senior_flags, def.junior_flags)?;
        self.registry.apply_insert(
            def.role_id,
            def.flag,
            def.senior_flags,
            def.junior_flags,
            structure_mask,
        );
        for hash in &def.rule_hashes {
            let entry = self.rule_flags.entry(*hash).or_default();
            *entry = *entry | def.flag;
        }
        Ok(Event::RoleAdded {
            role_id: def.role_id,
            senior_flags: def.senior_flags,
            junior_flags: def.junior_flags,
        })
    }

    /// Retire a role under an admin rule. Its flag is never reissued;
    /// residual bits in user vectors are masked out by `active_flags`.
    pub fn remove_role(&mut self, approval: &Approval, role_id: &RoleId) -> Result<Event> {
        if self.kind == ChartKind::Static {
            return Err(ChartError::ImmutableChart);
        }
        self.registry.require_flag(role_id)?;

        let inner = approval::remove_role_digest(role_id, &approval.base_block_hash);
        let signers = self.verify_approval(approval, Action::Admin, None, None, &inner)?;
        fulfill::check(self, None, &signers, &approval.atoms, &approval.assignment)?;

        let flag = self.registry.apply_remove(role_id);
        self.rule_flags.retain(|_, entry| {
            if *entry == ADMIN_RULE_SENTINEL {
                return true;
            }
            *entry = *entry & !flag;
            !entry.is_zero()
        });
        self.assignment_counts.remove(role_id);
        Ok(Event::RoleRemoved { role_id: *role_id })
    }

    // ========================================================================
    // Shared verification pipeline
    // ========================================================================

    /// The steps every signed operation shares: base-block freshness, signer
    /// recovery and ordering, self-sign detection, rule lookup, self-sign
    /// consistency. Returns the ordered recovered signers.
    fn verify_approval(
        &self,
        approval: &Approval,
        action: Action,
        nominee: Option<&Address>,
        target_flag: Option<U256>,
        inner: &[u8; 32],
    ) -> Result<Vec<Address>> {
        if !self.blocks.is_recent(&approval.base_block_hash) {
            return Err(ChartError::StaleBaseBlock);
        }
        let signers = approval.recover_signers(&self.domain_separator, inner)?;
        let self_signed = nominee.map_or(false, |n| signers.iter().any(|signer| signer == n));

        let rule_hash = canonical_hash(action, approval.self_sign_required, &approval.atoms);
        let entry = self.rule_flags.get(&rule_hash).copied().unwrap_or_default();
        match target_flag {
            Some(flag) => {
                if entry & flag != flag {
                    return Err(ChartError::InvalidRule);
                }
            }
            None => {
                if entry != ADMIN_RULE_SENTINEL {
                    return Err(ChartError::InvalidAdminRule);
                }
            }
        }

        if self_signed != approval.self_sign_required {
            return Err(if approval.self_sign_required {
                ChartError::MissingSelfSign
            } else {
                ChartError::UnexpectedSelfSign
            });
        }
        Ok(signers)
    }
}
