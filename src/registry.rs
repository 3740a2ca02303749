//! Role registry: flag allocation, structure masks, and the topological index.
//!
//! The role DAG is never stored as a graph. Each active role owns a single-bit
//! flag and a structure mask (its flag OR'd with the structure masks of its
//! direct juniors), so "is J reachable from S" is one AND away. An ordered
//! index keeps juniors before seniors to amortize mask rebuilds on removal.

use std::collections::HashMap;

use primitive_types::U256;

use crate::atom::RoleId;
use crate::bits;
use crate::error::{ChartError, Result};

/// Per-role structural state, keyed by the flag's bit position.
#[derive(Debug, Clone)]
pub(crate) struct RoleSlot {
    pub(crate) role_id: RoleId,
    /// Own flag OR'd with the structure masks of all direct juniors.
    pub(crate) structure_mask: U256,
    /// Flags of direct juniors only.
    pub(crate) junior_mask: U256,
}

#[derive(Debug, Clone)]
pub struct RoleRegistry {
    /// role id → flag, the only name-to-bit binding.
    flags: HashMap<RoleId, U256>,
    /// flag bit position → structural state.
    slots: HashMap<u8, RoleSlot>,
    /// Active role flags ordered juniors-before-seniors.
    index: Vec<U256>,
    active: U256,
    free: U256,
}

impl Default for RoleRegistry {
    fn default() -> Self {
        RoleRegistry::new()
    }
}

impl RoleRegistry {
    pub fn new() -> Self {
        RoleRegistry {
            flags: HashMap::new(),
            slots: HashMap::new(),
            index: Vec::new(),
            active: U256::zero(),
            free: U256::MAX,
        }
    }

    /// Flag of a registered role, or zero.
    #[inline]
    pub fn lookup_flag(&self, role_id: &RoleId) -> U256 {
        self.flags.get(role_id).copied().unwrap_or_default()
    }

    /// Flag of a registered role, or `UnknownRole`.
    pub fn require_flag(&self, role_id: &RoleId) -> Result<U256> {
        let flag = self.lookup_flag(role_id);
        if flag.is_zero() {
            Err(ChartError::UnknownRole)
        } else {
            Ok(flag)
        }
    }

    /// Structure mask of an active flag, or zero.
    pub fn structure_mask(&self, flag: U256) -> U256 {
        self.slot(flag).map(|slot| slot.structure_mask).unwrap_or_default()
    }

    /// Direct-junior mask of an active flag, or zero.
    pub fn junior_mask(&self, flag: U256) -> U256 {
        self.slot(flag).map(|slot| slot.junior_mask).unwrap_or_default()
    }

    /// Role id owning an active flag.
    pub fn role_id_of(&self, flag: U256) -> Option<RoleId> {
        self.slot(flag).map(|slot| slot.role_id)
    }

    fn slot(&self, flag: U256) -> Option<&RoleSlot> {
        if !bits::is_single_bit(flag) {
            return None;
        }
        self.slots.get(&bits::bit_index(flag))
    }

    pub fn active_flags(&self) -> U256 {
        self.active
    }

    pub fn free_flags(&self) -> U256 {
        self.free
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Active role flags, juniors before seniors.
    pub fn index(&self) -> &[U256] {
        &self.index
    }

    /// OR of the structure masks of every active flag set in `flags`:
    /// the closure of a held-flag vector under inheritance.
    pub fn build_structure_mask(&self, flags: U256) -> U256 {
        let mut mask = U256::zero();
        bits::for_each_set_bit(flags & self.active, |position| {
            if let Some(slot) = self.slots.get(&position) {
                mask = mask | slot.structure_mask;
            }
        });
        mask
    }

    /// Pre-insertion checks that touch no state: flag shape and
    /// availability, id uniqueness, senior/junior existence.
    pub(crate) fn validate_new_role(
        &self,
        role_id: &RoleId,
        flag: U256,
        senior_flags: U256,
        junior_flags: U256,
    ) -> Result<()> {
        if !bits::is_single_bit(flag) {
            return Err(ChartError::MalformedRoleFlag);
        }
        if (flag & self.free).is_zero() {
            return Err(ChartError::RoleFlagTaken);
        }
        if !self.lookup_flag(role_id).is_zero() {
            return Err(ChartError::RoleIdTaken);
        }
        if !(senior_flags & !self.active).is_zero() {
            return Err(ChartError::SeniorsMissing);
        }
        if !(junior_flags & !self.active).is_zero() {
            return Err(ChartError::JuniorsMissing);
        }
        Ok(())
    }

    /// Structure mask the new role would own. Errors when a listed senior is
    /// already reachable through the junior set, which would close a cycle.
    pub(crate) fn check_cycle(
        &self,
        flag: U256,
        senior_flags: U256,
        junior_flags: U256,
    ) -> Result<U256> {
        let mut mask = flag;
        bits::for_each_set_bit(junior_flags, |position| {
            if let Some(slot) = self.slots.get(&position) {
                mask = mask | slot.structure_mask;
            }
        });
        if !(mask & senior_flags).is_zero() {
            return Err(ChartError::CycleDetected);
        }
        Ok(mask)
    }

    /// Wire a validated role into the graph. Callers must have passed the
    /// same inputs through `validate_new_role` and `check_cycle`; this step
    /// cannot fail.
    pub(crate) fn apply_insert(
        &mut self,
        role_id: RoleId,
        flag: U256,
        senior_flags: U256,
        junior_flags: U256,
        structure_mask: U256,
    ) {
        // Direct parents gain a junior; every role that can reach a parent
        // absorbs the new reachability. The earliest-listed direct parent
        // bounds the insertion slot so the new role precedes its ancestors.
        let mut insert_at = self.index.len();
        for (position, &existing) in self.index.iter().enumerate() {
            let slot = self
                .slots
                .get_mut(&bits::bit_index(existing))
                .expect("active flag has a slot");
            if !(existing & senior_flags).is_zero() {
                slot.junior_mask = slot.junior_mask | flag;
                if insert_at == self.index.len() {
                    insert_at = position;
                }
            }
            if !(slot.structure_mask & senior_flags).is_zero() {
                slot.structure_mask = slot.structure_mask | structure_mask;
            }
        }
        self.index.insert(insert_at, flag);
        self.slots.insert(
            bits::bit_index(flag),
            RoleSlot { role_id, structure_mask, junior_mask: junior_flags },
        );
        self.flags.insert(role_id, flag);
        self.free = self.free ^ flag;
        self.active = self.active | flag;
        debug_assert_eq!(bits::popcount(self.active) as usize, self.index.len());
    }

    /// Detach an active role: ancestors drop the direct edge and rebuild
    /// their masks from their (already rebuilt) juniors, then the slot and
    /// index entry go away. The flag is retired, never returned to the free
    /// pool, so it can never alias residual bits in user role vectors.
    pub(crate) fn apply_remove(&mut self, role_id: &RoleId) -> U256 {
        let flag = self.lookup_flag(role_id);
        debug_assert!(!flag.is_zero(), "caller resolves the role first");

        for position in 0..self.index.len() {
            let existing = self.index[position];
            if existing == flag {
                continue;
            }
            let slot_key = bits::bit_index(existing);
            let slot = self.slots.get_mut(&slot_key).expect("active flag has a slot");
            // the direct edge must be gone before the rebuild reads the
            // junior set, or the removed bit comes straight back
            slot.junior_mask = slot.junior_mask & !flag;
            let junior_mask = slot.junior_mask;
            if !(slot.structure_mask & flag).is_zero() {
                let rebuilt = existing | self.build_structure_mask(junior_mask);
                self.slots.get_mut(&slot_key).expect("active flag has a slot").structure_mask =
                    rebuilt;
            }
        }

        self.index.retain(|&entry| entry != flag);
        self.slots.remove(&bits::bit_index(flag));
        self.flags.remove(role_id);
        self.active = self.active & !flag;
        debug_assert_eq!(bits::popcount(self.active) as usize, self.index.len());
        flag
    }

    pub(crate) fn slots(&self) -> &HashMap<u8, RoleSlot> {
        &self.slots
    }

    pub(crate) fn from_parts(
        slots: HashMap<u8, RoleSlot>,
        index: Vec<U256>,
        active: U256,
        free: U256,
    ) -> Self {
        let flags = slots
            .iter()
            .map(|(position, slot)| (slot.role_id, bits::flag_at(*position)))
            .collect();
        RoleRegistry { flags, slots, index, active, free }
    }
}
