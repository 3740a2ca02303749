//! Event records emitted by successful mutations.

use primitive_types::U256;
use serde::Serialize;

use crate::atom::RoleId;
use crate::sig::Address;

/// One emitted event record. Hosts collect these into their transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    RoleGranted { user: Address, role_id: RoleId },
    RoleRevoked { user: Address, role_id: RoleId },
    RoleAdded { role_id: RoleId, senior_flags: U256, junior_flags: U256 },
    RoleRemoved { role_id: RoleId },
}
