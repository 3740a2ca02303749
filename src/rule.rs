//! Rules and their canonical hashes.
//!
//! Only the hash of a rule is ever stored; provers and the engine recompute
//! it from the same sorted atom encoding, so permuting a rule body never
//! changes its identity.

use primitive_types::U256;

use crate::atom::Atom;
use crate::constants::{ACTION_ADMIN, ACTION_GRANT, ACTION_REVOKE, RULE_TYPE};
use crate::hashing::{keccak256, keccak_words, word_of, word_of_bool};

/// What a rule authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Grant,
    Revoke,
    Admin,
}

impl Action {
    pub fn name(&self) -> &'static [u8] {
        match self {
            Action::Grant => ACTION_GRANT,
            Action::Revoke => ACTION_REVOKE,
            Action::Admin => ACTION_ADMIN,
        }
    }

    /// keccak of the action name, folded into rule hashes and request digests.
    pub fn tag(&self) -> [u8; 32] {
        keccak256(self.name())
    }
}

/// A canonical rule hash.
pub type RuleHash = [u8; 32];

/// A quorum rule: which signers, in what quantity, authorize an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub action: Action,
    /// Whether the nominee must co-sign. Only meaningful for grants, but
    /// always part of the hash.
    pub self_sign_required: bool,
    pub atoms: Vec<Atom>,
}

impl Rule {
    pub fn new(action: Action, self_sign_required: bool, atoms: Vec<Atom>) -> Self {
        Rule { action, self_sign_required, atoms }
    }

    /// The canonical hash of this rule.
    pub fn hash(&self) -> RuleHash {
        canonical_hash(self.action, self.self_sign_required, &self.atoms)
    }
}

/// Compute a rule hash from its parts. Atoms are sorted ascending by their
/// encoded word value before hashing.
pub fn canonical_hash(action: Action, self_sign_required: bool, atoms: &[Atom]) -> RuleHash {
    let mut words: Vec<U256> = atoms.iter().map(Atom::encode).collect();
    words.sort();
    let sorted: Vec<[u8; 32]> = words.into_iter().map(word_of).collect();
    let atoms_digest = keccak_words(&sorted);

    keccak_words(&[
        keccak256(RULE_TYPE),
        action.tag(),
        word_of_bool(self_sign_required),
        atoms_digest,
    ])
}
