//! Signed approval bundles, request digests, and signer recovery.
//!
//! The digest builders are public so off-engine provers can assemble the
//! exact payload the engine will verify.

use primitive_types::U256;

use crate::atom::{Atom, RoleId};
use crate::constants::{
    ADD_ROLE_REQUEST_TYPE, MAX_NUM_SIGNERS, REMOVE_ROLE_REQUEST_TYPE, USER_MGT_REQUEST_TYPE,
};
use crate::error::{ChartError, Result};
use crate::hashing::{keccak256, keccak_words, signable_digest, word_of, word_of_address};
use crate::rule::{Action, RuleHash};
use crate::sig::{self, Address, Signature};

/// A multi-signature approval of one request.
#[derive(Debug, Clone)]
pub struct Approval {
    /// Signatures ordered by ascending recovered signer address.
    pub signatures: Vec<Signature>,
    /// The rule body the signers are fulfilling.
    pub atoms: Vec<Atom>,
    /// One atom index per signature; `atoms.len()` marks the nominee's
    /// self-sign.
    pub assignment: Vec<usize>,
    pub self_sign_required: bool,
    pub base_block_hash: [u8; 32],
}

impl Approval {
    /// Recover the signers against the wrapped request digest, enforcing the
    /// signer limit and the strictly-ascending order that doubles as a
    /// uniqueness check.
    pub(crate) fn recover_signers(
        &self,
        domain: &[u8; 32],
        inner: &[u8; 32],
    ) -> Result<Vec<Address>> {
        if self.signatures.len() > MAX_NUM_SIGNERS {
            return Err(ChartError::TooManySigners(self.signatures.len()));
        }
        let digest = signable_digest(domain, inner);
        let mut signers = Vec::with_capacity(self.signatures.len());
        let mut last: Option<Address> = None;
        for signature in &self.signatures {
            let signer = sig::recover(&digest, signature)?;
            if let Some(previous) = last {
                if signer <= previous {
                    return Err(ChartError::UnorderedSigners);
                }
            }
            last = Some(signer);
            signers.push(signer);
        }
        Ok(signers)
    }
}

/// Inner struct hash of a grant or revoke request.
pub fn user_mgt_digest(
    nominee: &Address,
    action: Action,
    role_id: &RoleId,
    base_block_hash: &[u8; 32],
) -> [u8; 32] {
    keccak_words(&[
        keccak256(USER_MGT_REQUEST_TYPE),
        word_of_address(nominee),
        action.tag(),
        *role_id.as_bytes(),
        *base_block_hash,
    ])
}

/// Inner struct hash of an add-role request. `rule_hashes` are compressed
/// into a single digest before entering the struct hash.
pub fn add_role_digest(
    role_id: &RoleId,
    flag: U256,
    senior_flags: U256,
    junior_flags: U256,
    rule_hashes: &[RuleHash],
    base_block_hash: &[u8; 32],
) -> [u8; 32] {
    keccak_words(&[
        keccak256(ADD_ROLE_REQUEST_TYPE),
        *role_id.as_bytes(),
        word_of(flag),
        word_of(senior_flags),
        word_of(junior_flags),
        keccak_words(rule_hashes),
        *base_block_hash,
    ])
}

/// Inner struct hash of a remove-role request.
pub fn remove_role_digest(role_id: &RoleId, base_block_hash: &[u8; 32]) -> [u8; 32] {
    keccak_words(&[
        keccak256(REMOVE_ROLE_REQUEST_TYPE),
        *role_id.as_bytes(),
        *base_block_hash,
    ])
}
