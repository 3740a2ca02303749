//! Shared fixtures: deterministic signers and approval assembly.
#![allow(dead_code)]

use k256::ecdsa::SigningKey;

use orgchart::approval::{add_role_digest, remove_role_digest, user_mgt_digest};
use orgchart::hashing::signable_digest;
use orgchart::{
    Action, Address, Approval, Atom, Chart, Deployment, RoleDef, RoleId, Rule, Signature,
};

pub struct Signer {
    pub key: SigningKey,
    pub address: Address,
}

/// Deterministic signer; distinct seeds give distinct addresses.
pub fn signer(seed: u8) -> Signer {
    assert_ne!(seed, 0);
    let mut bytes = [0u8; 32];
    bytes[31] = seed;
    let key = SigningKey::from_slice(&bytes).expect("nonzero scalar");
    let address = orgchart::sig::address_of(key.verifying_key());
    Signer { key, address }
}

pub fn deployment() -> Deployment {
    Deployment {
        chain_id: 31337,
        engine_address: Address([0x0E; 20]),
        salt: [0u8; 32],
    }
}

pub const GENESIS: [u8; 32] = [0xAB; 32];

/// Seal one block so approvals have something fresh to anchor to.
pub fn seal_genesis(chart: &mut Chart) -> [u8; 32] {
    chart.seal_block(GENESIS);
    GENESIS
}

pub fn sign65(signer: &Signer, digest: &[u8; 32]) -> Signature {
    let (signature, recovery) = signer.key.sign_prehash_recoverable(digest).expect("sign");
    let mut raw = [0u8; 65];
    raw[..64].copy_from_slice(&signature.to_bytes());
    raw[64] = recovery.to_byte() + 27;
    Signature(raw)
}

/// Assemble an approval over an inner request digest. `entries` pairs each
/// signer with its atom index (use `rule.atoms.len()` for a self-sign);
/// signatures come out ordered by signer address, as the engine expects.
pub fn approval_for(
    chart: &Chart,
    inner: [u8; 32],
    rule: &Rule,
    entries: &[(&Signer, usize)],
    base_block: [u8; 32],
) -> Approval {
    let digest = signable_digest(&chart.domain_separator(), &inner);
    let mut signed: Vec<(Address, Signature, usize)> = entries
        .iter()
        .map(|&(signer, index)| (signer.address, sign65(signer, &digest), index))
        .collect();
    signed.sort_by_key(|entry| entry.0);
    Approval {
        signatures: signed.iter().map(|entry| entry.1).collect(),
        atoms: rule.atoms.clone(),
        assignment: signed.iter().map(|entry| entry.2).collect(),
        self_sign_required: rule.self_sign_required,
        base_block_hash: base_block,
    }
}

/// Approval for a grant/revoke of `role` to `nominee`.
pub fn user_approval(
    chart: &Chart,
    action: Action,
    rule: &Rule,
    nominee: &Signer,
    nominee_signs: bool,
    co_signers: &[(&Signer, usize)],
    role: &RoleId,
    base_block: [u8; 32],
) -> Approval {
    let inner = user_mgt_digest(&nominee.address, action, role, &base_block);
    let mut entries: Vec<(&Signer, usize)> = co_signers.to_vec();
    if nominee_signs {
        entries.push((nominee, rule.atoms.len()));
    }
    approval_for(chart, inner, rule, &entries, base_block)
}

/// Approval for adding `def` under `rule` (an admin rule).
pub fn add_role_approval(
    chart: &Chart,
    rule: &Rule,
    def: &RoleDef,
    co_signers: &[(&Signer, usize)],
    base_block: [u8; 32],
) -> Approval {
    let inner = add_role_digest(
        &def.role_id,
        def.flag,
        def.senior_flags,
        def.junior_flags,
        &def.rule_hashes,
        &base_block,
    );
    approval_for(chart, inner, rule, co_signers, base_block)
}

/// Approval for removing `role` under `rule` (an admin rule).
pub fn remove_role_approval(
    chart: &Chart,
    rule: &Rule,
    role: &RoleId,
    co_signers: &[(&Signer, usize)],
    base_block: [u8; 32],
) -> Approval {
    let inner = remove_role_digest(role, &base_block);
    approval_for(chart, inner, rule, co_signers, base_block)
}

/// An absolute (inheritance-tolerant) atom on a named role.
pub fn quorum_atom(role: &str, quantity: u8) -> Atom {
    Atom::absolute(RoleId::named(role), quantity).expect("valid atom")
}
