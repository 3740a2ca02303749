//! keccak-256 digests, fixed-width word encoding, and request wrapping.
//!
//! Signed requests are hashed the same way on the prover and verifier side:
//! an inner struct hash over 32-byte words, bound to the deployment's domain
//! separator, then wrapped once more as a signed message.

use primitive_types::U256;
use sha3::{Digest, Keccak256};

use crate::constants::{DOMAIN_NAME, DOMAIN_TYPE, DOMAIN_VERSION};
use crate::sig::Address;

/// keccak-256 of a byte string.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// keccak-256 over the concatenation of 32-byte words.
pub fn keccak_words(words: &[[u8; 32]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for word in words {
        hasher.update(word);
    }
    hasher.finalize().into()
}

/// A 256-bit value as a big-endian 32-byte word.
#[inline]
pub fn word_of(value: U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    value.to_big_endian(&mut out);
    out
}

/// A u64 as a left-padded 32-byte word.
#[inline]
pub fn word_of_u64(value: u64) -> [u8; 32] {
    word_of(U256::from(value))
}

/// A bool as a 32-byte word, the low byte carrying the value.
#[inline]
pub fn word_of_bool(value: bool) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[31] = value as u8;
    out
}

/// An address as a left-padded 32-byte word.
#[inline]
pub fn word_of_address(address: &Address) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[12..].copy_from_slice(&address.0);
    out
}

/// Wrap an inner struct hash into the digest signers actually sign:
/// `0x19 0x01 || domain || inner`, then the 32-byte signed-message prefix.
pub fn signable_digest(domain: &[u8; 32], inner: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update([0x19, 0x01]);
    hasher.update(domain);
    hasher.update(inner);
    let wrapped: [u8; 32] = hasher.finalize().into();

    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n32");
    hasher.update(wrapped);
    hasher.finalize().into()
}

/// Per-deployment domain separator, computed once at construction.
pub fn domain_separator(chain_id: u64, engine_address: &Address, salt: &[u8; 32]) -> [u8; 32] {
    keccak_words(&[
        keccak256(DOMAIN_TYPE),
        keccak256(DOMAIN_NAME),
        keccak256(DOMAIN_VERSION),
        word_of_u64(chain_id),
        word_of_address(engine_address),
        *salt,
    ])
}
