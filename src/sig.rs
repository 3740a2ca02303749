//! Signer addresses and recoverable ECDSA signatures.

use std::fmt;

use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ChartError, Result};
use crate::hashing::keccak256;

/// A 20-byte signer identifier.
///
/// The `Ord` impl compares addresses as big-endian integers; approvals rely
/// on it for the strictly-ascending signer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Parse a hex address, with or without the `0x` prefix.
    pub fn parse(text: &str) -> Option<Self> {
        let raw = text.strip_prefix("0x").unwrap_or(text);
        let bytes = hex::decode(raw).ok()?;
        let bytes: [u8; 20] = bytes.try_into().ok()?;
        Some(Address(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Address::parse(&text).ok_or_else(|| D::Error::custom("expected a 20-byte hex address"))
    }
}

/// A 65-byte `r || s || v` signature. `v` may be 0/1 or 27/28.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 65]);

impl Signature {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; 65] = bytes.try_into().map_err(|_| ChartError::MalformedSignature)?;
        Ok(Signature(bytes))
    }
}

/// The address of a verifying key: low 20 bytes of the keccak of the
/// uncompressed public key.
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[12..]);
    Address(out)
}

/// Recover the signer of a 32-byte prehash.
pub fn recover(digest: &[u8; 32], signature: &Signature) -> Result<Address> {
    let v = signature.0[64];
    let recovery = RecoveryId::from_byte(if v >= 27 { v - 27 } else { v })
        .ok_or(ChartError::MalformedSignature)?;
    let parsed = EcdsaSignature::from_slice(&signature.0[..64])
        .map_err(|_| ChartError::MalformedSignature)?;
    let key = VerifyingKey::recover_from_prehash(digest, &parsed, recovery)
        .map_err(|_| ChartError::MalformedSignature)?;
    Ok(address_of(&key))
}
