//! Role identifiers and quantified role requirements (atoms).

use std::fmt;

use primitive_types::U256;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::{ATOM_QUANTITY_SHIFT, ATOM_RELATIVE_BIT, ATOM_STRICT_BIT, ROLE_ID_BYTES};
use crate::error::{ChartError, Result};
use crate::hashing::keccak256;

/// An opaque role identifier: 30 significant low bytes, top two bytes zero.
///
/// The reserved top bytes are where an encoded atom keeps its quantity and
/// modifiers, so a stored role id must never use them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoleId(pub(crate) [u8; 32]);

impl RoleId {
    /// Derive a role id from a human-readable role name.
    pub fn named(name: &str) -> Self {
        let mut bytes = keccak256(name.as_bytes());
        for byte in &mut bytes[..32 - ROLE_ID_BYTES] {
            *byte = 0;
        }
        RoleId(bytes)
    }

    /// Wrap raw bytes, requiring the reserved top bytes to be zero.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self> {
        if bytes[..32 - ROLE_ID_BYTES].iter().any(|byte| *byte != 0) {
            return Err(ChartError::MalformedRoleId);
        }
        Ok(RoleId(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The id as a 256-bit word (occupies the low 30 bytes).
    pub fn as_word(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for RoleId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RoleId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let raw = text.strip_prefix("0x").unwrap_or(&text);
        let bytes = hex::decode(raw).map_err(D::Error::custom)?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| D::Error::custom("expected a 32-byte hex role id"))?;
        RoleId::from_bytes(bytes).map_err(D::Error::custom)
    }
}

/// One quantified role requirement inside a rule.
///
/// `quantity` is an absolute signer count, or a percentage of the role's
/// direct membership when `relative` is set. `strict` demands direct
/// assignment instead of inherited membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Atom {
    pub role_id: RoleId,
    pub quantity: u8,
    pub strict: bool,
    pub relative: bool,
}

impl Atom {
    pub fn new(role_id: RoleId, quantity: u8, strict: bool, relative: bool) -> Result<Self> {
        validate_quantity(quantity, relative)?;
        Ok(Atom { role_id, quantity, strict, relative })
    }

    /// An absolute, inheritance-tolerant requirement.
    pub fn absolute(role_id: RoleId, quantity: u8) -> Result<Self> {
        Atom::new(role_id, quantity, false, false)
    }

    /// Pack into the canonical 256-bit atom word.
    pub fn encode(&self) -> U256 {
        let mut word = self.role_id.as_word();
        word = word | (U256::from(self.quantity) << ATOM_QUANTITY_SHIFT);
        if self.strict {
            word = word | (U256::one() << ATOM_STRICT_BIT);
        }
        if self.relative {
            word = word | (U256::one() << ATOM_RELATIVE_BIT);
        }
        word
    }

    /// The canonical encoding as a big-endian 32-byte word.
    pub fn word_bytes(&self) -> [u8; 32] {
        crate::hashing::word_of(self.encode())
    }

    /// Unpack an atom word, validating the layout and quantity.
    pub fn decode(word: U256) -> Result<Self> {
        let mut bytes = [0u8; 32];
        word.to_big_endian(&mut bytes);

        let modifiers = bytes[0];
        if modifiers & !0b11 != 0 {
            return Err(ChartError::MalformedAtom);
        }
        let strict = modifiers & 0b01 != 0;
        let relative = modifiers & 0b10 != 0;
        let quantity = bytes[1];
        validate_quantity(quantity, relative)?;

        bytes[0] = 0;
        bytes[1] = 0;
        Ok(Atom { role_id: RoleId(bytes), quantity, strict, relative })
    }
}

fn validate_quantity(quantity: u8, relative: bool) -> Result<()> {
    if quantity == 0 || (relative && quantity > 100) {
        return Err(ChartError::BadQuantity(quantity));
    }
    Ok(())
}
