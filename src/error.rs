//! Error taxonomy for chart operations.
//!
//! Every operation validates completely before touching state, so any error
//! below implies the chart is exactly as it was before the call.

use thiserror::Error;

use crate::sig::Address;

/// The error type for every engine operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChartError {
    /// The role id is not in the registry.
    #[error("role is not registered")]
    UnknownRole,

    /// The rule hash is not registered for the target role.
    #[error("rule is not registered for the target role")]
    InvalidRule,

    /// The rule hash is not a registered admin rule.
    #[error("rule is not a registered admin rule")]
    InvalidAdminRule,

    /// The base block hash is outside the look-back window.
    #[error("base block hash is not recent")]
    StaleBaseBlock,

    /// More signatures than the signer limit admits.
    #[error("{0} signatures exceed the signer limit")]
    TooManySigners(usize),

    /// Recovered signers were not strictly ascending.
    #[error("recovered signers are not strictly ascending")]
    UnorderedSigners,

    /// The rule requires the nominee's own signature.
    #[error("approval is missing the nominee's own signature")]
    MissingSelfSign,

    /// The nominee signed but the rule does not admit a self-sign.
    #[error("approval carries an unexpected self-signature")]
    UnexpectedSelfSign,

    /// A non-nominee signer was assigned outside the atom list.
    #[error("assignment index {0} is out of range")]
    InvalidAssignment(usize),

    /// A signer does not hold the role its atom demands.
    #[error("signer {0} does not hold the assigned role")]
    PermissionDenied(Address),

    /// An atom's quantity requirement was not met.
    #[error("quota of atom {0} is not met")]
    NotEnoughSigners(usize),

    /// The proposed role would make a senior reachable from its juniors.
    #[error("role would close a cycle in the role graph")]
    CycleDetected,

    /// The role id is already bound to an active role.
    #[error("role id is already registered")]
    RoleIdTaken,

    /// The flag is active or was retired by an earlier removal.
    #[error("role flag is not available")]
    RoleFlagTaken,

    /// A role flag must have exactly one bit set.
    #[error("role flag is not a single bit")]
    MalformedRoleFlag,

    /// A role id must leave its top two bytes zero.
    #[error("role id top bytes are reserved")]
    MalformedRoleId,

    /// A listed senior is not an active role.
    #[error("a listed senior role is not active")]
    SeniorsMissing,

    /// A listed junior is not an active role.
    #[error("a listed junior role is not active")]
    JuniorsMissing,

    /// Too many rule hashes attached to one role.
    #[error("too many rules attached to one role")]
    TooManyRules,

    /// Atom quantity outside its admissible range.
    #[error("atom quantity {0} is out of range")]
    BadQuantity(u8),

    /// An encoded atom uses modifier bits the engine does not know.
    #[error("atom modifier bits are unknown")]
    MalformedAtom,

    /// A signature failed to parse or recover.
    #[error("signature is malformed or unrecoverable")]
    MalformedSignature,

    /// Static charts never add or remove roles.
    #[error("chart is immutable")]
    ImmutableChart,

    /// Snapshot persistence failed.
    #[error("storage: {0}")]
    Storage(String),
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, ChartError>;
