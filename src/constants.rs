//! Engine limits, atom layout, and signing-domain constants.

/// Number of recent blocks whose hashes may anchor a signable request.
pub const LOOK_BACK_LENGTH: usize = 3;

/// Upper bound on signatures per approval.
pub const MAX_NUM_SIGNERS: usize = 100;

/// A role may carry fewer than this many rule hashes.
pub const MAX_NUM_RULES: usize = 10;

/// Bit position of the strict modifier inside an encoded atom.
pub const ATOM_STRICT_BIT: usize = 248;

/// Bit position of the relative modifier inside an encoded atom.
pub const ATOM_RELATIVE_BIT: usize = 249;

/// Bit offset of the quantity byte inside an encoded atom.
pub const ATOM_QUANTITY_SHIFT: usize = 240;

/// Significant low bytes of a role id; the top two bytes stay zero.
pub const ROLE_ID_BYTES: usize = 30;

// Action names folded into rule hashes and request digests.
pub const ACTION_GRANT: &[u8] = b"grant";
pub const ACTION_REVOKE: &[u8] = b"revoke";
pub const ACTION_ADMIN: &[u8] = b"admin";

/// Canonical type string hashed into every rule hash.
pub const RULE_TYPE: &[u8] = b"Rule(bytes32 type,bool selfSigned,bytes32 ruleHash)";

// Request type strings, one per signable operation.
pub const USER_MGT_REQUEST_TYPE: &[u8] =
    b"UserManagementRequest(address nominee,bytes32 action,bytes32 role,bytes32 baseBlockHash)";
pub const ADD_ROLE_REQUEST_TYPE: &[u8] =
    b"AddRoleRequest(bytes32 roleId,bytes32 roleFlag,bytes32 seniorFlags,bytes32 juniorFlags,bytes32 hashOfRuleHashes,bytes32 baseBlockHash)";
pub const REMOVE_ROLE_REQUEST_TYPE: &[u8] =
    b"RemoveRoleRequest(bytes32 roleId,bytes32 baseBlockHash)";

// Signing-domain identity.
pub const DOMAIN_TYPE: &[u8] =
    b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract,bytes32 salt)";
pub const DOMAIN_NAME: &[u8] = b"OrgChart";
pub const DOMAIN_VERSION: &[u8] = b"1";
