//! orgchart - multi-signature access control over a hierarchical role DAG.
//!
//! Roles form a DAG in which seniors inherit their juniors' authority. Each
//! active role owns a single-bit flag and a structure mask, so membership
//! checks are bit arithmetic. Grants, revokes, and graph changes are driven
//! by multi-signature approvals checked against canonically-hashed rules.
//!
//! The engine is a single owned [`Chart`] value: synchronous, in-memory, and
//! atomic per operation. Construction goes through [`ChartBuilder`]; service
//! hosts can persist snapshots with [`Store`] and expose the HTTP surface
//! behind the `server` feature.

pub mod approval;
pub mod atom;
pub mod bits;
pub mod blocks;
pub mod builder;
pub mod chart;
pub mod constants;
pub mod error;
pub mod events;
pub mod fulfill;
pub mod hashing;
pub mod registry;
pub mod rule;
#[cfg(feature = "server")]
pub mod server;
pub mod sig;
pub mod store;

pub use approval::Approval;
pub use atom::{Atom, RoleId};
pub use blocks::BlockWindow;
pub use builder::{ChartBuilder, Deployment};
pub use chart::{Chart, ChartKind, RoleDef, ADMIN_RULE_SENTINEL};
pub use error::{ChartError, Result};
pub use events::Event;
pub use registry::RoleRegistry;
pub use rule::{Action, Rule, RuleHash};
pub use sig::{Address, Signature};
pub use store::Store;
