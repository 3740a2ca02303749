//! Rule fulfillment: does a signer set satisfy a rule body?
//!
//! The engine only checks the caller-supplied signer→atom assignment; it
//! never solves for one.

use crate::atom::Atom;
use crate::chart::Chart;
use crate::constants::MAX_NUM_SIGNERS;
use crate::error::{ChartError, Result};
use crate::sig::Address;

/// Verify that `signers` fulfill every atom under `assignment` (one atom
/// index per signer). The nominee's own signature never counts toward an
/// atom; self-sign consistency is checked upstream.
pub(crate) fn check(
    chart: &Chart,
    nominee: Option<&Address>,
    signers: &[Address],
    atoms: &[Atom],
    assignment: &[usize],
) -> Result<()> {
    let mut counts = vec![0usize; atoms.len()];

    for (position, signer) in signers.iter().enumerate() {
        if nominee == Some(signer) {
            continue;
        }
        let index = assignment
            .get(position)
            .copied()
            .ok_or(ChartError::InvalidAssignment(position))?;
        let atom = atoms.get(index).ok_or(ChartError::InvalidAssignment(index))?;
        let holds = if atom.strict {
            chart.strictly_has_role(signer, &atom.role_id)?
        } else {
            chart.has_role(signer, &atom.role_id)?
        };
        if !holds {
            return Err(ChartError::PermissionDenied(*signer));
        }
        counts[index] += 1;
    }

    for (index, atom) in atoms.iter().enumerate() {
        let required = if atom.relative {
            // percentage of the role's direct membership, rounded up;
            // never below 1, never above the signer limit
            let base = chart.assignment_count(&atom.role_id) as u128;
            let need = (base * atom.quantity as u128).div_ceil(100) as usize;
            need.clamp(1, MAX_NUM_SIGNERS)
        } else {
            atom.quantity as usize
        };
        if counts[index] < required {
            return Err(ChartError::NotEnoughSigners(index));
        }
    }
    Ok(())
}
