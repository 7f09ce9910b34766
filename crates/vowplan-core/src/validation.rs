use std::collections::HashSet;

use thiserror::Error;

use crate::{PlanningState, RecordId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Guest id {0} is used by more than one guest")]
    DuplicateGuestId(RecordId),

    #[error("Guest {guest} is seated at both '{first}' and '{second}'")]
    DuplicateSeat {
        guest: RecordId,
        first: String,
        second: String,
    },

    #[error("Table '{table}' references unknown guest {guest}")]
    UnknownGuest { guest: RecordId, table: String },
}

/// Check the planning document's structural invariants: unique guest ids,
/// no guest at two tables, no table referencing a missing guest.
pub fn validate_planning_state(state: &PlanningState) -> Result<(), ValidationError> {
    let mut guests = HashSet::new();
    for guest in &state.guest_list {
        if !guests.insert(guest.id) {
            return Err(ValidationError::DuplicateGuestId(guest.id));
        }
    }

    let mut seated: Vec<(RecordId, &str)> = Vec::new();
    for (table, ids) in state.seating_plan.tables() {
        for id in ids {
            if let Some((_, first)) = seated.iter().find(|(g, _)| g == id) {
                return Err(ValidationError::DuplicateSeat {
                    guest: *id,
                    first: first.to_string(),
                    second: table.to_string(),
                });
            }
            if !guests.contains(id) {
                return Err(ValidationError::UnknownGuest {
                    guest: *id,
                    table: table.to_string(),
                });
            }
            seated.push((*id, table));
        }
    }

    Ok(())
}

/// Bring a planning document back in line with [`validate_planning_state`]
/// where that can be done without losing guest records: duplicate seats and
/// dangling seat references are dropped. Returns the ids that were unseated.
pub fn repair_seating(state: &mut PlanningState) -> Vec<RecordId> {
    let known: HashSet<RecordId> = state.guest_ids().collect();
    let mut dropped = state.seating_plan.dedupe();
    dropped.extend(state.seating_plan.retain_known(&known));
    dropped
}
