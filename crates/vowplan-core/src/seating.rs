//! Seating assignment.
//!
//! A [`SeatingPlan`] maps each table name to the ordered list of guest ids
//! sitting there. Guests absent from every table are unseated; that set is
//! never stored, only computed from the guest list on demand.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::RecordId;

pub const DEFAULT_TABLES: [&str; 4] = ["Table 1", "Table 2", "Table 3", "Table 4"];

/// Drop target name that means "not at any table".
pub const UNSEATED: &str = "unseated";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeatingError {
    #[error("Unknown table '{0}'")]
    UnknownTable(String),
}

/// Where a guest is being moved to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeatTarget {
    Table(String),
    Unseated,
}

impl SeatTarget {
    pub fn table(name: impl Into<String>) -> Self {
        SeatTarget::Table(name.into())
    }
}

impl FromStr for SeatTarget {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case(UNSEATED) {
            Ok(SeatTarget::Unseated)
        } else {
            Ok(SeatTarget::Table(s.to_string()))
        }
    }
}

impl fmt::Display for SeatTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeatTarget::Table(name) => f.write_str(name),
            SeatTarget::Unseated => f.write_str(UNSEATED),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeatingPlan {
    tables: IndexMap<String, Vec<RecordId>>,
}

impl Default for SeatingPlan {
    fn default() -> Self {
        Self::with_tables(DEFAULT_TABLES)
    }
}

impl SeatingPlan {
    /// An empty plan over the given tables, in order.
    pub fn with_tables<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: names.into_iter().map(|n| (n.into(), Vec::new())).collect(),
        }
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &[RecordId])> {
        self.tables.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn guests_at(&self, table: &str) -> Option<&[RecordId]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    /// The table a guest sits at, if any.
    pub fn table_of(&self, guest: RecordId) -> Option<&str> {
        self.tables
            .iter()
            .find(|(_, ids)| ids.contains(&guest))
            .map(|(name, _)| name.as_str())
    }

    /// Move a guest: clear it from every table, then append it to the target
    /// table. Moving to [`SeatTarget::Unseated`] only clears.
    ///
    /// An unknown table is rejected before anything is touched.
    pub fn move_guest(&mut self, guest: RecordId, target: &SeatTarget) -> Result<(), SeatingError> {
        if let SeatTarget::Table(name) = target
            && !self.tables.contains_key(name)
        {
            return Err(SeatingError::UnknownTable(name.clone()));
        }

        self.remove_guest(guest);

        if let SeatTarget::Table(name) = target
            && let Some(ids) = self.tables.get_mut(name)
        {
            ids.push(guest);
        }
        Ok(())
    }

    /// Remove a guest from every table. Returns true if it was seated.
    pub fn remove_guest(&mut self, guest: RecordId) -> bool {
        let mut removed = false;
        for ids in self.tables.values_mut() {
            let before = ids.len();
            ids.retain(|id| *id != guest);
            removed |= ids.len() != before;
        }
        removed
    }

    /// Every guest id sitting at some table.
    pub fn seated(&self) -> HashSet<RecordId> {
        self.tables.values().flatten().copied().collect()
    }

    /// `all − seated`, preserving the order of `all`.
    pub fn unseated(&self, all: impl IntoIterator<Item = RecordId>) -> Vec<RecordId> {
        let seated = self.seated();
        all.into_iter().filter(|id| !seated.contains(id)).collect()
    }

    /// Drop ids that are not in `known`. Returns the purged ids.
    pub fn retain_known(&mut self, known: &HashSet<RecordId>) -> Vec<RecordId> {
        let mut purged = Vec::new();
        for ids in self.tables.values_mut() {
            ids.retain(|id| {
                let keep = known.contains(id);
                if !keep {
                    purged.push(*id);
                }
                keep
            });
        }
        purged
    }

    /// Keep only the first occurrence of each guest id across all tables.
    /// Returns the ids whose extra seats were removed.
    pub fn dedupe(&mut self) -> Vec<RecordId> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for ids in self.tables.values_mut() {
            ids.retain(|id| {
                let first = seen.insert(*id);
                if !first {
                    duplicates.push(*id);
                }
                first
            });
        }
        duplicates
    }
}
