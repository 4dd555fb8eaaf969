//! Ordered Workspace condition set
//!
//! Holds at most one [`Condition`] per [`WorkspaceConditionType`]. Unrelated
//! types keep their insertion order; upserting an existing type replaces it in
//! place. An upsert whose status, reason and message match the stored
//! condition is a no-op, so `lastTransitionTime` only moves on real
//! transitions and status writes stay idempotent.

use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::{Condition, ConditionStatus, WorkspaceConditionType};

/// Ordered collection of Workspace conditions keyed by type
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(from = "Vec<Condition>", into = "Vec<Condition>")]
pub struct ConditionSet {
    entries: Vec<Condition>,
}

impl ConditionSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the condition of the given type
    pub fn get(&self, type_: WorkspaceConditionType) -> Option<&Condition> {
        self.entries.iter().find(|c| c.type_ == type_)
    }

    /// Whether a condition of the given type exists with the given status
    pub fn has_status(&self, type_: WorkspaceConditionType, status: ConditionStatus) -> bool {
        self.get(type_).is_some_and(|c| c.status == status)
    }

    /// Insert or replace the condition of `condition.type_`.
    ///
    /// Returns `false` (and leaves the stored timestamp untouched) when the
    /// stored condition already has the same status, reason and message.
    pub fn upsert(&mut self, condition: Condition) -> bool {
        match self.entries.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) if existing.same_content(&condition) => false,
            Some(existing) => {
                *existing = condition;
                true
            }
            None => {
                self.entries.push(condition);
                true
            }
        }
    }

    /// Remove the condition of the given type; returns whether one was removed
    pub fn clear(&mut self, type_: WorkspaceConditionType) -> bool {
        let before = self.entries.len();
        self.entries.retain(|c| c.type_ != type_);
        self.entries.len() != before
    }

    /// Remove every condition whose type is listed; returns whether anything was removed
    pub fn clear_all(&mut self, types: &[WorkspaceConditionType]) -> bool {
        types
            .iter()
            .fold(false, |removed, t| self.clear(*t) || removed)
    }

    /// Iterate conditions in order
    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.entries.iter()
    }

    /// Number of conditions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set holds no conditions
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<Condition> for ConditionSet {
    fn from_iter<I: IntoIterator<Item = Condition>>(iter: I) -> Self {
        let mut set = ConditionSet::new();
        for condition in iter {
            set.upsert(condition);
        }
        set
    }
}

// Persisted lists are normalised on read so duplicates written by older
// controllers collapse to the last entry of each type.
impl From<Vec<Condition>> for ConditionSet {
    fn from(conditions: Vec<Condition>) -> Self {
        conditions.into_iter().collect()
    }
}

impl From<ConditionSet> for Vec<Condition> {
    fn from(set: ConditionSet) -> Self {
        set.entries
    }
}

impl JsonSchema for ConditionSet {
    fn schema_name() -> String {
        Vec::<Condition>::schema_name()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        Vec::<Condition>::json_schema(gen)
    }
}
