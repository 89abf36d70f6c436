//! Fact storage: deduplicated, timestamped relations keyed by predicate

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};
use crate::model::{Atom, Predicate, Tuple};

/// Timestamp of tuples that never expire.
pub const ALWAYS_VALID: i64 = -1;

/// A deduplicated set of ground tuples for one predicate.
///
/// Insertion order is preserved, which keeps evaluation deterministic. Each
/// tuple carries a logical timestamp used only by the streaming cleanup;
/// [`ALWAYS_VALID`] marks tuples that never expire.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(from = "RelationData", into = "RelationData")]
pub struct Relation {
    tuples: Vec<Tuple>,
    timestamps: Vec<i64>,
    index: HashMap<Tuple, usize>,
}

/// Serialized form of a relation (the lookup index is rebuilt on load).
#[derive(Serialize, Deserialize)]
struct RelationData {
    tuples: Vec<Tuple>,
    timestamps: Vec<i64>,
}

impl From<RelationData> for Relation {
    fn from(data: RelationData) -> Self {
        let mut relation = Relation::default();
        for (tuple, timestamp) in data.tuples.into_iter().zip(data.timestamps) {
            relation.add_at(tuple, timestamp);
        }
        relation
    }
}

impl From<Relation> for RelationData {
    fn from(relation: Relation) -> Self {
        RelationData {
            tuples: relation.tuples,
            timestamps: relation.timestamps,
        }
    }
}

impl Relation {
    /// Create an empty relation.
    pub fn new() -> Self {
        Relation::default()
    }

    /// Add a tuple that never expires. Returns true if the tuple was new.
    pub fn add(&mut self, tuple: Tuple) -> bool {
        self.add_at(tuple, ALWAYS_VALID)
    }

    /// Add a tuple with a logical timestamp. Idempotent: re-adding an
    /// existing tuple changes nothing, including its timestamp.
    /// Returns true if the tuple was new.
    pub fn add_at(&mut self, tuple: Tuple, timestamp: i64) -> bool {
        debug_assert!(tuple.is_ground());
        match self.index.entry(tuple.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(self.tuples.len());
                self.tuples.push(tuple);
                self.timestamps.push(timestamp);
                true
            }
        }
    }

    /// Check if the relation contains a tuple.
    pub fn contains(&self, tuple: &Tuple) -> bool {
        self.index.contains_key(tuple)
    }

    /// Get the timestamp of a stored tuple.
    pub fn timestamp(&self, tuple: &Tuple) -> Option<i64> {
        self.index.get(tuple).map(|&i| self.timestamps[i])
    }

    /// Overwrite the timestamp of a stored tuple. Returns false if absent.
    pub fn set_timestamp(&mut self, tuple: &Tuple, timestamp: i64) -> bool {
        match self.index.get(tuple) {
            Some(&i) => {
                self.timestamps[i] = timestamp;
                true
            }
            None => false,
        }
    }

    /// Number of stored tuples.
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Iterate over the tuples in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Tuple> {
        self.tuples.iter()
    }

    /// Remove every tuple whose timestamp is older than `threshold`.
    /// Tuples stamped [`ALWAYS_VALID`] are kept. Returns how many were removed.
    pub fn clean(&mut self, threshold: i64) -> usize {
        let before = self.tuples.len();

        let mut kept_tuples = Vec::with_capacity(before);
        let mut kept_timestamps = Vec::with_capacity(before);
        for (tuple, &timestamp) in self.tuples.iter().zip(&self.timestamps) {
            if timestamp == ALWAYS_VALID || timestamp >= threshold {
                kept_tuples.push(tuple.clone());
                kept_timestamps.push(timestamp);
            }
        }

        self.tuples = kept_tuples;
        self.timestamps = kept_timestamps;
        self.index = self
            .tuples
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();

        before - self.tuples.len()
    }
}

/// The fact store: a mapping from predicate to relation.
///
/// Relations are created lazily on first mutable access. During an
/// evaluation run the store is owned exclusively by the evaluator and
/// mutated only by merging deltas between rounds.
#[derive(Clone, Debug, Default)]
pub struct Facts {
    relations: HashMap<Predicate, Relation>,
}

impl Facts {
    /// Create an empty store.
    pub fn new() -> Self {
        Facts::default()
    }

    /// Get the relation for a predicate, if any tuples were ever stored.
    pub fn relation(&self, predicate: &Predicate) -> Option<&Relation> {
        self.relations.get(predicate)
    }

    /// Get the relation for a predicate, creating an empty one if unknown.
    pub fn relation_mut(&mut self, predicate: &Predicate) -> &mut Relation {
        self.relations.entry(predicate.clone()).or_default()
    }

    /// Check if a predicate's relation contains a tuple.
    pub fn contains(&self, predicate: &Predicate, tuple: &Tuple) -> bool {
        self.relations
            .get(predicate)
            .is_some_and(|r| r.contains(tuple))
    }

    /// Add a single ground fact that never expires.
    /// Returns true if the fact was new.
    pub fn add_fact(&mut self, atom: &Atom) -> Result<bool> {
        self.add_fact_at(atom, ALWAYS_VALID)
    }

    /// Add a single ground fact with a logical timestamp.
    pub fn add_fact_at(&mut self, atom: &Atom, timestamp: i64) -> Result<bool> {
        if !atom.is_ground() {
            return Err(EvalError::NonGroundFact(atom.to_string()));
        }
        debug_assert!(!atom.is_builtin());
        Ok(self
            .relation_mut(&atom.predicate())
            .add_at(atom.tuple().clone(), timestamp))
    }

    /// Add every tuple of `other`, stamping new tuples with `timestamp`.
    /// All tuples must be ground. Returns true if anything was added.
    pub fn add_all(&mut self, other: &Facts, timestamp: i64) -> Result<bool> {
        let mut added = false;
        for (predicate, relation) in &other.relations {
            for tuple in relation.iter() {
                if !tuple.is_ground() {
                    return Err(EvalError::NonGroundFact(format!(
                        "{}{}",
                        predicate.symbol(),
                        tuple
                    )));
                }
                added |= self.relation_mut(predicate).add_at(tuple.clone(), timestamp);
            }
        }
        Ok(added)
    }

    /// Merge already-validated deltas, stamping new tuples with `timestamp`.
    pub(crate) fn merge(&mut self, deltas: &Facts, timestamp: i64) {
        for (predicate, relation) in &deltas.relations {
            let target = self.relation_mut(predicate);
            for tuple in relation.iter() {
                target.add_at(tuple.clone(), timestamp);
            }
        }
    }

    /// The predicates with a stored relation.
    pub fn predicates(&self) -> impl Iterator<Item = &Predicate> {
        self.relations.keys()
    }

    /// Total number of stored tuples across all relations.
    pub fn tuple_count(&self) -> usize {
        self.relations.values().map(Relation::len).sum()
    }

    /// Check if no tuples are stored.
    pub fn is_empty(&self) -> bool {
        self.relations.values().all(Relation::is_empty)
    }

    /// Purge every tuple older than `threshold` from every relation.
    /// Returns how many tuples were removed.
    pub fn clean(&mut self, threshold: i64) -> usize {
        self.relations
            .values_mut()
            .map(|r| r.clean(threshold))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Term;

    fn tuple(values: &[&str]) -> Tuple {
        Tuple::new(values.iter().map(|v| Term::constant(*v)).collect())
    }

    #[test]
    fn add_is_idempotent() {
        let mut relation = Relation::new();
        assert!(relation.add(tuple(&["a", "b"])));
        assert!(!relation.add(tuple(&["a", "b"])));
        assert_eq!(relation.len(), 1);
    }

    #[test]
    fn re_adding_keeps_the_original_timestamp() {
        let mut relation = Relation::new();
        relation.add_at(tuple(&["a"]), 10);
        relation.add_at(tuple(&["a"]), 20);
        assert_eq!(relation.timestamp(&tuple(&["a"])), Some(10));
    }

    #[test]
    fn clean_keeps_always_valid_tuples() {
        let mut relation = Relation::new();
        relation.add(tuple(&["permanent"]));
        relation.add_at(tuple(&["old"]), 5);
        relation.add_at(tuple(&["fresh"]), 15);

        assert_eq!(relation.clean(10), 1);
        assert!(relation.contains(&tuple(&["permanent"])));
        assert!(!relation.contains(&tuple(&["old"])));
        assert!(relation.contains(&tuple(&["fresh"])));
    }

    #[test]
    fn facts_create_relations_lazily() {
        let mut facts = Facts::new();
        let p = Predicate::new("p", 1);
        assert!(facts.relation(&p).is_none());
        facts.relation_mut(&p);
        assert!(facts.relation(&p).is_some());
    }

    #[test]
    fn non_ground_facts_are_rejected() {
        let mut facts = Facts::new();
        let atom = Atom::new("p", vec![Term::var("X")]);
        assert!(matches!(
            facts.add_fact(&atom),
            Err(EvalError::NonGroundFact(_))
        ));
    }

    #[test]
    fn relation_serde_round_trip_rebuilds_the_index() {
        let mut relation = Relation::new();
        relation.add(tuple(&["a", "b"]));
        relation.add_at(tuple(&["c", "d"]), 7);

        let json = serde_json::to_string(&relation).unwrap();
        let back: Relation = serde_json::from_str(&json).unwrap();

        assert_eq!(back.len(), 2);
        assert!(back.contains(&tuple(&["a", "b"])));
        assert_eq!(back.timestamp(&tuple(&["c", "d"])), Some(7));
    }
}
