// FoodIndex: dense integer ids for every distinct food name.
//
// Built in two phases: the builder collects names from every record, then
// `freeze` assigns ids in sorted-name order. Nothing can be looked up until
// the vocabulary is complete, and the sorted order makes ids identical
// across runs on the same input.

use std::collections::{BTreeSet, HashMap};

use crate::diary::schema::FoodRecord;

/// Collect phase.
#[derive(Debug, Default)]
pub struct FoodIndexBuilder {
    names: BTreeSet<String>,
}

impl FoodIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, record: &FoodRecord) {
        for name in record.foods.keys() {
            if !self.names.contains(name) {
                self.names.insert(name.clone());
            }
        }
    }

    /// Freeze phase: assign ids 0..len in sorted order.
    pub fn freeze(self) -> FoodIndex {
        let names: Vec<String> = self.names.into_iter().collect();
        let lookup = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        FoodIndex { names, lookup }
    }
}

/// A frozen bijection between food names and `0..len()`.
#[derive(Debug, Clone, PartialEq)]
pub struct FoodIndex {
    names: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl FoodIndex {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}
