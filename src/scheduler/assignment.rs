use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

/// Shard index -> bot that last ran it. An empty id means the shard has
/// never been triggered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousAssignment {
    shards: BTreeMap<usize, String>,
}

impl PreviousAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, shard_index: usize, bot_id: impl Into<String>) {
        self.shards.insert(shard_index, bot_id.into());
    }

    /// Previous bot for the shard, `None` when unknown or never run.
    pub fn get(&self, shard_index: usize) -> Option<&str> {
        self.shards
            .get(&shard_index)
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(usize, S)> for PreviousAssignment {
    fn from_iter<I: IntoIterator<Item = (usize, S)>>(iter: I) -> Self {
        Self {
            shards: iter.into_iter().map(|(i, id)| (i, id.into())).collect(),
        }
    }
}

/// Planner output: the bot each shard is triggered on.
///
/// `None` only occurs under scarcity for a shard that never ran and had no
/// bot left to recycle; such a shard is triggered without a bot constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    shards: Vec<Option<String>>,
}

impl Assignment {
    pub fn new(shards: Vec<Option<String>>) -> Self {
        Self { shards }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn bot_for(&self, shard_index: usize) -> Option<&str> {
        self.shards.get(shard_index).and_then(|b| b.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, Option<&str>)> {
        self.shards.iter().enumerate().map(|(i, b)| (i, b.as_deref()))
    }

    pub fn distinct_bots(&self) -> HashSet<&str> {
        self.shards.iter().filter_map(|b| b.as_deref()).collect()
    }

    pub fn to_map(&self) -> BTreeMap<usize, String> {
        self.shards
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.clone().map(|b| (i, b)))
            .collect()
    }
}
