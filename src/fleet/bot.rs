use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::service::BotRecord;

/// Bot state as seen by one fleet query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bot {
    pub id: String,
    pub alive: bool,
    pub quarantined: bool,
}

impl Bot {
    pub fn new(id: impl Into<String>, alive: bool, quarantined: bool) -> Self {
        Self {
            id: id.into(),
            alive,
            quarantined,
        }
    }

    pub fn alive(id: impl Into<String>) -> Self {
        Self::new(id, true, false)
    }

    pub fn dead(id: impl Into<String>) -> Self {
        Self::new(id, false, false)
    }

    pub fn is_eligible(&self) -> bool {
        self.alive && !self.quarantined
    }
}

impl From<BotRecord> for Bot {
    fn from(record: BotRecord) -> Self {
        Self {
            id: record.bot_id,
            alive: !record.is_dead,
            quarantined: record.quarantined,
        }
    }
}

/// Immutable view of the fleet for one run.
///
/// Keeps the order the service returned bots in; later duplicates of an
/// identifier are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetSnapshot {
    bots: Vec<Bot>,
}

impl FleetSnapshot {
    pub fn new(bots: impl IntoIterator<Item = Bot>) -> Self {
        let mut seen = HashSet::new();
        let bots = bots
            .into_iter()
            .filter(|b| !b.id.is_empty() && seen.insert(b.id.clone()))
            .collect();
        Self { bots }
    }

    pub fn bots(&self) -> &[Bot] {
        &self.bots
    }

    pub fn eligible(&self) -> impl Iterator<Item = &Bot> {
        self.bots.iter().filter(|b| b.is_eligible())
    }

    pub fn ineligible(&self) -> impl Iterator<Item = &Bot> {
        self.bots.iter().filter(|b| !b.is_eligible())
    }

    pub fn eligible_count(&self) -> usize {
        self.eligible().count()
    }

    pub fn len(&self) -> usize {
        self.bots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bots.is_empty()
    }
}
