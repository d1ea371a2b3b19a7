//! Bounded, time-ordered fee history of one network

use crate::shared::types::{FeeLevels, FeeObservation};

/// Keep the last 100 observations per chain
pub const DEFAULT_HISTORY_LENGTH: usize = 100;

/// Fee history for a single network.
///
/// Not synchronized; the hub owns every series and applies inserts one at a
/// time, readers get a cloned snapshot.
#[derive(Debug, Clone)]
pub struct ChainSeries {
    capacity: usize,
    points: Vec<FeeObservation>,
    last_inserted: Option<FeeLevels>,
}

impl ChainSeries {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            points: Vec::with_capacity(capacity.max(1) + 1),
            last_inserted: None,
        }
    }

    /// Append, re-sort by timestamp, then keep the newest `capacity` points.
    ///
    /// The sort is stable, so observations sharing a timestamp keep their
    /// arrival order.
    pub fn insert(&mut self, observation: FeeObservation) {
        self.last_inserted = Some(observation.levels());
        self.points.push(observation);
        self.points.sort_by_key(FeeObservation::timestamp_ms);

        if self.points.len() > self.capacity {
            let excess = self.points.len() - self.capacity;
            self.points.drain(..excess);
        }
    }

    pub fn snapshot(&self) -> Vec<FeeObservation> {
        self.points.clone()
    }

    /// Levels of the most recently *inserted* observation.
    ///
    /// This is insertion order, not timestamp order: a late observation that
    /// sorts into the middle of the series still becomes "current".
    pub fn current_levels(&self) -> Option<FeeLevels> {
        self.last_inserted
    }

    pub fn latest(&self) -> Option<&FeeObservation> {
        self.points.last()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ChainSeries {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LENGTH)
    }
}
