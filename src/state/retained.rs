use crate::config::DedupPolicy;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Ordered set of filenames retained for one target
#[derive(Debug, Clone, Default)]
pub struct TargetImages {
    order: Vec<String>,
    members: HashSet<String>,
}

impl TargetImages {
    pub fn contains(&self, filename: &str) -> bool {
        self.members.contains(filename)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    fn insert(&mut self, filename: &str) -> bool {
        if !self.members.insert(filename.to_string()) {
            return false;
        }
        self.order.push(filename.to_string());
        true
    }

    fn remove(&mut self, filename: &str) -> bool {
        if !self.members.remove(filename) {
            return false;
        }
        self.order.retain(|name| name != filename);
        true
    }
}

#[derive(Debug, Default)]
struct Inner {
    per_target: HashMap<String, TargetImages>,
    /// How many targets retain each filename, for O(1) global checks
    global: HashMap<String, usize>,
    /// Claims whose download has not finished, and whether the claim added
    /// the filename to the target's set
    in_flight: HashMap<(String, String), bool>,
}

impl Inner {
    fn is_new(&self, filename: &str, target: &str, policy: DedupPolicy) -> bool {
        match policy {
            DedupPolicy::PerTarget => !self
                .per_target
                .get(target)
                .is_some_and(|images| images.contains(filename)),
            DedupPolicy::Global => !self.global.contains_key(filename),
            DedupPolicy::None => true,
        }
    }

    fn insert(&mut self, target: &str, filename: &str) -> bool {
        let inserted = self
            .per_target
            .entry(target.to_string())
            .or_default()
            .insert(filename);

        if inserted {
            *self.global.entry(filename.to_string()).or_insert(0) += 1;
        }
        inserted
    }

    fn remove(&mut self, target: &str, filename: &str) {
        let removed = self
            .per_target
            .get_mut(target)
            .is_some_and(|images| images.remove(filename));

        if removed {
            if let Some(count) = self.global.get_mut(filename) {
                *count -= 1;
                if *count == 0 {
                    self.global.remove(filename);
                }
            }
        }
    }
}

/// Filenames retained per target across the whole run
///
/// Membership checks and inserts happen under one mutex so concurrent
/// pagination workers cannot both accept the same filename.
#[derive(Debug, Default)]
pub struct RetainedImages {
    inner: Mutex<Inner>,
}

impl RetainedImages {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seeds a target's set from its persisted log, keeping order
    pub fn seed<I, S>(&self, target: &str, filenames: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut inner = self.lock();
        inner.per_target.entry(target.to_string()).or_default();
        for filename in filenames {
            inner.insert(target, filename.as_ref());
        }
    }

    /// Whether `filename` counts as new for `target` under `policy`
    pub fn is_new(&self, filename: &str, target: &str, policy: DedupPolicy) -> bool {
        self.lock().is_new(filename, target, policy)
    }

    /// Checks and records `filename` for `target` in one step
    ///
    /// Returns true if the filename was new and is now claimed for download.
    /// A filename already being downloaded for `target` is never claimed
    /// twice, whatever the policy. Every successful claim must end in
    /// `settle` or `release`.
    pub fn claim(&self, target: &str, filename: &str, policy: DedupPolicy) -> bool {
        let mut inner = self.lock();
        if !inner.is_new(filename, target, policy) {
            return false;
        }
        let key = (target.to_string(), filename.to_string());
        if inner.in_flight.contains_key(&key) {
            return false;
        }
        let inserted = inner.insert(target, filename);
        inner.in_flight.insert(key, inserted);
        true
    }

    /// Ends a claim whose download finished, keeping the filename retained
    pub fn settle(&self, target: &str, filename: &str) {
        self.lock()
            .in_flight
            .remove(&(target.to_string(), filename.to_string()));
    }

    /// Ends a claim whose download was cancelled
    ///
    /// The filename leaves the target's set only if this claim added it, so
    /// an entry seeded from the log survives.
    pub fn release(&self, target: &str, filename: &str) {
        let mut inner = self.lock();
        let key = (target.to_string(), filename.to_string());
        if inner.in_flight.remove(&key) == Some(true) {
            inner.remove(target, filename);
        }
    }

    pub fn contains(&self, target: &str, filename: &str) -> bool {
        self.lock()
            .per_target
            .get(target)
            .is_some_and(|images| images.contains(filename))
    }

    /// Copy of a target's retained filenames in insertion order
    pub fn snapshot(&self, target: &str) -> Vec<String> {
        self.lock()
            .per_target
            .get(target)
            .map(|images| images.iter().map(str::to_string).collect())
            .unwrap_or_default()
    }
}
