//! Last-use oracle
//!
//! Whether a use of a value is its last one is decided by the host's flow
//! analysis; the tracker only consumes the verdict as a boolean. This table
//! is a ready-made oracle for hosts that number their use sites: record
//! every use, then ask whether a given site is the last.

use crate::slot::SlotId;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Unique identifier of a use site
pub type UseSite = usize;

/// Last-use table keyed by slot (or by any other binding key)
#[derive(Debug, Clone)]
pub struct LastUseTable<K = SlotId>
where
    K: Eq + Hash,
{
    /// Every recorded use site per binding
    uses: HashMap<K, HashSet<UseSite>>,
    /// Sites explicitly marked as last uses, e.g. one per branch
    last_uses: HashMap<K, HashSet<UseSite>>,
    next_site: UseSite,
}

impl<K: Eq + Hash> LastUseTable<K> {
    pub fn new() -> Self {
        Self {
            uses: HashMap::new(),
            last_uses: HashMap::new(),
            next_site: 0,
        }
    }

    /// Get a site id for the next use position
    pub fn fresh_site(&mut self) -> UseSite {
        let site = self.next_site;
        self.next_site += 1;
        site
    }

    /// Record that `key` is used at `site`
    pub fn record_use(&mut self, key: K, site: UseSite) {
        self.next_site = self.next_site.max(site + 1);
        self.uses.entry(key).or_default().insert(site);
    }

    /// Declare `site` a last use of `key`
    ///
    /// Needed when several sites are last uses, one per control-flow path.
    /// Once a binding has marked sites, only those count as last uses.
    pub fn mark_last_use(&mut self, key: K, site: UseSite) {
        self.next_site = self.next_site.max(site + 1);
        self.last_uses.entry(key).or_default().insert(site);
    }

    /// Check if `site` is a last use of `key`
    ///
    /// Without marked sites the latest recorded use is the last one.
    pub fn is_last_use(&self, key: &K, site: UseSite) -> bool {
        if let Some(marked) = self.last_uses.get(key) {
            return marked.contains(&site);
        }
        self.uses
            .get(key)
            .and_then(|uses| uses.iter().max())
            .map(|last| *last == site)
            .unwrap_or(false)
    }

    /// Get all bindings that have uses tracked
    pub fn tracked(&self) -> impl Iterator<Item = &K> {
        self.uses
            .keys()
            .chain(self.last_uses.keys().filter(|k| !self.uses.contains_key(*k)))
    }
}

impl<K: Eq + Hash> Default for LastUseTable<K> {
    fn default() -> Self {
        Self::new()
    }
}
