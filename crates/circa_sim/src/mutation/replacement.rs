//! Old-to-new component mappings produced by transactions.

use crate::component::Component;
use crate::error::MutationError;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::error;

/// A bidirectional multimap from replaced components to their replacements.
///
/// A component mapped to the empty set was removed; a component whose inverse
/// entry is empty was added. Once [`frozen`](Self::freeze) the map rejects
/// further edits but can still be appended onto an unfrozen map.
#[derive(Clone, Default)]
pub struct ReplacementMap {
    map: HashMap<Component, HashSet<Component>>,
    inverse: HashMap<Component, HashSet<Component>>,
    frozen: bool,
}

impl ReplacementMap {
    /// Creates an empty, unfrozen map.
    pub fn new() -> Self {
        Self::default()
    }

    /// A map replacing `old` with `new`.
    pub fn single(old: Component, new: Component) -> Self {
        let mut map = Self::new();
        map.put(old, [new]);
        map
    }

    fn check(&self) -> Result<(), MutationError> {
        if self.frozen {
            Err(MutationError::FrozenReplacementMap)
        } else {
            Ok(())
        }
    }

    /// Records a pure addition.
    pub fn add(&mut self, added: Component) -> Result<(), MutationError> {
        self.check()?;
        self.inverse.entry(added).or_default();
        Ok(())
    }

    /// Records a pure removal.
    pub fn remove(&mut self, removed: Component) -> Result<(), MutationError> {
        self.check()?;
        self.map.entry(removed).or_default();
        Ok(())
    }

    /// Records `old` being replaced by `new`.
    pub fn replace(&mut self, old: Component, new: Component) -> Result<(), MutationError> {
        self.check()?;
        self.put(old, [new]);
        Ok(())
    }

    /// Records `old` being replaced by every component in `news`.
    pub fn replace_all(
        &mut self,
        old: Component,
        news: impl IntoIterator<Item = Component>,
    ) -> Result<(), MutationError> {
        self.check()?;
        self.put(old, news);
        Ok(())
    }

    fn put(&mut self, old: Component, news: impl IntoIterator<Item = Component>) {
        let dst = self.map.entry(old.clone()).or_default();
        for new in news {
            dst.insert(new.clone());
            self.inverse.entry(new).or_default().insert(old.clone());
        }
    }

    /// Composes `next` after this map, so that this map describes the net
    /// effect of both.
    pub fn append(&mut self, next: &ReplacementMap) -> Result<(), MutationError> {
        self.check()?;
        for (b, cs) in &next.map {
            let sources = match self.inverse.remove(b) {
                Some(sources) => sources,
                None => HashSet::from([b.clone()]),
            };
            for a in &sources {
                let dst = self.map.entry(a.clone()).or_default();
                dst.remove(b);
                dst.extend(cs.iter().cloned());
            }
            for c in cs {
                self.inverse
                    .entry(c.clone())
                    .or_default()
                    .extend(sources.iter().cloned());
            }
        }
        for (c, bs) in &next.inverse {
            if !self.inverse.contains_key(c) {
                if !bs.is_empty() {
                    error!(component = ?c, "component replaced but not represented in replacement map");
                }
                self.inverse.insert(c.clone(), HashSet::new());
            }
        }
        Ok(())
    }

    /// The reverse mapping, new to old.
    pub fn inverse(&self) -> ReplacementMap {
        ReplacementMap {
            map: self.inverse.clone(),
            inverse: self.map.clone(),
            frozen: false,
        }
    }

    /// Makes the map immutable.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Returns `true` once frozen.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Returns `true` if nothing was added, removed or replaced.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty() && self.inverse.is_empty()
    }

    /// Components that were removed or replaced.
    pub fn replaced_components(&self) -> impl Iterator<Item = &Component> {
        self.map.keys()
    }

    /// Components that were added, either outright or as replacements.
    pub fn additions(&self) -> impl Iterator<Item = &Component> {
        self.inverse.keys()
    }

    /// What replaced `old`; empty if it was simply removed.
    pub fn replacements_for(&self, old: &Component) -> Option<&HashSet<Component>> {
        self.map.get(old)
    }

    /// What `new` replaced; empty if it was simply added.
    pub fn components_replacing(&self, new: &Component) -> Option<&HashSet<Component>> {
        self.inverse.get(new)
    }
}

impl fmt::Debug for ReplacementMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<String> = self
            .map
            .iter()
            .map(|(old, news)| {
                let mut news: Vec<String> = news.iter().map(|c| format!("{c:?}")).collect();
                news.sort();
                format!("{old:?} -> [{}]", news.join(", "))
            })
            .collect();
        entries.sort();
        f.debug_struct("ReplacementMap")
            .field("entries", &entries)
            .field("frozen", &self.frozen)
            .finish()
    }
}
