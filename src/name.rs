//! Globally-unique name allocation (component C1).
//!
//! A [`Name`] is a small, `Copy` handle into no data of its own — the
//! human-readable tag lives in a side table owned by the [`NameSource`] that
//! minted it, the same way the teacher keeps `RegisterId`s cheap to copy and
//! pushes anything heavier into a side structure.

use std::fmt;
#[cfg(test)]
use std::sync::atomic::{AtomicU64, Ordering};

/// A globally-unique identifier. Two `Name`s are equal iff they were produced
/// by the same allocation — no two distinct bindings anywhere in a single
/// compilation may carry the same `Name` (the global-uniqueness invariant,
/// spec §3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name(u64);

impl Name {
    /// Raw numeric id, exposed for use as an index-map key; never meaningful
    /// outside of a single `NameSource`'s lineage.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A checkpoint of a [`NameSource`]'s counter, returned by
/// [`NameSource::checkpoint`] and consumed by [`NameSource::restore`].
///
/// Speculative transformations (e.g. a kernel-extraction attempt that turns
/// out to hit a distribution error) take a checkpoint, try the rewrite, and
/// roll back on failure. No name ever escapes the checkpoint: every binding
/// that carries one of the rolled-back names is dropped along with it, so a
/// restored source can safely reuse the numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(u64);

/// Monotone counter plus a tag table. The counter is never decremented except
/// by an explicit [`restore`](NameSource::restore) to a prior checkpoint.
#[derive(Debug, Default)]
pub struct NameSource {
    next: u64,
    tags: Vec<String>,
}

impl NameSource {
    pub fn new() -> Self {
        Self { next: 0, tags: Vec::new() }
    }

    /// Allocate a fresh, globally-unique name carrying `tag` verbatim for
    /// diagnostics.
    pub fn fresh(&mut self, tag: impl Into<String>) -> Name {
        let id = self.next;
        self.next += 1;
        debug_assert_eq!(self.tags.len() as u64, id);
        self.tags.push(tag.into());
        Name(id)
    }

    /// The human-readable tag a name was minted with, preserved verbatim.
    pub fn tag(&self, name: Name) -> &str {
        self.tags
            .get(name.0 as usize)
            .map(String::as_str)
            .unwrap_or("?")
    }

    /// Snapshot the current counter position.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.next)
    }

    /// Roll the counter (and tag table) back to a prior checkpoint. Any name
    /// allocated after the checkpoint becomes invalid; callers must ensure no
    /// binding using such a name survives the rollback.
    pub fn restore(&mut self, checkpoint: Checkpoint) {
        debug_assert!(checkpoint.0 <= self.next, "cannot restore to a future checkpoint");
        self.next = checkpoint.0;
        self.tags.truncate(checkpoint.0 as usize);
    }

    /// Number of names allocated so far; used by the simplifier's fixpoint
    /// cap (spec §9: "N proportional to the initial binding count").
    pub fn len(&self) -> usize {
        self.next as usize
    }

    pub fn is_empty(&self) -> bool {
        self.next == 0
    }
}

/// A process-wide source for tests and small tools that don't want to thread
/// a `NameSource` by hand. Not used by the pipeline itself — the pipeline
/// always threads an explicit `NameSource`, per spec §5 ("no global
/// singleton").
#[cfg(test)]
static TEST_SOURCE: AtomicU64 = AtomicU64::new(0);

/// Allocate a name from a process-wide counter, for ad-hoc test fixtures
/// only. Never call this from pipeline code.
#[cfg(test)]
pub fn test_fresh_name() -> Name {
    Name(TEST_SOURCE.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_distinct() {
        let mut src = NameSource::new();
        let a = src.fresh("x");
        let b = src.fresh("x");
        assert_ne!(a, b);
    }

    #[test]
    fn tag_preserved_verbatim() {
        let mut src = NameSource::new();
        let a = src.fresh("acc_0");
        assert_eq!(src.tag(a), "acc_0");
    }

    #[test]
    fn checkpoint_restore_reuses_numbers() {
        let mut src = NameSource::new();
        let _a = src.fresh("a");
        let cp = src.checkpoint();
        let speculative = src.fresh("spec");
        src.restore(cp);
        let b = src.fresh("b");
        assert_eq!(speculative, b, "restored source reuses the rolled-back slot");
    }
}
