//! Transactional snapshot/rollback (spec §3 "Snapshot", §4.8).
//!
//! A snapshot nests an arena checkpoint together with an "item frame" action log: namespace
//! nodes, buffers, packages and held mutexes register raise/lower actions against whichever
//! snapshot level is innermost when they're touched. Committing a level just drops its frames.
//! Rolling one back replays each frame's actions to a net use-count and releases the item that
//! many times — this is `original_source/src/aml_state_snapshot.c`'s algorithm, kept verbatim
//! per spec §4.8 (no simpler algorithm satisfies the nested-LIFO contract spec.md describes).

use crate::{
    arena::ArenaSnapshot,
    mutex::MutexAcquisitions,
    namespace::NodeHandle,
    value::{BufferHandle, PackageHandle},
    AmlError,
};
use alloc::{sync::Arc, vec::Vec};

/// What a snapshot item refers to, and how to release it one unit.
#[derive(Clone)]
pub enum SnapshotItem {
    Node(NodeHandle),
    Buffer(BufferHandle),
    Package(PackageHandle),
    /// A mutex acquisition made within this snapshot level, identified by the node that backs
    /// the `Mutex` object. Releasing it means dropping the hold the snapshot is tracking; actual
    /// unwinding of the acquisition record happens through [`MutexAcquisitions`].
    Mutex(NodeHandle),
}

fn item_eq(a: &SnapshotItem, b: &SnapshotItem) -> bool {
    match (a, b) {
        (SnapshotItem::Node(x), SnapshotItem::Node(y)) => x == y,
        (SnapshotItem::Mutex(x), SnapshotItem::Mutex(y)) => x == y,
        (SnapshotItem::Buffer(x), SnapshotItem::Buffer(y)) => Arc::ptr_eq(x, y),
        (SnapshotItem::Package(x), SnapshotItem::Package(y)) => Arc::ptr_eq(x, y),
        _ => false,
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Action {
    Raise,
    Lower,
}

struct Frame {
    item: SnapshotItem,
    actions: Vec<Action>,
}

impl Frame {
    fn net(&self) -> i64 {
        self.actions.iter().map(|a| match a {
            Action::Raise => 1i64,
            Action::Lower => -1i64,
        }).sum()
    }
}

/// One open transactional level (spec §4.8 "begin").
pub struct SnapshotLevel {
    pub arena_snapshot: ArenaSnapshot,
    pub namespace_scope_depth: usize,
    pub method_scope_depth: usize,
    frames: Vec<Frame>,
}

/// Identifies the stack depth a level was opened at, returned by [`SnapshotStack::begin`] and
/// required by [`SnapshotStack::commit`]/[`SnapshotStack::rollback`] so a LIFO violation —
/// committing or rolling back anything but the innermost open level — is representable and
/// checkable rather than only ever hitting the degenerate empty-stack case.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SnapshotToken(usize);

/// The evaluator-wide stack of open snapshots. `register_action` always targets the innermost
/// level (spec: "creating the frame lazily on first touch per snapshot level").
#[derive(Default)]
pub struct SnapshotStack {
    levels: Vec<SnapshotLevel>,
}

impl SnapshotStack {
    pub fn new() -> SnapshotStack {
        SnapshotStack { levels: Vec::new() }
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn begin(&mut self, arena_snapshot: ArenaSnapshot, namespace_scope_depth: usize, method_scope_depth: usize) -> SnapshotToken {
        let token = SnapshotToken(self.levels.len());
        self.levels.push(SnapshotLevel { arena_snapshot, namespace_scope_depth, method_scope_depth, frames: Vec::new() });
        token
    }

    /// Panics unless `token` names the innermost open level. A LIFO violation is a programming
    /// error in the evaluator, not a data-dependent failure, so it's a `panic!` rather than a
    /// recoverable `Result` (spec §4.8, §8 property 5) — matching the C original's own "violation
    /// is a panic".
    fn expect_innermost(&self, token: SnapshotToken) {
        match self.levels.len().checked_sub(1) {
            Some(innermost) if innermost == token.0 => {}
            Some(innermost) => panic!(
                "snapshot LIFO violation: tried to commit/rollback level {}, but level {} is innermost",
                token.0, innermost
            ),
            None => panic!("snapshot LIFO violation: tried to commit/rollback level {}, but no snapshot is open", token.0),
        }
    }

    fn innermost_mut(&mut self) -> Option<&mut SnapshotLevel> {
        self.levels.last_mut()
    }

    /// Registers a raise action for `item` against the innermost open level. No-op if no
    /// snapshot is open (items outside any snapshot aren't tracked for rollback).
    pub fn raise(&mut self, item: SnapshotItem) {
        self.push_action(item, Action::Raise);
    }

    pub fn lower(&mut self, item: SnapshotItem) {
        self.push_action(item, Action::Lower);
    }

    /// Finds (or lazily creates) this snapshot level's frame for `item` and appends `action`,
    /// matching the C original's "creating the frame lazily on first touch per snapshot level".
    fn push_action(&mut self, item: SnapshotItem, action: Action) {
        if let Some(level) = self.innermost_mut() {
            if let Some(frame) = level.frames.iter_mut().find(|f| item_eq(&f.item, &item)) {
                frame.actions.push(action);
            } else {
                level.frames.push(Frame { item, actions: alloc::vec![action] });
            }
        }
    }

    /// Commits the innermost level: frames detach silently (their actions simply stop being
    /// tracked; whatever state they describe is now permanent). `token` must name the innermost
    /// open level; violating LIFO order panics (see [`Self::expect_innermost`]).
    pub fn commit(&mut self, token: SnapshotToken) -> SnapshotLevel {
        self.expect_innermost(token);
        self.levels.pop().expect("expect_innermost just confirmed a level is open")
    }

    /// Rolls back the innermost level: replays each frame's action list to a final use-count and
    /// releases the item that many times via `release`. `token` must name the innermost open
    /// level; violating LIFO order panics (see [`Self::expect_innermost`]). The `Result` here
    /// carries only `release`'s own errors, not LIFO violations.
    pub fn rollback(&mut self, token: SnapshotToken, mut release: impl FnMut(&SnapshotItem) -> Result<(), AmlError>) -> Result<SnapshotLevel, AmlError> {
        self.expect_innermost(token);
        let level = self.levels.pop().expect("expect_innermost just confirmed a level is open");
        for frame in &level.frames {
            let mut net = frame.net();
            while net > 0 {
                release(&frame.item)?;
                net -= 1;
            }
        }
        Ok(level)
    }
}

/// Releases a single unit of a [`SnapshotItem`], dispatching to the type-specific teardown (spec
/// §4.8 "invokes the item's type-specific release"). Buffers/packages are `Arc`s, so "release"
/// just means dropping this snapshot's notion of the reference — the real `Arc` drop happens when
/// the last clone goes out of scope; mutex/node release goes through the owning subsystems.
pub fn release_item(
    item: &SnapshotItem,
    namespace: &mut crate::namespace::Namespace,
    mutex_acquisitions: &mut MutexAcquisitions,
) -> Result<(), AmlError> {
    match item {
        SnapshotItem::Node(handle) => namespace.release_node(*handle),
        SnapshotItem::Buffer(rc) => {
            // Dropping our local clone is the unit of release; the caller that raised this
            // action is expected to have held an extra `Arc` clone specifically for the snapshot
            // to drop here.
            drop(Arc::clone(rc));
            Ok(())
        }
        SnapshotItem::Package(rc) => {
            drop(Arc::clone(rc));
            Ok(())
        }
        SnapshotItem::Mutex(node) => mutex_acquisitions.record_release(*node),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{Arena, ArenaIndex};

    #[test]
    fn commit_detaches_without_releasing() {
        let mut stack = SnapshotStack::new();
        let mut arena: Arena<u32> = Arena::new();
        let snap = arena.snapshot();
        let token = stack.begin(snap, 0, 0);
        stack.raise(SnapshotItem::Node(ArenaIndex(0)));
        let mut released = 0;
        let level = stack.commit(token);
        for frame in &level.frames {
            let _ = frame;
            released += 0; // commit never calls release
        }
        assert_eq!(released, 0);
    }

    #[test]
    fn rollback_releases_net_positive_count() {
        let mut stack = SnapshotStack::new();
        let mut arena: Arena<u32> = Arena::new();
        let snap = arena.snapshot();
        let token = stack.begin(snap, 0, 0);
        let node = ArenaIndex(7);
        stack.raise(SnapshotItem::Node(node));
        stack.raise(SnapshotItem::Node(node));
        stack.lower(SnapshotItem::Node(node));

        let mut release_calls = Vec::new();
        stack
            .rollback(token, |item| {
                if let SnapshotItem::Node(n) = item {
                    release_calls.push(*n);
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(release_calls, alloc::vec![node]); // net = 2 raises - 1 lower = 1
    }

    #[test]
    #[should_panic(expected = "snapshot LIFO violation")]
    fn lifo_violation_on_empty_stack() {
        let mut stack = SnapshotStack::new();
        let bogus_token = SnapshotToken(0);
        stack.commit(bogus_token);
    }

    #[test]
    #[should_panic(expected = "snapshot LIFO violation")]
    fn lifo_violation_on_non_innermost_level() {
        let mut stack = SnapshotStack::new();
        let mut arena: Arena<u32> = Arena::new();
        let outer = stack.begin(arena.snapshot(), 0, 0);
        let _inner = stack.begin(arena.snapshot(), 0, 0);
        // `inner` is innermost; committing `outer` while it's still open is a LIFO violation.
        stack.commit(outer);
    }
}
