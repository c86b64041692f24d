//! Mutex operations and SyncLevel discipline (spec §4.6).

use crate::{misc::SyncLevel, namespace::NodeHandle, AmlError};
use alloc::vec::Vec;

/// The host-allocated handle backing an AML `Mutex` object.
pub type MutexHandle = u64;

/// The ACPI global lock's well-known mutex path is `\_GL`; the interpreter compares against this
/// to decide whether to additionally run the global-lock spin protocol.
pub const GLOBAL_LOCK_NAME: &str = "\\_GL";

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AcquireResult {
    Success,
    Timeout,
}

/// Tracks, for one method scope, every mutex currently held, in acquisition order, so they can
/// be released in reverse order on scope exit (spec §4.6 "Scope exit").
#[derive(Default, Debug)]
pub struct MutexAcquisitions {
    records: Vec<AcquisitionRecord>,
}

#[derive(Debug, Clone)]
struct AcquisitionRecord {
    node: NodeHandle,
    sync_level: SyncLevel,
    nest_count: u32,
}

impl MutexAcquisitions {
    pub fn new() -> MutexAcquisitions {
        MutexAcquisitions { records: Vec::new() }
    }

    /// The method's current SyncLevel: the maximum SyncLevel of all mutexes it holds (spec
    /// §4.6 "SyncLevel rule").
    pub fn current_sync_level(&self, floor: SyncLevel) -> SyncLevel {
        self.records.iter().map(|r| r.sync_level).max().unwrap_or(floor).max(floor)
    }

    /// Registers a successful acquisition of `node` at `sync_level`, enforcing the SyncLevel
    /// rule: acquiring a mutex with a lower SyncLevel than currently held is fatal, *unless*
    /// it's a re-entrant acquisition of the same mutex already held by this scope.
    pub fn record_acquire(&mut self, node: NodeHandle, sync_level: SyncLevel, floor: SyncLevel) -> Result<(), AmlError> {
        if let Some(existing) = self.records.iter_mut().find(|r| r.node == node) {
            existing.nest_count += 1;
            return Ok(());
        }

        let current = self.current_sync_level(floor);
        if sync_level < current {
            return Err(AmlError::SyncLevelViolation);
        }

        self.records.push(AcquisitionRecord { node, sync_level, nest_count: 1 });
        Ok(())
    }

    /// Drops one level of nesting for `node`; fully releases (removing the record) once the
    /// nest count reaches zero. Errors if `node` was not held at all (spec §4.6 "Release").
    pub fn record_release(&mut self, node: NodeHandle) -> Result<(), AmlError> {
        let idx = self.records.iter().position(|r| r.node == node).ok_or(AmlError::MutexNotAcquired)?;
        self.records[idx].nest_count -= 1;
        if self.records[idx].nest_count == 0 {
            self.records.remove(idx);
        }
        Ok(())
    }

    /// Returns, in reverse acquisition order, every mutex still held (used on method-scope exit).
    pub fn drain_reverse(&mut self) -> Vec<NodeHandle> {
        let mut nodes: Vec<NodeHandle> = self.records.drain(..).map(|r| r.node).collect();
        nodes.reverse();
        nodes
    }

    pub fn is_held(&self, node: NodeHandle) -> bool {
        self.records.iter().any(|r| r.node == node)
    }
}

/// Lock-free global-lock bit protocol state, layered on top of the plain host mutex when the
/// `_GL` mutex is acquired (spec §4.6 "Acquire"). This mirrors the ACPI-mandated two-bit
/// protocol over the shared `FACS` global-lock word: bit 0 is "owned", bit 1 is "pending".
///
/// The actual atomic compare-and-exchange is a host responsibility (spec §6.1); this type only
/// tracks the *nesting* nobody else can see — how many times *this* evaluator has acquired the
/// global lock without releasing it, and whether the most recent release observed a pending
/// waiter.
#[derive(Default, Debug)]
pub struct GlobalLockState {
    hold_count: u32,
    pending_observed: bool,
}

impl GlobalLockState {
    pub fn new() -> GlobalLockState {
        GlobalLockState::default()
    }

    pub fn note_acquire(&mut self) {
        self.hold_count += 1;
    }

    /// Returns `true` if this was the final release (hold count reached zero, host lock should
    /// actually be released) and whether a pending-waiter signal should be issued.
    pub fn note_release(&mut self, pending_bit_observed: bool) -> Result<(bool, bool), AmlError> {
        if self.hold_count == 0 {
            return Err(AmlError::MutexNotAcquired);
        }
        self.pending_observed |= pending_bit_observed;
        self.hold_count -= 1;
        if self.hold_count == 0 {
            let signal = self.pending_observed;
            self.pending_observed = false;
            Ok((true, signal))
        } else {
            Ok((false, false))
        }
    }

    pub fn hold_count(&self) -> u32 {
        self.hold_count
    }
}

pub fn is_global_lock_path(path: &str) -> bool {
    path == GLOBAL_LOCK_NAME
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaIndex;

    /// Scenario S4: acquiring SyncLevel 4 then SyncLevel 2 is a fatal SyncLevel violation; the
    /// first mutex remains held.
    #[test]
    fn s4_sync_level_violation() {
        let mut acquisitions = MutexAcquisitions::new();
        let mutex_a = ArenaIndex(0);
        let mutex_b = ArenaIndex(1);

        acquisitions.record_acquire(mutex_a, 4, 0).unwrap();
        let result = acquisitions.record_acquire(mutex_b, 2, 0);
        assert!(matches!(result, Err(AmlError::SyncLevelViolation)));
        assert!(acquisitions.is_held(mutex_a));
        assert!(!acquisitions.is_held(mutex_b));
    }

    /// Scenario S5: acquire `_GL` twice, release once -> hold count 1, still owned. Release
    /// again -> hold count 0, pending-waiter signal issued iff pending bit was observed.
    #[test]
    fn s5_global_lock_nesting() {
        let mut gl = GlobalLockState::new();
        gl.note_acquire();
        gl.note_acquire();

        let (fully_released, _signal) = gl.note_release(false).unwrap();
        assert!(!fully_released);
        assert_eq!(gl.hold_count(), 1);

        let (fully_released, signal) = gl.note_release(true).unwrap();
        assert!(fully_released);
        assert!(signal);
        assert_eq!(gl.hold_count(), 0);
    }

    #[test]
    fn release_without_acquire_is_error() {
        let mut acquisitions = MutexAcquisitions::new();
        assert!(acquisitions.record_release(ArenaIndex(0)).is_err());
    }

    #[test]
    fn reacquire_from_same_scope_nests() {
        let mut acquisitions = MutexAcquisitions::new();
        let mutex_a = ArenaIndex(0);
        acquisitions.record_acquire(mutex_a, 4, 0).unwrap();
        acquisitions.record_acquire(mutex_a, 4, 0).unwrap();
        acquisitions.record_release(mutex_a).unwrap();
        assert!(acquisitions.is_held(mutex_a));
        acquisitions.record_release(mutex_a).unwrap();
        assert!(!acquisitions.is_held(mutex_a));
    }
}
