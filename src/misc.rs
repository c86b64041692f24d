//! Small value types shared across the decoder, namespace and evaluator.

/// The number of an `ArgX` object (0-6).
pub type ArgNum = u8;
/// The number of a `LocalX` object (0-7).
pub type LocalNum = u8;

/// A SyncLevel, as declared on a `Method` or `Mutex` (0-15, ACPI §19.6.67/19.6.101).
pub type SyncLevel = u8;

pub const MAX_SYNC_LEVEL: SyncLevel = 15;

/// A timeout, in milliseconds, for mutex/event acquisition. ACPI defines `0xffff` as "wait
/// indefinitely"; we also treat any larger value the same way.
pub type Timeout = u16;
pub const TIMEOUT_INDEFINITE: Timeout = 0xffff;

/// The compile-time maximum recursion depth for both argument-list consumption and the
/// evaluator's expression/statement walk (spec §4.2, §4.7). A lower bound is used when the
/// `fuzzing` feature is enabled, to keep fuzz iterations fast and crash-report stacks shallow.
#[cfg(not(feature = "fuzzing"))]
pub const MAX_RECURSION_DEPTH: usize = 2048;
#[cfg(feature = "fuzzing")]
pub const MAX_RECURSION_DEPTH: usize = 128;
