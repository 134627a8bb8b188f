//! Identifier types and the runtime clock.
//!
//! Record identifiers wrap generation-stamped arena indices, so a stale id
//! held across a slot-reuse cycle simply stops resolving instead of aliasing
//! the new occupant. Plain-counter identifiers (`ScopeId`, `TimerId`) never
//! recycle within a runtime's lifetime.

use crate::util::ArenaIndex;
use core::fmt;
use std::ops::Add;
use std::time::Duration;

/// Identifier of a task record.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(crate) ArenaIndex);

impl TaskId {
    pub(crate) const fn from_arena(index: ArenaIndex) -> Self {
        Self(index)
    }

    pub(crate) const fn arena_index(self) -> ArenaIndex {
        self.0
    }

    /// Builds a task id from raw parts, for tests that need a stable id
    /// without a live runtime.
    #[doc(hidden)]
    #[must_use]
    pub const fn new_for_test(slot: u32, generation: u32) -> Self {
        Self(ArenaIndex::new(slot, generation))
    }

    /// Zero task id for unit tests that only need a placeholder.
    #[doc(hidden)]
    #[must_use]
    pub const fn testing_default() -> Self {
        Self(ArenaIndex::new(0, 0))
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({}:{})", self.0.slot(), self.0.generation())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0.slot())
    }
}

/// Identifier of a pooled operation context.
///
/// Carries the slot generation, so a completion delivered for an already
/// released-and-reused slot fails the lookup instead of resuming the wrong
/// owner. The human-facing serial number lives on the record itself.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpId(pub(crate) ArenaIndex);

impl OpId {
    pub(crate) const fn from_arena(index: ArenaIndex) -> Self {
        Self(index)
    }

    pub(crate) const fn arena_index(self) -> ArenaIndex {
        self.0
    }

    /// Builds an op id from raw parts, for tests.
    #[doc(hidden)]
    #[must_use]
    pub const fn new_for_test(slot: u32, generation: u32) -> Self {
        Self(ArenaIndex::new(slot, generation))
    }

    /// The raw slot number; two ops that reused one slot share it.
    #[must_use]
    pub const fn slot(self) -> u32 {
        self.0.slot()
    }
}

impl fmt::Debug for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpId({}:{})", self.0.slot(), self.0.generation())
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op{}", self.0.slot())
    }
}

/// Identifier of a cancellation scope, unique per runtime.
///
/// A signal stamped with a scope id is consumed only by that scope; signals
/// without one (handle-level cancel/interrupt) unwind the whole task.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(pub(crate) u64);

impl ScopeId {
    /// Builds a scope id from a raw counter value, for tests.
    #[doc(hidden)]
    #[must_use]
    pub const fn new_for_test(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeId({})", self.0)
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// Identifier of an armed timer, unique per runtime.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub(crate) u64);

impl fmt::Debug for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimerId({})", self.0)
    }
}

/// A logical timestamp in nanoseconds.
///
/// Under a production reactor this tracks wall-clock time; under the lab
/// reactor it is virtual time that only moves when the driver lets it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Time(u64);

impl Time {
    /// The zero instant.
    pub const ZERO: Self = Self(0);

    /// The maximum representable instant.
    pub const MAX: Self = Self(u64::MAX);

    /// Instant from nanoseconds since the runtime epoch.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Instant from milliseconds since the runtime epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Instant from seconds since the runtime epoch.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    /// Nanoseconds since the runtime epoch.
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Milliseconds since the runtime epoch, truncated.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Advances by `nanos`, saturating at [`Time::MAX`].
    #[must_use]
    pub const fn saturating_add_nanos(self, nanos: u64) -> Self {
        Self(self.0.saturating_add(nanos))
    }

    /// Advances by a [`Duration`], saturating at [`Time::MAX`].
    #[must_use]
    pub fn saturating_add(self, d: Duration) -> Self {
        let nanos = u64::try_from(d.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(nanos))
    }

    /// Nanoseconds elapsed since `earlier`, or 0 if `self` precedes it.
    #[must_use]
    pub const fn nanos_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Duration elapsed since `earlier`, or zero if `self` precedes it.
    #[must_use]
    pub const fn duration_since(self, earlier: Self) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Time {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl fmt::Debug for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Time({}ns)", self.0)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 1_000_000_000 {
            write!(f, "{}.{:03}s", self.0 / 1_000_000_000, (self.0 / 1_000_000) % 1000)
        } else if self.0 >= 1_000_000 {
            write!(f, "{}ms", self.0 / 1_000_000)
        } else if self.0 >= 1_000 {
            write!(f, "{}us", self.0 / 1_000)
        } else {
            write!(f, "{}ns", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_by_generation() {
        let a = TaskId::new_for_test(3, 0);
        let b = TaskId::new_for_test(3, 1);
        assert_ne!(a, b);
        assert_eq!(format!("{a}"), "T3");

        let op = OpId::new_for_test(7, 2);
        assert_eq!(op.slot(), 7);
        assert_eq!(format!("{op}"), "op7");
    }

    #[test]
    fn time_conversions_and_arithmetic() {
        assert_eq!(Time::from_secs(1).as_nanos(), 1_000_000_000);
        assert_eq!(Time::from_millis(2).as_nanos(), 2_000_000);

        let t = Time::from_millis(10) + Duration::from_millis(5);
        assert_eq!(t.as_millis(), 15);
        assert_eq!(t.nanos_since(Time::from_millis(10)), 5_000_000);
        assert_eq!(Time::ZERO.nanos_since(t), 0);
        assert_eq!(t.duration_since(Time::from_millis(10)), Duration::from_millis(5));
    }

    #[test]
    fn time_saturates() {
        assert_eq!(Time::MAX.saturating_add_nanos(1), Time::MAX);
        assert_eq!(Time::MAX + Duration::from_secs(1), Time::MAX);
    }

    #[test]
    fn time_display_is_humanized() {
        assert_eq!(format!("{}", Time::from_nanos(15)), "15ns");
        assert_eq!(format!("{}", Time::from_nanos(2_500)), "2us");
        assert_eq!(format!("{}", Time::from_millis(7)), "7ms");
        assert_eq!(format!("{}", Time::from_nanos(1_250_000_000)), "1.250s");
    }
}
