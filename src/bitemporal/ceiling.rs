//! Ceiling - the per-entity interval ledger
//!
//! Tracks, across the whole valid-time axis, the system time from which older
//! fact-versions of one entity are superseded.
//!
//! ```text
//! valid_times:   MAX  > b1 > b2 > ... > MIN      (strictly descending)
//! sys_ceilings:     c0   c1   c2  ...            (one fewer element)
//!
//! [valid_times[i + 1], valid_times[i]) is superseded from sys_ceilings[i] on
//! ```
//!
//! Versions must be applied newest first, so every `apply_log` carries a
//! `system_from` no later than the previous one. That ordering is what lets a
//! new log simply overwrite the ceiling of the range it covers.

use crate::errors::{ChronoError, ChronoResult};
use crate::temporal::{InstantMicros, MAX_INSTANT, MIN_INSTANT};

/// Mutable, resettable ledger owned by exactly one entity stream at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ceiling {
    valid_times: Vec<InstantMicros>,
    sys_ceilings: Vec<InstantMicros>,
    /// `system_from` of the last applied log; `MAX_INSTANT` right after a reset
    last_system_from: InstantMicros,
}

impl Default for Ceiling {
    fn default() -> Self {
        Self::new()
    }
}

impl Ceiling {
    /// A ledger with nothing superseded.
    pub fn new() -> Self {
        Self {
            valid_times: vec![MAX_INSTANT, MIN_INSTANT],
            sys_ceilings: vec![MAX_INSTANT],
            last_system_from: MAX_INSTANT,
        }
    }

    /// Reinitializes to one range spanning all valid time with ceiling +inf.
    ///
    /// Keeps the allocations.
    pub fn reset(&mut self) {
        self.valid_times.clear();
        self.valid_times.extend_from_slice(&[MAX_INSTANT, MIN_INSTANT]);
        self.sys_ceilings.clear();
        self.sys_ceilings.push(MAX_INSTANT);
        self.last_system_from = MAX_INSTANT;
    }

    /// Valid-time breakpoints, strictly descending, `MAX` first and `MIN` last
    pub fn valid_times(&self) -> &[InstantMicros] {
        &self.valid_times
    }

    /// System-time ceilings; `sys_ceilings()[i]` bounds
    /// `[valid_times()[i + 1], valid_times()[i])`
    pub fn sys_ceilings(&self) -> &[InstantMicros] {
        &self.sys_ceilings
    }

    /// Number of valid-time ranges
    pub fn range_count(&self) -> usize {
        self.sys_ceilings.len()
    }

    /// `system_from` of the newest log applied since the last reset
    pub fn last_system_from(&self) -> InstantMicros {
        self.last_system_from
    }

    /// Index of the range containing `valid_time`.
    pub fn range_index(&self, valid_time: InstantMicros) -> usize {
        // first breakpoint <= valid_time; the range above it is the one we want
        let idx = self.valid_times.partition_point(|&vt| vt > valid_time);
        idx.saturating_sub(1)
    }

    /// Records that `[valid_from, valid_to)` is superseded from `system_from`
    /// onward.
    ///
    /// `valid_from >= valid_to` is a no-op. A `system_from` later than the
    /// previously applied one is rejected: versions must arrive newest first.
    pub fn apply_log(
        &mut self,
        system_from: InstantMicros,
        valid_from: InstantMicros,
        valid_to: InstantMicros,
    ) -> ChronoResult<()> {
        self.check_order(system_from)?;

        if valid_from >= valid_to {
            return Ok(());
        }

        self.last_system_from = system_from;

        let valid_times = &self.valid_times;
        // first breakpoint at or below each boundary
        let hi = valid_times.partition_point(|&vt| vt > valid_to);
        let lo = valid_times.partition_point(|&vt| vt > valid_from);
        let from_exists = valid_times[lo] == valid_from;

        // lo >= 1 always: valid_times[0] is MAX and valid_from < valid_to <= MAX
        let below_ceiling = self.sys_ceilings[lo - 1];

        // breakpoints in [hi, lo) sit inside (valid_from, valid_to] and collapse
        // into the single new range
        self.valid_times.splice(
            hi..lo,
            std::iter::once(valid_to).chain((!from_exists).then_some(valid_from)),
        );

        // the range straddling valid_to keeps its ceiling above valid_to (left in
        // place at hi - 1); the one straddling valid_from keeps it below
        self.sys_ceilings.splice(
            hi..lo,
            std::iter::once(system_from).chain((!from_exists).then_some(below_ceiling)),
        );

        debug_assert_eq!(self.valid_times.len(), self.sys_ceilings.len() + 1);

        Ok(())
    }

    /// Fails if `system_from` is later than the newest applied log.
    pub fn check_order(&self, system_from: InstantMicros) -> ChronoResult<()> {
        if system_from > self.last_system_from {
            return Err(ChronoError::malformed(format!(
                "system_from {} arrived after {}: versions of one entity must be \
                 in descending system-time order",
                system_from, self.last_system_from
            )));
        }
        Ok(())
    }
}
