//! Polygon resolution
//!
//! A polygon is the remaining exposure of one fact-version: a contiguous
//! tiling of its `[valid_from, valid_to)` span into rectangles, each capped in
//! system time by whatever newer version superseded that part of valid time.

use crate::errors::ChronoResult;
use crate::temporal::{InstantMicros, MIN_INSTANT};

use super::ceiling::Ceiling;

/// One `[valid_from, valid_to) x [.., system_to)` rectangle of a polygon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rectangle {
    pub valid_from: InstantMicros,
    pub valid_to: InstantMicros,
    pub system_to: InstantMicros,
}

/// Resolved exposure of one version.
///
/// Stored the same way as the ledger: `valid_times` has one more element than
/// `sys_tos`, and rectangle `i` spans `[valid_times[i], valid_times[i + 1])`.
/// Unlike the ledger, valid times here ascend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Polygon {
    valid_times: Vec<InstantMicros>,
    sys_tos: Vec<InstantMicros>,
}

impl Polygon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a polygon from its raw arrays; used by tests and tooling.
    ///
    /// `valid_times.len()` must be `sys_tos.len() + 1` (or both empty).
    pub fn from_parts(valid_times: Vec<InstantMicros>, sys_tos: Vec<InstantMicros>) -> Self {
        debug_assert!(
            (valid_times.is_empty() && sys_tos.is_empty())
                || valid_times.len() == sys_tos.len() + 1
        );
        Self {
            valid_times,
            sys_tos,
        }
    }

    pub fn clear(&mut self) {
        self.valid_times.clear();
        self.sys_tos.clear();
    }

    pub fn valid_times(&self) -> &[InstantMicros] {
        &self.valid_times
    }

    pub fn sys_tos(&self) -> &[InstantMicros] {
        &self.sys_tos
    }

    pub fn len(&self) -> usize {
        self.sys_tos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sys_tos.is_empty()
    }

    pub fn rectangle(&self, idx: usize) -> Rectangle {
        Rectangle {
            valid_from: self.valid_times[idx],
            valid_to: self.valid_times[idx + 1],
            system_to: self.sys_tos[idx],
        }
    }

    pub fn rectangles(&self) -> impl Iterator<Item = Rectangle> + '_ {
        (0..self.len()).map(move |idx| self.rectangle(idx))
    }

    /// The largest T such that the version is invisible whenever both its
    /// valid-time and system-time coordinates are at or beyond T.
    ///
    /// Scans from the high valid-time end and stops once no earlier rectangle
    /// can raise the running maximum.
    pub fn recency(&self) -> InstantMicros {
        let mut recency = MIN_INSTANT;

        for idx in (0..self.len()).rev() {
            let valid_to = self.valid_times[idx + 1];
            if valid_to <= recency {
                break;
            }
            recency = recency.max(valid_to.min(self.sys_tos[idx]));
        }

        recency
    }

    fn push_first(&mut self, valid_from: InstantMicros) {
        self.valid_times.push(valid_from);
    }

    fn push_rectangle(&mut self, valid_to: InstantMicros, system_to: InstantMicros) {
        self.valid_times.push(valid_to);
        self.sys_tos.push(system_to);
    }
}

/// Anything with a temporal extent the resolver can place in the ledger.
pub trait VersionExtent {
    fn system_from(&self) -> InstantMicros;
    fn valid_from(&self) -> InstantMicros;
    fn valid_to(&self) -> InstantMicros;
}

impl VersionExtent for (InstantMicros, InstantMicros, InstantMicros) {
    fn system_from(&self) -> InstantMicros {
        self.0
    }

    fn valid_from(&self) -> InstantMicros {
        self.1
    }

    fn valid_to(&self) -> InstantMicros {
        self.2
    }
}

/// Stateless resolver; the per-entity state is the caller-owned `Ceiling`.
pub struct PolygonResolver;

impl PolygonResolver {
    /// Computes the exposure of `version` against `ceiling` into `out`.
    ///
    /// Must be called before the matching `Ceiling::apply_log` for the same
    /// version, otherwise the version sees its own correction. An empty span
    /// yields an empty polygon.
    pub fn resolve_into<V: VersionExtent>(
        ceiling: &Ceiling,
        version: &V,
        out: &mut Polygon,
    ) -> ChronoResult<()> {
        out.clear();
        ceiling.check_order(version.system_from())?;

        let valid_from = version.valid_from();
        let valid_to = version.valid_to();
        if valid_from >= valid_to {
            return Ok(());
        }

        let breakpoints = ceiling.valid_times();
        let ceilings = ceiling.sys_ceilings();

        // breakpoints descend: walk from the range holding valid_from upward
        let mut idx = ceiling.range_index(valid_from);
        out.push_first(valid_from);

        loop {
            let range_upper = breakpoints[idx];
            let system_to = ceilings[idx];

            if range_upper >= valid_to {
                out.push_rectangle(valid_to, system_to);
                break;
            }

            out.push_rectangle(range_upper, system_to);

            // range_upper < valid_to <= MAX, so idx > 0
            idx -= 1;
        }

        Ok(())
    }

    /// Convenience wrapper allocating a fresh polygon
    pub fn resolve<V: VersionExtent>(ceiling: &Ceiling, version: &V) -> ChronoResult<Polygon> {
        let mut polygon = Polygon::new();
        Self::resolve_into(ceiling, version, &mut polygon)?;
        Ok(polygon)
    }

    /// Resolves `version`, then records it in `ceiling`.
    pub fn resolve_and_apply<V: VersionExtent>(
        ceiling: &mut Ceiling,
        version: &V,
        out: &mut Polygon,
    ) -> ChronoResult<()> {
        Self::resolve_into(ceiling, version, out)?;
        ceiling.apply_log(version.system_from(), version.valid_from(), version.valid_to())
    }
}

/// Returns `true` when `polygon` can contribute nothing to a query whose lower
/// bounds are `valid_lower` and `system_lower`.
pub fn is_stale(polygon: &Polygon, valid_lower: InstantMicros, system_lower: InstantMicros) -> bool {
    let recency = polygon.recency();
    recency <= valid_lower && recency <= system_lower
}
