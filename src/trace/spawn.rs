//! Logical call chains across suspension boundaries.
//!
//! A task's native backtrace ends at the scheduler frame that polled it, which
//! is useless for explaining *why* the task exists. [`SpawnTrace`] keeps the
//! part the scheduler destroys: the chain of spawn call sites from this task
//! up through its ancestors, captured with `#[track_caller]` at each
//! `spin`/`defer`. Errors and cancellation signals carry the chain so a
//! failure surfacing at the root still names the user code that created each
//! task in the lineage. Scheduler-internal resumption frames never appear
//! here; only spawn sites are recorded in the first place.

use core::fmt;
use std::panic::Location;
use std::rc::Rc;

struct Frame {
    site: &'static Location<'static>,
    parent: Option<Rc<Frame>>,
}

/// Immutable chain of spawn call sites, cheap to clone and extend.
///
/// The root task's trace is empty. Extending shares the parent chain rather
/// than copying it, so a thousand children of one task hold a thousand
/// one-frame extensions of the same tail.
#[derive(Clone, Default)]
pub struct SpawnTrace {
    head: Option<Rc<Frame>>,
}

impl SpawnTrace {
    /// The empty chain, used for the root task.
    #[must_use]
    pub const fn root() -> Self {
        Self { head: None }
    }

    /// Chain extended with one more spawn site, leaving `self` untouched.
    #[must_use]
    pub fn extend(&self, site: &'static Location<'static>) -> Self {
        Self {
            head: Some(Rc::new(Frame {
                site,
                parent: self.head.clone(),
            })),
        }
    }

    /// True for the root chain.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.head.is_none()
    }

    /// Number of recorded spawn sites.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut n = 0;
        let mut cur = self.head.as_deref();
        while let Some(frame) = cur {
            n += 1;
            cur = frame.parent.as_deref();
        }
        n
    }

    /// Spawn sites from the most recent spawn outward to the root.
    pub fn sites(&self) -> impl Iterator<Item = &'static Location<'static>> + '_ {
        let mut cur = self.head.as_deref();
        std::iter::from_fn(move || {
            let frame = cur?;
            cur = frame.parent.as_deref();
            Some(frame.site)
        })
    }
}

impl fmt::Display for SpawnTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, "root task");
        }
        for (i, site) in self.sites().enumerate() {
            if i > 0 {
                write!(f, " <- ")?;
            }
            write!(f, "spawned at {}:{}:{}", site.file(), site.line(), site.column())?;
        }
        Ok(())
    }
}

impl fmt::Debug for SpawnTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpawnTrace[{self}]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[track_caller]
    fn here() -> &'static Location<'static> {
        Location::caller()
    }

    #[test]
    fn root_is_empty() {
        let trace = SpawnTrace::root();
        assert!(trace.is_root());
        assert_eq!(trace.depth(), 0);
        assert_eq!(trace.to_string(), "root task");
    }

    #[test]
    fn extend_builds_child_to_ancestor_order() {
        let outer = here();
        let inner = here();
        let trace = SpawnTrace::root().extend(outer).extend(inner);

        assert_eq!(trace.depth(), 2);
        let sites: Vec<_> = trace.sites().map(Location::line).collect();
        assert_eq!(sites, vec![inner.line(), outer.line()]);
    }

    #[test]
    fn extend_shares_the_tail() {
        let a = here();
        let parent = SpawnTrace::root().extend(a);
        let left = parent.extend(here());
        let right = parent.extend(here());

        // Both children end at the same ancestor frame.
        assert_eq!(left.sites().last(), right.sites().last());
        assert_eq!(parent.depth(), 1);
        assert_eq!(left.depth(), 2);
    }

    #[test]
    fn display_lists_every_site() {
        let trace = SpawnTrace::root().extend(here()).extend(here());
        let rendered = trace.to_string();
        assert_eq!(rendered.matches("spawned at").count(), 2);
        assert!(rendered.contains(" <- "));
    }
}
