//! Node Flags
//!
//! Every reactive node carries a single bitmask describing what it is and
//! where it stands in the current update cycle. Combinations are tested
//! with one mask operation instead of a chain of booleans.

bitflags::bitflags! {
    /// State and capability bits of a reactive node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub(crate) struct ReactiveFlags: u16 {
        /// The node can be a dependency whose change propagates
        /// (signals, computeds, keyed deps).
        const MUTABLE = 1 << 0;
        /// The node is an eager sink (effects).
        const WATCHING = 1 << 1;
        /// The node is rebuilding its dependency list right now.
        const RECURSED_CHECK = 1 << 2;
        /// A write reached the node while `RECURSED_CHECK` was set.
        const RECURSED = 1 << 3;
        /// Confirmed stale.
        const DIRTY = 1 << 4;
        /// Maybe stale; resolved by a pull-phase walk.
        const PENDING = 1 << 5;
        /// Effect only: notifications are held until resumed.
        const PAUSED = 1 << 6;
        /// Effect only: stopped for good.
        const STOP = 1 << 7;
        /// Effect only: a self-triggered write re-runs the effect.
        const ALLOW_RECURSE = 1 << 8;
    }
}

impl ReactiveFlags {
    /// Bits that say the node already knows it may be out of date.
    pub(crate) const STALE: Self = Self::DIRTY.union(Self::PENDING);

    /// Bits that say a write arrived during, or must wait for, a rebuild.
    pub(crate) const RECURSION: Self = Self::RECURSED_CHECK.union(Self::RECURSED);

    /// Bits that make a node a subscriber the push phase cares about.
    pub(crate) const REACTIVE: Self = Self::MUTABLE.union(Self::WATCHING);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_distinct() {
        let all = [
            ReactiveFlags::MUTABLE,
            ReactiveFlags::WATCHING,
            ReactiveFlags::RECURSED_CHECK,
            ReactiveFlags::RECURSED,
            ReactiveFlags::DIRTY,
            ReactiveFlags::PENDING,
            ReactiveFlags::PAUSED,
            ReactiveFlags::STOP,
            ReactiveFlags::ALLOW_RECURSE,
        ];

        let mut seen = ReactiveFlags::empty();
        for flag in all {
            assert!(!seen.intersects(flag), "{flag:?} overlaps");
            seen |= flag;
        }
        assert_eq!(seen, ReactiveFlags::all());
    }

    #[test]
    fn composite_masks() {
        assert!(ReactiveFlags::STALE.contains(ReactiveFlags::DIRTY));
        assert!(ReactiveFlags::STALE.contains(ReactiveFlags::PENDING));
        assert!(!ReactiveFlags::RECURSION.intersects(ReactiveFlags::STALE));
        assert_eq!(
            ReactiveFlags::REACTIVE,
            ReactiveFlags::MUTABLE | ReactiveFlags::WATCHING
        );
    }
}
