//! The memory-region lattice used to tag where a value's address (if it
//! represents one) lives.

/// Where an abstract value's address component, if any, points.
///
/// Forms a flat lattice with `Top` above every named region and every named
/// region incomparable with every other: `Global`, `Stack`, and each
/// `Heap(id)` are siblings, not nested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MemoryRegion {
    /// Could be any region; the join of two distinct regions.
    Top,
    Global,
    Stack,
    /// One of a finite family of heap regions, identified by allocation
    /// site or similar small index.
    Heap(u32),
}

impl MemoryRegion {
    /// The lattice join: equal regions are idempotent, anything else
    /// collapses to `Top`.
    pub fn join(&self, other: &MemoryRegion) -> MemoryRegion {
        if self == other {
            *self
        } else {
            MemoryRegion::Top
        }
    }

    /// The lattice meet. Distinct concrete regions have no common point
    /// below them in this flat lattice, but since this domain never
    /// represents `Bottom` explicitly, `Top` is returned as the closest
    /// available approximation when the regions disagree and neither is
    /// `Top`; callers that need to detect "provably unreachable" should
    /// compare with `is_disjoint_from` instead.
    pub fn meet(&self, other: &MemoryRegion) -> MemoryRegion {
        match (self, other) {
            (MemoryRegion::Top, r) | (r, MemoryRegion::Top) => *r,
            (a, b) if a == b => *a,
            _ => MemoryRegion::Top,
        }
    }

    pub fn less_or_equal(&self, other: &MemoryRegion) -> bool {
        matches!(other, MemoryRegion::Top) || self == other
    }

    /// Two concrete, distinct regions can never alias.
    pub fn is_disjoint_from(&self, other: &MemoryRegion) -> bool {
        !matches!(self, MemoryRegion::Top)
            && !matches!(other, MemoryRegion::Top)
            && self != other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_of_distinct_regions_is_top() {
        assert_eq!(MemoryRegion::Stack.join(&MemoryRegion::Global), MemoryRegion::Top);
        assert_eq!(MemoryRegion::Heap(0).join(&MemoryRegion::Heap(1)), MemoryRegion::Top);
    }

    #[test]
    fn join_of_equal_regions_is_idempotent() {
        assert_eq!(MemoryRegion::Heap(3).join(&MemoryRegion::Heap(3)), MemoryRegion::Heap(3));
    }

    #[test]
    fn distinct_concrete_regions_are_disjoint() {
        assert!(MemoryRegion::Stack.is_disjoint_from(&MemoryRegion::Global));
        assert!(!MemoryRegion::Top.is_disjoint_from(&MemoryRegion::Global));
    }

    #[test]
    fn less_or_equal_respects_top() {
        assert!(MemoryRegion::Stack.less_or_equal(&MemoryRegion::Top));
        assert!(!MemoryRegion::Top.less_or_equal(&MemoryRegion::Stack));
    }
}
