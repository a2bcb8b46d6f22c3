//! The two state components the evaluator reads through: a register/variable
//! valuation with covering/covered invalidation, and a partitioned memory
//! store with strong and weak updates.

use std::collections::{HashMap, HashSet};

use crate::config::AnalysisConfig;
use crate::domain::AbstractDomain;
use crate::region::MemoryRegion;

/// Identifies an RTL variable (typically a machine register). Carries its
/// own bit width so a valuation can manufacture the correct `⊤` default for
/// a variable it has never seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId {
    pub id: u32,
    pub width: u32,
}

impl VarId {
    pub const fn new(id: u32, width: u32) -> Self {
        VarId { id, width }
    }
}

/// Supplies the register-aliasing topology (which variables cover or are
/// covered by which others). Kept as an injected dependency rather than a
/// global table, since it is machine/front-end specific and this crate
/// doesn't own a disassembler.
pub trait RegisterLayout {
    /// Every variable whose storage overlaps `var`, not including `var`
    /// itself — e.g. for `EAX` this would return `AX`, `AL`, `AH`, `RAX`.
    fn overlapping(&self, var: VarId) -> Vec<VarId>;
}

/// A `RegisterLayout` with no aliasing: every variable is independent. Used
/// when the caller's variables are already disjoint storage (memory SSA
/// variables, synthesized temporaries), and in tests.
pub struct FlatRegisterLayout;

impl RegisterLayout for FlatRegisterLayout {
    fn overlapping(&self, _var: VarId) -> Vec<VarId> {
        Vec::new()
    }
}

/// `Var -> (Dom, Region)`, defaulting absent keys to `(⊤, ⊤)`.
#[derive(Debug, Clone)]
pub struct VariableValuation<D: AbstractDomain> {
    entries: HashMap<VarId, (D, MemoryRegion)>,
}

impl<D: AbstractDomain> Default for VariableValuation<D> {
    fn default() -> Self {
        VariableValuation { entries: HashMap::new() }
    }
}

impl<D: AbstractDomain> VariableValuation<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, var: VarId) -> (D, MemoryRegion) {
        match self.entries.get(&var) {
            Some((v, r)) => (v.clone(), *r),
            None => (D::top(var.width), MemoryRegion::Top),
        }
    }

    /// Writes `value`/`region` for `var`, first invalidating every
    /// covering/covered register per `layout`. Per the `(⊤, ⊤)` default,
    /// writing that pair is equivalent to (and implemented as) removing
    /// the entry outright.
    pub fn set(&mut self, var: VarId, value: D, region: MemoryRegion, layout: &dyn RegisterLayout) {
        for other in layout.overlapping(var) {
            self.entries.remove(&other);
        }
        self.entries.remove(&var);
        if !(region == MemoryRegion::Top && value.is_top()) {
            self.entries.insert(var, (value, region));
        }
    }

    /// Pointwise join over the union of keys. A key present on only one
    /// side joins against that side's implicit `⊤` default, which is `⊤`
    /// regardless of the other side's value — such keys are therefore
    /// dropped rather than stored.
    pub fn join(&self, other: &Self) -> Self {
        let mut entries = HashMap::new();
        for (k, (v1, r1)) in &self.entries {
            if let Some((v2, r2)) = other.entries.get(k) {
                let jv = v1.join(v2);
                let jr = r1.join(r2);
                if !(jr == MemoryRegion::Top && jv.is_top()) {
                    entries.insert(*k, (jv, jr));
                }
            }
        }
        VariableValuation { entries }
    }

    pub fn less_or_equal(&self, other: &Self) -> bool {
        let keys: HashSet<VarId> = self.entries.keys().chain(other.entries.keys()).copied().collect();
        keys.iter().all(|k| {
            let (v1, r1) = self.get(*k);
            let (v2, r2) = other.get(*k);
            v1.less_or_equal(&v2) && r1.less_or_equal(&r2)
        })
    }
}

/// `(Region, Offset, Width) -> Dom`, with a sticky global-top sentinel.
#[derive(Debug, Clone)]
pub struct PartitionedMemory<D: AbstractDomain> {
    cells: HashMap<(MemoryRegion, u64, u32), D>,
    is_top: bool,
}

impl<D: AbstractDomain> Default for PartitionedMemory<D> {
    fn default() -> Self {
        PartitionedMemory { cells: HashMap::new(), is_top: false }
    }
}

impl<D: AbstractDomain> PartitionedMemory<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, region: MemoryRegion, offset: u64, width: u32) -> D {
        if self.is_top {
            return D::top(width);
        }
        self.cells
            .get(&(region, offset, width))
            .cloned()
            .unwrap_or_else(|| D::top(width))
    }

    /// Strong update: replaces the cell outright. Sound only when the
    /// caller has already established the write address is unique.
    pub fn set(&mut self, region: MemoryRegion, offset: u64, width: u32, value: D) {
        if self.is_top {
            return;
        }
        self.cells.insert((region, offset, width), value);
    }

    /// Weak update: joins into the existing cell (or seeds it with `value`
    /// if absent). Always sound, used for writes through a non-singleton
    /// address set.
    pub fn weak_update(&mut self, region: MemoryRegion, offset: u64, width: u32, value: D) {
        if self.is_top {
            return;
        }
        let entry = self.cells.entry((region, offset, width)).or_insert_with(|| D::bot(width));
        *entry = entry.join(&value);
    }

    pub fn set_top(&mut self) {
        self.is_top = true;
        self.cells.clear();
    }

    /// Reads through a possibly-non-singleton address, per §4.5: a unique
    /// concrete address reads that one cell directly; a small-enough set of
    /// candidates (bounded by `config.explicit_threshold`) is enumerated and
    /// its cells joined; anything larger collapses to `⊤` rather than pay
    /// for an unbounded enumeration.
    pub fn read_through(&self, region: MemoryRegion, address: &D, width: u32, config: &AnalysisConfig) -> D {
        if self.is_top {
            return D::top(width);
        }
        if let Some(addr) = address.unique_concretization() {
            return self.get(region, addr.zext_u64(), width);
        }
        let candidates: Vec<_> = address.iter_values().take(config.explicit_threshold + 1).collect();
        if candidates.is_empty() || candidates.len() > config.explicit_threshold {
            return D::top(width);
        }
        candidates
            .iter()
            .map(|offset| self.get(region, offset.zext_u64(), width))
            .fold(D::bot(width), |acc, v| acc.join(&v))
    }

    /// Writes through a possibly-non-singleton address, per §4.5's store-write
    /// rule: a singleton address gets a strong update; a small enumerable set
    /// gets a weak update at every candidate; anything unenumerable (or the
    /// full address space) saturates the entire store to `⊤`.
    pub fn write_through(&mut self, region: MemoryRegion, address: &D, width: u32, value: D, config: &AnalysisConfig) {
        if self.is_top {
            return;
        }
        if let Some(addr) = address.unique_concretization() {
            self.set(region, addr.zext_u64(), width, value);
            return;
        }
        let candidates: Vec<_> = address.iter_values().take(config.explicit_threshold + 1).collect();
        if candidates.is_empty() || candidates.len() > config.explicit_threshold {
            self.set_top();
            return;
        }
        for offset in candidates {
            self.weak_update(region, offset.zext_u64(), width, value.clone());
        }
    }

    pub fn is_top(&self) -> bool {
        self.is_top
    }

    pub fn join(&self, other: &Self) -> Self {
        if self.is_top || other.is_top {
            let mut joined = Self::new();
            joined.set_top();
            return joined;
        }
        let mut cells = HashMap::new();
        for (k, v1) in &self.cells {
            if let Some(v2) = other.cells.get(k) {
                let jv = v1.join(v2);
                if !jv.is_top() {
                    cells.insert(*k, jv);
                }
            }
        }
        PartitionedMemory { cells, is_top: false }
    }

    pub fn less_or_equal(&self, other: &Self) -> bool {
        if other.is_top {
            return true;
        }
        if self.is_top {
            return false;
        }
        let keys: HashSet<&(MemoryRegion, u64, u32)> =
            self.cells.keys().chain(other.cells.keys()).collect();
        keys.iter().all(|k| {
            let v1 = self.cells.get(*k).cloned().unwrap_or_else(|| D::top(k.2));
            let v2 = other.cells.get(*k).cloned().unwrap_or_else(|| D::top(k.2));
            v1.less_or_equal(&v2)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitvector::BitNumber;
    use crate::interval::WrappedInterval;

    struct X86Layout;
    impl RegisterLayout for X86Layout {
        fn overlapping(&self, var: VarId) -> Vec<VarId> {
            const EAX: u32 = 0;
            if var.id != EAX && var.width >= 8 {
                return Vec::new();
            }
            match (var.id, var.width) {
                (EAX, 32) => vec![VarId::new(EAX, 16), VarId::new(EAX, 8), VarId::new(EAX, 64)],
                (EAX, 16) => vec![VarId::new(EAX, 32), VarId::new(EAX, 8), VarId::new(EAX, 64)],
                (EAX, 8) => vec![VarId::new(EAX, 32), VarId::new(EAX, 16), VarId::new(EAX, 64)],
                _ => Vec::new(),
            }
        }
    }

    #[test]
    fn default_is_top() {
        let v: VariableValuation<WrappedInterval> = VariableValuation::new();
        let (val, region) = v.get(VarId::new(0, 32));
        assert!(val.is_top());
        assert_eq!(region, MemoryRegion::Top);
    }

    #[test]
    fn writing_eax_invalidates_covering_and_covered_registers() {
        let mut v: VariableValuation<WrappedInterval> = VariableValuation::new();
        let layout = X86Layout;
        let al = VarId::new(0, 8);
        v.set(al, WrappedInterval::number(&BitNumber::new(7, 8)), MemoryRegion::Top, &layout);
        assert!(!v.get(al).0.is_top());

        let eax = VarId::new(0, 32);
        v.set(eax, WrappedInterval::number(&BitNumber::new(0xdead, 32)), MemoryRegion::Top, &layout);
        // Writing EAX must invalidate the previously-set AL entry.
        assert!(v.get(al).0.is_top());
        assert!(!v.get(eax).0.is_top());
    }

    #[test]
    fn join_drops_keys_not_shared_by_both_sides() {
        let mut a: VariableValuation<WrappedInterval> = VariableValuation::new();
        let mut b: VariableValuation<WrappedInterval> = VariableValuation::new();
        let layout = FlatRegisterLayout;
        let x = VarId::new(1, 32);
        a.set(x, WrappedInterval::number(&BitNumber::new(1, 32)), MemoryRegion::Top, &layout);
        let joined = a.join(&b);
        assert!(joined.get(x).0.is_top());
        b.set(x, WrappedInterval::number(&BitNumber::new(1, 32)), MemoryRegion::Top, &layout);
        let joined2 = a.join(&b);
        assert!(!joined2.get(x).0.is_top());
    }

    #[test]
    fn weak_update_joins_two_addresses_scenario() {
        let mut mem: PartitionedMemory<WrappedInterval> = PartitionedMemory::new();
        let seven = WrappedInterval::number(&BitNumber::new(7, 32));
        mem.set(MemoryRegion::Global, 0x1000, 32, WrappedInterval::number(&BitNumber::new(3, 32)));
        mem.weak_update(MemoryRegion::Global, 0x1000, 32, seven.clone());
        mem.weak_update(MemoryRegion::Global, 0x2000, 32, seven.clone());
        let at_1000 = mem.get(MemoryRegion::Global, 0x1000, 32);
        let at_2000 = mem.get(MemoryRegion::Global, 0x2000, 32);
        assert_eq!(at_1000, WrappedInterval::number(&BitNumber::new(3, 32)).join(&seven));
        assert_eq!(at_2000, seven);
    }

    #[test]
    fn set_top_saturates_all_reads() {
        let mut mem: PartitionedMemory<WrappedInterval> = PartitionedMemory::new();
        mem.set(MemoryRegion::Global, 0, 32, WrappedInterval::number(&BitNumber::new(1, 32)));
        mem.set_top();
        assert!(mem.get(MemoryRegion::Global, 0, 32).is_top());
    }

    #[test]
    fn write_through_weak_updates_every_enumerable_candidate() {
        let config = crate::config::AnalysisConfig::default();
        let mut mem: PartitionedMemory<WrappedInterval> = PartitionedMemory::new();
        let seven = WrappedInterval::number(&BitNumber::new(7, 32));

        let single_candidate = WrappedInterval::number(&BitNumber::new(0x1000, 32));
        mem.write_through(MemoryRegion::Global, &single_candidate, 32, seven.clone(), &config);
        assert_eq!(mem.get(MemoryRegion::Global, 0x1000, 32), seven);

        let two_candidates = WrappedInterval::from_range(0x3000, 0x3001, 32);
        mem.write_through(MemoryRegion::Global, &two_candidates, 32, seven.clone(), &config);
        assert_eq!(mem.get(MemoryRegion::Global, 0x3000, 32), seven);
        assert_eq!(mem.get(MemoryRegion::Global, 0x3001, 32), seven);
    }

    #[test]
    fn read_through_beyond_explicit_threshold_collapses_to_top() {
        let config = crate::config::AnalysisConfig { explicit_threshold: 1, heap_threshold: 1 };
        let mut mem: PartitionedMemory<WrappedInterval> = PartitionedMemory::new();
        mem.set(MemoryRegion::Global, 0, 32, WrappedInterval::number(&BitNumber::new(9, 32)));
        mem.set(MemoryRegion::Global, 1, 32, WrappedInterval::number(&BitNumber::new(9, 32)));
        let wide_address = WrappedInterval::from_range(0, 2, 32);
        let result = mem.read_through(MemoryRegion::Global, &wide_address, 32, &config);
        assert!(result.is_top());
    }
}
