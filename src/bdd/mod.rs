//! The BDD-backed set domain used for address tracking: an exact set of
//! `w`-bit values (via [`node::BddNode`]) paired with a [`MemoryRegion`].
//!
//! Arithmetic that has no natural exact BDD encoding (`add`, `mul_double`,
//! `div`/`rem`, shifts, bitwise ops) is computed by enumerating both
//! operands' concrete members when that is cheap enough and rebuilding the
//! result set; past [`ENUMERATION_CAP`] it soundly falls back to `Top`
//! rather than attempting a symbolic bit-blasted adder. Projection
//! (`truncate`/`zero_extend`) is exact, since those are natural BDD
//! operations (existential quantification / conjunction with a
//! forced-zero chain).

mod node;

use itertools::Itertools;

use crate::bitvector::{mask_for, BitNumber};
use crate::domain::AbstractDomain;
use crate::region::MemoryRegion;
use node::BddNode;

/// Concrete-member cap past which arithmetic/comparison/assume operations
/// give up on precision and fall back to a safe, coarser result.
const ENUMERATION_CAP: usize = 256;

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BddSet {
    #[cfg_attr(feature = "serde", serde(skip, default = "node::BddNode::false_node"))]
    node: BddNode,
    width: u32,
    region: MemoryRegion,
}

impl PartialEq for BddSet {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width && self.region == other.region && self.node == other.node
    }
}

impl BddSet {
    pub fn region(&self) -> MemoryRegion {
        self.region
    }

    pub fn with_region(mut self, region: MemoryRegion) -> Self {
        self.region = region;
        self
    }

    /// Builds a set from an explicit list of concrete members, all sharing
    /// `width`, tagged with `region`.
    pub fn from_values(values: impl IntoIterator<Item = BitNumber>, width: u32, region: MemoryRegion) -> Self {
        let node = values
            .into_iter()
            .fold(BddNode::false_node(), |acc, v| acc.or(&BddNode::singleton(&v)));
        BddSet { node, width, region }
    }

    fn singleton_region(value: &BitNumber, region: MemoryRegion) -> Self {
        BddSet {
            node: BddNode::singleton(value),
            width: value.bit_size(),
            region,
        }
    }

    fn enumerate(&self) -> Option<Vec<BitNumber>> {
        self.node.enumerate(self.width, ENUMERATION_CAP)
    }

    /// Computes `f` over every pair of concrete members when both operands
    /// are small enough to enumerate, else returns `Top` at `result_width`.
    fn combine<F: Fn(&BitNumber, &BitNumber) -> BitNumber>(
        &self,
        other: &Self,
        result_width: u32,
        f: F,
    ) -> BddSet {
        let region = self.region.join(&other.region);
        match (self.enumerate(), other.enumerate()) {
            (Some(xs), Some(ys)) if xs.len().saturating_mul(ys.len()) <= ENUMERATION_CAP => {
                let values = xs.iter().cartesian_product(ys.iter()).map(|(x, y)| f(x, y));
                BddSet::from_values(values, result_width, region)
            }
            _ => BddSet::top_with_region(result_width, region),
        }
    }

    fn top_with_region(width: u32, region: MemoryRegion) -> Self {
        BddSet {
            node: BddNode::true_node(),
            width,
            region,
        }
    }

    fn unsigned_minmax(&self) -> Option<(u64, u64)> {
        self.enumerate().map(|vs| {
            let lo = vs.iter().map(BitNumber::zext_u64).min().unwrap_or(0);
            let hi = vs.iter().map(BitNumber::zext_u64).max().unwrap_or(0);
            (lo, hi)
        })
    }

    fn signed_minmax(&self) -> Option<(i64, i64)> {
        self.enumerate().map(|vs| {
            let lo = vs.iter().map(BitNumber::sext_i64).min().unwrap_or(0);
            let hi = vs.iter().map(BitNumber::sext_i64).max().unwrap_or(0);
            (lo, hi)
        })
    }

    /// The Minkowski sum with `offset`: exact for a singleton `self` (plain
    /// translation of every element), a sound over-approximation (`Top`
    /// past [`ENUMERATION_CAP`]) otherwise.
    pub fn plus(&self, offset: &BitNumber) -> BddSet {
        debug_assert_eq!(self.width, offset.bit_size());
        match self.enumerate() {
            Some(vs) => BddSet::from_values(vs.iter().map(|v| v.add(offset)), self.width, self.region),
            None => BddSet::top_with_region(self.width, self.region),
        }
    }

    pub fn negate_set(&self) -> BddSet {
        match self.enumerate() {
            Some(vs) => BddSet::from_values(vs.iter().map(BitNumber::neg), self.width, self.region),
            None => BddSet::top_with_region(self.width, self.region),
        }
    }

    /// Projects onto bits `[lo, hi]` inclusive, producing a `hi - lo + 1`
    /// wide set.
    pub fn bit_extract(&self, hi: u32, lo: u32) -> BddSet {
        debug_assert!(lo <= hi && hi < self.width);
        let new_width = hi - lo + 1;
        match self.enumerate() {
            Some(vs) => {
                let values = vs.iter().map(|v| BitNumber::new((v.zext_u64() >> lo) & mask_for(new_width), new_width));
                BddSet::from_values(values, new_width, self.region)
            }
            None => BddSet::top_with_region(new_width, self.region),
        }
    }

    /// `true` iff this set is exactly one concrete address, the condition
    /// under which a store may perform a strong update.
    pub fn is_singleton(&self) -> bool {
        self.has_unique_concretization()
    }
}

impl AbstractDomain for BddSet {
    fn width(&self) -> u32 {
        self.width
    }

    fn bot(width: u32) -> Self {
        BddSet {
            node: BddNode::false_node(),
            width,
            region: MemoryRegion::Top,
        }
    }

    fn top(width: u32) -> Self {
        BddSet::top_with_region(width, MemoryRegion::Top)
    }

    fn join(&self, other: &Self) -> Self {
        debug_assert_eq!(self.width, other.width);
        BddSet {
            node: self.node.or(&other.node),
            width: self.width,
            region: self.region.join(&other.region),
        }
    }

    fn meet(&self, other: &Self) -> Self {
        debug_assert_eq!(self.width, other.width);
        BddSet {
            node: self.node.and(&other.node),
            width: self.width,
            region: self.region.meet(&other.region),
        }
    }

    fn widen(&self, other: &Self) -> Self {
        // A set domain has no useful notion of "extend toward an endpoint";
        // once precision is lost past the enumeration cap widen saturates
        // straight to top, which still guarantees termination in one step.
        if other.less_or_equal(self) {
            self.clone()
        } else {
            Self::top(self.width)
        }
    }

    fn less_or_equal(&self, other: &Self) -> bool {
        debug_assert_eq!(self.width, other.width);
        self.node.and(&other.node.not()).is_false()
    }

    fn is_top(&self) -> bool {
        self.node.is_true()
    }

    fn is_bot(&self) -> bool {
        self.node.is_false()
    }

    fn has_unique_concretization(&self) -> bool {
        matches!(self.enumerate(), Some(vs) if vs.len() == 1)
    }

    fn unique_concretization(&self) -> Option<BitNumber> {
        match self.enumerate() {
            Some(vs) if vs.len() == 1 => Some(vs[0].clone()),
            _ => None,
        }
    }

    fn has_element(&self, value: &BitNumber) -> bool {
        value.bit_size() == self.width && self.node.contains(value)
    }

    fn iter_values(&self) -> Box<dyn Iterator<Item = BitNumber> + '_> {
        match self.enumerate() {
            Some(vs) => Box::new(vs.into_iter()),
            None => Box::new(std::iter::empty()),
        }
    }

    fn number(value: &BitNumber) -> Self {
        BddSet::singleton_region(value, MemoryRegion::Top)
    }

    fn add(&self, other: &Self) -> Self {
        self.combine(other, self.width, BitNumber::add)
    }

    fn sub(&self, other: &Self) -> Self {
        self.combine(other, self.width, BitNumber::sub)
    }

    fn negate(&self) -> Self {
        self.negate_set()
    }

    fn mul_double(&self, other: &Self) -> Self {
        let new_width = (2 * self.width).min(64);
        self.combine(other, new_width, |a, b| {
            let product = (a.zext_u64() as u128) * (b.zext_u64() as u128);
            BitNumber::new(product as u64, new_width)
        })
    }

    fn signed_div(&self, other: &Self) -> Self {
        let width = self.width;
        match other.enumerate() {
            Some(vs) if vs.iter().any(|v| v.zext_u64() == 0) && vs.len() == 1 => Self::bot(width),
            _ => self.combine(other, width, |a, b| {
                if b.zext_u64() == 0 {
                    a.clone()
                } else {
                    a.squot(b).unwrap_or_else(|_| a.clone())
                }
            }),
        }
    }

    fn unsigned_div(&self, other: &Self) -> Self {
        let width = self.width;
        match other.enumerate() {
            Some(vs) if vs.iter().all(|v| v.zext_u64() == 0) => Self::bot(width),
            _ => self.combine(other, width, |a, b| {
                if b.zext_u64() == 0 {
                    a.clone()
                } else {
                    a.uquot(b).unwrap_or_else(|_| a.clone())
                }
            }),
        }
    }

    fn signed_rem(&self, other: &Self) -> Self {
        let width = self.width;
        self.combine(other, width, |a, b| {
            if b.zext_u64() == 0 {
                a.clone()
            } else {
                a.srem(b).unwrap_or_else(|_| a.clone())
            }
        })
    }

    fn unsigned_rem(&self, other: &Self) -> Self {
        let width = self.width;
        self.combine(other, width, |a, b| {
            if b.zext_u64() == 0 {
                a.clone()
            } else {
                a.urem(b).unwrap_or_else(|_| a.clone())
            }
        })
    }

    fn and(&self, other: &Self) -> Self {
        let width = self.width;
        self.combine(other, width, BitNumber::and)
    }

    fn or(&self, other: &Self) -> Self {
        let width = self.width;
        self.combine(other, width, BitNumber::or)
    }

    fn xor(&self, other: &Self) -> Self {
        let width = self.width;
        self.combine(other, width, BitNumber::xor)
    }

    fn not(&self) -> Self {
        match self.enumerate() {
            Some(vs) => BddSet::from_values(vs.iter().map(BitNumber::not), self.width, self.region),
            None => Self::top_with_region(self.width, self.region),
        }
    }

    fn shl(&self, amount: &Self) -> Self {
        let width = self.width;
        self.combine(amount, width, |a, k| a.shl(k.zext_u64().min(u32::MAX as u64) as u32))
    }

    fn shr(&self, amount: &Self) -> Self {
        let width = self.width;
        self.combine(amount, width, |a, k| a.shr(k.zext_u64().min(u32::MAX as u64) as u32))
    }

    fn sar(&self, amount: &Self) -> Self {
        let width = self.width;
        self.combine(amount, width, |a, k| a.sar(k.zext_u64().min(u32::MAX as u64) as u32))
    }

    fn truncate(&self, new_width: u32) -> Self {
        debug_assert!(new_width <= self.width);
        BddSet {
            node: self.node.project(|v| v < new_width),
            width: new_width,
            region: self.region,
        }
    }

    fn zero_extend(&self, new_width: u32) -> Self {
        debug_assert!(new_width >= self.width);
        let forced_zero = BddNode::all_zero(self.width..new_width);
        BddSet {
            node: self.node.and(&forced_zero),
            width: new_width,
            region: self.region,
        }
    }

    fn sign_extend(&self, new_width: u32) -> Self {
        debug_assert!(new_width >= self.width);
        match self.enumerate() {
            Some(vs) => {
                let values = vs.iter().map(|v| v.sext(new_width));
                BddSet::from_values(values, new_width, self.region)
            }
            None => Self::top_with_region(new_width, self.region),
        }
    }

    fn eq_to(&self, other: &Self) -> Self {
        let overlap = self.node.and(&other.node);
        if overlap.is_false() {
            BddSet::from_values([BitNumber::fals()], 1, MemoryRegion::Top)
        } else if self.has_unique_concretization()
            && other.has_unique_concretization()
            && self.unique_concretization() == other.unique_concretization()
        {
            BddSet::from_values([BitNumber::tru()], 1, MemoryRegion::Top)
        } else {
            Self::top(1)
        }
    }

    fn unsigned_less_than(&self, other: &Self) -> Self {
        order_compare(self, other, false, BddSet::unsigned_minmax)
    }

    fn unsigned_less_than_or_equal(&self, other: &Self) -> Self {
        order_compare(self, other, true, BddSet::unsigned_minmax)
    }

    fn signed_less_than(&self, other: &Self) -> Self {
        order_compare_signed(self, other, false)
    }

    fn signed_less_than_or_equal(&self, other: &Self) -> Self {
        order_compare_signed(self, other, true)
    }

    fn assume_uleq(&self, other: &Self) -> (Self, Self) {
        match (self.unsigned_minmax(), other.unsigned_minmax()) {
            (Some((a_lo, a_hi)), Some((b_lo, b_hi))) => {
                let self_bound = b_hi;
                let other_bound = a_lo;
                let narrowed_self = restrict_unsigned(self, a_lo, self_bound.min(a_hi));
                let narrowed_other = restrict_unsigned(other, other_bound.max(b_lo), b_hi);
                (narrowed_self, narrowed_other)
            }
            _ => (self.clone(), other.clone()),
        }
    }

    fn assume_sleq(&self, other: &Self) -> (Self, Self) {
        match (self.signed_minmax(), other.signed_minmax()) {
            (Some((a_lo, a_hi)), Some((b_lo, b_hi))) => {
                let narrowed_self = restrict_signed(self, a_lo, b_hi.min(a_hi));
                let narrowed_other = restrict_signed(other, a_lo.max(b_lo), b_hi);
                (narrowed_self, narrowed_other)
            }
            _ => (self.clone(), other.clone()),
        }
    }
}

fn restrict_unsigned(set: &BddSet, lo: u64, hi: u64) -> BddSet {
    match set.enumerate() {
        Some(vs) => {
            let values = vs.into_iter().filter(|v| v.zext_u64() >= lo && v.zext_u64() <= hi);
            BddSet::from_values(values, set.width, set.region)
        }
        None => set.clone(),
    }
}

fn restrict_signed(set: &BddSet, lo: i64, hi: i64) -> BddSet {
    match set.enumerate() {
        Some(vs) => {
            let values = vs.into_iter().filter(|v| v.sext_i64() >= lo && v.sext_i64() <= hi);
            BddSet::from_values(values, set.width, set.region)
        }
        None => set.clone(),
    }
}

fn order_compare(
    a: &BddSet,
    b: &BddSet,
    or_equal: bool,
    bounds: fn(&BddSet) -> Option<(u64, u64)>,
) -> BddSet {
    match (bounds(a), bounds(b)) {
        (Some((a_lo, a_hi)), Some((b_lo, b_hi))) => {
            let definitely = if or_equal { a_hi <= b_lo } else { a_hi < b_lo };
            let definitely_not = if or_equal { a_lo > b_hi } else { a_lo >= b_hi };
            if definitely {
                BddSet::from_values([BitNumber::tru()], 1, MemoryRegion::Top)
            } else if definitely_not {
                BddSet::from_values([BitNumber::fals()], 1, MemoryRegion::Top)
            } else {
                BddSet::top(1)
            }
        }
        _ => BddSet::top(1),
    }
}

fn order_compare_signed(a: &BddSet, b: &BddSet, or_equal: bool) -> BddSet {
    match (a.signed_minmax(), b.signed_minmax()) {
        (Some((a_lo, a_hi)), Some((b_lo, b_hi))) => {
            let definitely = if or_equal { a_hi <= b_lo } else { a_hi < b_lo };
            let definitely_not = if or_equal { a_lo > b_hi } else { a_lo >= b_hi };
            if definitely {
                BddSet::from_values([BitNumber::tru()], 1, MemoryRegion::Top)
            } else if definitely_not {
                BddSet::from_values([BitNumber::fals()], 1, MemoryRegion::Top)
            } else {
                BddSet::top(1)
            }
        }
        _ => BddSet::top(1),
    }
}
