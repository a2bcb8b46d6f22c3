//! Sign-agnostic wrapped-interval domain: a single contiguous arc on the
//! `2^w`-point number circle, plus the degenerate `Bot`/`Top` cases.
//!
//! An arc `Range { lo, hi, width }` denotes `{lo, lo+1, ..., hi}` modulo
//! `2^width`: if `lo <= hi` numerically that's the ordinary contiguous
//! range, and if `lo > hi` the arc wraps through zero. `range()` is the one
//! constructor every operation funnels through, so the `[0, 2^w-1] ≡ Top`
//! canonicalization rule never has to be re-derived at each call site.

use crate::bitvector::{mask_for, sign_bit, BitNumber};
use crate::domain::AbstractDomain;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WrappedInterval {
    Bot { width: u32 },
    Top { width: u32 },
    Range { lo: u64, hi: u64, width: u32 },
}

use WrappedInterval::{Bot, Range, Top};

/// The number of values an arc covers, as an unsigned count in `1..=2^width`.
fn range_size(lo: u64, hi: u64, width: u32) -> u128 {
    let mask = mask_for(width);
    let diff = hi.wrapping_sub(lo) & mask;
    diff as u128 + 1
}

/// The canonicalizing constructor: collapses an arc covering the whole
/// circle to `Top`.
fn range(lo: u64, hi: u64, width: u32) -> WrappedInterval {
    let mask = mask_for(width);
    let lo = lo & mask;
    let hi = hi & mask;
    if range_size(lo, hi, width) as u128 >= (1u128 << width.min(127)) {
        Top { width }
    } else {
        Range { lo, hi, width }
    }
}

/// Whether the arc `[inner_lo, inner_hi]` lies entirely within the arc
/// `[outer_lo, outer_hi]`, walking the circle from `outer_lo`.
fn is_subset(outer_lo: u64, outer_hi: u64, inner_lo: u64, inner_hi: u64, width: u32) -> bool {
    let mask = mask_for(width);
    let off_outer_hi = outer_hi.wrapping_sub(outer_lo) & mask;
    let off_inner_lo = inner_lo.wrapping_sub(outer_lo) & mask;
    let off_inner_hi = inner_hi.wrapping_sub(outer_lo) & mask;
    off_inner_lo <= off_outer_hi && off_inner_hi <= off_outer_hi && off_inner_lo <= off_inner_hi
}

/// Exact overlap test between two arcs (no intersection value computed).
fn arcs_overlap(a: u64, b: u64, c: u64, d: u64, width: u32) -> bool {
    let mask = mask_for(width);
    let off_b = b.wrapping_sub(a) & mask;
    let off_c = c.wrapping_sub(a) & mask;
    let off_d = d.wrapping_sub(a) & mask;
    if off_c <= off_d {
        off_c <= off_b
    } else {
        true
    }
}

/// Whether `v` lies on the arc `[lo, hi]`, walking the circle from `lo`.
fn in_arc(v: u64, lo: u64, hi: u64, width: u32) -> bool {
    let mask = mask_for(width);
    let off_v = v.wrapping_sub(lo) & mask;
    let off_hi = hi.wrapping_sub(lo) & mask;
    off_v <= off_hi
}

fn intersect_numeric(lo1: u64, hi1: u64, lo2: u64, hi2: u64) -> Option<(u64, u64)> {
    let lo = lo1.max(lo2);
    let hi = hi1.min(hi2);
    if lo <= hi {
        Some((lo, hi))
    } else {
        None
    }
}

fn fill_ones(x: u64) -> u64 {
    if x == 0 {
        0
    } else {
        let bits = 64 - x.leading_zeros();
        if bits >= 64 {
            u64::MAX
        } else {
            (1u64 << bits) - 1
        }
    }
}

impl WrappedInterval {
    /// Builds the (possibly wrapping) arc `[lo, hi]_width`, canonicalizing to
    /// `Top` when the arc covers the whole circle. The public face of the
    /// `interval(a,b,width)` domain-factory operation named in `spec.md` §6.
    pub fn from_range(lo: u64, hi: u64, width: u32) -> WrappedInterval {
        range(lo, hi, width)
    }

    /// Resolves to plain numeric `(lo, hi)` with `lo <= hi`, falling back to
    /// the full `[0, mask]` span for `Top` and for arcs that wrap through
    /// zero (always a sound, if sometimes imprecise, choice).
    fn unsigned_bounds(&self) -> (u64, u64) {
        match self {
            Bot { width } => (0, mask_for(*width)),
            Top { width } => (0, mask_for(*width)),
            Range { lo, hi, width } => {
                if lo <= hi {
                    (*lo, *hi)
                } else {
                    (0, mask_for(*width))
                }
            }
        }
    }

    fn signed_bounds(&self) -> (i64, i64) {
        let width = self.width();
        let (lo, hi) = self.unsigned_bounds();
        let s_lo = BitNumber::new(lo, width).sext_i64();
        let s_hi = BitNumber::new(hi, width).sext_i64();
        if s_lo <= s_hi {
            (s_lo, s_hi)
        } else {
            let smin = BitNumber::s_min_val(width).sext_i64();
            let smax = -(smin + 1);
            (smin, smax)
        }
    }

    fn overlaps(&self, other: &Self) -> bool {
        match (self, other) {
            (Bot { .. }, _) | (_, Bot { .. }) => false,
            (Top { .. }, x) | (x, Top { .. }) => !x.is_bot(),
            (Range { lo: a, hi: b, width }, Range { lo: c, hi: d, .. }) => {
                arcs_overlap(*a, *b, *c, *d, *width)
            }
        }
    }

    /// Complement within the full `2^width` circle. Always a single arc.
    fn complement(&self) -> Self {
        match self {
            Bot { width } => Top { width: *width },
            Top { width } => Bot { width: *width },
            Range { lo, hi, width } => range(hi.wrapping_add(1), lo.wrapping_sub(1), *width),
        }
    }

    fn shl_by_const(&self, k: u32) -> Self {
        let width = self.width();
        if k == 0 {
            return self.clone();
        }
        if k >= width {
            return range(0, 0, width);
        }
        match self {
            Bot { .. } => Bot { width },
            Top { .. } => Top { width },
            Range { lo, hi, .. } => {
                if lo <= hi {
                    let span = (hi - lo) as u128;
                    if span << k >= 1u128 << width {
                        Top { width }
                    } else {
                        range(lo << k, hi << k, width)
                    }
                } else {
                    Top { width }
                }
            }
        }
    }

    fn shr_by_const(&self, k: u32) -> Self {
        let width = self.width();
        if k >= width {
            return range(0, 0, width);
        }
        match self {
            Bot { .. } => Bot { width },
            Top { .. } => Top { width },
            Range { lo, hi, .. } => {
                if lo <= hi {
                    range(lo >> k, hi >> k, width)
                } else {
                    Top { width }
                }
            }
        }
    }

    fn sar_by_const(&self, k: u32) -> Self {
        let width = self.width();
        match self {
            Bot { .. } => Bot { width },
            Top { .. } => Top { width },
            Range { .. } => {
                let (s_lo, s_hi) = self.signed_bounds();
                let shifted_lo = if k >= 64 {
                    if s_lo < 0 { -1 } else { 0 }
                } else {
                    s_lo >> k
                };
                let shifted_hi = if k >= 64 {
                    if s_hi < 0 { -1 } else { 0 }
                } else {
                    s_hi >> k
                };
                range(shifted_lo as u64, shifted_hi as u64, width)
            }
        }
    }

    /// Clamps `amount`'s possible values into `0..=width`, the only shift
    /// amounts that change behavior.
    fn shift_amount_bounds(&self, width: u32) -> (u32, u32) {
        let (lo, hi) = self.unsigned_bounds();
        let lo = lo.min(width as u64) as u32;
        let hi = hi.min(width as u64) as u32;
        if lo <= hi {
            (lo, hi)
        } else {
            (0, width)
        }
    }
}

impl AbstractDomain for WrappedInterval {
    fn width(&self) -> u32 {
        match self {
            Bot { width } | Top { width } | Range { width, .. } => *width,
        }
    }

    fn bot(width: u32) -> Self {
        Bot { width }
    }

    fn top(width: u32) -> Self {
        Top { width }
    }

    fn join(&self, other: &Self) -> Self {
        debug_assert_eq!(self.width(), other.width());
        match (self, other) {
            (Bot { .. }, x) | (x, Bot { .. }) => x.clone(),
            (Top { width }, _) | (_, Top { width }) => Top { width: *width },
            (Range { lo: a, hi: b, width }, Range { lo: c, hi: d, .. }) => {
                let width = *width;
                if is_subset(*a, *b, *c, *d, width) {
                    return Range { lo: *a, hi: *b, width };
                }
                if is_subset(*c, *d, *a, *b, width) {
                    return Range { lo: *c, hi: *d, width };
                }
                // Neither arc contains the other. If they also mutually
                // overlap (each arc's start lies inside the other), the two
                // candidate unions below both wrap back over the other
                // arc's start and neither is a sound single-arc cover;
                // the only sound single arc left is the whole circle.
                if in_arc(*a, *c, *d, width) && in_arc(*c, *a, *b, width) {
                    return Top { width };
                }
                let cand1 = (*a, *d);
                let cand2 = (*c, *b);
                let size1 = range_size(cand1.0, cand1.1, width);
                let size2 = range_size(cand2.0, cand2.1, width);
                let chosen = if size1 < size2 {
                    cand1
                } else if size2 < size1 {
                    cand2
                } else if cand1 <= cand2 {
                    cand1
                } else {
                    cand2
                };
                range(chosen.0, chosen.1, width)
            }
        }
    }

    fn meet(&self, other: &Self) -> Self {
        debug_assert_eq!(self.width(), other.width());
        self.complement().join(&other.complement()).complement()
    }

    fn widen(&self, new: &Self) -> Self {
        debug_assert_eq!(self.width(), new.width());
        if new.less_or_equal(self) {
            return self.clone();
        }
        match (self, new) {
            (Top { width }, _) | (_, Top { width }) => Top { width: *width },
            (Bot { .. }, x) => x.clone(),
            (old @ Range { .. }, _) => {
                let joined = old.join(new);
                match joined {
                    Top { width } => Top { width },
                    Range { lo: jlo, hi: jhi, width } => {
                        if let Range { lo: olo, hi: ohi, .. } = old {
                            let lo = if jlo != *olo { 0 } else { jlo };
                            let hi = if jhi != *ohi { mask_for(width) } else { jhi };
                            range(lo, hi, width)
                        } else {
                            unreachable!()
                        }
                    }
                    Bot { width } => Bot { width },
                }
            }
        }
    }

    fn less_or_equal(&self, other: &Self) -> bool {
        debug_assert_eq!(self.width(), other.width());
        match (self, other) {
            (Bot { .. }, _) => true,
            (_, Top { .. }) => true,
            (Top { .. }, _) => false,
            (_, Bot { .. }) => false,
            (Range { lo: a, hi: b, width }, Range { lo: c, hi: d, .. }) => {
                is_subset(*c, *d, *a, *b, *width)
            }
        }
    }

    fn is_top(&self) -> bool {
        matches!(self, Top { .. })
    }

    fn is_bot(&self) -> bool {
        matches!(self, Bot { .. })
    }

    fn has_unique_concretization(&self) -> bool {
        matches!(self, Range { lo, hi, .. } if lo == hi)
    }

    fn unique_concretization(&self) -> Option<BitNumber> {
        match self {
            Range { lo, hi, width } if lo == hi => Some(BitNumber::new(*lo, *width)),
            _ => None,
        }
    }

    fn has_element(&self, value: &BitNumber) -> bool {
        match self {
            Bot { .. } => false,
            Top { width } => *width == value.bit_size(),
            Range { lo, hi, width } => {
                *width == value.bit_size()
                    && {
                        let mask = mask_for(*width);
                        let off_v = value.zext_u64().wrapping_sub(*lo) & mask;
                        let off_hi = hi.wrapping_sub(*lo) & mask;
                        off_v <= off_hi
                    }
            }
        }
    }

    fn iter_values(&self) -> Box<dyn Iterator<Item = BitNumber> + '_> {
        match self {
            Bot { .. } => Box::new(std::iter::empty()),
            Top { width } => {
                let width = *width;
                let mask = mask_for(width);
                Box::new((0..=mask).map(move |v| BitNumber::new(v, width)))
            }
            Range { lo, hi, width } => {
                let (lo, hi, width) = (*lo, *hi, *width);
                let count = range_size(lo, hi, width);
                Box::new((0..count).map(move |i| BitNumber::new(lo.wrapping_add(i as u64), width)))
            }
        }
    }

    fn number(value: &BitNumber) -> Self {
        range(value.zext_u64(), value.zext_u64(), value.bit_size())
    }

    fn add(&self, other: &Self) -> Self {
        debug_assert_eq!(self.width(), other.width());
        let width = self.width();
        match (self, other) {
            (Bot { .. }, _) | (_, Bot { .. }) => Bot { width },
            (Top { .. }, _) | (_, Top { .. }) => Top { width },
            (Range { lo: a, hi: b, .. }, Range { lo: c, hi: d, .. }) => {
                let mask = mask_for(width);
                let size_a = b.wrapping_sub(*a) & mask;
                let size_c = d.wrapping_sub(*c) & mask;
                if size_a as u128 + size_c as u128 >= (1u128 << width) - 1 {
                    Top { width }
                } else {
                    range(a.wrapping_add(*c), b.wrapping_add(*d), width)
                }
            }
        }
    }

    fn sub(&self, other: &Self) -> Self {
        self.add(&other.negate())
    }

    fn negate(&self) -> Self {
        let width = self.width();
        match self {
            Bot { .. } => Bot { width },
            Top { .. } => Top { width },
            Range { lo, hi, .. } => range(0u64.wrapping_sub(*hi), 0u64.wrapping_sub(*lo), width),
        }
    }

    fn mul_double(&self, other: &Self) -> Self {
        debug_assert_eq!(self.width(), other.width());
        let width = self.width();
        let new_width = (2 * width).min(64);
        if width > 32 {
            return Top { width: new_width };
        }
        match (self, other) {
            (Bot { .. }, _) | (_, Bot { .. }) => Bot { width: new_width },
            (Top { .. }, _) | (_, Top { .. }) => Top { width: new_width },
            (Range { lo: a, hi: b, .. }, Range { lo: c, hi: d, .. }) => {
                if a > b || c > d {
                    return Top { width: new_width };
                }
                let (a, b, c, d) = (*a as u128, *b as u128, *c as u128, *d as u128);
                let corners = [a * c, a * d, b * c, b * d];
                let lo = *corners.iter().min().unwrap();
                let hi = *corners.iter().max().unwrap();
                range(lo as u64, hi as u64, new_width)
            }
        }
    }

    fn signed_div(&self, other: &Self) -> Self {
        let width = self.width();
        if self.is_bot() || other.is_bot() {
            return Bot { width };
        }
        let (c, d) = other.signed_bounds();
        if c == 0 && d == 0 {
            return Bot { width };
        }
        if matches!(self, Range { lo, hi, .. } if lo > hi) || matches!(other, Range{lo,hi,..} if lo>hi)
        {
            return Top { width };
        }
        let (a, b) = self.signed_bounds();
        let smin = BitNumber::s_min_val(width).sext_i64();
        let divisors: Vec<i64> = [c, d].into_iter().filter(|v| *v != 0).collect();
        let mut lo = i64::MAX;
        let mut hi = i64::MIN;
        for dv in &divisors {
            for nv in [a, b] {
                if nv == smin && *dv == -1 {
                    continue;
                }
                let q = nv.wrapping_div(*dv);
                lo = lo.min(q);
                hi = hi.max(q);
            }
        }
        range(lo as u64 & mask_for(width), hi as u64 & mask_for(width), width)
    }

    fn unsigned_div(&self, other: &Self) -> Self {
        let width = self.width();
        if self.is_bot() || other.is_bot() {
            return Bot { width };
        }
        let (c, d) = other.unsigned_bounds();
        if c == 0 && d == 0 {
            return Bot { width };
        }
        if matches!(self, Range { lo, hi, .. } if lo > hi) || matches!(other, Range{lo,hi,..} if lo>hi)
        {
            return Top { width };
        }
        let (a, b) = self.unsigned_bounds();
        let lo_divisor = if c == 0 { 1 } else { c };
        let corners = [a / lo_divisor, a / d, b / lo_divisor, b / d];
        let lo = *corners.iter().min().unwrap();
        let hi = *corners.iter().max().unwrap();
        range(lo, hi, width)
    }

    /// Sound but intentionally loose: any `x rem y` (`y != 0`) lies in
    /// `[0, max(|y|)-1]`, so that bound alone (no corner products) is
    /// enough for a safe result.
    fn unsigned_rem(&self, other: &Self) -> Self {
        let width = self.width();
        if self.is_bot() || other.is_bot() {
            return Bot { width };
        }
        let (_, d) = other.unsigned_bounds();
        if d == 0 {
            return Bot { width };
        }
        range(0, d - 1, width)
    }

    fn signed_rem(&self, other: &Self) -> Self {
        let width = self.width();
        if self.is_bot() || other.is_bot() {
            return Bot { width };
        }
        let (c, d) = other.signed_bounds();
        let max_abs = c.unsigned_abs().max(d.unsigned_abs());
        if max_abs == 0 {
            return Bot { width };
        }
        let bound = (max_abs - 1) as i64;
        range((-bound) as u64 & mask_for(width), bound as u64 & mask_for(width), width)
    }

    fn and(&self, other: &Self) -> Self {
        let width = self.width();
        match (self, other) {
            (Bot { .. }, _) | (_, Bot { .. }) => Bot { width },
            (Top { .. }, _) | (_, Top { .. }) => Top { width },
            (Range { lo: a, hi: b, .. }, Range { lo: c, hi: d, .. }) => {
                if a > b || c > d {
                    return Top { width };
                }
                range(0, (*b).min(*d), width)
            }
        }
    }

    fn or(&self, other: &Self) -> Self {
        let width = self.width();
        match (self, other) {
            (Bot { .. }, _) | (_, Bot { .. }) => Bot { width },
            (Top { .. }, _) | (_, Top { .. }) => Top { width },
            (Range { lo: a, hi: b, .. }, Range { lo: c, hi: d, .. }) => {
                if a > b || c > d {
                    return Top { width };
                }
                let hi = fill_ones((*b).max(*d)) & mask_for(width);
                range((*a).max(*c), hi, width)
            }
        }
    }

    fn xor(&self, other: &Self) -> Self {
        let width = self.width();
        match (self, other) {
            (Bot { .. }, _) | (_, Bot { .. }) => Bot { width },
            (Top { .. }, _) | (_, Top { .. }) => Top { width },
            (Range { lo: a, hi: b, .. }, Range { lo: c, hi: d, .. }) => {
                if a > b || c > d {
                    return Top { width };
                }
                let hi = fill_ones((*b).max(*d)) & mask_for(width);
                range(0, hi, width)
            }
        }
    }

    fn not(&self) -> Self {
        let width = self.width();
        match self {
            Bot { .. } => Bot { width },
            Top { .. } => Top { width },
            Range { lo, hi, .. } => {
                let mask = mask_for(width);
                range(mask - hi, mask - lo, width)
            }
        }
    }

    fn shl(&self, amount: &Self) -> Self {
        let width = self.width();
        if self.is_bot() || amount.is_bot() {
            return Bot { width };
        }
        let (amin, amax) = amount.shift_amount_bounds(width);
        (amin..=amax).fold(Bot { width }, |acc, k| acc.join(&self.shl_by_const(k)))
    }

    fn shr(&self, amount: &Self) -> Self {
        let width = self.width();
        if self.is_bot() || amount.is_bot() {
            return Bot { width };
        }
        let (amin, amax) = amount.shift_amount_bounds(width);
        (amin..=amax).fold(Bot { width }, |acc, k| acc.join(&self.shr_by_const(k)))
    }

    fn sar(&self, amount: &Self) -> Self {
        let width = self.width();
        if self.is_bot() || amount.is_bot() {
            return Bot { width };
        }
        let (amin, amax) = amount.shift_amount_bounds(width);
        (amin..=amax).fold(Bot { width }, |acc, k| acc.join(&self.sar_by_const(k)))
    }

    fn truncate(&self, new_width: u32) -> Self {
        debug_assert!(new_width <= self.width());
        match self {
            Bot { .. } => Bot { width: new_width },
            Top { .. } => Top { width: new_width },
            Range { lo, hi, width } => {
                let full_size = range_size(*lo, *hi, *width);
                let new_space = 1u128 << new_width;
                if full_size >= new_space {
                    Top { width: new_width }
                } else {
                    let mask_new = mask_for(new_width);
                    range(lo & mask_new, hi & mask_new, new_width)
                }
            }
        }
    }

    fn zero_extend(&self, new_width: u32) -> Self {
        debug_assert!(new_width >= self.width());
        match self {
            Bot { .. } => Bot { width: new_width },
            Top { width } => range(0, mask_for(*width), new_width),
            Range { lo, hi, width } => {
                if lo <= hi {
                    range(*lo, *hi, new_width)
                } else {
                    range(0, mask_for(*width), new_width)
                }
            }
        }
    }

    fn sign_extend(&self, new_width: u32) -> Self {
        debug_assert!(new_width >= self.width());
        match self {
            Bot { .. } => Bot { width: new_width },
            Top { width } => {
                let sb = sign_bit(*width);
                let mask_new = mask_for(new_width);
                range(mask_new.wrapping_sub(sb).wrapping_add(1), sb - 1, new_width)
            }
            Range { lo, hi, width } => {
                let sb = sign_bit(*width);
                if *hi < sb {
                    range(*lo, *hi, new_width)
                } else if *lo >= sb {
                    let fill = mask_for(new_width) ^ mask_for(*width);
                    range(lo | fill, hi | fill, new_width)
                } else {
                    Top { width: new_width }
                }
            }
        }
    }

    fn eq_to(&self, other: &Self) -> Self {
        if self.is_bot() || other.is_bot() {
            return Bot { width: 1 };
        }
        if !self.overlaps(other) {
            return range(0, 0, 1);
        }
        match (self.unique_concretization(), other.unique_concretization()) {
            (Some(a), Some(b)) if a == b => range(1, 1, 1),
            _ => Top { width: 1 },
        }
    }

    fn unsigned_less_than(&self, other: &Self) -> Self {
        if self.is_bot() || other.is_bot() {
            return Bot { width: 1 };
        }
        let (a_lo, a_hi) = self.unsigned_bounds();
        let (b_lo, b_hi) = other.unsigned_bounds();
        if a_hi < b_lo {
            range(1, 1, 1)
        } else if a_lo >= b_hi {
            range(0, 0, 1)
        } else {
            Top { width: 1 }
        }
    }

    fn unsigned_less_than_or_equal(&self, other: &Self) -> Self {
        if self.is_bot() || other.is_bot() {
            return Bot { width: 1 };
        }
        let (a_lo, a_hi) = self.unsigned_bounds();
        let (b_lo, b_hi) = other.unsigned_bounds();
        if a_hi <= b_lo {
            range(1, 1, 1)
        } else if a_lo > b_hi {
            range(0, 0, 1)
        } else {
            Top { width: 1 }
        }
    }

    fn signed_less_than(&self, other: &Self) -> Self {
        if self.is_bot() || other.is_bot() {
            return Bot { width: 1 };
        }
        let (a_lo, a_hi) = self.signed_bounds();
        let (b_lo, b_hi) = other.signed_bounds();
        if a_hi < b_lo {
            range(1, 1, 1)
        } else if a_lo >= b_hi {
            range(0, 0, 1)
        } else {
            Top { width: 1 }
        }
    }

    fn signed_less_than_or_equal(&self, other: &Self) -> Self {
        if self.is_bot() || other.is_bot() {
            return Bot { width: 1 };
        }
        let (a_lo, a_hi) = self.signed_bounds();
        let (b_lo, b_hi) = other.signed_bounds();
        if a_hi <= b_lo {
            range(1, 1, 1)
        } else if a_lo > b_hi {
            range(0, 0, 1)
        } else {
            Top { width: 1 }
        }
    }

    fn assume_uleq(&self, other: &Self) -> (Self, Self) {
        let width = self.width();
        if self.is_bot() || other.is_bot() {
            return (Bot { width }, Bot { width });
        }
        let (a, b) = self.unsigned_bounds();
        let (c, d) = other.unsigned_bounds();
        let mask = mask_for(width);
        let narrowed_self = intersect_numeric(a, b, 0, d)
            .map(|(lo, hi)| range(lo, hi, width))
            .unwrap_or(Bot { width });
        let narrowed_other = intersect_numeric(c, d, a, mask)
            .map(|(lo, hi)| range(lo, hi, width))
            .unwrap_or(Bot { width });
        (narrowed_self, narrowed_other)
    }

    fn assume_sleq(&self, other: &Self) -> (Self, Self) {
        let width = self.width();
        if self.is_bot() || other.is_bot() {
            return (Bot { width }, Bot { width });
        }
        let (a, b) = self.signed_bounds();
        let (c, d) = other.signed_bounds();
        let smin = BitNumber::s_min_val(width).sext_i64();
        let smax = -(smin + 1);
        let to_u = |v: i64| v as u64 & mask_for(width);
        let narrowed_self = intersect_numeric_signed(a, b, smin, d)
            .map(|(lo, hi)| range(to_u(lo), to_u(hi), width))
            .unwrap_or(Bot { width });
        let narrowed_other = intersect_numeric_signed(c, d, a, smax)
            .map(|(lo, hi)| range(to_u(lo), to_u(hi), width))
            .unwrap_or(Bot { width });
        (narrowed_self, narrowed_other)
    }
}

fn intersect_numeric_signed(lo1: i64, hi1: i64, lo2: i64, hi2: i64) -> Option<(i64, i64)> {
    let lo = lo1.max(lo2);
    let hi = hi1.min(hi2);
    if lo <= hi {
        Some((lo, hi))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn iv(lo: u64, hi: u64, w: u32) -> WrappedInterval {
        range(lo, hi, w)
    }

    #[test]
    fn scenario_arithmetic_chain_at_32_bits() {
        let two = WrappedInterval::number(&BitNumber::new(2, 32));
        let three = WrappedInterval::number(&BitNumber::new(3, 32));
        let four = WrappedInterval::number(&BitNumber::new(4, 32));
        let five = WrappedInterval::number(&BitNumber::new(5, 32));
        let sum = two.add(&three);
        let doubled = sum.mul_double(&four);
        let truncated = doubled.truncate(32);
        let result = truncated.sub(&five);
        assert_eq!(result, WrappedInterval::number(&BitNumber::new(15, 32)));
    }

    #[test]
    fn scenario_wrapped_interval_addition() {
        let lhs = iv(0xfe, 2, 8); // [-2, 2] mod 256 = wrapped [254,2]
        let rhs = iv(16, 64, 8);
        let result = lhs.add(&rhs);
        assert_eq!(result, iv(14, 66, 8));
    }

    #[test]
    fn scenario_wrapped_and_forces_top() {
        let lhs = iv(0xf0, 0x10, 8); // wrapped
        let rhs = iv(0, 0xff, 8); // top
        assert_eq!(lhs.and(&rhs), WrappedInterval::Top { width: 8 });
    }

    #[test]
    fn scenario_shl_single_bit_enumerates_every_pattern() {
        let one = WrappedInterval::number(&BitNumber::new(1, 32));
        let amount = iv(0, 31, 32);
        let result = one.shl(&amount);
        assert_eq!(result, iv(1, 0x8000_0000, 32));
    }

    #[test]
    fn scenario_eq_is_top_when_ranges_overlap() {
        let five = WrappedInterval::number(&BitNumber::new(5, 32));
        let zero_to_ten = iv(0, 10, 32);
        assert_eq!(five.eq_to(&zero_to_ten), WrappedInterval::Top { width: 1 });
    }

    #[test]
    fn scenario_signed_less_than_minus_one_lt_one() {
        let minus_one = WrappedInterval::number(&BitNumber::new(0xffff_ffff, 32));
        let one = WrappedInterval::number(&BitNumber::new(1, 32));
        assert_eq!(minus_one.signed_less_than(&one), iv(1, 1, 1));
    }

    #[test]
    fn join_is_idempotent_and_commutative() {
        let a = iv(5, 20, 16);
        let b = iv(100, 200, 16);
        assert_eq!(a.join(&a), a);
        assert_eq!(a.join(&b), b.join(&a));
    }

    #[test]
    fn join_of_mutually_overlapping_arcs_is_top() {
        let a = iv(11, 255, 8);
        let b = iv(31, 19, 8);
        let joined = a.join(&b);
        assert_eq!(joined, WrappedInterval::Top { width: 8 });
        assert!(a.less_or_equal(&joined));
        assert!(b.less_or_equal(&joined));
    }

    #[test]
    fn meet_of_disjoint_ranges_is_bot() {
        let a = iv(0, 10, 8);
        let b = iv(20, 30, 8);
        assert_eq!(a.meet(&b), WrappedInterval::Bot { width: 8 });
    }

    #[test]
    fn not_is_exact_bijection() {
        let a = iv(10, 20, 8);
        assert_eq!(a.not().not(), a);
    }

    #[test]
    fn widen_extends_toward_zero_and_mask() {
        let old = iv(10, 20, 8);
        let new = iv(10, 25, 8);
        let widened = old.widen(&new);
        if let WrappedInterval::Range { lo, hi, .. } = widened {
            assert_eq!(lo, 10);
            assert_eq!(hi, 0xff);
        } else {
            panic!("expected a Range");
        }
    }

    #[test]
    fn truncate_then_zero_extend_round_trips_in_range() {
        let original = iv(3, 3, 32);
        let truncated = original.truncate(8);
        assert_eq!(truncated, WrappedInterval::number(&BitNumber::new(3, 8)));
    }

    #[quickcheck]
    fn lattice_law_join_is_upper_bound(lo: u8, hi: u8) -> bool {
        let a = iv(lo as u64, lo as u64, 8);
        let b = iv(hi as u64, hi as u64, 8);
        let j = a.join(&b);
        a.less_or_equal(&j) && b.less_or_equal(&j)
    }

    #[quickcheck]
    fn lattice_law_bot_and_top_bound_every_value(v: u8) -> bool {
        let x = iv(v as u64, v as u64, 8);
        WrappedInterval::bot(8).less_or_equal(&x) && x.less_or_equal(&WrappedInterval::top(8))
    }

    #[quickcheck]
    fn lattice_law_meet_is_lower_bound(a_lo: u8, a_hi: u8, b_lo: u8, b_hi: u8) -> bool {
        let a = iv(a_lo as u64, a_hi as u64, 8);
        let b = iv(b_lo as u64, b_hi as u64, 8);
        let m = a.meet(&b);
        m.less_or_equal(&a) && m.less_or_equal(&b)
    }

    #[quickcheck]
    fn singleton_addition_matches_bitnumber_addition(a: u8, b: u8) -> bool {
        let sa = WrappedInterval::number(&BitNumber::new(a as u64, 8));
        let sb = WrappedInterval::number(&BitNumber::new(b as u64, 8));
        sa.add(&sb) == WrappedInterval::number(&BitNumber::new(a as u64, 8).add(&BitNumber::new(b as u64, 8)))
    }
}
