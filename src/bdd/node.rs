//! A minimal reduced-ordered binary decision diagram over bit-index
//! variables `0..width`, hash-consed like [`crate::bitvector::BitNumber`]
//! so that structurally equal subgraphs become pointer-equal while live.
//!
//! Variable `i` is the `i`-th bit of the represented value (bit 0 is
//! least-significant). `low`/`high` are the subgraphs for that bit being
//! `0`/`1`.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, Weak},
};

use once_cell::sync::Lazy;

use crate::bitvector::BitNumber;

#[derive(Debug)]
enum Kind {
    False,
    True,
    Branch { var: u32, low: BddNode, high: BddNode },
}

/// A node in the shared BDD forest. Cheap to clone; compares by pointer
/// identity via the hash-consing cache (two nodes built from the same
/// `(var, low, high)` triple while both live are the same `Arc`).
#[derive(Debug, Clone)]
pub struct BddNode(Arc<Kind>);

impl PartialEq for BddNode {
    fn eq(&self, other: &Self) -> bool {
        self.is_same(other)
    }
}
impl Eq for BddNode {}

type BranchKey = (u32, usize, usize);
static BRANCH_CACHE: Lazy<Mutex<HashMap<BranchKey, Weak<Kind>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn ptr_key(node: &BddNode) -> usize {
    Arc::as_ptr(&node.0) as usize
}

impl BddNode {
    pub fn false_node() -> Self {
        static FALSE: Lazy<BddNode> = Lazy::new(|| BddNode(Arc::new(Kind::False)));
        FALSE.clone()
    }

    pub fn true_node() -> Self {
        static TRUE: Lazy<BddNode> = Lazy::new(|| BddNode(Arc::new(Kind::True)));
        TRUE.clone()
    }

    pub fn is_false(&self) -> bool {
        matches!(*self.0, Kind::False)
    }

    pub fn is_true(&self) -> bool {
        matches!(*self.0, Kind::True)
    }

    fn is_same(&self, other: &BddNode) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// The hash-consing smart constructor: elides `var` entirely when both
    /// branches agree (the BDD reducedness rule), and reuses the canonical
    /// node for any `(var, low, high)` triple seen before while live.
    pub fn branch(var: u32, low: BddNode, high: BddNode) -> Self {
        if low.is_same(&high) {
            return low;
        }
        let key = (var, ptr_key(&low), ptr_key(&high));
        let mut cache = BRANCH_CACHE.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(existing) = cache.get(&key).and_then(Weak::upgrade) {
            return BddNode(existing);
        }
        let fresh = Arc::new(Kind::Branch { var, low, high });
        cache.insert(key, Arc::downgrade(&fresh));
        BddNode(fresh)
    }

    /// The singleton path BDD for exactly `value` over `value.bit_size()`
    /// variables.
    pub fn singleton(value: &BitNumber) -> Self {
        let width = value.bit_size();
        let mut node = BddNode::true_node();
        for var in (0..width).rev() {
            let bit = (value.zext_u64() >> var) & 1;
            node = if bit == 1 {
                BddNode::branch(var, BddNode::false_node(), node)
            } else {
                BddNode::branch(var, node, BddNode::false_node())
            };
        }
        node
    }

    pub fn contains(&self, value: &BitNumber) -> bool {
        let mut node = self.clone();
        loop {
            match &*node.0 {
                Kind::False => return false,
                Kind::True => return true,
                Kind::Branch { var, low, high } => {
                    let bit = (value.zext_u64() >> *var) & 1;
                    node = if bit == 1 { high.clone() } else { low.clone() };
                }
            }
        }
    }

    pub fn not(&self) -> Self {
        fn go(node: &BddNode, memo: &mut HashMap<usize, BddNode>) -> BddNode {
            match &*node.0 {
                Kind::False => BddNode::true_node(),
                Kind::True => BddNode::false_node(),
                Kind::Branch { var, low, high } => {
                    let key = ptr_key(node);
                    if let Some(cached) = memo.get(&key) {
                        return cached.clone();
                    }
                    let result = BddNode::branch(*var, go(low, memo), go(high, memo));
                    memo.insert(key, result.clone());
                    result
                }
            }
        }
        go(self, &mut HashMap::new())
    }

    fn top_var(&self) -> Option<u32> {
        match &*self.0 {
            Kind::Branch { var, .. } => Some(*var),
            _ => None,
        }
    }

    fn cofactor(&self, var: u32, branch_high: bool) -> BddNode {
        match &*self.0 {
            Kind::Branch { var: v, low, high } if *v == var => {
                if branch_high { high.clone() } else { low.clone() }
            }
            _ => self.clone(),
        }
    }

    /// Generic binary apply (the standard ROBDD algorithm): combines `a`
    /// and `b` bit-variable by bit-variable according to the truth table
    /// `op`.
    pub fn apply(a: &BddNode, b: &BddNode, op: fn(bool, bool) -> bool) -> BddNode {
        fn go(
            a: &BddNode,
            b: &BddNode,
            op: fn(bool, bool) -> bool,
            memo: &mut HashMap<(usize, usize), BddNode>,
        ) -> BddNode {
            if let (Kind::False | Kind::True, Kind::False | Kind::True) = (&*a.0, &*b.0) {
                let av = a.is_true();
                let bv = b.is_true();
                return if op(av, bv) { BddNode::true_node() } else { BddNode::false_node() };
            }
            let key = (ptr_key(a), ptr_key(b));
            if let Some(cached) = memo.get(&key) {
                return cached.clone();
            }
            let va = a.top_var();
            let vb = b.top_var();
            let top = match (va, vb) {
                (Some(x), Some(y)) => x.min(y),
                (Some(x), None) => x,
                (None, Some(y)) => y,
                (None, None) => unreachable!("handled by terminal case above"),
            };
            let a_lo = a.cofactor(top, false);
            let a_hi = a.cofactor(top, true);
            let b_lo = b.cofactor(top, false);
            let b_hi = b.cofactor(top, true);
            let low = go(&a_lo, &b_lo, op, memo);
            let high = go(&a_hi, &b_hi, op, memo);
            let result = BddNode::branch(top, low, high);
            memo.insert(key, result.clone());
            result
        }
        go(a, b, op, &mut HashMap::new())
    }

    pub fn and(&self, other: &BddNode) -> BddNode {
        BddNode::apply(self, other, |a, b| a && b)
    }

    pub fn or(&self, other: &BddNode) -> BddNode {
        BddNode::apply(self, other, |a, b| a || b)
    }

    /// Existentially quantifies out every variable for which `keep`
    /// returns `false`, replacing that decision with the union of its two
    /// branches.
    pub fn project(&self, keep: impl Fn(u32) -> bool + Copy) -> BddNode {
        fn go(node: &BddNode, keep: impl Fn(u32) -> bool + Copy, memo: &mut HashMap<usize, BddNode>) -> BddNode {
            match &*node.0 {
                Kind::False => BddNode::false_node(),
                Kind::True => BddNode::true_node(),
                Kind::Branch { var, low, high } => {
                    let key = ptr_key(node);
                    if let Some(cached) = memo.get(&key) {
                        return cached.clone();
                    }
                    let low = go(low, keep, memo);
                    let high = go(high, keep, memo);
                    let result = if keep(*var) {
                        BddNode::branch(*var, low, high)
                    } else {
                        low.or(&high)
                    };
                    memo.insert(key, result.clone());
                    result
                }
            }
        }
        go(self, keep, &mut HashMap::new())
    }

    /// The chain asserting that every variable in `vars` is `0`.
    ///
    /// Built highest-variable-first so the resulting root is the *smallest*
    /// variable in `vars`, matching this module's root-is-smallest-var
    /// ordering (`singleton` builds root-down from `width - 1`, `apply`
    /// picks `top = x.min(y)`); the order `vars` is given in doesn't matter.
    pub fn all_zero(vars: impl Iterator<Item = u32>) -> BddNode {
        let mut sorted: Vec<u32> = vars.collect();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        let mut node = BddNode::true_node();
        for var in sorted {
            node = BddNode::branch(var, node, BddNode::false_node());
        }
        node
    }

    /// The chain asserting that every variable in `vars` is `1`. See
    /// `all_zero` for the ordering rationale.
    pub fn all_one(vars: impl Iterator<Item = u32>) -> BddNode {
        let mut sorted: Vec<u32> = vars.collect();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        let mut node = BddNode::true_node();
        for var in sorted {
            node = BddNode::branch(var, BddNode::false_node(), node);
        }
        node
    }

    /// Enumerates satisfying assignments over `width` variables, stopping
    /// (returning `None`) if the count would exceed `cap`.
    pub fn enumerate(&self, width: u32, cap: usize) -> Option<Vec<BitNumber>> {
        let mut out = Vec::new();
        if !self.collect(width, 0, 0, cap, &mut out) {
            return None;
        }
        Some(out)
    }

    fn collect(&self, width: u32, var: u32, acc: u64, cap: usize, out: &mut Vec<BitNumber>) -> bool {
        if out.len() > cap {
            return false;
        }
        if var == width {
            match &*self.0 {
                Kind::False => {}
                Kind::True => out.push(BitNumber::new(acc, width)),
                Kind::Branch { .. } => unreachable!("branch node beyond declared width"),
            }
            return true;
        }
        match &*self.0 {
            Kind::False => true,
            Kind::True => {
                // Don't-care for every remaining variable: expand both ways.
                if !BddNode::true_node().collect_free(width, var, acc, cap, out) {
                    return false;
                }
                true
            }
            Kind::Branch { var: v, low, high } if *v == var => {
                low.collect(width, var + 1, acc, cap, out) && high.collect(width, var + 1, acc | (1u64 << var), cap, out)
            }
            Kind::Branch { .. } => {
                // Skipped (don't-care) variable: both assignments are valid.
                self.collect(width, var + 1, acc, cap, out) && self.collect(width, var + 1, acc | (1u64 << var), cap, out)
            }
        }
    }

    fn collect_free(&self, width: u32, var: u32, acc: u64, cap: usize, out: &mut Vec<BitNumber>) -> bool {
        if var == width {
            out.push(BitNumber::new(acc, width));
            return out.len() <= cap;
        }
        if out.len() > cap {
            return false;
        }
        self.collect_free(width, var + 1, acc, cap, out) && self.collect_free(width, var + 1, acc | (1u64 << var), cap, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singleton_contains_only_itself() {
        let v = BitNumber::new(42, 8);
        let node = BddNode::singleton(&v);
        assert!(node.contains(&v));
        assert!(!node.contains(&BitNumber::new(41, 8)));
    }

    #[test]
    fn or_of_two_singletons_contains_both() {
        let a = BitNumber::new(1, 8);
        let b = BitNumber::new(200, 8);
        let node = BddNode::singleton(&a).or(&BddNode::singleton(&b));
        assert!(node.contains(&a));
        assert!(node.contains(&b));
        assert!(!node.contains(&BitNumber::new(5, 8)));
    }

    #[test]
    fn not_of_true_is_false() {
        assert!(BddNode::true_node().not().is_false());
    }

    #[test]
    fn double_negation_round_trips() {
        let a = BddNode::singleton(&BitNumber::new(7, 8));
        assert_eq!(a.not().not(), a);
    }

    #[test]
    fn enumerate_recovers_exact_members() {
        let a = BitNumber::new(3, 4);
        let b = BitNumber::new(9, 4);
        let node = BddNode::singleton(&a).or(&BddNode::singleton(&b));
        let mut members = node.enumerate(4, 16).unwrap();
        members.sort_by_key(|v| v.zext_u64());
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].zext_u64(), 3);
        assert_eq!(members[1].zext_u64(), 9);
    }

    #[test]
    fn project_removes_high_variable_dependence() {
        let a = BitNumber::new(0b01, 2);
        let b = BitNumber::new(0b11, 2);
        let node = BddNode::singleton(&a).or(&BddNode::singleton(&b));
        let projected = node.project(|v| v != 1);
        // Only bit 0 should matter now; value `01` has bit0=1, so any bit1.
        assert!(projected.contains(&BitNumber::new(0b01, 2)));
        assert!(projected.contains(&BitNumber::new(0b11, 2)));
    }
}
