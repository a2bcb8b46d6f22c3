//! The common contract every abstract numeric domain implements.
//!
//! [`WrappedInterval`](crate::interval::WrappedInterval) and
//! [`BddSet`](crate::bdd::BddSet) are the two domains in this crate, but the
//! evaluator (`eval`) is written against this trait alone so a third domain
//! could be dropped in without touching it.

use crate::bitvector::BitNumber;

/// A fixed-width abstract value with lattice, arithmetic, and comparison
/// operations.
///
/// Every method that takes two domain elements requires them to share a
/// width (and, transitively, this trait does not itself carry a memory
/// region — domains that need one, like `BddSet`, pair it alongside).
/// Division and signed-overflow conditions that the concrete `BitNumber`
/// reports as an error collapse here into `⊥`, per the contract's failure
/// semantics.
pub trait AbstractDomain: Sized + Clone + PartialEq {
    fn width(&self) -> u32;

    // -- Lattice --------------------------------------------------------
    fn bot(width: u32) -> Self;
    fn top(width: u32) -> Self;
    fn join(&self, other: &Self) -> Self;
    fn meet(&self, other: &Self) -> Self;
    fn widen(&self, other: &Self) -> Self;
    fn less_or_equal(&self, other: &Self) -> bool;
    fn is_top(&self) -> bool;
    fn is_bot(&self) -> bool;

    fn joins<I: IntoIterator<Item = Self>>(width: u32, items: I) -> Self {
        items
            .into_iter()
            .fold(Self::bot(width), |acc, next| acc.join(&next))
    }

    // -- Concretization ---------------------------------------------------
    fn has_unique_concretization(&self) -> bool;
    fn unique_concretization(&self) -> Option<BitNumber>;
    fn has_element(&self, value: &BitNumber) -> bool;
    /// Iterates concrete members. Domains that can represent unboundedly
    /// many values must bound this lazily (callers are responsible for not
    /// driving it to exhaustion on `top`).
    fn iter_values(&self) -> Box<dyn Iterator<Item = BitNumber> + '_>;

    // -- Single-value construction ---------------------------------------
    fn number(value: &BitNumber) -> Self;

    // -- Arithmetic -------------------------------------------------------
    fn add(&self, other: &Self) -> Self;
    fn sub(&self, other: &Self) -> Self;
    fn negate(&self) -> Self;
    /// Multiplies at double this domain's width; the result's width is
    /// `2 * self.width()`.
    fn mul_double(&self, other: &Self) -> Self;
    fn signed_div(&self, other: &Self) -> Self;
    fn unsigned_div(&self, other: &Self) -> Self;
    fn signed_rem(&self, other: &Self) -> Self;
    fn unsigned_rem(&self, other: &Self) -> Self;

    // -- Bitwise ------------------------------------------------------------
    fn and(&self, other: &Self) -> Self;
    fn or(&self, other: &Self) -> Self;
    fn xor(&self, other: &Self) -> Self;
    fn not(&self) -> Self;

    // -- Shifts ---------------------------------------------------------
    fn shl(&self, amount: &Self) -> Self;
    fn shr(&self, amount: &Self) -> Self;
    fn sar(&self, amount: &Self) -> Self;

    // -- Width changes ----------------------------------------------------
    fn truncate(&self, new_width: u32) -> Self;
    fn zero_extend(&self, new_width: u32) -> Self;
    fn sign_extend(&self, new_width: u32) -> Self;
    /// `truncate` if `new_width <= self.width()`, `zero_extend` otherwise
    /// (the resolved reading of the evaluator's `CAST`; see DESIGN.md).
    fn cast(&self, new_width: u32) -> Self {
        if new_width <= self.width() {
            self.truncate(new_width)
        } else {
            self.zero_extend(new_width)
        }
    }

    // -- Comparisons (all return a width-1 domain element) ----------------
    fn eq_to(&self, other: &Self) -> Self;
    fn signed_less_than(&self, other: &Self) -> Self;
    fn signed_less_than_or_equal(&self, other: &Self) -> Self;
    fn unsigned_less_than(&self, other: &Self) -> Self;
    fn unsigned_less_than_or_equal(&self, other: &Self) -> Self;

    // -- Assumptions --------------------------------------------------------
    /// Narrows `(self, other)` under the assumption `self <=u other`.
    fn assume_uleq(&self, other: &Self) -> (Self, Self);
    /// Narrows `(self, other)` under the assumption `self <=s other`.
    fn assume_sleq(&self, other: &Self) -> (Self, Self);
}
