//! Fixed-width bitvector primitive shared by every abstract domain.
//!
//! `BitNumber` is the one concrete-value type the rest of the crate works
//! with: a `val` masked to `bit_size` bits, with both signed and unsigned
//! views available on demand. Equal values constructed independently are
//! deduplicated through a weak-keyed process-wide cache so that, while both
//! are live, `Arc::ptr_eq` holds between them (see the `interning` test
//! below); correctness never depends on that sharing.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, Weak},
};

use once_cell::sync::Lazy;

use crate::error::DomainError;

#[derive(Debug)]
struct BitNumberData {
    val: u64,
    bit_size: u32,
}

/// A `bit_size`-wide (1..=64) unsigned payload, masked so that
/// `val & mask(bit_size) == val`.
///
/// Cheap to clone (an `Arc` bump); compares and hashes by value, not by
/// identity, so it behaves like a plain value type regardless of whether
/// the interning cache happened to return a shared instance.
#[derive(Debug, Clone)]
pub struct BitNumber(Arc<BitNumberData>);

type CacheKey = (u64, u32);
static CACHE: Lazy<Mutex<HashMap<CacheKey, Weak<BitNumberData>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// The bitmask covering the low `bit_size` bits.
pub const fn mask_for(bit_size: u32) -> u64 {
    if bit_size >= 64 {
        u64::MAX
    } else {
        (1u64 << bit_size) - 1
    }
}

pub const fn sign_bit(bit_size: u32) -> u64 {
    if bit_size >= 64 {
        1u64 << 63
    } else {
        1u64 << (bit_size - 1)
    }
}

impl BitNumber {
    /// Constructs the canonical (interned while live) representative for
    /// `val & mask(bit_size)` at `bit_size`.
    ///
    /// # Panics
    /// If `bit_size` is not in `1..=64`.
    pub fn new(val: u64, bit_size: u32) -> Self {
        assert!(
            (1..=64).contains(&bit_size),
            "bit_size out of range: {bit_size}"
        );
        let masked = val & mask_for(bit_size);
        let key = (masked, bit_size);

        let mut cache = CACHE.lock().unwrap_or_else(|poison| poison.into_inner());
        if let Some(existing) = cache.get(&key).and_then(Weak::upgrade) {
            return BitNumber(existing);
        }
        let fresh = Arc::new(BitNumberData {
            val: masked,
            bit_size,
        });
        cache.insert(key, Arc::downgrade(&fresh));
        BitNumber(fresh)
    }

    /// The canonical `1`-bit `TRUE` value.
    pub fn tru() -> Self {
        static TRUE: Lazy<BitNumber> = Lazy::new(|| BitNumber::new(1, 1));
        TRUE.clone()
    }

    /// The canonical `1`-bit `FALSE` value.
    pub fn fals() -> Self {
        static FALSE: Lazy<BitNumber> = Lazy::new(|| BitNumber::new(0, 1));
        FALSE.clone()
    }

    /// The smallest representable signed value at `bit_size`: the sign bit
    /// alone.
    pub fn s_min_val(bit_size: u32) -> Self {
        BitNumber::new(sign_bit(bit_size), bit_size)
    }

    pub const fn bit_size(&self) -> u32 {
        self.0.bit_size
    }

    pub const fn mask(&self) -> u64 {
        mask_for(self.0.bit_size)
    }

    /// The unsigned (zero-extended to 64 bits) view of the payload.
    pub const fn zext_u64(&self) -> u64 {
        self.0.val
    }

    /// The signed (sign-extended to 64 bits) view of the payload.
    pub const fn sext_i64(&self) -> i64 {
        sext_i64_raw(self.0.val, self.0.bit_size)
    }

    fn require_same_width(&self, other: &BitNumber) {
        assert_eq!(
            self.bit_size(),
            other.bit_size(),
            "bitvector width mismatch: {} vs {}",
            self.bit_size(),
            other.bit_size()
        );
    }

    pub fn add(&self, other: &BitNumber) -> BitNumber {
        self.require_same_width(other);
        BitNumber::new(self.zext_u64().wrapping_add(other.zext_u64()), self.bit_size())
    }

    pub fn sub(&self, other: &BitNumber) -> BitNumber {
        self.require_same_width(other);
        BitNumber::new(self.zext_u64().wrapping_sub(other.zext_u64()), self.bit_size())
    }

    pub fn mul(&self, other: &BitNumber) -> BitNumber {
        self.require_same_width(other);
        BitNumber::new(self.zext_u64().wrapping_mul(other.zext_u64()), self.bit_size())
    }

    pub fn neg(&self) -> BitNumber {
        BitNumber::new(0u64.wrapping_sub(self.zext_u64()), self.bit_size())
    }

    pub fn inc(&self) -> BitNumber {
        self.add(&BitNumber::new(1, self.bit_size()))
    }

    pub fn dec(&self) -> BitNumber {
        self.sub(&BitNumber::new(1, self.bit_size()))
    }

    /// Unsigned quotient. Fails only on division by zero.
    pub fn uquot(&self, other: &BitNumber) -> Result<BitNumber, DomainError> {
        self.require_same_width(other);
        if other.zext_u64() == 0 {
            return Err(DomainError::DivByZero);
        }
        Ok(BitNumber::new(self.zext_u64() / other.zext_u64(), self.bit_size()))
    }

    /// Unsigned remainder. Fails only on division by zero.
    pub fn urem(&self, other: &BitNumber) -> Result<BitNumber, DomainError> {
        self.require_same_width(other);
        if other.zext_u64() == 0 {
            return Err(DomainError::DivByZero);
        }
        Ok(BitNumber::new(self.zext_u64() % other.zext_u64(), self.bit_size()))
    }

    /// Signed quotient. Fails on division by zero, and on `sMinVal / -1`
    /// (the mathematical result does not fit back into `bit_size` bits).
    pub fn squot(&self, other: &BitNumber) -> Result<BitNumber, DomainError> {
        self.require_same_width(other);
        let (a, b) = (self.sext_i64(), other.sext_i64());
        if b == 0 {
            return Err(DomainError::DivByZero);
        }
        if b == -1 && self.is_s_min_val() {
            return Err(DomainError::SignedDivOverflow {
                dividend: a,
                divisor: b,
            });
        }
        Ok(BitNumber::new(a.wrapping_div(b) as u64, self.bit_size()))
    }

    /// Signed remainder. Per this core's reading of the spec (see
    /// `bitvector::DomainError`), this shares `squot`'s overflow case rather
    /// than returning the mathematically well-defined zero.
    pub fn srem(&self, other: &BitNumber) -> Result<BitNumber, DomainError> {
        self.require_same_width(other);
        let (a, b) = (self.sext_i64(), other.sext_i64());
        if b == 0 {
            return Err(DomainError::DivByZero);
        }
        if b == -1 && self.is_s_min_val() {
            return Err(DomainError::SignedDivOverflow {
                dividend: a,
                divisor: b,
            });
        }
        Ok(BitNumber::new(a.wrapping_rem(b) as u64, self.bit_size()))
    }

    fn is_s_min_val(&self) -> bool {
        self.zext_u64() == sign_bit(self.bit_size())
    }

    pub fn and(&self, other: &BitNumber) -> BitNumber {
        self.require_same_width(other);
        BitNumber::new(self.zext_u64() & other.zext_u64(), self.bit_size())
    }

    pub fn or(&self, other: &BitNumber) -> BitNumber {
        self.require_same_width(other);
        BitNumber::new(self.zext_u64() | other.zext_u64(), self.bit_size())
    }

    pub fn xor(&self, other: &BitNumber) -> BitNumber {
        self.require_same_width(other);
        BitNumber::new(self.zext_u64() ^ other.zext_u64(), self.bit_size())
    }

    pub fn not(&self) -> BitNumber {
        BitNumber::new(!self.zext_u64(), self.bit_size())
    }

    /// Logical shift left. Amounts `>= bit_size` yield `0`.
    pub fn shl(&self, amount: u32) -> BitNumber {
        if amount >= self.bit_size() {
            return BitNumber::new(0, self.bit_size());
        }
        BitNumber::new(self.zext_u64() << amount, self.bit_size())
    }

    /// Logical shift right. Amounts `>= bit_size` yield `0`.
    pub fn shr(&self, amount: u32) -> BitNumber {
        if amount >= self.bit_size() {
            return BitNumber::new(0, self.bit_size());
        }
        BitNumber::new(self.zext_u64() >> amount, self.bit_size())
    }

    /// Arithmetic shift right. Amounts `>= bit_size` yield all sign bits.
    pub fn sar(&self, amount: u32) -> BitNumber {
        if amount >= self.bit_size() {
            return if self.sext_i64() < 0 {
                BitNumber::new(self.mask(), self.bit_size())
            } else {
                BitNumber::new(0, self.bit_size())
            };
        }
        let shifted = self.sext_i64() >> amount;
        BitNumber::new(shifted as u64, self.bit_size())
    }

    /// Truncates to a narrower width. `new_width` must be `<= bit_size`.
    pub fn trunc(&self, new_width: u32) -> BitNumber {
        assert!(
            new_width <= self.bit_size(),
            "trunc to wider width: {new_width} > {}",
            self.bit_size()
        );
        BitNumber::new(self.zext_u64(), new_width)
    }

    /// Zero-extends to a wider width. `new_width` must be `>= bit_size`.
    pub fn zext(&self, new_width: u32) -> BitNumber {
        assert!(
            new_width >= self.bit_size(),
            "zero-extend to narrower width: {new_width} < {}",
            self.bit_size()
        );
        BitNumber::new(self.zext_u64(), new_width)
    }

    /// Sign-extends to a wider width. `new_width` must be `>= bit_size`.
    pub fn sext(&self, new_width: u32) -> BitNumber {
        assert!(
            new_width >= self.bit_size(),
            "sign-extend to narrower width: {new_width} < {}",
            self.bit_size()
        );
        BitNumber::new(self.sext_i64() as u64, new_width)
    }

    pub fn ult(&self, other: &BitNumber) -> bool {
        self.require_same_width(other);
        self.zext_u64() < other.zext_u64()
    }
    pub fn ugt(&self, other: &BitNumber) -> bool {
        other.ult(self)
    }
    pub fn uleq(&self, other: &BitNumber) -> bool {
        !other.ult(self)
    }
    pub fn ugeq(&self, other: &BitNumber) -> bool {
        !self.ult(other)
    }

    pub fn slt(&self, other: &BitNumber) -> bool {
        self.require_same_width(other);
        self.sext_i64() < other.sext_i64()
    }
    pub fn sgt(&self, other: &BitNumber) -> bool {
        other.slt(self)
    }
    pub fn sleq(&self, other: &BitNumber) -> bool {
        !other.slt(self)
    }
    pub fn sgeq(&self, other: &BitNumber) -> bool {
        !self.slt(other)
    }

    pub fn s_mul_overflow(&self, other: &BitNumber) -> bool {
        self.require_same_width(other);
        let w = self.bit_size();
        let product = self.sext_i64() as i128 * other.sext_i64() as i128;
        let lo = -(1i128 << (w - 1));
        let hi = (1i128 << (w - 1)) - 1;
        product < lo || product > hi
    }

    pub fn u_mul_overflow(&self, other: &BitNumber) -> bool {
        self.require_same_width(other);
        let product = self.zext_u64() as u128 * other.zext_u64() as u128;
        product > self.mask() as u128
    }

    /// `Some(k)` if this value is exactly `2^k`, `None` otherwise (including
    /// for zero).
    pub fn log2n(&self) -> Option<u32> {
        let v = self.zext_u64();
        if v != 0 && (v & (v - 1)) == 0 {
            Some(v.trailing_zeros())
        } else {
            None
        }
    }

    /// Whether `b` precedes or equals `c` on the number-circle rooted at
    /// `self`: `(b - self) <=u (c - self)`.
    pub fn relative_leq(&self, b: &BitNumber, c: &BitNumber) -> bool {
        self.require_same_width(b);
        self.require_same_width(c);
        let mask = self.mask();
        let off_b = b.zext_u64().wrapping_sub(self.zext_u64()) & mask;
        let off_c = c.zext_u64().wrapping_sub(self.zext_u64()) & mask;
        off_b <= off_c
    }
}

const fn sext_i64_raw(val: u64, bit_size: u32) -> i64 {
    let shift = 64 - bit_size;
    ((val << shift) as i64) >> shift
}

impl PartialEq for BitNumber {
    fn eq(&self, other: &Self) -> bool {
        self.0.val == other.0.val && self.0.bit_size == other.0.bit_size
    }
}
impl Eq for BitNumber {}

impl std::hash::Hash for BitNumber {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.val.hash(state);
        self.0.bit_size.hash(state);
    }
}

impl BitNumber {
    /// Whether `self` and `other` are the very same cached allocation.
    /// Exposed for the interning property test; ordinary code should use
    /// `==`.
    pub fn is_same_allocation(&self, other: &BitNumber) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn bn(val: u64, w: u32) -> BitNumber {
        BitNumber::new(val, w)
    }

    #[test]
    fn interning_reuses_live_values() {
        let a = bn(42, 8);
        let b = bn(42, 8);
        assert!(a.is_same_allocation(&b));
    }

    #[test]
    fn masks_on_construction() {
        let v = bn(0x1ff, 8);
        assert_eq!(v.zext_u64(), 0xff);
    }

    #[test]
    fn squot_smin_by_minus_one_overflows() {
        let dividend = BitNumber::s_min_val(32);
        let divisor = bn(0xffff_ffff, 32); // -1 at width 32
        assert!(matches!(
            dividend.squot(&divisor),
            Err(DomainError::SignedDivOverflow { .. })
        ));
    }

    #[test]
    fn uquot_by_zero_is_div_by_zero() {
        assert_eq!(bn(5, 8).uquot(&bn(0, 8)), Err(DomainError::DivByZero));
    }

    #[test]
    fn signed_comparison_at_64_bits_is_not_naive() {
        let neg_one = bn(u64::MAX, 64);
        let one = bn(1, 64);
        assert!(neg_one.slt(&one));
        assert!(!neg_one.ult(&one)); // unsigned: MAX is huge, not < 1
    }

    #[test]
    fn log2n_detects_powers_of_two() {
        assert_eq!(bn(16, 8).log2n(), Some(4));
        assert_eq!(bn(0, 8).log2n(), None);
        assert_eq!(bn(6, 8).log2n(), None);
    }

    #[quickcheck]
    fn add_matches_modular_reference(a: u32, b: u32) -> bool {
        let (a, b) = (a as u64 & 0xff, b as u64 & 0xff);
        bn(a, 8).add(&bn(b, 8)).zext_u64() == (a + b) % 256
    }

    #[quickcheck]
    fn xor_is_its_own_inverse(a: u8, b: u8) -> bool {
        let x = bn(a as u64, 8);
        let y = bn(b as u64, 8);
        x.xor(&y).xor(&y) == x
    }

    #[quickcheck]
    fn ult_matches_reference(a: u8, b: u8) -> bool {
        bn(a as u64, 8).ult(&bn(b as u64, 8)) == (a < b)
    }

    #[quickcheck]
    fn slt_matches_reference(a: i8, b: i8) -> bool {
        bn(a as u8 as u64, 8).slt(&bn(b as u8 as u64, 8)) == (a < b)
    }

    #[quickcheck]
    fn round_trip_truncate_then_extend(v: u32) -> bool {
        let v = v as u64 & 0xffff_ffff;
        let original = bn(v, 32);
        original.trunc(8).zext(32) == bn(v & 0xff, 32)
    }
}
