//! The abstract expression evaluator: a pure, recursive interpreter that
//! traces an RTL expression tree into an element of whichever
//! [`AbstractDomain`] it is instantiated over.
//!
//! The evaluator never writes state and never needs to cache — it is a
//! plain recursive function generic over the domain `D` and a [`Valuation`]
//! implementation supplying variable and memory reads, matching the
//! "domain factory `F`, valuation `S`" framing in `spec.md` §6.

use crate::bitvector::BitNumber;
use crate::config::AnalysisConfig;
use crate::domain::AbstractDomain;
use crate::region::MemoryRegion;
use crate::rtl::{Expr, Operator};
use crate::valuation::VarId;

/// What the evaluator reads through to resolve a `Variable` or
/// `MemoryLocation` leaf. Kept separate from the concrete
/// [`crate::valuation::VariableValuation`]/[`crate::valuation::PartitionedMemory`]
/// pair so a caller can plug in any state representation — a snapshot, a
/// mock, or a composite of several stores — without the evaluator knowing.
pub trait Valuation<D: AbstractDomain> {
    fn variable_value(&self, var: VarId) -> (D, MemoryRegion);
    fn memory_value(&self, region: MemoryRegion, address: &D, width: u32) -> D;
}

/// A [`Valuation`] backed directly by the concrete valuation/memory pair
/// from [`crate::valuation`], the evaluator's ordinary runtime state.
pub struct AnalysisState<'a, D: AbstractDomain> {
    pub variables: &'a crate::valuation::VariableValuation<D>,
    pub memory: &'a crate::valuation::PartitionedMemory<D>,
    pub config: &'a AnalysisConfig,
}

impl<'a, D: AbstractDomain> Valuation<D> for AnalysisState<'a, D> {
    fn variable_value(&self, var: VarId) -> (D, MemoryRegion) {
        self.variables.get(var)
    }

    fn memory_value(&self, region: MemoryRegion, address: &D, width: u32) -> D {
        self.memory.read_through(region, address, width, self.config)
    }
}

/// Casts `v` to `width` only if it doesn't already have it, per the
/// evaluator's blanket rule of casting mismatched-width operator arguments
/// up or down to the node's own result width.
fn cast_to<D: AbstractDomain>(v: D, width: u32) -> D {
    if v.width() == width {
        v
    } else {
        v.cast(width)
    }
}

/// Recursively interprets `expr` into an element of `D`, reading variables
/// and memory through `state`.
pub fn eval<D: AbstractDomain>(expr: &Expr, state: &impl Valuation<D>) -> D {
    match expr {
        Expr::Number { value, width } => D::number(&BitNumber::new(*value, *width)),

        Expr::Nondet { width } => D::top(*width),

        Expr::Variable { var } => state.variable_value(*var).0,

        Expr::MemoryLocation { region, address, width } => {
            let addr_val: D = eval(address, state);
            state.memory_value(*region, &addr_val, *width)
        }

        Expr::BitRange { op, first, last, width } => {
            tracing::trace!("BitRange dispatch, width={width}");
            eval_bit_range(op, first, last, *width, state)
        }

        Expr::Conditional { cond, if_true, if_false } => {
            tracing::trace!("Conditional dispatch");
            let c: D = eval(cond, state);
            if let Some(v) = c.unique_concretization() {
                if v == BitNumber::tru() {
                    eval(if_true, state)
                } else {
                    eval(if_false, state)
                }
            } else {
                let t: D = eval(if_true, state);
                let f: D = eval(if_false, state);
                t.join(&f)
            }
        }

        Expr::Operation { op, args, width } => {
            tracing::trace!("Operation dispatch: {op:?}, width={width}");
            eval_operation(*op, args, *width, state)
        }

        Expr::SpecialExpression { width } => D::top(*width),
    }
}

fn eval_bit_range<D: AbstractDomain>(op: &Expr, first: &Expr, last: &Expr, width: u32, state: &impl Valuation<D>) -> D {
    let op_val: D = eval(op, state);
    let op_width = op_val.width();
    let first_val: D = cast_to(eval(first, state), op_width);
    let last_val: D = cast_to(eval(last, state), op_width);

    let first_bit = first_val
        .unique_concretization()
        .expect("BitRange's `first` bound must be a statically concrete bit position")
        .zext_u64() as u32;
    let last_bit = last_val
        .unique_concretization()
        .expect("BitRange's `last` bound must be a statically concrete bit position")
        .zext_u64() as u32;

    let span = last_bit - first_bit + 1;
    let mask = if span >= 64 { u64::MAX } else { ((1u64 << span) - 1) << first_bit };
    let mask_val: D = D::number(&BitNumber::new(mask, op_width));
    let first_shift: D = D::number(&BitNumber::new(first_bit as u64, op_width));

    let extracted = op_val.and(&mask_val).shr(&first_shift);
    cast_to(extracted, width)
}

fn eval_operation<D: AbstractDomain>(op: Operator, args: &[Expr], width: u32, state: &impl Valuation<D>) -> D {
    match op {
        Operator::And | Operator::Or | Operator::Xor | Operator::Plus => {
            let mut values = args.iter().map(|a| cast_to(eval(a, state), width));
            let first = values.next().expect("associative operator requires at least one argument");
            values.fold(first, |acc, next| apply_associative(op, &acc, &next))
        }

        // mulDouble folds at the doubled width for a binary multiply (the
        // overwhelmingly common arity); for a longer chain every
        // intermediate product is truncated back to `width` before the next
        // corner multiplication, and the final product is cast to `width`
        // like every other operator result. See DESIGN.md's resolution of
        // the "mulDouble fold width" open question.
        Operator::Mul => {
            let mut values = args.iter().map(|a| cast_to(eval(a, state), width));
            let first = values.next().expect("MUL requires at least one argument");
            let widened = values.fold(first, |acc, next| {
                let acc = cast_to(acc, width);
                acc.mul_double(&next)
            });
            cast_to(widened, width)
        }

        Operator::Not => {
            let v: D = cast_to(eval(&args[0], state), width);
            v.not()
        }
        Operator::Neg => {
            let v: D = cast_to(eval(&args[0], state), width);
            v.negate()
        }

        Operator::Udiv => binary(args, width, state, |a, b| a.unsigned_div(b)),
        Operator::Sdiv => binary(args, width, state, |a, b| a.signed_div(b)),
        Operator::Umod => binary(args, width, state, |a, b| a.unsigned_rem(b)),
        Operator::Smod => binary(args, width, state, |a, b| a.signed_rem(b)),

        Operator::Shl => shift(args, width, state, |a, amt| a.shl(amt)),
        Operator::Shr => shift(args, width, state, |a, amt| a.shr(amt)),
        Operator::Sar => shift(args, width, state, |a, amt| a.sar(amt)),

        // ROL a,b = (a shl b) | (a sar (w - b)); ROR symmetrically with
        // shl/shr swapped. Intentionally over-approximating for the
        // wrap-around bits, per `spec.md` §4.7/§9.
        Operator::Rol => rotate(args, width, state, true),
        Operator::Ror => rotate(args, width, state, false),

        // CAST with the resolved semantics from `spec.md` §9: truncate when
        // narrowing, zero-extend when widening, per `AbstractDomain::cast`.
        Operator::Cast => {
            let v: D = eval(&args[0], state);
            v.cast(width)
        }
        Operator::SignExtend => {
            let v: D = eval(&args[0], state);
            if v.width() == width {
                v
            } else {
                v.sign_extend(width)
            }
        }
        Operator::ZeroFill => {
            let v: D = eval(&args[0], state);
            if v.width() == width {
                v
            } else {
                v.zero_extend(width)
            }
        }

        Operator::Unknown
        | Operator::Fmul
        | Operator::Fdiv
        | Operator::Fsize
        | Operator::PowerOf
        | Operator::Rolc
        | Operator::Rorc => {
            tracing::debug!("unsupported operator {op:?} at width {width} degraded to top");
            D::top(width)
        }
    }
}

fn apply_associative<D: AbstractDomain>(op: Operator, acc: &D, next: &D) -> D {
    match op {
        Operator::And => acc.and(next),
        Operator::Or => acc.or(next),
        Operator::Xor => acc.xor(next),
        Operator::Plus => acc.add(next),
        _ => unreachable!("apply_associative called with non-associative operator {op:?}"),
    }
}

fn binary<D: AbstractDomain>(args: &[Expr], width: u32, state: &impl Valuation<D>, f: impl Fn(&D, &D) -> D) -> D {
    let a: D = cast_to(eval(&args[0], state), width);
    let b: D = cast_to(eval(&args[1], state), width);
    f(&a, &b)
}

fn shift<D: AbstractDomain>(args: &[Expr], width: u32, state: &impl Valuation<D>, f: impl Fn(&D, &D) -> D) -> D {
    let a: D = cast_to(eval(&args[0], state), width);
    // "zero-extend the shift amount to w before applying" (spec.md §4.7);
    // `cast` truncates instead of extending when the amount is already
    // wider than `w`, which is the only sound reading for a shift count.
    let amount: D = cast_to(eval(&args[1], state), width);
    f(&a, &amount)
}

fn rotate<D: AbstractDomain>(args: &[Expr], width: u32, state: &impl Valuation<D>, left: bool) -> D {
    let a: D = cast_to(eval(&args[0], state), width);
    let amount: D = cast_to(eval(&args[1], state), width);
    let width_const: D = D::number(&BitNumber::new(width as u64, width));
    let complement = width_const.sub(&amount);
    if left {
        a.shl(&amount).or(&a.sar(&complement))
    } else {
        a.shr(&amount).or(&a.shl(&complement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bdd::BddSet;
    use crate::config::AnalysisConfig;
    use crate::interval::WrappedInterval;
    use crate::valuation::{FlatRegisterLayout, PartitionedMemory, VariableValuation};

    fn num(value: u64, width: u32) -> Expr {
        Expr::number(value, width)
    }

    fn op(operator: Operator, args: Vec<Expr>, width: u32) -> Expr {
        Expr::Operation { op: operator, args, width }
    }

    struct Harness {
        variables: VariableValuation<WrappedInterval>,
        memory: PartitionedMemory<WrappedInterval>,
        config: AnalysisConfig,
    }

    impl Harness {
        fn new() -> Self {
            Harness {
                variables: VariableValuation::new(),
                memory: PartitionedMemory::new(),
                config: AnalysisConfig::default(),
            }
        }

        fn state(&self) -> AnalysisState<'_, WrappedInterval> {
            AnalysisState { variables: &self.variables, memory: &self.memory, config: &self.config }
        }
    }

    #[test]
    fn scenario_arithmetic_chain_at_32_bits() {
        // (2 + 3) * 4 - 5 -> 15
        let expr = op(
            Operator::Plus,
            vec![
                op(Operator::Mul, vec![op(Operator::Plus, vec![num(2, 32), num(3, 32)], 32), num(4, 32)], 32),
                op(Operator::Neg, vec![num(5, 32)], 32),
            ],
            32,
        );
        let h = Harness::new();
        let result: WrappedInterval = eval(&expr, &h.state());
        assert_eq!(result, WrappedInterval::number(&BitNumber::new(15, 32)));
    }

    #[test]
    fn scenario_shl_by_unbounded_amount_enumerates_every_single_bit_pattern() {
        // mirrors spec.md §8 scenario 4: shl(S(1,32), [0,31]) -> [1, 0x80000000]_32
        let mut h = Harness::new();
        let amount_var = VarId::new(0, 32);
        h.variables.set(
            amount_var,
            WrappedInterval::from_range(0, 31, 32),
            MemoryRegion::Top,
            &FlatRegisterLayout,
        );
        let expr = op(Operator::Shl, vec![num(1, 32), Expr::variable(amount_var)], 32);
        let result: WrappedInterval = eval(&expr, &h.state());
        assert_eq!(result, WrappedInterval::from_range(1, 0x8000_0000, 32));
    }

    #[test]
    fn scenario_eq_is_top_when_ranges_overlap() {
        // mirrors spec.md §8 scenario 5, driven through the comparison trait
        // method directly rather than an RTL node (no `EQ` operator tag
        // exists in `rtl::Operator`; comparisons are values, not expressions,
        // in this evaluator's RTL dialect).
        let a = WrappedInterval::number(&BitNumber::new(5, 32));
        let b = WrappedInterval::from_range(0, 10, 32);
        assert!(a.eq_to(&b).is_top());
    }

    #[test]
    fn conditional_with_unique_condition_takes_one_branch() {
        let h = Harness::new();
        let expr = Expr::Conditional {
            cond: Box::new(num(1, 1)),
            if_true: Box::new(num(7, 32)),
            if_false: Box::new(num(9, 32)),
        };
        let result: WrappedInterval = eval(&expr, &h.state());
        assert_eq!(result, WrappedInterval::number(&BitNumber::new(7, 32)));
    }

    #[test]
    fn conditional_with_unknown_condition_joins_both_branches() {
        let h = Harness::new();
        let expr = Expr::Conditional {
            cond: Box::new(Expr::Nondet { width: 1 }),
            if_true: Box::new(num(7, 32)),
            if_false: Box::new(num(9, 32)),
        };
        let result: WrappedInterval = eval(&expr, &h.state());
        assert_eq!(
            result,
            WrappedInterval::number(&BitNumber::new(7, 32)).join(&WrappedInterval::number(&BitNumber::new(9, 32)))
        );
    }

    #[test]
    fn bit_range_extracts_the_low_byte() {
        let h = Harness::new();
        let expr = Expr::BitRange {
            op: Box::new(num(0x1234, 32)),
            first: Box::new(num(0, 32)),
            last: Box::new(num(7, 32)),
            width: 8,
        };
        let result: WrappedInterval = eval(&expr, &h.state());
        assert_eq!(result, WrappedInterval::number(&BitNumber::new(0x34, 8)));
    }

    #[test]
    fn unsupported_operator_degrades_to_top() {
        let h = Harness::new();
        let expr = op(Operator::Fmul, vec![num(1, 32), num(2, 32)], 32);
        let result: WrappedInterval = eval(&expr, &h.state());
        assert!(result.is_top());
    }

    #[test]
    fn variable_read_consults_the_valuation() {
        let mut h = Harness::new();
        let var = VarId::new(0, 32);
        h.variables.set(
            var,
            WrappedInterval::number(&BitNumber::new(42, 32)),
            MemoryRegion::Global,
            &FlatRegisterLayout,
        );
        let expr = Expr::variable(var);
        let result: WrappedInterval = eval(&expr, &h.state());
        assert_eq!(result, WrappedInterval::number(&BitNumber::new(42, 32)));
    }

    #[test]
    fn memory_read_through_a_singleton_address_hits_the_written_cell() {
        let mut h = Harness::new();
        h.memory.set(MemoryRegion::Global, 0x1000, 32, WrappedInterval::number(&BitNumber::new(99, 32)));
        let expr = Expr::MemoryLocation {
            region: MemoryRegion::Global,
            address: Box::new(num(0x1000, 32)),
            width: 32,
        };
        let result: WrappedInterval = eval(&expr, &h.state());
        assert_eq!(result, WrappedInterval::number(&BitNumber::new(99, 32)));
    }

    #[test]
    fn evaluator_is_generic_over_the_bdd_set_domain_too() {
        let variables: VariableValuation<BddSet> = VariableValuation::new();
        let memory: PartitionedMemory<BddSet> = PartitionedMemory::new();
        let config = AnalysisConfig::default();
        let state = AnalysisState { variables: &variables, memory: &memory, config: &config };
        let expr = op(Operator::And, vec![num(0xff, 8), num(0x0f, 8)], 8);
        let result: BddSet = eval(&expr, &state);
        assert_eq!(result, BddSet::number(&BitNumber::new(0x0f, 8)));
    }

    #[test]
    fn mul_is_exact_for_a_simple_binary_product() {
        let h = Harness::new();
        let expr = op(Operator::Mul, vec![num(6, 8), num(7, 8)], 8);
        let result: WrappedInterval = eval(&expr, &h.state());
        assert_eq!(result, WrappedInterval::number(&BitNumber::new(42, 8)));
    }
}
