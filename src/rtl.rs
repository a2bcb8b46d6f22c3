//! The RTL expression tree: the evaluator's only input type. This crate
//! owns the definition since no external disassembler front-end is wired up
//! in this exercise, but [`crate::eval`] depends on nothing but the shapes
//! defined here.

use strum::{EnumCount, EnumIter};

use crate::region::MemoryRegion;
use crate::valuation::VarId;

/// The closed set of operator tags an `Operation` node may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumCount, EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operator {
    And,
    Or,
    Xor,
    Plus,
    Mul,
    Not,
    Neg,
    Udiv,
    Sdiv,
    Umod,
    Smod,
    Shr,
    Sar,
    Shl,
    Rol,
    Ror,
    Cast,
    SignExtend,
    ZeroFill,
    Unknown,
    Fmul,
    Fdiv,
    Fsize,
    PowerOf,
    Rolc,
    Rorc,
}

impl Operator {
    /// Operators that are both associative and commutative across a
    /// variable-length argument list, evaluated via a left fold.
    pub fn is_associative_fold(self) -> bool {
        matches!(self, Operator::And | Operator::Or | Operator::Xor | Operator::Plus | Operator::Mul)
    }

    /// Operators the evaluator has no symbolic treatment for and that
    /// degrade straight to `top`.
    pub fn is_unsupported(self) -> bool {
        matches!(
            self,
            Operator::Unknown
                | Operator::Fmul
                | Operator::Fdiv
                | Operator::Fsize
                | Operator::PowerOf
                | Operator::Rolc
                | Operator::Rorc
        )
    }
}

/// An RTL expression tree node. Each variant names the width its value
/// occupies, either directly or (for `Variable`/`Conditional`) by
/// delegating to a sub-term.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Expr {
    Number { value: u64, width: u32 },
    Variable { var: VarId },
    MemoryLocation { region: MemoryRegion, address: Box<Expr>, width: u32 },
    Nondet { width: u32 },
    BitRange { op: Box<Expr>, first: Box<Expr>, last: Box<Expr>, width: u32 },
    Conditional { cond: Box<Expr>, if_true: Box<Expr>, if_false: Box<Expr> },
    Operation { op: Operator, args: Vec<Expr>, width: u32 },
    SpecialExpression { width: u32 },
}

impl Expr {
    pub fn width(&self) -> u32 {
        match self {
            Expr::Number { width, .. } => *width,
            Expr::Variable { var } => var.width,
            Expr::MemoryLocation { width, .. } => *width,
            Expr::Nondet { width } => *width,
            Expr::BitRange { width, .. } => *width,
            Expr::Conditional { if_true, .. } => if_true.width(),
            Expr::Operation { width, .. } => *width,
            Expr::SpecialExpression { width } => *width,
        }
    }

    pub fn number(value: u64, width: u32) -> Expr {
        Expr::Number { value, width }
    }

    pub fn variable(var: VarId) -> Expr {
        Expr::Variable { var }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn every_operator_is_either_a_fold_or_explicitly_classified() {
        for op in Operator::iter() {
            let classified = op.is_associative_fold()
                || op.is_unsupported()
                || matches!(
                    op,
                    Operator::Not
                        | Operator::Neg
                        | Operator::Udiv
                        | Operator::Sdiv
                        | Operator::Umod
                        | Operator::Smod
                        | Operator::Shr
                        | Operator::Sar
                        | Operator::Shl
                        | Operator::Rol
                        | Operator::Ror
                        | Operator::Cast
                        | Operator::SignExtend
                        | Operator::ZeroFill
                );
            assert!(classified, "{op:?} fell through every dispatch category");
        }
    }

    #[test]
    fn conditional_width_delegates_to_its_branches() {
        let e = Expr::Conditional {
            cond: Box::new(Expr::number(1, 1)),
            if_true: Box::new(Expr::number(2, 16)),
            if_false: Box::new(Expr::number(3, 16)),
        };
        assert_eq!(e.width(), 16);
    }
}
