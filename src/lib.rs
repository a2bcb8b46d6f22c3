//! Abstract-value subsystem for a static binary analyzer over a register
//! transfer language: a sign-agnostic wrapped-interval domain, a BDD-backed
//! set domain for address tracking, the `AbstractDomain` contract both
//! implement, and the recursive RTL expression evaluator built against it.
//!
//! The CFG fixpoint driver, disassembler front-ends, RTL construction, CLI,
//! and result serialization are out of scope — this crate is the numeric
//! semantics they would be built on top of.

pub mod bdd;
pub mod bitvector;
pub mod config;
pub mod domain;
pub mod error;
pub mod eval;
pub mod interval;
pub mod region;
pub mod rtl;
pub mod valuation;

pub use bitvector::BitNumber;
pub use config::AnalysisConfig;
pub use domain::AbstractDomain;
pub use error::DomainError;
pub use region::MemoryRegion;
