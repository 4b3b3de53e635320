//! Encoding selection.
//!
//! Every symbol kind with more than one valid linearization picks its
//! encoding here, from operand discreteness and bounds only. The functions are
//! pure: the same profile always yields the same tag, so a symbol may consult
//! them before its bounds settle and still freeze a consistent choice at
//! build time. Callers can bypass selection with the symbol's
//! `with_encoding` builder.
//!
//! Preference order, cheapest first:
//!
//! 1. statically known result, no auxiliaries
//! 2. operand already 0/1-valued, reuse it
//! 3. discrete operand, integer big-M
//! 4. continuous operand with extraction, piecewise ramp when epsilon is at
//!    or above the configured threshold, otherwise epsilon-guarded weights

use crate::config::SymbolConfig;
use crate::domain::range::TOLERANCE;
use crate::domain::{LinearPolynomial, ValueRange};

/// What selection looks at for one operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperandProfile {
    pub discrete: bool,
    pub range: ValueRange,
}

impl OperandProfile {
    #[must_use]
    pub fn of(operand: &LinearPolynomial) -> Self {
        Self {
            discrete: operand.discrete(),
            range: operand.range(),
        }
    }

    /// Discrete and confined to `[0, 1]`.
    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.discrete && self.range.within(&ValueRange::UNIT)
    }

    /// Provably nonzero on a non-negative domain.
    #[must_use]
    pub fn never_zero(&self) -> bool {
        self.range.lower() > TOLERANCE
    }

    /// Provably zero on a non-negative domain.
    #[must_use]
    pub fn always_zero(&self) -> bool {
        self.range.upper() <= TOLERANCE
    }
}

/// Encodings of the "is nonzero" indicator (Binaryzation and Not).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndicatorEncoding {
    /// Result known from bounds; no auxiliaries.
    Constant(f64),
    /// Operand is already 0/1-valued.
    Identity,
    /// `ub·y ≥ x`, plus `y ≤ x` when extracting.
    BigM,
    /// `x = ub·b`, `y ≥ b`, `y ≤ b/ε`.
    Weighted,
    /// Lambda-method ramp through `(0,0), (ε−δ,0), (ε,1), (ub,1)`.
    Piecewise,
}

#[must_use]
pub fn indicator(profile: &OperandProfile, config: &SymbolConfig) -> IndicatorEncoding {
    if profile.never_zero() {
        return IndicatorEncoding::Constant(1.0);
    }
    if profile.always_zero() && profile.range.lower() >= -TOLERANCE {
        return IndicatorEncoding::Constant(0.0);
    }
    if profile.is_binary() {
        return IndicatorEncoding::Identity;
    }
    if !profile.discrete && config.extract {
        return if config.prefers_piecewise() {
            IndicatorEncoding::Piecewise
        } else {
            IndicatorEncoding::Weighted
        };
    }
    IndicatorEncoding::BigM
}

/// Encodings of the sign function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TernaryEncoding {
    Constant(f64),
    /// Operand is already discrete within `[-1, 1]`.
    Identity,
    /// Two binaries `y₋, y₊` linked to the bounds.
    BigM,
    /// Weight pair `b` with epsilon guards.
    Weighted,
    /// Six-point ramp around zero.
    Piecewise,
}

#[must_use]
pub fn ternary(profile: &OperandProfile, config: &SymbolConfig) -> TernaryEncoding {
    let range = profile.range;
    if range.lower() > TOLERANCE {
        return TernaryEncoding::Constant(1.0);
    }
    if range.upper() < -TOLERANCE {
        return TernaryEncoding::Constant(-1.0);
    }
    if range.lower_is_zero() && range.upper_is_zero() {
        return TernaryEncoding::Constant(0.0);
    }
    if profile.discrete && range.within(&ValueRange::spanning(-1.0, 1.0)) {
        return TernaryEncoding::Identity;
    }
    if !profile.discrete && config.extract {
        let straddles = range.lower() < -config.epsilon && range.upper() > config.epsilon;
        return if config.prefers_piecewise() && straddles {
            TernaryEncoding::Piecewise
        } else {
            TernaryEncoding::Weighted
        };
    }
    TernaryEncoding::BigM
}

/// Encodings shared by the boolean connectives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogicEncoding {
    Constant(f64),
    /// One operand: its indicator is the result.
    Single,
    /// Every operand 0/1-valued: link `y` to the operands directly.
    Binary,
    /// Some operand needs its own indicator first.
    General,
}

/// Selection for `And`.
#[must_use]
pub fn conjunction(profiles: &[OperandProfile]) -> LogicEncoding {
    if profiles.iter().any(OperandProfile::always_zero) {
        return LogicEncoding::Constant(0.0);
    }
    if profiles.iter().all(OperandProfile::never_zero) {
        return LogicEncoding::Constant(1.0);
    }
    connective(profiles)
}

/// Selection for `Or`.
#[must_use]
pub fn disjunction(profiles: &[OperandProfile]) -> LogicEncoding {
    if profiles.iter().any(OperandProfile::never_zero) {
        return LogicEncoding::Constant(1.0);
    }
    if profiles.iter().all(OperandProfile::always_zero) {
        return LogicEncoding::Constant(0.0);
    }
    connective(profiles)
}

fn connective(profiles: &[OperandProfile]) -> LogicEncoding {
    if profiles.len() == 1 {
        LogicEncoding::Single
    } else if profiles.iter().all(OperandProfile::is_binary) {
        LogicEncoding::Binary
    } else {
        LogicEncoding::General
    }
}

/// Encodings of `Xor`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum XorEncoding {
    /// Fewer than two operands can never disagree.
    Constant(f64),
    /// One indicator per operand.
    PerOperand,
    /// Indicators of the exact maximum and the exact minimum.
    Extremes,
}

#[must_use]
pub fn xor(profiles: &[OperandProfile]) -> XorEncoding {
    let any_nonzero = profiles.iter().any(OperandProfile::never_zero);
    let any_zero = profiles.iter().any(OperandProfile::always_zero);
    match profiles.len() {
        0 | 1 => XorEncoding::Constant(0.0),
        _ if any_nonzero && any_zero => XorEncoding::Constant(1.0),
        _ if profiles.iter().all(OperandProfile::never_zero) => XorEncoding::Constant(0.0),
        _ if profiles.iter().all(OperandProfile::always_zero) => XorEncoding::Constant(0.0),
        2 => XorEncoding::PerOperand,
        _ => XorEncoding::Extremes,
    }
}

/// Encodings of the counting family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CountingEncoding {
    Constant(f64),
    /// No threshold: the value is the count itself.
    Numerable,
    /// Threshold 1.
    Disjunction,
    /// Threshold equal to the operand count.
    Conjunction,
    /// `y ≥ (Σu − k + 1)/n`, `y ≤ Σu/k`.
    Threshold,
}

/// Operands provably true and possibly true.
#[must_use]
pub fn amount_bounds(profiles: &[OperandProfile]) -> (usize, usize) {
    let min = profiles.iter().filter(|p| p.never_zero()).count();
    let max = profiles.iter().filter(|p| !p.always_zero()).count();
    (min, max)
}

#[must_use]
pub fn counting(profiles: &[OperandProfile], amount: Option<usize>) -> CountingEncoding {
    let Some(amount) = amount else {
        return CountingEncoding::Numerable;
    };
    let (min, max) = amount_bounds(profiles);
    if min >= amount {
        CountingEncoding::Constant(1.0)
    } else if max < amount {
        CountingEncoding::Constant(0.0)
    } else if amount == 1 {
        CountingEncoding::Disjunction
    } else if amount == profiles.len() {
        CountingEncoding::Conjunction
    } else {
        CountingEncoding::Threshold
    }
}

/// Encodings of the absolute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsEncoding {
    /// Operand is non-negative.
    Identity,
    /// Operand is non-positive.
    Negated,
    /// Positive and negative parts as scaled weights.
    Split,
}

#[must_use]
pub fn abs(range: &ValueRange) -> AbsEncoding {
    if range.lower() >= -TOLERANCE {
        AbsEncoding::Identity
    } else if range.upper() <= TOLERANCE {
        AbsEncoding::Negated
    } else {
        AbsEncoding::Split
    }
}

/// Encodings of `max(x, 0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReluEncoding {
    Identity,
    Zero,
    Binary,
}

#[must_use]
pub fn relu(range: &ValueRange) -> ReluEncoding {
    if range.lower() >= -TOLERANCE {
        ReluEncoding::Identity
    } else if range.upper() <= TOLERANCE {
        ReluEncoding::Zero
    } else {
        ReluEncoding::Binary
    }
}

/// Encodings of max/min.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtremumEncoding {
    /// A single operand is its own extremum.
    Identity,
    /// One-sided bound, valid inside a matching objective.
    Inexact,
    /// One selector binary per operand.
    Exact,
}

#[must_use]
pub fn extremum(operands: usize, exact: bool) -> ExtremumEncoding {
    if operands == 1 {
        ExtremumEncoding::Identity
    } else if exact {
        ExtremumEncoding::Exact
    } else {
        ExtremumEncoding::Inexact
    }
}
