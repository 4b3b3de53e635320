//! Decision variables.
//!
//! A [`Variable`] is a cheap shared handle. Its identity (id and name) never
//! changes; its range may be tightened by the symbol that owns it.

use std::cell::Cell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::range::ValueRange;

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// Process-unique variable identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(usize);

impl VariableId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Domain of a decision variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    /// `{0, 1}`.
    Binary,
    /// Any integer.
    Integer,
    /// Non-negative integer.
    UInteger,
    /// Any real.
    Real,
    /// Non-negative real.
    UReal,
    /// Real in `[0, 1]`, used as a convex-combination weight.
    Percentage,
}

impl VariableKind {
    /// True for kinds restricted to integral values.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            VariableKind::Binary | VariableKind::Integer | VariableKind::UInteger
        )
    }

    /// The widest range allowed by the kind.
    #[must_use]
    pub const fn natural_range(self) -> ValueRange {
        match self {
            VariableKind::Binary | VariableKind::Percentage => ValueRange::UNIT,
            VariableKind::UInteger | VariableKind::UReal => ValueRange::NON_NEGATIVE,
            VariableKind::Integer | VariableKind::Real => ValueRange::UNBOUNDED,
        }
    }
}

struct Inner {
    id: VariableId,
    name: String,
    kind: VariableKind,
    range: Cell<ValueRange>,
}

/// Shared handle to a decision variable.
#[derive(Clone)]
pub struct Variable(Rc<Inner>);

impl Variable {
    /// Create a variable with the natural range of its kind.
    pub fn new(name: impl Into<String>, kind: VariableKind) -> Self {
        Self(Rc::new(Inner {
            id: VariableId::next(),
            name: name.into(),
            kind,
            range: Cell::new(kind.natural_range()),
        }))
    }

    pub fn binary(name: impl Into<String>) -> Self {
        Self::new(name, VariableKind::Binary)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, VariableKind::Integer)
    }

    pub fn uinteger(name: impl Into<String>) -> Self {
        Self::new(name, VariableKind::UInteger)
    }

    pub fn real(name: impl Into<String>) -> Self {
        Self::new(name, VariableKind::Real)
    }

    pub fn ureal(name: impl Into<String>) -> Self {
        Self::new(name, VariableKind::UReal)
    }

    pub fn percentage(name: impl Into<String>) -> Self {
        Self::new(name, VariableKind::Percentage)
    }

    /// Builder form of [`Variable::set_range`].
    #[must_use]
    pub fn with_range(self, lower: f64, upper: f64) -> Self {
        if let Some(range) = ValueRange::new(lower, upper) {
            self.set_range(range);
        }
        self
    }

    #[must_use]
    pub fn id(&self) -> VariableId {
        self.0.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[must_use]
    pub fn kind(&self) -> VariableKind {
        self.0.kind
    }

    #[must_use]
    pub fn range(&self) -> ValueRange {
        self.0.range.get()
    }

    #[must_use]
    pub fn lower_bound(&self) -> f64 {
        self.range().lower()
    }

    #[must_use]
    pub fn upper_bound(&self) -> f64 {
        self.range().upper()
    }

    #[must_use]
    pub fn discrete(&self) -> bool {
        self.0.kind.is_integer()
    }

    /// Replace the range, clamped to the kind's natural range and rounded
    /// inward for integer kinds. An empty intersection leaves the range as is.
    pub fn set_range(&self, range: ValueRange) {
        let Some(clamped) = range.intersect(&self.0.kind.natural_range()) else {
            return;
        };
        let clamped = if self.discrete() {
            clamped.integral()
        } else {
            clamped
        };
        self.0.range.set(clamped);
    }

    /// Tighten the upper end only.
    pub fn set_upper(&self, upper: f64) {
        if let Some(range) = ValueRange::new(self.lower_bound(), upper) {
            self.set_range(range);
        }
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Variable {}

impl Hash for Variable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.0.name, self.range())
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_have_natural_ranges() {
        assert_eq!(Variable::binary("b").range(), ValueRange::UNIT);
        assert_eq!(Variable::ureal("u").lower_bound(), 0.0);
        assert_eq!(Variable::integer("i").range(), ValueRange::UNBOUNDED);
    }

    #[test]
    fn test_set_range_clamps_to_kind() {
        let p = Variable::percentage("p").with_range(-1.0, 0.5);
        assert_eq!(p.range(), ValueRange::new(0.0, 0.5).unwrap());
    }

    #[test]
    fn test_integer_range_rounds_inward() {
        let q = Variable::integer("q").with_range(-0.5, 3.5);
        assert_eq!(q.range(), ValueRange::new(0.0, 3.0).unwrap());
    }

    #[test]
    fn test_clones_share_identity_and_range() {
        let x = Variable::real("x");
        let alias = x.clone();
        alias.set_range(ValueRange::new(1.0, 2.0).unwrap());
        assert_eq!(x, alias);
        assert_eq!(x.upper_bound(), 2.0);
        assert_ne!(x, Variable::real("x"));
    }
}
