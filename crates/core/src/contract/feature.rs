//! Typed feature values and comparators
//!
//! A feature is the leaf of a contract tree. On the demand side it carries a
//! constraint, on the provision side a value (or nothing, for a *dynamic*
//! provision whose value is fixed later).
//!
//! ## Comparator Semantics
//!
//! All comparators read as `comparator(provided, demanded)`:
//!
//! | Comparator | Holds when |
//! |------------|------------|
//! | `GreaterThan` | provided > demanded |
//! | `GreaterEqual` | provided >= demanded |
//! | `Equal` | provided == demanded |
//! | `LessEqual` | provided <= demanded |
//! | `LessThan` | provided < demanded |
//! | `InRange` | min <= provided <= max |
//! | `OutOfRange` | provided < min or provided > max |
//!
//! Values of different types never compare. Booleans order `false < true`,
//! strings order lexicographically.

use crate::error::{PlexusError, PlexusResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Declared type of a feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureType {
    /// `bool`
    Boolean,
    /// 32-bit signed integer
    Integer,
    /// 64-bit signed integer
    Long,
    /// UTF-8 string
    String,
}

impl FeatureType {
    /// Display name
    pub const fn name(&self) -> &'static str {
        match self {
            FeatureType::Boolean => "Boolean",
            FeatureType::Integer => "Integer",
            FeatureType::Long => "Long",
            FeatureType::String => "String",
        }
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed feature value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureValue {
    /// Boolean value
    Boolean(bool),
    /// 32-bit signed integer
    Integer(i32),
    /// 64-bit signed integer
    Long(i64),
    /// UTF-8 string
    String(String),
}

impl FeatureValue {
    /// The type of this value
    pub fn feature_type(&self) -> FeatureType {
        match self {
            FeatureValue::Boolean(_) => FeatureType::Boolean,
            FeatureValue::Integer(_) => FeatureType::Integer,
            FeatureValue::Long(_) => FeatureType::Long,
            FeatureValue::String(_) => FeatureType::String,
        }
    }

    /// Compare two values of the same type
    ///
    /// Returns None when the types differ.
    pub fn compare(&self, other: &FeatureValue) -> Option<Ordering> {
        match (self, other) {
            (FeatureValue::Boolean(a), FeatureValue::Boolean(b)) => Some(a.cmp(b)),
            (FeatureValue::Integer(a), FeatureValue::Integer(b)) => Some(a.cmp(b)),
            (FeatureValue::Long(a), FeatureValue::Long(b)) => Some(a.cmp(b)),
            (FeatureValue::String(a), FeatureValue::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Numeric view of integer values, used for capacity accounting
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FeatureValue::Integer(v) => Some(i64::from(*v)),
            FeatureValue::Long(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Boolean(v) => write!(f, "{}", v),
            FeatureValue::Integer(v) => write!(f, "{}", v),
            FeatureValue::Long(v) => write!(f, "{}L", v),
            FeatureValue::String(v) => write!(f, "\"{}\"", v),
        }
    }
}

impl From<bool> for FeatureValue {
    fn from(v: bool) -> Self {
        FeatureValue::Boolean(v)
    }
}

impl From<i32> for FeatureValue {
    fn from(v: i32) -> Self {
        FeatureValue::Integer(v)
    }
}

impl From<i64> for FeatureValue {
    fn from(v: i64) -> Self {
        FeatureValue::Long(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::String(v.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        FeatureValue::String(v)
    }
}

/// Feature comparator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    /// provided > demanded
    GreaterThan,
    /// provided >= demanded
    GreaterEqual,
    /// provided == demanded
    Equal,
    /// provided <= demanded
    LessEqual,
    /// provided < demanded
    LessThan,
    /// min <= provided <= max
    InRange,
    /// provided outside [min, max]
    OutOfRange,
}

impl Comparator {
    /// All comparators
    pub const ALL: [Comparator; 7] = [
        Comparator::GreaterThan,
        Comparator::GreaterEqual,
        Comparator::Equal,
        Comparator::LessEqual,
        Comparator::LessThan,
        Comparator::InRange,
        Comparator::OutOfRange,
    ];

    /// Whether this comparator takes a `[min, max]` pair
    pub const fn is_range(&self) -> bool {
        matches!(self, Comparator::InRange | Comparator::OutOfRange)
    }

    /// Short symbol (`gt`, `ge`, `eq`, `le`, `lt`, `in`, `out`)
    pub const fn symbol(&self) -> &'static str {
        match self {
            Comparator::GreaterThan => "gt",
            Comparator::GreaterEqual => "ge",
            Comparator::Equal => "eq",
            Comparator::LessEqual => "le",
            Comparator::LessThan => "lt",
            Comparator::InRange => "in",
            Comparator::OutOfRange => "out",
        }
    }

    /// Parse a short symbol
    pub fn from_symbol(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.symbol() == s)
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Constraint shape of a feature demand
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Constraint {
    /// Comparator plus a single value
    Simple {
        /// Simple comparator
        comparator: Comparator,
        /// Demanded value
        value: FeatureValue,
    },
    /// Comparator plus inclusive bounds
    Range {
        /// Range comparator
        comparator: Comparator,
        /// Lower bound
        min: FeatureValue,
        /// Upper bound
        max: FeatureValue,
    },
}

impl Constraint {
    /// The comparator of this constraint
    pub fn comparator(&self) -> Comparator {
        match self {
            Constraint::Simple { comparator, .. } | Constraint::Range { comparator, .. } => {
                *comparator
            }
        }
    }
}

fn type_check(feature_type: FeatureType, value: &FeatureValue) -> PlexusResult<()> {
    if value.feature_type() != feature_type {
        return Err(PlexusError::FeatureTypeMismatch {
            feature: String::new(),
            expected: feature_type.name(),
            actual: value.feature_type().name(),
        });
    }
    Ok(())
}

/// Demand-side feature: a typed constraint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureDemand {
    feature_type: FeatureType,
    constraint: Constraint,
}

impl FeatureDemand {
    /// Create a demand after checking the constraint against the declared type
    ///
    /// # Errors
    /// - `InvalidComparator` if a range comparator is used with a single value
    ///   or a simple comparator with bounds
    /// - `FeatureTypeMismatch` if a value does not have `feature_type`
    /// - `InvalidRange` if `min > max`
    pub fn new(feature_type: FeatureType, constraint: Constraint) -> PlexusResult<Self> {
        match &constraint {
            Constraint::Simple { comparator, value } => {
                if comparator.is_range() {
                    return Err(PlexusError::InvalidComparator(format!(
                        "{} needs a minimum and a maximum",
                        comparator
                    )));
                }
                type_check(feature_type, value)?;
            }
            Constraint::Range {
                comparator,
                min,
                max,
            } => {
                if !comparator.is_range() {
                    return Err(PlexusError::InvalidComparator(format!(
                        "{} takes a single value",
                        comparator
                    )));
                }
                type_check(feature_type, min)?;
                type_check(feature_type, max)?;
                if min.compare(max) == Some(Ordering::Greater) {
                    return Err(PlexusError::InvalidRange(format!("{} > {}", min, max)));
                }
            }
        }
        Ok(Self {
            feature_type,
            constraint,
        })
    }

    /// Simple demand; the type is taken from the value
    pub fn simple(comparator: Comparator, value: impl Into<FeatureValue>) -> PlexusResult<Self> {
        let value = value.into();
        Self::new(value.feature_type(), Constraint::Simple { comparator, value })
    }

    /// Range demand; the type is taken from `min`
    pub fn range(
        comparator: Comparator,
        min: impl Into<FeatureValue>,
        max: impl Into<FeatureValue>,
    ) -> PlexusResult<Self> {
        let min = min.into();
        let max = max.into();
        Self::new(
            min.feature_type(),
            Constraint::Range {
                comparator,
                min,
                max,
            },
        )
    }

    /// Declared type
    pub fn feature_type(&self) -> FeatureType {
        self.feature_type
    }

    /// The constraint
    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    /// Comparator of the constraint
    pub fn comparator(&self) -> Comparator {
        self.constraint.comparator()
    }

    /// Re-run the constructor checks (after deserialization)
    pub fn validate(&self) -> PlexusResult<()> {
        Self::new(self.feature_type, self.constraint.clone()).map(|_| ())
    }

    /// Evaluate `comparator(provided, demanded)`
    ///
    /// Dynamic provisions always satisfy the demand. A provision of another
    /// type never does.
    pub fn accepts(&self, provision: &FeatureProvision) -> bool {
        if provision.feature_type() != self.feature_type {
            return false;
        }
        match provision.value() {
            None => true,
            Some(provided) => self.accepts_value(provided),
        }
    }

    /// Evaluate the constraint against a concrete value
    pub fn accepts_value(&self, provided: &FeatureValue) -> bool {
        match &self.constraint {
            Constraint::Simple { comparator, value } => {
                let ord = match provided.compare(value) {
                    Some(ord) => ord,
                    None => return false,
                };
                match comparator {
                    Comparator::GreaterThan => ord == Ordering::Greater,
                    Comparator::GreaterEqual => ord != Ordering::Less,
                    Comparator::Equal => ord == Ordering::Equal,
                    Comparator::LessEqual => ord != Ordering::Greater,
                    Comparator::LessThan => ord == Ordering::Less,
                    Comparator::InRange | Comparator::OutOfRange => false,
                }
            }
            Constraint::Range {
                comparator,
                min,
                max,
            } => {
                let (lo, hi) = match (provided.compare(min), provided.compare(max)) {
                    (Some(lo), Some(hi)) => (lo, hi),
                    _ => return false,
                };
                let inside = lo != Ordering::Less && hi != Ordering::Greater;
                match comparator {
                    Comparator::InRange => inside,
                    Comparator::OutOfRange => !inside,
                    _ => false,
                }
            }
        }
    }
}

/// Provision-side feature: a typed value, or dynamic
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureProvision {
    feature_type: FeatureType,
    value: Option<FeatureValue>,
}

impl FeatureProvision {
    /// Create a provision, checking the value against the declared type
    pub fn new(feature_type: FeatureType, value: Option<FeatureValue>) -> PlexusResult<Self> {
        if let Some(v) = &value {
            type_check(feature_type, v)?;
        }
        Ok(Self {
            feature_type,
            value,
        })
    }

    /// Provision of a concrete value
    pub fn value_of(value: impl Into<FeatureValue>) -> Self {
        let value = value.into();
        Self {
            feature_type: value.feature_type(),
            value: Some(value),
        }
    }

    /// Dynamic provision: no value yet, matches every demand of its type
    pub fn dynamic(feature_type: FeatureType) -> Self {
        Self {
            feature_type,
            value: None,
        }
    }

    /// Declared type
    pub fn feature_type(&self) -> FeatureType {
        self.feature_type
    }

    /// Provided value, None when dynamic
    pub fn value(&self) -> Option<&FeatureValue> {
        self.value.as_ref()
    }

    /// Whether the value is still open
    pub fn is_dynamic(&self) -> bool {
        self.value.is_none()
    }

    /// Re-run the constructor checks (after deserialization)
    pub fn validate(&self) -> PlexusResult<()> {
        Self::new(self.feature_type, self.value.clone()).map(|_| ())
    }
}

/// Payload of a feature node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    /// Demand-side constraint
    Demand(FeatureDemand),
    /// Provision-side value
    Provision(FeatureProvision),
}

impl Feature {
    /// Declared type
    pub fn feature_type(&self) -> FeatureType {
        match self {
            Feature::Demand(d) => d.feature_type(),
            Feature::Provision(p) => p.feature_type(),
        }
    }
}
