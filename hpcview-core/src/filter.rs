//! Filter and sort specifications for rowset queries
//!
//! The same `FilterProperty` is sent to the server and evaluated locally
//! (compatibility rewriting, in-memory services, pushed-row checks).

use crate::property::PropertyId;
use crate::row::PropertyRow;
use crate::value::PropertyValue;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Filter operator for property comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOperator {
    /// Equal to
    Equal,
    /// Not equal to
    NotEqual,
    /// Greater than
    GreaterThan,
    /// Greater than or equal
    GreaterThanOrEqual,
    /// Less than
    LessThan,
    /// Less than or equal
    LessThanOrEqual,
    /// All bits of the operand are set
    HasBitSet,
    /// None of the bits of the operand are set
    HasNoBitSet,
    /// Value is null
    IsNull,
    /// Value is not null
    IsNotNull,
    /// Value is one of a set
    In,
    /// String prefix match
    StartsWith,
}

impl FilterOperator {
    /// Integer tag sent to the remote rowset service.
    pub fn as_i32(&self) -> i32 {
        match self {
            FilterOperator::Equal => 1,
            FilterOperator::NotEqual => 2,
            FilterOperator::GreaterThan => 3,
            FilterOperator::GreaterThanOrEqual => 4,
            FilterOperator::LessThan => 5,
            FilterOperator::LessThanOrEqual => 6,
            FilterOperator::HasBitSet => 7,
            FilterOperator::HasNoBitSet => 8,
            FilterOperator::IsNull => 9,
            FilterOperator::IsNotNull => 10,
            FilterOperator::In => 11,
            FilterOperator::StartsWith => 12,
        }
    }

    /// Operators that take no operand.
    pub fn is_unary(&self) -> bool {
        matches!(self, FilterOperator::IsNull | FilterOperator::IsNotNull)
    }
}

/// Operand of a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterValue {
    None,
    Single(PropertyValue),
    Set(Vec<PropertyValue>),
}

/// One filter clause: `property <operator> value`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterProperty {
    pub operator: FilterOperator,
    pub property: PropertyId,
    pub value: FilterValue,
}

impl FilterProperty {
    /// Create a new filter clause.
    pub fn new(operator: FilterOperator, property: PropertyId, value: FilterValue) -> Self {
        Self {
            operator,
            property,
            value,
        }
    }

    /// Create an equality filter.
    pub fn equal(property: PropertyId, value: impl Into<PropertyValue>) -> Self {
        Self::new(FilterOperator::Equal, property, FilterValue::Single(value.into()))
    }

    pub fn not_equal(property: PropertyId, value: impl Into<PropertyValue>) -> Self {
        Self::new(
            FilterOperator::NotEqual,
            property,
            FilterValue::Single(value.into()),
        )
    }

    pub fn compare(
        operator: FilterOperator,
        property: PropertyId,
        value: impl Into<PropertyValue>,
    ) -> Self {
        Self::new(operator, property, FilterValue::Single(value.into()))
    }

    pub fn is_null(property: PropertyId) -> Self {
        Self::new(FilterOperator::IsNull, property, FilterValue::None)
    }

    pub fn is_not_null(property: PropertyId) -> Self {
        Self::new(FilterOperator::IsNotNull, property, FilterValue::None)
    }

    /// Create an in-set filter.
    pub fn in_set(property: PropertyId, values: Vec<PropertyValue>) -> Self {
        Self::new(FilterOperator::In, property, FilterValue::Set(values))
    }

    pub fn starts_with(property: PropertyId, prefix: impl Into<String>) -> Self {
        Self::new(
            FilterOperator::StartsWith,
            property,
            FilterValue::Single(PropertyValue::String(prefix.into())),
        )
    }

    pub fn has_bits(property: PropertyId, mask: i32) -> Self {
        Self::new(
            FilterOperator::HasBitSet,
            property,
            FilterValue::Single(PropertyValue::Int32(mask)),
        )
    }

    /// Evaluate this clause against a row.
    pub fn matches_row(&self, row: &PropertyRow) -> bool {
        self.matches(row.value(&self.property))
    }

    /// Evaluate this clause against a single value.
    ///
    /// Comparisons between values of different types never match.
    pub fn matches(&self, value: Option<&PropertyValue>) -> bool {
        match self.operator {
            FilterOperator::IsNull => return value.is_none(),
            FilterOperator::IsNotNull => return value.is_some(),
            _ => {}
        }
        let Some(value) = value else {
            return false;
        };
        match (&self.operator, &self.value) {
            (FilterOperator::In, FilterValue::Set(members)) => members
                .iter()
                .any(|m| value.compare(m) == Some(Ordering::Equal)),
            (FilterOperator::StartsWith, FilterValue::Single(PropertyValue::String(prefix))) => {
                value.as_str().is_some_and(|s| s.starts_with(prefix.as_str()))
            }
            (FilterOperator::HasBitSet, FilterValue::Single(mask)) => {
                match (value.as_bits(), mask.as_bits()) {
                    (Some(v), Some(m)) => v & m == m,
                    _ => false,
                }
            }
            (FilterOperator::HasNoBitSet, FilterValue::Single(mask)) => {
                match (value.as_bits(), mask.as_bits()) {
                    (Some(v), Some(m)) => v & m == 0,
                    _ => false,
                }
            }
            (op, FilterValue::Single(operand)) => {
                let Some(ord) = value.compare(operand) else {
                    return false;
                };
                match op {
                    FilterOperator::Equal => ord == Ordering::Equal,
                    FilterOperator::NotEqual => ord != Ordering::Equal,
                    FilterOperator::GreaterThan => ord == Ordering::Greater,
                    FilterOperator::GreaterThanOrEqual => ord != Ordering::Less,
                    FilterOperator::LessThan => ord == Ordering::Less,
                    FilterOperator::LessThanOrEqual => ord != Ordering::Greater,
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortProperty {
    pub property: PropertyId,
    pub order: SortOrder,
}

impl SortProperty {
    pub fn ascending(property: PropertyId) -> Self {
        Self {
            property,
            order: SortOrder::Ascending,
        }
    }

    pub fn descending(property: PropertyId) -> Self {
        Self {
            property,
            order: SortOrder::Descending,
        }
    }

    /// Order two rows by this key; nulls sort first in ascending order.
    pub fn compare_rows(&self, a: &PropertyRow, b: &PropertyRow) -> Ordering {
        let ord = match (a.value(&self.property), b.value(&self.property)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.compare(y).unwrap_or(Ordering::Equal),
        };
        match self.order {
            SortOrder::Ascending => ord,
            SortOrder::Descending => ord.reverse(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{PropertyFlags, PropertyType};
    use crate::row::StoreProperty;

    fn int_prop() -> PropertyId {
        PropertyId::new(10, "Count", PropertyType::Int32, PropertyFlags::empty())
    }

    #[test]
    fn test_comparison_operators() {
        let v = PropertyValue::Int32(5);
        let p = int_prop();
        assert!(FilterProperty::equal(p.clone(), 5).matches(Some(&v)));
        assert!(FilterProperty::not_equal(p.clone(), 4).matches(Some(&v)));
        assert!(FilterProperty::compare(FilterOperator::GreaterThan, p.clone(), 4).matches(Some(&v)));
        assert!(FilterProperty::compare(FilterOperator::LessThanOrEqual, p.clone(), 5).matches(Some(&v)));
        assert!(!FilterProperty::compare(FilterOperator::LessThan, p, 5).matches(Some(&v)));
    }

    #[test]
    fn test_null_operators() {
        let p = int_prop();
        assert!(FilterProperty::is_null(p.clone()).matches(None));
        assert!(!FilterProperty::is_null(p.clone()).matches(Some(&PropertyValue::Int32(0))));
        assert!(FilterProperty::is_not_null(p.clone()).matches(Some(&PropertyValue::Int32(0))));
        assert!(!FilterProperty::equal(p, 0).matches(None));
    }

    #[test]
    fn test_in_set_with_mismatched_member_types_does_not_match() {
        let p = int_prop();
        let filter = FilterProperty::in_set(
            p,
            vec![PropertyValue::Int64(5), PropertyValue::String("5".into())],
        );
        assert!(!filter.matches(Some(&PropertyValue::Int32(5))));

        let filter = FilterProperty::in_set(
            int_prop(),
            vec![PropertyValue::Int64(5), PropertyValue::Int32(5)],
        );
        assert!(filter.matches(Some(&PropertyValue::Int32(5))));
    }

    #[test]
    fn test_bit_operators() {
        let p = int_prop();
        let v = PropertyValue::Int32(0b1010);
        assert!(FilterProperty::has_bits(p.clone(), 0b1000).matches(Some(&v)));
        assert!(!FilterProperty::has_bits(p.clone(), 0b0100).matches(Some(&v)));
        let none = FilterProperty::compare(FilterOperator::HasNoBitSet, p, 0b0101);
        assert!(none.matches(Some(&v)));
    }

    #[test]
    fn test_starts_with() {
        let p = PropertyId::new(11, "Name", PropertyType::String, PropertyFlags::empty());
        let f = FilterProperty::starts_with(p, "job-");
        assert!(f.matches(Some(&"job-42".into())));
        assert!(!f.matches(Some(&"task-1".into())));
        assert!(!f.matches(Some(&PropertyValue::Int32(1))));
    }

    #[test]
    fn test_sort_nulls_first_ascending() {
        let p = int_prop();
        let a = PropertyRow::new(vec![StoreProperty::null(p.clone())]);
        let b = PropertyRow::new(vec![
            StoreProperty::new(p.clone(), Some(PropertyValue::Int32(1))).unwrap(),
        ]);
        assert_eq!(SortProperty::ascending(p.clone()).compare_rows(&a, &b), Ordering::Less);
        assert_eq!(SortProperty::descending(p).compare_rows(&a, &b), Ordering::Greater);
    }
}
