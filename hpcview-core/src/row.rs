//! Key/value pairs and rows returned by rowset fetches.

use crate::error::PropertyError;
use crate::property::PropertyId;
use crate::value::PropertyValue;
use std::collections::HashMap;

/// A property together with its (nullable) value.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreProperty {
    pub id: PropertyId,
    pub value: Option<PropertyValue>,
}

impl StoreProperty {
    /// Create a property, checking the value against the declared type.
    pub fn new(id: PropertyId, value: Option<PropertyValue>) -> Result<Self, PropertyError> {
        if let Some(v) = &value {
            if !v.matches_type(id.value_type()) {
                return Err(PropertyError::TypeMismatch {
                    property: id.name().to_string(),
                    expected: id.value_type(),
                    got: v.type_name(),
                });
            }
        }
        Ok(Self { id, value })
    }

    pub fn null(id: PropertyId) -> Self {
        Self { id, value: None }
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }
}

/// Ordered sequence of properties with an optional id→position index.
///
/// Rows come out of the protocol client; consumers only read them, apart
/// from post-processing (object substitution and property de-conversion).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyRow {
    props: Vec<StoreProperty>,
    index: Option<HashMap<i32, usize>>,
}

impl PropertyRow {
    pub fn new(props: Vec<StoreProperty>) -> Self {
        Self { props, index: None }
    }

    /// Create a row and build its lookup index immediately.
    pub fn indexed(props: Vec<StoreProperty>) -> Self {
        let mut row = Self::new(props);
        row.build_index();
        row
    }

    pub fn build_index(&mut self) {
        let mut index = HashMap::with_capacity(self.props.len());
        for (pos, prop) in self.props.iter().enumerate() {
            index.entry(prop.id.unique_id()).or_insert(pos);
        }
        self.index = Some(index);
    }

    pub fn is_indexed(&self) -> bool {
        self.index.is_some()
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    pub fn props(&self) -> &[StoreProperty] {
        &self.props
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoreProperty> {
        self.props.iter()
    }

    pub fn into_props(self) -> Vec<StoreProperty> {
        self.props
    }

    pub fn position(&self, id: &PropertyId) -> Option<usize> {
        match &self.index {
            Some(index) => index.get(&id.unique_id()).copied(),
            None => self.props.iter().position(|p| p.id == *id),
        }
    }

    pub fn get(&self, id: &PropertyId) -> Option<&StoreProperty> {
        self.position(id).map(|pos| &self.props[pos])
    }

    /// Value of `id`, flattening "absent" and "null" into `None`.
    pub fn value(&self, id: &PropertyId) -> Option<&PropertyValue> {
        self.get(id).and_then(|p| p.value.as_ref())
    }

    pub fn contains(&self, id: &PropertyId) -> bool {
        self.position(id).is_some()
    }

    pub fn get_at(&self, pos: usize) -> Option<&StoreProperty> {
        self.props.get(pos)
    }

    /// Replace the value of an existing property or append it.
    pub fn set(&mut self, prop: StoreProperty) {
        match self.position(&prop.id) {
            Some(pos) => self.props[pos] = prop,
            None => {
                if let Some(index) = &mut self.index {
                    index.insert(prop.id.unique_id(), self.props.len());
                }
                self.props.push(prop);
            }
        }
    }

    /// Insert at a position, shifting later properties.
    pub fn insert(&mut self, pos: usize, prop: StoreProperty) {
        let pos = pos.min(self.props.len());
        self.props.insert(pos, prop);
        if self.index.is_some() {
            self.build_index();
        }
    }

    /// Keep only properties for which `keep` returns true.
    pub fn retain(&mut self, keep: impl FnMut(&StoreProperty) -> bool) {
        self.props.retain(keep);
        if self.index.is_some() {
            self.build_index();
        }
    }
}

impl FromIterator<StoreProperty> for PropertyRow {
    fn from_iter<T: IntoIterator<Item = StoreProperty>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for PropertyRow {
    type Item = StoreProperty;
    type IntoIter = std::vec::IntoIter<StoreProperty>;

    fn into_iter(self) -> Self::IntoIter {
        self.props.into_iter()
    }
}
