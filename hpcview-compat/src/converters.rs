//! Concrete converters used by the standard registry.

use crate::converter::PropertyConverter;
use hpcview_core::error::CompatError;
use hpcview_core::filter::{FilterOperator, FilterProperty, FilterValue, SortProperty};
use hpcview_core::property::PropertyId;
use hpcview_core::row::StoreProperty;
use hpcview_core::value::{PropertyValue, TaskIdentifier};
use hpcview_core::version::ServerVersion;

// ============================================================================
// RENAME
// ============================================================================

/// Same value under a different id on older servers.
#[derive(Debug)]
pub struct RenameConverter {
    client: PropertyId,
    server: [PropertyId; 1],
}

impl RenameConverter {
    pub fn new(client: PropertyId, server: PropertyId) -> Self {
        Self {
            client,
            server: [server],
        }
    }
}

impl PropertyConverter for RenameConverter {
    fn client_property(&self) -> &PropertyId {
        &self.client
    }

    fn server_properties(&self) -> &[PropertyId] {
        &self.server
    }

    fn to_client(&self, values: &[Option<&PropertyValue>]) -> Option<PropertyValue> {
        values.first().copied().flatten().cloned()
    }

    fn to_server(
        &self,
        value: Option<&PropertyValue>,
        _current: &[Option<&PropertyValue>],
    ) -> Result<Vec<StoreProperty>, CompatError> {
        Ok(vec![StoreProperty {
            id: self.server[0].clone(),
            value: value.cloned(),
        }])
    }

    fn convert_filter(
        &self,
        filter: &FilterProperty,
        _version: ServerVersion,
    ) -> Result<Vec<FilterProperty>, CompatError> {
        Ok(vec![FilterProperty::new(
            filter.operator,
            self.server[0].clone(),
            filter.value.clone(),
        )])
    }

    fn convert_sort(
        &self,
        sort: &SortProperty,
        _version: ServerVersion,
    ) -> Result<Vec<SortProperty>, CompatError> {
        Ok(vec![SortProperty {
            property: self.server[0].clone(),
            order: sort.order,
        }])
    }
}

// ============================================================================
// TASK IDENTIFIER
// ============================================================================

/// Composite task id built from parent job id, job task id and instance id.
///
/// The instance id is optional: plain (non-sweep) tasks have instance 0.
#[derive(Debug)]
pub struct TaskIdConverter {
    client: PropertyId,
    server: [PropertyId; 3],
}

impl TaskIdConverter {
    pub fn new(
        client: PropertyId,
        parent_job_id: PropertyId,
        job_task_id: PropertyId,
        instance_id: PropertyId,
    ) -> Self {
        Self {
            client,
            server: [parent_job_id, job_task_id, instance_id],
        }
    }

    fn unsupported(&self, version: ServerVersion) -> CompatError {
        CompatError::FilterUnsupported {
            property: self.client.name().to_string(),
            version,
        }
    }
}

impl PropertyConverter for TaskIdConverter {
    fn client_property(&self) -> &PropertyId {
        &self.client
    }

    fn server_properties(&self) -> &[PropertyId] {
        &self.server
    }

    fn required_properties(&self) -> &[PropertyId] {
        &self.server[..2]
    }

    fn to_client(&self, values: &[Option<&PropertyValue>]) -> Option<PropertyValue> {
        let part = |i: usize| values.get(i).copied().flatten().and_then(|v| v.as_i32());
        let parent_job_id = part(0)?;
        let job_task_id = part(1)?;
        let instance_id = part(2).unwrap_or(0);
        Some(PropertyValue::TaskId(TaskIdentifier::new(
            parent_job_id,
            job_task_id,
            instance_id,
        )))
    }

    fn to_server(
        &self,
        value: Option<&PropertyValue>,
        _current: &[Option<&PropertyValue>],
    ) -> Result<Vec<StoreProperty>, CompatError> {
        let parts = match value {
            Some(PropertyValue::TaskId(id)) => [
                Some(id.parent_job_id),
                Some(id.job_task_id),
                Some(id.instance_id),
            ],
            _ => [None, None, None],
        };
        Ok(self
            .server
            .iter()
            .zip(parts)
            .map(|(id, part)| StoreProperty {
                id: id.clone(),
                value: part.map(PropertyValue::Int32),
            })
            .collect())
    }

    /// Equality only; the server combines clauses with AND.
    fn convert_filter(
        &self,
        filter: &FilterProperty,
        version: ServerVersion,
    ) -> Result<Vec<FilterProperty>, CompatError> {
        match (&filter.operator, &filter.value) {
            (FilterOperator::Equal, FilterValue::Single(PropertyValue::TaskId(id))) => Ok(vec![
                FilterProperty::equal(self.server[0].clone(), id.parent_job_id),
                FilterProperty::equal(self.server[1].clone(), id.job_task_id),
                FilterProperty::equal(self.server[2].clone(), id.instance_id),
            ]),
            (FilterOperator::IsNull, _) | (FilterOperator::IsNotNull, _) => Ok(vec![
                FilterProperty::new(filter.operator, self.server[0].clone(), FilterValue::None),
            ]),
            _ => Err(self.unsupported(version)),
        }
    }

    fn convert_sort(
        &self,
        sort: &SortProperty,
        _version: ServerVersion,
    ) -> Result<Vec<SortProperty>, CompatError> {
        Ok(self
            .server
            .iter()
            .map(|id| SortProperty {
                property: id.clone(),
                order: sort.order,
            })
            .collect())
    }
}

// ============================================================================
// BIT FLAG
// ============================================================================

/// Boolean carried as one bit of a legacy int32 mask.
///
/// A set-request rewrites the whole mask, so it needs the server's current
/// mask and only flips this flag's bit in it. Flags sharing a mask in one
/// request see each other's pending writes through
/// [`expand_sets`](crate::PropertyCompatibility::expand_sets).
#[derive(Debug)]
pub struct BitFlagConverter {
    client: PropertyId,
    server: [PropertyId; 1],
    bit: i32,
}

impl BitFlagConverter {
    pub fn new(client: PropertyId, mask: PropertyId, bit: i32) -> Self {
        Self {
            client,
            server: [mask],
            bit,
        }
    }

    pub fn bit(&self) -> i32 {
        self.bit
    }
}

impl PropertyConverter for BitFlagConverter {
    fn client_property(&self) -> &PropertyId {
        &self.client
    }

    fn server_properties(&self) -> &[PropertyId] {
        &self.server
    }

    fn to_client(&self, values: &[Option<&PropertyValue>]) -> Option<PropertyValue> {
        let mask = values.first().copied().flatten()?.as_i32()?;
        Some(PropertyValue::Bool(mask & self.bit != 0))
    }

    fn to_server(
        &self,
        value: Option<&PropertyValue>,
        current: &[Option<&PropertyValue>],
    ) -> Result<Vec<StoreProperty>, CompatError> {
        let mask = current
            .first()
            .copied()
            .flatten()
            .and_then(PropertyValue::as_i32)
            .ok_or_else(|| CompatError::CurrentValueRequired {
                property: self.client.name().to_string(),
                server: self.server[0].name().to_string(),
            })?;
        let mask = match value.and_then(PropertyValue::as_bool) {
            Some(true) => mask | self.bit,
            _ => mask & !self.bit,
        };
        Ok(vec![StoreProperty {
            id: self.server[0].clone(),
            value: Some(PropertyValue::Int32(mask)),
        }])
    }

    fn convert_filter(
        &self,
        filter: &FilterProperty,
        version: ServerVersion,
    ) -> Result<Vec<FilterProperty>, CompatError> {
        let mask = self.server[0].clone();
        let wanted = match (&filter.operator, &filter.value) {
            (FilterOperator::Equal, FilterValue::Single(PropertyValue::Bool(b))) => *b,
            (FilterOperator::NotEqual, FilterValue::Single(PropertyValue::Bool(b))) => !*b,
            (FilterOperator::IsNull | FilterOperator::IsNotNull, _) => {
                return Ok(vec![FilterProperty::new(
                    filter.operator,
                    mask,
                    FilterValue::None,
                )]);
            }
            _ => {
                return Err(CompatError::FilterUnsupported {
                    property: self.client.name().to_string(),
                    version,
                })
            }
        };
        let operator = if wanted {
            FilterOperator::HasBitSet
        } else {
            FilterOperator::HasNoBitSet
        };
        Ok(vec![FilterProperty::new(
            operator,
            mask,
            FilterValue::Single(PropertyValue::Int32(self.bit)),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hpcview_core::filter::SortOrder;
    use hpcview_core::well_known;

    fn task_id_converter() -> TaskIdConverter {
        TaskIdConverter::new(
            well_known::TASK_TASK_ID.clone(),
            well_known::TASK_PARENT_JOB_ID.clone(),
            well_known::TASK_JOB_TASK_ID.clone(),
            well_known::TASK_INSTANCE_ID.clone(),
        )
    }

    #[test]
    fn test_rename_filter_and_sort() {
        let conv = RenameConverter::new(
            well_known::NODE_DESCRIPTION.clone(),
            well_known::NODE_COMMENT.clone(),
        );
        let filter = FilterProperty::starts_with(well_known::NODE_DESCRIPTION.clone(), "rack");
        let out = conv.convert_filter(&filter, ServerVersion::V2).unwrap();
        assert_eq!(out[0].property, *well_known::NODE_COMMENT);
        assert_eq!(out[0].operator, FilterOperator::StartsWith);

        let sort = SortProperty::descending(well_known::NODE_DESCRIPTION.clone());
        let out = conv.convert_sort(&sort, ServerVersion::V2).unwrap();
        assert_eq!(out[0].property, *well_known::NODE_COMMENT);
        assert_eq!(out[0].order, SortOrder::Descending);
    }

    #[test]
    fn test_task_id_required_subset() {
        let conv = task_id_converter();
        assert_eq!(conv.required_properties().len(), 2);
        let parent = PropertyValue::Int32(40);
        let task = PropertyValue::Int32(3);
        assert_eq!(
            conv.to_client(&[Some(&parent), Some(&task), None]),
            Some(PropertyValue::TaskId(TaskIdentifier::new(40, 3, 0)))
        );
        assert_eq!(conv.to_client(&[Some(&parent), None, None]), None);
    }

    #[test]
    fn test_task_id_to_server_and_filter() {
        let conv = task_id_converter();
        let id = TaskIdentifier::new(40, 3, 7);
        let sets = conv.to_server(Some(&PropertyValue::TaskId(id)), &[]).unwrap();
        let values: Vec<_> = sets.iter().map(|s| s.value.clone()).collect();
        assert_eq!(
            values,
            vec![
                Some(PropertyValue::Int32(40)),
                Some(PropertyValue::Int32(3)),
                Some(PropertyValue::Int32(7))
            ]
        );

        let filter = FilterProperty::equal(well_known::TASK_TASK_ID.clone(), id);
        assert_eq!(conv.convert_filter(&filter, ServerVersion::V2).unwrap().len(), 3);

        let range = FilterProperty::compare(
            FilterOperator::GreaterThan,
            well_known::TASK_TASK_ID.clone(),
            id,
        );
        assert!(conv.convert_filter(&range, ServerVersion::V2).is_err());
    }

    #[test]
    fn test_bit_flag_round_trip_and_filters() {
        let conv = BitFlagConverter::new(
            well_known::JOB_IS_EXCLUSIVE.clone(),
            well_known::JOB_FLAGS.clone(),
            0x1,
        );
        let mask = PropertyValue::Int32(0b101);
        assert_eq!(conv.to_client(&[Some(&mask)]), Some(PropertyValue::Bool(true)));
        assert_eq!(conv.to_client(&[None]), None);

        let sets = conv.to_server(Some(&PropertyValue::Bool(true)), &[Some(&mask)]).unwrap();
        assert_eq!(sets[0].value, Some(PropertyValue::Int32(0b101)));

        let eq_false = FilterProperty::equal(well_known::JOB_IS_EXCLUSIVE.clone(), false);
        let out = conv.convert_filter(&eq_false, ServerVersion::V2).unwrap();
        assert_eq!(out[0].operator, FilterOperator::HasNoBitSet);

        let ne_false = FilterProperty::not_equal(well_known::JOB_IS_EXCLUSIVE.clone(), false);
        let out = conv.convert_filter(&ne_false, ServerVersion::V2).unwrap();
        assert_eq!(out[0].operator, FilterOperator::HasBitSet);
        assert!(out[0].matches(Some(&mask)));

        let sort = SortProperty::ascending(well_known::JOB_IS_EXCLUSIVE.clone());
        assert!(matches!(
            conv.convert_sort(&sort, ServerVersion::V2),
            Err(CompatError::SortUnsupported { .. })
        ));
    }

    #[test]
    fn test_bit_flag_set_keeps_sibling_bits() {
        let conv = BitFlagConverter::new(
            well_known::JOB_IS_EXCLUSIVE.clone(),
            well_known::JOB_FLAGS.clone(),
            0x1,
        );
        let mask = PropertyValue::Int32(0b111);
        let cleared = conv.to_server(Some(&PropertyValue::Bool(false)), &[Some(&mask)]).unwrap();
        assert_eq!(cleared[0].value, Some(PropertyValue::Int32(0b110)));

        let mask = PropertyValue::Int32(0b110);
        let set = conv.to_server(Some(&PropertyValue::Bool(true)), &[Some(&mask)]).unwrap();
        assert_eq!(set[0].value, Some(PropertyValue::Int32(0b111)));

        let err = conv.to_server(Some(&PropertyValue::Bool(false)), &[None]).unwrap_err();
        assert_eq!(
            err,
            CompatError::CurrentValueRequired {
                property: "Job.IsExclusive".to_string(),
                server: "Job.Flags".to_string(),
            }
        );
    }
}
