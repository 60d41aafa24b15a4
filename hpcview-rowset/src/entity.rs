//! Per-entity rowset configuration.
//!
//! One generic [`LocalRowset`](crate::LocalRowset) serves every object
//! type; what differs between jobs, tasks, nodes and the rest is captured
//! here as plain data.

use hpcview_core::filter::FilterProperty;
use hpcview_core::property::PropertyId;
use hpcview_core::query::RowsetOptions;
use hpcview_core::value::{ObjectHandle, ObjectType};
use hpcview_core::well_known;

/// Builds the client handle for an object from its id and parent id.
pub type Materializer = fn(i32, Option<i32>) -> ObjectHandle;

#[derive(Debug, Clone)]
pub struct EntityConfig {
    pub object_type: ObjectType,
    pub id_property: PropertyId,
    pub parent_id_property: Option<PropertyId>,
    /// Column standing for "the object itself".
    pub object_property: PropertyId,
    pub materialize: Materializer,
    /// Always sent in front of user filters.
    pub base_filter: Vec<FilterProperty>,
    pub options: RowsetOptions,
}

impl EntityConfig {
    pub fn jobs() -> Self {
        Self {
            object_type: ObjectType::Job,
            id_property: well_known::JOB_ID.clone(),
            parent_id_property: None,
            object_property: well_known::JOB_OBJECT.clone(),
            materialize: |id, _| ObjectHandle::new(ObjectType::Job, id),
            base_filter: Vec::new(),
            options: RowsetOptions::empty(),
        }
    }

    /// Tasks of all jobs. Without parametric expansion only the master row
    /// of a parametric sweep is returned (instance id 0).
    pub fn tasks(expand_parametric: bool) -> Self {
        let (options, base_filter) = if expand_parametric {
            (RowsetOptions::EXPAND_PARAMETRIC, Vec::new())
        } else {
            (
                RowsetOptions::empty(),
                vec![FilterProperty::equal(well_known::TASK_INSTANCE_ID.clone(), 0)],
            )
        };
        Self {
            object_type: ObjectType::Task,
            id_property: well_known::TASK_ID.clone(),
            parent_id_property: Some(well_known::TASK_PARENT_JOB_ID.clone()),
            object_property: well_known::TASK_OBJECT.clone(),
            materialize: |id, parent| match parent {
                Some(job) => ObjectHandle::with_parent(ObjectType::Task, id, job),
                None => ObjectHandle::new(ObjectType::Task, id),
            },
            base_filter,
            options,
        }
    }

    /// Tasks of one job.
    pub fn tasks_of_job(job_id: i32, expand_parametric: bool) -> Self {
        let mut config = Self::tasks(expand_parametric);
        config
            .base_filter
            .insert(0, FilterProperty::equal(well_known::TASK_PARENT_JOB_ID.clone(), job_id));
        config
    }

    pub fn nodes() -> Self {
        Self {
            object_type: ObjectType::Node,
            id_property: well_known::NODE_ID.clone(),
            parent_id_property: None,
            object_property: well_known::NODE_OBJECT.clone(),
            materialize: |id, _| ObjectHandle::new(ObjectType::Node, id),
            base_filter: Vec::new(),
            options: RowsetOptions::empty(),
        }
    }

    /// Cores, with their node as parent.
    pub fn resources() -> Self {
        Self {
            object_type: ObjectType::Resource,
            id_property: well_known::RESOURCE_ID.clone(),
            parent_id_property: Some(well_known::RESOURCE_NODE_ID.clone()),
            object_property: well_known::RESOURCE_OBJECT.clone(),
            materialize: |id, parent| match parent {
                Some(node) => ObjectHandle::with_parent(ObjectType::Resource, id, node),
                None => ObjectHandle::new(ObjectType::Resource, id),
            },
            base_filter: Vec::new(),
            options: RowsetOptions::empty(),
        }
    }

    pub fn allocations() -> Self {
        Self {
            object_type: ObjectType::Allocation,
            id_property: well_known::ALLOCATION_ID.clone(),
            parent_id_property: Some(well_known::ALLOCATION_JOB_ID.clone()),
            object_property: well_known::ALLOCATION_OBJECT.clone(),
            materialize: |id, parent| match parent {
                Some(job) => ObjectHandle::with_parent(ObjectType::Allocation, id, job),
                None => ObjectHandle::new(ObjectType::Allocation, id),
            },
            base_filter: Vec::new(),
            options: RowsetOptions::empty(),
        }
    }

    pub fn job_templates() -> Self {
        Self {
            object_type: ObjectType::JobTemplate,
            id_property: well_known::TEMPLATE_ID.clone(),
            parent_id_property: None,
            object_property: well_known::TEMPLATE_OBJECT.clone(),
            materialize: |id, _| ObjectHandle::new(ObjectType::JobTemplate, id),
            base_filter: Vec::new(),
            options: RowsetOptions::empty(),
        }
    }

    pub fn pools() -> Self {
        Self {
            object_type: ObjectType::Pool,
            id_property: well_known::POOL_ID.clone(),
            parent_id_property: None,
            object_property: well_known::POOL_OBJECT.clone(),
            materialize: |id, _| ObjectHandle::new(ObjectType::Pool, id),
            base_filter: Vec::new(),
            options: RowsetOptions::empty(),
        }
    }

    /// Preset for an object type, where one exists.
    pub fn for_object_type(object_type: ObjectType) -> Option<Self> {
        match object_type {
            ObjectType::Job => Some(Self::jobs()),
            ObjectType::Task => Some(Self::tasks(false)),
            ObjectType::Node => Some(Self::nodes()),
            ObjectType::Resource => Some(Self::resources()),
            ObjectType::Allocation => Some(Self::allocations()),
            ObjectType::JobTemplate => Some(Self::job_templates()),
            ObjectType::Pool => Some(Self::pools()),
            ObjectType::Profile => None,
        }
    }

    pub fn with_base_filter(mut self, filter: FilterProperty) -> Self {
        self.base_filter.push(filter);
        self
    }

    pub fn with_options(mut self, options: RowsetOptions) -> Self {
        self.options |= options;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_parametric_option() {
        let expanded = EntityConfig::tasks(true);
        assert!(expanded.options.contains(RowsetOptions::EXPAND_PARAMETRIC));
        assert!(expanded.base_filter.is_empty());

        let masters = EntityConfig::tasks(false);
        assert!(masters.options.is_empty());
        assert_eq!(masters.base_filter.len(), 1);
        assert_eq!(masters.base_filter[0].property, *well_known::TASK_INSTANCE_ID);
    }

    #[test]
    fn test_tasks_of_job_filters_parent_first() {
        let config = EntityConfig::tasks_of_job(12, false);
        assert_eq!(config.base_filter[0].property, *well_known::TASK_PARENT_JOB_ID);
        assert_eq!(config.base_filter.len(), 2);
    }

    #[test]
    fn test_materialize_with_parent() {
        let config = EntityConfig::resources();
        let handle = (config.materialize)(5, Some(2));
        assert_eq!(handle, ObjectHandle::with_parent(ObjectType::Resource, 5, 2));
        assert!(EntityConfig::for_object_type(ObjectType::Profile).is_none());
    }
}
