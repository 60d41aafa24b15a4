//! Well-known scheduler properties.
//!
//! Built once per process. Unique id ranges: jobs 1000, tasks 2000, nodes
//! 3000, resources 4000, allocations 5000, job templates 6000, pools 7000.

use crate::property::{EnumKind, PropertyFlags as F, PropertyId, PropertyRegistry, PropertyType as T};
use crate::version::ServerVersion as V;
use once_cell::sync::Lazy;

macro_rules! well_known_properties {
    ($( $(#[$meta:meta])* $ident:ident = $uid:literal, $name:literal, $ty:expr, $flags:expr, $since:expr; )*) => {
        $(
            $(#[$meta])*
            pub static $ident: Lazy<PropertyId> =
                Lazy::new(|| PropertyId::introduced($uid, $name, $ty, $flags, $since));
        )*

        /// Every well-known property, in declaration order.
        pub fn all() -> Vec<PropertyId> {
            vec![$( PropertyId::clone(&$ident), )*]
        }
    };
}

well_known_properties! {
    // ------------------------------------------------------------------ jobs
    JOB_ID = 1000, "Job.Id", T::Int32, F::READ_ONLY | F::INDEXED, V::V2;
    /// The job object itself.
    JOB_OBJECT = 1001, "Job.Object", T::Object, F::READ_ONLY | F::CALCULATED, V::V2;
    JOB_NAME = 1002, "Job.Name", T::String, F::empty(), V::V2;
    JOB_OWNER = 1003, "Job.Owner", T::String, F::READ_ONLY | F::INDEXED, V::V2;
    JOB_STATE = 1004, "Job.State", T::Enum(EnumKind::JobState), F::READ_ONLY | F::INDEXED, V::V2;
    JOB_PRIORITY = 1005, "Job.Priority", T::Enum(EnumKind::JobPriority), F::empty(), V::V2;
    JOB_SUBMIT_TIME = 1006, "Job.SubmitTime", T::DateTime, F::READ_ONLY, V::V2;
    JOB_PROJECT = 1007, "Job.Project", T::String, F::empty(), V::V2;
    JOB_REQUESTED_NODES = 1008, "Job.RequestedNodes", T::StringList, F::empty(), V::V2;
    JOB_GUID = 1009, "Job.Guid", T::Guid, F::READ_ONLY, V::V2;
    JOB_RUNTIME_SECONDS = 1010, "Job.Runtime", T::Int32, F::empty(), V::V2;
    JOB_UNIT_TYPE = 1011, "Job.UnitType", T::Enum(EnumKind::JobUnitType), F::empty(), V::V2;
    /// Legacy bit mask; bit 0 = exclusive, bit 1 = backfill, bit 2 = fail-on-task-failure.
    JOB_FLAGS = 1012, "Job.Flags", T::Int32, F::PRIVATE, V::V2;
    JOB_IS_EXCLUSIVE = 1013, "Job.IsExclusive", T::Bool, F::empty(), V::V3;
    JOB_FAIL_ON_TASK_FAILURE = 1014, "Job.FailOnTaskFailure", T::Bool, F::empty(), V::V3;
    JOB_IS_BACKFILL = 1015, "Job.IsBackfill", T::Bool, F::READ_ONLY | F::CALCULATED, V::V3;
    JOB_EXPANDED_PRIORITY = 1016, "Job.ExpandedPriority", T::Int32, F::empty(), V::V3_SP2;
    JOB_ESTIMATED_PROCESS_MEMORY = 1017, "Job.EstimatedProcessMemory", T::Int32, F::empty(), V::V3_SP2;
    JOB_CUSTOM_BLOB = 1018, "Job.CustomBlob", T::Binary, F::PRIVATE, V::V2;
    JOB_PENDING_REASON = 1019, "Job.PendingReason", T::Enum(EnumKind::PendingReason), F::READ_ONLY, V::V3_SP1;
    JOB_TEMPLATE_NAME = 1020, "Job.JobTemplate", T::String, F::empty(), V::V2;

    // ----------------------------------------------------------------- tasks
    TASK_ID = 2000, "Task.Id", T::Int32, F::READ_ONLY | F::INDEXED, V::V2;
    TASK_OBJECT = 2001, "Task.Object", T::Object, F::READ_ONLY | F::CALCULATED, V::V2;
    TASK_PARENT_JOB_ID = 2002, "Task.ParentJobId", T::Int32, F::READ_ONLY | F::INDEXED, V::V2;
    TASK_JOB_TASK_ID = 2003, "Task.JobTaskId", T::Int32, F::READ_ONLY, V::V2;
    TASK_INSTANCE_ID = 2004, "Task.InstanceId", T::Int32, F::READ_ONLY, V::V2;
    /// Composite id; older servers only know the three components.
    TASK_TASK_ID = 2005, "Task.TaskId", T::TaskId, F::READ_ONLY | F::CALCULATED, V::V3;
    TASK_NAME = 2006, "Task.Name", T::String, F::empty(), V::V2;
    TASK_STATE = 2007, "Task.State", T::Enum(EnumKind::TaskState), F::READ_ONLY | F::INDEXED, V::V2;
    TASK_COMMAND_LINE = 2008, "Task.CommandLine", T::String, F::empty(), V::V2;
    TASK_TYPE = 2009, "Task.Type", T::Enum(EnumKind::TaskType), F::empty(), V::V3;
    TASK_EXIT_CODE = 2010, "Task.ExitCode", T::Int32, F::READ_ONLY, V::V2;
    TASK_OUTPUT = 2011, "Task.Output", T::String, F::READ_ONLY, V::V2;
    TASK_IS_PARAMETRIC = 2012, "Task.IsParametric", T::Bool, F::READ_ONLY, V::V2;
    TASK_END_TIME = 2013, "Task.EndTime", T::DateTime, F::READ_ONLY, V::V2;

    // ----------------------------------------------------------------- nodes
    NODE_ID = 3000, "Node.Id", T::Int32, F::READ_ONLY | F::INDEXED, V::V2;
    NODE_OBJECT = 3001, "Node.Object", T::Object, F::READ_ONLY | F::CALCULATED, V::V2;
    NODE_NAME = 3002, "Node.Name", T::String, F::READ_ONLY | F::INDEXED, V::V2;
    NODE_STATE = 3003, "Node.State", T::Enum(EnumKind::NodeState), F::READ_ONLY, V::V2;
    NODE_REACHABLE = 3004, "Node.Reachable", T::Bool, F::READ_ONLY, V::V2;
    NODE_NUM_CORES = 3005, "Node.NumCores", T::Int32, F::READ_ONLY, V::V2;
    NODE_GUID = 3006, "Node.Guid", T::Guid, F::READ_ONLY, V::V2;
    NODE_GROUPS = 3007, "Node.Groups", T::StringList, F::empty(), V::V2;
    /// Free-form comment; called `Node.Comment` before V3.
    NODE_DESCRIPTION = 3008, "Node.Description", T::String, F::empty(), V::V3;
    NODE_COMMENT = 3009, "Node.Comment", T::String, F::OBSOLETE, V::V2;
    NODE_LOCATION = 3010, "Node.Location", T::Enum(EnumKind::NodeLocation), F::READ_ONLY, V::V3_SP1;
    NODE_AVAILABILITY = 3011, "Node.Availability", T::Enum(EnumKind::NodeAvailability), F::READ_ONLY, V::V2;

    // ------------------------------------------------------------- resources
    RESOURCE_ID = 4000, "Resource.Id", T::Int32, F::READ_ONLY | F::INDEXED, V::V2;
    RESOURCE_OBJECT = 4001, "Resource.Object", T::Object, F::READ_ONLY | F::CALCULATED, V::V2;
    RESOURCE_NODE_ID = 4002, "Resource.NodeId", T::Int32, F::READ_ONLY | F::INDEXED, V::V2;
    RESOURCE_STATE = 4003, "Resource.State", T::Enum(EnumKind::ResourceState), F::READ_ONLY, V::V2;
    RESOURCE_JOB_ID = 4004, "Resource.JobId", T::Int32, F::READ_ONLY, V::V2;
    RESOURCE_CORE_ID = 4005, "Resource.CoreId", T::Int32, F::READ_ONLY, V::V2;
    RESOURCE_JOB_PHASE = 4006, "Resource.JobPhase", T::Enum(EnumKind::ResourceJobPhase), F::READ_ONLY, V::V2;

    // ----------------------------------------------------------- allocations
    ALLOCATION_ID = 5000, "Allocation.Id", T::Int32, F::READ_ONLY | F::INDEXED, V::V2;
    ALLOCATION_OBJECT = 5001, "Allocation.Object", T::Object, F::READ_ONLY | F::CALCULATED, V::V2;
    ALLOCATION_JOB_ID = 5002, "Allocation.JobId", T::Int32, F::READ_ONLY | F::INDEXED, V::V2;
    ALLOCATION_TASK_ID = 5003, "Allocation.TaskId", T::Int32, F::READ_ONLY, V::V2;
    ALLOCATION_NODE_NAME = 5004, "Allocation.NodeName", T::String, F::READ_ONLY, V::V2;
    ALLOCATION_START_TIME = 5005, "Allocation.StartTime", T::DateTime, F::READ_ONLY, V::V2;
    ALLOCATION_END_TIME = 5006, "Allocation.EndTime", T::DateTime, F::READ_ONLY, V::V2;
    ALLOCATION_STATE = 5007, "Allocation.State", T::Enum(EnumKind::AllocationState), F::READ_ONLY, V::V2;

    // --------------------------------------------------------- job templates
    TEMPLATE_ID = 6000, "JobTemplate.Id", T::Int32, F::READ_ONLY | F::INDEXED, V::V2;
    TEMPLATE_OBJECT = 6001, "JobTemplate.Object", T::Object, F::READ_ONLY | F::CALCULATED, V::V2;
    TEMPLATE_NAME = 6002, "JobTemplate.Name", T::String, F::INDEXED, V::V2;
    TEMPLATE_DESCRIPTION = 6003, "JobTemplate.Description", T::String, F::empty(), V::V2;
    TEMPLATE_CONTENT = 6004, "JobTemplate.Content", T::Binary, F::empty(), V::V2;

    // ----------------------------------------------------------------- pools
    POOL_ID = 7000, "Pool.Id", T::Int32, F::READ_ONLY | F::INDEXED, V::V3_SP1;
    POOL_OBJECT = 7001, "Pool.Object", T::Object, F::READ_ONLY | F::CALCULATED, V::V3_SP1;
    POOL_NAME = 7002, "Pool.Name", T::String, F::INDEXED, V::V3_SP1;
    POOL_WEIGHT = 7003, "Pool.Weight", T::Int32, F::empty(), V::V3_SP1;
    POOL_GUARANTEE = 7004, "Pool.Guarantee", T::UInt32, F::READ_ONLY, V::V3_SP1;
    POOL_CURRENT_ALLOCATION = 7005, "Pool.CurrentAllocation", T::Int64, F::READ_ONLY | F::CALCULATED, V::V3_SP1;
}

static REGISTRY: Lazy<PropertyRegistry> = Lazy::new(|| {
    let mut registry = PropertyRegistry::new();
    for prop in all() {
        let registered = registry.register(prop);
        debug_assert!(registered.is_ok(), "duplicate well-known property id");
    }
    registry
});

pub(crate) fn registry() -> &'static PropertyRegistry {
    &REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyType;

    #[test]
    fn test_well_known_ids_are_unique() {
        assert_eq!(PropertyRegistry::well_known().len(), all().len());
    }

    #[test]
    fn test_lookup_by_name_and_id() {
        let registry = PropertyRegistry::well_known();
        assert_eq!(registry.by_name("Job.Id"), Some(&*JOB_ID));
        assert_eq!(registry.get(2005).map(|p| p.value_type()), Some(PropertyType::TaskId));
    }

    #[test]
    fn test_object_properties_are_object_typed() {
        for prop in [&*JOB_OBJECT, &*TASK_OBJECT, &*NODE_OBJECT, &*RESOURCE_OBJECT] {
            assert_eq!(prop.value_type(), PropertyType::Object);
        }
    }
}
