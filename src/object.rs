//! Declared-object variants (spec §3 "Objects").

use crate::{
    field::FieldDescriptor,
    misc::SyncLevel,
    mutex::MutexHandle,
    name_object::AmlName,
    namespace::NodeHandle,
    opregion::OperationRegion,
    value::AmlValue,
    AmlContext, AmlError,
};
use alloc::{boxed::Box, vec::Vec};

pub type NativeMethod = Box<dyn Fn(&mut AmlContext) -> Result<AmlValue, AmlError>>;

pub enum MethodCode {
    /// A byte range within the owning table's bytecode, evaluated by the pass engine.
    Aml { table_index: usize, start: usize, end: usize },
    /// A callback installed by the host/embedding, used for predefined objects like `\_OSI`.
    Native(NativeMethod),
}

pub struct MethodInfo {
    pub arg_count: u8,
    pub serialized: bool,
    pub sync_level: SyncLevel,
    pub code: MethodCode,
}

/// A reference-counted union over every kind of entity a namespace node can point to (spec §3).
pub enum Object {
    Name(AmlValue),
    Method(MethodInfo),
    OperationRegion(OperationRegion),
    Field(FieldDescriptor),
    Mutex { handle: MutexHandle, sync_level: SyncLevel },
    Event { handle: u64 },
    Device,
    ThermalZone,
    PowerResource { system_level: u8, resource_order: u16 },
    Processor { proc_id: u8, pblk_address: u32, pblk_length: u8 },
    Alias { target: AmlName },
    Scope,
    BufferField { buffer_node: NodeHandle, bit_offset: u64, bit_length: u64 },
}

impl Object {
    pub fn as_value(&self) -> Option<&AmlValue> {
        match self {
            Object::Name(v) => Some(v),
            _ => None,
        }
    }
}

/// Collects every namespace node reachable under `root`'s subtree that is a `Device`, paired
/// with its path, used by `complete_initial_load`'s `_INI`/`_REG` walk. Kept as a free function
/// (rather than a `Namespace` method) since it only needs `traverse`.
pub fn collect_devices(namespace: &crate::namespace::Namespace) -> Result<Vec<AmlName>, AmlError> {
    let mut devices = Vec::new();
    namespace.traverse(|path, node| {
        let is_device = matches!(node.object, Some(Object::Device));
        if is_device {
            devices.push(path.clone());
        }
        Ok(true)
    })?;
    Ok(devices)
}
