//! `aml` is a pure-Rust AML (ACPI Machine Language) interpreter core, used to parse the DSDT and
//! SSDT tables from ACPI, build a named object space from their declarations, and evaluate the
//! control methods defined therein. This crate can be embedded by a kernel, hypervisor, or
//! firmware runtime that needs to drive power, thermal, configuration, and PCI/interrupt-routing
//! behavior exposed by ACPI tables.
//!
//! ### Using the library
//! Create an [`AmlContext`] with [`AmlContext::new`], then feed it table bytes with
//! [`AmlContext::load_table`] for every DSDT/SSDT the platform provides. Once every table has
//! been loaded, call [`AmlContext::complete_initial_load`] to build the final namespace tree and
//! run device initialization. After that, look up or invoke any named object:
//!
//! ```ignore
//! let result = aml_context.evaluate_by_path("\\_SB.PCI0.S08._ADR", Args::EMPTY)?;
//! ```
//!
//! ### About the interpreter
//! The hard engineering lives in three tightly coupled subsystems: the byte decoder
//! ([`decoder`], [`pkg_length`], [`opcode`]), the namespace ([`namespace`]), and the two-pass
//! evaluator ([`eval`]). A transactional [`snapshot`] system lets any pass roll back cleanly on
//! error, and [`mutex`]/[`method`] layer ACPI's SyncLevel and scope-exit discipline over a plain
//! host mutex.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod arena;
pub mod decoder;
pub mod eval;
pub mod field;
pub mod hash;
pub mod method;
pub mod misc;
pub mod mutex;
pub mod name_object;
pub mod namespace;
pub mod object;
pub mod opcode;
pub mod opregion;
pub mod pci_routing;
pub mod pkg_length;
pub mod resource;
pub mod snapshot;
pub mod value;

pub use crate::{namespace::Namespace, value::AmlValue};

use crate::{
    eval::{term_object, PassType, StepResult},
    method::{MethodScope, MethodScopeStack},
    mutex::{GlobalLockState, MutexAcquisitions, MutexHandle},
    name_object::{AmlName, NameSeg, Target},
    namespace::{LevelType, NodeHandle, ScopeFlags, SearchFlags},
    object::{MethodCode, MethodInfo, Object},
    opregion::{RegionHandler, RegionHandlerTable, RegionSpace},
    snapshot::SnapshotItem,
    value::{AmlType, Args, IntegerWidth},
};
use alloc::{boxed::Box, format, string::String, vec::Vec};
use core::str::FromStr;
use log::{error, info, warn};

/// Describes how much debug information the evaluator should emit (set the "maximum" expected
/// verbosity; everything less-or-equal prints).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum DebugVerbosity {
    None,
    Scopes,
    AllScopes,
    All,
}

/// The AML interpreter revision this core reports to `RevisionOp` (spec §3) — unrelated to a
/// table's own ComplianceRevision byte despite the similar name.
pub const AML_INTERPRETER_REVISION: u64 = 2;

/// The central type managing loaded tables, the namespace, and in-flight evaluation.
pub struct AmlContext {
    handler: Box<dyn Handler>,
    pub namespace: Namespace,
    method_scopes: MethodScopeStack,
    snapshots: snapshot::SnapshotStack,
    region_handlers: RegionHandlerTable,
    reg_interested_devices: Vec<NodeHandle>,
    tables: Vec<Vec<u8>>,
    integer_width: IntegerWidth,
    global_lock: GlobalLockState,
    debug_verbosity: DebugVerbosity,
}

impl AmlContext {
    pub fn new(handler: Box<dyn Handler>, debug_verbosity: DebugVerbosity) -> AmlContext {
        let mut context = AmlContext {
            handler,
            namespace: Namespace::new(),
            method_scopes: MethodScopeStack::new(),
            snapshots: snapshot::SnapshotStack::new(),
            region_handlers: RegionHandlerTable::new(),
            reg_interested_devices: Vec::new(),
            tables: Vec::new(),
            integer_width: IntegerWidth::Bits32,
            global_lock: GlobalLockState::new(),
            debug_verbosity,
        };
        context.add_predefined_objects();
        context
    }

    pub fn integer_width(&self) -> IntegerWidth {
        self.integer_width
    }

    pub fn debug_verbosity(&self) -> DebugVerbosity {
        self.debug_verbosity
    }

    pub fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }

    pub(crate) fn current_scope(&self) -> &AmlName {
        self.namespace.current_scope()
    }

    /// Runs the declaration pass over `bytes` (an AML table body, header already stripped by the
    /// caller), inside its own snapshot so a malformed table rolls back cleanly (spec §4.7).
    /// `compliance_revision` (the table header's own revision byte) selects the integer width for
    /// every table loaded so far and after (spec §6.3: revision > 1 selects 64-bit arithmetic).
    pub fn load_table(&mut self, bytes: &[u8], compliance_revision: u8) -> Result<(), AmlError> {
        if bytes.is_empty() {
            return Err(AmlError::UnexpectedEndOfStream);
        }
        if compliance_revision > 1 {
            self.integer_width = IntegerWidth::Bits64;
        }

        let table_index = self.tables.len();
        self.tables.push(bytes.to_vec());

        let arena_snapshot = self.namespace.snapshot_arena();
        let token = self.snapshots.begin(arena_snapshot, self.namespace.scope_depth(), self.method_scopes.depth());

        let table_len = self.tables[table_index].len();
        let table_bytes = self.tables[table_index].clone();
        let mut decoder = decoder::Decoder::new(&table_bytes, 0, table_len);
        let result = term_object::term_list(self, &mut decoder, PassType::Declaration, table_index);

        match result {
            Ok(_) => {
                let level = self.snapshots.commit(token);
                self.namespace.commit_arena(level.arena_snapshot);
                Ok(())
            }
            Err(err) => {
                error!("failed to parse AML table: {:?}", err);
                self.rollback_snapshot(token);
                Err(err)
            }
        }
    }

    fn rollback_snapshot(&mut self, token: snapshot::SnapshotToken) {
        let mut ns = core::mem::take(&mut self.namespace);
        let mut acquisitions = MutexAcquisitions::new();
        if let Ok(level) = self.snapshots.rollback(token, |item| snapshot::release_item(item, &mut ns, &mut acquisitions)) {
            ns.rollback_arena(level.arena_snapshot);
        }
        self.namespace = ns;
    }

    /// Builds the final presence tree and, if requested, runs device `_INI`/`_STA` initialization
    /// (spec §4.7, mirrors the teacher's `initialize_objects`).
    pub fn complete_initial_load(&mut self, initialize_devices: bool) -> Result<(), AmlError> {
        self.namespace.build_tree()?;

        if !initialize_devices {
            return Ok(());
        }

        match self.evaluate_by_path("\\_SB._INI", Args::EMPTY) {
            Ok(_) | Err(AmlError::ValueDoesNotExist(_)) => {}
            Err(err) => return Err(err),
        }

        let devices = object::collect_devices(&self.namespace)?;
        for device_path in devices {
            if let Ok(handle) = self.namespace.search(&device_path, &AmlName::root(), SearchFlags::empty()) {
                self.reg_interested_devices.push(handle);
            }

            let mut sta_path = device_path.clone();
            sta_path.segments.push(NameSeg::from_bytes(*b"_STA").map_err(|_| AmlError::InvalidNameSeg)?);
            let status = match self.evaluate_by_path_name(&sta_path, Args::EMPTY) {
                Ok(value) => value.as_integer(self).unwrap_or(0x0F),
                Err(AmlError::ValueDoesNotExist(_)) => 0x0F,
                Err(err) => return Err(err),
            };

            if status & 0x1 != 0 {
                let mut ini_path = device_path.clone();
                ini_path.segments.push(NameSeg::from_bytes(*b"_INI").map_err(|_| AmlError::InvalidNameSeg)?);
                match self.evaluate_by_path_name(&ini_path, Args::EMPTY) {
                    Ok(_) => {
                        info!("invoked _INI at {}", device_path);
                        self.handler.device_initialized(&format!("{}", device_path), status as u32);
                    }
                    Err(AmlError::ValueDoesNotExist(_)) => {}
                    Err(err) => return Err(err),
                }
            }
        }

        Ok(())
    }

    pub fn evaluate_by_path(&mut self, path: &str, args: Args) -> Result<AmlValue, AmlError> {
        let name = AmlName::from_str(path)?;
        self.evaluate_by_path_name(&name, args)
    }

    fn evaluate_by_path_name(&mut self, path: &AmlName, args: Args) -> Result<AmlValue, AmlError> {
        let arena_snapshot = self.namespace.snapshot_arena();
        let token = self.snapshots.begin(arena_snapshot, self.namespace.scope_depth(), self.method_scopes.depth());

        match self.invoke_method(path, args) {
            Ok(value) => {
                let level = self.snapshots.commit(token);
                self.namespace.commit_arena(level.arena_snapshot);
                Ok(value)
            }
            Err(err) => {
                self.rollback_snapshot(token);
                Err(err)
            }
        }
    }

    /// Invokes the method named by `path` (spec §4.7 "Method invocation"). If the resolved object
    /// is not a `Method`, its value is returned directly without invocation (e.g. `_STA` is
    /// frequently just an `AmlValue::Integer`).
    pub(crate) fn invoke_method(&mut self, path: &AmlName, args: Args) -> Result<AmlValue, AmlError> {
        let handle = self.namespace.search(path, self.namespace.current_scope(), SearchFlags::empty())?;

        let is_method = matches!(self.namespace.get(handle).and_then(|n| n.object.as_ref()), Some(Object::Method(_)));
        if !is_method {
            return match self.namespace.get(handle).and_then(|n| n.object.as_ref()) {
                Some(Object::Name(value)) => Ok(value.clone()),
                _ => Err(AmlError::ValueDoesNotExist(path.clone())),
            };
        }

        let caller_floor = self.method_scopes.current().map(|s| s.current_sync_level()).unwrap_or(0);
        let absolute_path = self.namespace.get(handle).unwrap().absolute_path.clone();

        self.namespace.push_scope(&absolute_path, ScopeFlags::TEMPORARY)?;
        self.method_scopes.push(MethodScope::new(args, caller_floor, absolute_path));

        let outcome = self.run_method_body(handle);

        if let Some(mut scope) = self.method_scopes.pop() {
            for node in scope.mutex_acquisitions.drain_reverse() {
                let _ = self.release_mutex_internal(node);
            }
        }
        self.namespace.pop_scope()?;

        outcome
    }

    /// Temporarily takes the `Method` object out of the namespace (so its `&mut AmlContext`
    /// native callback, or its AML body evaluation, can freely re-enter the namespace), then
    /// restores it once evaluation completes.
    fn run_method_body(&mut self, handle: NodeHandle) -> Result<AmlValue, AmlError> {
        let taken = self.namespace.get_mut(handle).and_then(|n| n.object.take());
        let info = match taken {
            Some(Object::Method(info)) => info,
            other => {
                if let Some(obj) = other {
                    if let Some(node) = self.namespace.get_mut(handle) {
                        node.object = Some(obj);
                    }
                }
                return Err(AmlError::ValueDoesNotExist(AmlName::root()));
            }
        };

        let result = match &info.code {
            MethodCode::Native(f) => f(self),
            MethodCode::Aml { table_index, start, end } => {
                let table = self.tables[*table_index].clone();
                let mut decoder = decoder::Decoder::new(&table, *start, *end);
                match term_object::term_list(self, &mut decoder, PassType::Full, *table_index) {
                    Ok(StepResult::Return(value)) => Ok(value),
                    Ok(StepResult::Normal) => Ok(AmlValue::Integer(0)),
                    Ok(StepResult::Break) => Err(AmlError::BreakInInvalidPosition),
                    Ok(StepResult::Continue) => Err(AmlError::ContinueInInvalidPosition),
                    Ok(StepResult::Fatal(err)) => Err(err),
                    Err(err) => Err(err),
                }
            }
        };

        if let Some(node) = self.namespace.get_mut(handle) {
            node.object = Some(Object::Method(info));
        }
        result
    }

    pub(crate) fn current_arg(&self, arg: misc::ArgNum) -> Result<&AmlValue, AmlError> {
        self.method_scopes.current().ok_or(AmlError::NotExecutingControlMethod)?.arg(arg)
    }

    pub(crate) fn local(&self, local: misc::LocalNum) -> Result<&AmlValue, AmlError> {
        self.method_scopes.current().ok_or(AmlError::NotExecutingControlMethod)?.local(local)
    }

    /// Performs a store into `target` per ACPI §19.3.5.8 (spec §4.7): resolves the target, applies
    /// implicit conversion for named-object destinations, and leaves `Arg`/`Local` stores
    /// unconverted.
    pub(crate) fn store(&mut self, target: Target, value: AmlValue) -> Result<AmlValue, AmlError> {
        match target {
            Target::Name(ref path) => {
                let handle = self.namespace.search(path, self.namespace.current_scope(), SearchFlags::empty())?;
                match self.namespace.get(handle).and_then(|n| n.object.as_ref()) {
                    Some(Object::Name(existing)) => {
                        let target_type = existing.type_of();
                        let converted = value.as_type(target_type, self)?;
                        self.namespace.set_object(handle, Object::Name(converted.clone()))?;
                        Ok(converted)
                    }
                    Some(Object::Field(_)) => {
                        self.write_field(handle, value.clone())?;
                        Ok(value)
                    }
                    _ => {
                        self.namespace.set_object(handle, Object::Name(value.clone()))?;
                        Ok(value)
                    }
                }
            }
            Target::Arg(num) => {
                self.method_scopes.current_mut().ok_or(AmlError::NotExecutingControlMethod)?.store_arg(num, value.clone())?;
                Ok(value)
            }
            Target::Local(num) => {
                self.method_scopes.current_mut().ok_or(AmlError::NotExecutingControlMethod)?.store_local(num, value.clone())?;
                Ok(value)
            }
            Target::Debug => {
                info!("AML Debug: {:?}", value);
                Ok(value)
            }
            Target::Null => Ok(value),
        }
    }

    fn field_region_handle(&self, handle: NodeHandle) -> Result<NodeHandle, AmlError> {
        match self.namespace.get(handle).and_then(|n| n.object.as_ref()) {
            Some(Object::Field(d)) => Ok(match d.backing {
                field::FieldBacking::Region(r) => r,
                field::FieldBacking::Bank { region, .. } => region,
                field::FieldBacking::Index { data_register, .. } => data_register,
            }),
            _ => Err(AmlError::FieldRegionIsNotOpRegion),
        }
    }

    fn field_needs_global_lock(&self, handle: NodeHandle) -> Result<bool, AmlError> {
        match self.namespace.get(handle).and_then(|n| n.object.as_ref()) {
            Some(Object::Field(d)) => Ok(d.needs_global_lock()),
            _ => Err(AmlError::FieldRegionIsNotOpRegion),
        }
    }

    pub(crate) fn write_field(&mut self, handle: NodeHandle, value: AmlValue) -> Result<(), AmlError> {
        let needs_lock = self.field_needs_global_lock(handle)?;
        let held = self.maybe_acquire_global_lock(needs_lock)?;
        let result = self.do_write_field(handle, value);
        self.maybe_release_global_lock(held)?;
        result
    }

    fn do_write_field(&mut self, handle: NodeHandle, value: AmlValue) -> Result<(), AmlError> {
        let integer = value.as_integer(self)?;
        let region_handle = self.field_region_handle(handle)?;
        let region = match self.namespace.get(region_handle).and_then(|n| n.object.as_ref()) {
            Some(Object::OperationRegion(r)) => r,
            _ => return Err(AmlError::FieldRegionIsNotOpRegion),
        };
        let descriptor = match self.namespace.get(handle).and_then(|n| n.object.as_ref()) {
            Some(Object::Field(d)) => d,
            _ => return Err(AmlError::FieldRegionIsNotOpRegion),
        };
        descriptor.write_region(region, &self.region_handlers, integer)
    }

    pub(crate) fn read_field(&mut self, handle: NodeHandle) -> Result<AmlValue, AmlError> {
        let needs_lock = self.field_needs_global_lock(handle)?;
        let held = self.maybe_acquire_global_lock(needs_lock)?;
        let result = self.do_read_field(handle);
        self.maybe_release_global_lock(held)?;
        result
    }

    fn do_read_field(&mut self, handle: NodeHandle) -> Result<AmlValue, AmlError> {
        let region_handle = self.field_region_handle(handle)?;
        let region = match self.namespace.get(region_handle).and_then(|n| n.object.as_ref()) {
            Some(Object::OperationRegion(r)) => r,
            _ => return Err(AmlError::FieldRegionIsNotOpRegion),
        };
        let descriptor = match self.namespace.get(handle).and_then(|n| n.object.as_ref()) {
            Some(Object::Field(d)) => d,
            _ => return Err(AmlError::FieldRegionIsNotOpRegion),
        };
        let integer = descriptor.read_region(region, &self.region_handlers)?;
        Ok(AmlValue::Integer(integer))
    }

    /// Acquires the global lock (when `needs_global_lock` is set) *before* the caller opens any
    /// guarding snapshot, per the Open Question resolution recorded in DESIGN.md: this way a
    /// rollback triggered mid-access releases the lock as an ordinary snapshot action rather than
    /// needing special-cased unwinding.
    fn maybe_acquire_global_lock(&mut self, needs_global_lock: bool) -> Result<bool, AmlError> {
        if !needs_global_lock {
            return Ok(false);
        }
        self.handler.acquire_global_lock();
        self.global_lock.note_acquire();
        Ok(true)
    }

    fn maybe_release_global_lock(&mut self, held: bool) -> Result<(), AmlError> {
        if !held {
            return Ok(());
        }
        let (fully_released, signal_pending) = self.global_lock.note_release(self.handler.global_lock_pending_bit())?;
        if fully_released {
            self.handler.release_global_lock(signal_pending);
        }
        Ok(())
    }

    pub(crate) fn acquire_mutex(&mut self, handle: NodeHandle, timeout: misc::Timeout) -> Result<bool, AmlError> {
        let (mutex_handle, sync_level, is_global) = match self.namespace.get(handle).and_then(|n| n.object.as_ref()) {
            Some(Object::Mutex { handle: mh, sync_level }) => {
                let path = format!("{}", self.namespace.get(handle).unwrap().absolute_path);
                (*mh, *sync_level, mutex::is_global_lock_path(&path))
            }
            _ => return Err(AmlError::MutexNotAcquired),
        };

        let floor = self.method_scopes.current().map(|s| s.current_sync_level()).unwrap_or(0);
        match self.handler.acquire_mutex(mutex_handle, timeout) {
            mutex::AcquireResult::Timeout => Ok(false),
            mutex::AcquireResult::Success => {
                if is_global {
                    self.handler.acquire_global_lock();
                    self.global_lock.note_acquire();
                }
                if let Some(scope) = self.method_scopes.current_mut() {
                    scope.mutex_acquisitions.record_acquire(handle, sync_level, floor)?;
                }
                Ok(true)
            }
        }
    }

    fn release_mutex_internal(&mut self, handle: NodeHandle) -> Result<(), AmlError> {
        let (mutex_handle, is_global) = match self.namespace.get(handle).and_then(|n| n.object.as_ref()) {
            Some(Object::Mutex { handle: mh, .. }) => {
                let path = format!("{}", self.namespace.get(handle).unwrap().absolute_path);
                (*mh, mutex::is_global_lock_path(&path))
            }
            _ => return Err(AmlError::MutexNotAcquired),
        };
        if is_global {
            let (fully_released, signal) = self.global_lock.note_release(self.handler.global_lock_pending_bit())?;
            if fully_released {
                self.handler.release_global_lock(signal);
            }
        }
        self.handler.release_mutex(mutex_handle);
        Ok(())
    }

    pub(crate) fn release_mutex(&mut self, handle: NodeHandle) -> Result<(), AmlError> {
        match self.method_scopes.current_mut() {
            Some(scope) => scope.mutex_acquisitions.record_release(handle)?,
            None => return Err(AmlError::MutexNotAcquired),
        }
        self.release_mutex_internal(handle)
    }

    pub fn register_region_handler(&mut self, space: RegionSpace, handler: Box<dyn RegionHandler>, broadcast_reg: bool) -> Result<(), AmlError> {
        self.region_handlers.register(space, handler);
        if broadcast_reg {
            self.broadcast_region_space_state_update(space, true)?;
        }
        Ok(())
    }

    pub fn unregister_region_handler(&mut self, space: RegionSpace, broadcast_reg: bool) -> Result<(), AmlError> {
        self.region_handlers.unregister(space);
        if broadcast_reg {
            self.broadcast_region_space_state_update(space, false)?;
        }
        Ok(())
    }

    /// Walks the interested-device list and invokes each `_REG` method with `(space, enabled)`
    /// (spec §4.5 "_REG broadcast").
    pub fn broadcast_region_space_state_update(&mut self, space: RegionSpace, enabled: bool) -> Result<(), AmlError> {
        let devices = self.reg_interested_devices.clone();
        for device in devices {
            let path = match self.namespace.get(device) {
                Some(node) => node.absolute_path.clone(),
                None => continue,
            };
            let mut reg_path = path.clone();
            reg_path.segments.push(NameSeg::from_bytes(*b"_REG").map_err(|_| AmlError::InvalidNameSeg)?);
            let args = Args::from_list(alloc::vec![
                AmlValue::Integer(region_space_to_u64(space)),
                AmlValue::Integer(if enabled { 1 } else { 0 }),
            ]);
            match self.evaluate_by_path_name(&reg_path, args) {
                Ok(_) | Err(AmlError::ValueDoesNotExist(_)) => {}
                Err(err) => warn!("_REG broadcast to {} failed: {:?}", path, err),
            }
        }
        Ok(())
    }

    fn add_predefined_objects(&mut self) {
        for path in ["\\_GPE", "\\_SB", "\\_SI", "\\_PR", "\\_TZ"] {
            let name = AmlName::from_str(path).unwrap();
            self.create_namespace_node(name, LevelType::Scope).unwrap();
        }

        let os_handle = self.create_namespace_node(AmlName::from_str("\\_OS").unwrap(), LevelType::Scope).unwrap();
        self.namespace.set_object(os_handle, Object::Name(AmlValue::String(String::from("Microsoft Windows NT")))).unwrap();

        let rev_handle = self.create_namespace_node(AmlName::from_str("\\_REV").unwrap(), LevelType::Scope).unwrap();
        self.namespace.set_object(rev_handle, Object::Name(AmlValue::Integer(AML_INTERPRETER_REVISION))).unwrap();

        let osi_handle = self.create_namespace_node(AmlName::from_str("\\_OSI").unwrap(), LevelType::MethodLocals).unwrap();
        self.namespace
            .set_object(
                osi_handle,
                Object::Method(MethodInfo {
                    arg_count: 1,
                    serialized: false,
                    sync_level: 0,
                    code: MethodCode::Native(Box::new(|ctx: &mut AmlContext| {
                        let requested = ctx.current_arg(0)?.as_string(ctx)?;
                        let supported = match requested.as_str() {
                            "Windows 2000" | "Windows 2001" | "Windows 2001.1" | "Windows 2001 SP1" | "Windows 2001 SP2"
                            | "Windows 2006" | "Windows 2006.1" | "Windows 2009" | "Windows 2012" | "Windows 2013"
                            | "Windows 2015" | "Windows 2016" | "Windows 2017" | "Windows 2018" | "Windows 2019" => true,

                            "Darwin" => true,

                            "Linux" => {
                                warn!("ACPI evaluated `_OSI(\"Linux\")`. This is a bug. Reporting no support.");
                                false
                            }

                            _ => false,
                        };
                        Ok(AmlValue::boolean(supported, ctx.integer_width()))
                    })),
                }),
            )
            .unwrap();
    }

    pub(crate) fn method_scope_depth(&self) -> usize {
        self.method_scopes.depth()
    }

    /// Creates a namespace node and registers its raise with the innermost open snapshot, so a
    /// rollback mid-declaration unlinks it instead of leaving a dangling handle behind (spec
    /// §4.8). Every production `create_node` call goes through this rather than calling
    /// `self.namespace.create_node` directly.
    pub(crate) fn create_namespace_node(&mut self, path: AmlName, level_type: LevelType) -> Result<NodeHandle, AmlError> {
        let handle = self.namespace.create_node(path, level_type)?;
        self.snapshots.raise(SnapshotItem::Node(handle));
        Ok(handle)
    }
}

fn region_space_to_u64(space: RegionSpace) -> u64 {
    match space {
        RegionSpace::SystemMemory => 0,
        RegionSpace::SystemIo => 1,
        RegionSpace::PciConfig => 2,
        RegionSpace::EmbeddedControl => 3,
        RegionSpace::SmBus => 4,
        RegionSpace::SystemCmos => 5,
        RegionSpace::PciBarTarget => 6,
        RegionSpace::Ipmi => 7,
        RegionSpace::GeneralPurposeIo => 8,
        RegionSpace::GenericSerialBus => 9,
        RegionSpace::Pcc => 10,
        RegionSpace::PlatformRt => 11,
        RegionSpace::Oem(b) => b as u64,
    }
}

/// The host boundary (spec §6.1): everything the core calls out for instead of doing itself.
/// `Send + Sync` because an `AmlContext` holding one must itself be movable and shareable across
/// the threads a kernel or hypervisor runs ACPI evaluation from.
pub trait Handler: Send + Sync {
    fn read_u8(&self, address: usize) -> u8;
    fn read_u16(&self, address: usize) -> u16;
    fn read_u32(&self, address: usize) -> u32;
    fn read_u64(&self, address: usize) -> u64;
    fn write_u8(&self, address: usize, value: u8);
    fn write_u16(&self, address: usize, value: u16);
    fn write_u32(&self, address: usize, value: u32);
    fn write_u64(&self, address: usize, value: u64);

    fn read_io_u8(&self, port: u16) -> u8;
    fn read_io_u16(&self, port: u16) -> u16;
    fn read_io_u32(&self, port: u16) -> u32;
    fn write_io_u8(&self, port: u16, value: u8);
    fn write_io_u16(&self, port: u16, value: u16);
    fn write_io_u32(&self, port: u16, value: u32);

    fn read_pci_u8(&self, segment: u16, bus: u8, device: u8, function: u8, offset: u16) -> u8;
    fn read_pci_u16(&self, segment: u16, bus: u8, device: u8, function: u8, offset: u16) -> u16;
    fn read_pci_u32(&self, segment: u16, bus: u8, device: u8, function: u8, offset: u16) -> u32;
    fn write_pci_u8(&self, segment: u16, bus: u8, device: u8, function: u8, offset: u16, value: u8);
    fn write_pci_u16(&self, segment: u16, bus: u8, device: u8, function: u8, offset: u16, value: u16);
    fn write_pci_u32(&self, segment: u16, bus: u8, device: u8, function: u8, offset: u16, value: u32);

    /// Attempts to take ownership of the shared ACPI global-lock word (spec §4.6): the host owns
    /// the actual compare-and-exchange loop against the `FACS` global-lock dword.
    fn acquire_global_lock(&self) -> bool;
    /// Releases the global lock, signalling any pending waiter if `signal_pending` is set.
    fn release_global_lock(&self, signal_pending: bool);
    /// Returns whether the pending bit is currently observed set on the global-lock word, queried
    /// just before release to decide whether to signal.
    fn global_lock_pending_bit(&self) -> bool;

    fn create_mutex(&self) -> MutexHandle;
    fn acquire_mutex(&self, mutex: MutexHandle, timeout: misc::Timeout) -> mutex::AcquireResult;
    fn release_mutex(&self, mutex: MutexHandle);
    fn free_mutex(&self, mutex: MutexHandle);

    fn create_event(&self) -> u64;
    fn signal_event(&self, event: u64);
    fn reset_event(&self, event: u64);
    fn await_event(&self, event: u64, timeout: misc::Timeout) -> mutex::AcquireResult;
    fn free_event(&self, event: u64);

    fn notify(&self, device_path: &str, notification_value: u64);

    fn stall(&self, microseconds: u64);
    fn sleep(&self, milliseconds: u64);
    fn monotonic_timer_100ns(&self) -> u64;

    /// Called once a device's `_INI` returns, with the `_STA` value observed beforehand.
    fn device_initialized(&self, device_path: &str, status: u32) {
        let _ = (device_path, status);
    }

    fn handle_fatal_error(&self, fatal_type: u8, fatal_code: u32, fatal_arg: u64) {
        panic!("AML DefFatal: type={:?} code={:?} arg={:?}", fatal_type, fatal_code, fatal_arg);
    }
}

/// Errors produced anywhere in the interpreter (spec §7).
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum AmlError {
    UnexpectedEndOfStream,
    UnexpectedByte(u8),
    UnsupportedOpcode,
    InvalidNameSeg,
    InvalidPkgLength,
    InvalidFieldFlags,
    InvalidRegionSpace(u8),
    MalformedPackage,
    MalformedBuffer,
    RecursionDepthExceeded,

    EmptyNamesAreInvalid,
    InvalidNormalizedName(AmlName),
    RootHasNoParent,

    ValueDoesNotExist(AmlName),
    NameCollision(AmlName),
    TriedToRemoveRootNamespace,

    NotExecutingControlMethod,
    InvalidArgAccess(misc::ArgNum),
    InvalidLocalAccess(misc::LocalNum),
    TooManyArgs,
    BreakInInvalidPosition,
    ContinueInInvalidPosition,

    PrtInvalidAddress,
    PrtInvalidPin,
    PrtInvalidSource,
    PrtNoEntry,

    ReservedResourceType,
    ResourceDescriptorTooShort,
    ResourceDescriptorTooLong,
    UnexpectedResourceType,

    IncompatibleValueConversion { current: AmlType, target: AmlType },
    InvalidShiftLeft,
    InvalidShiftRight,
    TypeCannotBeCompared(AmlType),
    FieldRegionIsNotOpRegion,
    FieldInvalidAddress,
    FieldInvalidAccessSize,
    BufferFieldIndexesOutOfBounds,
    InvalidSizeOfApplication(AmlType),

    Timeout,

    /// Acquiring a mutex whose SyncLevel is below the scope's current SyncLevel (spec §4.6).
    SyncLevelViolation,
    /// Releasing a mutex not held at the current scope, or releasing the global lock with no
    /// outstanding hold.
    MutexNotAcquired,
}

impl From<core::convert::Infallible> for AmlError {
    fn from(value: core::convert::Infallible) -> Self {
        match value {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_sync() {
        fn test_send_sync<T: Send + Sync>() {}
        test_send_sync::<AmlContext>();
    }
}
