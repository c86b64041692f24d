//! End-to-end scenario tests (spec §8 "Testable properties", S1-S6): these drive whole AML
//! tables through the public `AmlContext` API exactly as a host would, rather than exercising one
//! module's internals directly. S1 (package-length round trip), S2 (two-byte opcode
//! disambiguation) and S3 (name search walk-up) already have focused unit coverage next to the
//! code they describe (`pkg_length.rs`, `opcode.rs`, `eval/expression.rs`, `namespace/mod.rs`);
//! this file instead checks that the same behavior survives a full table load and method
//! invocation, where several subsystems run together.

use aml::{
    misc, mutex,
    opregion::{RegionHandler, RegionSpace},
    value::{AmlValue, Args},
    AmlContext, AmlError, DebugVerbosity, Handler,
};
use std::{boxed::Box, sync::Mutex, vec, vec::Vec};

/// A `Handler` that answers every host callback with an inert default. Good enough for tables
/// that never touch raw memory, I/O ports, or PCI config space directly (field/region access goes
/// through a registered `RegionHandler` instead).
struct InertHandler;

impl Handler for InertHandler {
    fn read_u8(&self, _address: usize) -> u8 {
        0
    }
    fn read_u16(&self, _address: usize) -> u16 {
        0
    }
    fn read_u32(&self, _address: usize) -> u32 {
        0
    }
    fn read_u64(&self, _address: usize) -> u64 {
        0
    }
    fn write_u8(&self, _address: usize, _value: u8) {}
    fn write_u16(&self, _address: usize, _value: u16) {}
    fn write_u32(&self, _address: usize, _value: u32) {}
    fn write_u64(&self, _address: usize, _value: u64) {}
    fn read_io_u8(&self, _port: u16) -> u8 {
        0
    }
    fn read_io_u16(&self, _port: u16) -> u16 {
        0
    }
    fn read_io_u32(&self, _port: u16) -> u32 {
        0
    }
    fn write_io_u8(&self, _port: u16, _value: u8) {}
    fn write_io_u16(&self, _port: u16, _value: u16) {}
    fn write_io_u32(&self, _port: u16, _value: u32) {}
    fn read_pci_u8(&self, _segment: u16, _bus: u8, _device: u8, _function: u8, _offset: u16) -> u8 {
        0
    }
    fn read_pci_u16(&self, _segment: u16, _bus: u8, _device: u8, _function: u8, _offset: u16) -> u16 {
        0
    }
    fn read_pci_u32(&self, _segment: u16, _bus: u8, _device: u8, _function: u8, _offset: u16) -> u32 {
        0
    }
    fn write_pci_u8(&self, _segment: u16, _bus: u8, _device: u8, _function: u8, _offset: u16, _value: u8) {}
    fn write_pci_u16(&self, _segment: u16, _bus: u8, _device: u8, _function: u8, _offset: u16, _value: u16) {}
    fn write_pci_u32(&self, _segment: u16, _bus: u8, _device: u8, _function: u8, _offset: u16, _value: u32) {}
    fn acquire_global_lock(&self) -> bool {
        true
    }
    fn release_global_lock(&self, _signal_pending: bool) {}
    fn global_lock_pending_bit(&self) -> bool {
        false
    }
    fn create_mutex(&self) -> mutex::MutexHandle {
        1
    }
    fn acquire_mutex(&self, _mutex: mutex::MutexHandle, _timeout: misc::Timeout) -> mutex::AcquireResult {
        mutex::AcquireResult::Success
    }
    fn release_mutex(&self, _mutex: mutex::MutexHandle) {}
    fn free_mutex(&self, _mutex: mutex::MutexHandle) {}
    fn create_event(&self) -> u64 {
        1
    }
    fn signal_event(&self, _event: u64) {}
    fn reset_event(&self, _event: u64) {}
    fn await_event(&self, _event: u64, _timeout: misc::Timeout) -> mutex::AcquireResult {
        mutex::AcquireResult::Success
    }
    fn free_event(&self, _event: u64) {}
    fn notify(&self, _device_path: &str, _notification_value: u64) {}
    fn stall(&self, _microseconds: u64) {}
    fn sleep(&self, _milliseconds: u64) {}
    fn monotonic_timer_100ns(&self) -> u64 {
        0
    }
}

fn inert_context() -> AmlContext {
    AmlContext::new(Box::new(InertHandler), DebugVerbosity::None)
}

/// A `SystemMemory` region handler backed by a plain byte buffer, modeled on the teacher's
/// `test_utils` memory handler.
struct MemoryRegionHandler {
    bytes: Mutex<Vec<u8>>,
}

impl RegionHandler for MemoryRegionHandler {
    fn read(&self, _region: &aml::opregion::OperationRegion, offset: u64, width_bits: u8) -> Result<u64, AmlError> {
        let bytes = self.bytes.lock().unwrap();
        let n = (width_bits / 8) as usize;
        let mut buf = [0u8; 8];
        buf[..n].copy_from_slice(&bytes[offset as usize..offset as usize + n]);
        Ok(u64::from_le_bytes(buf))
    }

    fn write(&self, _region: &aml::opregion::OperationRegion, offset: u64, width_bits: u8, value: u64) -> Result<(), AmlError> {
        let mut bytes = self.bytes.lock().unwrap();
        let n = (width_bits / 8) as usize;
        bytes[offset as usize..offset as usize + n].copy_from_slice(&value.to_le_bytes()[..n]);
        Ok(())
    }
}

/// `Method(\TEST) { If (LEqual(5, 5)) { Return (0x2A) } Return (0) }`, loaded as a table and
/// invoked by path. Exercises declaration (creating the `\TEST` node) and, separately, full-pass
/// execution of `If`/`LEqual`/`Return` inside a real method invocation.
#[test]
fn method_invocation_runs_if_else_control_flow() {
    let bytes: Vec<u8> = vec![
        0x14, 0x14, b'T', b'E', b'S', b'T', 0x00, // MethodOp, PkgLength(20), "TEST", flags
        0xA0, 0x09, 0x93, 0x0A, 0x05, 0x0A, 0x05, 0xA4, 0x0A, 0x2A, // If (LEqual(5, 5)) { Return (0x2A) }
        0xA4, 0x0A, 0x00, // Return (0)
    ];

    let mut context = inert_context();
    context.load_table(&bytes, 2).unwrap();
    context.complete_initial_load(false).unwrap();

    let result = context.evaluate_by_path("\\TEST", Args::EMPTY).unwrap();
    assert!(matches!(result, AmlValue::Integer(0x2A)));
}

/// `Device(PCI0) { Name(FOO, 7) Device(DEV0) { Method(BAR) { Return (FOO) } } }`. Invoking
/// `\PCI0.DEV0.BAR` resolves the bare name `FOO` by walking up from `DEV0`'s scope through `PCI0`,
/// the same walk-up search `namespace::tests::s3_name_search_walk_up` checks directly, but here
/// driven purely by loading a table and invoking a method by path.
#[test]
fn method_invocation_resolves_bare_name_via_scope_walk_up() {
    let method_bar: Vec<u8> = {
        let mut v = vec![0x14, 0x0B, b'B', b'A', b'R', b'_', 0x00]; // MethodOp, PkgLength(11), "BAR_", flags
        v.push(0xA4); // ReturnOp
        v.extend_from_slice(b"FOO_"); // bare-name TermArg
        v
    };
    assert_eq!(method_bar.len(), 12);

    let device_dev0: Vec<u8> = {
        let mut v = vec![0x5B, 0x82, 0x11, b'D', b'E', b'V', b'0']; // ExtOpPrefix DeviceOp PkgLength(17) "DEV0"
        v.extend_from_slice(&method_bar);
        v
    };
    assert_eq!(device_dev0.len(), 19);

    let name_foo: Vec<u8> = vec![0x08, b'F', b'O', b'O', b'_', 0x0A, 0x07]; // NameOp "FOO_" BytePrefix 7

    let device_pci0: Vec<u8> = {
        let mut v = vec![0x5B, 0x82, 0x1F, b'P', b'C', b'I', b'0']; // ExtOpPrefix DeviceOp PkgLength(31) "PCI0"
        v.extend_from_slice(&name_foo);
        v.extend_from_slice(&device_dev0);
        v
    };
    assert_eq!(device_pci0.len(), 33);

    let mut context = inert_context();
    context.load_table(&device_pci0, 2).unwrap();
    context.complete_initial_load(false).unwrap();

    let result = context.evaluate_by_path("\\PCI0.DEV0.BAR", Args::EMPTY).unwrap();
    assert!(matches!(result, AmlValue::Integer(7)));
}

/// `OperationRegion(REG0, SystemMemory, 0, 4) Field(REG0, ByteAcc, NoLock, Preserve) { BYT0, 8 }
/// Method(TEST) { Store(0x55, BYT0) Return (BYT0) }`. Exercises operation-region declaration,
/// field-list parsing, and a field read/write round trip through a registered `RegionHandler`, all
/// driven by a single method invocation.
#[test]
fn field_read_write_round_trips_through_registered_region_handler() {
    let op_region: Vec<u8> = vec![
        0x5B, 0x80, b'R', b'E', b'G', b'0', // ExtOpPrefix OpRegionOp "REG0"
        0x00, // SystemMemory
        0x00, // offset = Zero
        0x0A, 0x04, // length = 4 (BytePrefix)
    ];
    assert_eq!(op_region.len(), 10);

    let field: Vec<u8> = vec![
        0x5B, 0x81, 0x0B, b'R', b'E', b'G', b'0', // ExtOpPrefix FieldOp PkgLength(11) "REG0"
        0x01, // FieldFlags: ByteAcc, NoLock, Preserve
        b'B', b'Y', b'T', b'0', 0x08, // NamedField BYT0, 8 bits
    ];
    assert_eq!(field.len(), 13);

    let method_test: Vec<u8> = vec![
        0x14, 0x12, b'T', b'E', b'S', b'T', 0x00, // MethodOp PkgLength(18) "TEST" flags
        0x70, 0x0A, 0x55, b'B', b'Y', b'T', b'0', // Store(0x55, BYT0)
        0xA4, b'B', b'Y', b'T', b'0', // Return (BYT0)
    ];
    assert_eq!(method_test.len(), 19);

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&op_region);
    bytes.extend_from_slice(&field);
    bytes.extend_from_slice(&method_test);

    let mut context = inert_context();
    context
        .register_region_handler(RegionSpace::SystemMemory, Box::new(MemoryRegionHandler { bytes: Mutex::new(vec![0u8; 4]) }), false)
        .unwrap();
    context.load_table(&bytes, 2).unwrap();
    context.complete_initial_load(false).unwrap();

    let result = context.evaluate_by_path("\\TEST", Args::EMPTY).unwrap();
    assert!(matches!(result, AmlValue::Integer(0x55)));
}
