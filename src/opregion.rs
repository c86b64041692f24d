//! Operation regions: the region descriptor, host-dispatched read/write, and PCI bridge-chain
//! resolution (spec §4.5, supplemented by `original_source/src/aml_pci.c`).

use crate::{namespace::NodeHandle, AmlError};
use alloc::{boxed::Box, vec, vec::Vec};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum RegionSpace {
    SystemMemory,
    SystemIo,
    PciConfig,
    EmbeddedControl,
    SmBus,
    SystemCmos,
    PciBarTarget,
    Ipmi,
    GeneralPurposeIo,
    GenericSerialBus,
    Pcc,
    PlatformRt,
    /// OEM-defined, raw value >= 0x80.
    Oem(u8),
}

impl RegionSpace {
    pub fn from_byte(byte: u8) -> Result<RegionSpace, AmlError> {
        Ok(match byte {
            0x00 => RegionSpace::SystemMemory,
            0x01 => RegionSpace::SystemIo,
            0x02 => RegionSpace::PciConfig,
            0x03 => RegionSpace::EmbeddedControl,
            0x04 => RegionSpace::SmBus,
            0x05 => RegionSpace::SystemCmos,
            0x06 => RegionSpace::PciBarTarget,
            0x07 => RegionSpace::Ipmi,
            0x08 => RegionSpace::GeneralPurposeIo,
            0x09 => RegionSpace::GenericSerialBus,
            0x0A => RegionSpace::Pcc,
            0x0B => RegionSpace::PlatformRt,
            b if b >= 0x80 => RegionSpace::Oem(b),
            b => return Err(AmlError::InvalidRegionSpace(b)),
        })
    }

    /// Spaces whose bounds are host-defined rather than offset/length-checked by the core (spec
    /// §4.5: "except for the special space types with host-defined semantics").
    pub fn has_host_defined_bounds(self) -> bool {
        matches!(
            self,
            RegionSpace::GenericSerialBus | RegionSpace::SmBus | RegionSpace::Ipmi | RegionSpace::GeneralPurposeIo
        )
    }
}

/// Identifies a region's location on the PCI bus: the segment is fixed at declaration, but the
/// *bus* number must be resolved at access time by walking the bridge chain from the host bridge
/// (spec §4.5, `original_source/src/aml_pci.c`).
#[derive(Clone, Debug, Default)]
pub struct PciAddress {
    pub segment: u16,
    pub device: u8,
    pub function: u8,
    /// Chain of intermediate PCI-to-PCI bridge `(device, function)` pairs between the segment's
    /// root bus and this region's bus, outermost first. Empty if the region's device already
    /// lives on the root bus.
    pub bridge_chain: Vec<(u8, u8)>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LazyMapState {
    Unmapped,
    Mapped { virtual_base: usize },
}

pub struct OperationRegion {
    pub space: RegionSpace,
    pub offset: u64,
    pub length: u64,
    pub mapping: LazyMapState,
    pub pci_info: Option<PciAddress>,
}

impl OperationRegion {
    pub fn new(space: RegionSpace, offset: u64, length: u64, pci_info: Option<PciAddress>) -> OperationRegion {
        OperationRegion { space, offset, length, mapping: LazyMapState::Unmapped, pci_info }
    }

    pub fn contains(&self, access_offset: u64, access_len_bytes: u64) -> bool {
        match access_offset.checked_add(access_len_bytes) {
            Some(end) => self.offset <= access_offset && end <= self.offset + self.length,
            None => false,
        }
    }
}

/// A host-installed handler for one [`RegionSpace`] (spec §4.5, §6.1). `Send + Sync` for the same
/// reason as [`crate::Handler`]: it's reachable from `&AmlContext` across whatever threads the
/// host runs evaluation from.
pub trait RegionHandler: Send + Sync {
    fn read(&self, region: &OperationRegion, offset: u64, width_bits: u8) -> Result<u64, AmlError>;
    fn write(&self, region: &OperationRegion, offset: u64, width_bits: u8, value: u64) -> Result<(), AmlError>;
}

/// Resolves the current bus number for a PCI-config access by walking each intermediate bridge's
/// secondary-bus-number configuration register, starting from bus 0 on the region's segment
/// (`original_source/src/aml_pci.c`).
pub fn resolve_pci_bus<F>(info: &PciAddress, mut read_secondary_bus: F) -> Result<u8, AmlError>
where
    F: FnMut(u16, u8, u8, u8) -> Result<u8, AmlError>,
{
    const SECONDARY_BUS_NUMBER_OFFSET: u16 = 0x19;
    let mut bus = 0u8;
    for &(device, function) in &info.bridge_chain {
        bus = read_secondary_bus(info.segment, bus, device, function)?;
        let _ = SECONDARY_BUS_NUMBER_OFFSET;
    }
    Ok(bus)
}

/// The power-of-two access widths a region access may use (spec §4.5).
pub fn validate_access_width(width_bits: u8) -> Result<(), AmlError> {
    match width_bits {
        8 | 16 | 32 | 64 => Ok(()),
        _ => Err(AmlError::FieldInvalidAccessSize),
    }
}

/// The region read/write routine (spec §4.5 "Read/write routine"): validates bounds and width,
/// then delegates to the registered handler for `region.space`.
pub fn access_region(
    region: &OperationRegion,
    handlers: &RegionHandlerTable,
    offset: u64,
    width_bits: u8,
    write_value: Option<u64>,
) -> Result<u64, AmlError> {
    validate_access_width(width_bits)?;

    if !region.space.has_host_defined_bounds() {
        let access_bytes = width_bits as u64 / 8;
        if !region.contains(offset, access_bytes) {
            return Err(AmlError::FieldInvalidAddress);
        }
    }

    handlers.with(region.space, |handler| match (handler, write_value) {
        (Some(handler), Some(value)) => {
            handler.write(region, offset, width_bits, value)?;
            Ok(0)
        }
        (Some(handler), None) => handler.read(region, offset, width_bits),
        (None, Some(_)) => {
            log::warn!("no region handler installed for {:?}; write ignored", region.space);
            Ok(0)
        }
        (None, None) => {
            log::warn!("no region handler installed for {:?}; read returns 0", region.space);
            Ok(0)
        }
    })
}

/// Registered region-space handlers, plus the set of `Device` nodes wanting `_REG` broadcast
/// (spec §4.5 "_REG broadcast").
pub struct RegionHandlerTable {
    handlers: Vec<(RegionSpace, Box<dyn RegionHandler>)>,
}

impl RegionHandlerTable {
    pub fn new() -> RegionHandlerTable {
        RegionHandlerTable { handlers: Vec::new() }
    }

    pub fn register(&mut self, space: RegionSpace, handler: Box<dyn RegionHandler>) {
        self.handlers.retain(|(s, _)| *s != space);
        self.handlers.push((space, handler));
    }

    pub fn unregister(&mut self, space: RegionSpace) {
        self.handlers.retain(|(s, _)| *s != space);
    }

    pub fn with<R>(&self, space: RegionSpace, f: impl FnOnce(Option<&dyn RegionHandler>) -> R) -> R {
        let handler = self.handlers.iter().find(|(s, _)| *s == space).map(|(_, h)| h.as_ref());
        f(handler)
    }
}

impl Default for RegionHandlerTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Devices that registered interest via `_REG`, to be notified when a space's handler changes.
pub fn devices_wanting_reg(_space: RegionSpace, devices: &[NodeHandle]) -> &[NodeHandle] {
    devices
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullHandler;
    impl RegionHandler for NullHandler {
        fn read(&self, _region: &OperationRegion, _offset: u64, _width_bits: u8) -> Result<u64, AmlError> {
            Ok(0x1234)
        }
        fn write(&self, _region: &OperationRegion, _offset: u64, _width_bits: u8, _value: u64) -> Result<(), AmlError> {
            Ok(())
        }
    }

    /// Scenario S6: OpRegion SystemMemory at offset 0x1000 length 0x10; Field at bit offset 0x70
    /// length 0x10 (bytes 0x0E-0x0F, within bounds) succeeds; Field at bit offset 0x80 length 0x8
    /// (one byte past the end) fails with a bounds error.
    #[test]
    fn s6_operation_region_bounds() {
        let region = OperationRegion::new(RegionSpace::SystemMemory, 0x1000, 0x10, None);
        let mut handlers = RegionHandlerTable::new();
        handlers.register(RegionSpace::SystemMemory, Box::new(NullHandler));

        // Field at bit offset 0x70 -> byte offset 0x1000 + 0x70/8 = 0x1000 + 14 = 0x100E, length
        // 16 bits = 2 bytes, ending at 0x1010 == region end. In bounds.
        let byte_offset = region.offset + 0x70 / 8;
        let result = access_region(&region, &handlers, byte_offset, 16, None);
        assert!(result.is_ok());

        // Field at bit offset 0x80 -> byte offset 0x1000 + 16 = 0x1010, one byte past the region
        // end (region covers 0x1000..0x1010).
        let byte_offset = region.offset + 0x80 / 8;
        let result = access_region(&region, &handlers, byte_offset, 8, None);
        assert!(matches!(result, Err(AmlError::FieldInvalidAddress)));
    }

    #[test]
    fn buffer_acc_special_spaces_skip_bounds_check() {
        let region = OperationRegion::new(RegionSpace::GenericSerialBus, 0, 0, None);
        let mut handlers = RegionHandlerTable::new();
        handlers.register(RegionSpace::GenericSerialBus, Box::new(NullHandler));
        assert!(access_region(&region, &handlers, 999, 8, None).is_ok());
    }

    #[test]
    fn invalid_width_rejected() {
        assert!(validate_access_width(24).is_err());
        assert!(validate_access_width(8).is_ok());
    }

    #[test]
    fn pci_bus_resolution_walks_bridge_chain() {
        let info = PciAddress { segment: 0, device: 3, function: 0, bridge_chain: vec![(1, 0), (2, 0)] };
        // First bridge (1,0) on bus 0 reports secondary bus 5; second bridge (2,0) on bus 5
        // reports secondary bus 9.
        let bus = resolve_pci_bus(&info, |_seg, bus, device, _func| {
            Ok(match (bus, device) {
                (0, 1) => 5,
                (5, 2) => 9,
                _ => panic!("unexpected bridge walk step"),
            })
        })
        .unwrap();
        assert_eq!(bus, 9);
    }
}
