//! Field unit access policy: width, lock rule, update rule, and the read-modify-write through an
//! operation region (spec §4.4, §4.6 for the lock rule's interaction with mutexes).

use crate::{
    mutex::GLOBAL_LOCK_NAME,
    namespace::NodeHandle,
    opregion::{access_region, OperationRegion, RegionHandlerTable},
    AmlError,
};
use bit_field::BitField;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FieldAccessType {
    Any,
    Byte,
    Word,
    DWord,
    QWord,
    Buffer,
}

impl FieldAccessType {
    pub fn min_width_bits(self) -> u64 {
        match self {
            FieldAccessType::Any => 8,
            FieldAccessType::Byte => 8,
            FieldAccessType::Word => 16,
            FieldAccessType::DWord => 32,
            FieldAccessType::QWord => 64,
            FieldAccessType::Buffer => 8,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FieldUpdateRule {
    Preserve,
    WriteAsOnes,
    WriteAsZeros,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FieldLockRule {
    NoLock,
    Lock,
}

pub fn decode_field_flags(byte: u8) -> Result<(FieldAccessType, FieldLockRule, FieldUpdateRule), AmlError> {
    let access = match byte & 0x0F {
        0 => FieldAccessType::Any,
        1 => FieldAccessType::Byte,
        2 => FieldAccessType::Word,
        3 => FieldAccessType::DWord,
        4 => FieldAccessType::QWord,
        5 => FieldAccessType::Buffer,
        _ => return Err(AmlError::InvalidFieldFlags),
    };
    let lock = if byte & 0x10 != 0 { FieldLockRule::Lock } else { FieldLockRule::NoLock };
    let update = match (byte >> 5) & 0x3 {
        0 => FieldUpdateRule::Preserve,
        1 => FieldUpdateRule::WriteAsOnes,
        2 => FieldUpdateRule::WriteAsZeros,
        _ => return Err(AmlError::InvalidFieldFlags),
    };
    Ok((access, lock, update))
}

/// Which construct backs a field's bits (spec §4.4: plain region field, bank field gated by a
/// bank-select write, or index field driven through a pair of index/data registers).
pub enum FieldBacking {
    Region(NodeHandle),
    Bank { region: NodeHandle, bank_select: NodeHandle, bank_value: u64 },
    Index { index_register: NodeHandle, data_register: NodeHandle },
}

pub struct FieldDescriptor {
    pub backing: FieldBacking,
    pub access_type: FieldAccessType,
    pub lock_rule: FieldLockRule,
    pub update_rule: FieldUpdateRule,
    pub bit_offset: u64,
    pub bit_length: u64,
    /// Set when `LockRule = Lock` and the global lock needs to be acquired across this access;
    /// set by the evaluator once it knows which mutex node backs `\_GL`.
    pub global_lock_node: Option<NodeHandle>,
}

impl FieldDescriptor {
    pub fn needs_global_lock(&self) -> bool {
        self.lock_rule == FieldLockRule::Lock
    }

    /// Computes the access width and the (access-aligned) byte range a read/write of this field
    /// must touch within the backing region.
    pub fn access_plan(&self) -> (u64, u64, u64) {
        let min_width = self.access_type.min_width_bits();
        let natural = self.bit_length.next_power_of_two().max(8);
        let access_width_bits = min_width.max(natural).min(64);
        let first_byte = self.bit_offset / 8;
        let bit_in_first_byte = self.bit_offset % 8;
        (access_width_bits, first_byte, bit_in_first_byte)
    }

    /// Rejects `BufferAcc` on a region whose bounds the core itself enforces (spec §4.5: only
    /// the special space types with host-defined semantics — `GenericSerialBus`, `SmBus`,
    /// `Ipmi`, `GeneralPurposeIo` — may use it; anywhere else there's no buffer-shaped transfer
    /// for the host handler to perform).
    fn check_buffer_acc_allowed(&self, region: &OperationRegion) -> Result<(), AmlError> {
        if self.access_type == FieldAccessType::Buffer && !region.space.has_host_defined_bounds() {
            return Err(AmlError::FieldInvalidAccessSize);
        }
        Ok(())
    }

    /// Reads the field's bits out of `region` via `handlers`, assembling the result across
    /// however many access-width windows the field's bit range spans (spec §4.4 "Field units").
    pub fn read_region(&self, region: &OperationRegion, handlers: &RegionHandlerTable) -> Result<u64, AmlError> {
        self.check_buffer_acc_allowed(region)?;
        let (access_width_bits, _first_byte, _bit_in_first_byte) = self.access_plan();
        let access_width_bytes = access_width_bits / 8;

        let mut result: u64 = 0;
        let mut bits_read: u64 = 0;
        let mut bit_cursor = self.bit_offset;

        while bits_read < self.bit_length {
            let window_byte_offset = (bit_cursor / 8 / access_width_bytes) * access_width_bytes;
            let window_value = access_region(region, handlers, window_byte_offset, access_width_bits as u8, None)?;

            let bit_in_window = (bit_cursor - window_byte_offset * 8) as usize;
            let bits_remaining_in_window = access_width_bits as usize - bit_in_window;
            let bits_remaining_in_field = (self.bit_length - bits_read) as usize;
            let take = bits_remaining_in_window.min(bits_remaining_in_field).min(64);

            let chunk = if take == 64 { window_value } else { window_value.get_bits(bit_in_window..bit_in_window + take) };
            result.set_bits(bits_read as usize..(bits_read as usize + take), chunk);

            bits_read += take as u64;
            bit_cursor += take as u64;
        }

        Ok(result)
    }

    /// Writes `value`'s low `bit_length` bits into the field, respecting the update rule for
    /// bits outside the field within each touched access window (spec §4.4).
    pub fn write_region(
        &self,
        region: &OperationRegion,
        handlers: &RegionHandlerTable,
        value: u64,
    ) -> Result<(), AmlError> {
        self.check_buffer_acc_allowed(region)?;
        let (access_width_bits, _, _) = self.access_plan();
        let access_width_bytes = access_width_bits / 8;

        let mut bits_written: u64 = 0;
        let mut bit_cursor = self.bit_offset;

        while bits_written < self.bit_length {
            let window_byte_offset = (bit_cursor / 8 / access_width_bytes) * access_width_bytes;
            let bit_in_window = (bit_cursor - window_byte_offset * 8) as usize;
            let bits_remaining_in_window = access_width_bits as usize - bit_in_window;
            let bits_remaining_in_field = (self.bit_length - bits_written) as usize;
            let take = bits_remaining_in_window.min(bits_remaining_in_field).min(64);

            let existing = match self.update_rule {
                FieldUpdateRule::Preserve => {
                    access_region(region, handlers, window_byte_offset, access_width_bits as u8, None)?
                }
                FieldUpdateRule::WriteAsOnes => u64::MAX,
                FieldUpdateRule::WriteAsZeros => 0,
            };

            let chunk = (value >> bits_written) & ((1u128 << take) - 1) as u64;
            let mut window_value = existing;
            if take == 64 {
                window_value = chunk;
            } else {
                window_value.set_bits(bit_in_window..bit_in_window + take, chunk);
            }

            access_region(region, handlers, window_byte_offset, access_width_bits as u8, Some(window_value))?;

            bits_written += take as u64;
            bit_cursor += take as u64;
        }

        Ok(())
    }
}

pub fn is_global_lock_field(field_path: &str) -> bool {
    field_path == GLOBAL_LOCK_NAME
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opregion::{RegionHandler, RegionSpace};
    use alloc::{boxed::Box, vec, vec::Vec};
    use std::sync::Mutex;

    struct MemHandler {
        bytes: Mutex<Vec<u8>>,
    }

    impl RegionHandler for MemHandler {
        fn read(&self, _region: &OperationRegion, offset: u64, width_bits: u8) -> Result<u64, AmlError> {
            let bytes = self.bytes.lock().unwrap();
            let n = (width_bits / 8) as usize;
            let mut buf = [0u8; 8];
            buf[..n].copy_from_slice(&bytes[offset as usize..offset as usize + n]);
            Ok(u64::from_le_bytes(buf))
        }

        fn write(&self, _region: &OperationRegion, offset: u64, width_bits: u8, value: u64) -> Result<(), AmlError> {
            let mut bytes = self.bytes.lock().unwrap();
            let n = (width_bits / 8) as usize;
            bytes[offset as usize..offset as usize + n].copy_from_slice(&value.to_le_bytes()[..n]);
            Ok(())
        }
    }

    #[test]
    fn read_write_round_trip_byte_aligned() {
        let region = OperationRegion::new(RegionSpace::SystemMemory, 0, 16, None);
        let mut handlers = RegionHandlerTable::new();
        handlers.register(
            RegionSpace::SystemMemory,
            Box::new(MemHandler { bytes: Mutex::new(vec![0u8; 16]) }),
        );

        let field = FieldDescriptor {
            backing: FieldBacking::Region(crate::arena::ArenaIndex(0)),
            access_type: FieldAccessType::Byte,
            lock_rule: FieldLockRule::NoLock,
            update_rule: FieldUpdateRule::Preserve,
            bit_offset: 8,
            bit_length: 16,
            global_lock_node: None,
        };

        field.write_region(&region, &handlers, 0xBEEF).unwrap();
        let result = field.read_region(&region, &handlers).unwrap();
        assert_eq!(result, 0xBEEF);
    }

    #[test]
    fn preserve_update_rule_keeps_surrounding_bits() {
        let region = OperationRegion::new(RegionSpace::SystemMemory, 0, 16, None);
        let mut handlers = RegionHandlerTable::new();
        handlers.register(
            RegionSpace::SystemMemory,
            Box::new(MemHandler { bytes: Mutex::new(vec![0xFFu8; 16]) }),
        );

        let field = FieldDescriptor {
            backing: FieldBacking::Region(crate::arena::ArenaIndex(0)),
            access_type: FieldAccessType::Byte,
            lock_rule: FieldLockRule::NoLock,
            update_rule: FieldUpdateRule::Preserve,
            bit_offset: 0,
            bit_length: 4,
            global_lock_node: None,
        };
        field.write_region(&region, &handlers, 0x0).unwrap();
        // top nibble of byte 0 should be preserved as 0xF, bottom nibble cleared.
        let full_byte = access_region(&region, &handlers, 0, 8, None).unwrap();
        assert_eq!(full_byte, 0xF0);
    }

    /// BufferAcc is only meaningful for the space types with host-defined bounds (spec §4.5); on
    /// an ordinary region like `SystemMemory` there's no buffer-shaped transfer to perform, so it
    /// must be rejected rather than silently treated as an 8-bit access.
    #[test]
    fn buffer_acc_rejected_on_non_special_region() {
        let region = OperationRegion::new(RegionSpace::SystemMemory, 0, 16, None);
        let mut handlers = RegionHandlerTable::new();
        handlers.register(RegionSpace::SystemMemory, Box::new(MemHandler { bytes: Mutex::new(vec![0u8; 16]) }));

        let field = FieldDescriptor {
            backing: FieldBacking::Region(crate::arena::ArenaIndex(0)),
            access_type: FieldAccessType::Buffer,
            lock_rule: FieldLockRule::NoLock,
            update_rule: FieldUpdateRule::Preserve,
            bit_offset: 0,
            bit_length: 8,
            global_lock_node: None,
        };

        assert!(matches!(field.read_region(&region, &handlers), Err(AmlError::FieldInvalidAccessSize)));
        assert!(matches!(field.write_region(&region, &handlers, 0).unwrap_err(), AmlError::FieldInvalidAccessSize));
    }
}
