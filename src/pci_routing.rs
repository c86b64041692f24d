//! `_PRT` (PCI Routing Table) interpretation.
//!
//! `_PRT` returns a `Package` of 4-element packages: `(Address, Pin, Source, SourceIndex)`.
//! `Address` packs device (bits 16-31) and function (bits 0-15, 0xFFFF meaning "any"). `Source`
//! is either `0` (meaning the entry uses a raw GSI, taken from `SourceIndex`) or a named
//! reference to a `Device` object (usually a PCI link device) whose `_CRS`/`_SRS` encode the GSI.

use crate::{name_object::AmlName, value::AmlValue, AmlError};
use alloc::vec::Vec;

#[derive(Clone, Debug)]
pub enum PrtSource {
    Gsi(u32),
    LinkDevice { name: AmlName, index: u32 },
}

#[derive(Clone, Debug)]
pub struct PrtEntry {
    pub device: u16,
    pub function: Option<u8>,
    pub pin: u8,
    pub source: PrtSource,
}

/// Parses an already-evaluated `_PRT` return value into a list of entries (spec §4.5 mentions
/// PCI bridge-chain resolution; `_PRT` entries are the other half of PCI interrupt routing and
/// are grounded on the same `aml_pci.c` neighborhood in `original_source/`).
pub fn parse_prt(value: &AmlValue) -> Result<Vec<PrtEntry>, AmlError> {
    let package = match value {
        AmlValue::Package(p) | AmlValue::VarPackage(p) => p.lock(),
        _ => return Err(AmlError::PrtInvalidAddress),
    };

    let mut entries = Vec::with_capacity(package.len());
    for element in package.iter() {
        let entry_pkg = match element {
            AmlValue::Package(p) | AmlValue::VarPackage(p) => p.lock(),
            _ => return Err(AmlError::PrtInvalidAddress),
        };
        if entry_pkg.len() != 4 {
            return Err(AmlError::PrtInvalidAddress);
        }

        let address = match &entry_pkg[0] {
            AmlValue::Integer(i) => *i,
            _ => return Err(AmlError::PrtInvalidAddress),
        };
        let device = ((address >> 16) & 0xFFFF) as u16;
        let function = match address & 0xFFFF {
            0xFFFF => None,
            f => Some(f as u8),
        };

        let pin = match &entry_pkg[1] {
            AmlValue::Integer(i) => *i as u8,
            _ => return Err(AmlError::PrtInvalidPin),
        };

        let index = match &entry_pkg[3] {
            AmlValue::Integer(i) => *i as u32,
            _ => return Err(AmlError::PrtInvalidSource),
        };

        let source = match &entry_pkg[2] {
            AmlValue::Integer(0) => PrtSource::Gsi(index),
            AmlValue::Integer(_) => return Err(AmlError::PrtInvalidSource),
            AmlValue::String(s) => {
                PrtSource::LinkDevice { name: s.parse::<AmlName>().map_err(|_| AmlError::PrtInvalidSource)?, index }
            }
            _ => return Err(AmlError::PrtInvalidSource),
        };

        entries.push(PrtEntry { device, function, pin, source });
    }

    Ok(entries)
}

/// Looks up the routing entry matching `(device, function, pin)`, preferring a function-specific
/// entry over a wildcard (`function: None`) one (spec §8 GLOSSARY mentions no direct scenario for
/// this, but ACPI 6.x §6.2.13 specifies function-specific entries take priority).
pub fn find_entry<'a>(entries: &'a [PrtEntry], device: u16, function: u8, pin: u8) -> Option<&'a PrtEntry> {
    entries
        .iter()
        .find(|e| e.device == device && e.pin == pin && e.function == Some(function))
        .or_else(|| entries.iter().find(|e| e.device == device && e.pin == pin && e.function.is_none()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::{sync::Arc, vec};
    use spin::Mutex;

    fn pkg(values: Vec<AmlValue>) -> AmlValue {
        AmlValue::Package(Arc::new(Mutex::new(values)))
    }

    #[test]
    fn parses_gsi_entry() {
        let prt = pkg(vec![pkg(vec![
            AmlValue::Integer(0x0002_FFFF), // device 2, any function
            AmlValue::Integer(1),           // INTB
            AmlValue::Integer(0),           // GSI source
            AmlValue::Integer(16),
        ])]);

        let entries = parse_prt(&prt).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].device, 2);
        assert!(entries[0].function.is_none());
        assert!(matches!(entries[0].source, PrtSource::Gsi(16)));
    }

    #[test]
    fn find_entry_prefers_function_specific() {
        let entries = vec![
            PrtEntry { device: 2, function: None, pin: 0, source: PrtSource::Gsi(10) },
            PrtEntry { device: 2, function: Some(1), pin: 0, source: PrtSource::Gsi(11) },
        ];
        let found = find_entry(&entries, 2, 1, 0).unwrap();
        assert!(matches!(found.source, PrtSource::Gsi(11)));
    }
}
