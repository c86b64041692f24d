//! The tagged value datum (spec §3 "Values").

use crate::{misc::ArgNum, namespace::NodeHandle, AmlContext, AmlError};
use alloc::{string::String, sync::Arc, vec::Vec};
use spin::Mutex;

/// Integer width selected by the loaded table's ComplianceRevision (spec §3, §6.3).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IntegerWidth {
    Bits32,
    Bits64,
}

impl IntegerWidth {
    pub fn mask(self) -> u64 {
        match self {
            IntegerWidth::Bits32 => 0xFFFF_FFFF,
            IntegerWidth::Bits64 => u64::MAX,
        }
    }

    pub fn truncate(self, value: u64) -> u64 {
        value & self.mask()
    }

    pub fn ones(self) -> u64 {
        self.mask()
    }
}

/// A shared, reference-counted buffer. Cloning an [`AmlValue::Buffer`] shares this handle (spec
/// §3: "copying a value shares the handle"). `Arc<spin::Mutex<_>>` rather than `Rc<RefCell<_>>`
/// so an `AmlContext` — and the namespace values it owns — stays `Send + Sync` for hosts that
/// share it across threads.
pub type BufferHandle = Arc<Mutex<Vec<u8>>>;
/// A shared, reference-counted package (ordered list of values).
pub type PackageHandle = Arc<Mutex<Vec<AmlValue>>>;

/// What kind of thing a `Reference` value points at — needed because `RefOf`/`DerefOf`/`Index`
/// all produce references with slightly different dereference behavior.
#[derive(Clone, Debug)]
pub enum ReferenceKind {
    /// Refers to a namespace node (the result of `RefOf` on a named object).
    Node(NodeHandle),
    /// Refers to one element of a package or buffer (the result of `Index`), identified by the
    /// backing package/buffer handle and an element/byte offset.
    PackageElement(PackageHandle, usize),
    BufferByte(BufferHandle, usize),
    /// Refers to a method-local `Local`/`Arg` slot.
    Local(u8),
    Arg(ArgNum),
}

#[derive(Clone, Debug)]
pub enum AmlValue {
    Uninitialized,
    Integer(u64),
    String(String),
    Buffer(BufferHandle),
    Package(PackageHandle),
    VarPackage(PackageHandle),
    Reference(alloc::boxed::Box<ReferenceKind>),
    /// A `FieldUnit` value: accessing it always goes through [`crate::field::FieldUnit::read`] /
    /// `write`, never a plain copy.
    FieldUnit(NodeHandle),
    /// The `Debug` pseudo-object: writes to it go to the host's debug print, reads are an error.
    Debug,
    Ones,
    Zero,
}

/// The high-level ACPI type of a value, used by implicit conversion and `ObjectType`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AmlType {
    Uninitialized,
    Integer,
    String,
    Buffer,
    Package,
    FieldUnit,
    BufferField,
    DdbHandle,
    Debug,
    Event,
    Method,
    Mutex,
    Device,
    ThermalZone,
    PowerResource,
    Processor,
    Reference,
}

impl AmlValue {
    pub fn zero() -> AmlValue {
        AmlValue::Integer(0)
    }

    pub fn ones(width: IntegerWidth) -> AmlValue {
        AmlValue::Integer(width.ones())
    }

    pub fn boolean(b: bool, width: IntegerWidth) -> AmlValue {
        if b {
            AmlValue::ones(width)
        } else {
            AmlValue::zero()
        }
    }

    pub fn type_of(&self) -> AmlType {
        match self {
            AmlValue::Uninitialized => AmlType::Uninitialized,
            AmlValue::Integer(_) | AmlValue::Ones | AmlValue::Zero => AmlType::Integer,
            AmlValue::String(_) => AmlType::String,
            AmlValue::Buffer(_) => AmlType::Buffer,
            AmlValue::Package(_) | AmlValue::VarPackage(_) => AmlType::Package,
            AmlValue::Reference(_) => AmlType::Reference,
            AmlValue::FieldUnit(_) => AmlType::FieldUnit,
            AmlValue::Debug => AmlType::Debug,
        }
    }

    pub fn as_integer(&self, context: &AmlContext) -> Result<u64, AmlError> {
        match self {
            AmlValue::Integer(i) => Ok(context.integer_width().truncate(*i)),
            AmlValue::Zero => Ok(0),
            AmlValue::Ones => Ok(context.integer_width().ones()),
            AmlValue::Buffer(buf) => {
                let buf = buf.lock();
                let mut bytes = [0u8; 8];
                let n = buf.len().min(8);
                bytes[..n].copy_from_slice(&buf[..n]);
                Ok(context.integer_width().truncate(u64::from_le_bytes(bytes)))
            }
            AmlValue::String(s) => {
                let trimmed = s.trim_start();
                let (radix, digits) =
                    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
                        (16, hex)
                    } else {
                        (10, trimmed)
                    };
                let end = digits
                    .char_indices()
                    .find(|(_, c)| !c.is_digit(radix))
                    .map(|(i, _)| i)
                    .unwrap_or(digits.len());
                u64::from_str_radix(&digits[..end], radix)
                    .map(|v| context.integer_width().truncate(v))
                    .map_err(|_| AmlError::IncompatibleValueConversion {
                        current: AmlType::String,
                        target: AmlType::Integer,
                    })
            }
            _ => Err(AmlError::IncompatibleValueConversion { current: self.type_of(), target: AmlType::Integer }),
        }
    }

    pub fn as_string(&self, _context: &AmlContext) -> Result<String, AmlError> {
        match self {
            AmlValue::String(s) => Ok(s.clone()),
            AmlValue::Integer(i) => Ok(alloc::format!("{:#X}", i)),
            _ => Err(AmlError::IncompatibleValueConversion { current: self.type_of(), target: AmlType::String }),
        }
    }

    pub fn as_buffer(&self, _context: &AmlContext) -> Result<BufferHandle, AmlError> {
        match self {
            AmlValue::Buffer(b) => Ok(b.clone()),
            AmlValue::Integer(i) => Ok(Arc::new(Mutex::new(i.to_le_bytes().to_vec()))),
            _ => Err(AmlError::IncompatibleValueConversion { current: self.type_of(), target: AmlType::Buffer }),
        }
    }

    /// Converts `self` to `target`, implementing the implicit-conversion rules a `Store` applies
    /// (spec §4.7 "store targets"). `CopyObject` never calls this — it replaces the destination
    /// outright.
    pub fn as_type(&self, target: AmlType, context: &AmlContext) -> Result<AmlValue, AmlError> {
        match target {
            AmlType::Integer => Ok(AmlValue::Integer(self.as_integer(context)?)),
            AmlType::String => Ok(AmlValue::String(self.as_string(context)?)),
            AmlType::Buffer => Ok(AmlValue::Buffer(self.as_buffer(context)?)),
            AmlType::Uninitialized => Ok(self.clone()),
            _ => Ok(self.clone()),
        }
    }
}

/// Up to 7 arguments (`Arg0`..`Arg6`) supplied to a method invocation.
#[derive(Clone, Debug, Default)]
pub struct Args {
    values: Vec<Option<AmlValue>>,
}

impl Args {
    pub const EMPTY: Args = Args { values: Vec::new() };

    pub fn from_list(values: Vec<AmlValue>) -> Args {
        Args { values: values.into_iter().map(Some).collect() }
    }

    pub fn arg(&self, num: ArgNum) -> Result<&AmlValue, AmlError> {
        self.values.get(num as usize).and_then(|v| v.as_ref()).ok_or(AmlError::InvalidArgAccess(num))
    }

    pub fn store_arg(&mut self, num: ArgNum, value: AmlValue) -> Result<(), AmlError> {
        if num as usize >= 7 {
            return Err(AmlError::InvalidArgAccess(num));
        }
        if self.values.len() <= num as usize {
            self.values.resize(num as usize + 1, None);
        }
        self.values[num as usize] = Some(value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_width_truncates() {
        assert_eq!(IntegerWidth::Bits32.truncate(0x1_0000_0001), 1);
        assert_eq!(IntegerWidth::Bits64.truncate(0x1_0000_0001), 0x1_0000_0001);
    }

    #[test]
    fn buffer_value_shares_handle() {
        let buf: BufferHandle = Arc::new(Mutex::new(alloc::vec![1, 2, 3]));
        let a = AmlValue::Buffer(buf.clone());
        let b = a.clone();
        if let AmlValue::Buffer(h) = &b {
            h.lock().push(4);
        }
        if let AmlValue::Buffer(h) = &a {
            assert_eq!(h.lock().len(), 4);
        }
    }
}
