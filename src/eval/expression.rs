//! Expression-opcode evaluation: the `TermArg` grammar production (spec §4.7 "Expression opcode
//! evaluation order"). Every function here either returns the evaluated [`AmlValue`] or, for a
//! bare data object, builds one directly without touching the namespace.

use crate::{
    decoder::{is_name_string_lead, sign_extend_integer, Decoder, SimpleNameSpan},
    eval::PassType,
    name_object::{AmlName, NamePrefix, Target},
    namespace::{NodeHandle, SearchFlags},
    object::Object,
    opcode::Opcode,
    value::{AmlType, AmlValue, Args, BufferHandle, PackageHandle, ReferenceKind},
    AmlContext, AmlError,
};
use alloc::{boxed::Box, string::String, sync::Arc, vec::Vec};
use bit_field::BitField;
use spin::Mutex;

/// Evaluates one `TermArg`: a data object, a bare name reference (a stored value, a field read, or
/// a method invocation), or an expression opcode.
pub fn term_arg(context: &mut AmlContext, decoder: &mut Decoder, pass: PassType) -> Result<AmlValue, AmlError> {
    let lead = decoder.peek_byte()?;
    if is_name_string_lead(lead) {
        let name = decoder.consume_name_string()?;
        return resolve_name_value(context, decoder, pass, name);
    }

    let info = decoder.peek_opcode()?;
    match info.opcode {
        Opcode::ZeroOp => {
            decoder.consume_opcode()?;
            Ok(AmlValue::Zero)
        }
        Opcode::OneOp => {
            decoder.consume_opcode()?;
            Ok(AmlValue::Integer(1))
        }
        Opcode::OnesOp => {
            decoder.consume_opcode()?;
            Ok(AmlValue::Ones)
        }
        Opcode::BytePrefix => {
            decoder.consume_opcode()?;
            Ok(AmlValue::Integer(decoder.consume_u8()? as u64))
        }
        Opcode::WordPrefix => {
            decoder.consume_opcode()?;
            Ok(AmlValue::Integer(decoder.consume_u16()? as u64))
        }
        Opcode::DWordPrefix => {
            decoder.consume_opcode()?;
            Ok(AmlValue::Integer(decoder.consume_u32()? as u64))
        }
        Opcode::QWordPrefix => {
            decoder.consume_opcode()?;
            Ok(AmlValue::Integer(decoder.consume_u64()?))
        }
        Opcode::StringPrefix => {
            decoder.consume_opcode()?;
            Ok(AmlValue::String(consume_ascii_string(decoder)?))
        }
        Opcode::Local0 | Opcode::Local1 | Opcode::Local2 | Opcode::Local3 | Opcode::Local4 | Opcode::Local5
        | Opcode::Local6 | Opcode::Local7 => {
            decoder.consume_opcode()?;
            let num = (info.opcode as u8).wrapping_sub(Opcode::Local0 as u8);
            context.local(num).map(|v| v.clone())
        }
        Opcode::Arg0 | Opcode::Arg1 | Opcode::Arg2 | Opcode::Arg3 | Opcode::Arg4 | Opcode::Arg5 | Opcode::Arg6 => {
            decoder.consume_opcode()?;
            let num = (info.opcode as u8).wrapping_sub(Opcode::Arg0 as u8);
            context.current_arg(num).map(|v| v.clone())
        }
        Opcode::BufferOp => buffer(context, decoder, pass),
        Opcode::PackageOp => package(context, decoder, pass, false),
        Opcode::VarPackageOp => package(context, decoder, pass, true),
        Opcode::AddOp => binary_integer(context, decoder, pass, u64::wrapping_add),
        Opcode::SubtractOp => binary_integer(context, decoder, pass, u64::wrapping_sub),
        Opcode::MultiplyOp => binary_integer(context, decoder, pass, u64::wrapping_mul),
        Opcode::AndOp => binary_integer(context, decoder, pass, |a, b| a & b),
        Opcode::NandOp => binary_integer(context, decoder, pass, |a, b| !(a & b)),
        Opcode::OrOp => binary_integer(context, decoder, pass, |a, b| a | b),
        Opcode::NorOp => binary_integer(context, decoder, pass, |a, b| !(a | b)),
        Opcode::XorOp => binary_integer(context, decoder, pass, |a, b| a ^ b),
        Opcode::ModOp => divide_or_mod(context, decoder, pass, false),
        Opcode::DivideOp => divide_or_mod(context, decoder, pass, true),
        Opcode::ShiftLeftOp => shift(context, decoder, pass, true),
        Opcode::ShiftRightOp => shift(context, decoder, pass, false),
        Opcode::NotOp => unary_integer(context, decoder, pass, |v, w| w.truncate(!v)),
        Opcode::FindSetLeftBitOp => unary_integer(context, decoder, pass, |v, _| {
            if v == 0 { 0 } else { (64 - v.leading_zeros()) as u64 }
        }),
        Opcode::FindSetRightBitOp => unary_integer(context, decoder, pass, |v, _| {
            if v == 0 { 0 } else { (v.trailing_zeros() + 1) as u64 }
        }),
        Opcode::IncrementOp => step_target(context, decoder, pass, 1),
        Opcode::DecrementOp => step_target(context, decoder, pass, -1),
        Opcode::ConcatOp => concat(context, decoder, pass),
        Opcode::ConcatResOp => concat_resource(context, decoder, pass),
        Opcode::SizeOfOp => size_of(context, decoder, pass),
        Opcode::RefOfOp => ref_of(context, decoder, pass),
        Opcode::CondRefOfOp => cond_ref_of(context, decoder, pass),
        Opcode::DerefOfOp => deref_of(context, decoder, pass),
        Opcode::IndexOp => index(context, decoder, pass),
        Opcode::MatchOp => match_op(context, decoder, pass),
        Opcode::MidOp => mid(context, decoder, pass),
        Opcode::ObjectTypeOp => object_type(context, decoder, pass),
        Opcode::LandOp => logical_binary(context, decoder, pass, |a, b| a != 0 && b != 0),
        Opcode::LorOp => logical_binary(context, decoder, pass, |a, b| a != 0 || b != 0),
        Opcode::LnotOp => {
            decoder.consume_opcode()?;
            let operand = term_arg(context, decoder, pass)?.as_integer(context)?;
            Ok(AmlValue::boolean(operand == 0, context.integer_width()))
        }
        Opcode::LEqualOp => logical_binary(context, decoder, pass, |a, b| a == b),
        Opcode::LNotEqualOp => logical_binary(context, decoder, pass, |a, b| a != b),
        Opcode::LGreaterOp => logical_binary(context, decoder, pass, |a, b| a > b),
        Opcode::LGreaterEqualOp => logical_binary(context, decoder, pass, |a, b| a >= b),
        Opcode::LLessOp => logical_binary(context, decoder, pass, |a, b| a < b),
        Opcode::LLessEqualOp => logical_binary(context, decoder, pass, |a, b| a <= b),
        Opcode::ToBufferOp => convert(context, decoder, pass, AmlType::Buffer),
        Opcode::ToIntegerOp => convert(context, decoder, pass, AmlType::Integer),
        Opcode::ToStringOp => convert(context, decoder, pass, AmlType::String),
        Opcode::ToHexStringOp => to_radix_string(context, decoder, pass, 16),
        Opcode::ToDecimalStringOp => to_radix_string(context, decoder, pass, 10),
        Opcode::FromBCDOp => bcd(context, decoder, pass, false),
        Opcode::ToBCDOp => bcd(context, decoder, pass, true),
        Opcode::AcquireOp => acquire(context, decoder, pass),
        Opcode::WaitOp => wait(context, decoder, pass),
        Opcode::RevisionOp => {
            decoder.consume_opcode()?;
            Ok(AmlValue::Integer(crate::AML_INTERPRETER_REVISION))
        }
        Opcode::TimerOp => {
            decoder.consume_opcode()?;
            Ok(AmlValue::Integer(context.handler().monotonic_timer_100ns()))
        }
        Opcode::LoadTableOp => {
            decoder.consume_opcode()?;
            Err(AmlError::UnsupportedOpcode)
        }
        _ => Err(AmlError::UnexpectedByte(lead)),
    }
}

fn consume_ascii_string(decoder: &mut Decoder) -> Result<String, AmlError> {
    let mut bytes = Vec::new();
    loop {
        let b = decoder.consume_u8()?;
        if b == 0 {
            break;
        }
        bytes.push(b);
    }
    String::from_utf8(bytes).map_err(|_| AmlError::MalformedBuffer)
}

/// What a resolved name turns out to be, captured before any `&mut AmlContext` borrow is needed
/// again (the same take-then-restore shape used for native methods elsewhere in the crate).
enum ResolvedName {
    Method { arg_count: u8 },
    Name(AmlValue),
    Field,
    BufferField { buffer_node: NodeHandle, bit_offset: u64, bit_length: u64 },
    Other,
}

pub(crate) fn resolve_name_value(
    context: &mut AmlContext,
    decoder: &mut Decoder,
    pass: PassType,
    name: AmlName,
) -> Result<AmlValue, AmlError> {
    let handle = context.namespace.search(&name, context.current_scope(), SearchFlags::empty())?;
    let kind = match context.namespace.get(handle).and_then(|n| n.object.as_ref()) {
        Some(Object::Method(info)) => ResolvedName::Method { arg_count: info.arg_count },
        Some(Object::Name(v)) => ResolvedName::Name(v.clone()),
        Some(Object::Field(_)) => ResolvedName::Field,
        Some(Object::BufferField { buffer_node, bit_offset, bit_length }) => {
            ResolvedName::BufferField { buffer_node: *buffer_node, bit_offset: *bit_offset, bit_length: *bit_length }
        }
        Some(_) => ResolvedName::Other,
        None => return Err(AmlError::ValueDoesNotExist(name)),
    };

    match kind {
        ResolvedName::Method { arg_count } => {
            if pass == PassType::Declaration {
                return Err(AmlError::NotExecutingControlMethod);
            }
            let mut values = Vec::with_capacity(arg_count as usize);
            for _ in 0..arg_count {
                values.push(term_arg(context, decoder, pass)?);
            }
            context.invoke_method(&name, Args::from_list(values))
        }
        ResolvedName::Name(v) => Ok(v),
        ResolvedName::Field => context.read_field(handle),
        ResolvedName::BufferField { buffer_node, bit_offset, bit_length } => {
            read_buffer_field(context, buffer_node, bit_offset, bit_length)
        }
        ResolvedName::Other => Err(AmlError::IncompatibleValueConversion { current: AmlType::Uninitialized, target: AmlType::Integer }),
    }
}

/// Reads `bit_length` bits starting at `bit_offset` out of the buffer backing a `CreateField`
/// declaration. Fields wider than 64 bits come back as a `Buffer`, matching the ACPI rule that
/// `CreateField` results wider than an integer stay buffer-typed.
pub(crate) fn read_buffer_field(
    context: &AmlContext,
    buffer_node: NodeHandle,
    bit_offset: u64,
    bit_length: u64,
) -> Result<AmlValue, AmlError> {
    let buffer = match context.namespace.get(buffer_node).and_then(|n| n.object.as_ref()) {
        Some(Object::Name(AmlValue::Buffer(b))) => b.clone(),
        _ => return Err(AmlError::FieldRegionIsNotOpRegion),
    };
    let bytes = buffer.lock();
    let byte_start = (bit_offset / 8) as usize;
    let bit_in_byte = (bit_offset % 8) as usize;

    if bit_length > 64 {
        let byte_len = ((bit_in_byte as u64 + bit_length) as usize + 7) / 8;
        let slice = bytes.get(byte_start..byte_start + byte_len).ok_or(AmlError::BufferFieldIndexesOutOfBounds)?;
        return Ok(AmlValue::Buffer(Arc::new(Mutex::new(slice.to_vec()))));
    }

    let needed_bytes = (bit_in_byte + bit_length as usize + 7) / 8;
    let slice = bytes.get(byte_start..byte_start + needed_bytes).ok_or(AmlError::BufferFieldIndexesOutOfBounds)?;
    let mut raw: u128 = 0;
    for (i, &b) in slice.iter().enumerate() {
        raw |= (b as u128) << (8 * i);
    }
    let value = raw.get_bits(bit_in_byte..bit_in_byte + bit_length as usize);
    Ok(AmlValue::Integer(value as u64))
}

/// Consumes a `SuperName := NameString | ArgObj | LocalObj | DebugObj`, and (for a name) resolves
/// it the same way a bare `TermArg` reference would, EXCEPT it never treats a `Method` name as an
/// invocation target that consumes further `TermArg`s — operations like `SizeOf`/`RefOf` act on
/// the name itself.
fn read_super_name(context: &mut AmlContext, decoder: &mut Decoder, pass: PassType) -> Result<AmlValue, AmlError> {
    if let Ok(info) = decoder.peek_opcode() {
        if info.opcode == Opcode::DebugOp {
            decoder.consume_opcode()?;
            return Err(AmlError::IncompatibleValueConversion { current: AmlType::Debug, target: AmlType::Integer });
        }
    }
    match decoder.consume_simple_name()? {
        SimpleNameSpan::Local(n) => context.local(n).map(|v| v.clone()),
        SimpleNameSpan::Arg(n) => context.current_arg(n).map(|v| v.clone()),
        SimpleNameSpan::Name(name) => resolve_name_value(context, decoder, pass, name),
    }
}

pub(crate) fn consume_target(decoder: &mut Decoder) -> Result<Target, AmlError> {
    if let Ok(info) = decoder.peek_opcode() {
        if info.opcode == Opcode::DebugOp {
            decoder.consume_opcode()?;
            return Ok(Target::Debug);
        }
    }
    match decoder.consume_simple_name()? {
        SimpleNameSpan::Local(n) => Ok(Target::Local(n)),
        SimpleNameSpan::Arg(n) => Ok(Target::Arg(n)),
        SimpleNameSpan::Name(name) if name.prefix == NamePrefix::Relative && name.segments.is_empty() => Ok(Target::Null),
        SimpleNameSpan::Name(name) => Ok(Target::Name(name)),
    }
}

fn binary_integer(
    context: &mut AmlContext,
    decoder: &mut Decoder,
    pass: PassType,
    f: impl Fn(u64, u64) -> u64,
) -> Result<AmlValue, AmlError> {
    decoder.consume_opcode()?;
    let a = term_arg(context, decoder, pass)?.as_integer(context)?;
    let b = term_arg(context, decoder, pass)?.as_integer(context)?;
    let target = consume_target(decoder)?;
    let result = context.integer_width().truncate(f(a, b));
    context.store(target, AmlValue::Integer(result))?;
    Ok(AmlValue::Integer(result))
}

fn unary_integer(
    context: &mut AmlContext,
    decoder: &mut Decoder,
    pass: PassType,
    f: impl Fn(u64, crate::value::IntegerWidth) -> u64,
) -> Result<AmlValue, AmlError> {
    decoder.consume_opcode()?;
    let operand = term_arg(context, decoder, pass)?.as_integer(context)?;
    let target = consume_target(decoder)?;
    let result = f(operand, context.integer_width());
    context.store(target, AmlValue::Integer(result))?;
    Ok(AmlValue::Integer(result))
}

fn shift(context: &mut AmlContext, decoder: &mut Decoder, pass: PassType, left: bool) -> Result<AmlValue, AmlError> {
    decoder.consume_opcode()?;
    let operand = term_arg(context, decoder, pass)?.as_integer(context)?;
    let count = term_arg(context, decoder, pass)?.as_integer(context)?;
    let target = consume_target(decoder)?;
    let width = context.integer_width();
    let result = if count >= 64 {
        0
    } else if left {
        width.truncate(operand << count)
    } else {
        width.truncate(operand >> count)
    };
    context.store(target, AmlValue::Integer(result))?;
    Ok(AmlValue::Integer(result))
}

fn divide_or_mod(context: &mut AmlContext, decoder: &mut Decoder, pass: PassType, is_divide: bool) -> Result<AmlValue, AmlError> {
    decoder.consume_opcode()?;
    let dividend = term_arg(context, decoder, pass)?.as_integer(context)?;
    let divisor = term_arg(context, decoder, pass)?.as_integer(context)?;
    if divisor == 0 {
        return Err(if is_divide { AmlError::InvalidShiftLeft } else { AmlError::InvalidShiftRight });
    }
    let width = context.integer_width();

    if is_divide {
        let remainder_target = consume_target(decoder)?;
        let quotient_target = consume_target(decoder)?;
        let remainder = width.truncate(dividend % divisor);
        let quotient = width.truncate(dividend / divisor);
        context.store(remainder_target, AmlValue::Integer(remainder))?;
        context.store(quotient_target, AmlValue::Integer(quotient))?;
        Ok(AmlValue::Integer(quotient))
    } else {
        let target = consume_target(decoder)?;
        let remainder = width.truncate(dividend % divisor);
        context.store(target, AmlValue::Integer(remainder))?;
        Ok(AmlValue::Integer(remainder))
    }
}

fn step_target(context: &mut AmlContext, decoder: &mut Decoder, pass: PassType, delta: i64) -> Result<AmlValue, AmlError> {
    decoder.consume_opcode()?;
    let start = decoder.cursor;
    let current = read_super_name(context, decoder, pass)?.as_integer(context)?;
    let end = decoder.cursor;
    let width = context.integer_width();
    let result = width.truncate((current as i64).wrapping_add(delta) as u64);

    // Re-walk the same SuperName span to build the store target (SuperName is also the target).
    decoder.skip_to(start)?;
    let target = consume_target(decoder)?;
    debug_assert_eq!(decoder.cursor, end);
    context.store(target, AmlValue::Integer(result))?;
    Ok(AmlValue::Integer(result))
}

fn logical_binary(
    context: &mut AmlContext,
    decoder: &mut Decoder,
    pass: PassType,
    f: impl Fn(u64, u64) -> bool,
) -> Result<AmlValue, AmlError> {
    decoder.consume_opcode()?;
    let a = term_arg(context, decoder, pass)?.as_integer(context)?;
    let b = term_arg(context, decoder, pass)?.as_integer(context)?;
    Ok(AmlValue::boolean(f(a, b), context.integer_width()))
}

fn buffer(context: &mut AmlContext, decoder: &mut Decoder, pass: PassType) -> Result<AmlValue, AmlError> {
    decoder.consume_opcode()?;
    let pkg = decoder.consume_package_length()?;
    let mut sub = decoder.sub_decoder(&pkg);
    let size = term_arg(context, &mut sub, pass)?.as_integer(context)? as usize;
    let initial = sub.remaining_bytes();
    let mut bytes = initial.to_vec();
    bytes.resize(size, 0);
    decoder.skip_to(pkg.end)?;
    Ok(AmlValue::Buffer(Arc::new(Mutex::new(bytes))))
}

fn package(context: &mut AmlContext, decoder: &mut Decoder, pass: PassType, var_len: bool) -> Result<AmlValue, AmlError> {
    decoder.consume_opcode()?;
    let pkg = decoder.consume_package_length()?;
    let mut sub = decoder.sub_decoder(&pkg);

    let declared_len = if var_len {
        term_arg(context, &mut sub, pass)?.as_integer(context)? as usize
    } else {
        sub.consume_u8()? as usize
    };

    let mut elements = Vec::with_capacity(declared_len);
    while !sub.at_end() {
        elements.push(term_arg(context, &mut sub, pass)?);
    }
    elements.resize(declared_len.max(elements.len()), AmlValue::Uninitialized);

    decoder.skip_to(pkg.end)?;
    let handle: PackageHandle = Arc::new(Mutex::new(elements));
    Ok(if var_len { AmlValue::VarPackage(handle) } else { AmlValue::Package(handle) })
}

fn concat(context: &mut AmlContext, decoder: &mut Decoder, pass: PassType) -> Result<AmlValue, AmlError> {
    decoder.consume_opcode()?;
    let a = term_arg(context, decoder, pass)?;
    let b = term_arg(context, decoder, pass)?;
    let target = consume_target(decoder)?;

    let result = if matches!(a.type_of(), AmlType::String) {
        let mut s = a.as_string(context)?;
        s.push_str(&b.as_string(context)?);
        AmlValue::String(s)
    } else {
        let mut bytes = a.as_buffer(context)?.lock().clone();
        bytes.extend_from_slice(&b.as_buffer(context)?.lock());
        AmlValue::Buffer(Arc::new(Mutex::new(bytes)))
    };

    context.store(target, result.clone())?;
    Ok(result)
}

fn concat_resource(context: &mut AmlContext, decoder: &mut Decoder, pass: PassType) -> Result<AmlValue, AmlError> {
    decoder.consume_opcode()?;
    let a = term_arg(context, decoder, pass)?.as_buffer(context)?;
    let b = term_arg(context, decoder, pass)?.as_buffer(context)?;
    let target = consume_target(decoder)?;

    let a_bytes = a.lock();
    let b_bytes = b.lock();

    let mut cut = a_bytes.len();
    let mut offset = 0;
    while offset < a_bytes.len() {
        match crate::resource::frame_descriptor(&a_bytes, offset) {
            Ok(frame) => {
                if a_bytes[offset] & 0x80 == 0 && (a_bytes[offset] >> 3) == crate::resource::END_TAG {
                    cut = offset;
                    break;
                }
                offset += frame.total_len;
            }
            Err(_) => break,
        }
    }

    let mut out = Vec::with_capacity(cut + b_bytes.len() + 2);
    out.extend_from_slice(&a_bytes[..cut]);
    out.extend_from_slice(&b_bytes);
    out.push(0x79);
    out.push(0x00);
    drop(a_bytes);
    drop(b_bytes);

    let result = AmlValue::Buffer(Arc::new(Mutex::new(out)));
    context.store(target, result.clone())?;
    Ok(result)
}

fn size_of(context: &mut AmlContext, decoder: &mut Decoder, pass: PassType) -> Result<AmlValue, AmlError> {
    decoder.consume_opcode()?;
    let value = read_super_name(context, decoder, pass)?;
    let size = match value {
        AmlValue::Buffer(b) => b.lock().len() as u64,
        AmlValue::String(s) => s.len() as u64,
        AmlValue::Package(p) | AmlValue::VarPackage(p) => p.lock().len() as u64,
        other => return Err(AmlError::InvalidSizeOfApplication(other.type_of())),
    };
    Ok(AmlValue::Integer(size))
}

fn ref_of(context: &mut AmlContext, decoder: &mut Decoder, _pass: PassType) -> Result<AmlValue, AmlError> {
    decoder.consume_opcode()?;
    let reference = reference_kind_of(context, decoder)?;
    Ok(AmlValue::Reference(Box::new(reference)))
}

fn reference_kind_of(context: &mut AmlContext, decoder: &mut Decoder) -> Result<ReferenceKind, AmlError> {
    match decoder.consume_simple_name()? {
        SimpleNameSpan::Local(n) => Ok(ReferenceKind::Local(n)),
        SimpleNameSpan::Arg(n) => Ok(ReferenceKind::Arg(n)),
        SimpleNameSpan::Name(name) => {
            let handle = context.namespace.search(&name, context.current_scope(), SearchFlags::empty())?;
            Ok(ReferenceKind::Node(handle))
        }
    }
}

fn cond_ref_of(context: &mut AmlContext, decoder: &mut Decoder, _pass: PassType) -> Result<AmlValue, AmlError> {
    decoder.consume_opcode()?;
    let start = decoder.cursor;
    let name = match decoder.consume_simple_name()? {
        SimpleNameSpan::Name(name) => name,
        _ => {
            // Locals/Args always exist; CondRefOf on one always succeeds.
            decoder.skip_to(start)?;
            let reference = reference_kind_of(context, decoder)?;
            let target = consume_target(decoder)?;
            let value = AmlValue::Reference(Box::new(reference));
            context.store(target, value)?;
            return Ok(AmlValue::ones(context.integer_width()));
        }
    };

    let found = context.namespace.search(&name, context.current_scope(), SearchFlags::empty());
    let target = consume_target(decoder)?;
    match found {
        Ok(handle) => {
            let value = AmlValue::Reference(Box::new(ReferenceKind::Node(handle)));
            context.store(target, value)?;
            Ok(AmlValue::ones(context.integer_width()))
        }
        Err(AmlError::ValueDoesNotExist(_)) => {
            context.store(target, AmlValue::zero())?;
            Ok(AmlValue::zero())
        }
        Err(err) => Err(err),
    }
}

fn deref_of(context: &mut AmlContext, decoder: &mut Decoder, pass: PassType) -> Result<AmlValue, AmlError> {
    decoder.consume_opcode()?;
    let reference = term_arg(context, decoder, pass)?;
    match reference {
        AmlValue::Reference(kind) => match *kind {
            ReferenceKind::Node(handle) => read_node_value(context, handle),
            ReferenceKind::PackageElement(pkg, idx) => {
                pkg.lock().get(idx).cloned().ok_or(AmlError::BufferFieldIndexesOutOfBounds)
            }
            ReferenceKind::BufferByte(buf, idx) => {
                buf.lock().get(idx).map(|&b| AmlValue::Integer(b as u64)).ok_or(AmlError::BufferFieldIndexesOutOfBounds)
            }
            ReferenceKind::Local(n) => context.local(n).map(|v| v.clone()),
            ReferenceKind::Arg(n) => context.current_arg(n).map(|v| v.clone()),
        },
        other => Err(AmlError::IncompatibleValueConversion { current: other.type_of(), target: AmlType::Reference }),
    }
}

fn read_node_value(context: &mut AmlContext, handle: NodeHandle) -> Result<AmlValue, AmlError> {
    let kind = match context.namespace.get(handle).and_then(|n| n.object.as_ref()) {
        Some(Object::Name(v)) => ResolvedName::Name(v.clone()),
        Some(Object::Field(_)) => ResolvedName::Field,
        Some(Object::BufferField { buffer_node, bit_offset, bit_length }) => {
            ResolvedName::BufferField { buffer_node: *buffer_node, bit_offset: *bit_offset, bit_length: *bit_length }
        }
        _ => ResolvedName::Other,
    };
    match kind {
        ResolvedName::Name(v) => Ok(v),
        ResolvedName::Field => context.read_field(handle),
        ResolvedName::BufferField { buffer_node, bit_offset, bit_length } => {
            read_buffer_field(context, buffer_node, bit_offset, bit_length)
        }
        _ => Err(AmlError::IncompatibleValueConversion { current: AmlType::Uninitialized, target: AmlType::Integer }),
    }
}

fn index(context: &mut AmlContext, decoder: &mut Decoder, pass: PassType) -> Result<AmlValue, AmlError> {
    decoder.consume_opcode()?;
    let obj = term_arg(context, decoder, pass)?;
    let idx = term_arg(context, decoder, pass)?.as_integer(context)? as usize;
    let target = consume_target(decoder)?;

    let reference = match obj {
        AmlValue::Package(p) | AmlValue::VarPackage(p) => {
            if idx >= p.lock().len() {
                return Err(AmlError::BufferFieldIndexesOutOfBounds);
            }
            ReferenceKind::PackageElement(p, idx)
        }
        AmlValue::Buffer(b) => {
            if idx >= b.lock().len() {
                return Err(AmlError::BufferFieldIndexesOutOfBounds);
            }
            ReferenceKind::BufferByte(b, idx)
        }
        other => return Err(AmlError::IncompatibleValueConversion { current: other.type_of(), target: AmlType::Buffer }),
    };

    let value = AmlValue::Reference(Box::new(reference));
    context.store(target, value.clone())?;
    Ok(value)
}

fn match_op(context: &mut AmlContext, decoder: &mut Decoder, pass: PassType) -> Result<AmlValue, AmlError> {
    decoder.consume_opcode()?;
    let search_pkg = term_arg(context, decoder, pass)?;
    let op1 = decoder.consume_u8()?;
    let operand1 = term_arg(context, decoder, pass)?.as_integer(context)?;
    let op2 = decoder.consume_u8()?;
    let operand2 = term_arg(context, decoder, pass)?.as_integer(context)?;
    let start_index = term_arg(context, decoder, pass)?.as_integer(context)? as usize;

    let elements = match &search_pkg {
        AmlValue::Package(p) | AmlValue::VarPackage(p) => p.lock().clone(),
        other => return Err(AmlError::IncompatibleValueConversion { current: other.type_of(), target: AmlType::Package }),
    };

    fn matches_op(code: u8, lhs: u64, rhs: u64) -> bool {
        match code {
            0 => true,            // MTR: always true
            1 => lhs == rhs,       // MEQ
            2 => lhs <= rhs,       // MLE
            3 => lhs < rhs,        // MLT
            4 => lhs >= rhs,       // MGE
            5 => lhs > rhs,        // MGT
            _ => false,
        }
    }

    for (i, element) in elements.iter().enumerate().skip(start_index) {
        let value = match element.as_integer(context) {
            Ok(v) => v,
            Err(_) => continue,
        };
        if matches_op(op1, value, operand1) && matches_op(op2, value, operand2) {
            return Ok(AmlValue::Integer(i as u64));
        }
    }
    Ok(AmlValue::ones(context.integer_width()))
}

fn mid(context: &mut AmlContext, decoder: &mut Decoder, pass: PassType) -> Result<AmlValue, AmlError> {
    decoder.consume_opcode()?;
    let source = term_arg(context, decoder, pass)?;
    let index = term_arg(context, decoder, pass)?.as_integer(context)? as usize;
    let length = term_arg(context, decoder, pass)?.as_integer(context)? as usize;
    let target = consume_target(decoder)?;

    let result = match source {
        AmlValue::String(s) => {
            let bytes = s.as_bytes();
            let end = (index + length).min(bytes.len());
            let start = index.min(bytes.len());
            AmlValue::String(String::from_utf8_lossy(&bytes[start..end]).into_owned())
        }
        AmlValue::Buffer(b) => {
            let bytes = b.lock();
            let end = (index + length).min(bytes.len());
            let start = index.min(bytes.len());
            AmlValue::Buffer(Arc::new(Mutex::new(bytes[start..end].to_vec())))
        }
        other => return Err(AmlError::IncompatibleValueConversion { current: other.type_of(), target: AmlType::Buffer }),
    };

    context.store(target, result.clone())?;
    Ok(result)
}

fn object_type(context: &mut AmlContext, decoder: &mut Decoder, pass: PassType) -> Result<AmlValue, AmlError> {
    decoder.consume_opcode()?;
    let value = read_super_name(context, decoder, pass)?;
    let code = match value.type_of() {
        AmlType::Uninitialized => 0,
        AmlType::Integer => 1,
        AmlType::String => 2,
        AmlType::Buffer => 3,
        AmlType::Package => 4,
        AmlType::FieldUnit => 5,
        AmlType::Device => 6,
        AmlType::Event => 7,
        AmlType::Method => 8,
        AmlType::Mutex => 9,
        AmlType::Reference => 10,
        AmlType::Debug => 16,
        AmlType::BufferField => 14,
        AmlType::DdbHandle => 15,
        AmlType::ThermalZone => 12,
        AmlType::PowerResource => 11,
        AmlType::Processor => 13,
    };
    Ok(AmlValue::Integer(code))
}

fn convert(context: &mut AmlContext, decoder: &mut Decoder, pass: PassType, target_type: AmlType) -> Result<AmlValue, AmlError> {
    decoder.consume_opcode()?;
    let value = term_arg(context, decoder, pass)?;
    let target = consume_target(decoder)?;
    let result = value.as_type(target_type, context)?;
    context.store(target, result.clone())?;
    Ok(result)
}

fn to_radix_string(context: &mut AmlContext, decoder: &mut Decoder, pass: PassType, radix: u32) -> Result<AmlValue, AmlError> {
    decoder.consume_opcode()?;
    let value = term_arg(context, decoder, pass)?.as_integer(context)?;
    let target = consume_target(decoder)?;
    let result = AmlValue::String(if radix == 16 { alloc::format!("{:X}", value) } else { alloc::format!("{}", value) });
    context.store(target, result.clone())?;
    Ok(result)
}

/// Converts between packed-BCD and plain integer representations, one decimal digit per nibble
/// (ACPI §19.6.130/19.6.24).
fn bcd(context: &mut AmlContext, decoder: &mut Decoder, pass: PassType, to_bcd: bool) -> Result<AmlValue, AmlError> {
    decoder.consume_opcode()?;
    let value = term_arg(context, decoder, pass)?.as_integer(context)?;
    let target = consume_target(decoder)?;

    let result = if to_bcd {
        let mut v = value;
        let mut out: u64 = 0;
        let mut shift = 0;
        while v > 0 {
            out |= (v % 10) << shift;
            v /= 10;
            shift += 4;
        }
        out
    } else {
        let mut v = value;
        let mut out: u64 = 0;
        let mut multiplier = 1u64;
        while v > 0 {
            out += (v & 0xF) * multiplier;
            v >>= 4;
            multiplier *= 10;
        }
        out
    };

    let result = context.integer_width().truncate(result);
    context.store(target, AmlValue::Integer(result))?;
    Ok(AmlValue::Integer(result))
}

fn acquire(context: &mut AmlContext, decoder: &mut Decoder, _pass: PassType) -> Result<AmlValue, AmlError> {
    decoder.consume_opcode()?;
    let name = match decoder.consume_simple_name()? {
        SimpleNameSpan::Name(n) => n,
        _ => return Err(AmlError::MutexNotAcquired),
    };
    let timeout = decoder.consume_u16()?;
    let handle = context.namespace.search(&name, context.current_scope(), SearchFlags::empty())?;
    let acquired = context.acquire_mutex(handle, timeout)?;
    Ok(AmlValue::boolean(!acquired, context.integer_width())) // AcquireOp returns TRUE on timeout
}

fn wait(context: &mut AmlContext, decoder: &mut Decoder, pass: PassType) -> Result<AmlValue, AmlError> {
    decoder.consume_opcode()?;
    let event = term_arg(context, decoder, pass)?;
    let timeout = term_arg(context, decoder, pass)?.as_integer(context)? as u16;
    let handle = match event {
        AmlValue::Integer(h) => h,
        _ => return Err(AmlError::IncompatibleValueConversion { current: AmlType::Event, target: AmlType::Integer }),
    };
    let result = context.handler().await_event(handle, timeout);
    Ok(AmlValue::boolean(matches!(result, crate::mutex::AcquireResult::Timeout), context.integer_width()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{eval::PassType, DebugVerbosity};
    use alloc::boxed::Box;

    struct NullHandler;
    impl crate::Handler for NullHandler {
        fn read_u8(&self, _a: usize) -> u8 { 0 }
        fn read_u16(&self, _a: usize) -> u16 { 0 }
        fn read_u32(&self, _a: usize) -> u32 { 0 }
        fn read_u64(&self, _a: usize) -> u64 { 0 }
        fn write_u8(&self, _a: usize, _v: u8) {}
        fn write_u16(&self, _a: usize, _v: u16) {}
        fn write_u32(&self, _a: usize, _v: u32) {}
        fn write_u64(&self, _a: usize, _v: u64) {}
        fn read_io_u8(&self, _p: u16) -> u8 { 0 }
        fn read_io_u16(&self, _p: u16) -> u16 { 0 }
        fn read_io_u32(&self, _p: u16) -> u32 { 0 }
        fn write_io_u8(&self, _p: u16, _v: u8) {}
        fn write_io_u16(&self, _p: u16, _v: u16) {}
        fn write_io_u32(&self, _p: u16, _v: u32) {}
        fn read_pci_u8(&self, _s: u16, _b: u8, _d: u8, _f: u8, _o: u16) -> u8 { 0 }
        fn read_pci_u16(&self, _s: u16, _b: u8, _d: u8, _f: u8, _o: u16) -> u16 { 0 }
        fn read_pci_u32(&self, _s: u16, _b: u8, _d: u8, _f: u8, _o: u16) -> u32 { 0 }
        fn write_pci_u8(&self, _s: u16, _b: u8, _d: u8, _f: u8, _o: u16, _v: u8) {}
        fn write_pci_u16(&self, _s: u16, _b: u8, _d: u8, _f: u8, _o: u16, _v: u16) {}
        fn write_pci_u32(&self, _s: u16, _b: u8, _d: u8, _f: u8, _o: u16, _v: u32) {}
        fn acquire_global_lock(&self) -> bool { true }
        fn release_global_lock(&self, _signal_pending: bool) {}
        fn global_lock_pending_bit(&self) -> bool { false }
        fn create_mutex(&self) -> crate::mutex::MutexHandle { 0 }
        fn acquire_mutex(&self, _m: crate::mutex::MutexHandle, _t: crate::misc::Timeout) -> crate::mutex::AcquireResult {
            crate::mutex::AcquireResult::Success
        }
        fn release_mutex(&self, _m: crate::mutex::MutexHandle) {}
        fn free_mutex(&self, _m: crate::mutex::MutexHandle) {}
        fn create_event(&self) -> u64 { 0 }
        fn signal_event(&self, _e: u64) {}
        fn reset_event(&self, _e: u64) {}
        fn await_event(&self, _e: u64, _t: crate::misc::Timeout) -> crate::mutex::AcquireResult {
            crate::mutex::AcquireResult::Success
        }
        fn free_event(&self, _e: u64) {}
        fn notify(&self, _d: &str, _v: u64) {}
        fn stall(&self, _us: u64) {}
        fn sleep(&self, _ms: u64) {}
        fn monotonic_timer_100ns(&self) -> u64 { 0 }
    }

    fn context() -> AmlContext {
        AmlContext::new(Box::new(NullHandler), DebugVerbosity::None)
    }

    /// Scenario S2: `LNotOp LEqualOp Zero Zero` evaluates to `Ones` (zero equals zero, negated is
    /// false... wait: LNotEqual(Zero, Zero) == false -> Zero). Directly exercises the combined
    /// two-byte opcode end to end.
    #[test]
    fn s2_lnot_lequal_combine_evaluates() {
        let mut ctx = context();
        let bytes = [0x92u8, 0x93, 0x00, 0x00]; // LNotEqualOp Zero Zero
        let mut decoder = Decoder::new(&bytes, 0, bytes.len());
        let result = term_arg(&mut ctx, &mut decoder, PassType::Full).unwrap();
        match result {
            AmlValue::Integer(v) => assert_eq!(v, 0),
            AmlValue::Zero => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn byte_prefix_reads_integer() {
        let mut ctx = context();
        let bytes = [0x0Au8, 0x42];
        let mut decoder = Decoder::new(&bytes, 0, bytes.len());
        let result = term_arg(&mut ctx, &mut decoder, PassType::Full).unwrap();
        assert!(matches!(result, AmlValue::Integer(0x42)));
    }

    #[test]
    fn add_truncates_to_integer_width() {
        let mut ctx = context();
        // AddOp, DWordPrefix 0xFFFFFFFF, BytePrefix 2, Local0 (target).
        let bytes = [0x72u8, 0x0C, 0xFF, 0xFF, 0xFF, 0xFF, 0x0A, 0x02, 0x60];
        let mut decoder = Decoder::new(&bytes, 0, bytes.len());
        let result = term_arg(&mut ctx, &mut decoder, PassType::Full).unwrap();
        assert!(matches!(result, AmlValue::Integer(1)));
    }
}
