//! `TermObj` dispatch: the driver both passes walk over (spec §4.3 "Namespace construction",
//! §4.4 "Field units", §4.5 "Operation regions", §4.7 "Two-pass loading").

use crate::{
    decoder::{is_name_string_lead, Decoder},
    eval::{expression, statement, PassType, StepResult},
    field::{decode_field_flags, FieldAccessType, FieldBacking, FieldDescriptor, FieldLockRule, FieldUpdateRule},
    name_object::{AmlName, NameSeg},
    namespace::{LevelType, NodeHandle, ScopeFlags, SearchFlags},
    object::{MethodCode, MethodInfo, Object},
    opcode::{OpClass, Opcode},
    opregion::{OperationRegion, RegionSpace},
    pkg_length::PkgLength,
    AmlContext, AmlError,
};

/// Walks a `TermList` until the decoder's window is exhausted or a non-`Normal` `StepResult`
/// (`Break`/`Continue`/`Return`/`Fatal`) bubbles up from a nested statement or block.
pub fn term_list(
    context: &mut AmlContext,
    decoder: &mut Decoder,
    pass: PassType,
    table_index: usize,
) -> Result<StepResult, AmlError> {
    while !decoder.at_end() {
        let lead = decoder.peek_byte()?;

        if is_name_string_lead(lead) {
            let name = decoder.consume_name_string()?;
            expression::resolve_name_value(context, decoder, pass, name)?;
            continue;
        }

        let info = decoder.peek_opcode()?;
        let step = match info.class {
            OpClass::NamespaceModifier => namespace_modifier(context, decoder, pass, table_index)?,
            OpClass::NamedObject => named_object(context, decoder, pass, table_index)?,
            OpClass::Statement => statement::statement(context, decoder, pass, table_index)?,
            OpClass::Expression => {
                expression::term_arg(context, decoder, pass)?;
                StepResult::Normal
            }
            OpClass::Data | OpClass::Other => return Err(AmlError::UnexpectedByte(lead)),
        };

        if !step.is_normal() {
            return Ok(step);
        }
    }
    Ok(StepResult::Normal)
}

fn namespace_modifier(
    context: &mut AmlContext,
    decoder: &mut Decoder,
    pass: PassType,
    table_index: usize,
) -> Result<StepResult, AmlError> {
    let info = decoder.consume_opcode()?;
    match info.opcode {
        Opcode::AliasOp => {
            let source = decoder.consume_name_string()?;
            let alias_name = decoder.consume_name_string()?;
            let absolute = alias_name.resolve(context.current_scope())?;
            let handle = context.create_namespace_node(absolute, LevelType::Scope)?;
            context.namespace.set_object(handle, Object::Alias { target: source })?;
            Ok(StepResult::Normal)
        }
        Opcode::NameOp => {
            let name = decoder.consume_name_string()?;
            let absolute = name.resolve(context.current_scope())?;
            let handle = context.create_namespace_node(absolute, LevelType::Scope)?;
            let value = expression::term_arg(context, decoder, pass)?;
            context.namespace.set_object(handle, Object::Name(value))?;
            Ok(StepResult::Normal)
        }
        Opcode::ScopeOp => {
            let pkg = decoder.consume_package_length()?;
            let name = decoder.consume_name_string()?;
            let absolute = name.resolve(context.current_scope())?;
            let result = run_scoped_block(context, decoder, &pkg, &absolute, ScopeFlags::empty(), pass, table_index);
            decoder.skip_to(pkg.end)?;
            result
        }
        Opcode::ExternalOp => {
            decoder.consume_name_string()?;
            decoder.consume_u8()?; // ObjectType
            decoder.consume_u8()?; // ArgumentCount
            Ok(StepResult::Normal)
        }
        _ => Err(AmlError::UnexpectedByte(0)),
    }
}

fn named_object(
    context: &mut AmlContext,
    decoder: &mut Decoder,
    pass: PassType,
    table_index: usize,
) -> Result<StepResult, AmlError> {
    let info = decoder.consume_opcode()?;
    match info.opcode {
        Opcode::MethodOp => {
            let pkg = decoder.consume_package_length()?;
            let name = decoder.consume_name_string()?;
            let flags = decoder.consume_u8()?;
            let absolute = name.resolve(context.current_scope())?;
            let handle = context.create_namespace_node(absolute, LevelType::Scope)?;
            let method_info = MethodInfo {
                arg_count: flags & 0x7,
                serialized: flags & 0x8 != 0,
                sync_level: (flags >> 4) & 0xF,
                code: MethodCode::Aml { table_index, start: decoder.cursor, end: pkg.end },
            };
            context.namespace.set_object(handle, Object::Method(method_info))?;
            decoder.skip_to(pkg.end)?;
            Ok(StepResult::Normal)
        }
        Opcode::MutexOp => {
            let name = decoder.consume_name_string()?;
            let sync_flags = decoder.consume_u8()?;
            let absolute = name.resolve(context.current_scope())?;
            let handle = context.create_namespace_node(absolute, LevelType::Scope)?;
            let mutex_handle = context.handler().create_mutex();
            context.namespace.set_object(handle, Object::Mutex { handle: mutex_handle, sync_level: sync_flags & 0xF })?;
            Ok(StepResult::Normal)
        }
        Opcode::EventOp => {
            let name = decoder.consume_name_string()?;
            let absolute = name.resolve(context.current_scope())?;
            let handle = context.create_namespace_node(absolute, LevelType::Scope)?;
            let event_handle = context.handler().create_event();
            context.namespace.set_object(handle, Object::Event { handle: event_handle })?;
            Ok(StepResult::Normal)
        }
        Opcode::OpRegionOp => {
            let name = decoder.consume_name_string()?;
            let space_byte = decoder.consume_u8()?;
            let space = RegionSpace::from_byte(space_byte)?;
            let offset = expression::term_arg(context, decoder, pass)?.as_integer(context)?;
            let length = expression::term_arg(context, decoder, pass)?.as_integer(context)?;
            let absolute = name.resolve(context.current_scope())?;
            let handle = context.create_namespace_node(absolute, LevelType::Scope)?;
            // PCI bridge-chain resolution (`opregion::resolve_pci_bus`) needs a device-tree walk
            // of `_BBN`/`_ADR` we don't perform at declaration time; PciConfig regions are left
            // without a resolved `PciAddress` until that lookup is wired in.
            context
                .namespace
                .set_object(handle, Object::OperationRegion(OperationRegion::new(space, offset, length, None)))?;
            Ok(StepResult::Normal)
        }
        Opcode::DataRegionOp => {
            let name = decoder.consume_name_string()?;
            expression::term_arg(context, decoder, pass)?; // Signature
            expression::term_arg(context, decoder, pass)?; // OEM ID
            expression::term_arg(context, decoder, pass)?; // OEM Table ID
            let absolute = name.resolve(context.current_scope())?;
            let handle = context.create_namespace_node(absolute, LevelType::Scope)?;
            // No backing table image is mapped; this declares the node so lookups of it succeed,
            // but reads against it return zero via the usual "no handler installed" path.
            context.namespace.set_object(
                handle,
                Object::OperationRegion(OperationRegion::new(RegionSpace::SystemMemory, 0, 0, None)),
            )?;
            Ok(StepResult::Normal)
        }
        Opcode::DeviceOp => {
            let pkg = decoder.consume_package_length()?;
            let name = decoder.consume_name_string()?;
            let absolute = name.resolve(context.current_scope())?;
            let handle = context.create_namespace_node(absolute.clone(), LevelType::Device)?;
            context.namespace.set_object(handle, Object::Device)?;
            let result = run_scoped_block(context, decoder, &pkg, &absolute, ScopeFlags::empty(), pass, table_index);
            decoder.skip_to(pkg.end)?;
            result
        }
        Opcode::ThermalZoneOp => {
            let pkg = decoder.consume_package_length()?;
            let name = decoder.consume_name_string()?;
            let absolute = name.resolve(context.current_scope())?;
            let handle = context.create_namespace_node(absolute.clone(), LevelType::ThermalZone)?;
            context.namespace.set_object(handle, Object::ThermalZone)?;
            let result = run_scoped_block(context, decoder, &pkg, &absolute, ScopeFlags::empty(), pass, table_index);
            decoder.skip_to(pkg.end)?;
            result
        }
        Opcode::ProcessorOp => {
            let pkg = decoder.consume_package_length()?;
            let name = decoder.consume_name_string()?;
            let proc_id = decoder.consume_u8()?;
            let pblk_address = decoder.consume_u32()?;
            let pblk_length = decoder.consume_u8()?;
            let absolute = name.resolve(context.current_scope())?;
            let handle = context.create_namespace_node(absolute.clone(), LevelType::Processor)?;
            context.namespace.set_object(handle, Object::Processor { proc_id, pblk_address, pblk_length })?;
            let result = run_scoped_block(context, decoder, &pkg, &absolute, ScopeFlags::empty(), pass, table_index);
            decoder.skip_to(pkg.end)?;
            result
        }
        Opcode::PowerResOp => {
            let pkg = decoder.consume_package_length()?;
            let name = decoder.consume_name_string()?;
            let system_level = decoder.consume_u8()?;
            let resource_order = decoder.consume_u16()?;
            let absolute = name.resolve(context.current_scope())?;
            let handle = context.create_namespace_node(absolute.clone(), LevelType::PowerResource)?;
            context.namespace.set_object(handle, Object::PowerResource { system_level, resource_order })?;
            let result = run_scoped_block(context, decoder, &pkg, &absolute, ScopeFlags::empty(), pass, table_index);
            decoder.skip_to(pkg.end)?;
            result
        }
        Opcode::FieldOp => {
            let pkg = decoder.consume_package_length()?;
            let region_name = decoder.consume_name_string()?;
            let flags_byte = decoder.consume_u8()?;
            let region = context.namespace.search(&region_name, context.current_scope(), SearchFlags::empty())?;
            let (access_type, lock_rule, update_rule) = decode_field_flags(flags_byte)?;
            declare_field_list(context, decoder, &pkg, FieldSource::Region(region), access_type, lock_rule, update_rule)?;
            decoder.skip_to(pkg.end)?;
            Ok(StepResult::Normal)
        }
        Opcode::IndexFieldOp => {
            let pkg = decoder.consume_package_length()?;
            let index_name = decoder.consume_name_string()?;
            let data_name = decoder.consume_name_string()?;
            let flags_byte = decoder.consume_u8()?;
            let index_register = context.namespace.search(&index_name, context.current_scope(), SearchFlags::empty())?;
            let data_register = context.namespace.search(&data_name, context.current_scope(), SearchFlags::empty())?;
            let (access_type, lock_rule, update_rule) = decode_field_flags(flags_byte)?;
            declare_field_list(
                context,
                decoder,
                &pkg,
                FieldSource::Index { index_register, data_register },
                access_type,
                lock_rule,
                update_rule,
            )?;
            decoder.skip_to(pkg.end)?;
            Ok(StepResult::Normal)
        }
        Opcode::BankFieldOp => {
            let pkg = decoder.consume_package_length()?;
            let region_name = decoder.consume_name_string()?;
            let bank_name = decoder.consume_name_string()?;
            let bank_value = expression::term_arg(context, decoder, pass)?.as_integer(context)?;
            let flags_byte = decoder.consume_u8()?;
            let region = context.namespace.search(&region_name, context.current_scope(), SearchFlags::empty())?;
            let bank_select = context.namespace.search(&bank_name, context.current_scope(), SearchFlags::empty())?;
            let (access_type, lock_rule, update_rule) = decode_field_flags(flags_byte)?;
            declare_field_list(
                context,
                decoder,
                &pkg,
                FieldSource::Bank { region, bank_select, bank_value },
                access_type,
                lock_rule,
                update_rule,
            )?;
            decoder.skip_to(pkg.end)?;
            Ok(StepResult::Normal)
        }
        Opcode::CreateByteFieldOp => create_fixed_buffer_field(context, decoder, pass, 8),
        Opcode::CreateWordFieldOp => create_fixed_buffer_field(context, decoder, pass, 16),
        Opcode::CreateDWordFieldOp => create_fixed_buffer_field(context, decoder, pass, 32),
        Opcode::CreateQWordFieldOp => create_fixed_buffer_field(context, decoder, pass, 64),
        Opcode::CreateBitFieldOp => {
            let buffer_node = source_buffer_node(context, decoder)?;
            let bit_index = expression::term_arg(context, decoder, pass)?.as_integer(context)?;
            let name = decoder.consume_name_string()?;
            let absolute = name.resolve(context.current_scope())?;
            let handle = context.create_namespace_node(absolute, LevelType::Scope)?;
            context.namespace.set_object(handle, Object::BufferField { buffer_node, bit_offset: bit_index, bit_length: 1 })?;
            Ok(StepResult::Normal)
        }
        Opcode::CreateFieldOp => {
            let buffer_node = source_buffer_node(context, decoder)?;
            let bit_index = expression::term_arg(context, decoder, pass)?.as_integer(context)?;
            let bit_length = expression::term_arg(context, decoder, pass)?.as_integer(context)?;
            let name = decoder.consume_name_string()?;
            let absolute = name.resolve(context.current_scope())?;
            let handle = context.create_namespace_node(absolute, LevelType::Scope)?;
            context.namespace.set_object(handle, Object::BufferField { buffer_node, bit_offset: bit_index, bit_length })?;
            Ok(StepResult::Normal)
        }
        _ => Err(AmlError::UnexpectedByte(0)),
    }
}

/// Pushes `absolute` as the active scope, runs `pkg`'s body as a nested `TermList`, then pops the
/// scope regardless of outcome, propagating whatever `StepResult` the body produced.
fn run_scoped_block(
    context: &mut AmlContext,
    decoder: &mut Decoder,
    pkg: &PkgLength,
    absolute: &AmlName,
    flags: ScopeFlags,
    pass: PassType,
    table_index: usize,
) -> Result<StepResult, AmlError> {
    // `pkg.body_start` was fixed when the enclosing PkgLength was parsed, before the caller's
    // NameString (and, for Processor/PowerResource, its extra fixed fields) were consumed; the
    // scope's body actually starts at the decoder's current position (same fix as
    // `declare_field_list`'s `field_list_pkg`).
    let body_pkg = PkgLength { body_start: decoder.cursor, end: pkg.end };
    context.namespace.push_scope(absolute, flags)?;
    decoder.enter()?;
    let mut body = decoder.sub_decoder(&body_pkg);
    let result = term_list(context, &mut body, pass, table_index);
    decoder.exit();
    context.namespace.pop_scope()?;
    result
}

fn source_buffer_node(context: &mut AmlContext, decoder: &mut Decoder) -> Result<NodeHandle, AmlError> {
    let lead = decoder.peek_byte()?;
    if !is_name_string_lead(lead) {
        return Err(AmlError::UnsupportedOpcode);
    }
    let name = decoder.consume_name_string()?;
    context.namespace.search(&name, context.current_scope(), SearchFlags::empty())
}

fn create_fixed_buffer_field(
    context: &mut AmlContext,
    decoder: &mut Decoder,
    pass: PassType,
    bit_width: u64,
) -> Result<StepResult, AmlError> {
    let buffer_node = source_buffer_node(context, decoder)?;
    let byte_index = expression::term_arg(context, decoder, pass)?.as_integer(context)?;
    let name = decoder.consume_name_string()?;
    let absolute = name.resolve(context.current_scope())?;
    let handle = context.create_namespace_node(absolute, LevelType::Scope)?;
    context
        .namespace
        .set_object(handle, Object::BufferField { buffer_node, bit_offset: byte_index * 8, bit_length: bit_width })?;
    Ok(StepResult::Normal)
}

/// Which construct a `FieldList`'s entries read and write through; carried by value (every
/// variant holds only `Copy` node handles) so each `NamedField` can build its own
/// [`FieldBacking`] without needing `FieldBacking` itself to implement `Clone`.
#[derive(Clone, Copy)]
enum FieldSource {
    Region(NodeHandle),
    Bank { region: NodeHandle, bank_select: NodeHandle, bank_value: u64 },
    Index { index_register: NodeHandle, data_register: NodeHandle },
}

impl FieldSource {
    fn backing(self) -> FieldBacking {
        match self {
            FieldSource::Region(region) => FieldBacking::Region(region),
            FieldSource::Bank { region, bank_select, bank_value } => {
                FieldBacking::Bank { region, bank_select, bank_value }
            }
            FieldSource::Index { index_register, data_register } => {
                FieldBacking::Index { index_register, data_register }
            }
        }
    }
}

/// Decodes a `FieldList`: a run of `NamedField`/`ReservedField`/`AccessField`/`ExtendedAccessField`
/// /`ConnectField` entries, tracking the running bit offset and the currently active access type
/// (spec §4.4 "Field units"). `pkg`'s `body_start` is stale by the time this runs (the caller has
/// already consumed the region/bank/index name strings and the flags byte past it), so the window
/// actually walked starts at `decoder`'s current cursor instead.
fn declare_field_list(
    context: &mut AmlContext,
    decoder: &Decoder,
    pkg: &PkgLength,
    source: FieldSource,
    mut access_type: FieldAccessType,
    lock_rule: FieldLockRule,
    update_rule: FieldUpdateRule,
) -> Result<(), AmlError> {
    let field_list_pkg = PkgLength { body_start: decoder.cursor, end: pkg.end };
    let mut field_decoder = decoder.sub_decoder(&field_list_pkg);
    let mut bit_offset: u64 = 0;

    while !field_decoder.at_end() {
        let tag = field_decoder.consume_u8()?;
        match tag {
            // ReservedField := 0x00 PkgLength
            0x00 => bit_offset += decode_bit_length(&mut field_decoder)?,
            // AccessField := 0x01 ByteData ByteData
            0x01 => {
                let access_byte = field_decoder.consume_u8()?;
                field_decoder.consume_u8()?; // AccessAttrib
                access_type = match access_byte & 0x0F {
                    0 => FieldAccessType::Any,
                    1 => FieldAccessType::Byte,
                    2 => FieldAccessType::Word,
                    3 => FieldAccessType::DWord,
                    4 => FieldAccessType::QWord,
                    5 => FieldAccessType::Buffer,
                    _ => return Err(AmlError::InvalidFieldFlags),
                };
            }
            // ConnectField := 0x02 (NameString | BufferData)
            0x02 => {
                if is_name_string_lead(field_decoder.peek_byte()?) {
                    field_decoder.consume_name_string()?;
                } else {
                    expression::term_arg(context, &mut field_decoder, PassType::Declaration)?;
                }
            }
            // ExtendedAccessField := 0x03 ByteData ByteData ByteData
            0x03 => {
                field_decoder.consume_u8()?;
                field_decoder.consume_u8()?;
                field_decoder.consume_u8()?;
            }
            // NamedField := NameSeg PkgLength (the PkgLength here is a raw bit count, not a
            // byte-range end offset, hence `decode_bit_length` rather than `consume_package_length`).
            _ => {
                let b1 = field_decoder.consume_u8()?;
                let b2 = field_decoder.consume_u8()?;
                let b3 = field_decoder.consume_u8()?;
                let seg = NameSeg::from_bytes([tag, b1, b2, b3])?;
                let length = decode_bit_length(&mut field_decoder)?;

                let mut absolute = context.current_scope().clone();
                absolute.segments.push(seg);
                let handle = context.create_namespace_node(absolute, LevelType::Scope)?;
                context.namespace.set_object(
                    handle,
                    Object::Field(FieldDescriptor {
                        backing: source.backing(),
                        access_type,
                        lock_rule,
                        update_rule,
                        bit_offset,
                        bit_length: length,
                        global_lock_node: None,
                    }),
                )?;
                bit_offset += length;
            }
        }
    }
    Ok(())
}

/// Decodes the same lead-byte/extra-bytes varint `PkgLength` uses, but returns the raw encoded
/// value rather than translating it into a window end — `FieldList` entries encode a bit count,
/// not a byte offset to validate against an enclosing package (spec §4.4).
fn decode_bit_length(decoder: &mut Decoder) -> Result<u64, AmlError> {
    let lead = decoder.consume_u8()?;
    let extra_bytes = (lead >> 6) & 0b11;
    if extra_bytes == 0 {
        return Ok((lead & 0x3f) as u64);
    }
    let mut length = (lead & 0x0f) as u64;
    for i in 0..extra_bytes {
        let byte = decoder.consume_u8()?;
        length |= (byte as u64) << (4 + 8 * i as u64);
    }
    Ok(length)
}
