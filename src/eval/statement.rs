//! Statement-class opcode evaluation: control flow, mutation, and host-dispatched actions (spec
//! §4.7 "Control flow", §9 "Control flow via StepResult").

use crate::{
    decoder::{is_name_string_lead, Decoder},
    eval::{expression, term_object, PassType, StepResult},
    name_object::{AmlName, Target},
    namespace::{NodeHandle, SearchFlags},
    object::Object,
    opcode::Opcode,
    AmlContext, AmlError,
};
use alloc::format;

/// Evaluates one `Statement`-class construct starting at the decoder's current opcode. The
/// opcode itself is consumed here; every operand grammar after it is the callee's to read.
pub fn statement(
    context: &mut AmlContext,
    decoder: &mut Decoder,
    pass: PassType,
    table_index: usize,
) -> Result<StepResult, AmlError> {
    let info = decoder.consume_opcode()?;
    match info.opcode {
        Opcode::IfOp => if_else(context, decoder, pass, table_index),
        Opcode::WhileOp => while_loop(context, decoder, pass, table_index),

        Opcode::ReturnOp => {
            let value = expression::term_arg(context, decoder, pass)?;
            Ok(StepResult::Return(value))
        }
        Opcode::BreakOp => Ok(StepResult::Break),
        Opcode::ContinueOp => Ok(StepResult::Continue),
        Opcode::NoopOp => Ok(StepResult::Normal),
        Opcode::BreakPointOp => {
            log::warn!("BreakPoint opcode encountered during AML evaluation");
            Ok(StepResult::Normal)
        }

        Opcode::StoreOp => {
            let value = expression::term_arg(context, decoder, pass)?;
            let target = expression::consume_target(decoder)?;
            context.store(target, value)?;
            Ok(StepResult::Normal)
        }
        Opcode::CopyObjectOp => copy_object(context, decoder, pass),

        Opcode::NotifyOp => notify(context, decoder, pass),
        Opcode::FatalOp => fatal(context, decoder, pass),

        Opcode::ReleaseOp => {
            let (handle, _) = resolve_simple_name(context, decoder)?;
            context.release_mutex(handle)?;
            Ok(StepResult::Normal)
        }
        Opcode::SignalOp => {
            let (handle, name) = resolve_simple_name(context, decoder)?;
            context.handler().signal_event(event_handle_of(context, handle, &name)?);
            Ok(StepResult::Normal)
        }
        Opcode::ResetOp => {
            let (handle, name) = resolve_simple_name(context, decoder)?;
            context.handler().reset_event(event_handle_of(context, handle, &name)?);
            Ok(StepResult::Normal)
        }

        Opcode::StallOp => {
            let microseconds = expression::term_arg(context, decoder, pass)?.as_integer(context)?;
            context.handler().stall(microseconds);
            Ok(StepResult::Normal)
        }
        Opcode::SleepOp => {
            let milliseconds = expression::term_arg(context, decoder, pass)?.as_integer(context)?;
            context.handler().sleep(milliseconds);
            Ok(StepResult::Normal)
        }

        // Dynamic table loading is out of scope; see DESIGN.md.
        Opcode::LoadOp | Opcode::UnloadOp => Err(AmlError::UnsupportedOpcode),

        _ => Err(AmlError::UnexpectedByte(0)),
    }
}

/// `DefIfElse := IfOp PkgLength Predicate TermList DefElse`. The predicate and the taken branch's
/// body share one `PkgLength` window; the optional `DefElse` is framed by its own, immediately
/// following in the *outer* decoder.
fn if_else(
    context: &mut AmlContext,
    decoder: &mut Decoder,
    pass: PassType,
    table_index: usize,
) -> Result<StepResult, AmlError> {
    let pkg = decoder.consume_package_length()?;
    let mut body = decoder.sub_decoder(&pkg);
    let taken = expression::term_arg(context, &mut body, pass)?.as_integer(context)? != 0;
    let result = if taken { run_block(context, &mut body, pass, table_index)? } else { StepResult::Normal };
    decoder.skip_to(pkg.end)?;

    if decoder.match_opcode(Opcode::ElseOp)? {
        let else_pkg = decoder.consume_package_length()?;
        let mut else_body = decoder.sub_decoder(&else_pkg);
        let result = if !taken { run_block(context, &mut else_body, pass, table_index)? } else { result };
        decoder.skip_to(else_pkg.end)?;
        return Ok(result);
    }

    Ok(result)
}

/// `DefWhile := WhileOp PkgLength Predicate TermList`. A fresh sub-decoder is carved from the
/// same `PkgLength` every iteration, so the predicate re-evaluates against the loop's own window
/// rather than wherever the previous iteration's body left the cursor.
fn while_loop(
    context: &mut AmlContext,
    decoder: &mut Decoder,
    pass: PassType,
    table_index: usize,
) -> Result<StepResult, AmlError> {
    let pkg = decoder.consume_package_length()?;

    loop {
        let mut iteration = decoder.sub_decoder(&pkg);
        if expression::term_arg(context, &mut iteration, pass)?.as_integer(context)? == 0 {
            break;
        }

        match run_block(context, &mut iteration, pass, table_index)? {
            StepResult::Normal | StepResult::Continue => {}
            StepResult::Break => break,
            result @ (StepResult::Return(_) | StepResult::Fatal(_)) => {
                decoder.skip_to(pkg.end)?;
                return Ok(result);
            }
        }
    }

    decoder.skip_to(pkg.end)?;
    Ok(StepResult::Normal)
}

fn run_block(
    context: &mut AmlContext,
    decoder: &mut Decoder,
    pass: PassType,
    table_index: usize,
) -> Result<StepResult, AmlError> {
    decoder.enter()?;
    let result = term_object::term_list(context, decoder, pass, table_index);
    decoder.exit();
    result
}

/// `DefCopyObject := CopyObjectOp TermArg SimpleName`. Unlike `Store`, the destination is
/// overwritten outright — no implicit type conversion against the existing named object.
fn copy_object(context: &mut AmlContext, decoder: &mut Decoder, pass: PassType) -> Result<StepResult, AmlError> {
    let value = expression::term_arg(context, decoder, pass)?;
    match expression::consume_target(decoder)? {
        Target::Name(path) => {
            let handle = context.namespace.search(&path, context.current_scope(), SearchFlags::empty())?;
            context.namespace.set_object(handle, Object::Name(value))?;
        }
        other => {
            context.store(other, value)?;
        }
    }
    Ok(StepResult::Normal)
}

/// `DefNotify := NotifyOp NotifyObject NotifyValue`. `NotifyObject` is grammatically a
/// `SuperName`, but only a bare device/thermal-zone/processor name is meaningful here, so that's
/// the only form supported (mirrors the `SourceBuf`-as-bare-name simplification used elsewhere).
fn notify(context: &mut AmlContext, decoder: &mut Decoder, pass: PassType) -> Result<StepResult, AmlError> {
    let (handle, _) = resolve_simple_name(context, decoder)?;
    let value = expression::term_arg(context, decoder, pass)?.as_integer(context)?;
    let path = context.namespace.get(handle).map(|n| format!("{}", n.absolute_path)).unwrap_or_default();
    context.handler().notify(&path, value);
    Ok(StepResult::Normal)
}

/// `DefFatal := FatalOp FatalType FatalCode FatalArg`. `Handler::handle_fatal_error` panics by
/// default (spec §6.1); a host that overrides it to return gets ordinary control flow back.
fn fatal(context: &mut AmlContext, decoder: &mut Decoder, pass: PassType) -> Result<StepResult, AmlError> {
    let fatal_type = decoder.consume_u8()?;
    let fatal_code = decoder.consume_u32()?;
    let fatal_arg = expression::term_arg(context, decoder, pass)?.as_integer(context)?;
    context.handler().handle_fatal_error(fatal_type, fatal_code, fatal_arg);
    Ok(StepResult::Normal)
}

fn resolve_simple_name(context: &mut AmlContext, decoder: &mut Decoder) -> Result<(NodeHandle, AmlName), AmlError> {
    let lead = decoder.peek_byte()?;
    if !is_name_string_lead(lead) {
        return Err(AmlError::UnsupportedOpcode);
    }
    let name = decoder.consume_name_string()?;
    let handle = context.namespace.search(&name, context.current_scope(), SearchFlags::empty())?;
    Ok((handle, name))
}

fn event_handle_of(context: &AmlContext, handle: NodeHandle, name: &AmlName) -> Result<u64, AmlError> {
    match context.namespace.get(handle).and_then(|n| n.object.as_ref()) {
        Some(Object::Event { handle }) => Ok(*handle),
        _ => Err(AmlError::ValueDoesNotExist(name.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decoder::Decoder, misc, mutex, value::AmlValue, DebugVerbosity, Handler};
    use alloc::boxed::Box;
    use core::str::FromStr;

    struct NullHandler;
    impl Handler for NullHandler {
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

    fn new_context() -> AmlContext {
        AmlContext::new(Box::new(NullHandler), DebugVerbosity::None)
    }

const WHILE_OP: u8 = 0xA2;
    const BREAK_OP: u8 = 0xA5;
    const IF_OP: u8 = 0xA0;
    const ELSE_OP: u8 = 0xA1;
    const RETURN_OP: u8 = 0xA4;
    const COPY_OBJECT_OP: u8 = 0x9D;
    const BYTE_PREFIX: u8 = 0x0A;

    /// `While (1) { Break }` terminates after one iteration rather than looping forever.
    #[test]
    fn while_with_break_terminates() {
        let mut context = new_context();
        // WhileOp PkgLength=0x03 (covers itself + predicate + body) OneOp BreakOp
        let bytes = [WHILE_OP, 0x03, 0x01, BREAK_OP];
        let mut decoder = Decoder::new(&bytes, 0, bytes.len());
        let result = statement(&mut context, &mut decoder, PassType::Full, 0).unwrap();
        assert!(result.is_normal());
    }

    /// `If (0) {} Else { Return (1) }` takes the else branch.
    #[test]
    fn if_else_takes_else_branch_when_predicate_false() {
        let mut context = new_context();
        // IfOp PkgLength=0x02 (itself + ZeroOp predicate, empty body), ElseOp
        // PkgLength=0x03 (itself + ReturnOp + OneOp)
        let bytes = [IF_OP, 0x02, 0x00, ELSE_OP, 0x03, RETURN_OP, 0x01];
        let mut decoder = Decoder::new(&bytes, 0, bytes.len());
        let result = statement(&mut context, &mut decoder, PassType::Full, 0).unwrap();
        match result {
            StepResult::Return(AmlValue::Integer(v)) => assert_eq!(v, 1),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    /// `CopyObject (One, FOO)` overwrites `FOO` even though it held a `String` beforehand —
    /// `Store`'s implicit type conversion does not apply.
    #[test]
    fn copy_object_overwrites_without_conversion() {
        let mut context = new_context();
        let path = AmlName::from_str("\\FOO").unwrap();
        context.create_namespace_node(path.clone(), crate::namespace::LevelType::Scope).unwrap();
        let handle = context.namespace.search(&path, &AmlName::root(), SearchFlags::empty()).unwrap();
        context.namespace.set_object(handle, Object::Name(AmlValue::String("existing".into()))).unwrap();

        // CopyObjectOp OneOp \FOO
        let mut bytes = alloc::vec![COPY_OBJECT_OP, 0x01, b'\\'];
        bytes.extend_from_slice(b"FOO_");
        let mut decoder = Decoder::new(&bytes, 0, bytes.len());
        let result = statement(&mut context, &mut decoder, PassType::Full, 0).unwrap();
        assert!(result.is_normal());

        match context.namespace.get(handle).and_then(|n| n.object.as_ref()) {
            Some(Object::Name(AmlValue::Integer(v))) => assert_eq!(*v, 1),
            other => panic!("expected the node to now hold Integer(1), got {:?}", other.map(|_| ())),
        }
    }

    /// A bare `Store` into a plain `Name` applies implicit conversion to the existing type.
    #[test]
    fn store_converts_to_existing_named_type() {
        let mut context = new_context();
        let path = AmlName::from_str("\\FOO").unwrap();
        context.create_namespace_node(path.clone(), crate::namespace::LevelType::Scope).unwrap();
        let handle = context.namespace.search(&path, &AmlName::root(), SearchFlags::empty()).unwrap();
        context.namespace.set_object(handle, Object::Name(AmlValue::String(alloc::string::String::new()))).unwrap();

        // StoreOp BytePrefix(0x07) \FOO
        let mut bytes = alloc::vec![0x70, BYTE_PREFIX, 0x07, b'\\'];
        bytes.extend_from_slice(b"FOO_");
        let mut decoder = Decoder::new(&bytes, 0, bytes.len());
        let result = statement(&mut context, &mut decoder, PassType::Full, 0).unwrap();
        assert!(result.is_normal());

        match context.namespace.get(handle).and_then(|n| n.object.as_ref()) {
            Some(Object::Name(AmlValue::String(s))) => assert_eq!(s, "0x7"),
            other => panic!("expected a converted String, got {:?}", other.map(|_| ())),
        }
    }
}
