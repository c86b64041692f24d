//! Two-level opcode table (spec §4.2 "Opcode table").
//!
//! The first byte of every AML instruction indexes a 256-entry primary table. Most entries
//! describe a complete one-byte opcode; a nonzero `sub_table` routes to a second byte, read from
//! one of two sub-tables: `ExtOpPrefix` (`0x5B`) always consumes and requires a valid second
//! byte, while `LNotOp` (`0x92`) is *optional-match* — if the next byte names `LEqualOp`,
//! `LLessOp`, or `LGreaterOp`, the combined two-byte opcode (`LNotEqualOp`, `LGreaterEqualOp`,
//! `LLessEqualOp`) is used; otherwise `LNotOp` stands alone and the second byte is left
//! unconsumed.

/// Uniquely identifies a decoded opcode, one/two bytes wide.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum Opcode {
    ZeroOp,
    OneOp,
    AliasOp,
    NameOp,
    BytePrefix,
    WordPrefix,
    DWordPrefix,
    StringPrefix,
    QWordPrefix,
    ScopeOp,
    BufferOp,
    PackageOp,
    VarPackageOp,
    MethodOp,
    ExternalOp,
    DualNamePrefix,
    MultiNamePrefix,
    NameChar,
    Local0,
    Local1,
    Local2,
    Local3,
    Local4,
    Local5,
    Local6,
    Local7,
    Arg0,
    Arg1,
    Arg2,
    Arg3,
    Arg4,
    Arg5,
    Arg6,
    StoreOp,
    RefOfOp,
    AddOp,
    ConcatOp,
    SubtractOp,
    IncrementOp,
    DecrementOp,
    MultiplyOp,
    DivideOp,
    ShiftLeftOp,
    ShiftRightOp,
    AndOp,
    NandOp,
    OrOp,
    NorOp,
    XorOp,
    NotOp,
    FindSetLeftBitOp,
    FindSetRightBitOp,
    DerefOfOp,
    ConcatResOp,
    ModOp,
    NotifyOp,
    SizeOfOp,
    IndexOp,
    MatchOp,
    CreateDWordFieldOp,
    CreateWordFieldOp,
    CreateByteFieldOp,
    CreateBitFieldOp,
    ObjectTypeOp,
    CreateQWordFieldOp,
    LandOp,
    LorOp,
    LnotOp,
    LNotEqualOp,
    LLessEqualOp,
    LGreaterEqualOp,
    LEqualOp,
    LGreaterOp,
    LLessOp,
    ToBufferOp,
    ToDecimalStringOp,
    ToHexStringOp,
    ToIntegerOp,
    ToStringOp,
    CopyObjectOp,
    MidOp,
    ContinueOp,
    IfOp,
    ElseOp,
    WhileOp,
    NoopOp,
    ReturnOp,
    BreakOp,
    BreakPointOp,
    OnesOp,
    // Two-byte opcodes, all routed through ExtOpPrefix (0x5B).
    MutexOp,
    EventOp,
    CondRefOfOp,
    CreateFieldOp,
    LoadTableOp,
    LoadOp,
    StallOp,
    SleepOp,
    AcquireOp,
    SignalOp,
    WaitOp,
    ResetOp,
    ReleaseOp,
    FromBCDOp,
    ToBCDOp,
    UnloadOp,
    RevisionOp,
    DebugOp,
    FatalOp,
    TimerOp,
    OpRegionOp,
    FieldOp,
    DeviceOp,
    ProcessorOp,
    PowerResOp,
    ThermalZoneOp,
    IndexFieldOp,
    BankFieldOp,
    DataRegionOp,
    ExtExternalOp,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OpClass {
    Data,
    Expression,
    Statement,
    NamespaceModifier,
    NamedObject,
    Other,
}

pub struct OpcodeInfo {
    pub opcode: Opcode,
    pub class: OpClass,
    /// Number of bytes the raw opcode itself occupies (1 or 2).
    pub width: u8,
}

const fn simple(opcode: Opcode, class: OpClass) -> Option<OpcodeInfo> {
    Some(OpcodeInfo { opcode, class, width: 1 })
}

const fn ext(opcode: Opcode, class: OpClass) -> Option<OpcodeInfo> {
    Some(OpcodeInfo { opcode, class, width: 2 })
}

/// Looks up the primary byte. Returns `None` for bytes that are not valid instruction leads on
/// their own (e.g. `0x5B`/`0x92` are handled specially by [`lookup_two_byte`] and
/// [`try_lnot_combine`] respectively, and plain data bytes inside buffers are not opcodes at
/// all).
pub fn lookup_primary(byte: u8) -> Option<OpcodeInfo> {
    use OpClass::*;
    use Opcode::*;
    match byte {
        0x00 => simple(ZeroOp, Data),
        0x01 => simple(OneOp, Data),
        0x06 => simple(AliasOp, NamespaceModifier),
        0x08 => simple(NameOp, NamespaceModifier),
        0x0A => simple(BytePrefix, Data),
        0x0B => simple(WordPrefix, Data),
        0x0C => simple(DWordPrefix, Data),
        0x0D => simple(StringPrefix, Data),
        0x0E => simple(QWordPrefix, Data),
        0x10 => simple(ScopeOp, NamespaceModifier),
        0x11 => simple(BufferOp, Expression),
        0x12 => simple(PackageOp, Expression),
        0x13 => simple(VarPackageOp, Expression),
        0x14 => simple(MethodOp, NamedObject),
        0x15 => simple(ExternalOp, NamespaceModifier),
        0x2E => simple(DualNamePrefix, Other),
        0x2F => simple(MultiNamePrefix, Other),
        0x41..=0x5A | 0x5F => simple(NameChar, Other),
        0x60 => simple(Local0, Expression),
        0x61 => simple(Local1, Expression),
        0x62 => simple(Local2, Expression),
        0x63 => simple(Local3, Expression),
        0x64 => simple(Local4, Expression),
        0x65 => simple(Local5, Expression),
        0x66 => simple(Local6, Expression),
        0x67 => simple(Local7, Expression),
        0x68 => simple(Arg0, Expression),
        0x69 => simple(Arg1, Expression),
        0x6A => simple(Arg2, Expression),
        0x6B => simple(Arg3, Expression),
        0x6C => simple(Arg4, Expression),
        0x6D => simple(Arg5, Expression),
        0x6E => simple(Arg6, Expression),
        0x70 => simple(StoreOp, Statement),
        0x71 => simple(RefOfOp, Expression),
        0x72 => simple(AddOp, Expression),
        0x73 => simple(ConcatOp, Expression),
        0x74 => simple(SubtractOp, Expression),
        0x75 => simple(IncrementOp, Expression),
        0x76 => simple(DecrementOp, Expression),
        0x77 => simple(MultiplyOp, Expression),
        0x78 => simple(DivideOp, Expression),
        0x79 => simple(ShiftLeftOp, Expression),
        0x7A => simple(ShiftRightOp, Expression),
        0x7B => simple(AndOp, Expression),
        0x7C => simple(NandOp, Expression),
        0x7D => simple(OrOp, Expression),
        0x7E => simple(NorOp, Expression),
        0x7F => simple(XorOp, Expression),
        0x80 => simple(NotOp, Expression),
        0x81 => simple(FindSetLeftBitOp, Expression),
        0x82 => simple(FindSetRightBitOp, Expression),
        0x83 => simple(DerefOfOp, Expression),
        0x84 => simple(ConcatResOp, Expression),
        0x85 => simple(ModOp, Expression),
        0x86 => simple(NotifyOp, Statement),
        0x87 => simple(SizeOfOp, Expression),
        0x88 => simple(IndexOp, Expression),
        0x89 => simple(MatchOp, Expression),
        0x8A => simple(CreateDWordFieldOp, NamedObject),
        0x8B => simple(CreateWordFieldOp, NamedObject),
        0x8C => simple(CreateByteFieldOp, NamedObject),
        0x8D => simple(CreateBitFieldOp, NamedObject),
        0x8E => simple(ObjectTypeOp, Expression),
        0x8F => simple(CreateQWordFieldOp, NamedObject),
        0x90 => simple(LandOp, Expression),
        0x91 => simple(LorOp, Expression),
        0x92 => simple(LnotOp, Expression),
        0x93 => simple(LEqualOp, Expression),
        0x94 => simple(LGreaterOp, Expression),
        0x95 => simple(LLessOp, Expression),
        0x96 => simple(ToBufferOp, Expression),
        0x97 => simple(ToDecimalStringOp, Expression),
        0x98 => simple(ToHexStringOp, Expression),
        0x99 => simple(ToIntegerOp, Expression),
        0x9C => simple(ToStringOp, Expression),
        0x9D => simple(CopyObjectOp, Statement),
        0x9E => simple(MidOp, Expression),
        0x9F => simple(ContinueOp, Statement),
        0xA0 => simple(IfOp, Statement),
        0xA1 => simple(ElseOp, Statement),
        0xA2 => simple(WhileOp, Statement),
        0xA3 => simple(NoopOp, Statement),
        0xA4 => simple(ReturnOp, Statement),
        0xA5 => simple(BreakOp, Statement),
        0xCC => simple(BreakPointOp, Statement),
        0xFF => simple(OnesOp, Data),
        _ => None,
    }
}

/// `ExtOpPrefix` (`0x5B`) sub-table: every entry requires a matching second byte.
pub fn lookup_ext(second: u8) -> Option<OpcodeInfo> {
    use OpClass::*;
    use Opcode::*;
    match second {
        0x01 => ext(MutexOp, NamedObject),
        0x02 => ext(EventOp, NamedObject),
        0x12 => ext(CondRefOfOp, Expression),
        0x13 => ext(CreateFieldOp, NamedObject),
        0x1F => ext(LoadTableOp, Expression),
        0x20 => ext(LoadOp, Statement),
        0x21 => ext(StallOp, Statement),
        0x22 => ext(SleepOp, Statement),
        0x23 => ext(AcquireOp, Expression),
        0x24 => ext(SignalOp, Statement),
        0x25 => ext(WaitOp, Expression),
        0x26 => ext(ResetOp, Statement),
        0x27 => ext(ReleaseOp, Statement),
        0x28 => ext(FromBCDOp, Expression),
        0x29 => ext(ToBCDOp, Expression),
        0x2A => ext(UnloadOp, Statement),
        0x30 => ext(RevisionOp, Expression),
        0x31 => ext(DebugOp, Other),
        0x32 => ext(FatalOp, Statement),
        0x33 => ext(TimerOp, Expression),
        0x80 => ext(OpRegionOp, NamedObject),
        0x81 => ext(FieldOp, NamedObject),
        0x82 => ext(DeviceOp, NamedObject),
        0x83 => ext(ProcessorOp, NamedObject),
        0x84 => ext(PowerResOp, NamedObject),
        0x85 => ext(ThermalZoneOp, NamedObject),
        0x86 => ext(IndexFieldOp, NamedObject),
        0x87 => ext(BankFieldOp, NamedObject),
        0x88 => ext(DataRegionOp, NamedObject),
        _ => None,
    }
}

/// `LNotOp` (`0x92`) sub-table: *optional* match. If `second` names one of these, the full
/// two-byte opcode replaces a bare `LnotOp`.
pub fn try_lnot_combine(second: u8) -> Option<OpcodeInfo> {
    use OpClass::*;
    use Opcode::*;
    match second {
        0x93 => ext(LNotEqualOp, Expression), // LNotOp, LEqualOp
        0x94 => ext(LLessEqualOp, Expression), // LNotOp, LGreaterOp
        0x95 => ext(LGreaterEqualOp, Expression), // LNotOp, LLessOp
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scenario S2: `{0x92, 0x93, 0x00, 0x00}` — LNotOp+LEqualOp combine into LNotEqualOp.
    #[test]
    fn s2_two_byte_opcode_disambiguation() {
        let lead = lookup_primary(0x92).unwrap();
        assert_eq!(lead.opcode, Opcode::LnotOp);
        let combined = try_lnot_combine(0x93).unwrap();
        assert_eq!(combined.opcode, Opcode::LNotEqualOp);
        assert_eq!(combined.width, 2);
    }

    #[test]
    fn lnot_standalone_when_no_combine() {
        assert!(try_lnot_combine(0x70).is_none());
    }

    #[test]
    fn ext_prefix_requires_valid_second_byte() {
        assert!(lookup_ext(0xFE).is_none());
        assert_eq!(lookup_ext(0x80).unwrap().opcode, Opcode::OpRegionOp);
    }
}
