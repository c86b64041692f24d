//! The byte/word/dword/qword/package-length/name-string decoder (spec §4.2).
//!
//! Every decode step is bounds-checked against the window passed to [`Decoder::new`] (the
//! enclosing package or, at the top, the whole table), per spec §1's "correct framing depends on
//! package-length fields". A single `Decoder` only ever looks at `stream[0..window_end]`, so
//! nested decoders constructed for sub-packages share the same backing slice but narrower ends.

use crate::{
    misc::MAX_RECURSION_DEPTH,
    name_object::{AmlName, NamePrefix, NameSeg},
    opcode::{lookup_ext, lookup_primary, try_lnot_combine, Opcode, OpClass, OpcodeInfo},
    pkg_length::PkgLength,
    AmlError,
};
use alloc::vec::Vec;

pub struct Decoder<'a> {
    stream: &'a [u8],
    pub cursor: usize,
    /// The first byte past this decoder's window — consumption may never cross it.
    pub window_end: usize,
    recursion_depth: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(stream: &'a [u8], start: usize, window_end: usize) -> Decoder<'a> {
        Decoder { stream, cursor: start, window_end: window_end.min(stream.len()), recursion_depth: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.window_end.saturating_sub(self.cursor)
    }

    pub fn at_end(&self) -> bool {
        self.cursor >= self.window_end
    }

    pub fn peek_byte(&self) -> Result<u8, AmlError> {
        self.stream.get(self.cursor).copied().ok_or(AmlError::UnexpectedEndOfStream)
    }

    pub fn consume_u8(&mut self) -> Result<u8, AmlError> {
        let byte = self.peek_byte()?;
        if self.cursor >= self.window_end {
            return Err(AmlError::UnexpectedEndOfStream);
        }
        self.cursor += 1;
        Ok(byte)
    }

    pub fn consume_u16(&mut self) -> Result<u16, AmlError> {
        let lo = self.consume_u8()? as u16;
        let hi = self.consume_u8()? as u16;
        Ok(lo | (hi << 8))
    }

    pub fn consume_u32(&mut self) -> Result<u32, AmlError> {
        let lo = self.consume_u16()? as u32;
        let hi = self.consume_u16()? as u32;
        Ok(lo | (hi << 16))
    }

    pub fn consume_u64(&mut self) -> Result<u64, AmlError> {
        let lo = self.consume_u32()? as u64;
        let hi = self.consume_u32()? as u64;
        Ok(lo | (hi << 32))
    }

    pub fn match_byte(&mut self, expected: u8) -> Result<bool, AmlError> {
        if self.peek_byte().ok() == Some(expected) {
            self.cursor += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Decodes a `PkgLength` at the current cursor, validating it fits this decoder's window, and
    /// advances the cursor to the package body's start (spec §4.2 "Package length").
    pub fn consume_package_length(&mut self) -> Result<PkgLength, AmlError> {
        let pkg = PkgLength::parse(self.stream, self.cursor, self.window_end)?;
        self.cursor = pkg.body_start;
        Ok(pkg)
    }

    /// Carves out a sub-decoder for a just-consumed `PkgLength`'s body, bounds-checked to
    /// `pkg.end`, and advances `self.cursor` past the whole package in one step. This is how
    /// callers implement "consume a package without stepping through it field-by-field" (e.g.
    /// `consume_term_arg`'s opaque span).
    pub fn sub_decoder(&self, pkg: &PkgLength) -> Decoder<'a> {
        Decoder { stream: self.stream, cursor: pkg.body_start, window_end: pkg.end, recursion_depth: self.recursion_depth }
    }

    pub fn skip_to(&mut self, offset: usize) -> Result<(), AmlError> {
        if offset > self.window_end {
            return Err(AmlError::InvalidPkgLength);
        }
        self.cursor = offset;
        Ok(())
    }

    /// Consumes and returns `len` raw bytes (a `ByteList`, a `String`'s characters, a reserved
    /// field's padding, ...) that are data rather than further opcodes.
    pub fn consume_raw(&mut self, len: usize) -> Result<&'a [u8], AmlError> {
        let end = self.cursor.checked_add(len).ok_or(AmlError::UnexpectedEndOfStream)?;
        if end > self.window_end {
            return Err(AmlError::UnexpectedEndOfStream);
        }
        let slice = &self.stream[self.cursor..end];
        self.cursor = end;
        Ok(slice)
    }

    /// The unconsumed bytes in this decoder's window.
    pub fn remaining_bytes(&self) -> &'a [u8] {
        &self.stream[self.cursor..self.window_end]
    }

    fn one_name_seg(&mut self) -> Result<NameSeg, AmlError> {
        let b0 = self.consume_u8()?;
        let b1 = self.consume_u8()?;
        let b2 = self.consume_u8()?;
        let b3 = self.consume_u8()?;
        NameSeg::from_bytes([b0, b1, b2, b3])
    }

    /// Consumes a `NameString`: optional `\`/`^*` prefix, then `NameSeg` | `DualNamePath` |
    /// `MultiNamePath` | `NullName` (spec §4.2 "Name strings").
    pub fn consume_name_string(&mut self) -> Result<AmlName, AmlError> {
        let prefix = if self.match_byte(b'\\')? {
            NamePrefix::Root
        } else {
            let mut carets = 0usize;
            while self.match_byte(b'^')? {
                carets += 1;
            }
            if carets > 0 {
                NamePrefix::Parent(carets)
            } else {
                NamePrefix::Relative
            }
        };

        let segments = if self.match_byte(0x00)? {
            Vec::new()
        } else if self.match_byte(0x2E)? {
            let a = self.one_name_seg()?;
            let b = self.one_name_seg()?;
            alloc::vec![a, b]
        } else if self.match_byte(0x2F)? {
            let count = self.consume_u8()?;
            let mut segs = Vec::with_capacity(count as usize);
            for _ in 0..count {
                segs.push(self.one_name_seg()?);
            }
            segs
        } else {
            alloc::vec![self.one_name_seg()?]
        };

        Ok(AmlName { prefix, segments })
    }

    /// Consumes `SimpleName := NameString | ArgObj | LocalObj`, returning the raw bytes span so
    /// the evaluator can interpret it once it knows whether it's a store target or a read.
    pub fn consume_simple_name(&mut self) -> Result<SimpleNameSpan, AmlError> {
        let byte = self.peek_byte()?;
        if (0x60..=0x67).contains(&byte) {
            self.cursor += 1;
            Ok(SimpleNameSpan::Local(byte - 0x60))
        } else if (0x68..=0x6E).contains(&byte) {
            self.cursor += 1;
            Ok(SimpleNameSpan::Arg(byte - 0x68))
        } else {
            Ok(SimpleNameSpan::Name(self.consume_name_string()?))
        }
    }

    pub fn enter(&mut self) -> Result<(), AmlError> {
        self.recursion_depth += 1;
        if self.recursion_depth > MAX_RECURSION_DEPTH {
            return Err(AmlError::RecursionDepthExceeded);
        }
        Ok(())
    }

    pub fn exit(&mut self) {
        self.recursion_depth = self.recursion_depth.saturating_sub(1);
    }

    /// Peeks the opcode at the current cursor without consuming it (spec §4.2 "peek_opcode").
    /// Handles the `LNotOp` optional two-byte combine by looking one byte further ahead.
    pub fn peek_opcode(&self) -> Result<OpcodeInfo, AmlError> {
        let lead = self.peek_byte()?;
        if lead == 0x5B {
            let second = self.stream.get(self.cursor + 1).copied().ok_or(AmlError::UnexpectedEndOfStream)?;
            return lookup_ext(second).ok_or(AmlError::UnexpectedByte(second));
        }
        let info = lookup_primary(lead).ok_or(AmlError::UnexpectedByte(lead))?;
        if info.opcode == Opcode::LnotOp {
            if let Some(second) = self.stream.get(self.cursor + 1).copied() {
                if let Some(combined) = try_lnot_combine(second) {
                    return Ok(combined);
                }
            }
        }
        Ok(info)
    }

    pub fn consume_opcode(&mut self) -> Result<OpcodeInfo, AmlError> {
        let info = self.peek_opcode()?;
        self.cursor += info.width as usize;
        Ok(info)
    }

    pub fn match_opcode(&mut self, expected: Opcode) -> Result<bool, AmlError> {
        match self.peek_opcode() {
            Ok(info) if info.opcode == expected => {
                self.cursor += info.width as usize;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn is_data_object(&self) -> bool {
        matches!(self.peek_opcode(), Ok(info) if info.class == OpClass::Data)
    }

    pub fn is_expression_op(&self) -> bool {
        matches!(self.peek_opcode(), Ok(info) if info.class == OpClass::Expression)
    }

    pub fn is_statement_op(&self) -> bool {
        matches!(self.peek_opcode(), Ok(info) if info.class == OpClass::Statement)
    }

    pub fn is_namespace_modifier_op(&self) -> bool {
        matches!(self.peek_opcode(), Ok(info) if info.class == OpClass::NamespaceModifier)
    }

    pub fn is_named_object_op(&self) -> bool {
        matches!(self.peek_opcode(), Ok(info) if info.class == OpClass::NamedObject)
    }
}

#[derive(Clone, Debug)]
pub enum SimpleNameSpan {
    Name(AmlName),
    Local(u8),
    Arg(u8),
}

/// Whether `byte` can only be the lead byte of a `NameString` (root/parent prefixes, dual/multi
/// name prefixes, or a segment's lead character) — none of these appear in the primary opcode
/// table, so the evaluator checks this before trying `peek_opcode` (spec §4.2 "Name strings").
pub fn is_name_string_lead(byte: u8) -> bool {
    matches!(byte, b'\\' | b'^' | 0x2E | 0x2F | b'A'..=b'Z' | b'_')
}

/// Sign-extends `value`, treated as `from_bits` wide, to a full `u64` (used by `ToInteger` and
/// friends when the source is narrower than the context's integer width).
pub fn sign_extend_integer(value: u64, from_bits: u32) -> u64 {
    if from_bits >= 64 {
        return value;
    }
    let shift = 64 - from_bits;
    (((value << shift) as i64) >> shift) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_are_little_endian_and_bounds_checked() {
        let bytes = [0x01, 0x02, 0x03, 0x04];
        let mut dec = Decoder::new(&bytes, 0, 4);
        assert_eq!(dec.consume_u32().unwrap(), 0x04030201);
        assert!(dec.consume_u8().is_err());
    }

    #[test]
    fn name_string_dual_path() {
        let mut bytes = alloc::vec![0x2Eu8];
        bytes.extend_from_slice(b"_SB_");
        bytes.extend_from_slice(b"PCI0");
        let mut dec = Decoder::new(&bytes, 0, bytes.len());
        let name = dec.consume_name_string().unwrap();
        assert_eq!(name.segments.len(), 2);
        assert_eq!(name.segments[1].as_str(), "PCI0");
    }

    #[test]
    fn name_string_root_prefix() {
        let mut bytes = alloc::vec![b'\\'];
        bytes.extend_from_slice(b"_SB_");
        let mut dec = Decoder::new(&bytes, 0, bytes.len());
        let name = dec.consume_name_string().unwrap();
        assert!(name.is_absolute());
    }

    #[test]
    fn recursion_depth_is_bounded() {
        let bytes = [0u8; 1];
        let mut dec = Decoder::new(&bytes, 0, 1);
        for _ in 0..MAX_RECURSION_DEPTH {
            dec.enter().unwrap();
        }
        assert!(dec.enter().is_err());
    }

    #[test]
    fn sign_extend_negative_byte() {
        assert_eq!(sign_extend_integer(0xFF, 8), 0xFFFF_FFFF_FFFF_FFFF);
        assert_eq!(sign_extend_integer(0x7F, 8), 0x7F);
    }
}
