//! `NameSeg`/`NameString` grammar (spec §4.2 "Name strings") and the `AmlName` path type used
//! throughout the namespace.

use crate::{misc::ArgNum, misc::LocalNum, AmlError};
use alloc::{string::String, vec::Vec};
use core::{fmt, str::FromStr};

/// A single 4-byte name segment, underscore-padded when shorter than 4 characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NameSeg(pub [u8; 4]);

impl NameSeg {
    pub const EMPTY: NameSeg = NameSeg(*b"____");

    /// Parses and validates a raw 4-byte segment: the lead char must be `A-Z` or `_`; the
    /// remaining three must be `A-Z`, `_`, or `0-9`.
    pub fn from_bytes(bytes: [u8; 4]) -> Result<NameSeg, AmlError> {
        let lead_ok = matches!(bytes[0], b'A'..=b'Z' | b'_');
        let rest_ok = bytes[1..].iter().all(|&b| matches!(b, b'A'..=b'Z' | b'_' | b'0'..=b'9'));
        if lead_ok && rest_ok {
            Ok(NameSeg(bytes))
        } else {
            Err(AmlError::InvalidNameSeg)
        }
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl FromStr for NameSeg {
    type Err = AmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > 4 {
            return Err(AmlError::InvalidNameSeg);
        }
        let mut bytes = *b"____";
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        NameSeg::from_bytes(bytes)
    }
}

impl fmt::Debug for NameSeg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for NameSeg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A prefix applied before an `AmlName`'s segments: rooted (`\`), or `n` levels of parent (`^`).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NamePrefix {
    Root,
    Parent(usize),
    /// No prefix: resolved relative to the active scope at lookup time.
    Relative,
}

/// A parsed `NameString`: a prefix plus an ordered list of name segments. May be absolute or
/// relative depending on `prefix`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AmlName {
    pub prefix: NamePrefix,
    pub segments: Vec<NameSeg>,
}

impl AmlName {
    pub fn root() -> AmlName {
        AmlName { prefix: NamePrefix::Root, segments: Vec::new() }
    }

    pub fn is_absolute(&self) -> bool {
        matches!(self.prefix, NamePrefix::Root)
    }

    pub fn is_single_segment(&self) -> bool {
        matches!(self.prefix, NamePrefix::Relative) && self.segments.len() == 1
    }

    /// Resolves `self` against `scope`, producing a normalized absolute path. This is the single
    /// place path arithmetic happens: root prefix discards `scope` entirely, `^` prefixes pop
    /// segments off `scope` (erroring if that would go above the root), and a bare relative name
    /// is appended to `scope`.
    pub fn resolve(&self, scope: &AmlName) -> Result<AmlName, AmlError> {
        debug_assert!(scope.is_absolute());

        let mut base: Vec<NameSeg> = match self.prefix {
            NamePrefix::Root => Vec::new(),
            NamePrefix::Relative => scope.segments.clone(),
            NamePrefix::Parent(levels) => {
                let mut segs = scope.segments.clone();
                for _ in 0..levels {
                    if segs.pop().is_none() {
                        return Err(AmlError::InvalidNormalizedName(self.clone()));
                    }
                }
                segs
            }
        };

        base.extend_from_slice(&self.segments);
        Ok(AmlName { prefix: NamePrefix::Root, segments: base })
    }

    /// Pops the last segment, returning the parent absolute path. The root has no parent.
    pub fn parent(&self) -> Result<AmlName, AmlError> {
        if self.segments.is_empty() {
            return Err(AmlError::RootHasNoParent);
        }
        let mut segments = self.segments.clone();
        segments.pop();
        Ok(AmlName { prefix: self.prefix, segments })
    }

    pub fn last_segment(&self) -> Option<NameSeg> {
        self.segments.last().copied()
    }

    pub fn as_segment_slice(&self) -> &[NameSeg] {
        &self.segments
    }
}

impl FromStr for AmlName {
    type Err = AmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(AmlError::EmptyNamesAreInvalid);
        }

        let mut chars = s.as_bytes();
        let prefix = if chars[0] == b'\\' {
            chars = &chars[1..];
            NamePrefix::Root
        } else {
            let mut carets = 0;
            while !chars.is_empty() && chars[0] == b'^' {
                carets += 1;
                chars = &chars[1..];
            }
            if carets > 0 {
                NamePrefix::Parent(carets)
            } else {
                NamePrefix::Relative
            }
        };

        let rest = core::str::from_utf8(chars).map_err(|_| AmlError::InvalidNameSeg)?;
        let segments = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split('.').map(NameSeg::from_str).collect::<Result<Vec<_>, _>>()?
        };

        Ok(AmlName { prefix, segments })
    }
}

impl fmt::Display for AmlName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.prefix {
            NamePrefix::Root => write!(f, "\\")?,
            NamePrefix::Parent(n) => {
                for _ in 0..n {
                    write!(f, "^")?;
                }
            }
            NamePrefix::Relative => {}
        }
        for (i, seg) in self.segments.iter().enumerate() {
            if i != 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", seg)?;
        }
        Ok(())
    }
}

/// A `SuperName` grammar production, resolved down to exactly what the store/copy machinery
/// needs to act on (spec GLOSSARY "SuperName").
#[derive(Clone, Debug)]
pub enum Target {
    Null,
    Name(AmlName),
    Debug,
    Arg(ArgNum),
    Local(LocalNum),
}

pub fn owned_name_string(s: &str) -> String {
    String::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_root() {
        let n = AmlName::from_str("\\_SB.PCI0.DEV0").unwrap();
        assert!(n.is_absolute());
        assert_eq!(n.segments.len(), 3);
        assert_eq!(n.segments[0].as_str(), "_SB_");
    }

    #[test]
    fn parses_parent_prefix() {
        let n = AmlName::from_str("^^FOO").unwrap();
        assert_eq!(n.prefix, NamePrefix::Parent(2));
    }

    #[test]
    fn resolve_relative_appends() {
        let scope = AmlName::from_str("\\_SB.PCI0").unwrap();
        let rel = AmlName::from_str("DEV0").unwrap();
        let resolved = rel.resolve(&scope).unwrap();
        assert_eq!(resolved.to_string(), "\\_SB.PCI0.DEV0");
    }

    #[test]
    fn resolve_parent_above_root_fails() {
        let scope = AmlName::root();
        let rel = AmlName::from_str("^FOO").unwrap();
        assert!(rel.resolve(&scope).is_err());
    }

    #[test]
    fn nameseg_rejects_bad_lead_char() {
        assert!(NameSeg::from_bytes(*b"0ABC").is_err());
    }
}
