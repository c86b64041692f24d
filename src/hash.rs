//! Seeded MurmurHash3-32, used to hash namespace absolute paths (spec §4.3).

/// The namespace's fixed hash seed, `'AmlH'` read as a little-endian u32 (spec §3, Namespace node).
pub const NAMESPACE_HASH_SEED: u32 = u32::from_le_bytes(*b"AmlH");

/// MurmurHash3 x86_32, matching the reference algorithm bit-for-bit.
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e2d51;
    const C2: u32 = 0x1b873593;

    let mut hash = seed;
    let chunks = data.chunks_exact(4);
    let remainder = chunks.remainder();

    for chunk in chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(C1);
        k = k.rotate_left(15);
        k = k.wrapping_mul(C2);

        hash ^= k;
        hash = hash.rotate_left(13);
        hash = hash.wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    if !remainder.is_empty() {
        let mut k: u32 = 0;
        for (i, &byte) in remainder.iter().enumerate() {
            k |= (byte as u32) << (8 * i);
        }
        k = k.wrapping_mul(C1);
        k = k.rotate_left(15);
        k = k.wrapping_mul(C2);
        hash ^= k;
    }

    hash ^= data.len() as u32;
    hash ^= hash >> 16;
    hash = hash.wrapping_mul(0x85ebca6b);
    hash ^= hash >> 13;
    hash = hash.wrapping_mul(0xc2b2ae35);
    hash ^= hash >> 16;
    hash
}

/// Hashes a namespace absolute path: the sequence of 4-byte `NameSeg`s, each contributing 4 bytes
/// to the hashed buffer (the leading `\` is not itself hashed, since it's implicit in every
/// absolute path).
pub fn hash_path(segments: &[[u8; 4]]) -> u32 {
    let mut buf = alloc::vec::Vec::with_capacity(segments.len() * 4);
    for seg in segments {
        buf.extend_from_slice(seg);
    }
    murmur3_32(&buf, NAMESPACE_HASH_SEED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let segs = [*b"_SB_", *b"PCI0"];
        assert_eq!(hash_path(&segs), hash_path(&segs));
    }

    #[test]
    fn different_paths_usually_differ() {
        let a = [*b"_SB_", *b"PCI0"];
        let b = [*b"_SB_", *b"PCI1"];
        assert_ne!(hash_path(&a), hash_path(&b));
    }
}
