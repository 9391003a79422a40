use crate::LzError;

const THREE_BPP_CHUNK: usize = 0x18;
const FOUR_BPP_CHUNK: usize = 0x20;
// Bytes at the front of each chunk copied as is.
const PLAIN_HALF: usize = 0x10;

/// Widen 3bpp tiles to 4bpp: in each $18 byte chunk the first 16 bytes
/// are copied and each of the last 8 is followed by a zero (the fourth
/// plane).
///
/// # Errors
/// `BadChunk` unless the input is a multiple of $18 bytes.
pub fn expand_second_half(input: &[u8]) -> Result<Vec<u8>, LzError> {
    if input.len() % THREE_BPP_CHUNK != 0 {
        return Err(LzError::BadChunk {
            len: input.len(),
            chunk: THREE_BPP_CHUNK,
        });
    }
    let mut out = Vec::with_capacity(input.len() / THREE_BPP_CHUNK * FOUR_BPP_CHUNK);
    for chunk in input.chunks(THREE_BPP_CHUNK) {
        out.extend_from_slice(&chunk[..PLAIN_HALF]);
        for &b in &chunk[PLAIN_HALF..] {
            out.extend([b, 0]);
        }
    }
    Ok(out)
}

/// Inverse of `expand_second_half`.
///
/// # Errors
/// `BadChunk` unless the input is a multiple of $20 bytes and
/// `NonZeroPad` if any fourth plane byte isn't 0.
pub fn compact_second_half(input: &[u8]) -> Result<Vec<u8>, LzError> {
    if input.len() % FOUR_BPP_CHUNK != 0 {
        return Err(LzError::BadChunk {
            len: input.len(),
            chunk: FOUR_BPP_CHUNK,
        });
    }
    let mut out = Vec::with_capacity(input.len() / FOUR_BPP_CHUNK * THREE_BPP_CHUNK);
    for (n, chunk) in input.chunks(FOUR_BPP_CHUNK).enumerate() {
        out.extend_from_slice(&chunk[..PLAIN_HALF]);
        for (i, pair) in chunk[PLAIN_HALF..].chunks(2).enumerate() {
            if pair[1] != 0 {
                return Err(LzError::NonZeroPad {
                    offset: n * FOUR_BPP_CHUNK + PLAIN_HALF + i * 2 + 1,
                    value: pair[1],
                });
            }
            out.push(pair[0]);
        }
    }
    Ok(out)
}

/// Split each byte into two 3 bit values, low nibble first.
#[must_use]
pub fn expand_nibbles(input: &[u8]) -> Vec<u8> {
    input.iter().flat_map(|&b| [b & 0x07, (b >> 4) & 0x07]).collect()
}

/// Inverse of `expand_nibbles`.
///
/// # Errors
/// `BadChunk` for an odd length and `ValueOutOfRange` for any value over 7.
pub fn compact_nibbles(input: &[u8]) -> Result<Vec<u8>, LzError> {
    if input.len() % 2 != 0 {
        return Err(LzError::BadChunk {
            len: input.len(),
            chunk: 2,
        });
    }
    if let Some((offset, &value)) = input.iter().enumerate().find(|(_, v)| **v > 7) {
        return Err(LzError::ValueOutOfRange { offset, value });
    }
    Ok(input.chunks(2).map(|p| p[0] | (p[1] << 4)).collect())
}
