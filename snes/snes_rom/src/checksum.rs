use crate::header::{CHECKSUM_BYTE, COMPLEMENT_BYTE};

// Checksum and complement always add this much between them.
const PAIR_SUM: u32 = 0x1FE;

fn sum(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b)))
}

/// Sum of every byte in `data` the way the hardware checksum counts it.
/// A size that isn't a power of two has the part past the largest power of
/// two repeated until it fills a second block of that size.
#[must_use]
pub fn mirrored_sum(data: &[u8]) -> u32 {
    if data.is_empty() || data.len().is_power_of_two() {
        return sum(data);
    }
    let base = 1usize << (usize::BITS - 1 - data.len().leading_zeros());
    let rest = &data[base..];
    let reps = base / rest.len();
    let tail = base % rest.len();
    #[allow(clippy::cast_possible_truncation)]
    let reps = reps as u32;
    sum(&data[..base])
        .wrapping_add(sum(rest).wrapping_mul(reps))
        .wrapping_add(sum(&rest[..tail]))
}

/// The checksum `data` should carry given its header block sits at
/// `block`. The stored checksum and complement bytes are replaced by what
/// any valid pair contributes so the result is a fixed point.
#[must_use]
pub fn compute(data: &[u8], block: usize) -> u16 {
    let fields = block + COMPLEMENT_BYTE..block + CHECKSUM_BYTE + 2;
    let stored = data.get(fields).map_or(0, sum);
    let total = mirrored_sum(data).wrapping_sub(stored).wrapping_add(PAIR_SUM);
    #[allow(clippy::cast_possible_truncation)]
    let checksum = (total & 0xFFFF) as u16;
    checksum
}
