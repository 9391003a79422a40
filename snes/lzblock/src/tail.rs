use bitio::{BitError, ByteReader, LittleEndian};
use log::debug;

use crate::LzError;

/// Decompress a tail window stream, used for tilemaps.
///
/// Layout: a little endian word giving the size of the command area, the
/// commands, then the literal data they draw from. Each command byte:
///
/// * 0 ends the stream.
/// * a non zero low nibble copies that many bytes from the literal data.
/// * a non zero high nibble then copies `high + 2` bytes from the output,
///   starting `next command byte + 1` bytes back.
///
/// # Errors
/// `Bits` if commands or literal data run out, `DistanceOutOfBounds` for
/// a reference before the start of output and `OutputLimitExceeded`.
pub fn decompress_tail_window(input: &[u8], max_output: usize) -> Result<Vec<u8>, LzError> {
    let mut head = ByteReader::new(input);
    let data_start = 2 + usize::from(head.read_u16::<LittleEndian>()?);
    let commands = input.get(2..data_start).ok_or(BitError::UnexpectedEof {
        offset: 2,
        wanted: data_start - 2,
    })?;
    let mut cmds = ByteReader::new(commands);
    let mut data = ByteReader::new(&input[data_start..]);

    let mut out = Vec::new();
    loop {
        let at = 2 + cmds.position();
        let cmd = cmds.read_u8().map_err(|_| BitError::UnexpectedEof {
            offset: at,
            wanted: 1,
        })?;
        if cmd == 0 {
            break;
        }
        let literals = usize::from(cmd & 0x0F);
        if out.len() + literals > max_output {
            return Err(LzError::OutputLimitExceeded { limit: max_output });
        }
        out.extend_from_slice(data.take(literals)?);

        if cmd & 0xF0 != 0 {
            let length = usize::from(cmd >> 4) + 2;
            let distance = usize::from(cmds.read_u8()?) + 1;
            if distance > out.len() {
                return Err(LzError::DistanceOutOfBounds {
                    distance,
                    available: out.len(),
                    offset: at,
                });
            }
            if out.len() + length > max_output {
                return Err(LzError::OutputLimitExceeded { limit: max_output });
            }
            let start = out.len() - distance;
            for i in 0..length {
                out.push(out[start + i]);
            }
        }
    }
    debug!(
        "Tail window: {} command bytes, {} literals -> {} bytes",
        cmds.position(),
        data.position(),
        out.len()
    );
    Ok(out)
}
