//! Fixed-width on-disk record format.
//!
//! Layout (56 bytes, little endian):
//! bytes 0..48  : white, pawns, knights, bishop_queens, rook_queens, kings
//! bytes 48..56 : packed trailer
//!     bit  0      side to move (1 = white)
//!     bits 1..5   castling rights
//!     bits 5..9   en passant (0 = none, 1..=8 = file + 1)
//!     bits 9..64  occurrence count (55 bits)
//!
//! Hash and chain link are store-local and not written. Counts that do not fit
//! in 55 bits are rejected rather than saturated, and so are zero counts.

use crate::error::CodecError;
use crate::position::{AuxFlags, Position};

pub const RECORD_SIZE: usize = 56;
pub const COUNT_BITS: u32 = 55;
pub const MAX_COUNT: u64 = (1 << COUNT_BITS) - 1;

const SIDE_BIT: u64 = 1;
const CASTLING_SHIFT: u32 = 1;
const EP_SHIFT: u32 = 5;
const COUNT_SHIFT: u32 = 9;

/// The semantic part of a record: what survives a trip through a depth file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PersistedRecord {
    pub position: Position,
    pub aux: AuxFlags,
    pub count: u64,
}

pub fn encode(record: &PersistedRecord) -> Result<[u8; RECORD_SIZE], CodecError> {
    let PersistedRecord {
        position,
        aux,
        count,
    } = record;
    if *count == 0 {
        return Err(CodecError::ZeroCount);
    }
    if *count > MAX_COUNT {
        return Err(CodecError::CountOverflow(*count));
    }
    if aux.castling > 0x0F {
        return Err(CodecError::InvalidCastling(aux.castling));
    }
    let ep = match aux.ep_file {
        None => 0,
        Some(file) if file < 8 => file as u64 + 1,
        Some(file) => return Err(CodecError::InvalidEnPassant(file)),
    };

    let trailer = (aux.white_to_move as u64)
        | ((aux.castling as u64) << CASTLING_SHIFT)
        | (ep << EP_SHIFT)
        | (*count << COUNT_SHIFT);

    let mut out = [0u8; RECORD_SIZE];
    let words = [
        position.white,
        position.pawns,
        position.knights,
        position.bishop_queens,
        position.rook_queens,
        position.kings,
        trailer,
    ];
    for (chunk, word) in out.chunks_exact_mut(8).zip(words) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    Ok(out)
}

pub fn decode(bytes: &[u8; RECORD_SIZE]) -> Result<PersistedRecord, CodecError> {
    let mut words = [0u64; RECORD_SIZE / 8];
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(8)) {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(chunk);
        *word = u64::from_le_bytes(buf);
    }
    let [white, pawns, knights, bishop_queens, rook_queens, kings, trailer] = words;

    let ep_file = match (trailer >> EP_SHIFT) & 0x0F {
        0 => None,
        n @ 1..=8 => Some((n - 1) as u8),
        _ => return Err(CodecError::Corrupt("en passant field out of range")),
    };
    let count = trailer >> COUNT_SHIFT;
    if count == 0 {
        return Err(CodecError::Corrupt("zero occurrence count"));
    }

    Ok(PersistedRecord {
        position: Position {
            white,
            pawns,
            knights,
            bishop_queens,
            rook_queens,
            kings,
        },
        aux: AuxFlags {
            white_to_move: trailer & SIDE_BIT != 0,
            castling: ((trailer >> CASTLING_SHIFT) & 0x0F) as u8,
            ep_file,
        },
        count,
    })
}
