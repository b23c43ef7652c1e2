//! Canonical position representation.
//!
//! A [`Position`] keeps only what decides which children a position has: six
//! bitboards (side occupancy plus one set per piece family, queens living in
//! both slider sets). [`AuxFlags`] carries side to move, castling rights and
//! the en-passant file. Move counters are dropped.

use crate::engine::{self, Board, Piece, Sq};

/// Piece families in key-table order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PieceKind {
    Pawn = 0,
    Knight = 1,
    Bishop = 2,
    Rook = 3,
    Queen = 4,
    King = 5,
}

pub const WHITE: usize = 0;
pub const BLACK: usize = 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Position {
    pub white: u64,
    pub pawns: u64,
    pub knights: u64,
    pub bishop_queens: u64,
    pub rook_queens: u64,
    pub kings: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AuxFlags {
    pub white_to_move: bool,
    /// bits: 1 white K, 2 white Q, 4 black k, 8 black q
    pub castling: u8,
    /// File (0..=7) of a capturable en-passant target.
    pub ep_file: Option<u8>,
}

#[inline]
fn bit(rank: i32, file: i32) -> u64 {
    1u64 << (rank * 8 + file)
}

#[inline]
fn square_of(index: u32) -> Sq {
    engine::sq((index / 8) as i32, (index % 8) as i32)
}

impl Position {
    pub fn occupied(&self) -> u64 {
        self.pawns | self.knights | self.bishop_queens | self.rook_queens | self.kings
    }

    /// Color and family of the piece on bit `index` (0 = a1, 63 = h8).
    pub fn piece_at(&self, index: u32) -> Option<(usize, PieceKind)> {
        let b = 1u64 << index;
        if self.occupied() & b == 0 {
            return None;
        }
        let color = if self.white & b != 0 { WHITE } else { BLACK };
        let kind = if self.pawns & b != 0 {
            PieceKind::Pawn
        } else if self.knights & b != 0 {
            PieceKind::Knight
        } else if self.kings & b != 0 {
            PieceKind::King
        } else if self.bishop_queens & self.rook_queens & b != 0 {
            PieceKind::Queen
        } else if self.rook_queens & b != 0 {
            PieceKind::Rook
        } else {
            PieceKind::Bishop
        };
        Some((color, kind))
    }

    /// Every piece as `(color, kind, bit index)`, lowest square first.
    pub fn pieces(&self) -> impl Iterator<Item = (usize, PieceKind, usize)> + '_ {
        let mut rest = self.occupied();
        std::iter::from_fn(move || {
            if rest == 0 {
                return None;
            }
            let index = rest.trailing_zeros();
            rest &= rest - 1;
            self.piece_at(index)
                .map(|(color, kind)| (color, kind, index as usize))
        })
    }

    fn place(&mut self, rank: i32, file: i32, piece: Piece) {
        let b = bit(rank, file);
        if piece.is_white() {
            self.white |= b;
        }
        match piece {
            Piece::WP | Piece::BP => self.pawns |= b,
            Piece::WN | Piece::BN => self.knights |= b,
            Piece::WB | Piece::BB => self.bishop_queens |= b,
            Piece::WR | Piece::BR => self.rook_queens |= b,
            Piece::WQ | Piece::BQ => {
                self.bishop_queens |= b;
                self.rook_queens |= b;
            }
            Piece::WK | Piece::BK => self.kings |= b,
            Piece::Empty => {}
        }
    }
}

fn board_piece(color: usize, kind: PieceKind) -> Piece {
    let white = color == WHITE;
    match kind {
        PieceKind::Pawn if white => Piece::WP,
        PieceKind::Pawn => Piece::BP,
        PieceKind::Knight if white => Piece::WN,
        PieceKind::Knight => Piece::BN,
        PieceKind::Bishop if white => Piece::WB,
        PieceKind::Bishop => Piece::BB,
        PieceKind::Rook if white => Piece::WR,
        PieceKind::Rook => Piece::BR,
        PieceKind::Queen if white => Piece::WQ,
        PieceKind::Queen => Piece::BQ,
        PieceKind::King if white => Piece::WK,
        PieceKind::King => Piece::BK,
    }
}

/// Reduce a board to its canonical position and flags.
///
/// The en-passant target survives only when a pawn of the side to move stands
/// next to the pawn that just double-pushed; otherwise no child can depend on it.
pub fn canonicalize(board: &Board) -> (Position, AuxFlags) {
    let mut position = Position::default();
    for rank in 0..8 {
        for file in 0..8 {
            position.place(rank, file, board.piece_at(engine::sq(rank, file)));
        }
    }

    let ep_file = board.ep.and_then(|target| {
        let file = engine::file_of(target);
        let (capturer_rank, own_pawn) = if board.side_white {
            (4, Piece::WP)
        } else {
            (3, Piece::BP)
        };
        [file - 1, file + 1]
            .into_iter()
            .filter(|f| (0..8).contains(f))
            .any(|f| board.piece_at(engine::sq(capturer_rank, f)) == own_pawn)
            .then_some(file as u8)
    });

    let aux = AuxFlags {
        white_to_move: board.side_white,
        castling: board.castling & 0x0F,
        ep_file,
    };
    (position, aux)
}

/// Rebuild a playable board; move counters restart at zero and one.
pub fn to_board(position: &Position, aux: &AuxFlags) -> Board {
    let mut board = Board::empty();
    for (color, kind, index) in position.pieces() {
        board.cells[square_of(index as u32)] = board_piece(color, kind);
    }
    board.side_white = aux.white_to_move;
    board.castling = aux.castling;
    board.ep = aux.ep_file.map(|file| {
        let rank = if aux.white_to_move { 5 } else { 2 };
        engine::sq(rank, file as i32)
    });
    board
}
