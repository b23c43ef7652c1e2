// Move generation collaborator for the uniques enumerator.
// - 0x88 board representation
// - FEN parsing and printing
// - Legal move generation (castling, en passant, promotions)
// - Pure move application and a plain perft counter

use crate::error::FenError;
use std::fmt;

// =====================
// 0x88 Board Utilities
// =====================
pub type Sq = usize; // 0..127 with 0x88 tests
const BOARD_SIZE: usize = 128;

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

pub const CASTLE_WHITE_KING: u8 = 1;
pub const CASTLE_WHITE_QUEEN: u8 = 2;
pub const CASTLE_BLACK_KING: u8 = 4;
pub const CASTLE_BLACK_QUEEN: u8 = 8;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Piece {
    Empty,
    WP,
    WN,
    WB,
    WR,
    WQ,
    WK,
    BP,
    BN,
    BB,
    BR,
    BQ,
    BK,
}

impl Piece {
    pub fn from_char(c: char) -> Option<Piece> {
        match c {
            'P' => Some(Piece::WP),
            'N' => Some(Piece::WN),
            'B' => Some(Piece::WB),
            'R' => Some(Piece::WR),
            'Q' => Some(Piece::WQ),
            'K' => Some(Piece::WK),
            'p' => Some(Piece::BP),
            'n' => Some(Piece::BN),
            'b' => Some(Piece::BB),
            'r' => Some(Piece::BR),
            'q' => Some(Piece::BQ),
            'k' => Some(Piece::BK),
            _ => None,
        }
    }
    pub fn to_char(self) -> char {
        match self {
            Piece::WP => 'P',
            Piece::WN => 'N',
            Piece::WB => 'B',
            Piece::WR => 'R',
            Piece::WQ => 'Q',
            Piece::WK => 'K',
            Piece::BP => 'p',
            Piece::BN => 'n',
            Piece::BB => 'b',
            Piece::BR => 'r',
            Piece::BQ => 'q',
            Piece::BK => 'k',
            Piece::Empty => '.',
        }
    }
    pub fn is_white(self) -> bool {
        matches!(
            self,
            Piece::WP | Piece::WN | Piece::WB | Piece::WR | Piece::WQ | Piece::WK
        )
    }
    pub fn is_black(self) -> bool {
        matches!(
            self,
            Piece::BP | Piece::BN | Piece::BB | Piece::BR | Piece::BQ | Piece::BK
        )
    }
    pub fn is_empty(self) -> bool {
        self == Piece::Empty
    }
    fn is_enemy_of(self, white: bool) -> bool {
        if white { self.is_black() } else { self.is_white() }
    }
}

// 0x88 helpers
fn on_board(s: i32) -> bool {
    (0..BOARD_SIZE as i32).contains(&s) && (s & 0x88) == 0
}
pub fn sq(rank: i32, file: i32) -> Sq {
    ((rank << 4) | file) as usize
}
pub fn rank_of(s: Sq) -> i32 {
    (s >> 4) as i32
}
pub fn file_of(s: Sq) -> i32 {
    (s & 15) as i32
}
fn offset(s: Sq, d: i32) -> Option<Sq> {
    let ns = s as i32 + d;
    if on_board(ns) { Some(ns as usize) } else { None }
}

// Convert 0x88 square to human algebraic like e2
pub fn sq_to_alg(s: Sq) -> String {
    let r = rank_of(s);
    let f = file_of(s);
    if !(0..8).contains(&r) || !(0..8).contains(&f) {
        return String::from("??");
    }
    format!("{}{}", (b'a' + f as u8) as char, r + 1)
}

pub fn alg_to_sq(s: &str) -> Option<Sq> {
    let bytes = s.trim().as_bytes();
    if bytes.len() != 2 {
        return None;
    }
    let f = bytes[0].to_ascii_lowercase();
    let r = bytes[1];
    if !(b'a'..=b'h').contains(&f) || !(b'1'..=b'8').contains(&r) {
        return None;
    }
    Some(sq((r - b'1') as i32, (f - b'a') as i32))
}

// =====================
// Board State
// =====================
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Board {
    pub cells: [Piece; BOARD_SIZE],
    pub side_white: bool, // true if white to move
    pub castling: u8,     // bits: 1 white K, 2 white Q, 4 black k, 8 black q
    pub ep: Option<Sq>,   // en passant target square
    pub halfmove_clock: u32,
    pub fullmove: u32,
}

impl Board {
    pub fn empty() -> Board {
        Board {
            cells: [Piece::Empty; BOARD_SIZE],
            side_white: true,
            castling: 0,
            ep: None,
            halfmove_clock: 0,
            fullmove: 1,
        }
    }

    pub fn start() -> Board {
        // START_FEN is a constant known to parse
        match Board::from_fen(START_FEN) {
            Ok(b) => b,
            Err(e) => unreachable!("start position failed to parse: {e}"),
        }
    }

    pub fn from_fen(fen: &str) -> Result<Board, FenError> {
        let mut b = Board::empty();
        let parts: Vec<&str> = fen.split_whitespace().collect();
        if parts.is_empty() {
            return Err(FenError::Empty);
        }

        // board
        let ranks: Vec<&str> = parts[0].split('/').collect();
        if ranks.len() != 8 {
            return Err(FenError::RankCount(ranks.len()));
        }
        for (r, rank_str) in ranks.iter().enumerate() {
            let rank = 7 - r as i32;
            let mut file = 0i32;
            for ch in rank_str.chars() {
                if let Some(skip) = ch.to_digit(10) {
                    file += skip as i32;
                } else {
                    let piece = Piece::from_char(ch).ok_or(FenError::BadPiece(ch))?;
                    if file >= 8 {
                        return Err(FenError::RankLength(rank + 1));
                    }
                    b.cells[sq(rank, file)] = piece;
                    file += 1;
                }
            }
            if file != 8 {
                return Err(FenError::RankLength(rank + 1));
            }
        }
        // side
        if parts.len() > 1 {
            b.side_white = match parts[1] {
                "w" => true,
                "b" => false,
                other => return Err(FenError::BadSide(other.to_string())),
            };
        }
        // castling
        if parts.len() > 2 && parts[2] != "-" {
            for c in parts[2].chars() {
                b.castling |= match c {
                    'K' => CASTLE_WHITE_KING,
                    'Q' => CASTLE_WHITE_QUEEN,
                    'k' => CASTLE_BLACK_KING,
                    'q' => CASTLE_BLACK_QUEEN,
                    other => return Err(FenError::BadCastling(other)),
                };
            }
        }
        // ep
        if parts.len() > 3 && parts[3] != "-" {
            let target =
                alg_to_sq(parts[3]).ok_or_else(|| FenError::BadEnPassant(parts[3].to_string()))?;
            let expected_rank = if b.side_white { 5 } else { 2 };
            if rank_of(target) != expected_rank {
                return Err(FenError::BadEnPassant(parts[3].to_string()));
            }
            b.ep = Some(target);
        }
        if parts.len() > 4 {
            b.halfmove_clock = parts[4].parse().unwrap_or(0)
        }
        if parts.len() > 5 {
            b.fullmove = parts[5].parse().unwrap_or(1)
        }
        if b.find_king(true).is_none() || b.find_king(false).is_none() {
            return Err(FenError::MissingKing);
        }
        Ok(b)
    }

    pub fn to_fen(&self) -> String {
        let mut s = String::new();
        for r in (0..8).rev() {
            let mut empty = 0;
            for f in 0..8 {
                let p = self.cells[sq(r, f)];
                if p.is_empty() {
                    empty += 1;
                } else {
                    if empty > 0 {
                        s.push_str(&empty.to_string());
                        empty = 0;
                    }
                    s.push(p.to_char());
                }
            }
            if empty > 0 {
                s.push_str(&empty.to_string());
            }
            if r > 0 {
                s.push('/')
            }
        }
        s.push(' ');
        s.push(if self.side_white { 'w' } else { 'b' });
        s.push(' ');
        let mut cast = String::new();
        for (bit, c) in [
            (CASTLE_WHITE_KING, 'K'),
            (CASTLE_WHITE_QUEEN, 'Q'),
            (CASTLE_BLACK_KING, 'k'),
            (CASTLE_BLACK_QUEEN, 'q'),
        ] {
            if self.castling & bit != 0 {
                cast.push(c)
            }
        }
        if cast.is_empty() {
            cast.push('-')
        }
        s.push_str(&cast);
        s.push(' ');
        match self.ep {
            Some(e) => s.push_str(&sq_to_alg(e)),
            None => s.push('-'),
        }
        s.push_str(&format!(" {} {}", self.halfmove_clock, self.fullmove));
        s
    }

    pub fn piece_at(&self, s: Sq) -> Piece {
        self.cells[s]
    }

    fn find_king(&self, white: bool) -> Option<Sq> {
        let king = if white { Piece::WK } else { Piece::BK };
        (0..BOARD_SIZE).find(|&s| (s & 0x88) == 0 && self.cells[s] == king)
    }

    // Play a move on this board (no validation here)
    pub fn make_move(&mut self, from: Sq, to: Sq, promotion: Option<Piece>) {
        let moved_piece = self.cells[from];
        let mut captured = self.cells[to];

        // en passant capture removes the pawn behind the target square
        if Some(to) == self.ep && captured.is_empty() {
            if moved_piece == Piece::WP {
                captured = self.cells[to - 16];
                self.cells[to - 16] = Piece::Empty;
            } else if moved_piece == Piece::BP {
                captured = self.cells[to + 16];
                self.cells[to + 16] = Piece::Empty;
            }
        }

        self.cells[from] = Piece::Empty;
        self.cells[to] = promotion.unwrap_or(moved_piece);

        // castling move proper: move the rook
        if moved_piece == Piece::WK && from == sq(0, 4) {
            if to == sq(0, 6) {
                self.cells[sq(0, 7)] = Piece::Empty;
                self.cells[sq(0, 5)] = Piece::WR;
            } else if to == sq(0, 2) {
                self.cells[sq(0, 0)] = Piece::Empty;
                self.cells[sq(0, 3)] = Piece::WR;
            }
        } else if moved_piece == Piece::BK && from == sq(7, 4) {
            if to == sq(7, 6) {
                self.cells[sq(7, 7)] = Piece::Empty;
                self.cells[sq(7, 5)] = Piece::BR;
            } else if to == sq(7, 2) {
                self.cells[sq(7, 0)] = Piece::Empty;
                self.cells[sq(7, 3)] = Piece::BR;
            }
        }

        // castling rights: king moves, rook moves or rook captured
        if moved_piece == Piece::WK {
            self.castling &= !(CASTLE_WHITE_KING | CASTLE_WHITE_QUEEN);
        }
        if moved_piece == Piece::BK {
            self.castling &= !(CASTLE_BLACK_KING | CASTLE_BLACK_QUEEN);
        }
        for (corner, right) in [
            (sq(0, 0), CASTLE_WHITE_QUEEN),
            (sq(0, 7), CASTLE_WHITE_KING),
            (sq(7, 0), CASTLE_BLACK_QUEEN),
            (sq(7, 7), CASTLE_BLACK_KING),
        ] {
            if from == corner || to == corner {
                self.castling &= !right;
            }
        }

        // en passant target after a double push
        self.ep = None;
        if moved_piece == Piece::WP && rank_of(to) - rank_of(from) == 2 {
            self.ep = Some(from + 16);
        }
        if moved_piece == Piece::BP && rank_of(from) - rank_of(to) == 2 {
            self.ep = Some(from - 16);
        }

        if moved_piece == Piece::WP || moved_piece == Piece::BP || !captured.is_empty() {
            self.halfmove_clock = 0
        } else {
            self.halfmove_clock += 1
        }
        if !self.side_white {
            self.fullmove += 1
        }
        self.side_white = !self.side_white;
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  +------------------------+")?;
        for r in (0..8).rev() {
            write!(f, "{} |", r + 1)?;
            for file in 0..8 {
                write!(f, " {}", self.cells[sq(r, file)].to_char())?;
            }
            writeln!(f, " |")?;
        }
        writeln!(f, "  +------------------------+")?;
        writeln!(f, "    a b c d e f g h")?;
        write!(f, "FEN: {}", self.to_fen())
    }
}

// =====================
// Move Representation
// =====================
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Move {
    pub from: Sq,
    pub to: Sq,
    pub promotion: Option<Piece>,
}

// Apply a move to a copy of the board.
pub fn apply_move(board: &Board, m: Move) -> Board {
    let mut b = *board;
    b.make_move(m.from, m.to, m.promotion);
    b
}

// =====================
// Move Generation
// =====================
// knight jumps and king deltas
const KNIGHT_DELTAS: [i32; 8] = [33, 31, 18, 14, -33, -31, -18, -14];
const KING_DELTAS: [i32; 8] = [16, 1, -16, -1, 17, 15, -15, -17];
const ROOK_DELTAS: [i32; 4] = [16, 1, -16, -1];
const BISHOP_DELTAS: [i32; 4] = [17, 15, -17, -15];

/// Fill `moves` with every legal move of the side to move.
pub fn gen_moves(board: &Board, moves: &mut Vec<Move>) {
    moves.clear();
    let white = board.side_white;
    let mut pseudo = Vec::with_capacity(64);
    for r in 0..8 {
        for f in 0..8 {
            let s = sq(r, f);
            let p = board.piece_at(s);
            if p.is_empty() || p.is_enemy_of(white) {
                continue;
            }
            match p {
                Piece::WP | Piece::BP => gen_pawn_moves(board, s, white, &mut pseudo),
                Piece::WN | Piece::BN => gen_leaper_moves(board, s, &KNIGHT_DELTAS, &mut pseudo),
                Piece::WB | Piece::BB => gen_slider_moves(board, s, &BISHOP_DELTAS, &mut pseudo),
                Piece::WR | Piece::BR => gen_slider_moves(board, s, &ROOK_DELTAS, &mut pseudo),
                Piece::WQ | Piece::BQ => {
                    gen_slider_moves(board, s, &ROOK_DELTAS, &mut pseudo);
                    gen_slider_moves(board, s, &BISHOP_DELTAS, &mut pseudo);
                }
                Piece::WK | Piece::BK => gen_leaper_moves(board, s, &KING_DELTAS, &mut pseudo),
                Piece::Empty => {}
            }
        }
    }
    gen_castling(board, &mut pseudo);
    // filter illegal by checking king in check after move
    moves.extend(
        pseudo
            .into_iter()
            .filter(|&m| !is_king_attacked(&apply_move(board, m), white)),
    );
}

fn gen_leaper_moves(board: &Board, s: Sq, deltas: &[i32], moves: &mut Vec<Move>) {
    let side_white = board.side_white;
    for &d in deltas {
        if let Some(ns) = offset(s, d) {
            let p = board.piece_at(ns);
            if p.is_empty() || p.is_enemy_of(side_white) {
                moves.push(Move {
                    from: s,
                    to: ns,
                    promotion: None,
                });
            }
        }
    }
}

fn gen_slider_moves(board: &Board, s: Sq, deltas: &[i32], moves: &mut Vec<Move>) {
    let side_white = board.side_white;
    for &d in deltas {
        let mut cur = s;
        while let Some(ns) = offset(cur, d) {
            let p = board.piece_at(ns);
            if p.is_empty() {
                moves.push(Move {
                    from: s,
                    to: ns,
                    promotion: None,
                });
            } else {
                if p.is_enemy_of(side_white) {
                    moves.push(Move {
                        from: s,
                        to: ns,
                        promotion: None,
                    });
                }
                break;
            }
            cur = ns;
        }
    }
}

fn push_pawn_move(from: Sq, to: Sq, white: bool, moves: &mut Vec<Move>) {
    let last_rank = if white { 7 } else { 0 };
    if rank_of(to) == last_rank {
        let promos = if white {
            [Piece::WQ, Piece::WR, Piece::WB, Piece::WN]
        } else {
            [Piece::BQ, Piece::BR, Piece::BB, Piece::BN]
        };
        for p in promos {
            moves.push(Move {
                from,
                to,
                promotion: Some(p),
            });
        }
    } else {
        moves.push(Move {
            from,
            to,
            promotion: None,
        });
    }
}

fn gen_pawn_moves(board: &Board, s: Sq, white: bool, moves: &mut Vec<Move>) {
    let dir = if white { 16 } else { -16 };
    let start_rank = if white { 1 } else { 6 };
    // pushes
    if let Some(one) = offset(s, dir) {
        if board.piece_at(one).is_empty() {
            push_pawn_move(s, one, white, moves);
            if rank_of(s) == start_rank {
                if let Some(two) = offset(one, dir) {
                    if board.piece_at(two).is_empty() {
                        moves.push(Move {
                            from: s,
                            to: two,
                            promotion: None,
                        });
                    }
                }
            }
        }
    }
    // captures, including en passant onto the empty target square
    for cap_dir in [dir - 1, dir + 1] {
        if let Some(t) = offset(s, cap_dir) {
            let p = board.piece_at(t);
            if p.is_enemy_of(white) {
                push_pawn_move(s, t, white, moves);
            } else if p.is_empty() && board.ep == Some(t) {
                moves.push(Move {
                    from: s,
                    to: t,
                    promotion: None,
                });
            }
        }
    }
}

fn gen_castling(board: &Board, moves: &mut Vec<Move>) {
    let white = board.side_white;
    let (rank, king, rook, king_side, queen_side) = if white {
        (0, Piece::WK, Piece::WR, CASTLE_WHITE_KING, CASTLE_WHITE_QUEEN)
    } else {
        (7, Piece::BK, Piece::BR, CASTLE_BLACK_KING, CASTLE_BLACK_QUEEN)
    };
    let home = sq(rank, 4);
    if board.piece_at(home) != king || is_square_attacked(board, home, !white) {
        return;
    }
    let empty = |files: &[i32]| files.iter().all(|&f| board.piece_at(sq(rank, f)).is_empty());
    let safe = |files: &[i32]| {
        files
            .iter()
            .all(|&f| !is_square_attacked(board, sq(rank, f), !white))
    };
    if board.castling & king_side != 0
        && board.piece_at(sq(rank, 7)) == rook
        && empty(&[5, 6])
        && safe(&[5, 6])
    {
        moves.push(Move {
            from: home,
            to: sq(rank, 6),
            promotion: None,
        });
    }
    if board.castling & queen_side != 0
        && board.piece_at(sq(rank, 0)) == rook
        && empty(&[1, 2, 3])
        && safe(&[2, 3])
    {
        moves.push(Move {
            from: home,
            to: sq(rank, 2),
            promotion: None,
        });
    }
}

// =====================
// Attack Detection
// =====================
pub fn is_square_attacked(board: &Board, s: Sq, by_white: bool) -> bool {
    // pawns attack diagonally forward, so look diagonally backward from s
    let (pawn, pawn_deltas) = if by_white {
        (Piece::WP, [-17, -15])
    } else {
        (Piece::BP, [17, 15])
    };
    if pawn_deltas
        .iter()
        .any(|&d| offset(s, d).is_some_and(|a| board.piece_at(a) == pawn))
    {
        return true;
    }
    let (knight, king) = if by_white {
        (Piece::WN, Piece::WK)
    } else {
        (Piece::BN, Piece::BK)
    };
    if KNIGHT_DELTAS
        .iter()
        .any(|&d| offset(s, d).is_some_and(|a| board.piece_at(a) == knight))
    {
        return true;
    }
    if KING_DELTAS
        .iter()
        .any(|&d| offset(s, d).is_some_and(|a| board.piece_at(a) == king))
    {
        return true;
    }
    // sliders
    let (rook, bishop, queen) = if by_white {
        (Piece::WR, Piece::WB, Piece::WQ)
    } else {
        (Piece::BR, Piece::BB, Piece::BQ)
    };
    let slider_hits = |deltas: &[i32], piece: Piece| {
        deltas.iter().any(|&d| {
            let mut cur = s;
            while let Some(a) = offset(cur, d) {
                let p = board.piece_at(a);
                if !p.is_empty() {
                    return p == piece || p == queen;
                }
                cur = a;
            }
            false
        })
    };
    slider_hits(&ROOK_DELTAS, rook) || slider_hits(&BISHOP_DELTAS, bishop)
}

pub fn is_king_attacked(board: &Board, white_king: bool) -> bool {
    match board.find_king(white_king) {
        Some(kpos) => is_square_attacked(board, kpos, !white_king),
        None => true,
    }
}

// =====================
// Perft
// =====================

/// Plain recursive leaf count, with no deduplication.
pub fn perft(board: &Board, depth: u32) -> u64 {
    if depth == 0 {
        return 1;
    }
    let mut moves = Vec::with_capacity(64);
    gen_moves(board, &mut moves);
    if depth == 1 {
        return moves.len() as u64;
    }
    moves
        .iter()
        .map(|&m| perft(&apply_move(board, m), depth - 1))
        .sum()
}
