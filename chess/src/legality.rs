//! Structural legality screening for archived move descriptors.
//!
//! Archives are produced by a searcher, so replay normally trusts them; the
//! validation tool does not, and re-checks every descriptor against the
//! reconstructed position before applying it.

use crate::attacks::{KING_ATK, KNIGHT_ATK, attacked_by, step};
use crate::types::{
    board::Board,
    castling::CastlingRights,
    color::Color,
    moves::{Move, MoveFlag},
    piece::{CPiece, Piece},
    square::Square,
};

impl Board {
    /// Whether the descriptor is a legal move in this position.
    pub fn is_legal(&self, m: Move) -> bool {
        if m.is_null() {
            return false;
        }
        let (src, dst, flag) = (m.src(), m.dst(), m.flag());
        let piece = self.pc_at(src);
        if piece == CPiece::None || piece.color() != self.stm || src == dst {
            return false;
        }

        // Kings are never capture targets; a stream claiming otherwise is
        // corrupt.
        let target = self.pc_at(dst);
        if flag != MoveFlag::Castle && target != CPiece::None && target.pt() == Piece::King {
            return false;
        }

        let shape_ok = match flag {
            MoveFlag::Normal => self.normal_shape(piece.pt(), src, dst),
            MoveFlag::EnPassant => self.en_passant_shape(piece, src, dst),
            MoveFlag::Promotion => self.promotion_shape(piece, src, dst),
            MoveFlag::Castle => return self.castle_legal(src, dst),
        };

        shape_ok && !self.leaves_king_exposed(m)
    }

    /// Piece-movement geometry for a plain move or capture.
    fn normal_shape(&self, pt: Piece, src: Square, dst: Square) -> bool {
        let target = self.pc_at(dst);
        if target != CPiece::None && target.color() == self.stm {
            return false;
        }

        match pt {
            Piece::Pawn => self.pawn_shape(src, dst, false),
            Piece::Knight => KNIGHT_ATK[src.index()].has(dst),
            Piece::King => KING_ATK[src.index()].has(dst),
            Piece::Bishop => src.file().abs_diff(dst.file()) == src.rank().abs_diff(dst.rank()) && self.clear_path(src, dst),
            Piece::Rook => (src.file() == dst.file() || src.rank() == dst.rank()) && self.clear_path(src, dst),
            Piece::Queen => {
                (src.file() == dst.file()
                    || src.rank() == dst.rank()
                    || src.file().abs_diff(dst.file()) == src.rank().abs_diff(dst.rank()))
                    && self.clear_path(src, dst)
            }
        }
    }

    /// Pawn pushes and captures. Promotion-rank arrivals are only legal under
    /// the promotion flag and vice versa.
    fn pawn_shape(&self, src: Square, dst: Square, promoting: bool) -> bool {
        let us = self.stm;
        let last_rank = if us == Color::White { 7 } else { 0 };
        if (dst.rank() == last_rank) != promoting {
            return false;
        }

        let fwd = src.forward(us);
        if dst == fwd {
            return self.pc_at(dst) == CPiece::None;
        }

        // Double push from the home rank.
        let home_rank = if us == Color::White { 1 } else { 6 };
        if src.rank() == home_rank && dst == fwd.forward(us) {
            return self.pc_at(fwd) == CPiece::None && self.pc_at(dst) == CPiece::None;
        }

        // Diagonal capture.
        let target = self.pc_at(dst);
        dst.rank() == fwd.rank()
            && src.file().abs_diff(dst.file()) == 1
            && target != CPiece::None
            && target.color() != us
    }

    fn en_passant_shape(&self, piece: CPiece, src: Square, dst: Square) -> bool {
        piece.pt() == Piece::Pawn
            && dst == self.state.epsq
            && src.file().abs_diff(dst.file()) == 1
            && dst.rank() == src.forward(self.stm).rank()
            && self.pc_at(dst) == CPiece::None
            && self.pc_at(dst.forward(!self.stm)) == CPiece::create(!self.stm, Piece::Pawn)
    }

    fn promotion_shape(&self, piece: CPiece, src: Square, dst: Square) -> bool {
        piece.pt() == Piece::Pawn && self.pawn_shape(src, dst, true)
    }

    /// Castling: rights held, king and rook at home, path empty, king path
    /// not attacked.
    fn castle_legal(&self, src: Square, dst: Square) -> bool {
        let us = self.stm;
        let home = if us == Color::White { Square::E1 } else { Square::E8 };
        if src != home || self.pc_at(src) != CPiece::create(us, Piece::King) {
            return false;
        }

        let (right, rook_home) = match (us, dst) {
            (Color::White, Square::G1) => (CastlingRights::WK, Square::H1),
            (Color::White, Square::C1) => (CastlingRights::WQ, Square::A1),
            (Color::Black, Square::G8) => (CastlingRights::BK, Square::H8),
            (Color::Black, Square::C8) => (CastlingRights::BQ, Square::A8),
            _ => return false,
        };

        if !self.state.castling.has(right)
            || self.pc_at(rook_home) != CPiece::create(us, Piece::Rook)
            || !self.clear_path(src, rook_home)
        {
            return false;
        }

        // The king must not pass through or land on an attacked square.
        let df = if dst.file() > src.file() { 1 } else { -1 };
        let mut sq = src;
        loop {
            if attacked_by(self, sq, !us) {
                return false;
            }
            if sq == dst {
                return true;
            }
            sq = match step(sq, df, 0) {
                Some(next) => next,
                None => return false,
            };
        }
    }

    /// Squares strictly between src and dst (which must share a line) are
    /// all empty.
    fn clear_path(&self, src: Square, dst: Square) -> bool {
        let df = (dst.file() as i8 - src.file() as i8).signum();
        let dr = (dst.rank() as i8 - src.rank() as i8).signum();
        let mut sq = src;
        loop {
            sq = match step(sq, df, dr) {
                Some(next) => next,
                None => return false,
            };
            if sq == dst {
                return true;
            }
            if self.pc_at(sq) != CPiece::None {
                return false;
            }
        }
    }

    /// Would this move leave the mover's own king capturable?
    fn leaves_king_exposed(&self, m: Move) -> bool {
        let us = self.stm;
        let mut after = self.clone();
        after.apply_move(m);
        attacked_by(&after, after.ksq(us), !us)
    }

    /// Cheap structural screen for untrusted replay: enough to guarantee
    /// `apply_move` leaves a coherent board, without the full legality
    /// analysis the validator does. Rejects missing movers, king captures
    /// and descriptors whose implied squares do not line up.
    pub fn can_apply(&self, m: Move) -> bool {
        if m.is_null() {
            return false;
        }
        let (src, dst, flag) = (m.src(), m.dst(), m.flag());
        let piece = self.pc_at(src);
        if piece == CPiece::None || piece.color() != self.stm || src == dst {
            return false;
        }
        let us = self.stm;
        let target = self.pc_at(dst);
        let target_ok = target == CPiece::None || (target.color() != us && target.pt() != Piece::King);

        match flag {
            MoveFlag::Normal | MoveFlag::Promotion => target_ok,
            MoveFlag::EnPassant => {
                piece.pt() == Piece::Pawn
                    && dst.rank() == if us == Color::White { 5 } else { 2 }
                    && target == CPiece::None
                    && self.pc_at(dst.forward(!us)) == CPiece::create(!us, Piece::Pawn)
            }
            MoveFlag::Castle => {
                let home = if us == Color::White { Square::E1 } else { Square::E8 };
                let dst_ok = match us {
                    Color::White => dst == Square::G1 || dst == Square::C1,
                    Color::Black => dst == Square::G8 || dst == Square::C8,
                };
                if src != home || !dst_ok || piece.pt() != Piece::King || target != CPiece::None {
                    return false;
                }
                let (rf, rt) = Self::rook_path(dst);
                self.pc_at(rf) == CPiece::create(us, Piece::Rook) && self.pc_at(rt) == CPiece::None
            }
        }
    }

    /// Consistency of a position record: used to reject archives whose start
    /// positions could never occur in a game.
    pub fn is_ok(&self) -> bool {
        // Exactly one king each, and the side not on move cannot already be
        // capturable.
        if self.pc_bb(Color::White, Piece::King).nbits() != 1
            || self.pc_bb(Color::Black, Piece::King).nbits() != 1
            || attacked_by(self, self.ksq(!self.stm), self.stm)
        {
            return false;
        }

        // No pawns on the back ranks.
        let pawns = self.pieces[Piece::Pawn.index()];
        if (pawns.0 & 0xFF00_0000_0000_00FF) != 0 {
            return false;
        }

        // A set en-passant square must sit behind an enemy double-pushed pawn.
        let ep = self.state.epsq;
        if ep.is_valid() {
            let ep_rank = if self.stm == Color::White { 5 } else { 2 };
            if ep.rank() != ep_rank || self.pc_at(ep.forward(!self.stm)) != CPiece::create(!self.stm, Piece::Pawn) {
                return false;
            }
        }

        // Castling rights require king and rook on their home squares.
        for (right, ksq, rsq, c) in [
            (CastlingRights::WK, Square::E1, Square::H1, Color::White),
            (CastlingRights::WQ, Square::E1, Square::A1, Color::White),
            (CastlingRights::BK, Square::E8, Square::H8, Color::Black),
            (CastlingRights::BQ, Square::E8, Square::A8, Color::Black),
        ] {
            if self.state.castling.has(right)
                && (self.pc_at(ksq) != CPiece::create(c, Piece::King) || self.pc_at(rsq) != CPiece::create(c, Piece::Rook))
            {
                return false;
            }
        }

        true
    }
}
