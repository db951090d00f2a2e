use chess::types::{
    board::Board,
    color::Color,
    moves::{Move, MoveFlag},
    piece::{CPiece, Piece},
};
use utils::Align64;

use crate::{K_HALF, feature, net::Network};

/// Accumulator.
/// The first-layer state of a position: one K_HALF-wide i16 vector per
/// perspective plus the two running piece-square sums. Kept in sync with the
/// position by add/remove deltas; rebuilt from scratch whenever a
/// perspective's own king moves, since that repoints every feature index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Accumulator {
    pub vals: [Align64<[i16; K_HALF]>; 2],
    pub psqt: [i32; 2],
}

impl Default for Accumulator {
    fn default() -> Self {
        Self { vals: [Align64([0; K_HALF]), Align64([0; K_HALF])], psqt: [0; 2] }
    }
}

impl Accumulator {
    fn add_index(&mut self, net: &Network, idx: usize, persp: Color) {
        let p = persp.index();
        let row = &net.ft_weights[K_HALF * idx..K_HALF * (idx + 1)];
        for (a, &w) in self.vals[p].iter_mut().zip(row) {
            *a += w;
        }
        self.psqt[p] += net.psqt_weights[idx] as i32;
    }

    fn remove_index(&mut self, net: &Network, idx: usize, persp: Color) {
        let p = persp.index();
        let row = &net.ft_weights[K_HALF * idx..K_HALF * (idx + 1)];
        for (a, &w) in self.vals[p].iter_mut().zip(row) {
            *a -= w;
        }
        self.psqt[p] -= net.psqt_weights[idx] as i32;
    }

    /// Rebuild one perspective from the bare position: bias plus every piece
    /// on the board except the perspective's own king.
    pub fn refresh(&mut self, net: &Network, b: &Board, persp: Color) {
        let p = persp.index();
        self.vals[p].0 = net.ft_biases.0;
        self.psqt[p] = 0;

        let ksq = feature::oriented_king(persp, b.ksq(persp));
        for c in Color::iter() {
            for pt in Piece::iter().take(5) {
                b.pc_bb(c, pt).bitloop(|s| {
                    self.add_index(net, feature::make_index(persp, s, CPiece::create(c, pt), ksq), persp);
                });
            }
        }
        let opp = !persp;
        self.add_index(net, feature::make_index(persp, b.ksq(opp), CPiece::create(opp, Piece::King), ksq), persp);
    }

    /// Apply the feature deltas of a move to one perspective. The move must
    /// already be applied to `b`, and must not move `persp`'s own king.
    pub fn do_update(&mut self, net: &Network, b: &Board, m: Move, persp: Color) {
        let ksq = feature::oriented_king(persp, b.ksq(persp));
        let (src, dst, flag) = (m.src(), m.dst(), m.flag());
        let moved = b.pc_at(dst);
        let mover = moved.color();

        match flag {
            MoveFlag::Promotion => {
                self.remove_index(net, feature::make_index(persp, src, CPiece::create(mover, Piece::Pawn), ksq), persp);
                self.add_index(net, feature::make_index(persp, dst, moved, ksq), persp);
            }
            _ => {
                self.remove_index(net, feature::make_index(persp, src, moved, ksq), persp);
                self.add_index(net, feature::make_index(persp, dst, moved, ksq), persp);
            }
        }

        match flag {
            MoveFlag::EnPassant => {
                let csq = dst.forward(!mover);
                self.remove_index(net, feature::make_index(persp, csq, CPiece::create(!mover, Piece::Pawn), ksq), persp);
            }
            MoveFlag::Castle => {
                let (rf, rt) = Board::rook_path(dst);
                let rook = CPiece::create(mover, Piece::Rook);
                self.remove_index(net, feature::make_index(persp, rf, rook, ksq), persp);
                self.add_index(net, feature::make_index(persp, rt, rook, ksq), persp);
            }
            _ => {
                let cap = b.state.cap;
                if cap != CPiece::None {
                    self.remove_index(net, feature::make_index(persp, dst, cap, ksq), persp);
                }
            }
        }
    }

    /// Invert `do_update`. The move must already be popped from `b`, and
    /// must not move `persp`'s own king.
    pub fn undo_update(&mut self, net: &Network, b: &Board, m: Move, persp: Color) {
        let ksq = feature::oriented_king(persp, b.ksq(persp));
        let (src, dst, flag) = (m.src(), m.dst(), m.flag());
        let moved = b.pc_at(src);
        let mover = moved.color();

        match flag {
            MoveFlag::Promotion => {
                self.remove_index(net, feature::make_index(persp, dst, CPiece::create(mover, m.get_promo()), ksq), persp);
                self.add_index(net, feature::make_index(persp, src, moved, ksq), persp);
            }
            _ => {
                self.remove_index(net, feature::make_index(persp, dst, moved, ksq), persp);
                self.add_index(net, feature::make_index(persp, src, moved, ksq), persp);
            }
        }

        match flag {
            MoveFlag::EnPassant => {
                let csq = dst.forward(!mover);
                self.add_index(net, feature::make_index(persp, csq, CPiece::create(!mover, Piece::Pawn), ksq), persp);
            }
            MoveFlag::Castle => {
                let (rf, rt) = Board::rook_path(dst);
                let rook = CPiece::create(mover, Piece::Rook);
                self.remove_index(net, feature::make_index(persp, rt, rook, ksq), persp);
                self.add_index(net, feature::make_index(persp, rf, rook, ksq), persp);
            }
            _ => {
                let cap = b.pc_at(dst);
                if cap != CPiece::None {
                    self.add_index(net, feature::make_index(persp, dst, cap, ksq), persp);
                }
            }
        }
    }

    /// Keep both perspectives in sync after `b.make_move(m)` / `apply_move`.
    /// A king move invalidates the mover's whole perspective, so that side
    /// refreshes; the opponent sees it as an ordinary piece delta.
    pub fn on_move_made(&mut self, net: &Network, b: &Board, m: Move) {
        let mover = !b.stm;
        if b.pc_at(m.dst()).pt() == Piece::King {
            self.refresh(net, b, mover);
        } else {
            self.do_update(net, b, m, mover);
        }
        self.do_update(net, b, m, b.stm);

        #[cfg(debug_assertions)]
        self.verify(net, b, m);
    }

    /// Keep both perspectives in sync after `b.undo_move()` popped `m`.
    pub fn on_move_undone(&mut self, net: &Network, b: &Board, m: Move) {
        let mover = b.stm;
        if b.pc_at(m.src()).pt() == Piece::King {
            self.refresh(net, b, mover);
        } else {
            self.undo_update(net, b, m, mover);
        }
        self.undo_update(net, b, m, !b.stm);

        #[cfg(debug_assertions)]
        self.verify(net, b, m);
    }

    /// Cross-check the incremental state against a fresh rebuild.
    #[cfg(debug_assertions)]
    fn verify(&mut self, net: &Network, b: &Board, m: Move) {
        let incremental = self.clone();
        self.refresh(net, b, Color::Black);
        self.refresh(net, b, Color::White);
        assert!(
            incremental == *self,
            "accumulator diverged from refreshed state after {m}\n{b}",
        );
    }
}
