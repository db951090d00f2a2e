//! Mapping from (perspective, piece, square, king square) to indices in the
//! sparse transformer input.
//!
//! The feature space is sharded over 32 king buckets covering files a-d;
//! positions with the king on files e-h are folded in by mirroring the king
//! square itself before any lookup (`oriented_king`). The "virtual" variant
//! is the bucket-agnostic factorisation the trainer uses alongside the real
//! features.

use chess::types::{color::Color, piece::CPiece, square::Square};

use crate::{FT_IN_DIMS, PS_END};

// Block offsets inside one king bucket. "W" blocks hold the perspective's
// own pieces, "B" blocks the opponent's; both kings share a single block.
const PS_W_PAWN: usize = 0;
const PS_B_PAWN: usize = 64;
const PS_W_KNIGHT: usize = 2 * 64;
const PS_B_KNIGHT: usize = 3 * 64;
const PS_W_BISHOP: usize = 4 * 64;
const PS_B_BISHOP: usize = 5 * 64;
const PS_W_ROOK: usize = 6 * 64;
const PS_B_ROOK: usize = 7 * 64;
const PS_W_QUEEN: usize = 8 * 64;
const PS_B_QUEEN: usize = 9 * 64;
const PS_KING: usize = 10 * 64;

/// Block offset per perspective and wire piece code (1..=6 white pieces,
/// 7..=12 black pieces).
#[rustfmt::skip]
const PIECE_TO_INDEX: [[usize; 13]; 2] = [
    [0, PS_B_PAWN, PS_B_KNIGHT, PS_B_BISHOP, PS_B_ROOK, PS_B_QUEEN, PS_KING,
        PS_W_PAWN, PS_W_KNIGHT, PS_W_BISHOP, PS_W_ROOK, PS_W_QUEEN, PS_KING],
    [0, PS_W_PAWN, PS_W_KNIGHT, PS_W_BISHOP, PS_W_ROOK, PS_W_QUEEN, PS_KING,
        PS_B_PAWN, PS_B_KNIGHT, PS_B_BISHOP, PS_B_ROOK, PS_B_QUEEN, PS_KING],
];

/// Bucket per king square. Files e-h are forbidden; callers mirror first.
#[rustfmt::skip]
const KING_BUCKET: [i8; 64] = [
     0,  1,  2,  3, -1, -1, -1, -1,
     4,  5,  6,  7, -1, -1, -1, -1,
     8,  9, 10, 11, -1, -1, -1, -1,
    12, 13, 14, 15, -1, -1, -1, -1,
    16, 17, 18, 19, -1, -1, -1, -1,
    20, 21, 22, 23, -1, -1, -1, -1,
    24, 25, 26, 27, -1, -1, -1, -1,
    28, 29, 30, 31, -1, -1, -1, -1,
];

/// Flip the board so the perspective always looks from white's side.
#[inline]
pub const fn orient_horizontal(persp: Color, s: Square) -> Square {
    Square::from_raw(s as u8 ^ (56 * (1 - persp as u8)))
}

/// Perspective flip plus the file mirror tied to the king's half of the
/// board.
#[inline]
pub const fn orient(persp: Color, s: Square, ksq: Square) -> Square {
    Square::from_raw(orient_horizontal(persp, s) as u8 ^ (((ksq.file() >= 4) as u8) * 0x7))
}

/// The king square as the indexing functions expect it: perspective-flipped
/// and mirrored onto files a-d. Apply once, before any `make_index` call.
#[inline]
pub const fn oriented_king(persp: Color, ksq: Square) -> Square {
    orient(persp, ksq, ksq)
}

/// The real feature index of a piece, in `[0, FT_IN_DIMS)`.
/// `ksq` must come from `oriented_king`.
#[inline]
pub const fn make_index(persp: Color, s: Square, pc: CPiece, ksq: Square) -> usize {
    let bucket = KING_BUCKET[ksq.index()];
    debug_assert!(bucket >= 0);
    orient(persp, s, ksq).index() + PIECE_TO_INDEX[persp.index()][pc.index()] + PS_END * bucket as usize
}

/// The virtual (bucket-agnostic) feature index, in
/// `[FT_IN_DIMS, FT_IN_DIMS + PS_END)`.
#[inline]
pub const fn make_index_virtual(persp: Color, s: Square, pc: CPiece) -> usize {
    orient_horizontal(persp, s).index() + PIECE_TO_INDEX[persp.index()][pc.index()] + FT_IN_DIMS
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess::types::piece::Piece;
    use std::collections::HashSet;

    /// The piece codes a perspective can ever index: everything except its
    /// own king.
    fn indexed_pieces(persp: Color) -> Vec<CPiece> {
        (1..=12u8).map(CPiece::from).filter(|&pc| !(pc.pt() == Piece::King && pc.color() == persp)).collect()
    }

    #[test]
    fn test_real_indices_are_a_bijection() {
        for persp in Color::iter() {
            let mut seen = HashSet::new();
            for ksq in Square::iter().filter(|k| k.file() < 4) {
                for s in Square::iter() {
                    for &pc in &indexed_pieces(persp) {
                        let idx = make_index(persp, s, pc, ksq);
                        assert!(idx < FT_IN_DIMS);
                        seen.insert(idx);
                    }
                }
            }
            // 32 buckets x 64 squares x 11 piece kinds covers the space.
            assert_eq!(seen.len(), FT_IN_DIMS);
        }
    }

    #[test]
    fn test_virtual_indices_are_injective() {
        for persp in Color::iter() {
            let mut seen = HashSet::new();
            for s in Square::iter() {
                for &pc in &indexed_pieces(persp) {
                    let idx = make_index_virtual(persp, s, pc);
                    assert!((FT_IN_DIMS..FT_IN_DIMS + PS_END).contains(&idx));
                    assert!(seen.insert(idx));
                }
            }
        }
    }

    #[test]
    fn test_oriented_king_lands_on_files_a_to_d() {
        for persp in Color::iter() {
            for ksq in Square::iter() {
                assert!(oriented_king(persp, ksq).file() < 4);
            }
        }
    }

    #[test]
    fn test_perspectives_disagree() {
        let ksq = oriented_king(Color::White, Square::E1);
        let ksq_b = oriented_king(Color::Black, Square::E1);
        assert_ne!(
            make_index(Color::White, Square::E4, CPiece::WPawn, ksq),
            make_index(Color::Black, Square::E4, CPiece::WPawn, ksq_b)
        );
    }
}
