//! Sparse-COO mini-batches of training samples.

use chess::types::{
    bitboard::Bitboard,
    board::Board,
    color::Color,
    piece::{CPiece, Piece},
    square::Square,
};
use nnue::{FV_SCALE, feature};

use crate::{GameResult, MAX_ACTIVE_PER_SAMPLE};

/// One decoded record, detached from the shared file cursor so batch
/// construction can run outside the reader lock.
#[derive(Debug, Clone)]
pub struct Entry {
    pub pieces: [[Bitboard; Piece::NUM]; Color::NUM],
    pub turn: Color,
    pub fullmove: u16,
    pub flag: u8,
    pub eval: i32,
    /// White-relative, as stored.
    pub result: GameResult,
}

impl Entry {
    pub fn from_board(b: &Board, result: GameResult, eval: i32, flag: u8) -> Self {
        let mut pieces = [[Bitboard::EMPTY; Piece::NUM]; Color::NUM];
        for c in Color::iter() {
            for p in Piece::iter() {
                pieces[c.index()][p.index()] = b.pc_bb(c, p);
            }
        }
        Self { pieces, turn: b.stm, fullmove: b.state.fullmoves, flag, eval, result }
    }

    /// The stored outcome re-signed to the side to move.
    pub fn result_stm(&self) -> GameResult {
        self.result.from_stm(self.turn)
    }

    fn ksq(&self, c: Color) -> Square {
        self.pieces[c.index()][Piece::King.index()].lsb()
    }
}

/// A mini-batch in the layout the trainer consumes: two COO index arrays
/// (one per perspective, `(row, feature)` pairs flattened), float eval and
/// outcome targets, and the active-feature count.
pub struct Batch {
    pub size: usize,
    pub ind_active: usize,
    pub ind1: Vec<i32>,
    pub ind2: Vec<i32>,
    pub eval: Vec<f32>,
    pub result: Vec<f32>,
    requested: usize,
}

impl Batch {
    pub fn new(requested: usize) -> Box<Self> {
        Box::new(Self {
            size: 0,
            ind_active: 0,
            ind1: Vec::with_capacity(4 * MAX_ACTIVE_PER_SAMPLE * requested),
            ind2: Vec::with_capacity(4 * MAX_ACTIVE_PER_SAMPLE * requested),
            eval: Vec::with_capacity(requested),
            result: Vec::with_capacity(requested),
            requested,
        })
    }

    pub fn requested(&self) -> usize {
        self.requested
    }

    pub fn is_full(&self) -> bool {
        self.size >= self.requested
    }

    /// Append one accepted record as a sample.
    ///
    /// Every piece contributes a real and a virtual feature to both
    /// perspectives; each perspective skips its own king. Within a sample
    /// the `(row, feature)` pairs are sorted by feature index, which the
    /// trainer relies on.
    pub fn push_sample(&mut self, e: &Entry) {
        debug_assert!(!self.is_full());
        let row = self.size as i32;

        self.eval.push((FV_SCALE * e.eval) as f32 / (127.0 * 64.0));
        self.result.push(e.result_stm().target());

        let mut scratch = [0usize; 2 * MAX_ACTIVE_PER_SAMPLE];
        let n1 = Self::gather(e, e.turn, &mut scratch);
        Self::emit(&mut self.ind1, row, &mut scratch[..n1]);

        let n2 = Self::gather(e, !e.turn, &mut scratch);
        Self::emit(&mut self.ind2, row, &mut scratch[..n2]);

        debug_assert_eq!(n1, n2);
        self.ind_active += n1;
        self.size += 1;
    }

    /// Collect the real and virtual feature indices of one perspective.
    fn gather(e: &Entry, persp: Color, out: &mut [usize; 2 * MAX_ACTIVE_PER_SAMPLE]) -> usize {
        let ksq = feature::oriented_king(persp, e.ksq(persp));
        let mut n = 0;
        for pt in Piece::iter() {
            for c in Color::iter() {
                if pt == Piece::King && c == persp {
                    continue;
                }
                let cp = CPiece::create(c, pt);
                e.pieces[c.index()][pt.index()].bitloop(|s| {
                    out[n] = feature::make_index(persp, s, cp, ksq);
                    out[n + 1] = feature::make_index_virtual(persp, s, cp);
                    n += 2;
                });
            }
        }
        n
    }

    /// Sort a gathered run and flatten it into `(row, feature)` pairs.
    /// Runs are short, so an insertion sort does fine.
    fn emit(ind: &mut Vec<i32>, row: i32, run: &mut [usize]) {
        for i in 1..run.len() {
            let mut j = i;
            while j > 0 && run[j - 1] > run[j] {
                run.swap(j - 1, j);
                j -= 1;
            }
        }
        for &idx in run.iter() {
            ind.push(row);
            ind.push(idx as i32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nnue::FT_IN_DIMS;

    fn entry(fen: &str, eval: i32, result: GameResult) -> Entry {
        Entry::from_board(&fen.parse().unwrap(), result, eval, 0)
    }

    /// The feature-index slice of one sample's run in an index array.
    fn features_of(ind: &[i32], row: i32) -> Vec<i32> {
        ind.chunks_exact(2).filter(|p| p[0] == row).map(|p| p[1]).collect()
    }

    #[test]
    fn test_sample_counts_and_sorting() {
        let mut batch = Batch::new(2);
        batch.push_sample(&entry(chess::STARTPOS_FEN, 31, GameResult::Win));
        batch.push_sample(&entry("4k3/8/8/8/8/8/8/R3K2R b KQ - 0 1", -64, GameResult::Draw));

        assert_eq!(batch.size, 2);
        assert!(batch.is_full());

        // 32 pieces minus the perspective's own king, one real and one
        // virtual feature each.
        let f0 = features_of(&batch.ind1, 0);
        assert_eq!(f0.len(), 2 * 31);
        assert_eq!(features_of(&batch.ind2, 0).len(), 2 * 31);
        let f1 = features_of(&batch.ind1, 1);
        assert_eq!(f1.len(), 2 * 3);

        // Strictly increasing feature index inside every run.
        for run in [&f0, &f1, &features_of(&batch.ind2, 0), &features_of(&batch.ind2, 1)] {
            assert!(run.windows(2).all(|w| w[0] < w[1]), "unsorted run: {run:?}");
        }

        // Real features come first, virtual features start at FT_IN_DIMS.
        assert!(f0[..31].iter().all(|&x| (x as usize) < FT_IN_DIMS));
        assert!(f0[31..].iter().all(|&x| (x as usize) >= FT_IN_DIMS));

        assert_eq!(batch.ind_active, 2 * 31 + 2 * 3);
        assert_eq!(batch.ind1.len(), 2 * (2 * 31 + 2 * 3));
    }

    #[test]
    fn test_targets() {
        let mut batch = Batch::new(3);
        batch.push_sample(&entry(chess::STARTPOS_FEN, 508, GameResult::Win));
        // Black to move: the white-relative win becomes a loss target.
        batch.push_sample(&entry("4k3/8/8/8/8/8/8/4K3 b - - 0 1", -254, GameResult::Win));
        batch.push_sample(&entry("4k3/8/8/8/8/8/8/4K3 w - - 0 1", 0, GameResult::Unknown));

        assert_eq!(batch.eval[0], 1.0);
        assert_eq!(batch.eval[1], -0.5);
        assert_eq!(batch.result[0], 1.0);
        assert_eq!(batch.result[1], 0.0);
        assert_eq!(batch.result[2], 0.5);
    }
}
