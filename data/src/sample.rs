//! Per-record sampling decisions for the training pipeline.

use utils::Xorshift64;

use crate::{FLAG_SKIP, GameResult, VALUE_NONE};

/// Win/draw/loss model: the probability of the given outcome as a function
/// of eval and move number. The logistic coefficients were fitted against
/// this engine's own game data.
pub fn win_rate_model(fullmove: u16, eval: i32, result: GameResult) -> f64 {
    let m = fullmove.min(125) as f64 / 64.0;
    let x = eval as f64 / 100.0;

    let a = ((-0.26358 * m + 1.69976) * m + 0.18960) * m + 0.71337;
    let b = ((-0.06160 * m + 0.40556) * m - 0.13854) * m + 0.47889;

    let w = 1.0 / (1.0 + ((a - x) / b).exp());
    let l = 1.0 / (1.0 + ((a + x) / b).exp());
    let d = 1.0 - w - l;

    match result {
        GameResult::Win => w,
        GameResult::Loss => l,
        GameResult::Draw => d,
        GameResult::Unknown => 0.0,
    }
}

/// The per-record accept/reject policy.
#[derive(Debug, Clone, Copy)]
pub struct SampleFilter {
    /// Probability of dropping an otherwise acceptable record.
    pub random_skip: f64,
    /// Down-sample records whose label disagrees with the WDL model.
    pub wdl_skip: bool,
    /// Reject records from games without a known outcome.
    pub require_result: bool,
}

impl SampleFilter {
    /// Decide whether a record enters a batch. `result` must already be
    /// re-signed to the side to move, and `eval` is as stored. Random draws
    /// happen in a fixed order so that a fixed seed replays identical
    /// decisions.
    pub fn accept(&self, eval: i32, flag: u8, result: GameResult, fullmove: u16, rng: &mut Xorshift64) -> bool {
        if self.require_result && !result.is_known() {
            return false;
        }
        if eval == VALUE_NONE || flag & FLAG_SKIP != 0 {
            return false;
        }
        if rng.bernoulli(self.random_skip) {
            return false;
        }
        if self.wdl_skip && result.is_known() && rng.bernoulli(1.0 - win_rate_model(fullmove, eval, result)) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_FILTER: SampleFilter = SampleFilter { random_skip: 0.0, wdl_skip: false, require_result: false };

    #[test]
    fn test_wdl_probabilities_sum_to_one() {
        for fullmove in [1, 20, 60, 125, 300] {
            for eval in [-900, -150, 0, 42, 600] {
                let w = win_rate_model(fullmove, eval, GameResult::Win);
                let d = win_rate_model(fullmove, eval, GameResult::Draw);
                let l = win_rate_model(fullmove, eval, GameResult::Loss);
                assert!((w + d + l - 1.0).abs() < 1e-9);
                assert!(w >= 0.0 && l >= 0.0);
            }
        }
    }

    #[test]
    fn test_wdl_model_tracks_eval() {
        // A crushing eval should make the win outcome near-certain.
        assert!(win_rate_model(40, 2000, GameResult::Win) > 0.99);
        assert!(win_rate_model(40, 2000, GameResult::Loss) < 0.01);
        // A level eval in the middlegame is mostly drawish.
        assert!(win_rate_model(40, 0, GameResult::Draw) > 0.5);
    }

    #[test]
    fn test_hard_filters() {
        let mut rng = Xorshift64::new(1);
        assert!(NO_FILTER.accept(25, 0, GameResult::Win, 10, &mut rng));
        assert!(!NO_FILTER.accept(VALUE_NONE, 0, GameResult::Win, 10, &mut rng));
        assert!(!NO_FILTER.accept(25, FLAG_SKIP, GameResult::Win, 10, &mut rng));

        let require = SampleFilter { require_result: true, ..NO_FILTER };
        assert!(!require.accept(25, 0, GameResult::Unknown, 10, &mut rng));
        assert!(require.accept(25, 0, GameResult::Draw, 10, &mut rng));
    }

    #[test]
    fn test_random_skip_is_reproducible() {
        let filter = SampleFilter { random_skip: 0.5, ..NO_FILTER };
        let decide = || {
            let mut rng = Xorshift64::new(42);
            (0..256).map(|i| filter.accept(i, 0, GameResult::Unknown, 10, &mut rng)).collect::<Vec<_>>()
        };
        let a = decide();
        assert_eq!(a, decide());
        // With skip probability one half, both outcomes must occur.
        assert!(a.iter().any(|&x| x) && a.iter().any(|&x| !x));
    }

    #[test]
    fn test_wdl_skip_keeps_consistent_labels() {
        // Labels that agree with a decisive eval survive far more often than
        // contradictory ones.
        let filter = SampleFilter { wdl_skip: true, ..NO_FILTER };
        let survived = |result| {
            let mut rng = Xorshift64::new(7);
            (0..1000).filter(|_| filter.accept(800, 0, result, 40, &mut rng)).count()
        };
        assert!(survived(GameResult::Win) > 10 * survived(GameResult::Loss).max(1) / 2);
        assert!(survived(GameResult::Win) > 900);
        assert!(survived(GameResult::Loss) < 100);
    }
}
