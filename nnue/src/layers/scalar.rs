//! Reference implementation of the quantized layers.
//!
//! Consumes weights in their on-disk order; never feed it a permuted
//! weight store.

use chess::types::color::Color;
use utils::Align64;

use crate::{FT_OUT_DIMS, FT_SHIFT, K_HALF, SHIFT, accumulator::Accumulator};

/// Narrow the two perspective halves of the accumulator to i8 activations,
/// side to move first.
pub fn transform(acc: &Accumulator, stm: Color, output: &mut Align64<[i8; FT_OUT_DIMS]>) {
    let own = &acc.vals[stm.index()];
    let opp = &acc.vals[(!stm).index()];
    for i in 0..K_HALF {
        output[i] = (own[i] >> FT_SHIFT).clamp(0, 127) as i8;
        output[K_HALF + i] = (opp[i] >> FT_SHIFT).clamp(0, 127) as i8;
    }
}

/// One affine layer plus clipped ReLU. Weights are input-major:
/// `weights[OUT * i + j]` feeds input `i` into output `j`.
pub fn affine(input: &[i8], biases: &[i32], weights: &[i8], output: &mut [i8]) {
    let n_out = biases.len();
    let mut tmp = biases.to_vec();

    for (i, &x) in input.iter().enumerate() {
        if x != 0 {
            for j in 0..n_out {
                tmp[j] += x as i32 * weights[n_out * i + j] as i32;
            }
        }
    }

    for j in 0..n_out {
        output[j] = (tmp[j] >> SHIFT).clamp(0, 127) as i8;
    }
}

/// The last affine layer: a single unshifted i32 neuron.
pub fn output(input: &[i8; 32], bias: i32, weights: &[i8; 32]) -> i32 {
    let mut sum = bias;
    for i in 0..32 {
        sum += weights[i] as i32 * input[i] as i32;
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affine_shift_truncates_toward_negative_infinity() {
        // The arithmetic shift is part of the interface: -1 >> 6 is -1, so a
        // slightly negative sum must clip to zero, never round up past it.
        let input = [1i8];
        let weights = [-1i8];
        let mut out = [0i8];
        affine(&input, &[0], &weights, &mut out);
        assert_eq!(out[0], 0);

        affine(&input, &[190], &weights, &mut out);
        assert_eq!(out[0], (189 >> 6) as i8);
    }

    #[test]
    fn test_affine_matches_hand_computation() {
        // Two inputs, two outputs, input-major weights.
        let input = [2i8, 3];
        let biases = [64i32, -64];
        let weights = [1i8, -2, 4, 5];
        let mut out = [0i8; 2];
        affine(&input, &biases, &weights, &mut out);
        // out0 = (64 + 2*1 + 3*4) >> 6 = 78 >> 6 = 1
        // out1 = (-64 + 2*-2 + 3*5) >> 6 = -53 >> 6 = -1 -> clip 0
        assert_eq!(out, [1, 0]);
    }

    #[test]
    fn test_output_layer() {
        let mut input = [0i8; 32];
        let mut weights = [0i8; 32];
        input[0] = 10;
        weights[0] = -3;
        input[31] = 127;
        weights[31] = 2;
        assert_eq!(output(&input, 7, &weights), 7 - 30 + 254);
    }
}
