//! The quantized feed-forward stack above the accumulator.
//!
//! Two interchangeable implementations exist: a plain scalar one and an AVX2
//! one selected at compile time. The vector kernels emit their outputs in a
//! lane-shuffled order; rather than unshuffling per call, the weight store
//! pre-permutes weights and biases once at load time (`permute`), after
//! which both implementations produce identical integers.

pub mod permute;
pub mod scalar;

#[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
pub mod avx2;

use chess::types::color::Color;
use utils::Align64;

use crate::{FT_OUT_DIMS, accumulator::Accumulator, net::Network};

/// Run the full stack on top of the accumulator, returning the raw
/// (pre-scaling) output neuron.
pub fn propagate(net: &Network, acc: &Accumulator, stm: Color) -> i32 {
    let mut ft_out = Align64([0i8; FT_OUT_DIMS]);
    let mut h1_out = Align64([0i8; 16]);
    let mut h2_out = Align64([0i8; 32]);

    #[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
    {
        avx2::transform(acc, stm, &mut ft_out);
        avx2::hidden1(&ft_out, &net.h1_biases, &net.h1_weights, &mut h1_out);
        avx2::hidden2(&h1_out, &net.h2_biases, &net.h2_weights, &mut h2_out);
        avx2::output(&h2_out, net.out_bias, &net.out_weights)
    }

    #[cfg(not(all(target_arch = "x86_64", target_feature = "avx2")))]
    {
        scalar::transform(acc, stm, &mut ft_out);
        scalar::affine(&*ft_out, &*net.h1_biases, &*net.h1_weights, &mut h1_out.0);
        scalar::affine(&*h1_out, &*net.h2_biases, &*net.h2_weights, &mut h2_out.0);
        scalar::output(&h2_out, net.out_bias, &net.out_weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::K_HALF;

    #[test]
    fn test_zero_network_evaluates_to_zero() {
        let net = Network::zeroed();
        let acc = Accumulator::default();
        assert_eq!(propagate(&net, &acc, Color::White), 0);
        assert_eq!(propagate(&net, &acc, Color::Black), 0);
    }

    #[test]
    fn test_constant_bias_saturates_transform() {
        // With zero weights the accumulator is exactly the bias, and the
        // transform must clip each lane into [0, 127].
        for (bias, expect) in [(100i16, 100i8), (300, 127), (-5, 0)] {
            let mut acc = Accumulator::default();
            acc.vals[0].0 = [bias; K_HALF];
            acc.vals[1].0 = [bias; K_HALF];

            let mut ft_out = Align64([0i8; FT_OUT_DIMS]);
            scalar::transform(&acc, Color::White, &mut ft_out);
            assert!(ft_out.iter().all(|&x| x == expect));
        }
    }

    #[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
    #[test]
    fn test_scalar_and_simd_agree_bit_for_bit() {
        let raw = Network::test_filled(0xC0FFEE);
        let mut permuted = Network::test_filled(0xC0FFEE);
        permute::permute_weights(&mut permuted);

        let mut acc = Accumulator::default();
        let mut rng = utils::Xorshift64::new(99);
        for p in 0..2 {
            for i in 0..K_HALF {
                acc.vals[p].0[i] = (rng.next_u64() % 512) as i16 - 128;
            }
        }

        for stm in Color::iter() {
            let mut ft_s = Align64([0i8; FT_OUT_DIMS]);
            let mut ft_v = Align64([0i8; FT_OUT_DIMS]);
            let mut h1_s = Align64([0i8; 16]);
            let mut h1_v = Align64([0i8; 16]);
            let mut h2_s = Align64([0i8; 32]);
            let mut h2_v = Align64([0i8; 32]);

            scalar::transform(&acc, stm, &mut ft_s);
            avx2::transform(&acc, stm, &mut ft_v);

            scalar::affine(&*ft_s, &*raw.h1_biases, &*raw.h1_weights, &mut h1_s.0);
            avx2::hidden1(&ft_v, &permuted.h1_biases, &permuted.h1_weights, &mut h1_v);

            scalar::affine(&*h1_s, &*raw.h2_biases, &*raw.h2_weights, &mut h2_s.0);
            avx2::hidden2(&h1_v, &permuted.h2_biases, &permuted.h2_weights, &mut h2_v);

            let out_s = scalar::output(&h2_s, raw.out_bias, &raw.out_weights);
            let out_v = avx2::output(&h2_v, permuted.out_bias, &permuted.out_weights);
            assert_eq!(out_s, out_v);
        }
    }
}
