//! AVX2 kernels for the quantized layers.
//!
//! These mirror the scalar stack bit for bit, provided the weight store was
//! permuted exactly once at load time: the transform emits its lanes in
//! packed order, hidden1 absorbs that through column-swapped weights,
//! hidden2 emits a swapped block that the pre-swapped output weights absorb
//! in turn.

use std::arch::x86_64::*;

use chess::types::color::Color;
use utils::Align64;

use crate::{FT_OUT_DIMS, FT_SHIFT, K_HALF, SHIFT, accumulator::Accumulator};

/// Accumulator to i8 activations. The output of each 32-lane block is in
/// packed (not sequential) order.
pub fn transform(acc: &Accumulator, stm: Color, output: &mut Align64<[i8; FT_OUT_DIMS]>) {
    let persp = [stm, !stm];
    unsafe {
        for (j, &p) in persp.iter().enumerate() {
            let src = acc.vals[p.index()].as_ptr() as *const __m256i;
            let dst = (output.as_mut_ptr() as *mut __m256i).add(j * K_HALF / 32);
            for i in 0..K_HALF / 32 {
                let p0 = _mm256_srai_epi16::<{ FT_SHIFT }>(_mm256_load_si256(src.add(2 * i)));
                let p1 = _mm256_srai_epi16::<{ FT_SHIFT }>(_mm256_load_si256(src.add(2 * i + 1)));
                _mm256_store_si256(dst.add(i), _mm256_max_epi8(_mm256_packs_epi16(p0, p1), _mm256_setzero_si256()));
            }
        }
    }
}

/// Broadcast a pair of adjacent i8 activations into every i16 lane.
#[inline]
unsafe fn broadcast_pair(lo: i8, hi: i8) -> __m256i {
    let pair = (lo as u8 as u16 | (hi as u8 as u16) << 8) as i16;
    unsafe { _mm256_set1_epi16(pair) }
}

/// 512 -> 16 affine + clipped ReLU. Output is in sequential order.
pub fn hidden1(
    input: &Align64<[i8; FT_OUT_DIMS]>,
    biases: &Align64<[i32; 16]>,
    weights: &Align64<[i8; 16 * FT_OUT_DIMS]>,
    output: &mut Align64<[i8; 16]>,
) {
    unsafe {
        let bias = biases.as_ptr() as *const __m256i;
        let mut out0 = _mm256_load_si256(bias);
        let mut out1 = _mm256_load_si256(bias.add(1));

        let wptr = weights.as_ptr() as *const __m256i;
        for i in 0..FT_OUT_DIMS / 2 {
            let weight = _mm256_load_si256(wptr.add(i));
            let inv = broadcast_pair(input[2 * i], input[2 * i + 1]);

            let prod = _mm256_maddubs_epi16(inv, weight);
            let signs = _mm256_cmpgt_epi16(_mm256_setzero_si256(), prod);
            out0 = _mm256_add_epi32(out0, _mm256_unpacklo_epi16(prod, signs));
            out1 = _mm256_add_epi32(out1, _mm256_unpackhi_epi16(prod, signs));
        }

        let packed = _mm256_srai_epi16::<{ SHIFT }>(_mm256_packs_epi32(out0, out1));
        let folded = _mm_packs_epi16(_mm256_castsi256_si128(packed), _mm256_extracti128_si256::<1>(packed));
        _mm_store_si128(output.as_mut_ptr() as *mut __m128i, _mm_max_epi8(folded, _mm_setzero_si128()));
    }
}

/// 16 -> 32 affine + clipped ReLU. Output blocks 8-15 and 16-23 come out
/// swapped; the pre-permuted output weights compensate.
pub fn hidden2(
    input: &Align64<[i8; 16]>,
    biases: &Align64<[i32; 32]>,
    weights: &Align64<[i8; 32 * 16]>,
    output: &mut Align64<[i8; 32]>,
) {
    unsafe {
        let bias = biases.as_ptr() as *const __m256i;
        let mut out0 = _mm256_load_si256(bias);
        let mut out1 = _mm256_load_si256(bias.add(1));
        let mut out2 = _mm256_load_si256(bias.add(2));
        let mut out3 = _mm256_load_si256(bias.add(3));

        let wptr = weights.as_ptr() as *const __m256i;
        for i in (0..16).step_by(2) {
            let inv = broadcast_pair(input[i], input[i + 1]);

            let mut prod = _mm256_maddubs_epi16(inv, _mm256_load_si256(wptr.add(i)));
            let mut signs = _mm256_cmpgt_epi16(_mm256_setzero_si256(), prod);
            out0 = _mm256_add_epi32(out0, _mm256_unpacklo_epi16(prod, signs));
            out1 = _mm256_add_epi32(out1, _mm256_unpackhi_epi16(prod, signs));

            prod = _mm256_maddubs_epi16(inv, _mm256_load_si256(wptr.add(i + 1)));
            signs = _mm256_cmpgt_epi16(_mm256_setzero_si256(), prod);
            out2 = _mm256_add_epi32(out2, _mm256_unpacklo_epi16(prod, signs));
            out3 = _mm256_add_epi32(out3, _mm256_unpackhi_epi16(prod, signs));
        }

        let lo = _mm256_srai_epi16::<{ SHIFT }>(_mm256_packs_epi32(out0, out1));
        let hi = _mm256_srai_epi16::<{ SHIFT }>(_mm256_packs_epi32(out2, out3));
        let packed = _mm256_max_epi8(_mm256_packs_epi16(lo, hi), _mm256_setzero_si256());
        _mm256_store_si256(output.as_mut_ptr() as *mut __m256i, packed);
    }
}

/// 32 -> 1 output neuron, no shift.
pub fn output(input: &Align64<[i8; 32]>, bias: i32, weights: &Align64<[i8; 32]>) -> i32 {
    unsafe {
        let inv = _mm256_load_si256(input.as_ptr() as *const __m256i);
        let w = _mm256_load_si256(weights.as_ptr() as *const __m256i);

        let mut prod = _mm256_maddubs_epi16(inv, w);
        prod = _mm256_madd_epi16(prod, _mm256_set1_epi16(1));

        let sum128 = _mm_add_epi32(_mm256_castsi256_si128(prod), _mm256_extracti128_si256::<1>(prod));
        let sum = _mm_add_epi32(sum128, _mm_shuffle_epi32::<0x1b>(sum128));
        _mm_cvtsi128_si32(sum) + _mm_extract_epi32::<1>(sum) + bias
    }
}
