pub mod accumulator;
pub mod feature;
pub mod layers;
pub mod net;

/// Half the accumulator width: one side's worth of first-layer neurons.
pub const K_HALF: usize = 256;

/// One king bucket's worth of piece-square features:
/// 5 piece types x 2 colors x 64 squares, plus a shared king block.
pub const PS_END: usize = 704;

/// Feature transformer input width: 32 king buckets of PS_END features.
pub const FT_IN_DIMS: usize = 32 * PS_END;

/// Feature transformer output width: both perspectives concatenated.
pub const FT_OUT_DIMS: usize = 2 * K_HALF;

/// Shift applied when narrowing the accumulator to i8 activations.
pub const FT_SHIFT: i32 = 0;

/// Shift applied after each hidden affine layer.
pub const SHIFT: i32 = 6;

/// Divisor putting the raw network output on the centipawn scale.
pub const FV_SCALE: i32 = 16;

/// Weight file version this build reads.
pub const VERSION_NNUE: u16 = 2;
