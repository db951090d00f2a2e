use std::{
    fs::File,
    io::{self, BufReader, Read, Write},
    path::{Path, PathBuf},
};

use thiserror::Error;

use chess::types::{board::Board, color::Color, moves::Move};
use utils::{Align64, box_array};

use crate::{FT_IN_DIMS, FT_OUT_DIMS, FV_SCALE, K_HALF, VERSION_NNUE, accumulator::Accumulator, layers};

/// Weights and biases for the network, in the storage order the kernels
/// read: the feature transformer is feature-major (one K_HALF row per
/// feature), the affine layers input-major.
#[repr(C)]
pub struct Network {
    pub ft_weights: Align64<[i16; K_HALF * FT_IN_DIMS]>,
    pub ft_biases: Align64<[i16; K_HALF]>,
    pub psqt_weights: Align64<[i16; FT_IN_DIMS]>,

    pub h1_weights: Align64<[i8; 16 * FT_OUT_DIMS]>,
    pub h1_biases: Align64<[i32; 16]>,

    pub h2_weights: Align64<[i8; 32 * 16]>,
    pub h2_biases: Align64<[i32; 32]>,

    pub out_weights: Align64<[i8; 32]>,
    pub out_bias: i32,
}

#[derive(Debug, Error)]
pub enum WeightFileError {
    #[error("i/o: {0}")]
    Io(#[from] io::Error),
    #[error("unsupported weight file version {0}")]
    BadVersion(u16),
    #[error("trailing bytes after network parameters")]
    TrailingBytes,
}

fn read_u16<R: Read>(r: &mut R) -> io::Result<u16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    Ok(u16::from_le_bytes(b))
}

fn read_i16<R: Read>(r: &mut R) -> io::Result<i16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    Ok(i16::from_le_bytes(b))
}

fn read_i32<R: Read>(r: &mut R) -> io::Result<i32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(i32::from_le_bytes(b))
}

impl Network {
    /// A zeroed parameter set: the compiled-in default. Evaluates everything
    /// to zero until real weights are loaded over it.
    pub fn zeroed() -> Box<Self> {
        box_array()
    }

    /// Read a version-2 weight file.
    ///
    /// On disk the transformer rows are interleaved with the PSQT column at
    /// a stride of K_HALF + 1 (one extra slot also trails the biases), and
    /// the affine layers are stored column-major; the reader unpicks both.
    /// The parameters must fill the stream exactly.
    pub fn from_reader<R: Read>(r: &mut R) -> Result<Box<Self>, WeightFileError> {
        let version = read_u16(r)?;
        if version != VERSION_NNUE {
            return Err(WeightFileError::BadVersion(version));
        }

        let mut net = Self::zeroed();

        let mut row = vec![0u8; 2 * K_HALF];
        r.read_exact(&mut row)?;
        for (j, c) in row.chunks_exact(2).enumerate() {
            net.ft_biases.0[j] = i16::from_le_bytes([c[0], c[1]]);
        }
        read_i16(r)?; // historical padding slot

        for f in 0..FT_IN_DIMS {
            r.read_exact(&mut row)?;
            let dst = &mut net.ft_weights.0[K_HALF * f..K_HALF * (f + 1)];
            for (j, c) in row.chunks_exact(2).enumerate() {
                dst[j] = i16::from_le_bytes([c[0], c[1]]);
            }
            net.psqt_weights.0[f] = read_i16(r)?;
        }

        for j in 0..16 {
            net.h1_biases.0[j] = read_i32(r)?;
        }
        let mut block = vec![0u8; 16 * FT_OUT_DIMS];
        r.read_exact(&mut block)?;
        for j in 0..16 {
            for k in 0..FT_OUT_DIMS {
                net.h1_weights.0[16 * k + j] = block[FT_OUT_DIMS * j + k] as i8;
            }
        }

        for j in 0..32 {
            net.h2_biases.0[j] = read_i32(r)?;
        }
        let mut block = vec![0u8; 32 * 16];
        r.read_exact(&mut block)?;
        for j in 0..32 {
            for k in 0..16 {
                net.h2_weights.0[32 * k + j] = block[16 * j + k] as i8;
            }
        }

        net.out_bias = read_i32(r)?;
        let mut out = [0u8; 32];
        r.read_exact(&mut out)?;
        for (j, &b) in out.iter().enumerate() {
            net.out_weights.0[j] = b as i8;
        }

        let mut probe = [0u8; 1];
        if r.read(&mut probe)? != 0 {
            return Err(WeightFileError::TrailingBytes);
        }
        Ok(net)
    }

    /// Write the parameter set in the version-2 file layout.
    pub fn to_writer<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&VERSION_NNUE.to_le_bytes())?;

        for &b in self.ft_biases.iter() {
            w.write_all(&b.to_le_bytes())?;
        }
        w.write_all(&0i16.to_le_bytes())?;

        for f in 0..FT_IN_DIMS {
            for &v in &self.ft_weights.0[K_HALF * f..K_HALF * (f + 1)] {
                w.write_all(&v.to_le_bytes())?;
            }
            w.write_all(&self.psqt_weights.0[f].to_le_bytes())?;
        }

        for &b in self.h1_biases.iter() {
            w.write_all(&b.to_le_bytes())?;
        }
        for j in 0..16 {
            for k in 0..FT_OUT_DIMS {
                w.write_all(&self.h1_weights.0[16 * k + j].to_le_bytes())?;
            }
        }

        for &b in self.h2_biases.iter() {
            w.write_all(&b.to_le_bytes())?;
        }
        for j in 0..32 {
            for k in 0..16 {
                w.write_all(&self.h2_weights.0[32 * k + j].to_le_bytes())?;
            }
        }

        w.write_all(&self.out_bias.to_le_bytes())?;
        for &v in self.out_weights.iter() {
            w.write_all(&v.to_le_bytes())?;
        }
        Ok(())
    }

    /// Deterministically filled parameters for tests, small enough that no
    /// accumulator sum can overflow.
    #[cfg(test)]
    pub fn test_filled(seed: u64) -> Box<Self> {
        let mut rng = utils::Xorshift64::new(seed);
        let mut net = Self::zeroed();

        for v in net.ft_weights.0.iter_mut() {
            *v = (rng.next_u64() % 61) as i16 - 30;
        }
        for v in net.ft_biases.0.iter_mut() {
            *v = (rng.next_u64() % 201) as i16 - 100;
        }
        for v in net.psqt_weights.0.iter_mut() {
            *v = (rng.next_u64() % 1001) as i16 - 500;
        }
        for v in net.h1_weights.0.iter_mut() {
            *v = (rng.next_u64() % 255) as i8;
        }
        for v in net.h1_biases.0.iter_mut() {
            *v = (rng.next_u64() % 4001) as i32 - 2000;
        }
        for v in net.h2_weights.0.iter_mut() {
            *v = (rng.next_u64() % 255) as i8;
        }
        for v in net.h2_biases.0.iter_mut() {
            *v = (rng.next_u64() % 4001) as i32 - 2000;
        }
        for v in net.out_weights.0.iter_mut() {
            *v = (rng.next_u64() % 255) as i8;
        }
        net.out_bias = (rng.next_u64() % 4001) as i32 - 2000;
        net
    }
}

/// Where the active parameters came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightSource {
    Builtin,
    File(PathBuf),
}

/// Engine.
/// Owns the active weight store and hands out inference over it. Per-position
/// accumulators stay with their positions; the engine itself is immutable
/// during evaluation and therefore freely shared across positions.
pub struct Engine {
    net: Box<Network>,
    source: WeightSource,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An engine on the compiled-in default weights.
    pub fn new() -> Self {
        Self { net: Self::finish(Network::zeroed()), source: WeightSource::Builtin }
    }

    /// Prepare a parameter set for the active kernel implementation.
    #[allow(unused_mut)]
    fn finish(mut net: Box<Network>) -> Box<Network> {
        #[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
        layers::permute::permute_weights(&mut net);
        net
    }

    /// Replace the active weights with a version-2 weight file.
    /// On failure the engine falls back to the built-in set.
    pub fn load_weights(&mut self, path: &Path) -> Result<(), WeightFileError> {
        let loaded =
            File::open(path).map_err(WeightFileError::from).and_then(|f| Network::from_reader(&mut BufReader::new(f)));

        match loaded {
            Ok(net) => {
                self.net = Self::finish(net);
                self.source = WeightSource::File(path.to_owned());
                Ok(())
            }
            Err(e) => {
                log::warn!("failed to load network from {}: {e}; keeping built-in weights", path.display());
                self.use_builtin_weights();
                Err(e)
            }
        }
    }

    /// Switch back to the compiled-in default weights.
    pub fn use_builtin_weights(&mut self) {
        self.net = Self::finish(Network::zeroed());
        self.source = WeightSource::Builtin;
    }

    pub fn source(&self) -> &WeightSource {
        &self.source
    }

    pub fn net(&self) -> &Network {
        &self.net
    }

    /// Rebuild one perspective of the accumulator from scratch.
    pub fn refresh(&self, b: &Board, acc: &mut Accumulator, persp: Color) {
        acc.refresh(&self.net, b, persp);
    }

    /// Bring the accumulator up to date after `b.make_move(m)`.
    pub fn do_update(&self, b: &Board, acc: &mut Accumulator, m: Move) {
        acc.on_move_made(&self.net, b, m);
    }

    /// Bring the accumulator up to date after `b.undo_move()` popped `m`.
    pub fn undo_update(&self, b: &Board, acc: &mut Accumulator, m: Move) {
        acc.on_move_undone(&self.net, b, m);
    }

    /// The integer evaluation of the position, from the side to move.
    pub fn evaluate(&self, b: &Board, acc: &Accumulator) -> i32 {
        let raw = layers::propagate(&self.net, acc, b.stm);
        let psqt = (acc.psqt[b.stm.index()] - acc.psqt[(!b.stm).index()]) / 2;
        raw / FV_SCALE + psqt
    }

    /// Evaluate without trusting the accumulator: refresh both perspectives
    /// first.
    pub fn evaluate_from_scratch(&self, b: &Board, acc: &mut Accumulator) -> i32 {
        acc.refresh(&self.net, b, Color::Black);
        acc.refresh(&self.net, b, Color::White);
        self.evaluate(b, acc)
    }
}
