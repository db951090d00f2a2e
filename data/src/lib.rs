pub mod batch;
pub mod codec;
pub mod loader;
pub mod sample;
pub mod shuffle;
pub mod validate;

use chess::types::color::Color;

/// Sentinel eval meaning "no target was stored for this record".
pub const VALUE_NONE: i32 = 0x7FFF;

/// Largest magnitude a stored eval may take.
pub const VALUE_INFINITE: i32 = 0x7FFE;

/// Record flag bit: the trainer must skip this record.
pub const FLAG_SKIP: u8 = 0x1;

/// Upper bound on features per perspective in one sample.
pub const MAX_ACTIVE_PER_SAMPLE: usize = 32;

/// Game outcome as stored in an archive, white-relative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    Loss,
    Draw,
    Win,
    Unknown,
}

impl GameResult {
    /// The byte stored in the archive.
    pub const fn to_wire(self) -> i8 {
        match self {
            Self::Loss => -1,
            Self::Draw => 0,
            Self::Win => 1,
            Self::Unknown => 2,
        }
    }

    /// Decode an archive byte; both 2 and -2 mean unknown.
    pub const fn from_wire(v: i8) -> Option<Self> {
        match v {
            -1 => Some(Self::Loss),
            0 => Some(Self::Draw),
            1 => Some(Self::Win),
            2 | -2 => Some(Self::Unknown),
            _ => None,
        }
    }

    pub const fn is_known(self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Re-sign a white-relative outcome to the given side to move.
    pub const fn from_stm(self, stm: Color) -> Self {
        match (self, stm) {
            (Self::Loss, Color::Black) => Self::Win,
            (Self::Win, Color::Black) => Self::Loss,
            (r, _) => r,
        }
    }

    /// Training target in [0, 1]; unknown outcomes train toward a draw.
    pub const fn target(self) -> f32 {
        match self {
            Self::Loss => 0.0,
            Self::Win => 1.0,
            Self::Draw | Self::Unknown => 0.5,
        }
    }
}
