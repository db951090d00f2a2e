use core::fmt;

use crate::impl_from_type;

use super::color::Color;

/// Piece type, ordered by increasing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Piece {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

/// CPiece.
/// A piece together with its color, using the on-disk numbering:
/// 1..=6 white pawn..king, 7..=12 black pawn..king, 0 empty.
#[rustfmt::skip]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum CPiece {
    #[default]
    None = 0,
    WPawn, WKnight, WBishop, WRook, WQueen, WKing,
    BPawn, BKnight, BBishop, BRook, BQueen, BKing,
}

impl Piece {
    pub const NUM: usize = 6;

    /// The index of this piece.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Iterate over all piece types.
    #[inline]
    pub fn iter() -> impl Iterator<Item = Piece> {
        (0..Self::NUM).map(Piece::from_index)
    }
}

impl CPiece {
    pub const NUM: usize = 13;

    const UCI_CHAR: &str = " PNBRQKpnbrqk";

    /// The index of this CPiece. Doubles as its wire code.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The color of this CPiece. Must not be called on None.
    #[inline]
    pub const fn color(self) -> Color {
        debug_assert!(self as u8 != 0);
        Color::from_raw((self as u8 <= 6) as u8)
    }

    /// The type of this CPiece. Must not be called on None.
    #[inline]
    pub const fn pt(self) -> Piece {
        debug_assert!(self as u8 != 0);
        Piece::from_raw((self as u8 - 1) % 6)
    }

    /// Create a CPiece from a Color and a Piece.
    #[inline]
    pub const fn create(c: Color, p: Piece) -> CPiece {
        Self::from_raw(p as u8 + 1 + 6 * (1 - c as u8))
    }
}

impl TryFrom<char> for CPiece {
    type Error = &'static str;

    /// Constructs a piece from its FEN character.
    fn try_from(value: char) -> Result<Self, Self::Error> {
        match Self::UCI_CHAR.chars().position(|x| x == value) {
            Some(i) if i > 0 => Ok(Self::from_index(i)),
            _ => Err("Invalid piece!"),
        }
    }
}

/// Displays the piece using its FEN character.
impl fmt::Display for CPiece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Self::UCI_CHAR.as_bytes()[self.index()] as char)
    }
}

impl_from_type! {
    Piece, u8, 6,
    [i64, i32, i16, i8, u64, u32, u16, u8, usize]
}

impl_from_type! {
    CPiece, u8, 13,
    [i64, i32, i16, i8, u64, u32, u16, u8, usize]
}
