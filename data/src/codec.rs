//! Little-endian readers and writers for the atoms of a `.bit` game archive.
//!
//! A file is a flat record sequence with implicit framing: a zero move word
//! announces a fresh start position plus result byte, replacing the reader's
//! cursor position; every record then carries an eval and a flag. Clean EOF
//! is only legal where a move word would start.

use std::io::{self, Read, Write};

use thiserror::Error;

use chess::types::{
    bitboard::Bitboard,
    board::Board,
    castling::CastlingRights,
    color::Color,
    moves::Move,
    piece::{CPiece, Piece},
    square::Square,
};

use crate::GameResult;

/// Size of an encoded start position: occupancy bitboard, 32 piece nibbles,
/// side to move, castling, en passant, halfmove clock, fullmove number, two
/// padding bytes.
pub const POSITION_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum CodecError {
    /// Clean end of stream at a record boundary.
    #[error("end of stream")]
    Eof,
    /// The stream ended inside a record.
    #[error("truncated record")]
    Truncated,
    #[error("i/o: {0}")]
    Io(io::Error),
    #[error("malformed position record")]
    BadPosition,
    #[error("invalid result byte {0}")]
    BadResult(i8),
}

fn read_bytes<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<(), CodecError> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof { CodecError::Truncated } else { CodecError::Io(e) }
    })
}

/// Read a move word. `CodecError::Eof` here is the one legal end of stream.
pub fn read_move<R: Read>(r: &mut R) -> Result<Move, CodecError> {
    let mut buf = [0u8; 2];
    let mut n = 0;
    while n < 2 {
        match r.read(&mut buf[n..]) {
            Ok(0) if n == 0 => return Err(CodecError::Eof),
            Ok(0) => return Err(CodecError::Truncated),
            Ok(k) => n += k,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(CodecError::Io(e)),
        }
    }
    Ok(Move(u16::from_le_bytes(buf)))
}

pub fn write_move<W: Write>(w: &mut W, m: Move) -> io::Result<()> {
    w.write_all(&m.0.to_le_bytes())
}

pub fn read_eval<R: Read>(r: &mut R) -> Result<i32, CodecError> {
    let mut buf = [0u8; 4];
    read_bytes(r, &mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

pub fn write_eval<W: Write>(w: &mut W, eval: i32) -> io::Result<()> {
    w.write_all(&eval.to_le_bytes())
}

pub fn read_flag<R: Read>(r: &mut R) -> Result<u8, CodecError> {
    let mut buf = [0u8; 1];
    read_bytes(r, &mut buf)?;
    Ok(buf[0])
}

pub fn write_flag<W: Write>(w: &mut W, flag: u8) -> io::Result<()> {
    w.write_all(&[flag])
}

pub fn read_result<R: Read>(r: &mut R) -> Result<GameResult, CodecError> {
    let mut buf = [0u8; 1];
    read_bytes(r, &mut buf)?;
    let v = buf[0] as i8;
    GameResult::from_wire(v).ok_or(CodecError::BadResult(v))
}

pub fn write_result<W: Write>(w: &mut W, result: GameResult) -> io::Result<()> {
    w.write_all(&[result.to_wire() as u8])
}

/// Encode a position into its fixed 32-byte record.
pub fn write_position<W: Write>(w: &mut W, b: &Board) -> io::Result<()> {
    let mut rec = [0u8; POSITION_BYTES];
    let occ = b.occ();
    rec[..8].copy_from_slice(&occ.0.to_le_bytes());

    let mut i = 0;
    occ.bitloop(|s| {
        rec[8 + i / 2] |= (b.pc_at(s).index() as u8) << (4 * (i % 2));
        i += 1;
    });

    rec[24] = b.stm as u8;
    rec[25] = b.state.castling.0;
    rec[26] = if b.state.epsq.is_valid() { b.state.epsq as u8 } else { 0 };
    rec[27] = b.state.halfmoves;
    rec[28..30].copy_from_slice(&b.state.fullmoves.to_le_bytes());

    w.write_all(&rec)
}

/// Decode a 32-byte position record into a fresh board.
pub fn read_position<R: Read>(r: &mut R) -> Result<Board, CodecError> {
    let mut rec = [0u8; POSITION_BYTES];
    read_bytes(r, &mut rec)?;

    let mut occ_bytes = [0u8; 8];
    occ_bytes.copy_from_slice(&rec[..8]);
    let occ = Bitboard(u64::from_le_bytes(occ_bytes));
    if occ.nbits() > 32 {
        return Err(CodecError::BadPosition);
    }

    let mut b = Board::empty();
    let mut i = 0;
    let mut bad = false;
    occ.bitloop(|s| {
        let code = (rec[8 + i / 2] >> (4 * (i % 2))) & 0xF;
        i += 1;
        if code == 0 || code > 12 {
            bad = true;
        } else if !bad {
            b.set_piece(CPiece::from_index(code as usize), s);
        }
    });
    if bad
        || b.pc_bb(Color::White, Piece::King).nbits() != 1
        || b.pc_bb(Color::Black, Piece::King).nbits() != 1
        || rec[24] > 1
        || rec[25] > CastlingRights::ALL.0
        || rec[26] >= 64
    {
        return Err(CodecError::BadPosition);
    }

    b.stm = Color::from_raw(rec[24]);
    b.state.castling = CastlingRights(rec[25]);
    b.state.epsq = if rec[26] == 0 { Square::Invalid } else { Square::from_raw(rec[26]) };
    b.state.halfmoves = rec[27];
    b.state.fullmoves = u16::from_le_bytes([rec[28], rec[29]]).max(1);
    Ok(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess::types::moves::MoveFlag;

    #[test]
    fn test_position_round_trip() {
        for fen in [
            chess::STARTPOS_FEN,
            "rnbqkbnr/ppp1pppp/8/3pP3/8/8/PPPP1PPP/RNBQKBNR b KQkq d6 4 3",
            "4k3/8/8/8/8/8/8/R3K2R w KQ - 10 31",
            "8/2k5/8/8/4K3/8/8/8 b - - 99 120",
        ] {
            let b: Board = fen.parse().unwrap();
            let mut bytes = Vec::new();
            write_position(&mut bytes, &b).unwrap();
            assert_eq!(bytes.len(), POSITION_BYTES);
            let back = read_position(&mut bytes.as_slice()).unwrap();
            assert_eq!(back.to_fen(), fen);
        }
    }

    #[test]
    fn test_position_rejects_garbage() {
        // All-ones occupancy with zero nibbles.
        let mut rec = [0u8; POSITION_BYTES];
        rec[..8].copy_from_slice(&u64::MAX.to_le_bytes());
        assert!(matches!(read_position(&mut rec.as_slice()), Err(CodecError::BadPosition)));

        // No kings.
        let rec = [0u8; POSITION_BYTES];
        assert!(matches!(read_position(&mut rec.as_slice()), Err(CodecError::BadPosition)));
    }

    #[test]
    fn test_atoms_round_trip() {
        let mut bytes = Vec::new();
        write_move(&mut bytes, Move::new(Square::E2, Square::E4, MoveFlag::Normal)).unwrap();
        write_eval(&mut bytes, -1234).unwrap();
        write_flag(&mut bytes, 1).unwrap();
        write_result(&mut bytes, GameResult::Loss).unwrap();

        let r = &mut bytes.as_slice();
        assert_eq!(read_move(r).unwrap(), Move::new(Square::E2, Square::E4, MoveFlag::Normal));
        assert_eq!(read_eval(r).unwrap(), -1234);
        assert_eq!(read_flag(r).unwrap(), 1);
        assert_eq!(read_result(r).unwrap(), GameResult::Loss);
        assert!(matches!(read_move(r), Err(CodecError::Eof)));
    }

    #[test]
    fn test_truncation_is_not_clean_eof() {
        let bytes = [0u8; 1];
        assert!(matches!(read_move(&mut bytes.as_slice()), Err(CodecError::Truncated)));
        assert!(matches!(read_eval(&mut bytes.as_slice()), Err(CodecError::Truncated)));
    }

    #[test]
    fn test_bad_result_rejected() {
        let bytes = [7u8];
        assert!(matches!(read_result(&mut bytes.as_slice()), Err(CodecError::BadResult(7))));
    }

    #[test]
    fn test_stream_decode_encode_is_identity() {
        // Two games, one with a move tail.
        let mut bytes = Vec::new();
        let mut b = Board::default();
        write_move(&mut bytes, Move::NULL).unwrap();
        write_position(&mut bytes, &b).unwrap();
        write_result(&mut bytes, GameResult::Win).unwrap();
        write_eval(&mut bytes, 12).unwrap();
        write_flag(&mut bytes, 0).unwrap();
        for m in [
            Move::new(Square::D2, Square::D4, MoveFlag::Normal),
            Move::new(Square::G8, Square::F6, MoveFlag::Normal),
        ] {
            b.apply_move(m);
            write_move(&mut bytes, m).unwrap();
            write_eval(&mut bytes, -7).unwrap();
            write_flag(&mut bytes, 1).unwrap();
        }
        write_move(&mut bytes, Move::NULL).unwrap();
        write_position(&mut bytes, &"4k3/8/8/8/8/8/8/R3K2R w KQ - 3 9".parse().unwrap()).unwrap();
        write_result(&mut bytes, GameResult::Unknown).unwrap();
        write_eval(&mut bytes, crate::VALUE_NONE).unwrap();
        write_flag(&mut bytes, 0).unwrap();

        // Replaying every record through the readers and re-encoding must
        // reproduce the stream byte for byte.
        let r = &mut bytes.as_slice();
        let mut out = Vec::new();
        let mut cursor = Board::default();
        loop {
            let m = match read_move(r) {
                Ok(m) => m,
                Err(CodecError::Eof) => break,
                Err(e) => panic!("{e}"),
            };
            write_move(&mut out, m).unwrap();
            if m.is_null() {
                cursor = read_position(r).unwrap();
                write_position(&mut out, &cursor).unwrap();
                write_result(&mut out, read_result(r).unwrap()).unwrap();
            } else {
                cursor.apply_move(m);
            }
            write_eval(&mut out, read_eval(r).unwrap()).unwrap();
            write_flag(&mut out, read_flag(r).unwrap()).unwrap();
        }
        assert_eq!(bytes, out);
    }
}
