//! Full-stream validation of `.bit` archives.
//!
//! Replays every game, re-checking each move against the reconstructed
//! position. Every failure mode has its own process exit code so scripted
//! pipelines can tell what broke.

use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::{Path, PathBuf},
};

use thiserror::Error;

use chess::types::board::Board;

use crate::{
    VALUE_INFINITE, VALUE_NONE,
    codec::{self, CodecError, POSITION_BYTES},
};

#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("cannot open {path}: {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("bad or truncated move record")]
    BadMove,
    #[error("illegal move {mv} in position {fen}")]
    IllegalMove { mv: String, fen: String },
    #[error("bad or truncated position record")]
    BadPosition,
    #[error("inconsistent position {fen}")]
    InconsistentPosition { fen: String },
    #[error("bad result byte")]
    BadResult,
    #[error("bad eval {0:#x}")]
    BadEval(i32),
    #[error("move record before any position")]
    MoveBeforePosition,
    #[error("bad flag byte")]
    BadFlag,
    #[error("data files use the .bit extension")]
    BadExtension,
    #[error("output file {0} already exists")]
    OutputExists(PathBuf),
    #[error("i/o: {0}")]
    Io(#[from] io::Error),
}

impl ValidateError {
    /// Stable process exit code for each failure mode.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Open { .. } => 2,
            Self::BadMove => 3,
            Self::IllegalMove { .. } => 4,
            Self::BadPosition => 5,
            Self::InconsistentPosition { .. } => 6,
            Self::BadResult => 7,
            Self::BadEval(_) => 8,
            Self::MoveBeforePosition => 9,
            Self::BadFlag => 10,
            Self::BadExtension => 11,
            Self::OutputExists(_) => 13,
            Self::Io(_) => 14,
        }
    }
}

/// Byte span of one game inside an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameSpan {
    pub start: u64,
    pub end: u64,
}

pub fn require_bit_extension(path: &Path) -> Result<(), ValidateError> {
    match path.extension() {
        Some(e) if e == "bit" => Ok(()),
        _ => Err(ValidateError::BadExtension),
    }
}

/// Validate an archive from start to finish.
pub fn validate_file(path: &Path) -> Result<(), ValidateError> {
    let f = File::open(path).map_err(|source| ValidateError::Open { path: path.to_owned(), source })?;
    scan(&mut BufReader::new(f), None)
}

/// Scan the stream, optionally recording each game's byte span.
pub(crate) fn scan<R: Read>(r: &mut R, mut spans: Option<&mut Vec<GameSpan>>) -> Result<(), ValidateError> {
    let mut board = Board::empty();
    let mut first = true;
    let mut offset: u64 = 0;

    loop {
        let m = match codec::read_move(r) {
            Ok(m) => m,
            Err(CodecError::Eof) => break,
            Err(_) => return Err(ValidateError::BadMove),
        };

        if m.is_null() {
            if let Some(spans) = spans.as_deref_mut() {
                if let Some(last) = spans.last_mut() {
                    last.end = offset;
                }
                spans.push(GameSpan { start: offset, end: 0 });
            }
            board = codec::read_position(r).map_err(|_| ValidateError::BadPosition)?;
            if !board.is_ok() {
                return Err(ValidateError::InconsistentPosition { fen: board.to_fen() });
            }
            codec::read_result(r).map_err(|_| ValidateError::BadResult)?;
            offset += (POSITION_BYTES + 1) as u64;
        } else {
            if first {
                return Err(ValidateError::MoveBeforePosition);
            }
            if !board.is_legal(m) {
                return Err(ValidateError::IllegalMove { mv: m.to_string(), fen: board.to_fen() });
            }
            board.apply_move(m);
        }
        first = false;
        offset += 2;

        let eval = codec::read_eval(r).map_err(|_| ValidateError::BadEval(VALUE_NONE))?;
        if eval != VALUE_NONE && !(-VALUE_INFINITE..=VALUE_INFINITE).contains(&eval) {
            return Err(ValidateError::BadEval(eval));
        }
        codec::read_flag(r).map_err(|_| ValidateError::BadFlag)?;
        offset += 5;
    }

    if let Some(spans) = spans {
        if let Some(last) = spans.last_mut() {
            last.end = offset;
        }
    }
    Ok(())
}
