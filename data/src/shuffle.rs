//! Game-level shuffling of `.bit` archives.
//!
//! Producers write games in generation order, which correlates adjacent
//! training samples; a byte-wise permutation of whole games breaks that up
//! without touching any record. The input is fully validated as a side
//! effect of the offset scan.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use utils::Xorshift64;

use crate::validate::{ValidateError, require_bit_extension, scan};

/// Validate `path` and write its games in shuffled order to
/// `<stem>.shuffled.bit`. Refuses to overwrite an existing output. Returns
/// the output path.
pub fn shuffle_file(path: &Path, seed: Option<u64>) -> Result<PathBuf, ValidateError> {
    require_bit_extension(path)?;

    let f = File::open(path).map_err(|source| ValidateError::Open { path: path.to_owned(), source })?;
    let mut spans = Vec::new();
    scan(&mut BufReader::new(f), Some(&mut spans))?;

    let base = seed.unwrap_or_else(|| {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(1)
    });
    let mut rng = Xorshift64::new(base);
    for k in (1..spans.len()).rev() {
        let j = (rng.next_u64() % (k as u64 + 1)) as usize;
        spans.swap(k, j);
    }

    let out_path = path.with_extension("shuffled.bit");
    let out = File::options().write(true).create_new(true).open(&out_path).map_err(|e| {
        if e.kind() == io::ErrorKind::AlreadyExists {
            ValidateError::OutputExists(out_path.clone())
        } else {
            ValidateError::Io(e)
        }
    })?;

    let mut input = File::open(path).map_err(ValidateError::Io)?;
    let mut out = BufWriter::new(out);
    for span in &spans {
        input.seek(SeekFrom::Start(span.start))?;
        io::copy(&mut Read::by_ref(&mut input).take(span.end - span.start), &mut out)?;
    }
    out.flush()?;
    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GameResult, codec};
    use chess::types::{
        board::Board,
        moves::{Move, MoveFlag},
        square::Square,
    };
    use std::collections::HashMap;

    /// A game with `extra` ply, so each game's byte length is distinct.
    fn game(extra: usize, eval: i32) -> Vec<u8> {
        let moves = [
            Move::new(Square::E2, Square::E4, MoveFlag::Normal),
            Move::new(Square::E7, Square::E5, MoveFlag::Normal),
            Move::new(Square::G1, Square::F3, MoveFlag::Normal),
        ];
        let mut bytes = Vec::new();
        codec::write_move(&mut bytes, Move::NULL).unwrap();
        codec::write_position(&mut bytes, &Board::default()).unwrap();
        codec::write_result(&mut bytes, GameResult::Win).unwrap();
        codec::write_eval(&mut bytes, eval).unwrap();
        codec::write_flag(&mut bytes, 0).unwrap();
        for &m in moves.iter().take(extra) {
            codec::write_move(&mut bytes, m).unwrap();
            codec::write_eval(&mut bytes, eval).unwrap();
            codec::write_flag(&mut bytes, 0).unwrap();
        }
        bytes
    }

    /// Multiset of whole-game byte blobs in an archive.
    fn game_blobs(path: &Path) -> HashMap<Vec<u8>, usize> {
        let bytes = std::fs::read(path).unwrap();
        let mut spans = Vec::new();
        scan(&mut bytes.as_slice(), Some(&mut spans)).unwrap();
        let mut blobs = HashMap::new();
        for s in spans {
            *blobs.entry(bytes[s.start as usize..s.end as usize].to_vec()).or_insert(0) += 1;
        }
        blobs
    }

    #[test]
    fn test_shuffle_permutes_whole_games() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("shuffle-{}.bit", std::process::id()));
        let out_path = dir.join(format!("shuffle-{}.shuffled.bit", std::process::id()));
        let _ = std::fs::remove_file(&out_path);

        let mut bytes = Vec::new();
        for (extra, eval) in [(3, 1), (2, 2), (1, 3), (3, 4), (0, 5)] {
            bytes.extend(game(extra, eval));
        }
        std::fs::write(&path, &bytes).unwrap();

        let produced = shuffle_file(&path, Some(0xDECAF)).unwrap();
        assert_eq!(produced, out_path);

        // Same bytes per game, same game multiset, same total size; and the
        // shuffled output is itself a valid archive.
        let original = game_blobs(&path);
        let shuffled = game_blobs(&produced);
        assert_eq!(original, shuffled);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), std::fs::metadata(&produced).unwrap().len());

        // Refuse to clobber the output on a second run.
        assert_eq!(shuffle_file(&path, Some(1)).unwrap_err().exit_code(), 13);

        std::fs::remove_file(&path).unwrap();
        std::fs::remove_file(&out_path).unwrap();
    }

    #[test]
    fn test_extension_enforced() {
        assert_eq!(shuffle_file(Path::new("games.dat"), Some(1)).unwrap_err().exit_code(), 11);
    }
}
