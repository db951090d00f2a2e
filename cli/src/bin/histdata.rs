use std::{fs::File, io::BufReader, path::PathBuf};

use anyhow::{Context, bail};
use clap::Parser;

use chess::types::{board::Board, color::Color, piece::Piece};
use data::{FLAG_SKIP, GameResult, VALUE_NONE, codec, codec::CodecError};

/// Print summary statistics of a .bit training archive: position and game
/// counts, draw rate, and a white-relative square-frequency table per piece
/// type over all records carrying a usable eval.
#[derive(Parser)]
#[command(name = "histdata", version)]
struct Args {
    /// Archive to summarise.
    file: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let f = File::open(&args.file).with_context(|| format!("could not open {}", args.file.display()))?;
    let mut r = BufReader::new(f);

    let mut piece_square = [[0u64; 64]; Piece::NUM];
    let mut board = Board::default();
    let mut result = GameResult::Unknown;
    let mut total = 0u64;
    let mut games = 0u64;
    let mut draws = 0u64;
    let mut count = 0u64;

    loop {
        count += 1;
        if count % 20000 == 0 {
            eprint!("collecting data: {count}\r");
        }

        let m = match codec::read_move(&mut r) {
            Ok(m) => m,
            Err(CodecError::Eof) => break,
            Err(e) => bail!("broken move record: {e}"),
        };

        if m.is_null() {
            board = codec::read_position(&mut r).context("broken position record")?;
            if !board.is_ok() {
                bail!("inconsistent position {}", board.to_fen());
            }
            result = codec::read_result(&mut r).context("broken result record")?;
            games += 1;
        } else {
            if !board.is_legal(m) {
                bail!("illegal move {m} in position {}", board.to_fen());
            }
            board.apply_move(m);
        }

        // A torn final record just ends the scan.
        let Ok(eval) = codec::read_eval(&mut r) else { break };
        let Ok(flag) = codec::read_flag(&mut r) else { break };

        if eval == VALUE_NONE || flag & FLAG_SKIP != 0 {
            continue;
        }
        for c in Color::iter() {
            for pt in Piece::iter() {
                board.pc_bb(c, pt).bitloop(|s| {
                    // Fold both colors onto white's orientation.
                    let sq = s.index() ^ if c == Color::Black { 56 } else { 0 };
                    piece_square[pt.index()][sq] += 1;
                });
            }
        }
        total += 1;
        if result == GameResult::Draw {
            draws += 1;
        }
    }
    eprint!("\x1b[2K");

    println!("total positions: {total}");
    println!("total games: {games}");
    println!("draw percent: {}", draws as f64 / total as f64);
    for pt in Piece::iter() {
        print_square_table(&piece_square[pt.index()], total);
    }
    Ok(())
}

/// An 8x8 grid of occupancy percentages, rank 8 at the top.
fn print_square_table(square: &[u64; 64], total: u64) {
    const RULE: &str = "+-------+-------+-------+-------+-------+-------+-------+-------+";
    for rank in (0..8).rev() {
        println!("{RULE}");
        let mut line = String::from("|");
        for file in 0..8 {
            let sq = 8 * rank + file;
            line.push_str(&format!(" {:5.2} |", 100.0 * square[sq] as f64 / (2.0 * total as f64)));
        }
        println!("{line}");
    }
    println!("{RULE}");
    println!();
}
