use std::{path::PathBuf, process};

use clap::Parser;

use data::{
    shuffle::shuffle_file,
    validate::{require_bit_extension, validate_file},
};

/// Validate a .bit training archive, optionally emitting a shuffled copy.
///
/// Every move is re-checked against the reconstructed position; the exit
/// code identifies the first failure found.
#[derive(Parser)]
#[command(name = "checkdata", version)]
struct Args {
    /// Write the games in shuffled order to <file>.shuffled.bit.
    #[arg(long)]
    shuffle: bool,

    /// Seed for the shuffle; wall clock when omitted.
    #[arg(long, requires = "shuffle")]
    seed: Option<u64>,

    /// Archive to check.
    file: PathBuf,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let outcome = if args.shuffle {
        shuffle_file(&args.file, args.seed).map(|out| println!("{}", out.display()))
    } else {
        require_bit_extension(&args.file).and_then(|()| validate_file(&args.file))
    };

    if let Err(e) = outcome {
        eprintln!("error: {e}");
        process::exit(e.exit_code());
    }
}
