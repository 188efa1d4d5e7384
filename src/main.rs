//! rummikub-hint - suggest the best play for a Rummikub turn
//!
//! Usage: rummikub-hint --table "r1 r2 r4" --rack "r3 ?" [--first-turn]

use clap::Parser;
use rummikub_hint::{hint_with_options, BoardState, HintOptions, OpeningRule, Strategy};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "rummikub-hint")]
#[command(about = "Find the rack tiles that can be played and how to lay out the table")]
#[command(version)]
struct Args {
    /// Tiles on the table, e.g. "r1 r2 r4 b7 g7 z7"
    #[arg(long, default_value = "")]
    table: String,

    /// Tiles on the rack; "?" is a joker
    #[arg(long, default_value = "")]
    rack: String,

    /// The player has not opened yet
    #[arg(long)]
    first_turn: bool,

    /// Maximize points played instead of tiles
    #[arg(long)]
    points: bool,

    /// Only check the opening score after solving
    #[arg(long)]
    filter_opening: bool,

    /// Time budget for the solver in milliseconds
    #[arg(long, default_value_t = 5_000)]
    max_ms: u64,

    /// Log model and solver details
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

impl Args {
    fn options(&self) -> HintOptions {
        HintOptions {
            strategy: if self.points {
                Strategy::MaximizePoints
            } else {
                Strategy::MaximizeTiles
            },
            opening_rule: if self.filter_opening {
                OpeningRule::Filter
            } else {
                OpeningRule::Constrain
            },
            max_ms: self.max_ms,
            ..HintOptions::default()
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    if let Err(e) = simple_logger::SimpleLogger::new().with_level(level).init() {
        eprintln!("Could not set up logging: {}", e);
    }

    let state = match BoardState::from_strings(&args.table, &args.rack, args.first_turn) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let report = hint_with_options(&state, &args.options());
    let hint = report.hint;
    if !hint.has_play() {
        println!("You have to draw a tile.");
        return ExitCode::SUCCESS;
    }

    let playable: Vec<String> = hint.playable.iter().map(|t| t.to_string()).collect();
    println!("You can play: {}", playable.join(" "));
    println!("Lay out the table as:");
    for (i, meld) in hint.sequences.iter().enumerate() {
        println!("{:>3}. {}", i + 1, meld);
    }

    ExitCode::SUCCESS
}
