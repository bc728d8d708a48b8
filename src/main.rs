use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

use race_timer::clock::RaceStatus;
use race_timer::engine::{Command, CommandOutput, RaceEngine};
use race_timer::error::RaceError;
use race_timer::output;
use race_timer::race::HeatId;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_INVALID_STATE: i32 = 1;
const EXIT_STORAGE: i32 = 2;
const EXIT_REJECTED: i32 = 3;
const EXIT_CONFIG: i32 = 4;

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the heat (or resume an interrupted one) and record finishes from stdin
    Start,
    /// Stop a heat that was left running
    Stop,
    /// Load runners from a CSV file, replacing the heat's current list
    Import {
        /// CSV with bib, name and team columns (RFID optional)
        file: PathBuf,
    },
    /// Individual results (default if no subcommand)
    Results {
        /// Tab-separated output for scripting
        #[arg(long)]
        tsv: bool,
    },
    /// Team results
    Teams,
    /// Reassign the bib of a recorded finish
    Correct {
        /// Finish sequence number, as shown when it was recorded
        sequence: u64,
        /// Correct bib (0 marks the finish as unassigned again)
        bib: u32,
    },
    /// List runners grouped by team
    Runners,
    /// Switch to a new heat, carrying the runner list over
    NewHeat {
        /// Heat number for today; the next free one when omitted
        number: Option<u32>,
    },
}

#[derive(Parser, Debug)]
#[command(name = "race-timer")]
#[command(about = "Cross-country race timing and team scoring", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to config file (defaults to ~/.config/race-timer/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Heat to work on, as YYYYMMDD-NN (defaults to today's latest heat)
    #[arg(long, global = true)]
    heat: Option<String>,

    /// Print command results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

fn exit_code(err: &RaceError) -> i32 {
    match err {
        RaceError::InvalidState(_) => EXIT_INVALID_STATE,
        RaceError::Storage(_) => EXIT_STORAGE,
        RaceError::Validation(_)
        | RaceError::UnknownTag(_)
        | RaceError::CorrectionConflict { .. }
        | RaceError::NotFound(_) => EXIT_REJECTED,
    }
}

fn fail(err: RaceError) -> ! {
    eprintln!("Error: {}", err);
    std::process::exit(exit_code(&err));
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Results { tsv: false });
    race_timer::logging::init_logging(cli.verbose);

    // Load config
    let config_path = cli.config.map(PathBuf::from);
    let config = match race_timer::config::load_config(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {:#}", e);
            std::process::exit(EXIT_CONFIG);
        }
    };

    // Validate config at startup
    if let Err(errors) = race_timer::config::validate_config(&config) {
        eprintln!("Config errors:");
        for error in errors {
            eprintln!("  - {}", error);
        }
        std::process::exit(EXIT_CONFIG);
    }

    let heat = match cli.heat.as_deref().map(str::parse::<HeatId>).transpose() {
        Ok(heat) => heat,
        Err(e) => {
            eprintln!("Invalid --heat: {:#}", e);
            std::process::exit(EXIT_CONFIG);
        }
    };

    let opened = match command {
        Commands::Results { .. } | Commands::Teams | Commands::Runners => {
            RaceEngine::open_read_only(&config, heat).await
        }
        _ => RaceEngine::open(&config, heat).await,
    };
    let mut engine = match opened {
        Ok(engine) => engine,
        Err(e) => fail(e),
    };
    let use_colors = output::should_use_colors();

    let result = match command {
        Commands::Start => run_start(&mut engine, cli.json, use_colors).await,
        Commands::Stop => engine.execute(Command::Stop).await.map(|out| {
            print_output(&engine, &out, cli.json, use_colors);
        }),
        Commands::Import { file } => engine
            .execute(Command::ImportRunners(file))
            .await
            .map(|out| print_output(&engine, &out, cli.json, use_colors)),
        Commands::Results { tsv } => {
            if tsv {
                println!("{}", output::format_individual_tsv(&engine.individual_standings()));
                Ok(())
            } else {
                engine
                    .execute(Command::IndividualStandings)
                    .await
                    .map(|out| print_output(&engine, &out, cli.json, use_colors))
            }
        }
        Commands::Teams => engine
            .execute(Command::TeamStandings)
            .await
            .map(|out| print_output(&engine, &out, cli.json, use_colors)),
        Commands::Correct { sequence, bib } => engine
            .execute(Command::Correct { sequence, bib })
            .await
            .map(|out| print_output(&engine, &out, cli.json, use_colors)),
        Commands::Runners => engine
            .execute(Command::ListRunners)
            .await
            .map(|out| print_output(&engine, &out, cli.json, use_colors)),
        Commands::NewHeat { number } => engine
            .execute(Command::ChangeHeat(number))
            .await
            .map(|out| print_output(&engine, &out, cli.json, use_colors)),
    };

    engine.shutdown().await;
    if let Err(e) = result {
        fail(e);
    }
    std::process::exit(EXIT_SUCCESS);
}

/// Errors that leave nothing to record into. Anything else rejects only the
/// token that caused it.
fn ends_entry(err: &RaceError) -> bool {
    matches!(err, RaceError::InvalidState(_))
}

/// Interactive finish entry: one token per line until the stop token,
/// end of input or Ctrl-C. Only the stop token ends the race.
async fn run_start(engine: &mut RaceEngine, json: bool, use_colors: bool) -> Result<(), RaceError> {
    match engine.status() {
        RaceStatus::Running => eprintln!("Resuming heat {}", engine.heat()),
        _ => {
            let out = engine.execute(Command::StartRace).await?;
            print_output(engine, &out, json, use_colors);
        }
    }
    eprintln!(
        "Type a bib and press Enter as each runner finishes. Empty line for an unknown runner, '{}' to stop.",
        engine.stop_token()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(token) = line? else {
                    break;
                };
                match engine.execute(Command::Record(token)).await {
                    Ok(out @ CommandOutput::Stopped { .. }) => {
                        print_output(engine, &out, json, use_colors);
                        return Ok(());
                    }
                    Ok(out) => print_output(engine, &out, json, use_colors),
                    Err(e) if ends_entry(&e) => return Err(e),
                    Err(e) => eprintln!("{}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    eprintln!(
        "Heat {} is still running. Run `race-timer start` to resume entry or `race-timer stop` to finish.",
        engine.heat()
    );
    Ok(())
}

fn print_output(engine: &RaceEngine, out: &CommandOutput, json: bool, use_colors: bool) {
    if json {
        match serde_json::to_string_pretty(out) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to serialize output: {}", e),
        }
        return;
    }

    match out {
        CommandOutput::Started { heat, rfid } => {
            if *rfid {
                eprintln!("Heat {} started, RFID scan log watched", heat);
            } else {
                eprintln!("Heat {} started", heat);
            }
        }
        CommandOutput::Recorded { record } => {
            println!("{}", output::format_finish(record, engine.registry(), use_colors));
        }
        CommandOutput::Stopped {
            heat,
            finishes,
            rfid,
        } => {
            println!("Heat {} stopped with {} finishes", heat, finishes);
            if let Some(summary) = rfid {
                println!(
                    "  RFID: {} recorded, {} repeat reads, {} unknown tags",
                    summary.recorded, summary.repeats, summary.unknown
                );
            }
        }
        CommandOutput::Individual { standings } => {
            println!("{}", output::format_individual_table(standings, use_colors));
        }
        CommandOutput::Teams { standings } => {
            println!("{}", output::format_team_results(standings, use_colors));
        }
        CommandOutput::HeatChanged {
            heat,
            runners,
            finishes,
        } => {
            println!(
                "Now on heat {} ({} runners, {} finishes)",
                heat, runners, finishes
            );
        }
        CommandOutput::Corrected {
            sequence,
            previous_bib,
            bib,
        } => {
            println!("Finish #{}: bib {} -> {}", sequence, previous_bib, bib);
        }
        CommandOutput::Imported { loaded, skipped } => {
            println!("Imported {} runners", loaded);
            if !skipped.is_empty() {
                println!("Skipped {} rows:", skipped.len());
                for reason in skipped {
                    println!("  - {}", reason);
                }
            }
        }
        CommandOutput::Runners { .. } => {
            println!("{}", output::format_runner_list(engine.registry(), use_colors));
        }
    }
}
