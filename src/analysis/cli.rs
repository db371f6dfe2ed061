//! Standalone performance-analyzer binary: ingest a subject's session
//! directory and print a grouped summary or a criteria verdict.
//!
//! Mirrors the way the original analyzer was invoked as a script
//! against a data directory, rather than through the interactive
//! chamber-control GUI.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use operant_suite::analysis::{self, Criteria, FilterOp, PropCorrectClass, PropCorrectCriterion};

#[derive(Parser)]
#[command(name = "analyze", about = "Operant-chamber performance analyzer")]
struct Cli {
    /// Root directory containing `trialdata/` and `settings_files/`.
    datapath: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print per-day signal-detection summaries.
    Summary {
        #[arg(long, default_value = "Date")]
        group_by: String,
    },
    /// Evaluate pass/fail criteria against per-day summaries.
    Criteria {
        #[arg(long)]
        min_trials: Option<u64>,
        #[arg(long)]
        min_dprime: Option<f64>,
        #[arg(long)]
        min_prop_correct: Option<f64>,
        #[arg(long)]
        min_passing_days: Option<u64>,
        #[arg(long)]
        use_nr: bool,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let trials = analysis::ingest_directory(&cli.datapath)?;

    match cli.command {
        Command::Summary { group_by } => {
            let keys: Vec<&str> = group_by.split(',').collect();
            let groups = analysis::aggregate(&trials, &keys, &[] as &[FilterOp]);
            for g in groups {
                println!(
                    "{:?}: trials={} d'={:?} bias={:?} S+={:?} S-={:?} total={:?}",
                    g.key, g.trials, g.dprime, g.bias, g.s_plus_correct, g.s_minus_correct, g.total_correct
                );
            }
        }
        Command::Criteria {
            min_trials,
            min_dprime,
            min_prop_correct,
            min_passing_days,
            use_nr,
        } => {
            let groups = analysis::aggregate(&trials, &["Date"], &[] as &[FilterOp]);
            let criteria = Criteria {
                min_trials,
                min_dprime,
                min_prop_correct: min_prop_correct
                    .into_iter()
                    .map(|minimum| PropCorrectCriterion {
                        class: PropCorrectClass::Total,
                        minimum,
                    })
                    .collect(),
                min_passing_days,
                use_nr,
            };
            let report = analysis::check_criteria(&groups, &criteria);
            println!("passed={} passing_days={}", report.passed, report.passing_days);
            for reason in report.reasons {
                println!("  - {reason}");
            }
        }
    }

    Ok(())
}
