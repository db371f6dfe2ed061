//! Host process entry point: either the supervisor CLI (`operant`
//! with no further argv beyond flags/subcommands) or, when invoked
//! with `-P`, a single chamber worker that runs one shaping session
//! to completion and exits. The supervisor spawns workers as
//! separate processes of this same binary, one per chamber.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{error, info};
use operant_suite::config::{ExperimentConfig, HostSettings};
use operant_suite::engine::build_shaper;
use operant_suite::engine::session::SessionCtx;
use operant_suite::hardware::HardwareLink;
use operant_suite::logger::TrialLogger;
use operant_suite::panel::Panel;
use operant_suite::supervisor::Supervisor;

const TRIAL_SENSOR_CHANNEL: u8 = 1;
const RESPONSE_SENSOR_CHANNEL: u8 = 2;

#[derive(Parser)]
#[command(name = "operant", about = "Multi-chamber behavioral-conditioning host")]
struct Cli {
    /// Raise logging verbosity to debug.
    #[arg(short, long)]
    debug: bool,

    #[arg(long, default_value = "settings.json")]
    settings: PathBuf,

    /// Binary the supervisor spawns for each chamber worker.
    /// Defaults to this same executable, invoked with `-P`.
    #[arg(long)]
    worker_binary: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,

    /// Worker mode: this chamber's index. Presence of this flag
    /// switches the process into single-session worker mode,
    /// bypassing the supervisor entirely.
    #[arg(short = 'P', long, hide = true)]
    chamber: Option<usize>,

    #[arg(short = 'S', long, hide = true)]
    subject: Option<String>,

    /// Positional paradigm name, present only in worker mode:
    /// `operant -P <chamber> -S <subject> <paradigm> -c <config>`.
    #[arg(hide = true)]
    paradigm: Option<String>,

    #[arg(short = 'c', long, hide = true)]
    config: Option<PathBuf>,

    #[arg(long, hide = true, default_value = "/dev/ttyChamber0")]
    device: PathBuf,

    #[arg(long, hide = true, default_value = "data")]
    data_root: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Run the supervisor loop, starting any chambers marked active.
    Start,
    /// Print the settings roster and each chamber's last known state.
    Status,
    /// Manually pulse a chamber's solenoid.
    Prime {
        #[arg(long)]
        chamber: usize,
        #[arg(long, default_value_t = 2)]
        duration_secs: u64,
    },
    /// Manually hold a chamber's solenoid open until interrupted.
    Open {
        #[arg(long)]
        chamber: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Some(chamber) = cli.chamber {
        return run_worker(chamber, &cli);
    }

    match cli.command.as_ref().unwrap_or(&Command::Start) {
        Command::Start => run_supervisor(&cli),
        Command::Status => print_status(&cli),
        Command::Prime { chamber, duration_secs } => {
            manual_solenoid(&cli, *chamber, Some(Duration::from_secs(*duration_secs)))
        }
        Command::Open { chamber } => manual_solenoid(&cli, *chamber, None),
    }
}

fn run_supervisor(cli: &Cli) -> anyhow::Result<()> {
    let worker_binary = match &cli.worker_binary {
        Some(path) => path.clone(),
        None => std::env::current_exe()?,
    };
    let mut supervisor = Supervisor::new(cli.settings.clone(), worker_binary)?;
    supervisor.run()?;
    Ok(())
}

fn print_status(cli: &Cli) -> anyhow::Result<()> {
    let settings = HostSettings::load(&cli.settings)?;
    println!("shutdown_proper={}", settings.shutdown_proper);
    for entry in &settings.chambers {
        println!(
            "chamber {}: subject={} active={} config={}",
            entry.index,
            entry.subject,
            entry.active,
            entry.param_file.display()
        );
    }
    Ok(())
}

/// Open a chamber's panel directly, outside the supervisor, for
/// manual solenoid control (`prime`/`open`). `hold` of `None` keeps
/// the solenoid open for up to an hour, intended to be interrupted.
fn manual_solenoid(cli: &Cli, chamber: usize, hold: Option<Duration>) -> anyhow::Result<()> {
    let settings = HostSettings::load(&cli.settings)?;
    let entry = settings
        .chambers
        .iter()
        .find(|e| e.index == chamber)
        .ok_or_else(|| anyhow::anyhow!("no such chamber: {chamber}"))?;
    let device = cli.device.to_string_lossy().replace('0', &chamber.to_string());
    let link = HardwareLink::open(&device)?;
    let mut panel = Panel::new(link, TRIAL_SENSOR_CHANNEL, RESPONSE_SENSOR_CHANNEL)?;

    match hold {
        Some(duration) => {
            info!("priming chamber {} ({}) for {:?}", chamber, entry.subject, duration);
            panel.reward(duration)?;
        }
        None => {
            info!("opening chamber {} solenoid until interrupted", chamber);
            panel.reward(Duration::from_secs(3600))?;
        }
    }
    Ok(())
}

/// Run a single chamber's shaping session to completion and exit.
/// Spawned by the supervisor as `operant -P <chamber> -S <subject>
/// <paradigm> -c <config>`.
fn run_worker(chamber: usize, cli: &Cli) -> anyhow::Result<()> {
    let subject = cli
        .subject
        .clone()
        .ok_or_else(|| anyhow::anyhow!("worker mode requires -S/--subject"))?;
    let paradigm = cli
        .paradigm
        .clone()
        .ok_or_else(|| anyhow::anyhow!("worker mode requires a paradigm argument"))?;
    let config_path = cli
        .config
        .clone()
        .ok_or_else(|| anyhow::anyhow!("worker mode requires -c/--config"))?;

    let config = ExperimentConfig::load(&config_path)?;
    let device = cli.device.to_string_lossy().replace('0', &chamber.to_string());
    let link = HardwareLink::open(&device)?;
    let panel = Panel::new(link, TRIAL_SENSOR_CHANNEL, RESPONSE_SENSOR_CHANNEL)?;

    let session_dir = cli.data_root.join(&subject);
    let logger = TrialLogger::new(&session_dir, &subject, chrono::Local::now(), &config)?;

    let stimulus_dir = config.stimulus_dir.clone();
    let stimulus: operant_suite::engine::session::StimulusProvider = Box::new(move |class| {
        stimulus_dir
            .as_ref()
            .map(|dir| dir.join(format!("{class}.wav")))
    });

    let mut ctx = SessionCtx::new(chamber, panel, config, logger, stimulus);
    let mut machine = build_shaper(&paradigm, &ctx.config)?;

    info!("chamber {chamber}: starting {paradigm} session for {subject}");
    if let Err(e) = machine.run(&mut ctx) {
        error!("chamber {chamber}: session aborted: {e}");
        let _ = ctx.logger.log_error(&e.to_string());
        return Err(e.into());
    }
    info!("chamber {chamber}: session complete");
    Ok(())
}
