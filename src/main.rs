//! nfv - check sliced G-code against the printer before it prints
//!
//! Usage:
//!   nfv init
//!   nfv check <file.gcode>
//!   nfv api '{"command": "addNozzle", "size": 0.6}'
//!   nfv status
//!   nfv postprocess <spools.json> <file.gcode>

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, LevelFilter};
use nfv::config::Settings;
use nfv::host::console::{ConsoleAlerts, ConsolePrinter, SnapshotSpools, StaticProfile};
use nfv::host::Host;
use nfv::plugin::{Event, Plugin};
use nfv::post;
use nfv::store::Store;
use nfv::validator::Verdict;
use nfv::wait::{SpoolWait, WaitState};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

/// Validate nozzle, filament, build plate and spool before printing
#[derive(Parser, Debug)]
#[command(name = "nfv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    /// Settings file (JSON)
    #[arg(short, long, global = true, value_name = "CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the database, write default rows and sync extruders
    Init,

    /// Run the pre-print checks on a G-code file
    Check {
        #[arg(value_name = "GCODE")]
        gcode: PathBuf,
    },

    /// Run a settings command given as JSON, or @path to read it from a file
    Api {
        #[arg(value_name = "JSON")]
        json: String,
    },

    /// Print nozzles, build plates, extruders and spool settings
    Status,

    /// Write spool names from a spool map into a G-code file's filament notes
    Postprocess {
        #[arg(value_name = "SPOOL_MAP")]
        spools: PathBuf,

        #[arg(value_name = "GCODE")]
        gcode: PathBuf,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        LevelFilter::Debug
    } else if cli.verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;

    match cli.command {
        Commands::Init => cmd_init(&settings),
        Commands::Check { gcode } => cmd_check(&settings, &gcode),
        Commands::Api { json } => cmd_api(&settings, &json),
        Commands::Status => cmd_status(&settings),
        Commands::Postprocess { spools, gcode } => cmd_postprocess(&spools, &gcode),
    }
}

struct Console {
    plugin: Plugin,
    printer: Arc<ConsolePrinter>,
}

fn start(settings: &Settings) -> Result<Console> {
    let store = Store::open(&settings.data_folder).with_context(|| {
        format!("Failed to open database in {}", settings.data_folder.display())
    })?;

    let printer = Arc::new(ConsolePrinter::default());
    let host = Host {
        profile: Arc::new(StaticProfile(settings.printer.clone())),
        printer: printer.clone(),
        spools: Arc::new(SnapshotSpools {
            slots: settings.spools.clone(),
        }),
        alerts: Arc::new(ConsoleAlerts),
    };

    let plugin = Plugin::new(store, host, settings.seed(), settings.validator_options());
    plugin.on_event(Event::Startup);
    Ok(Console { plugin, printer })
}

fn cmd_init(settings: &Settings) -> Result<ExitCode> {
    let console = start(settings)?;
    println!("Database ready at {}", console.plugin.store().path().display());
    Ok(ExitCode::SUCCESS)
}

fn cmd_check(settings: &Settings, gcode: &Path) -> Result<ExitCode> {
    let verdict = run_check(settings, gcode, true)?;
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(ExitCode::from(exit_status(&verdict)))
}

fn run_check(settings: &Settings, gcode: &Path, interactive: bool) -> Result<Verdict> {
    let console = start(settings)?;
    if interactive {
        answer_from_stdin(console.plugin.wait_handle());
    }

    let verdict = console
        .plugin
        .on_event(Event::PrintStarted {
            path: gcode.to_path_buf(),
        })
        .context("Print start did not run a check")?;

    info!(
        "paused: {}, cancelled: {}",
        console.printer.was_paused(),
        console.printer.was_cancelled()
    );
    Ok(verdict)
}

fn exit_status(verdict: &Verdict) -> u8 {
    match verdict {
        Verdict::Passed | Verdict::Skipped => 0,
        Verdict::Paused(_) => 2,
        Verdict::Cancelled(_) => 3,
    }
}

/// Answer spool-switch prompts with `ok` or `cancel` typed on stdin
fn answer_from_stdin(wait: SpoolWait) {
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if wait.state() != WaitState::Waiting {
                continue;
            }
            match line.trim().to_ascii_lowercase().as_str() {
                "ok" => wait.set(WaitState::Ok),
                "cancel" => wait.set(WaitState::Cancel),
                _ => eprintln!("Type 'ok' or 'cancel'"),
            }
        }
    });
}

fn cmd_api(settings: &Settings, json: &str) -> Result<ExitCode> {
    let json = match json.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read command from {}", path))?,
        None => json.to_string(),
    };

    let console = start(settings)?;
    let response = console
        .plugin
        .on_api_json(&json)
        .context("Command failed")?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(ExitCode::SUCCESS)
}

fn cmd_status(settings: &Settings) -> Result<ExitCode> {
    let console = start(settings)?;
    let overview = console.plugin.on_api_get().context("Failed to read settings")?;
    println!("{}", serde_json::to_string_pretty(&overview)?);
    Ok(ExitCode::SUCCESS)
}

fn cmd_postprocess(spools: &Path, gcode: &Path) -> Result<ExitCode> {
    let changed = post::process_file(spools, gcode)
        .with_context(|| format!("Failed to post-process {}", gcode.display()))?;
    println!("{}: {} spool name(s) written", gcode.display(), changed);
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_check() {
        let cli = Cli::parse_from(["nfv", "-v", "check", "print.gcode", "-c", "nfv.json"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("nfv.json")));
        assert!(matches!(cli.command, Commands::Check { ref gcode } if gcode == Path::new("print.gcode")));
    }

    #[test]
    fn test_check_verdicts() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            data_folder: dir.path().join("data"),
            enable_spool_checking: false,
            printer: nfv::host::PrinterProfile {
                model: "MK4".into(),
                ..Default::default()
            },
            spools: Some(vec![Some(nfv::host::console::SpoolSnapshot {
                material: "PLA".into(),
                name: "Galaxy Black".into(),
            })]),
            ..Default::default()
        };

        let gcode = dir.path().join("print.gcode");
        std::fs::write(
            &gcode,
            "G28\n; filament used [mm] = 10\n; filament_type = PLA\n; nozzle_diameter = 0.4\n; printer_model = MK4\n",
        )
        .unwrap();
        let verdict = run_check(&settings, &gcode, false).unwrap();
        assert_eq!(verdict, Verdict::Passed);
        assert_eq!(exit_status(&verdict), 0);

        std::fs::write(&gcode, "; nozzle_diameter = 0.6\n; filament_type = PLA\n").unwrap();
        let verdict = run_check(&settings, &gcode, false).unwrap();
        assert!(matches!(verdict, Verdict::Cancelled(_)));
        assert_eq!(exit_status(&verdict), 3);
    }
}
