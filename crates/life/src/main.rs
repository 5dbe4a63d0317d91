use clap::{Parser, Subcommand};
use life_core::{Scenario, TrackerConfig};
use life_val::LifecycleFlags;
use log::info;
use miette::{MietteHandlerOpts, Report, Result};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Replay a lifecycle scenario and print its trace")]
    Run {
        path: PathBuf,
        /// JSON tracker configuration
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    #[command(about = "Register a scenario's types and print their lifecycle")]
    Check { path: PathBuf },
}

fn main() -> Result<ExitCode> {
    env_logger::init();
    miette::set_hook(Box::new(|_| {
        Box::new(MietteHandlerOpts::new().terminal_links(true).build())
    }))
    .ok();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { path, config, json } => {
            info!("running scenario {}", path.display());
            let report = life_core::run_file(&path, config.as_deref())?;
            if json {
                let out = serde_json::json!({
                    "trace": report.trace,
                    "events": report.events,
                    "leaked": report.leaked,
                    "failure": report.failure.as_ref().map(|f| serde_json::json!({
                        "step": f.step,
                        "error": f.error.to_string(),
                    })),
                });
                println!("{:#}", out);
            } else {
                for line in &report.trace {
                    println!("{}", line);
                }
                for event in &report.events {
                    println!("{}", event);
                }
                if report.leaked > 0 {
                    println!("leaked {} allocation(s)", report.leaked);
                }
            }
            if let Some(failure) = report.failure {
                eprintln!("step {} failed", failure.step);
                eprintln!("{:?}", Report::new(failure.error));
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Check { path } => {
            let scenario = Scenario::from_file(&path)?;
            let tracker = scenario.load(TrackerConfig::default())?;
            for info in tracker.registry().user_types() {
                println!("{}: {}", info.name(), describe(info.flags()));
                if let Err(reason) = &info.copy {
                    println!("  not copyable: {}", reason);
                }
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn describe(flags: LifecycleFlags) -> String {
    let mut caps = Vec::new();
    if flags.has_init {
        caps.push("init");
    }
    if flags.has_copy {
        caps.push("copy");
    }
    if flags.has_consuming_move {
        caps.push("consuming move");
    }
    if flags.has_taking_move {
        caps.push("taking move");
    }
    if flags.is_trivial {
        caps.push("trivial");
    }
    if caps.is_empty() {
        return "no lifecycle".to_string();
    }
    caps.join(", ")
}
