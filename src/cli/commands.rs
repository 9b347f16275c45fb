//! Command dispatch: each subcommand wires settings, services and terminal output.

use std::io::{self, Write};
use std::path::Path;

use clap::CommandFactory;
use tracing::{debug, instrument};

use crate::cli::args::{Cli, Commands, ConfigCommands};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::config::{global_config_path, Overrides, Settings};
use crate::domain::{RateModel, TreeDisplay};
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::InfraError;

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    match &cli.command {
        Commands::Run {
            run_file,
            model,
            smoothing,
            stem,
        } => cmd_run(
            run_file,
            Overrides {
                model: *model,
                smoothing: *smoothing,
                stem: stem.clone(),
            },
        ),
        Commands::Check { run_file } => cmd_check(run_file),
        Commands::Config { command } => match command {
            ConfigCommands::Show { run_file } => cmd_config_show(run_file.as_deref()),
            ConfigCommands::Template => cmd_config_template(),
            ConfigCommands::Path => cmd_config_path(),
        },
        Commands::Completion { shell } => cmd_completion(*shell),
    }
}

#[instrument(skip(overrides))]
fn cmd_run(run_file: &Path, overrides: Overrides) -> CliResult<()> {
    if let Some(smoothing) = overrides.smoothing {
        if !smoothing.is_finite() || smoothing <= 0.0 {
            return Err(CliError::InvalidArgs(format!(
                "--smoothing must be positive, got {}",
                smoothing
            )));
        }
    }

    let mut settings = Settings::load(Some(run_file))?;
    settings.apply_overrides(&overrides);
    debug!("effective estimator {:?}", settings.estimator);

    let container = ServiceContainer::new(settings);
    let summary = container.pipeline().run(&container.settings)?;

    output::header("Calibrated nodes");
    for record in &summary.table {
        let age = summary
            .timetree
            .age(record.node)
            .map(|a| format!("{:.4}", a))
            .unwrap_or_else(|| "-".to_string());
        output::detail(&format!(
            "node {:>3}  {:<32} age {:>10}  [{}, {}] {}",
            record.node,
            record.anchor.to_string(),
            age,
            record.min_age,
            record.max_age,
            record.bound_kind()
        ));
    }
    if summary.timetree.report.model == RateModel::Relaxed {
        let (lo, hi) = summary
            .timetree
            .rates
            .values()
            .fold((f64::INFINITY, 0.0_f64), |(lo, hi), &r| (lo.min(r), hi.max(r)));
        output::detail(&format!("edge rates {:.4e} .. {:.4e}", lo, hi));
    }
    output::action("fit", &summary.timetree.report);
    output::action("newick", &summary.outputs.newick.display());
    output::action("nexus", &summary.outputs.nexus.display());
    output::action("plot", &summary.outputs.plot.display());
    output::success(&format!(
        "timetree with root age {:.4}",
        summary.timetree.root_age()
    ));
    Ok(())
}

#[instrument]
fn cmd_check(run_file: &Path) -> CliResult<()> {
    let settings = Settings::load(Some(run_file))?;
    let container = ServiceContainer::new(settings);
    let prepared = container.pipeline().prepare(&container.settings)?;

    output::header("Tree");
    output::info(&prepared.tree.to_tree_string());
    output::header("Calibrations");
    for row in prepared.table.describe() {
        output::detail(&row);
    }
    output::success(&format!(
        "{} tips, {} calibrations",
        prepared.tree.tip_count(),
        prepared.table.len()
    ));
    Ok(())
}

fn cmd_config_show(run_file: Option<&Path>) -> CliResult<()> {
    let settings = Settings::load(run_file)?;
    let text = settings.to_toml()?;
    write_stdout(&text)
}

fn cmd_config_template() -> CliResult<()> {
    write_stdout(&Settings::template())
}

fn cmd_config_path() -> CliResult<()> {
    match global_config_path() {
        Some(path) => {
            let state = if path.exists() { "exists" } else { "not found" };
            output::action("global", &format!("{} ({})", path.display(), state));
        }
        None => output::warning("no home directory, global config disabled"),
    }
    Ok(())
}

fn cmd_completion(shell: clap_complete::Shell) -> CliResult<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut io::stdout());
    Ok(())
}

fn write_stdout(text: &str) -> CliResult<()> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.flush())
        .map_err(|e| InfraError::io("print to stdout", e))?;
    Ok(())
}
