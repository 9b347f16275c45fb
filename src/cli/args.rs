//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};

use crate::domain::RateModel;

/// Calibrate a molecular phylogram into a timetree with fossil age constraints
#[derive(Parser, Debug)]
#[command(name = "timetree")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Estimate divergence times, export and plot the timetree
    Run {
        /// Run file (TOML)
        #[arg(value_hint = ValueHint::FilePath)]
        run_file: PathBuf,

        /// Rate model, overrides [estimator] model
        #[arg(long, value_parser = parse_model)]
        model: Option<RateModel>,

        /// Rate smoothing (lambda), overrides [estimator] smoothing
        #[arg(long)]
        smoothing: Option<f64>,

        /// Output path prefix, overrides [output] stem
        #[arg(long, value_hint = ValueHint::FilePath)]
        stem: Option<PathBuf>,
    },

    /// Load and root the tree, resolve calibrations, print the table
    Check {
        /// Run file (TOML)
        #[arg(value_hint = ValueHint::FilePath)]
        run_file: PathBuf,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show {
        /// Run file to merge on top of the global config
        #[arg(value_hint = ValueHint::FilePath)]
        run_file: Option<PathBuf>,
    },

    /// Print a run file template
    Template,

    /// Show config paths
    Path,
}

fn parse_model(s: &str) -> Result<RateModel, String> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn given_run_flags_when_parsing_then_overrides_are_captured() {
        let cli = Cli::parse_from([
            "timetree", "-vv", "run", "run.toml", "--model", "strict", "--smoothing", "10",
        ]);

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Run {
                run_file,
                model,
                smoothing,
                stem,
            } => {
                assert_eq!(run_file, PathBuf::from("run.toml"));
                assert_eq!(model, Some(RateModel::Strict));
                assert_eq!(smoothing, Some(10.0));
                assert_eq!(stem, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn given_unknown_model_when_parsing_then_rejected() {
        let result = Cli::try_parse_from(["timetree", "run", "run.toml", "--model", "bayes"]);

        assert!(result.is_err());
    }
}
