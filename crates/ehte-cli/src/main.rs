//! CLI for ehte: effective heterogeneity of treatment effect from a trial CSV.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ehte")]
#[command(about = "ehte: quantile-matched treatment-effect heterogeneity with permutation p-values")]
#[command(version = ehte_core::VERSION)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate sigma, eHTE and p-values for every active arm.
    /// Input is a CSV with columns TRT01P (arm label), TRT01PN (arm code), CHG (change).
    Analyze {
        /// Input CSV path
        input: String,

        /// JSON configuration file (fields not given keep their defaults)
        #[arg(long)]
        config: Option<String>,

        /// Number of simulated null replicates
        #[arg(long)]
        n_perms: Option<u32>,

        /// Index into the seed list used for simulation
        #[arg(long)]
        seed_index: Option<usize>,

        /// Comma-separated active arm codes to analyze (default: all non-placebo arms)
        #[arg(long)]
        arms: Option<String>,

        /// Keep every percentile in the rank-based policy instead of 3-97
        #[arg(long)]
        no_central_interval: bool,

        /// Write the full report as JSON
        #[arg(long)]
        output: Option<String>,

        /// Write the observed ITE rows as CSV
        #[arg(long)]
        ite_output: Option<String>,
    },

    /// Print SAS-style (PCTLDEF=5) percentiles of every arm.
    Percentiles {
        /// Input CSV path
        input: String,

        /// Percentile grid: full (0..100, 101 marks) or central48 (3..97, 48 marks)
        #[arg(long, default_value = "full", value_parser = ["full", "central48"])]
        grid: String,

        /// Write the percentile rows as CSV
        #[arg(long)]
        output: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    commands::init_logging(cli.verbose);

    match cli.command {
        Commands::Analyze {
            input,
            config,
            n_perms,
            seed_index,
            arms,
            no_central_interval,
            output,
            ite_output,
        } => commands::analyze::run(commands::analyze::AnalyzeCommandConfig {
            input_path: &input,
            config_path: config.as_deref(),
            n_perms,
            seed_index,
            arms: arms.as_deref(),
            central_interval: !no_central_interval,
            output_path: output.as_deref(),
            ite_output_path: ite_output.as_deref(),
        }),
        Commands::Percentiles {
            input,
            grid,
            output,
        } => commands::percentiles::run(commands::percentiles::PercentilesCommandConfig {
            input_path: &input,
            grid: &grid,
            output_path: output.as_deref(),
        }),
    }
}
