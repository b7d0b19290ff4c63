use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::Context;
use colored::*;
use log::{error, info};

use elecsim::cli::{build_command, AnalysisType, CliArgs};
use elecsim::output;
use elecsim::{Component, Netlist, Simulator, SteadyStateRow, SteadyStateSolver};

fn main() {
    let matches = build_command().get_matches();

    let args = match CliArgs::from_matches(&matches) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", format!("Error: {}", e).red());
            std::process::exit(2);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_filter())).init();

    if let Err(e) = run_application(&args) {
        error!("{}", format!("Error: {:#}", e).red());
        std::process::exit(1);
    }
}

fn run_application(args: &CliArgs) -> anyhow::Result<()> {
    info!("{}", "Starting elecsim".green().bold());
    info!("Input file: {}", args.input_file.bright_blue());

    let input = Path::new(&args.input_file);
    if !input.exists() {
        return Err(anyhow::anyhow!("Input file '{}' not found", args.input_file));
    }
    let reader = BufReader::new(File::open(input)?);

    match args.analysis_type {
        AnalysisType::Transient { tstep, tstop } => {
            let components: Vec<Component> = serde_json::from_reader(reader)
                .with_context(|| format!("'{}' is not a JSON component list", args.input_file))?;
            let netlist = Netlist::new(components)?;

            info!("Running transient analysis: tstep={}, tstop={}", tstep, tstop);
            let result = Simulator::new().run_transient(&netlist, tstop, tstep)?;

            match &args.output_file {
                Some(file) => {
                    output::export_transient(&result, Path::new(file), args.output_format)?;
                    info!("Results exported to: {}", file.bright_green());
                }
                None => output::print_transient_summary(&result),
            }
        }
        AnalysisType::SteadyState => {
            let rows: Vec<SteadyStateRow> = serde_json::from_reader(reader)
                .with_context(|| format!("'{}' is not a JSON steady-state table", args.input_file))?;

            info!("Running steady-state analysis");
            let solution = SteadyStateSolver::new().solve(&rows)?;

            match &args.output_file {
                Some(file) => {
                    output::export_steady_state(&solution, Path::new(file), args.output_format)?;
                    info!("Results exported to: {}", file.bright_green());
                }
                None => output::print_steady_state_summary(&solution),
            }
        }
    }

    info!("{}", "Simulation completed successfully!".green().bold());
    Ok(())
}
