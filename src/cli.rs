use clap::{Arg, ArgAction, ArgMatches, Command};
use anyhow::{anyhow, Result};

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub input_file: String,
    pub output_file: Option<String>,
    pub analysis_type: AnalysisType,
    pub output_format: OutputFormat,
    pub verbose_level: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisType {
    /// Input is a steady-state table, solved once.
    SteadyState,
    /// Input is a component list, simulated over `[0, tstop)`.
    Transient { tstep: f64, tstop: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
}

/// Command line definition of the `elecsim` binary
pub fn build_command() -> Command {
    Command::new("elecsim")
        .version(crate::VERSION)
        .about(crate::DESCRIPTION)
        .arg(
            Arg::new("input")
                .help("Input JSON file: component list (--tran) or steady-state table")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Output file for simulation results"),
        )
        .arg(
            Arg::new("tran")
                .long("tran")
                .value_names(["TSTEP", "TSTOP"])
                .num_args(2)
                .help("Transient analysis: time step and stop time"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase verbosity level"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .default_value("csv")
                .value_parser(["csv", "json"])
                .help("Output format"),
        )
}

impl CliArgs {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let input_file = matches
            .get_one::<String>("input")
            .ok_or_else(|| anyhow!("Input file is required"))?
            .clone();

        let output_file = matches.get_one::<String>("output").cloned();

        let verbose_level = matches.get_count("verbose");

        let output_format = match matches.get_one::<String>("format").map(String::as_str) {
            Some("csv") | None => OutputFormat::Csv,
            Some("json") => OutputFormat::Json,
            Some(other) => return Err(anyhow!("Invalid output format '{}'", other)),
        };

        let analysis_type = if let Some(tran_values) = matches.get_many::<String>("tran") {
            let values: Vec<&String> = tran_values.collect();
            if values.len() != 2 {
                return Err(anyhow!("Transient analysis requires exactly 2 parameters: tstep and tstop"));
            }

            let tstep = parse_time_value(values[0])?;
            let tstop = parse_time_value(values[1])?;

            if tstep <= 0.0 || tstop <= 0.0 || tstep > tstop {
                return Err(anyhow!("Invalid time parameters: tstep must be positive and at most tstop"));
            }

            AnalysisType::Transient { tstep, tstop }
        } else {
            AnalysisType::SteadyState
        };

        Ok(CliArgs {
            input_file,
            output_file,
            analysis_type,
            output_format,
            verbose_level,
        })
    }

    /// `log` filter matching the number of `-v` flags
    pub fn log_filter(&self) -> &'static str {
        match self.verbose_level {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

/// Parse time value with unit (e.g., "1ns", "1.5ms", "10us")
fn parse_time_value(value: &str) -> Result<f64> {
    let value = value.trim().to_lowercase();

    if let Some(num_str) = value.strip_suffix("fs") {
        Ok(num_str.parse::<f64>()? * 1e-15)
    } else if let Some(num_str) = value.strip_suffix("ps") {
        Ok(num_str.parse::<f64>()? * 1e-12)
    } else if let Some(num_str) = value.strip_suffix("ns") {
        Ok(num_str.parse::<f64>()? * 1e-9)
    } else if let Some(num_str) = value.strip_suffix("us") {
        Ok(num_str.parse::<f64>()? * 1e-6)
    } else if let Some(num_str) = value.strip_suffix("ms") {
        Ok(num_str.parse::<f64>()? * 1e-3)
    } else if let Some(num_str) = value.strip_suffix("s") {
        Ok(num_str.parse::<f64>()?)
    } else {
        // Assume seconds if no unit specified
        Ok(value.parse::<f64>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs> {
        let matches = build_command().try_get_matches_from(args)?;
        CliArgs::from_matches(&matches)
    }

    #[test]
    fn test_parse_time_value() {
        assert_eq!(parse_time_value("1ns").unwrap(), 1e-9);
        assert_eq!(parse_time_value("1.5us").unwrap(), 1.5e-6);
        assert_eq!(parse_time_value("10ms").unwrap(), 10e-3);
        assert_eq!(parse_time_value("1").unwrap(), 1.0);
        assert!(parse_time_value("fast").is_err());
    }

    #[test]
    fn test_transient_arguments() {
        let args = parse(&["elecsim", "rc.json", "--tran", "10ms", "100ms", "-f", "json", "-vv"]).unwrap();
        assert_eq!(args.input_file, "rc.json");
        match args.analysis_type {
            AnalysisType::Transient { tstep, tstop } => {
                assert!((tstep - 0.01).abs() < 1e-15);
                assert!((tstop - 0.1).abs() < 1e-15);
            }
            other => panic!("unexpected analysis {:?}", other),
        }
        assert_eq!(args.output_format, OutputFormat::Json);
        assert_eq!(args.log_filter(), "debug");
    }

    #[test]
    fn test_steady_state_is_default() {
        let args = parse(&["elecsim", "table.json", "-o", "out.csv"]).unwrap();
        assert_eq!(args.analysis_type, AnalysisType::SteadyState);
        assert_eq!(args.output_file.as_deref(), Some("out.csv"));
        assert_eq!(args.output_format, OutputFormat::Csv);
        assert_eq!(args.log_filter(), "warn");
    }

    #[test]
    fn test_rejects_inverted_time_window() {
        assert!(parse(&["elecsim", "rc.json", "--tran", "1s", "1ms"]).is_err());
        assert!(parse(&["elecsim", "rc.json", "--tran", "0", "1ms"]).is_err());
    }

    #[test]
    fn test_single_sample_window_accepted() {
        let args = parse(&["elecsim", "rc.json", "--tran", "1ms", "1ms"]).unwrap();
        assert_eq!(args.analysis_type, AnalysisType::Transient { tstep: 1e-3, tstop: 1e-3 });
    }
}
