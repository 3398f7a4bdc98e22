//! CLI argument parsing

pub mod prompt;

use std::path::PathBuf;

use clap::Parser;
use serverbench_core::{ResourceClass, RuntimeOptions};

#[derive(Parser, Debug)]
#[command(name = "serverbench")]
#[command(author, version, about = "Benchmark containerized HTTP servers one at a time", long_about = None)]
pub struct Cli {
    /// Warmup requests per server (0 disables warmup)
    #[arg(long, value_name = "N")]
    pub warmup: Option<usize>,

    /// Resource classes to measure: cpu, io, mixed
    #[arg(long, value_name = "LIST", value_delimiter = ',', value_parser = parse_resource)]
    pub resources: Option<Vec<ResourceClass>>,

    /// Worker counts to measure
    #[arg(long, value_name = "LIST", value_delimiter = ',', value_parser = parse_capacity)]
    pub capacity: Option<Vec<usize>>,

    /// Servers to run, in order; empty runs all
    #[arg(long, value_name = "LIST", value_delimiter = ',', num_args = 0..=1)]
    pub servers: Option<Vec<String>>,

    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "PATH",
        env = "SERVERBENCH_CONFIG",
        default_value = "config/benchmark.yaml"
    )]
    pub config: PathBuf,

    /// Override the results root
    #[arg(long, value_name = "PATH")]
    pub results_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_resource(raw: &str) -> Result<ResourceClass, String> {
    raw.parse()
}

fn parse_capacity(raw: &str) -> Result<usize, String> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err("capacity must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("invalid capacity '{}': {}", raw, e)),
    }
}

impl Cli {
    /// Whether any run-option flag was given
    ///
    /// `--config` and `--verbose` do not count.
    pub fn has_run_options(&self) -> bool {
        !self.runtime_options().is_empty() || self.servers.is_some()
    }

    /// Options taken from flags
    pub fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            warmup: self.warmup,
            resources: self.resources.clone(),
            capacity: self.capacity.clone(),
            servers: self
                .servers
                .iter()
                .flatten()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            results_dir: self.results_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        let mut argv = vec!["serverbench"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv)
    }

    #[test]
    fn test_no_flags() {
        let cli = parse(&[]).unwrap();
        assert!(!cli.has_run_options());
        assert!(cli.runtime_options().is_empty());
    }

    #[test]
    fn test_config_and_verbose_are_not_run_options() {
        let cli = parse(&["--config", "bench.yaml", "-v"]).unwrap();
        assert!(!cli.has_run_options());
        assert_eq!(cli.config, PathBuf::from("bench.yaml"));
        assert!(cli.verbose);
    }

    #[test]
    fn test_lists_are_comma_separated() {
        let cli = parse(&[
            "--resources",
            "cpu,io",
            "--capacity",
            "1,8,64",
            "--servers",
            "chi,gin",
            "--warmup",
            "50",
        ])
        .unwrap();
        let options = cli.runtime_options();
        assert_eq!(
            options.resources,
            Some(vec![ResourceClass::Cpu, ResourceClass::Io])
        );
        assert_eq!(options.capacity, Some(vec![1, 8, 64]));
        assert_eq!(options.servers, vec!["chi", "gin"]);
        assert_eq!(options.warmup, Some(50));
        assert!(cli.has_run_options());
    }

    #[test]
    fn test_empty_servers_means_all_but_is_a_flag() {
        let cli = parse(&["--servers", ""]).unwrap();
        assert!(cli.runtime_options().servers.is_empty());
        assert!(cli.has_run_options());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(parse(&["--resources", "gpu"]).is_err());
        assert!(parse(&["--capacity", "0"]).is_err());
        assert!(parse(&["--capacity", "two"]).is_err());
        assert!(parse(&["--warmup", "-3"]).is_err());
        assert!(parse(&["--bogus"]).is_err());
    }

    #[test]
    fn test_default_config_file_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/benchmark.yaml");
        let cli = parse(&["--config", path]).unwrap();
        let catalogue = serverbench_core::load_config(&cli.config).unwrap();
        assert_eq!(catalogue.server_names(), vec!["chi", "gin", "fiber"]);
        let (plan, unknown) =
            serverbench_core::apply_runtime_options(&catalogue, &cli.runtime_options()).unwrap();
        assert!(unknown.is_empty());
        assert_eq!(plan.backends.len(), 4);
    }

    #[test]
    fn test_help_is_not_a_failure() {
        let err = parse(&["--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }
}
