use std::env;
use std::path::PathBuf;

pub struct CliOptions {
    /// Pipe network JSON to analyze.
    pub network: Option<PathBuf>,
    /// Existing model description XML to drive instead of a network.
    pub description: Option<PathBuf>,
    /// Where to write the generated model description.
    pub out: Option<PathBuf>,
    /// Run configuration; a session is run only when present.
    pub config: Option<PathBuf>,
    pub telemetry_out: Option<PathBuf>,
}

pub fn parse_args() -> Result<CliOptions, String> {
    let args: Vec<String> = env::args().skip(1).collect();
    parse_args_from(args)
}

fn parse_args_from(args: Vec<String>) -> Result<CliOptions, String> {
    if args.is_empty() || (args.len() == 1 && (args[0] == "--help" || args[0] == "-h")) {
        print_usage();
        std::process::exit(if args.is_empty() { 2 } else { 0 });
    }
    parse_options(&args)
}

fn parse_options(args: &[String]) -> Result<CliOptions, String> {
    let mut i = 0usize;
    let mut network = None;
    let mut description = None;
    let mut out = None;
    let mut config = None;
    let mut telemetry_out = None;

    while i < args.len() {
        match args[i].as_str() {
            "--network" => {
                i += 1;
                let path = args.next_or_err(
                    i,
                    "missing value for --network (expected a JSON file path)",
                )?;
                if network.replace(PathBuf::from(path)).is_some() {
                    return Err("--network provided more than once".to_string());
                }
            }
            "--description" => {
                i += 1;
                let path = args.next_or_err(
                    i,
                    "missing value for --description (expected an XML file path)",
                )?;
                if description.replace(PathBuf::from(path)).is_some() {
                    return Err("--description provided more than once".to_string());
                }
            }
            "--out" => {
                i += 1;
                let path =
                    args.next_or_err(i, "missing value for --out (expected an XML file path)")?;
                if out.replace(PathBuf::from(path)).is_some() {
                    return Err("--out provided more than once".to_string());
                }
            }
            "--config" => {
                i += 1;
                let path = args.next_or_err(
                    i,
                    "missing value for --config (expected a TOML file path)",
                )?;
                if config.replace(PathBuf::from(path)).is_some() {
                    return Err("--config provided more than once".to_string());
                }
            }
            "--telemetry-out" => {
                i += 1;
                let path = args.next_or_err(
                    i,
                    "missing value for --telemetry-out (expected a file path)",
                )?;
                if telemetry_out.replace(PathBuf::from(path)).is_some() {
                    return Err("--telemetry-out provided more than once".to_string());
                }
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }

    match (&network, &description) {
        (Some(_), Some(_)) => {
            return Err(
                "arguments `--network` and `--description` are mutually exclusive; choose one source"
                    .to_string(),
            );
        }
        (None, None) => {
            return Err("one of `--network` or `--description` is required".to_string());
        }
        _ => {}
    }

    if description.is_some() && out.is_some() {
        return Err("`--out` only applies to descriptions generated from `--network`".to_string());
    }

    if telemetry_out.is_some() && config.is_none() {
        return Err("`--telemetry-out` requires `--config` to run a session".to_string());
    }

    Ok(CliOptions {
        network,
        description,
        out,
        config,
        telemetry_out,
    })
}

trait SliceArgExt {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String>;
}

impl SliceArgExt for [String] {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String> {
        self.get(index)
            .map(String::as_str)
            .ok_or_else(|| err.to_string())
    }
}

pub fn print_usage() {
    eprintln!("pipeline-cosim: pipe network analysis and co-simulation driver");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  pipeline-cosim --network <json> [--out <xml>] [--config <toml>] [--telemetry-out <csv>]");
    eprintln!("  pipeline-cosim --description <xml> --config <toml> [--telemetry-out <csv>]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --network <path>         Pipe network declaration (JSON)");
    eprintln!("  --description <path>     Existing model description (XML)");
    eprintln!("  --out <path>             Write the generated model description here");
    eprintln!("  --config <path>          Run configuration (TOML); runs a session");
    eprintln!("  --telemetry-out <path>   Export session samples to CSV");
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("Without --out or --config the generated description is printed to stdout.");
}
