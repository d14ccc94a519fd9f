//! pipeline-cosim entry point: CLI wiring, description generation, session runs.

mod cli;

use std::process;

use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use pipeline_cosim::config::RunConfig;
use pipeline_cosim::description::{ModelDescription, emit};
use pipeline_cosim::driver::{
    CoSimulationAbi, Fmi3Driver, ScriptedComponent, SharedLibrary, VariableTable,
};
use pipeline_cosim::error::{DriverError, Error};
use pipeline_cosim::io::export::export_csv;
use pipeline_cosim::network::{NetworkDescription, Topology};
use pipeline_cosim::session::{Session, SessionReport};

use cli::CliOptions;

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = match cli::parse_args() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("error: {e}");
            cli::print_usage();
            process::exit(2);
        }
    };

    let config = match cli.config {
        Some(ref path) => match RunConfig::from_toml_file(path) {
            Ok(cfg) => Some(cfg),
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        },
        None => None,
    };

    if let Some(ref cfg) = config {
        let errors = cfg.validate();
        if !errors.is_empty() {
            for e in &errors {
                eprintln!("{e}");
            }
            process::exit(1);
        }
    }

    let (description, topology) = match load_description(&cli, config.as_ref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    if let Some(ref path) = cli.out {
        if let Err(e) = description.write_to_file(path) {
            eprintln!("error: failed to write model description: {e}");
            process::exit(1);
        }
        eprintln!("Model description written to {}", path.display());
    } else if cli.network.is_some() && config.is_none() {
        match description.to_xml() {
            Ok(xml) => print!("{xml}"),
            Err(e) => {
                eprintln!("error: {e}");
                process::exit(1);
            }
        }
    }

    let Some(cfg) = config else {
        return;
    };

    let variables = VariableTable::from_description(&description);
    let errors = cfg.validate_injections(&variables);
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    let result = match cfg.component.backend.as_str() {
        "library" => {
            let model_identifier = &description.header.model_identifier;
            let Some(library_path) = cfg.component.resolve_library_path(model_identifier) else {
                eprintln!(
                    "error: component.library_path or component.fmu_root is required for the library backend"
                );
                process::exit(1);
            };
            SharedLibrary::load(&library_path)
                .and_then(|library| run_session(library, variables, &cfg))
        }
        _ => {
            let mut component = ScriptedComponent::from_description(&description)
                .with_transport_delay(cfg.component.transport_delay);
            if let Some(ref topology) = topology {
                component = component.with_pipe_delays(topology);
            }
            run_session(component, variables, &cfg)
        }
    };

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    for sample in &report.samples {
        println!("{sample}");
    }
    println!("\n{report}");

    if let Some(ref path) = cli.telemetry_out {
        if let Err(e) = export_csv(&report.samples, path) {
            eprintln!("error: failed to write CSV: {e}");
            process::exit(1);
        }
        eprintln!("Telemetry written to {}", path.display());
    }
}

/// Builds the description from `--network` or reads it from `--description`.
///
/// The topology is returned only when a network was analyzed.
fn load_description(
    cli: &CliOptions,
    config: Option<&RunConfig>,
) -> pipeline_cosim::Result<(ModelDescription, Option<Topology>)> {
    if let Some(ref path) = cli.description {
        let description = ModelDescription::from_xml_file(path)?;
        info!(
            path = %path.display(),
            variables = description.variables.len(),
            "model description loaded"
        );
        return Ok((description, None));
    }

    let Some(ref path) = cli.network else {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "no network or description given",
        )));
    };
    let network = NetworkDescription::from_json_file(path)?;
    let topology = network.to_topology()?;
    let header = config.map(|c| c.description.clone()).unwrap_or_default();
    let description = emit(&topology, &header);
    info!(
        network = %network.name,
        pipes = topology.pipes().len(),
        inputs = topology.inputs().count(),
        outputs = topology.outputs().count(),
        "model description generated"
    );
    Ok((description, Some(topology)))
}

fn run_session<B: CoSimulationAbi>(
    backend: B,
    variables: VariableTable,
    cfg: &RunConfig,
) -> Result<SessionReport, DriverError> {
    let mut driver =
        Fmi3Driver::new(backend, variables).with_status_policy(cfg.component.status_policy);
    info!(version = %driver.version(), "component loaded");
    let plan = cfg.session_plan();
    Session::run(&mut driver, &plan)
}
