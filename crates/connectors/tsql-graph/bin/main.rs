use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use query_engine_metadata::metadata::Registry;
use query_engine_translation::translation::request::{QueryRequest, Variables};
use tsql_graph::state::State;
use tsql_graph_configuration as configuration;

/// Inspect what tsql-graph does with a configuration and a request.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write an empty configuration and its JSON schema into a directory.
    Initialize {
        #[arg(long, env = "TSQL_GRAPH_CONFIGURATION")]
        configuration: PathBuf,
    },
    /// Print the JSON schema of the configuration file.
    Schema,
    /// Print the SQL a request compiles to, with its parameters.
    Explain {
        #[arg(long, env = "TSQL_GRAPH_CONFIGURATION")]
        configuration: PathBuf,
        /// A JSON file holding the request.
        #[arg(long)]
        request: PathBuf,
        /// A JSON file holding variable bindings, replacing those of the request.
        #[arg(long)]
        variables: Option<PathBuf>,
    },
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}

async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Initialize { configuration } => {
            configuration::write_parsed_configuration(
                configuration::ParsedConfiguration::initial(),
                &configuration,
            )
            .await?;
        }
        Command::Schema => {
            let schema = schemars::schema_for!(configuration::ParsedConfiguration);
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
        Command::Explain {
            configuration,
            request,
            variables,
        } => {
            // Explaining needs the entities only, not a connection.
            let parsed = configuration::parse_configuration(&configuration).await?;
            let state = State {
                metrics: query_engine_execution::metrics::initialise_metrics(
                    &mut prometheus::Registry::new(),
                )?,
                registry: Registry::from_metadata(&parsed.metadata).into(),
            };

            let mut request: QueryRequest = read_json(&request)?;
            if let Some(variables) = variables {
                request.variables = read_json::<Variables>(&variables)?;
            }

            let response = tsql_graph::explain::explain(&state, &request)?;
            for (name, detail) in response.details {
                println!("-- {name}\n{detail}\n");
            }
        }
    }
    Ok(())
}

#[tokio::main]
pub async fn main() -> ExitCode {
    env_logger::init();

    match run(Cli::parse().command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{error:#}");
            ExitCode::FAILURE
        }
    }
}
