mod error;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uf_core::{DEFAULT_BAD_VALUE, Diagnostics};
use uf_ident::{GainSchedIdentConfig, GainSchedIdentifier, IdentifierConfig, UnitDataSet, UnitIdentifier};
use uf_models::{ModelDef, ModelSpec, SimulatableModel};

use crate::error::{CliError, CliResult};

#[derive(Parser)]
#[command(name = "uf-cli")]
#[command(about = "Unitflow CLI - process model simulation and identification", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results
    #[arg(long, value_enum, global = true, default_value_t = Format::Yaml)]
    format: Format,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that every model in a scenario file can be simulated
    Validate {
        /// Path to the scenario YAML file
        scenario_path: PathBuf,
    },
    /// Simulate a step on one input of a model
    Step {
        /// Path to the scenario YAML file
        scenario_path: PathBuf,
        /// Model ID to simulate
        model_id: String,
        /// Time step in seconds
        #[arg(long, default_value_t = 1.0)]
        dt: f64,
        /// Number of samples
        #[arg(long, default_value_t = 100)]
        steps: usize,
        /// Input receiving the step
        #[arg(long, default_value_t = 0)]
        input_index: usize,
        /// Size of the step
        #[arg(long, default_value_t = 1.0)]
        step_size: f64,
        /// Sample at which the step occurs
        #[arg(long, default_value_t = 1)]
        step_at: usize,
        /// Initial input values (comma separated, defaults to zeros)
        #[arg(long, value_delimiter = ',')]
        baseline: Vec<f64>,
    },
    /// Identify a unit model from a dataset
    Identify {
        /// Path to the dataset YAML file
        data_path: PathBuf,
        /// Identifier configuration YAML file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the maximum delay searched, in samples
        #[arg(long)]
        max_delay: Option<usize>,
        /// Fit a static model
        #[arg(long = "static")]
        static_only: bool,
        /// ID given to the identified model
        #[arg(long, default_value = "identified")]
        id: String,
    },
    /// Identify a gain-scheduled model from a dataset
    IdentifySched {
        /// Path to the dataset YAML file
        data_path: PathBuf,
        /// Gain-scheduled identifier configuration YAML file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the gain thresholds
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        thresholds: Option<Vec<f64>>,
        /// Override the scheduling input index
        #[arg(long)]
        sched_input: Option<usize>,
        /// ID given to the identified model
        #[arg(long, default_value = "identified")]
        id: String,
    },
}

/// Models simulated side by side.
#[derive(Debug, Deserialize)]
struct Scenario {
    models: Vec<ModelDef>,
}

#[derive(Debug, Serialize)]
struct StepResponse {
    model_id: String,
    dt_s: f64,
    time_s: Vec<f64>,
    input: Vec<f64>,
    output: Vec<f64>,
    diagnostics: Vec<String>,
}

fn main() -> CliResult<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { scenario_path } => cmd_validate(&scenario_path),
        Commands::Step {
            scenario_path,
            model_id,
            dt,
            steps,
            input_index,
            step_size,
            step_at,
            baseline,
        } => cmd_step(
            &scenario_path,
            &model_id,
            StepOptions {
                dt,
                steps,
                input_index,
                step_size,
                step_at,
                baseline,
            },
            cli.format,
        ),
        Commands::Identify {
            data_path,
            config,
            max_delay,
            static_only,
            id,
        } => cmd_identify(
            &data_path,
            config.as_deref(),
            max_delay,
            static_only,
            &id,
            cli.format,
        ),
        Commands::IdentifySched {
            data_path,
            config,
            thresholds,
            sched_input,
            id,
        } => cmd_identify_sched(
            &data_path,
            config.as_deref(),
            thresholds,
            sched_input,
            &id,
            cli.format,
        ),
    }
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> CliResult<T> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| CliError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn emit<T: Serialize>(value: &T, format: Format) -> CliResult<()> {
    let text = match format {
        Format::Yaml => serde_yaml::to_string(value)?,
        Format::Json => serde_json::to_string_pretty(value)?,
    };
    println!("{text}");
    Ok(())
}

fn cmd_validate(scenario_path: &Path) -> CliResult<()> {
    println!("Validating scenario: {}", scenario_path.display());
    let scenario: Scenario = read_yaml(scenario_path)?;

    let mut invalid = 0;
    for def in &scenario.models {
        let model = def.build();
        let (ok, reason) = model.is_simulatable();
        if ok {
            println!("  ✓ {} ({}, {} inputs)", def.id, model.kind(), model.input_arity());
        } else {
            println!("  ✗ {} ({}): {}", def.id, model.kind(), reason);
            invalid += 1;
        }
    }

    if invalid > 0 {
        return Err(CliError::Usage(format!(
            "{invalid} of {} models cannot be simulated",
            scenario.models.len()
        )));
    }
    println!("✓ Scenario is valid");
    Ok(())
}

struct StepOptions {
    dt: f64,
    steps: usize,
    input_index: usize,
    step_size: f64,
    step_at: usize,
    baseline: Vec<f64>,
}

fn cmd_step(scenario_path: &Path, model_id: &str, opts: StepOptions, format: Format) -> CliResult<()> {
    let scenario: Scenario = read_yaml(scenario_path)?;
    let def = scenario
        .models
        .iter()
        .find(|m| m.id == model_id)
        .ok_or_else(|| CliError::Usage(format!("model '{model_id}' not found in scenario")))?;

    let mut model = def.build();
    model.validate()?;

    let arity = model.input_arity();
    let mut inputs = if opts.baseline.is_empty() {
        vec![0.0; arity]
    } else {
        opts.baseline.clone()
    };
    if inputs.len() < arity {
        return Err(CliError::Usage(format!(
            "baseline has {} values, model needs {arity}",
            inputs.len()
        )));
    }
    if opts.input_index >= inputs.len() {
        return Err(CliError::Usage(format!(
            "input index {} outside {} inputs",
            opts.input_index,
            inputs.len()
        )));
    }

    let mut diagnostics = Diagnostics::new();
    let mut input = Vec::with_capacity(opts.steps);
    let mut output = Vec::with_capacity(opts.steps);
    let stepped = inputs[opts.input_index] + opts.step_size;
    for k in 0..opts.steps {
        if k == opts.step_at {
            inputs[opts.input_index] = stepped;
        }
        let out = model.iterate(&inputs, opts.dt, DEFAULT_BAD_VALUE, &mut diagnostics);
        input.push(inputs[opts.input_index]);
        output.push(out.y);
    }

    let response = StepResponse {
        model_id: model_id.to_string(),
        dt_s: opts.dt,
        time_s: (0..opts.steps).map(|k| k as f64 * opts.dt).collect(),
        input,
        output,
        diagnostics: diagnostics.iter().map(ToString::to_string).collect(),
    };
    emit(&response, format)
}

fn cmd_identify(
    data_path: &Path,
    config_path: Option<&Path>,
    max_delay: Option<usize>,
    static_only: bool,
    id: &str,
    format: Format,
) -> CliResult<()> {
    let data: UnitDataSet = read_yaml(data_path)?;
    let mut config: IdentifierConfig = match config_path {
        Some(path) => read_yaml(path)?,
        None => IdentifierConfig::default(),
    };
    if let Some(max_delay) = max_delay {
        config.max_delay_samples = max_delay;
    }
    if static_only {
        config.dynamic = false;
    }

    tracing::info!(
        samples = data.len(),
        inputs = data.n_inputs(),
        "identifying unit model"
    );
    let params = UnitIdentifier::new(config).identify(&data)?;
    if !params.is_identified() {
        tracing::warn!("identification failed; the model cannot be simulated");
    }

    let def = ModelDef::new(id, ModelSpec::Unit { params });
    emit(&def, format)
}

fn cmd_identify_sched(
    data_path: &Path,
    config_path: Option<&Path>,
    thresholds: Option<Vec<f64>>,
    sched_input: Option<usize>,
    id: &str,
    format: Format,
) -> CliResult<()> {
    let data: UnitDataSet = read_yaml(data_path)?;
    let mut config: GainSchedIdentConfig = match config_path {
        Some(path) => read_yaml(path)?,
        None => GainSchedIdentConfig::default(),
    };
    if let Some(thresholds) = thresholds {
        config.gain_thresholds = thresholds;
    }
    if let Some(index) = sched_input {
        config.sched_input_index = index;
    }

    tracing::info!(
        samples = data.len(),
        thresholds = ?config.gain_thresholds,
        "identifying gain-scheduled model"
    );
    let params = GainSchedIdentifier::new(config).identify(&data)?;
    if !params.is_identified() {
        tracing::warn!("identification failed; the model cannot be simulated");
    }

    let def = ModelDef::new(id, ModelSpec::GainSched { params });
    emit(&def, format)
}
