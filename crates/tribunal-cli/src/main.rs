use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use tribunal_core::{SecurityGate, StaticAnalyzer, VerificationRequest};
use tribunal_runtime::{BackendRegistry, Pipeline, PipelineConfig, SecurityConfig};

#[derive(Parser)]
#[command(author, version, about = "Multi-stage verification for machine-generated code", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline
    Verify {
        /// Pipeline configuration (YAML)
        #[arg(long, short)]
        config: PathBuf,
        /// File holding the code; stdin when omitted or "-"
        #[arg(long)]
        code: Option<PathBuf>,
        /// Language of the code (rust, python, ts, ...)
        #[arg(long, short)]
        language: String,
        /// What the code is supposed to do
        #[arg(long, short)]
        description: String,
        /// Extra context for the reviewers
        #[arg(long)]
        context: Option<String>,
        /// Number of judges; defaults to the configured count
        #[arg(long)]
        judges: Option<usize>,
        /// Judge backend identifiers, overriding the configured defaults
        #[arg(long = "backend", value_name = "ID")]
        backends: Vec<String>,
    },
    /// Run the security gate only (offline)
    Scan {
        /// File holding the code; stdin when omitted or "-"
        #[arg(long)]
        code: Option<PathBuf>,
        /// Extra YAML or JSON pattern table
        #[arg(long)]
        patterns: Option<PathBuf>,
        /// Drop the built-in rules
        #[arg(long)]
        no_builtin: bool,
    },
    /// Run static analysis only (offline)
    Analyze {
        /// File holding the code; stdin when omitted or "-"
        #[arg(long)]
        code: Option<PathBuf>,
        #[arg(long, short)]
        language: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

/// Execute one command; `Ok(false)` means the artifact was rejected.
async fn run(command: Commands) -> Result<bool> {
    match command {
        Commands::Verify {
            config,
            code,
            language,
            description,
            context,
            judges,
            backends,
        } => {
            let config = PipelineConfig::from_yaml_file(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            let judge_count = judges.unwrap_or(config.judge_count);
            let pipeline = Pipeline::from_config(config, &BackendRegistry::with_defaults())?;

            let mut request = VerificationRequest::new(read_code(code.as_deref())?, language, description)
                .with_judge_count(judge_count)
                .with_backends(backends);
            if let Some(context) = context {
                request = request.with_context(context);
            }

            let result = pipeline.run(request).await?;
            print_json(&result)?;
            Ok(result.verified)
        }
        Commands::Scan {
            code,
            patterns,
            no_builtin,
        } => {
            let security = SecurityConfig {
                pattern_table: patterns,
                include_builtin: !no_builtin,
            };
            let gate = SecurityGate::new(security.load_table()?);
            let scan = gate.scan(&read_code(code.as_deref())?);
            print_json(&scan)?;
            Ok(scan.verdict.approved)
        }
        Commands::Analyze { code, language } => {
            let verdict = StaticAnalyzer::new().analyze(&read_code(code.as_deref())?, &language);
            print_json(&verdict)?;
            Ok(verdict.approved)
        }
    }
}

fn read_code(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display())),
        _ => {
            let mut code = String::new();
            std::io::stdin()
                .read_to_string(&mut code)
                .context("reading code from stdin")?;
            Ok(code)
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verify_arguments() {
        let cli = Cli::parse_from([
            "tribunal",
            "verify",
            "--config",
            "tribunal.yaml",
            "--language",
            "rust",
            "--description",
            "parse input",
            "--backend",
            "claude",
            "--backend",
            "gpt",
        ]);
        match cli.command {
            Commands::Verify {
                backends, judges, code, ..
            } => {
                assert_eq!(backends, vec!["claude", "gpt"]);
                assert!(judges.is_none());
                assert!(code.is_none());
            }
            _ => panic!("expected verify"),
        }
    }

    #[tokio::test]
    async fn test_analyze_file() {
        let path = std::env::temp_dir().join(format!("tribunal-cli-{}.py", std::process::id()));
        std::fs::write(&path, "def f(x):\n    return x\n").unwrap();

        let approved = run(Commands::Analyze {
            code: Some(path.clone()),
            language: "python".to_string(),
        })
        .await
        .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(approved);
    }

    #[test]
    fn test_missing_code_file_is_an_error() {
        assert!(read_code(Some(Path::new("/nonexistent/tribunal/code.rs"))).is_err());
    }
}
