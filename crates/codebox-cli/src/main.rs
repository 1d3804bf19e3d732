use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codebox_core::{CodeRunner, CodeboxConfig, ConfigLoader, ContainerEngine, ExecutionResult};
use log::LevelFilter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::io::AsyncReadExt;

mod render;

#[derive(Parser, Debug)]
#[clap(name = "codebox", author, version, about = "Run code in a disposable container")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(long, short, global = true, help = "Path to a YAML configuration file")]
    config: Option<PathBuf>,

    #[clap(long, short, global = true, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a source file (or stdin) once and print the result
    Run {
        #[clap(help = "Source file to run; '-' or omitted reads stdin")]
        file: Option<PathBuf>,

        #[clap(long, conflicts_with = "file", help = "Source text to run")]
        code: Option<String>,

        #[clap(long, help = "Wall-clock limit in seconds")]
        timeout: Option<u64>,

        #[clap(long, help = "Memory limit in megabytes")]
        memory_mb: Option<u64>,

        #[clap(long, help = "CPU limit, in cores (e.g. 0.5)")]
        cpus: Option<f64>,

        #[clap(long, help = "Pinned sandbox image, name:tag")]
        image: Option<String>,

        #[clap(long, help = "Print the result as JSON")]
        json: bool,
    },
    /// Check that the container engine is reachable and the image is present
    Check,
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_level_filter = cli.log_level.parse().unwrap_or(LevelFilter::Warn);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    let config = ConfigLoader::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Run {
            file,
            code,
            timeout,
            memory_mb,
            cpus,
            image,
            json,
        } => {
            let mut config = config;
            apply_run_overrides(&mut config, timeout, memory_mb, cpus, image)?;
            let source = read_source(file.as_deref(), code).await?;
            run_once(&config, &source, json).await
        }
        Commands::Check => check(&config).await,
        Commands::Config => {
            print!("{}", serde_yaml::to_string(&config)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn apply_run_overrides(
    config: &mut CodeboxConfig,
    timeout: Option<u64>,
    memory_mb: Option<u64>,
    cpus: Option<f64>,
    image: Option<String>,
) -> Result<()> {
    if let Some(timeout) = timeout {
        config.limits.timeout_secs = timeout;
    }
    if let Some(memory_mb) = memory_mb {
        config.limits.memory_mb = memory_mb;
    }
    if let Some(cpus) = cpus {
        config.limits.cpus = cpus;
    }
    if let Some(image) = image {
        config.sandbox.image = image;
    }
    config.validate()?;
    Ok(())
}

async fn read_source(file: Option<&Path>, code: Option<String>) -> Result<String> {
    if let Some(code) = code {
        return Ok(code);
    }
    match file {
        Some(path) if path != Path::new("-") => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display())),
        _ => {
            let mut source = String::new();
            tokio::io::stdin()
                .read_to_string(&mut source)
                .await
                .context("Failed to read source from stdin")?;
            Ok(source)
        }
    }
}

async fn run_once(config: &CodeboxConfig, source: &str, json: bool) -> Result<ExitCode> {
    let result = match CodeRunner::with_docker(config) {
        Ok(runner) => match runner.run_request(source).await {
            Ok(result) => result,
            Err(e) => {
                eprintln!("{}", render::render_error(&e));
                return Ok(ExitCode::from(render::EXIT_PLATFORM));
            }
        },
        // No client means no sandbox: report it like any other engine fault
        Err(e) => ExecutionResult::InfrastructureError {
            message: e.to_string(),
        },
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        let (to_stdout, text) = render::render_text(&result);
        if to_stdout {
            println!("{}", text);
        } else {
            eprintln!("{}", text);
        }
    }
    Ok(render::exit_code(&result))
}

async fn check(config: &CodeboxConfig) -> Result<ExitCode> {
    let runner = CodeRunner::with_docker(config)?;
    let sandbox = runner.sandbox();

    if let Err(e) = sandbox.health_check().await {
        eprintln!("Container engine: unreachable ({})", e);
        return Ok(ExitCode::from(render::EXIT_PLATFORM));
    }
    println!("Container engine: reachable");

    let image = &sandbox.sandbox_config().image;
    match sandbox.engine().image_exists(image).await {
        Ok(true) => println!("Image {}: present", image),
        Ok(false) => println!("Image {}: missing (pulled on first run)", image),
        Err(e) => {
            eprintln!("Image {}: could not inspect ({})", image, e);
            return Ok(ExitCode::from(render::EXIT_PLATFORM));
        }
    }
    Ok(ExitCode::SUCCESS)
}
