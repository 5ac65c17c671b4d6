// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use blueprint_lint::{find_blueprints, Config, Engine, Report, Summary};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn make_engine(config: Option<&Path>, no_docs: bool) -> Result<Engine> {
    let cwd = std::env::current_dir().context("Failed to determine working directory")?;
    let mut config = Config::load(config, &cwd).context("Failed to load configuration")?;
    if no_docs {
        config.check_documentation = false;
    }
    Ok(Engine::with_config(config))
}

// Validate each file, print the reports and return whether all passed.
fn validate(engine: &Engine, files: &[PathBuf], format: Format, summarize: bool) -> Result<bool> {
    let mut summary = Summary::new();
    let mut reports: Vec<Report> = vec![];
    for file in files {
        match engine.validate_file(file) {
            Ok(report) => {
                summary.add(&report);
                if format == Format::Text {
                    println!("{}", report.render_text());
                }
                reports.push(report);
            }
            Err(err) => {
                eprintln!("{err:#}");
                summary.add_failure(file.to_string_lossy());
            }
        }
    }

    match format {
        Format::Json => println!("{}", summary.to_json(&reports)?),
        Format::Text if summarize => println!("{}", summary.render_text()),
        Format::Text => (),
    }
    Ok(summary.is_success())
}

fn lint_check(files: &[PathBuf], config: Option<&Path>, no_docs: bool, format: Format) -> Result<bool> {
    let engine = make_engine(config, no_docs)?;
    validate(&engine, files, format, files.len() > 1)
}

fn lint_all(root: &Path, config: Option<&Path>, no_docs: bool, format: Format) -> Result<bool> {
    let engine = make_engine(config, no_docs)?;
    let files = find_blueprints(root, engine.config())?;
    if files.is_empty() {
        bail!("No blueprints found under {}", root.display());
    }
    if format == Format::Text {
        println!("Found {} blueprint(s) to validate\n", files.len());
    }
    validate(&engine, &files, format, true)
}

fn lint_lex(file: &Path, verbose: bool) -> Result<bool> {
    let source = blueprint_lint::unstable::Source::from_file(file)?;

    for region in blueprint_lint::unstable::scan(source.contents()) {
        if !region.is_code() {
            continue;
        }
        if verbose {
            // Print the region's line and mark its start with ^.
            let (line, col) = source.position(region.start);
            println!("{}", source.message(line, col, "region", &format!("{:?}", region.kind)));
        }
        println!("{region:?}");
        for token in region.tokens() {
            println!("    {token:?}");
        }
    }
    Ok(true)
}

#[derive(Subcommand)]
enum LintCommand {
    /// Validate blueprint files.
    Check {
        /// Blueprint YAML files.
        #[arg(required(true))]
        files: Vec<PathBuf>,
    },

    /// Discover and validate every blueprint under a directory.
    All {
        /// Directory to search.
        #[arg(long, short, default_value = ".")]
        root: PathBuf,
    },

    /// Print the template regions and tokens of a file.
    Lex {
        /// Blueprint YAML file.
        file: PathBuf,

        /// Verbose output.
        #[arg(long, short)]
        verbose: bool,
    },
}

#[derive(clap::Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: LintCommand,

    /// Configuration file. Defaults to .blueprint-lint.yaml in the working directory.
    #[arg(long, short, global = true, value_name = "config.yaml")]
    config: Option<PathBuf>,

    /// Output format.
    #[arg(long, short, global = true, value_enum, default_value = "text")]
    format: Format,

    /// Skip the README.md and CHANGELOG.md checks.
    #[arg(long, global = true)]
    no_docs: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Parse and dispatch command.
    let cli = Cli::parse();
    let config = cli.config.as_deref();
    let passed = match &cli.command {
        LintCommand::Check { files } => lint_check(files, config, cli.no_docs, cli.format)?,
        LintCommand::All { root } => lint_all(root, config, cli.no_docs, cli.format)?,
        LintCommand::Lex { file, verbose } => lint_lex(file, *verbose)?,
    };

    if !passed {
        std::process::exit(1);
    }
    Ok(())
}
