//! CLI argument parsing for gqlforge
//!
//! Defines the Command enum and parse_args() for the compile command.

use anyhow::Result;
use std::path::PathBuf;

pub fn print_usage() {
    eprintln!("gqlforge - GraphQL document compiler");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  gqlforge <command> [arguments]");
    eprintln!("  gqlforge --help");
    eprintln!("  gqlforge --version");
    eprintln!();
    eprintln!("  gqlforge compile --config <FILE> [--db <FILE>] [--task <TAG>] [--output human|json] [--collect]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  compile   Load the schema, extract, validate, and prepare every document");
    eprintln!();
    eprintln!("Compile arguments:");
    eprintln!("  --config <FILE>     Project configuration (JSON)");
    eprintln!("  --db <FILE>         IR database (default: <projectRoot>/ir.db)");
    eprintln!("  --task <TAG>        Only build documents tagged with this task");
    eprintln!("  --output <FORMAT>   Output format: human (default) or json");
    eprintln!("  --collect           Print the collected documents after a clean build");
}

/// How results are written to stdout/stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "human" => Some(OutputFormat::Human),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Compile {
        config_path: PathBuf,
        db_path: Option<PathBuf>,
        task: Option<String>,
        output_format: OutputFormat,
        collect: bool,
    },
    Version,
    Help,
}

/// Parse `args` (without the program name).
pub fn parse_args_from(args: &[String]) -> Result<Command> {
    let Some(command) = args.first() else {
        return Err(anyhow::anyhow!("Missing command"));
    };

    match command.as_str() {
        "--version" | "-V" => Ok(Command::Version),
        "--help" | "-h" => Ok(Command::Help),
        "compile" => {
            let mut config_path: Option<PathBuf> = None;
            let mut db_path: Option<PathBuf> = None;
            let mut task: Option<String> = None;
            let mut output_format = OutputFormat::Human;
            let mut collect = false;

            let mut i = 1;
            while i < args.len() {
                match args[i].as_str() {
                    "--config" => {
                        config_path = Some(PathBuf::from(value_of(args, i)?));
                        i += 2;
                    }
                    "--db" => {
                        db_path = Some(PathBuf::from(value_of(args, i)?));
                        i += 2;
                    }
                    "--task" => {
                        task = Some(value_of(args, i)?.to_string());
                        i += 2;
                    }
                    "--output" => {
                        let value = value_of(args, i)?;
                        output_format = OutputFormat::parse(value)
                            .ok_or_else(|| anyhow::anyhow!("Invalid output format: {}", value))?;
                        i += 2;
                    }
                    "--collect" => {
                        collect = true;
                        i += 1;
                    }
                    other => return Err(anyhow::anyhow!("Unknown argument: {}", other)),
                }
            }

            let config_path = config_path.ok_or_else(|| anyhow::anyhow!("--config is required"))?;
            Ok(Command::Compile {
                config_path,
                db_path,
                task,
                output_format,
                collect,
            })
        }
        other => Err(anyhow::anyhow!("Unknown command: {}", other)),
    }
}

fn value_of(args: &[String], i: usize) -> Result<&str> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("{} requires an argument", args[i]))
}

pub fn parse_args() -> Result<Command> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    parse_args_from(&args)
}
