//! gqlforge CLI - builds the GraphQL documents of one project
//!
//! Usage: gqlforge compile --config <FILE> [arguments]

mod cli;

use anyhow::{Context, Result};
use gqlforge::{
    CancellationToken, CollectedDocument, CollectedSelection, Compiler, Diagnostic, LogLevel, OsFileSystem,
    PipelineError, ProjectConfig, Store,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use cli::{parse_args, print_usage, Command, OutputFormat};

#[derive(Serialize)]
struct CompileReport<'a> {
    diagnostics: &'a [Diagnostic],
    #[serde(skip_serializing_if = "Option::is_none")]
    documents: Option<&'a [CollectedDocument]>,
}

fn init_logger(level: LogLevel) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.tracing_filter()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| eprintln!("Error initializing the global logger: {err}"))
        .ok();
}

/// Trip `cancel` on SIGINT/SIGTERM.
fn register_signals(cancel: &CancellationToken) -> Result<()> {
    #[cfg(unix)]
    {
        use signal_hook::consts::signal;
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([signal::SIGTERM, signal::SIGINT])?;
        let cancel = cancel.clone();
        std::thread::spawn(move || {
            if signals.forever().next().is_some() {
                tracing::warn!("interrupted, cancelling build");
                cancel.cancel();
            }
        });
    }
    #[cfg(not(unix))]
    {
        signal_hook::flag::register(signal_hook::consts::SIGINT, cancel.flag())?;
    }
    Ok(())
}

fn run_compile(
    config_path: PathBuf,
    db_path: Option<PathBuf>,
    task: Option<String>,
    output_format: OutputFormat,
    collect: bool,
) -> Result<bool> {
    let config = ProjectConfig::from_json_file(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    init_logger(config.log_level);

    let cancel = CancellationToken::new();
    register_signals(&cancel)?;

    let store = match db_path {
        Some(path) => Store::open(&path)?,
        None => Store::open_in_dir(&config.project_root)?,
    };
    let mut compiler = Compiler::new(config, Arc::new(OsFileSystem), store).with_cancellation(cancel);
    if let Some(task) = task {
        compiler = compiler.with_task(task);
    }

    let diagnostics = match compiler.run_all() {
        Ok(diagnostics) => diagnostics,
        Err(PipelineError::Store(err)) => return Err(err.into()),
        Err(err) => err.into_diagnostics(),
    };

    let documents = if collect && diagnostics.is_empty() {
        let ids = compiler.document_ids()?;
        Some(compiler.collect(&ids)?)
    } else {
        None
    };

    match output_format {
        OutputFormat::Json => {
            let report = CompileReport {
                diagnostics: &diagnostics,
                documents: documents.as_deref(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Human => {
            for diagnostic in &diagnostics {
                eprintln!("{}", diagnostic.format_stderr());
            }
            for document in documents.iter().flatten() {
                print_document(document);
            }
            if !diagnostics.is_empty() {
                eprintln!("{} problem(s) found", diagnostics.len());
            }
        }
    }

    Ok(diagnostics.is_empty())
}

fn print_document(document: &CollectedDocument) {
    match &document.type_condition {
        Some(on) => println!("{} {} on {}", document.kind, document.name, on),
        None => println!("{} {}", document.kind, document.name),
    }
    for selection in &document.selections {
        print_selection(selection, 1);
    }
}

fn print_selection(selection: &CollectedSelection, depth: usize) {
    let indent = "  ".repeat(depth);
    let arguments: Vec<String> = selection
        .arguments
        .iter()
        .map(|arg| format!("{}: {}", arg.name, arg.value))
        .collect();
    let directives: Vec<String> = selection.directives.iter().map(|d| format!(" @{}", d.name)).collect();
    let head = match selection.kind.as_str() {
        "fragment" => format!("...{}", selection.field_name),
        "inline_fragment" if selection.field_name == "inline_fragment" => "...".to_string(),
        "inline_fragment" => format!("... on {}", selection.field_name),
        _ => match &selection.alias {
            Some(alias) if alias != &selection.field_name => format!("{}: {}", alias, selection.field_name),
            _ => selection.field_name.clone(),
        },
    };
    if arguments.is_empty() {
        println!("{}{}{}", indent, head, directives.concat());
    } else {
        println!("{}{}({}){}", indent, head, arguments.join(", "), directives.concat());
    }
    for child in &selection.children {
        print_selection(child, depth + 1);
    }
}

fn main() -> ExitCode {
    match parse_args() {
        Ok(Command::Help) => {
            print_usage();
            ExitCode::SUCCESS
        }
        Ok(Command::Version) => {
            println!("{}", gqlforge::version::version());
            ExitCode::SUCCESS
        }
        Ok(Command::Compile {
            config_path,
            db_path,
            task,
            output_format,
            collect,
        }) => match run_compile(config_path, db_path, task, output_format, collect) {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => ExitCode::from(1),
            Err(e) => {
                eprintln!("Error: {:#}", e);
                ExitCode::from(2)
            }
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            ExitCode::from(1)
        }
    }
}
