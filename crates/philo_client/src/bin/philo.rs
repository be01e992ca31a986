//! philo: terminal front end for the question-answering service.
//! Reads config, submits one question, streams the answer to stdout and
//! prints the sources afterwards. Optionally exports the exchange.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use philo_client::config;
use philo_client::render::{Presenter, RenderIntent};
use philo_client::{
    AskOptions, ExchangeOutcome, ExportFormat, HttpClient, Role, Session, SessionError,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "philo", version, about = "Ask the philosopher a question")]
struct Cli {
    /// Question to ask. Read from the first line of stdin when omitted.
    question: Option<String>,

    /// Config file (default: ~/.philo/config.yaml).
    #[arg(long, env = "PHILO_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long)]
    provider: Option<String>,

    /// Model id; empty means the provider default.
    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    mode: Option<String>,

    /// Convert a document and ask its text as the question.
    #[arg(long, value_name = "FILE", conflicts_with = "question")]
    upload: Option<PathBuf>,

    /// Write the finished exchange to this file.
    #[arg(long, value_name = "PATH")]
    export: Option<PathBuf>,

    /// Export format: md or txt (default: from the export path extension).
    #[arg(long, requires = "export")]
    format: Option<ExportFormat>,

    /// Print the available providers and models, then exit.
    #[arg(long)]
    list_providers: bool,
}

/// Streams answer text to stdout; status goes to stderr.
struct TerminalPresenter {
    out: io::Stdout,
}

impl Presenter for TerminalPresenter {
    fn render(&mut self, intent: RenderIntent) {
        match intent {
            RenderIntent::ShowMessage {
                role: Role::Assistant,
                text,
                ..
            } => eprintln!("{text}"),
            RenderIntent::AppendToMessage { text, .. } => {
                let mut out = self.out.lock();
                let _ = write!(out, "{text}");
                let _ = out.flush();
            }
            _ => {}
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "philo_client=warn,philo=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn read_question_from_stdin() -> String {
    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);
    line.trim().to_string()
}

fn export_format_for(cli: &Cli, path: &Path) -> ExportFormat {
    cli.format.unwrap_or_else(|| {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
            .unwrap_or(ExportFormat::Markdown)
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let cfg = match &cli.config {
        Some(path) => config::load(path).map_err(|e| (path.clone(), e)),
        None => config::resolve_path(None)
            .and_then(|path| config::load_or_default(&path))
            .map_err(|e| (PathBuf::from("~/.philo/config.yaml"), e)),
    };
    let cfg = match cfg {
        Ok(c) => c,
        Err((path, e)) => {
            eprintln!("Error: failed to load config from {}: {}", path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    rt.block_on(run(cli, cfg))
}

async fn run(cli: Cli, cfg: config::Config) -> ExitCode {
    let client = match HttpClient::with_connect_timeout(cfg.base_url(), cfg.connect_timeout()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let presenter = TerminalPresenter { out: io::stdout() };
    let mut session = Session::new(client, presenter)
        .with_defaults(cfg.ask_defaults())
        .with_export_labels(cfg.export_labels());

    if cli.list_providers {
        return match session.load_providers().await {
            Ok(providers) => {
                for p in providers {
                    println!("{}\t{}\t{}", p.id, p.display_name, p.models.join(", "));
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: could not load providers: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    // Provider defaults come from the service list when it is reachable.
    if cli.provider.is_none() {
        if let Err(e) = session.load_providers().await {
            tracing::debug!(error = %e, "provider list unavailable, using configured default");
        }
    }

    let abort = session.abort_handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            abort.abort();
        }
    });

    let question = if let Some(path) = &cli.upload {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                eprintln!("Error: cannot read {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        };
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match session.upload_document(&filename, bytes).await {
            Ok(text) => text,
            Err(SessionError::Aborted) => {
                eprintln!("\nCancelled.");
                return ExitCode::from(130);
            }
            Err(e) => {
                eprintln!("Error: upload failed: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        cli.question.clone().unwrap_or_else(read_question_from_stdin)
    };

    let options = AskOptions {
        provider: cli.provider.clone(),
        model: cli.model.clone(),
        mode: cli.mode.clone(),
    };
    let outcome = match session.submit_question(&question, options).await {
        Ok(outcome) => outcome,
        Err(SessionError::EmptyQuestion) => {
            eprintln!("Error: no question provided (argument or stdin)");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match outcome {
        ExchangeOutcome::Completed(handle) => {
            println!();
            let sources = session
                .transcript()
                .get(handle)
                .ok()
                .and_then(|m| m.sources().map(str::to_string));
            if let Some(sources) = sources.filter(|s| !s.is_empty()) {
                println!("\nSources: {}", sources);
            }
            if let Some(path) = &cli.export {
                let format = export_format_for(&cli, path);
                let written = session
                    .export_exchange(handle, format)
                    .map_err(|e| e.to_string())
                    .and_then(|doc| std::fs::write(path, doc.body).map_err(|e| e.to_string()));
                if let Err(e) = written {
                    eprintln!("Error: export to {} failed: {}", path.display(), e);
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }
        ExchangeOutcome::Failed { error, .. } => {
            eprintln!("Error: {}", error);
            ExitCode::FAILURE
        }
        ExchangeOutcome::Cancelled(_) => {
            eprintln!("\nCancelled.");
            ExitCode::from(130)
        }
        ExchangeOutcome::Incomplete(_) => {
            println!();
            eprintln!("Error: answer stream was interrupted before completion");
            ExitCode::FAILURE
        }
    }
}
