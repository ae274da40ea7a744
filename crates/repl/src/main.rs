use std::path::PathBuf;

use clap::{Parser, Subcommand};
use debugger::{DebugSession, DebugValueNode, SessionConfig, VariableLocator};
use eyre::WrapErr;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[clap(name = "pydbg", about = "Inspect a running debuggee")]
struct Args {
    /// Settings file (defaults to the user config directory)
    #[clap(long)]
    config: Option<PathBuf>,

    #[clap(long)]
    host: Option<String>,

    #[clap(short, long)]
    port: Option<u16>,

    /// Print results as JSON
    #[clap(long)]
    json: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the debuggee's threads
    Threads,
    /// Evaluate an expression in a stack frame
    Eval {
        #[clap(long)]
        thread: String,
        #[clap(long)]
        frame: String,
        /// Allow the expression to have side effects
        #[clap(long)]
        exec: bool,
        #[clap(long)]
        truncate: bool,
        expression: String,
    },
    /// Show the variables of a stack frame
    Frame {
        #[clap(long)]
        thread: String,
        #[clap(long)]
        frame: String,
        #[clap(long)]
        globals: bool,
    },
    /// Show the children of the value at a locator
    Expand { locator: String },
    /// Assign a new value to the variable at a locator
    Set { locator: String, value: String },
    /// Resume a suspended thread
    Resume { thread: String },
    /// Show the debuggee's version
    Version,
}

fn print_json<T: Serialize>(value: &T) -> eyre::Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("serializing output")?
    );
    Ok(())
}

fn print_nodes(nodes: &[DebugValueNode], json: bool) -> eyre::Result<()> {
    if json {
        return print_json(&nodes);
    }
    if nodes.is_empty() {
        println!("(no variables)");
    }
    for node in nodes {
        let marker = if node.is_container() { "+" } else { " " };
        println!("{marker} {node}");
    }
    Ok(())
}

async fn run(session: &DebugSession, command: Command, json: bool) -> eyre::Result<()> {
    match command {
        Command::Threads => {
            let threads = session.list_threads().await.context("listing threads")?;
            if json {
                return print_json(&threads);
            }
            for thread in threads {
                println!("{}\t{}", thread.id, thread.name);
            }
        }
        Command::Eval {
            thread,
            frame,
            exec,
            truncate,
            expression,
        } => {
            let accessor = session.frame_accessor(thread, frame)?;
            let node = accessor
                .evaluate(&expression, exec, truncate)
                .await
                .wrap_err_with(|| format!("evaluating {expression:?}"))?;
            print_nodes(std::slice::from_ref(&node), json)?;
        }
        Command::Frame {
            thread,
            frame,
            globals,
        } => {
            let accessor = session.frame_accessor(thread, frame)?;
            let locator = if globals {
                accessor.frame().with_scope(debugger::Scope::Global)
            } else {
                accessor.frame().clone()
            };
            let nodes = accessor
                .load_frame(&locator)
                .await
                .context("loading frame")?;
            print_nodes(&nodes, json)?;
        }
        Command::Expand { locator } => {
            let locator = VariableLocator::parse(&locator).context("parsing locator")?;
            let accessor = session.frame_accessor(locator.thread_id(), locator.frame_id())?;
            let nodes = accessor
                .load_frame(&locator)
                .await
                .context("expanding value")?;
            print_nodes(&nodes, json)?;
        }
        Command::Set { locator, value } => {
            let locator = VariableLocator::parse(&locator).context("parsing locator")?;
            let accessor = session.frame_accessor(locator.thread_id(), locator.frame_id())?;
            accessor
                .change_variable(&locator, &value)
                .await
                .context("changing variable")?;
            println!("ok");
        }
        Command::Resume { thread } => {
            session.resume(&thread).await.context("resuming thread")?;
        }
        Command::Version => {
            let version = session.version().await.context("querying version")?;
            if json {
                return print_json(&version);
            }
            println!("{version}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    color_eyre::install()?;

    let args = Args::parse();
    tracing::debug!(?args, "parsed command line arguments");

    let mut settings = match &args.config {
        Some(path) => config::load(path).context("loading settings")?,
        None => config::load_default().context("loading settings")?,
    };
    if let Some(host) = args.host {
        settings.connection.host = host;
    }
    if let Some(port) = args.port {
        settings.connection.port = port;
    }

    let address = settings.connection.address();
    let addr = tokio::net::lookup_host(&address)
        .await
        .wrap_err_with(|| format!("resolving {address}"))?
        .next()
        .ok_or_else(|| eyre::eyre!("{address} did not resolve to any address"))?;

    let session = DebugSession::new(SessionConfig::from(&settings));
    session
        .connect(addr)
        .await
        .wrap_err_with(|| format!("connecting to {address}"))?;

    let result = run(&session, args.command, args.json).await;
    session.close().await;
    result
}
