use std::io::IsTerminal;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "corral",
    about = "Agent-execution platform: templates to isolated LLM sessions"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Target session for forwarded commands
    #[arg(short = 's', long, global = true)]
    session: Option<u64>,

    /// Fire-and-forget: do not block on the owning child's result
    #[arg(long, global = true)]
    no_wait: bool,

    /// Anything else is a command line for the daemon's dispatcher
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the host daemon in the foreground
    Daemon,

    /// Internal: run the per-session child process
    #[command(hide = true)]
    Agent {
        #[arg(long)]
        session: u64,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Daemon) => corral_daemon::run_daemon().await.map(|()| 0),
        Some(Commands::Agent { session }) => corral_agent::run_agent(session).await.map(|()| 0),
        None => {
            if cli.args.is_empty() {
                eprintln!("usage: corral daemon | corral <command…>  (try: corral session list)");
                std::process::exit(2);
            }
            corral_cli::run(cli.args, cli.session, !cli.no_wait).await
        }
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}
