// Copyright 2026 Site Tester Contributors
// SPDX-License-Identifier: Apache-2.0

//! site-tester: entry point.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use site_tester_cli::exit::ExitCode;
use site_tester_cli::{run, OutputOptions, Settings};

#[derive(Parser)]
#[command(
    name = "site-tester",
    about = "Render sites and APIs in a headless browser and check they are healthy",
    version
)]
struct Cli {
    /// Directory of target descriptors (*.json, *.toml).
    /// Also reads from SITE_TESTER_SITES; defaults to ./sites.
    #[arg(long, global = true)]
    sites: Option<String>,

    /// Upper bound on a page's load event and on script predicates, in ms.
    #[arg(long, global = true, value_name = "MS")]
    load_timeout: Option<u64>,

    /// Timeout for each HTTP request, in ms.
    #[arg(long, global = true, value_name = "MS")]
    request_timeout: Option<u64>,

    /// Path to the Chromium binary.
    /// Also reads from SITE_TESTER_CHROMIUM.
    #[arg(long, global = true, value_name = "PATH")]
    chromium: Option<String>,

    /// Print only the run report as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Suppress progress lines and the result dump.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable ANSI colors.
    #[arg(long, global = true)]
    no_color: bool,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check every target (default).
    Run,

    /// List discovered targets and their channels.
    List,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   site-tester completions bash > ~/.local/share/bash-completion/completions/site-tester
    ///   site-tester completions zsh > ~/.zfunc/_site-tester
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let output = OutputOptions {
        json: cli.json,
        quiet: cli.quiet,
        color: !cli.no_color && std::env::var_os("NO_COLOR").is_none(),
    };
    let settings = Settings::resolve(
        cli.sites.as_deref(),
        cli.load_timeout,
        cli.request_timeout,
        cli.chromium.as_deref(),
        output,
    );

    let outcome = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run::run(&settings).await,
        Commands::List => run::list(&settings),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "site-tester", &mut std::io::stdout());
            Ok(ExitCode::Success)
        }
    };

    // Exit explicitly: browser and runtime tasks must not keep the process alive.
    let code = match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::ConfigError
        }
    };
    std::process::exit(code.as_i32());
}
