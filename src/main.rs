//! Parley — entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Build the shared backend
//!   6. Spawn Ctrl-C → shutdown signal watcher
//!   7. Spawn the HTTP surface (if enabled)
//!   8. Run the console (with -i) until EOF, /quit or shutdown
//!   9. Cancel token + join the HTTP task

use parley::{
    chat,
    config::{self, Config},
    console::Console,
    error::AppError,
    gate::AccessGate,
    http::{HttpServer, HttpState},
    llm::providers,
    logger,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

struct CliArgs {
    log_level: Option<&'static str>,
    interactive: bool,
    config_path: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present — ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();
    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some())?;

    info!(
        app_name = %config.app_name,
        work_dir = %config.work_dir.display(),
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        interactive = %args.interactive,
        "config loaded"
    );

    let backend = providers::build(&config.llm, config.llm_api_key.clone())
        .map_err(|e| AppError::Backend(e.to_string()))?;

    if let Err(fault) = backend.ping().await {
        warn!(backend = backend.name(), error = %fault, "backend not reachable yet — replies will carry the error");
    }

    if !args.interactive && !config.http.enabled {
        return Err(AppError::Config(
            "nothing to run: pass -i for the console or set [http] enabled = true".into(),
        ));
    }

    // Shared shutdown token — Ctrl-C cancels it, all tasks watch it.
    let shutdown = CancellationToken::new();

    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received — initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    print_startup_summary(&config, backend.name(), args.interactive);

    let http_task = config.http.enabled.then(|| {
        let server = HttpServer::new(config.http.bind.clone(), HttpState::new(config.clone(), backend.clone()));
        let token = shutdown.clone();
        tokio::spawn(async move { server.run(token).await })
    });

    if args.interactive {
        let session = chat::new_session(&config, backend.clone());
        let gate = AccessGate::new(config.access_secret.clone());
        let console = Console::new(session, gate, config.exports_dir());
        let session = console.run(shutdown.clone()).await?;
        info!(
            session_id = %session.session_id(),
            turns = session.transcript().len(),
            "console session ended"
        );
        // Console exited on EOF or /quit: stop everything else too.
        shutdown.cancel();
    } else {
        shutdown.cancelled().await;
    }

    if let Some(task) = http_task {
        match task.await {
            Ok(result) => result?,
            Err(e) => warn!("http task panicked: {e}"),
        }
    }

    if args.interactive {
        use std::io::Write as _;
        println!("\nBye :) ...");
        let _ = std::io::stdout().flush();
    }

    Ok(())
}

fn print_startup_summary(config: &Config, backend: &str, interactive: bool) {
    let mode = if interactive { "interactive" } else { "daemon" };
    let http = if config.http.enabled { config.http.bind.as_str() } else { "disabled" };
    let gate = if config.access_secret.is_some() { "on" } else { "off" };

    println!("┌ {} ({mode}, pid {})", config.app_name, std::process::id());
    println!("│ backend : {backend} (stream={})", config.llm.stream);
    println!("│ model   : {} of {}", config.catalog.default_model(), config.catalog.models().len());
    println!("│ http    : {http}");
    println!("│ gate    : {gate}");
    println!("└ workdir : {}", config.work_dir.display());
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut interactive = false;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: parley [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -i, --interactive          Run the console on stdin/stdout");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-i" | "--interactive" => interactive = true,
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    CliArgs { log_level: logger::level_for_verbosity(verbosity), interactive, config_path }
}
