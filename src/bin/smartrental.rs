//!
//! smartrental command-line client
//! -------------------------------
//! Drives the portal session from a terminal: log in, inspect the restored
//! session, and check which views the current user may open. Runs one command
//! from the arguments or, with `--repl`, an interactive prompt.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use smartrental::cli::{routes_table, session_table};
use smartrental::config::ClientConfig;
use smartrental::navigation::RecordingNavigator;
use smartrental::portal::{Portal, Visit};
use smartrental::storage::CREDENTIAL_KEY;

fn print_usage(program: &str) {
    println!(
        "Usage:\n  {program} [flags] <command> [args...]\n  {program} --repl [flags]\n\nFlags:\n  --api <url>           Backend base URL (env SMARTRENTAL_API_URL)\n  --state-dir <path>    Directory holding session.json (env SMARTRENTAL_STATE_DIR)\n  --timeout <secs>      Request timeout in seconds (env SMARTRENTAL_TIMEOUT_SECS)\n  --repl                Start interactive mode\n  -h, --help            Show this help\n\nCommands:\n  login <email|phone> <password>   authenticate and store the token\n  logout                           clear the local session and notify the backend\n  whoami                           restore the stored session and show it\n  open <path>                      check whether the current user may view <path>\n  routes                           list portal routes and required roles\n  reset <email>                    request a password reset link\n  status                           show configuration and session state\n  help                             show this help\n  quit | exit                      leave the interpreter"
    );
}

fn flag_value(args: &[String], i: usize, flag: &str, program: &str) -> String {
    if i + 1 >= args.len() {
        eprintln!("{} requires a value", flag);
        print_usage(program);
        std::process::exit(2);
    }
    args[i + 1].clone()
}

struct Cli {
    portal: Portal,
    navigator: Arc<RecordingNavigator>,
    config: ClientConfig,
    seen_redirects: usize,
}

impl Cli {
    fn new(config: ClientConfig) -> Result<Self> {
        let navigator = Arc::new(RecordingNavigator::new());
        let portal = Portal::from_config(&config, navigator.clone()).context("Failed to set up portal client")?;
        Ok(Self { portal, navigator, config, seen_redirects: 0 })
    }

    fn flush_redirects(&mut self) {
        let history = self.navigator.history();
        for path in history.iter().skip(self.seen_redirects) {
            println!("-> {}", path);
        }
        self.seen_redirects = history.len();
    }

    /// Run one command line. Returns false when the caller should stop.
    async fn run(&mut self, words: &[&str]) -> Result<bool> {
        let Some((cmd, rest)) = words.split_first() else { return Ok(true) };
        match cmd.to_ascii_lowercase().as_str() {
            "quit" | "exit" => return Ok(false),
            "help" => print_usage("smartrental"),
            "routes" => println!("{}", routes_table(self.portal.routes())),
            "login" => {
                let [identifier, password] = rest else {
                    eprintln!("usage: login <email|phone> <password>");
                    return Ok(true);
                };
                self.portal.start().await;
                match self.portal.login(identifier, password).await {
                    Ok(outcome) => println!("logged in as {} ({})", outcome.user.label(), outcome.user.role),
                    Err(e) => eprintln!("login failed: {}", e),
                }
            }
            "logout" => {
                self.portal.start().await;
                self.portal.logout().await;
                println!("logged out");
            }
            "whoami" => {
                let snapshot = self.portal.start().await;
                println!("{}", session_table(&snapshot));
            }
            "open" => {
                let [path] = rest else {
                    eprintln!("usage: open <path>");
                    return Ok(true);
                };
                self.portal.start().await;
                match self.portal.open(path).await {
                    Visit::Public { pattern } => println!("{} is public ({})", path, pattern),
                    Visit::Protected { pattern, state, .. } => println!("{} ({}): {:?}", path, pattern, state),
                    Visit::NotFound => println!("{}: page not found", path),
                }
            }
            "reset" => {
                let [email] = rest else {
                    eprintln!("usage: reset <email>");
                    return Ok(true);
                };
                match self.portal.request_password_reset(email).await {
                    Ok(message) => println!("{}", message),
                    Err(e) => eprintln!("reset failed: {}", e),
                }
            }
            "status" => {
                println!("api: {}", self.config.api_base);
                println!("credential: {} ({})", self.config.credential_path().display(), CREDENTIAL_KEY);
                println!("{}", session_table(&self.portal.session().snapshot()));
            }
            other => eprintln!("unknown command '{}'; type 'help'", other),
        }
        self.flush_redirects();
        Ok(true)
    }
}

async fn run_repl(mut cli: Cli) -> Result<()> {
    let mut editor = DefaultEditor::new().context("Failed to start line editor")?;
    println!("smartrental interpreter. Type 'help' for commands.");
    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() { continue; }
                let _ = editor.add_history_entry(line);
                let words: Vec<&str> = line.split_whitespace().collect();
                if !cli.run(&words).await? { break; }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e).context("Failed to read input"),
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Failed to build log filter")?;
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let mut args: Vec<String> = env::args().collect();
    let program = args.remove(0);

    let mut config = ClientConfig::from_env().context("Invalid environment configuration")?;
    let mut repl = false;
    let mut command: Vec<String> = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--api" => {
                let v = flag_value(&args, i, "--api", &program);
                config = config.with_api_base(&v).with_context(|| format!("Invalid --api value '{}'", v))?;
                i += 2;
            }
            "--state-dir" => {
                config = config.with_state_dir(flag_value(&args, i, "--state-dir", &program));
                i += 2;
            }
            "--timeout" => {
                let v = flag_value(&args, i, "--timeout", &program);
                let secs = v.parse::<u64>().ok().filter(|s| *s > 0).with_context(|| format!("Invalid --timeout value '{}'", v))?;
                config = config.with_timeout(Duration::from_secs(secs));
                i += 2;
            }
            "--repl" => { repl = true; i += 1; }
            "-h" | "--help" => {
                print_usage(&program);
                return Ok(());
            }
            _ => {
                command.extend(args[i..].iter().cloned());
                break;
            }
        }
    }

    info!(target: "smartrental", api = %config.api_base, state_dir = %config.state_dir.display(), "starting");

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;
    let mut cli = Cli::new(config)?;

    if repl {
        return rt.block_on(run_repl(cli));
    }
    if command.is_empty() {
        print_usage(&program);
        std::process::exit(2);
    }
    let words: Vec<&str> = command.iter().map(String::as_str).collect();
    rt.block_on(cli.run(&words))?;
    Ok(())
}
