//! acquire - Command-line interface for the logical acquisition engine.
//!
//! Parses arguments into a run configuration, wires up terminal prompting
//! and interrupt handling, executes the run, and renders the summary.
//! Exit code 0 covers partial-transfer success; 1 is reserved for
//! validation, locator, and provisioning failures.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use clap::Parser;
use engine::{
    execute_run, CancelToken, InputProvider, RunConfig, RunSummary, SystemTools, TransferStrategy,
};

/// acquire - Read-only logical acquisition of a network share
#[derive(Parser, Debug)]
#[command(name = "acquire")]
#[command(version = "0.1.0")]
#[command(about = "Copy a mounted share read-only into a fresh sparse container, with audit logs")]
struct Args {
    /// Pre-mounted read-only source path; omit it to discover one with --assisted
    #[arg(value_name = "TARGET")]
    target: Option<PathBuf>,

    /// Destination directory for the container and the run artifacts
    #[arg(value_name = "DESTINATION")]
    destination: Option<PathBuf>,

    /// Discover and mount the target's share interactively
    #[arg(long)]
    assisted: bool,

    /// Compute MD5 and SHA-256 over the finalized container
    #[arg(long)]
    hash: bool,

    /// Container name; also names the .out/.log/.err artifacts
    #[arg(long, value_name = "NAME", default_value = "acquisition")]
    name: String,

    /// Remote computer display name (assisted mode)
    #[arg(long, value_name = "COMPUTER")]
    computer: Option<String>,

    /// Remote username (assisted mode)
    #[arg(long, value_name = "USER")]
    user: Option<String>,

    /// Remote password (assisted mode); prompted for when omitted
    #[arg(long, value_name = "PASSWORD", conflicts_with = "no_password")]
    password: Option<String>,

    /// Connect with no password instead of prompting
    #[arg(long)]
    no_password: bool,

    /// Container size, e.g. 500g or 1t; derived from the source when omitted
    #[arg(long, value_name = "SIZE")]
    size: Option<String>,

    /// Transfer strategy: copy or mirror
    #[arg(long, value_name = "STRATEGY", default_value = "copy")]
    strategy: String,
}

/// Interactive prompts over the controlling terminal.
struct TerminalInput;

impl InputProvider for TerminalInput {
    fn confirm(&mut self, prompt: &str) -> io::Result<bool> {
        let answer = self.line(prompt)?;
        Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
    }

    fn line(&mut self, prompt: &str) -> io::Result<String> {
        eprint!("{}", prompt);
        io::stderr().flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(answer.trim_end_matches(['\r', '\n']).to_string())
    }

    fn secret(&mut self, prompt: &str) -> io::Result<String> {
        rpassword::prompt_password(prompt)
    }
}

/// Parse a size argument: plain bytes, or a k/m/g/t suffix (binary units).
fn parse_size(value: &str) -> Result<u64, String> {
    let value = value.trim().to_lowercase();
    let (digits, multiplier) = match value.strip_suffix(['k', 'm', 'g', 't']) {
        Some(digits) => {
            let multiplier: u64 = match value.as_bytes()[value.len() - 1] {
                b'k' => 1 << 10,
                b'm' => 1 << 20,
                b'g' => 1 << 30,
                _ => 1u64 << 40,
            };
            (digits, multiplier)
        }
        None => (value.as_str(), 1),
    };
    let amount: u64 = digits
        .parse()
        .map_err(|_| format!("Invalid size '{}'. Use bytes or a k/m/g/t suffix", value))?;
    amount
        .checked_mul(multiplier)
        .ok_or_else(|| format!("Size '{}' overflows", value))
}

/// Turn arguments into an immutable run configuration.
fn build_config(args: &Args) -> Result<RunConfig, String> {
    // With a single positional, it is the destination (assisted runs have
    // no target path to give)
    let (source, destination) = match (&args.target, &args.destination) {
        (Some(target), Some(destination)) => (Some(target.clone()), destination.clone()),
        (Some(only), None) => (None, only.clone()),
        _ => return Err("Missing DESTINATION directory".to_string()),
    };

    let strategy = TransferStrategy::from_str(&args.strategy)
        .ok_or_else(|| format!("Invalid strategy '{}'. Must be 'copy' or 'mirror'", args.strategy))?;

    let size_bytes = match &args.size {
        Some(size) => Some(parse_size(size)?),
        None => None,
    };

    if args.name.trim().is_empty() || args.name.contains('/') {
        return Err(format!("Invalid container name '{}'", args.name));
    }

    Ok(RunConfig {
        source,
        destination,
        container_name: args.name.clone(),
        size_bytes,
        strategy,
        compute_hashes: args.hash,
        assisted: args.assisted,
        remote_host: args.computer.clone(),
        remote_user: args.user.clone(),
        remote_password: args.password.clone(),
        no_password: args.no_password,
    })
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_idx])
}

fn format_duration(seconds: i64) -> String {
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

fn print_summary(summary: &RunSummary) {
    eprintln!();
    eprintln!("Acquisition complete!");
    eprintln!("  Run id:      {}", summary.run_id);
    eprintln!("  Source:      {}", summary.source.display());
    eprintln!("  Destination: {}", summary.destination.display());
    eprintln!("  Container:   {}", summary.container_image.display());
    eprintln!("  Strategy:    {}", summary.strategy);

    if let Some(folder) = &summary.backup_folder {
        eprintln!("  Prior run:   archived to {}", folder.display());
    }

    match summary.transfer_exit_code {
        Some(0) => eprintln!("  Transfer:    clean"),
        Some(code) => eprintln!("  Transfer:    exit code {} (partial; see the .err log)", code),
        None => eprintln!("  Transfer:    did not complete (see the .err log)"),
    }

    if let Some(digests) = &summary.digests {
        eprintln!("  MD5:         {}", digests.md5);
        eprintln!("  SHA-256:     {}", digests.sha256);
    }

    if let Ok(image) = std::fs::metadata(&summary.container_image) {
        eprintln!("  Image size:  {}", format_bytes(image.len()));
    }

    let elapsed = (summary.finished_at - summary.started_at).num_seconds();
    eprintln!("  Elapsed:     {}", format_duration(elapsed));

    if !summary.notes.is_empty() {
        eprintln!();
        eprintln!("Notes:");
        for note in &summary.notes {
            eprintln!("  - {}", note);
        }
    }
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args) -> Result<RunSummary, String> {
    let config = build_config(args)?;

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    // An interrupt mid-run must still detach the container; the supervisor
    // checks the token at stage boundaries
    let _ = ctrlc::set_handler(move || handler_token.cancel());

    let tools = SystemTools::new();
    let mut input = TerminalInput;
    execute_run(&config, &tools, &mut input, &cancel).map_err(|e| e.to_string())
}

fn main() {
    let args = Args::parse();

    let exit_code = match run_cli(&args) {
        Ok(summary) => {
            print_summary(&summary);
            0
        }
        Err(msg) => {
            eprintln!("Error: {}", msg);
            1
        }
    };

    std::process::exit(exit_code);
}
