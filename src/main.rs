use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jtag_uart_link::analysis::run::AnalyzeArgs;
use jtag_uart_link::common::debug::init_logging;
use jtag_uart_link::host::run::{CaptureArgs, SendArgs};
use jtag_uart_link::target::run::ServeArgs;

/// Command channel and memory capture over a JTAG UART tunnel
#[derive(Parser, Debug)]
#[command(name = "jtag-uart-link", version, about)]
struct Cli {
    /// Enable debug output
    #[arg(short = 'd', long = "debug", global = true, default_value_t = false)]
    debug: bool,

    /// Log specification, eg "jtag_uart_link=trace" (overrides --debug)
    #[arg(long = "log", global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the target command handler as an emulator
    Serve(ServeArgs),
    /// Send one command and print the response
    Send(SendArgs),
    /// Run a full capture from a JSON config and print the report
    Capture(CaptureArgs),
    /// Find variables in a raw memory dump
    Analyze(AnalyzeArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _logger = init_logging(cli.debug, cli.log.as_deref()).context("Failed to start logging")?;

    match cli.command {
        Commands::Serve(args) => jtag_uart_link::target::run::run(args),
        Commands::Send(args) => jtag_uart_link::host::run::run_send(args),
        Commands::Capture(args) => jtag_uart_link::host::run::run_capture(args),
        Commands::Analyze(args) => jtag_uart_link::analysis::run::run(args),
    }
}
