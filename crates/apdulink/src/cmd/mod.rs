use clap::{Args, Subcommand};
use std::path::PathBuf;

use apdulink_frame::DEFAULT_PACKET_SIZE;

use crate::exit::CliResult;
use crate::hex::{parse_status, parse_u8};
use crate::output::OutputFormat;

pub mod emulate;
pub mod send;
pub mod status;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one command to a socket device and print the response.
    Send(SendArgs),
    /// Run a device emulator that echoes each command payload.
    Emulate(EmulateArgs),
    /// Look up a status code.
    Status(StatusArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format).await,
        Command::Emulate(args) => emulate::run(args).await,
        Command::Status(args) => status::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path of the device.
    pub path: PathBuf,
    /// Class byte (e.g. 0xe0).
    #[arg(long, value_parser = parse_u8)]
    pub cla: u8,
    /// Instruction byte.
    #[arg(long, value_parser = parse_u8)]
    pub ins: u8,
    /// First parameter byte.
    #[arg(long, value_parser = parse_u8, default_value = "0")]
    pub p1: u8,
    /// Second parameter byte.
    #[arg(long, value_parser = parse_u8, default_value = "0")]
    pub p2: u8,
    /// Command payload as hex (at most 255 bytes).
    #[arg(long, value_name = "HEX")]
    pub data: Option<String>,
    /// Accepted status codes (comma-separated hex). Default: 9000.
    #[arg(long, value_delimiter = ',', value_parser = parse_status, value_name = "CODES")]
    pub allow: Vec<u16>,
    /// Maximum time to wait for the response (e.g. 5s, 500ms).
    #[arg(long, default_value = "30s")]
    pub timeout: String,
    /// Device packet size in bytes.
    #[arg(long, default_value_t = DEFAULT_PACKET_SIZE)]
    pub packet_size: usize,
}

#[derive(Args, Debug)]
pub struct EmulateArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Status code appended to every response.
    #[arg(long, value_parser = parse_status, default_value = "9000")]
    pub status: u16,
    /// Device packet size in bytes.
    #[arg(long, default_value_t = DEFAULT_PACKET_SIZE)]
    pub packet_size: usize,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Status code in hex (e.g. 6985).
    #[arg(value_parser = parse_status)]
    pub code: u16,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
