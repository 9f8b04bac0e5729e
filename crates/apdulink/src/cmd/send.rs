use std::sync::Arc;
use std::time::Duration;

use apdulink_frame::StatusSet;
use apdulink_session::{Transport, TransportConfig};
use apdulink_transport::UnixFrameDevice;

use crate::cmd::SendArgs;
use crate::exit::{session_error, CliError, CliResult, SUCCESS, USAGE};
use crate::hex;
use crate::output::{print_response, OutputFormat};

pub async fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let payload = match &args.data {
        Some(data) => hex::decode(data)?,
        None => Vec::new(),
    };
    let allowed = allowed_statuses(&args.allow);

    let config = TransportConfig {
        packet_size: args.packet_size,
        response_timeout: Some(timeout),
        write_timeout: Some(timeout),
    };
    let device = Arc::new(UnixFrameDevice::new(&args.path, args.packet_size));
    let transport =
        Transport::new(device, config).map_err(|err| session_error("invalid configuration", err))?;

    let result = transport
        .send(args.cla, args.ins, args.p1, args.p2, payload, allowed)
        .await;
    if let Err(err) = transport.close().await {
        tracing::debug!(error = %err, "closing device failed");
    }

    let response = result.map_err(|err| session_error("exchange failed", err))?;
    print_response(&response, format);
    Ok(SUCCESS)
}

fn allowed_statuses(codes: &[u16]) -> StatusSet {
    if codes.is_empty() {
        StatusSet::default()
    } else {
        codes.iter().copied().collect()
    }
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
