use apdulink_frame::{encode_response, status, Command, Frame, FrameConfig, MessageAssembler};
use apdulink_transport::{PacketStream, UnixFrameListener};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::cmd::EmulateArgs;
use crate::exit::{frame_error, transport_error, CliResult, SUCCESS};

pub async fn run(args: EmulateArgs) -> CliResult<i32> {
    FrameConfig {
        packet_size: args.packet_size,
    }
    .validate()
    .map_err(|err| frame_error("invalid packet size", err))?;

    let listener = UnixFrameListener::bind(&args.path, args.packet_size)
        .map_err(|err| transport_error("bind failed", err))?;
    info!(
        path = %args.path.display(),
        status = %status::describe(args.status),
        packet_size = args.packet_size,
        "emulator listening"
    );

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let stream = accepted.map_err(|err| transport_error("accept failed", err))?;
                debug!("host connected");
                tokio::spawn(serve(stream, args.status, args.packet_size));
            }
            _ = tokio::signal::ctrl_c() => {
                info!("emulator shutting down");
                break;
            }
        }
    }

    Ok(SUCCESS)
}

/// Answer every command on one connection until the host hangs up.
async fn serve(mut stream: PacketStream, reply_status: u16, packet_size: usize) {
    let mut assembler: Option<MessageAssembler> = None;

    while let Some(packet) = stream.next().await {
        let packet = match packet {
            Ok(packet) => packet,
            Err(err) => {
                warn!(error = %err, "read failed, dropping connection");
                return;
            }
        };
        let frame = match Frame::parse(packet) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "ignoring malformed packet");
                continue;
            }
        };

        let pending = assembler.get_or_insert_with(|| MessageAssembler::new(frame.channel()));
        let apdu = match pending.push(&frame) {
            Ok(None) => continue,
            Ok(Some(apdu)) => apdu,
            Err(err) => {
                warn!(error = %err, "discarding partial command");
                assembler = None;
                continue;
            }
        };
        let channel = pending.channel();
        assembler = None;

        let (data, code) = match Command::parse_apdu(&apdu) {
            Ok(command) => {
                info!(
                    channel,
                    cla = command.cla(),
                    ins = command.ins(),
                    len = command.payload().len(),
                    "answering command"
                );
                (command.payload().clone(), reply_status)
            }
            Err(err) => {
                warn!(channel, error = %err, "command is not a valid APDU");
                (Default::default(), status::INCORRECT_LENGTH)
            }
        };

        let frames = match encode_response(channel, &data, code, packet_size) {
            Ok(frames) => frames,
            Err(err) => {
                warn!(channel, error = %err, "cannot encode response");
                continue;
            }
        };
        for frame in frames {
            if let Err(err) = stream.send(frame).await {
                warn!(channel, error = %err, "write failed, dropping connection");
                return;
            }
        }
    }
    debug!("host disconnected");
}
