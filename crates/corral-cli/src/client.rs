//! Control-socket client.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::io::AsyncReadExt;
use tokio::net::UnixStream;
use tracing::debug;

use corral_infra::config::Configuration;
use corral_infra::framing::{FrameBuffer, write_message};
use corral_shared::protocol::{BridgeMessage, CommandMsg, CommandResponseMsg};

/// Human-input commands can take a moment server-side; everything the CLI
/// waits on resolves well inside this.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect, submit one command, and block until the response whose
/// `requestId` matches ours.
pub async fn send_command(
    config: &Configuration,
    command: &str,
    session: Option<u64>,
    wait_for_response: bool,
) -> Result<CommandResponseMsg> {
    let mut stream = UnixStream::connect(&config.control_socket)
        .await
        .with_context(|| {
            format!(
                "cannot reach the daemon at {} (is `corral daemon` running?)",
                config.control_socket.display()
            )
        })?;

    let request_id = uuid::Uuid::new_v4().to_string();
    let message = BridgeMessage::Command(CommandMsg {
        message_id: None,
        request_id: Some(request_id.clone()),
        session_id: session,
        command: command.to_string(),
        wait_for_response,
        human: true,
    });
    write_message(&mut stream, &message).await?;
    debug!(request_id = %request_id, command, "command submitted");

    let mut buf = FrameBuffer::new();
    let mut bytes = [0u8; 16 * 1024];
    let deadline = tokio::time::Instant::now() + RESPONSE_TIMEOUT;

    loop {
        let n = tokio::select! {
            read = stream.read(&mut bytes) => match read {
                Ok(0) => bail!("daemon closed the connection before responding"),
                Ok(n) => n,
                Err(e) => return Err(e).context("control socket read failed"),
            },
            _ = tokio::time::sleep_until(deadline) => {
                bail!("no response from the daemon within {}s", RESPONSE_TIMEOUT.as_secs())
            }
        };

        for message in buf.push_messages(&bytes[..n]) {
            match message {
                Ok(BridgeMessage::CommandResponse(response))
                    if response.request_id.as_deref() == Some(&request_id) =>
                {
                    return Ok(response);
                }
                Ok(other) => debug!(r#type = other.type_name(), "skipping unrelated frame"),
                Err(e) => debug!(error = %e, "skipping malformed frame"),
            }
        }
    }
}
