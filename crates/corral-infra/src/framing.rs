//! Newline-delimited JSON framing for the duplex channels.
//!
//! A message is one UTF-8 JSON record terminated by `\n`. The receiver
//! buffers raw bytes and splits on the delimiter, preserving any trailing
//! partial chunk for the next read.

use anyhow::{Context, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use corral_shared::protocol::BridgeMessage;

#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete line it closes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            let text = text.trim_end_matches('\r');
            if !text.is_empty() {
                lines.push(text.to_string());
            }
        }
        lines
    }

    /// Parse each completed line into a message; unparseable lines surface as
    /// `Err` entries so the caller can log protocol errors without dropping
    /// the connection.
    pub fn push_messages(&mut self, chunk: &[u8]) -> Vec<Result<BridgeMessage>> {
        self.push(chunk)
            .into_iter()
            .map(|line| {
                serde_json::from_str::<BridgeMessage>(&line)
                    .with_context(|| format!("malformed message: {line}"))
            })
            .collect()
    }
}

/// Write one framed message and flush.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &BridgeMessage,
) -> Result<()> {
    let mut line = serde_json::to_string(message).context("failed to serialize message")?;
    line.push('\n');
    writer
        .write_all(line.as_bytes())
        .await
        .context("failed to write message")?;
    writer.flush().await.context("failed to flush channel")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_shared::protocol::{CommandMsg, MessageId};

    fn command(n: u64) -> BridgeMessage {
        BridgeMessage::Command(CommandMsg {
            message_id: Some(MessageId::Seq(n)),
            request_id: None,
            session_id: None,
            command: format!("cmd {n}"),
            wait_for_response: true,
            human: false,
        })
    }

    #[test]
    fn partial_lines_reassemble_across_pushes() {
        let mut buf = FrameBuffer::new();
        let line = serde_json::to_string(&command(1)).unwrap() + "\n";
        let (head, tail) = line.split_at(10);

        assert!(buf.push(head.as_bytes()).is_empty());
        let lines = buf.push(tail.as_bytes());
        assert_eq!(lines.len(), 1);
        let parsed: BridgeMessage = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(parsed, command(1));
    }

    #[test]
    fn multiple_frames_in_one_chunk() {
        let mut buf = FrameBuffer::new();
        let chunk = format!(
            "{}\n{}\n",
            serde_json::to_string(&command(1)).unwrap(),
            serde_json::to_string(&command(2)).unwrap()
        );
        let messages: Vec<BridgeMessage> = buf
            .push_messages(chunk.as_bytes())
            .into_iter()
            .map(|m| m.unwrap())
            .collect();
        assert_eq!(messages, vec![command(1), command(2)]);
    }

    #[test]
    fn malformed_line_is_an_error_entry_not_a_wipe() {
        let mut buf = FrameBuffer::new();
        let chunk = format!("not json\n{}\n", serde_json::to_string(&command(3)).unwrap());
        let results = buf.push_messages(chunk.as_bytes());
        assert_eq!(results.len(), 2);
        assert!(results[0].is_err());
        assert_eq!(*results[1].as_ref().unwrap(), command(3));
    }

    #[test]
    fn blank_lines_are_skipped() {
        let mut buf = FrameBuffer::new();
        assert!(buf.push(b"\n\r\n").is_empty());
    }
}
