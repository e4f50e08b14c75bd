use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, error};

use super::types::{AgentFrame, HostCommand, HostEvent, InboundFrame};

#[derive(Error, Debug)]
pub enum TransportError {
    /// A line that is not a valid frame. The stream itself is still usable.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Transport error: {0}")]
    Io(#[from] LinesCodecError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Newline-delimited JSON frames coming from the host.
pub struct FrameReader<R> {
    reader: FramedRead<BufReader<R>, LinesCodec>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            reader: FramedRead::new(BufReader::new(input), LinesCodec::new()),
        }
    }

    pub async fn read_frame(&mut self) -> Result<Option<InboundFrame>, TransportError> {
        match self.reader.next().await {
            Some(Ok(line)) => {
                debug!("Received: {}", line);
                parse_frame(&line).map(Some)
            }
            Some(Err(e)) => {
                error!("Error reading host frames: {}", e);
                Err(TransportError::Io(e))
            }
            None => {
                debug!("EOF reached");
                Ok(None)
            }
        }
    }
}

/// Newline-delimited JSON frames going to the host.
pub struct FrameWriter<W> {
    writer: FramedWrite<W, LinesCodec>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(output: W) -> Self {
        Self {
            writer: FramedWrite::new(output, LinesCodec::new()),
        }
    }

    pub async fn write_command(&mut self, command: &HostCommand) -> Result<(), TransportError> {
        let json = serde_json::to_string(command)?;
        debug!("Sending: {}", json);
        self.writer.send(json).await?;
        Ok(())
    }
}

pub fn stdio() -> (FrameReader<tokio::io::Stdin>, FrameWriter<tokio::io::Stdout>) {
    (
        FrameReader::new(tokio::io::stdin()),
        FrameWriter::new(tokio::io::stdout()),
    )
}

fn parse_frame(line: &str) -> Result<InboundFrame, TransportError> {
    let value: serde_json::Value = serde_json::from_str(line)
        .map_err(|e| TransportError::InvalidFrame(format!("Invalid JSON: {}", e)))?;

    let is_agent_request = value
        .as_object()
        .ok_or_else(|| TransportError::InvalidFrame("Frame is not an object".to_string()))?
        .get("type")
        .and_then(|t| t.as_str())
        == Some("agentRequest");

    if is_agent_request {
        serde_json::from_value::<AgentFrame>(value)
            .map(InboundFrame::Agent)
            .map_err(|e| TransportError::InvalidFrame(format!("Invalid agent request: {}", e)))
    } else {
        serde_json::from_value::<HostEvent>(value)
            .map(InboundFrame::Event)
            .map_err(|e| TransportError::InvalidFrame(format!("Invalid host event: {}", e)))
    }
}
