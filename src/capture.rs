//! Text capture of NXDN data traffic, replayed into a [`FrameReassembler`].
//!
//! One event per line:
//!
//! ```text
//! # comment
//! H ABC123                                      header from ABC123
//! D 0106244750524d432c3132333435362c412c343830  data block, 21 bytes as hex
//! E                                             end of transmission
//! T 500                                         500 ms elapsed
//! ```

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::aprs_writer::AprsWriter;
use crate::reassembler::{FrameReassembler, NXDN_DATA_BLOCK_LENGTH};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    Header(String),
    Data(Vec<u8>),
    End,
    Tick(u32),
}

impl CaptureEvent {
    pub fn apply<W: AprsWriter>(&self, reassembler: &mut FrameReassembler<W>) {
        match self {
            CaptureEvent::Header(source) => reassembler.start(source),
            CaptureEvent::Data(block) => reassembler.append(block),
            CaptureEvent::End => reassembler.abort(),
            CaptureEvent::Tick(ms) => reassembler.tick(*ms),
        }
    }
}

/// Parse one capture line; blank lines and comments yield `None`
pub fn parse_line(line: &str) -> Result<Option<CaptureEvent>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (kind, rest) = match line.split_once(char::is_whitespace) {
        Some((kind, rest)) => (kind, rest.trim()),
        None => (line, ""),
    };

    let event = match kind {
        "H" => {
            if rest.is_empty() {
                bail!("header without a source");
            }
            CaptureEvent::Header(rest.to_string())
        }
        "D" => {
            let block = hex::decode(rest).with_context(|| format!("invalid hex block {:?}", rest))?;
            if block.len() != NXDN_DATA_BLOCK_LENGTH {
                bail!(
                    "data block is {} bytes, expected {}",
                    block.len(),
                    NXDN_DATA_BLOCK_LENGTH
                );
            }
            CaptureEvent::Data(block)
        }
        "E" => CaptureEvent::End,
        "T" => CaptureEvent::Tick(
            rest.parse()
                .with_context(|| format!("invalid tick {:?}", rest))?,
        ),
        other => bail!("unknown capture event {:?}", other),
    };

    Ok(Some(event))
}

/// Read every event from a capture stream
pub async fn read_events<R: AsyncBufRead + Unpin>(reader: R) -> Result<Vec<CaptureEvent>> {
    let mut lines = reader.lines();
    let mut events = Vec::new();
    let mut line_number = 0;

    while let Some(line) = lines.next_line().await.context("Failed to read capture")? {
        line_number += 1;
        if let Some(event) =
            parse_line(&line).with_context(|| format!("capture line {}", line_number))?
        {
            events.push(event);
        }
    }

    Ok(events)
}
