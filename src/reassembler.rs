//! Reassembly of NXDN GPS data transmissions.
//!
//! A transmission is a header naming the source, then a run of data blocks.
//! Each block is one control byte followed by [`NXDN_DATA_LENGTH`] payload
//! bytes; a control byte of [`NXDN_DATA_FINAL_BLOCK`] ends the transmission.

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::aprs_writer::{AprsWriter, StationInfo};
use crate::nmea::{self, Rejection};
use crate::report::format_position_report;

/// Payload bytes carried by one data block
pub const NXDN_DATA_LENGTH: usize = 20;
/// A data block on the wire: control byte plus payload
pub const NXDN_DATA_BLOCK_LENGTH: usize = NXDN_DATA_LENGTH + 1;
/// Largest transmission the reassembler accepts
pub const NXDN_DATA_MAX_LENGTH: usize = 16 * NXDN_DATA_LENGTH;
/// Control byte marking the last block of a transmission
pub const NXDN_DATA_FINAL_BLOCK: u8 = 0x00;

/// Collects data blocks into a GPS payload and publishes valid fixes
///
/// Not thread-safe; callers serialize access per instance.
pub struct FrameReassembler<W: AprsWriter> {
    callsign: String,
    writer: W,
    data: Vec<u8>,
    source: String,
}

impl<W: AprsWriter> FrameReassembler<W> {
    pub fn new<S: Into<String>>(callsign: S, writer: W) -> Self {
        Self {
            callsign: callsign.into(),
            writer,
            data: Vec::with_capacity(NXDN_DATA_MAX_LENGTH),
            source: String::new(),
        }
    }

    pub fn open(&mut self) -> Result<()> {
        self.writer.open()
    }

    pub fn set_info(&mut self, info: StationInfo) {
        self.writer.set_info(info);
    }

    /// Begin a transmission from `source`, discarding anything partial
    pub fn start(&mut self, source: &str) {
        if !self.data.is_empty() {
            debug!(
                "Discarding {} bytes of incomplete data from {}",
                self.data.len(),
                self.source
            );
            metrics::counter!("nxdn.gps.transmission.discarded_total").increment(1);
        }

        self.reset();
        self.source.push_str(source);
        debug!("Received Data header from {}", source);
    }

    /// Append one data block; the final block triggers validation and publishing
    pub fn append(&mut self, block: &[u8]) {
        if block.len() != NXDN_DATA_BLOCK_LENGTH {
            debug!(
                "Dropping data block of {} bytes (expected {})",
                block.len(),
                NXDN_DATA_BLOCK_LENGTH
            );
            metrics::counter!("nxdn.gps.block.dropped_total", "reason" => "bad_length")
                .increment(1);
            return;
        }

        debug!("Received Data block: {}", hex::encode(block));
        metrics::counter!("nxdn.gps.block.received_total").increment(1);

        if self.data.len() + NXDN_DATA_LENGTH > NXDN_DATA_MAX_LENGTH {
            warn!(
                "Data from {} exceeds {} bytes, abandoning transmission",
                self.source, NXDN_DATA_MAX_LENGTH
            );
            metrics::counter!("nxdn.gps.block.dropped_total", "reason" => "overflow")
                .increment(1);
            self.reset();
            return;
        }

        self.data.extend_from_slice(&block[1..]);

        if block[0] == NXDN_DATA_FINAL_BLOCK {
            self.process_nmea();
            self.reset();
        }
    }

    /// End of transmission without a final block
    pub fn abort(&mut self) {
        self.reset();
    }

    pub fn tick(&mut self, elapsed_ms: u32) {
        self.writer.clock(elapsed_ms);
    }

    pub fn close(&mut self) {
        self.writer.close();
    }

    /// Source of the transmission in progress, empty between transmissions
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn buffered_len(&self) -> usize {
        self.data.len()
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    fn reset(&mut self) {
        self.data.fill(0x00);
        self.data.clear();
        self.source.clear();
    }

    fn process_nmea(&mut self) {
        debug!(
            "Received complete Data from {}: {}",
            self.source,
            hex::encode(&self.data)
        );

        match nmea::validate(&self.data) {
            Ok(fix) => {
                let report = format_position_report(&self.source, &self.callsign, &fix);
                info!("Position report from {}", self.source);
                metrics::counter!("nxdn.gps.report.published_total").increment(1);
                self.writer.write(&report);
            }
            Err(rejection) => {
                if let Rejection::UnsupportedSentence(_) = rejection {
                    debug!(
                        "Unhandled NMEA sentence: {}",
                        hex::encode(nmea::sentence_bytes(&self.data))
                    );
                } else {
                    debug!("Dropping data from {}: {}", self.source, rejection);
                }
                metrics::counter!("nxdn.gps.rejected_total", "reason" => rejection.reason())
                    .increment(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nmea::{NXDN_DATA_TYPE_GPS, xor_checksum};

    #[derive(Default)]
    struct RecordingWriter {
        lines: Vec<String>,
        elapsed: Vec<u32>,
        info: Option<StationInfo>,
        opened: bool,
        closed: bool,
    }

    impl AprsWriter for RecordingWriter {
        fn set_info(&mut self, info: StationInfo) {
            self.info = Some(info);
        }

        fn open(&mut self) -> Result<()> {
            self.opened = true;
            Ok(())
        }

        fn write(&mut self, line: &str) {
            self.lines.push(line.to_string());
        }

        fn clock(&mut self, ms: u32) {
            self.elapsed.push(ms);
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    fn reassembler() -> FrameReassembler<RecordingWriter> {
        FrameReassembler::new("W1AW", RecordingWriter::default())
    }

    /// Split a tagged payload into blocks, the last one marked final
    fn blocks_for(payload: &[u8]) -> Vec<[u8; NXDN_DATA_BLOCK_LENGTH]> {
        let chunks: Vec<&[u8]> = payload.chunks(NXDN_DATA_LENGTH).collect();
        chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| {
                let mut block = [0u8; NXDN_DATA_BLOCK_LENGTH];
                block[0] = if index + 1 == chunks.len() {
                    NXDN_DATA_FINAL_BLOCK
                } else {
                    0x01
                };
                block[1..=chunk.len()].copy_from_slice(chunk);
                block
            })
            .collect()
    }

    fn gps_payload(body: &str) -> Vec<u8> {
        let mut payload = vec![NXDN_DATA_TYPE_GPS];
        payload.extend_from_slice(
            format!("${}*{:02X}\r\n", body, xor_checksum(body.as_bytes())).as_bytes(),
        );
        payload
    }

    const FULL_RMC: &str = "GPRMC,123456,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W";

    #[test]
    fn test_reassembles_and_publishes() {
        let mut r = reassembler();
        r.start("ABC123");
        for block in blocks_for(&gps_payload(FULL_RMC)) {
            r.append(&block);
        }

        assert_eq!(
            r.writer().lines,
            vec!["ABC123-Y>APDPRS,NXDN*,qAR,W1AW:!4807.038N/01131.000Er084/022 via MMDVM"]
        );
        assert_eq!(r.buffered_len(), 0);
        assert_eq!(r.source(), "");
    }

    #[test]
    fn test_partial_blocks_accumulate() {
        let mut r = reassembler();
        r.start("ABC123");
        let blocks = blocks_for(&gps_payload(FULL_RMC));
        r.append(&blocks[0]);
        r.append(&blocks[1]);

        assert_eq!(r.buffered_len(), 2 * NXDN_DATA_LENGTH);
        assert_eq!(r.source(), "ABC123");
        assert!(r.writer().lines.is_empty());
    }

    #[test]
    fn test_start_discards_partial_transmission() {
        let mut r = reassembler();
        let first = blocks_for(&gps_payload(FULL_RMC));
        r.start("FIRST");
        r.append(&first[0]);

        r.start("SECOND");
        assert_eq!(r.buffered_len(), 0);
        assert_eq!(r.source(), "SECOND");

        for block in blocks_for(&gps_payload(FULL_RMC)) {
            r.append(&block);
        }
        assert_eq!(r.writer().lines.len(), 1);
        assert!(r.writer().lines[0].starts_with("SECOND-Y>"));
    }

    #[test]
    fn test_abort_resets_without_publishing() {
        let mut r = reassembler();
        r.start("ABC123");
        let blocks = blocks_for(&gps_payload(FULL_RMC));
        for block in &blocks[..blocks.len() - 1] {
            r.append(block);
        }
        r.abort();

        assert_eq!(r.buffered_len(), 0);
        assert_eq!(r.source(), "");
        assert!(r.writer().lines.is_empty());
    }

    #[test]
    fn test_rejected_sentence_resets_state() {
        let mut r = reassembler();
        r.start("ABC123");
        let body = "GPRMC,123456,V,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W";
        for block in blocks_for(&gps_payload(body)) {
            r.append(&block);
        }

        assert!(r.writer().lines.is_empty());
        assert_eq!(r.buffered_len(), 0);
        assert_eq!(r.source(), "");
    }

    #[test]
    fn test_unsupported_sentence_never_written() {
        let mut r = reassembler();
        r.start("ABC123");
        let body = "GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,";
        for block in blocks_for(&gps_payload(body)) {
            r.append(&block);
        }
        assert!(r.writer().lines.is_empty());
    }

    #[test]
    fn test_wrong_length_block_ignored() {
        let mut r = reassembler();
        r.start("ABC123");
        r.append(&[0x01; 10]);
        r.append(&[0x00; NXDN_DATA_BLOCK_LENGTH + 1]);

        assert_eq!(r.buffered_len(), 0);
        assert_eq!(r.source(), "ABC123");
        assert!(r.writer().lines.is_empty());
    }

    #[test]
    fn test_overflow_abandons_transmission() {
        let mut r = reassembler();
        r.start("ABC123");

        let mut block = [0x41u8; NXDN_DATA_BLOCK_LENGTH];
        block[0] = 0x01;
        for _ in 0..(NXDN_DATA_MAX_LENGTH / NXDN_DATA_LENGTH) {
            r.append(&block);
        }
        assert_eq!(r.buffered_len(), NXDN_DATA_MAX_LENGTH);

        r.append(&block);
        assert_eq!(r.buffered_len(), 0);
        assert_eq!(r.source(), "");

        // A final block after the overflow is a fresh, headerless transmission
        block[0] = NXDN_DATA_FINAL_BLOCK;
        r.append(&block);
        assert!(r.writer().lines.is_empty());
        assert_eq!(r.buffered_len(), 0);
    }

    #[test]
    fn test_full_capacity_transmission_is_processed() {
        let mut r = reassembler();
        r.start("ABC123");

        // Pad the sentence with NULs up to the maximum
        let mut payload = gps_payload(FULL_RMC);
        payload.resize(NXDN_DATA_MAX_LENGTH, 0x00);
        let blocks = blocks_for(&payload);
        assert_eq!(blocks.len(), NXDN_DATA_MAX_LENGTH / NXDN_DATA_LENGTH);

        for block in &blocks {
            r.append(block);
        }
        assert_eq!(r.writer().lines.len(), 1);
    }

    #[test]
    fn test_tick_forwards_only_to_writer() {
        let mut r = reassembler();
        r.start("ABC123");
        let blocks = blocks_for(&gps_payload(FULL_RMC));
        r.append(&blocks[0]);

        r.tick(100);
        r.tick(250);

        assert_eq!(r.writer().elapsed, vec![100, 250]);
        assert_eq!(r.buffered_len(), NXDN_DATA_LENGTH);
        assert_eq!(r.source(), "ABC123");
    }

    #[test]
    fn test_lifecycle_forwarded() {
        let mut r = reassembler();
        r.set_info(StationInfo {
            tx_frequency: 439_500_000,
            rx_frequency: 430_100_000,
            latitude: 51.5,
            longitude: -0.1,
            height: 10,
            description: "Test".to_string(),
        });
        r.open().unwrap();
        r.close();

        let writer = r.into_writer();
        assert!(writer.opened);
        assert!(writer.closed);
        assert_eq!(writer.info.map(|i| i.tx_frequency), Some(439_500_000));
    }
}
