use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, error, info, trace, warn};

// Queue size for outgoing APRS lines
const LINE_QUEUE_SIZE: usize = 100;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);

// Station beacon cadence
const BEACON_INTERVAL_MS: u64 = 20 * 60 * 1000;

const SOFTWARE_NAME: &str = "NXDNGateway-rs";

/// Build version, falling back to the Cargo version outside a git checkout
pub fn software_version() -> &'static str {
    option_env!("VERGEN_GIT_DESCRIBE")
        .filter(|v| !v.starts_with("VERGEN"))
        .unwrap_or(env!("CARGO_PKG_VERSION"))
}

/// Destination for formatted APRS lines
///
/// `set_info` is called once at setup; `clock` is driven periodically by the
/// owner with the milliseconds elapsed since the previous call.
pub trait AprsWriter {
    fn set_info(&mut self, info: StationInfo);
    fn open(&mut self) -> Result<()>;
    fn write(&mut self, line: &str);
    fn clock(&mut self, ms: u32);
    fn close(&mut self);
}

/// Gateway station metadata used for the periodic station beacon
#[derive(Debug, Clone, PartialEq)]
pub struct StationInfo {
    /// Transmit frequency in Hz
    pub tx_frequency: u32,
    /// Receive frequency in Hz
    pub rx_frequency: u32,
    /// Decimal degrees, north positive
    pub latitude: f32,
    /// Decimal degrees, east positive
    pub longitude: f32,
    /// Antenna height in metres
    pub height: i32,
    pub description: String,
}

/// Result type for connection attempts
enum ConnectionResult {
    /// The line queue was closed, the writer is shutting down
    Closed,
    /// Connection failed immediately (couldn't establish connection)
    ConnectionFailed(anyhow::Error),
    /// Connection was established but failed during operation
    OperationFailed(anyhow::Error),
}

/// Configuration for the APRS-IS writer
#[derive(Debug, Clone)]
pub struct AprsIsConfig {
    /// APRS-IS server hostname
    pub server: String,
    /// APRS-IS server port
    pub port: u16,
    /// Gateway callsign
    pub callsign: String,
    /// SSID-style suffix appended to the login callsign (optional)
    pub suffix: String,
    /// APRS-IS passcode; without one the server treats the connection as receive-only
    pub password: Option<String>,
    /// Initial delay between reconnection attempts in seconds (will use exponential backoff)
    pub retry_delay_seconds: u64,
    /// Maximum delay between reconnection attempts in seconds (cap for exponential backoff)
    pub max_retry_delay_seconds: u64,
}

impl Default for AprsIsConfig {
    fn default() -> Self {
        Self {
            server: "euro.aprs2.net".to_string(),
            port: 14580,
            callsign: "N0CALL".to_string(),
            suffix: "N".to_string(),
            password: None,
            retry_delay_seconds: 1,
            max_retry_delay_seconds: 60,
        }
    }
}

impl AprsIsConfig {
    /// Callsign used for login and as the beacon source
    pub fn login_callsign(&self) -> String {
        if self.suffix.is_empty() {
            self.callsign.clone()
        } else {
            format!("{}-{}", self.callsign, self.suffix)
        }
    }
}

/// APRS-IS writer that forwards lines to a server over TCP
///
/// The socket is owned by a background Tokio task; lines are queued through a
/// bounded channel so `write` never blocks the caller.
pub struct AprsIsWriter {
    config: AprsIsConfig,
    station: Option<StationInfo>,
    line_tx: Option<flume::Sender<String>>,
    task: Option<tokio::task::JoinHandle<()>>,
    beacon_elapsed_ms: u64,
}

impl AprsIsWriter {
    pub fn new(config: AprsIsConfig) -> Self {
        Self {
            config,
            station: None,
            line_tx: None,
            task: None,
            beacon_elapsed_ms: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.line_tx.is_some()
    }

    /// Close the queue and wait for queued lines to be flushed
    pub async fn shutdown(&mut self, grace: Duration) {
        self.close();

        if let Some(task) = self.task.take() {
            let abort = task.abort_handle();
            if tokio::time::timeout(grace, task).await.is_err() {
                warn!(
                    "APRS-IS writer did not finish within {:?}, aborting",
                    grace
                );
                abort.abort();
            }
        }
    }

    fn queue(&self, line: String) {
        let Some(line_tx) = &self.line_tx else {
            warn!("APRS-IS writer is not open, dropping: {}", line);
            metrics::counter!("aprs.writer.dropped_total", "reason" => "closed").increment(1);
            return;
        };

        match line_tx.try_send(line) {
            Ok(()) => {
                metrics::counter!("aprs.writer.queued_total").increment(1);
            }
            Err(flume::TrySendError::Full(line)) => {
                warn!("APRS line queue full, dropping: {}", line);
                metrics::counter!("aprs.writer.dropped_total", "reason" => "queue_full")
                    .increment(1);
            }
            Err(flume::TrySendError::Disconnected(line)) => {
                warn!("APRS connection task has stopped, dropping: {}", line);
                metrics::counter!("aprs.writer.dropped_total", "reason" => "disconnected")
                    .increment(1);
            }
        }
    }

    fn send_beacon(&self) {
        if let Some(station) = &self.station {
            let beacon = build_station_beacon(&self.config, station);
            debug!("Queueing station beacon: {}", beacon);
            self.queue(beacon);
        }
    }

    /// Connection management loop, runs until the line queue is closed
    #[tracing::instrument(skip_all, fields(server = %config.server, port = %config.port))]
    async fn run(config: AprsIsConfig, line_rx: flume::Receiver<String>) {
        let mut retry_count = 0;
        let mut current_delay = config.retry_delay_seconds;

        loop {
            if retry_count == 0 {
                info!(
                    "Connecting to APRS-IS server at {}:{}",
                    config.server, config.port
                );
            } else {
                info!(
                    "Reconnecting to APRS-IS server at {}:{} (retry attempt {})",
                    config.server, config.port, retry_count
                );
            }

            match Self::connect_and_run(&config, &line_rx).await {
                ConnectionResult::Closed => {
                    info!("APRS line queue closed, writer exiting");
                    break;
                }
                ConnectionResult::ConnectionFailed(e) => {
                    error!("APRS-IS connection failed: {}", e);
                    retry_count += 1;
                    metrics::counter!("aprs.connection.failed_total").increment(1);
                }
                ConnectionResult::OperationFailed(e) => {
                    error!("APRS-IS operation failed: {}", e);
                    retry_count = 0;
                    current_delay = config.retry_delay_seconds;
                    metrics::counter!("aprs.connection.operation_failed_total").increment(1);
                }
            }
            metrics::gauge!("aprs.connection.connected").set(0.0);

            if line_rx.is_disconnected() && line_rx.is_empty() {
                info!("APRS line queue closed while disconnected, writer exiting");
                break;
            }

            if current_delay > 0 {
                info!("Waiting {} seconds before retry", current_delay);
                tokio::time::sleep(Duration::from_secs(current_delay)).await;
            }
            current_delay = (current_delay * 2).clamp(1, config.max_retry_delay_seconds.max(1));
        }
    }

    async fn connect_and_run(
        config: &AprsIsConfig,
        line_rx: &flume::Receiver<String>,
    ) -> ConnectionResult {
        let server_address = format!("{}:{}", config.server, config.port);
        let socket_addrs = match tokio::net::lookup_host(&server_address).await {
            Ok(addrs) => {
                let all_addrs: Vec<_> = addrs.collect();
                if all_addrs.is_empty() {
                    return ConnectionResult::ConnectionFailed(anyhow::anyhow!(
                        "DNS resolution returned no addresses for {}",
                        server_address
                    ));
                }

                let ipv4_addrs: Vec<_> = all_addrs
                    .iter()
                    .filter(|addr| addr.is_ipv4())
                    .cloned()
                    .collect();

                if ipv4_addrs.is_empty() {
                    debug!(
                        "No IPv4 addresses found for {}, falling back to all addresses",
                        server_address
                    );
                    all_addrs
                } else {
                    ipv4_addrs
                }
            }
            Err(e) => {
                return ConnectionResult::ConnectionFailed(anyhow::anyhow!(
                    "DNS resolution failed for {}: {}",
                    server_address,
                    e
                ));
            }
        };

        // Spread load across the rotation
        let mut shuffled_addrs = socket_addrs;
        {
            use rand::seq::SliceRandom;
            let mut rng = rand::rng();
            shuffled_addrs.shuffle(&mut rng);
        }

        let mut last_error = None;
        for addr in &shuffled_addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    info!("Connected to APRS-IS server at {}", addr);
                    metrics::counter!("aprs.connection.established_total").increment(1);
                    metrics::gauge!("aprs.connection.connected").set(1.0);

                    return Self::process_connection(stream, config, line_rx).await;
                }
                Err(e) => {
                    warn!("Failed to connect to {}: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        ConnectionResult::ConnectionFailed(anyhow::anyhow!(
            "Failed to connect to any resolved address for {}: {:?}",
            server_address,
            last_error
        ))
    }

    /// Log in, then forward queued lines until the queue closes or the socket fails
    async fn process_connection(
        stream: TcpStream,
        config: &AprsIsConfig,
        line_rx: &flume::Receiver<String>,
    ) -> ConnectionResult {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let login_cmd = build_login_command(config);
        info!("Sending login command for {}", config.login_callsign());
        if let Err(e) = send(&mut writer, &login_cmd).await {
            return ConnectionResult::OperationFailed(e.context("Failed to send login command"));
        }

        let mut keepalive = tokio::time::interval_at(
            tokio::time::Instant::now() + KEEPALIVE_INTERVAL,
            KEEPALIVE_INTERVAL,
        );
        let mut line_buffer = Vec::new();

        loop {
            tokio::select! {
                queued = line_rx.recv_async() => {
                    let Ok(line) = queued else {
                        let _ = writer.shutdown().await;
                        return ConnectionResult::Closed;
                    };

                    if let Err(e) = send(&mut writer, &format!("{}\r\n", line)).await {
                        warn!("Lost APRS line on failed connection: {}", line);
                        return ConnectionResult::OperationFailed(e);
                    }
                    debug!("Sent to APRS-IS: {}", line);
                    metrics::counter!("aprs.writer.sent_total").increment(1);
                    keepalive.reset();
                }
                read = reader.read_until(b'\n', &mut line_buffer) => {
                    match read {
                        Ok(0) => {
                            return ConnectionResult::OperationFailed(anyhow::anyhow!(
                                "APRS-IS connection closed by server"
                            ));
                        }
                        Ok(_) => {
                            let line = String::from_utf8_lossy(&line_buffer);
                            let trimmed = line.trim();
                            if trimmed.starts_with("# logresp") {
                                info!("{}", trimmed);
                            } else {
                                trace!("Received: {}", trimmed);
                            }
                            line_buffer.clear();
                        }
                        Err(e) => {
                            return ConnectionResult::OperationFailed(anyhow::anyhow!(
                                "Connection error: {}",
                                e
                            ));
                        }
                    }
                }
                _ = keepalive.tick() => {
                    if let Err(e) = send(&mut writer, "# nxdn-gps keepalive\r\n").await {
                        return ConnectionResult::OperationFailed(
                            e.context("Failed to send keepalive"),
                        );
                    }
                    trace!("Sent keepalive to APRS-IS server");
                    metrics::counter!("aprs.keepalive.sent_total").increment(1);
                }
            }
        }
    }
}

async fn send(writer: &mut tokio::net::tcp::OwnedWriteHalf, text: &str) -> Result<()> {
    writer
        .write_all(text.as_bytes())
        .await
        .context("Failed to write to APRS-IS socket")?;
    writer.flush().await.context("Failed to flush APRS-IS socket")?;
    Ok(())
}

impl AprsWriter for AprsIsWriter {
    fn set_info(&mut self, info: StationInfo) {
        self.station = Some(info);
    }

    fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .context("APRS-IS writer must be opened inside a Tokio runtime")?;

        if self.config.password.is_none() {
            warn!("No APRS-IS password configured, the server will not accept reports");
        }

        let (line_tx, line_rx) = flume::bounded::<String>(LINE_QUEUE_SIZE);
        self.task = Some(runtime.spawn(Self::run(self.config.clone(), line_rx)));
        self.line_tx = Some(line_tx);
        self.beacon_elapsed_ms = 0;

        self.send_beacon();
        Ok(())
    }

    fn write(&mut self, line: &str) {
        debug!("APRS ==> {}", line);
        self.queue(line.to_string());
    }

    fn clock(&mut self, ms: u32) {
        if !self.is_open() {
            return;
        }

        self.beacon_elapsed_ms += u64::from(ms);
        if self.beacon_elapsed_ms >= BEACON_INTERVAL_MS {
            self.beacon_elapsed_ms = 0;
            self.send_beacon();
        }
    }

    fn close(&mut self) {
        // Dropping the sender lets the task drain the queue and exit
        if self.line_tx.take().is_some() {
            info!("Closing APRS-IS writer");
        }
    }
}

/// Writer for dry runs: every line goes to the log
#[derive(Debug, Default)]
pub struct LogWriter {
    written: u64,
}

impl LogWriter {
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl AprsWriter for LogWriter {
    fn set_info(&mut self, info: StationInfo) {
        debug!("Station info: {:?}", info);
    }

    fn open(&mut self) -> Result<()> {
        info!("Dry run, APRS reports are logged and not sent");
        Ok(())
    }

    fn write(&mut self, line: &str) {
        self.written += 1;
        info!("APRS report: {}", line);
    }

    fn clock(&mut self, _ms: u32) {}

    fn close(&mut self) {
        info!("{} APRS report(s) logged", self.written);
    }
}

/// Build the login command for APRS-IS authentication
fn build_login_command(config: &AprsIsConfig) -> String {
    let mut login_cmd = format!("user {} pass ", config.login_callsign());

    // -1 is the receive-only passcode
    match &config.password {
        Some(pass) => login_cmd.push_str(pass),
        None => login_cmd.push_str("-1"),
    }

    login_cmd.push_str(&format!(" vers {} {}", SOFTWARE_NAME, software_version()));
    login_cmd.push_str("\r\n");
    login_cmd
}

/// Station beacon for an NXDN gateway, with the D/& gateway symbol
fn build_station_beacon(config: &AprsIsConfig, station: &StationInfo) -> String {
    let callsign = config.login_callsign();
    let mut beacon = format!(
        "{}>APDG03,TCPIP*:!{}D{}&",
        callsign,
        format_latitude(station.latitude),
        format_longitude(station.longitude)
    );

    if station.height != 0 {
        let feet = (f64::from(station.height) * 3.28084).round() as i64;
        let _ = write!(beacon, "/A={:06} ", feet);
    }

    if station.tx_frequency != 0 {
        let tx_mhz = f64::from(station.tx_frequency) / 1_000_000.0;
        let offset_mhz =
            (f64::from(station.rx_frequency) - f64::from(station.tx_frequency)) / 1_000_000.0;
        let _ = write!(beacon, "{:.4}MHz {:+.4}MHz ", tx_mhz, offset_mhz);
    }

    beacon.push_str("NXDN");
    if !station.description.is_empty() {
        beacon.push(' ');
        beacon.push_str(&station.description);
    }
    beacon
}

/// Split decimal degrees into whole degrees and minutes rounded to hundredths
fn degrees_minutes(value: f32) -> (u32, f64) {
    let hundredths = (f64::from(value).abs() * 6000.0).round() as u32;
    (hundredths / 6000, f64::from(hundredths % 6000) / 100.0)
}

/// Decimal degrees as APRS `DDMM.MMN`
fn format_latitude(latitude: f32) -> String {
    let (degrees, minutes) = degrees_minutes(latitude);
    let hemisphere = if latitude < 0.0 { 'S' } else { 'N' };
    format!("{:02}{:05.2}{}", degrees, minutes, hemisphere)
}

/// Decimal degrees as APRS `DDDMM.MME`
fn format_longitude(longitude: f32) -> String {
    let (degrees, minutes) = degrees_minutes(longitude);
    let hemisphere = if longitude < 0.0 { 'W' } else { 'E' };
    format!("{:03}{:05.2}{}", degrees, minutes, hemisphere)
}

/// Builder pattern for creating APRS-IS writer configurations
pub struct AprsIsConfigBuilder {
    config: AprsIsConfig,
}

impl AprsIsConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AprsIsConfig::default(),
        }
    }

    pub fn server<S: Into<String>>(mut self, server: S) -> Self {
        self.config.server = server.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn callsign<S: Into<String>>(mut self, callsign: S) -> Self {
        self.config.callsign = callsign.into();
        self
    }

    pub fn suffix<S: Into<String>>(mut self, suffix: S) -> Self {
        self.config.suffix = suffix.into();
        self
    }

    pub fn password<S: Into<String>>(mut self, password: Option<S>) -> Self {
        self.config.password = password.map(|p| p.into());
        self
    }

    pub fn retry_delay_seconds(mut self, seconds: u64) -> Self {
        self.config.retry_delay_seconds = seconds;
        self
    }

    pub fn max_retry_delay_seconds(mut self, seconds: u64) -> Self {
        self.config.max_retry_delay_seconds = seconds;
        self
    }

    pub fn build(self) -> AprsIsConfig {
        self.config
    }
}

impl Default for AprsIsConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn station() -> StationInfo {
        StationInfo {
            tx_frequency: 439_500_000,
            rx_frequency: 430_100_000,
            latitude: 51.5,
            longitude: -0.125,
            height: 30,
            description: "London".to_string(),
        }
    }

    #[test]
    fn test_config_builder() {
        let config = AprsIsConfigBuilder::new()
            .server("test.aprs.net")
            .port(14580)
            .callsign("G4KLX")
            .suffix("N")
            .password(Some("12345"))
            .retry_delay_seconds(10)
            .build();

        assert_eq!(config.server, "test.aprs.net");
        assert_eq!(config.port, 14580);
        assert_eq!(config.login_callsign(), "G4KLX-N");
        assert_eq!(config.password, Some("12345".to_string()));
        assert_eq!(config.retry_delay_seconds, 10);
    }

    #[test]
    fn test_login_command_with_password() {
        let config = AprsIsConfigBuilder::new()
            .callsign("G4KLX")
            .suffix("N")
            .password(Some("12345"))
            .build();

        let login_cmd = build_login_command(&config);
        assert_eq!(
            login_cmd,
            format!(
                "user G4KLX-N pass 12345 vers NXDNGateway-rs {}\r\n",
                software_version()
            )
        );
    }

    #[test]
    fn test_login_command_without_password_or_suffix() {
        let config = AprsIsConfigBuilder::new()
            .callsign("G4KLX")
            .suffix("")
            .password(None::<String>)
            .build();

        let login_cmd = build_login_command(&config);
        assert!(login_cmd.starts_with("user G4KLX pass -1 vers "));
        assert!(login_cmd.ends_with("\r\n"));
    }

    #[test]
    fn test_coordinate_formatting() {
        assert_eq!(format_latitude(51.5), "5130.00N");
        assert_eq!(format_latitude(-33.8688), "3352.13S");
        assert_eq!(format_longitude(-0.125), "00007.50W");
        assert_eq!(format_longitude(151.2093), "15112.56E");
        // Rounds up into the next degree rather than printing 60 minutes
        assert_eq!(format_latitude(9.99999), "1000.00N");
    }

    #[test]
    fn test_station_beacon() {
        let config = AprsIsConfigBuilder::new().callsign("G4KLX").suffix("N").build();
        let beacon = build_station_beacon(&config, &station());
        assert_eq!(
            beacon,
            "G4KLX-N>APDG03,TCPIP*:!5130.00ND00007.50W&/A=000098 439.5000MHz -9.4000MHz NXDN London"
        );
    }

    #[test]
    fn test_station_beacon_minimal() {
        let config = AprsIsConfigBuilder::new().callsign("G4KLX").suffix("").build();
        let info = StationInfo {
            tx_frequency: 0,
            rx_frequency: 0,
            latitude: 0.0,
            longitude: 0.0,
            height: 0,
            description: String::new(),
        };
        assert_eq!(
            build_station_beacon(&config, &info),
            "G4KLX>APDG03,TCPIP*:!0000.00ND00000.00E&NXDN"
        );
    }

    #[test]
    fn test_station_beacon_altitude_without_frequency() {
        let config = AprsIsConfigBuilder::new().callsign("G4KLX").suffix("N").build();
        let info = StationInfo {
            tx_frequency: 0,
            ..station()
        };
        let beacon = build_station_beacon(&config, &info);
        assert_eq!(
            beacon,
            "G4KLX-N>APDG03,TCPIP*:!5130.00ND00007.50W&/A=000098 NXDN London"
        );
        assert!(!beacon.contains(",qA"));
    }

    #[test]
    fn test_open_requires_runtime() {
        let mut writer = AprsIsWriter::new(AprsIsConfig::default());
        assert!(writer.open().is_err());
        assert!(!writer.is_open());
    }

    #[test]
    fn test_log_writer_counts() {
        let mut writer = LogWriter::default();
        writer.open().unwrap();
        writer.write("A-Y>APDPRS,NXDN*,qAR,B:!1N/2E via MMDVM");
        writer.write("C-Y>APDPRS,NXDN*,qAR,B:!1N/2E via MMDVM");
        writer.close();
        assert_eq!(writer.written(), 2);
    }

    #[tokio::test]
    async fn test_writer_logs_in_and_forwards_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(stream);
            let mut lines = Vec::new();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap() == 0 {
                    break;
                }
                lines.push(line);
            }
            lines
        });

        let config = AprsIsConfigBuilder::new()
            .server("127.0.0.1")
            .port(port)
            .callsign("G4KLX")
            .suffix("N")
            .password(Some("12345"))
            .build();

        let mut writer = AprsIsWriter::new(config);
        writer.set_info(station());
        writer.open().unwrap();
        writer.write("ABC123-Y>APDPRS,NXDN*,qAR,G4KLX:!4807.038N/01131.000E via MMDVM");
        writer.shutdown(Duration::from_secs(5)).await;

        let lines = server.await.unwrap();
        assert_eq!(lines.len(), 3, "{:?}", lines);
        assert!(lines[0].starts_with("user G4KLX-N pass 12345 vers NXDNGateway-rs "));
        assert!(lines[1].starts_with("G4KLX-N>APDG03,TCPIP*:!5130.00N"));
        assert_eq!(
            lines[2],
            "ABC123-Y>APDPRS,NXDN*,qAR,G4KLX:!4807.038N/01131.000E via MMDVM\r\n"
        );
    }

    #[tokio::test]
    async fn test_clock_sends_beacon_after_interval() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(stream);
            let mut lines = Vec::new();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap() == 0 {
                    break;
                }
                lines.push(line);
            }
            lines
        });

        let config = AprsIsConfigBuilder::new()
            .server("127.0.0.1")
            .port(port)
            .callsign("G4KLX")
            .build();

        let mut writer = AprsIsWriter::new(config);
        writer.set_info(station());
        writer.open().unwrap();
        // Half an interval, then the rest
        writer.clock(10 * 60 * 1000);
        writer.clock(10 * 60 * 1000);
        writer.shutdown(Duration::from_secs(5)).await;

        let lines = server.await.unwrap();
        let beacons = lines.iter().filter(|l| l.contains(">APDG03,")).count();
        assert_eq!(beacons, 2, "{:?}", lines);
    }
}
