use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::BufReader;
use tracing::{info, warn};

use nxdn_gps::capture::{self, CaptureEvent};
use nxdn_gps::config::GatewayConfig;
use nxdn_gps::nmea::{self, NXDN_DATA_TYPE_GPS};
use nxdn_gps::report::format_position_report;
use nxdn_gps::{AprsIsWriter, AprsWriter, FrameReassembler, LogWriter};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(
    name = "nxdn-gps",
    version = nxdn_gps::aprs_writer::software_version(),
    about = "Publish GPS reports received over NXDN to APRS-IS"
)]
struct Cli {
    /// Gateway configuration file
    #[arg(long, short, default_value = "nxdn-gps.toml")]
    config: PathBuf,

    /// Serve Prometheus metrics on this port
    #[arg(long)]
    metrics_port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a capture of NXDN data traffic through the gateway
    Replay {
        /// Capture file (stdin when omitted)
        #[arg(long, short)]
        input: Option<PathBuf>,

        /// Log reports instead of sending them to APRS-IS
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Milliseconds of clock applied between events
        #[arg(long, default_value_t = 100)]
        tick_ms: u32,
    },
    /// Validate one NMEA sentence and print the report it would produce
    CheckSentence {
        sentence: String,

        /// Source callsign used in the report
        #[arg(long, default_value = "N0CALL")]
        source: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    nxdn_gps::log_format::init_tracing(std::io::stderr().is_terminal());

    let cli = Cli::parse();

    let mut config = GatewayConfig::load(&cli.config)?;
    config.apply_env();

    if let Some(port) = cli.metrics_port {
        nxdn_gps::metrics::initialize_gateway_metrics();
        nxdn_gps::metrics::start_metrics_server(port)?;
    }

    match cli.command {
        Commands::Replay {
            input,
            dry_run,
            tick_ms,
        } => handle_replay(&config, input, dry_run, tick_ms).await,
        Commands::CheckSentence { sentence, source } => {
            handle_check_sentence(&config, &sentence, &source)
        }
    }
}

async fn handle_replay(
    config: &GatewayConfig,
    input: Option<PathBuf>,
    dry_run: bool,
    tick_ms: u32,
) -> Result<()> {
    let events = match &input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open capture {:?}", path))?;
            capture::read_events(BufReader::new(file)).await?
        }
        None => capture::read_events(BufReader::new(tokio::io::stdin())).await?,
    };
    info!("Loaded {} capture events", events.len());

    if dry_run {
        let reassembler = FrameReassembler::new(config.aprs.callsign.clone(), LogWriter::default());
        run_events(reassembler, config, &events, tick_ms).await?;
    } else {
        let writer = AprsIsWriter::new(config.aprs_is_config());
        let reassembler = FrameReassembler::new(config.aprs.callsign.clone(), writer);
        let mut writer = run_events(reassembler, config, &events, tick_ms).await?;
        writer.shutdown(SHUTDOWN_GRACE).await;
    }

    Ok(())
}

async fn run_events<W: AprsWriter>(
    mut reassembler: FrameReassembler<W>,
    config: &GatewayConfig,
    events: &[CaptureEvent],
    tick_ms: u32,
) -> Result<W> {
    reassembler.set_info(config.station_info());
    reassembler
        .open()
        .context("Failed to open the APRS writer")?;

    let mut ticker = tokio::time::interval(Duration::from_millis(u64::from(tick_ms.max(1))));
    for event in events {
        ticker.tick().await;
        reassembler.tick(tick_ms);
        event.apply(&mut reassembler);
    }

    if reassembler.buffered_len() > 0 {
        warn!(
            "Capture ended mid-transmission from {}, discarding {} bytes",
            reassembler.source(),
            reassembler.buffered_len()
        );
        reassembler.abort();
    }

    reassembler.close();
    Ok(reassembler.into_writer())
}

fn handle_check_sentence(config: &GatewayConfig, sentence: &str, source: &str) -> Result<()> {
    let mut buffer = Vec::with_capacity(sentence.len() + 1);
    buffer.push(NXDN_DATA_TYPE_GPS);
    buffer.extend_from_slice(sentence.as_bytes());

    match nmea::validate(&buffer) {
        Ok(fix) => {
            println!("{}", format_position_report(source, &config.aprs.callsign, &fix));
            Ok(())
        }
        Err(rejection) => anyhow::bail!("Sentence rejected: {}", rejection),
    }
}
