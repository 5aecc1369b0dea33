//! NXDN GPS gateway - reassembles GPS data transmissions heard on NXDN and
//! publishes them to APRS-IS as position reports.

pub mod aprs_writer;
pub mod capture;
pub mod config;
pub mod log_format;
pub mod metrics;
pub mod nmea;
pub mod reassembler;
pub mod report;

pub use aprs_writer::{
    AprsIsConfig, AprsIsConfigBuilder, AprsIsWriter, AprsWriter, LogWriter, StationInfo,
};
pub use nmea::{Rejection, RmcFix, Velocity};
pub use reassembler::FrameReassembler;
