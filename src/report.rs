//! APRS position report built from a validated RMC fix.

use crate::nmea::RmcFix;
use std::fmt::Write;

const REPORT_PATH: &str = "-Y>APDPRS,NXDN*,qAR,";
const REPORT_TRAILER: &str = " via MMDVM";
// "r" + 3 digits + "/" + 3 digits, wider if a value overflows three digits
const VELOCITY_CLAUSE_HINT: usize = 8;

/// Format the APRS line for a fix heard from `source`, gated by `callsign`.
///
/// ```text
/// ABC123-Y>APDPRS,NXDN*,qAR,W1AW:!4807.038N/01131.000Er084/022 via MMDVM
/// ```
pub fn format_position_report(source: &str, callsign: &str, fix: &RmcFix<'_>) -> String {
    let capacity = source.len()
        + REPORT_PATH.len()
        + callsign.len()
        + 2 // ":!"
        + fix.latitude.len()
        + fix.lat_hemisphere.len()
        + 1 // "/"
        + fix.longitude.len()
        + fix.lon_hemisphere.len()
        + VELOCITY_CLAUSE_HINT
        + REPORT_TRAILER.len();

    let mut report = String::with_capacity(capacity);
    report.push_str(source);
    report.push_str(REPORT_PATH);
    report.push_str(callsign);
    report.push_str(":!");
    report.push_str(fix.latitude);
    report.push_str(fix.lat_hemisphere);
    report.push('/');
    report.push_str(fix.longitude);
    report.push_str(fix.lon_hemisphere);

    if let Some(velocity) = fix.velocity {
        // Writing into a String cannot fail
        let _ = write!(report, "r{:03}/{:03}", velocity.bearing, velocity.speed);
    }

    report.push_str(REPORT_TRAILER);
    report
}
