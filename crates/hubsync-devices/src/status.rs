//! Online/offline status derived from device report timestamps.

use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Format of the `reportAt` field, e.g. `2024-05-01T08:30:00.123Z`.
///
/// The fraction is mandatory and has 1 to 6 digits; see [`parse_report_time`].
pub const REPORT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// Most fraction digits a report time may carry (microseconds).
const MAX_FRACTION_DIGITS: usize = 6;

/// Errors from [`parse_report_time`].
#[derive(Debug, Error)]
pub enum ReportTimeError {
    #[error("report time must end in .<1-6 digits>Z: {0}")]
    Fraction(String),

    #[error(transparent)]
    Parse(#[from] chrono::ParseError),
}

/// Parse a report timestamp as a naive UTC time.
///
/// `%.f` alone would also accept a missing fraction or nanosecond
/// precision, so the fraction is checked before parsing.
pub fn parse_report_time(value: &str) -> Result<NaiveDateTime, ReportTimeError> {
    let fraction = value
        .strip_suffix('Z')
        .and_then(|rest| rest.rsplit_once('.'))
        .map(|(_, fraction)| fraction)
        .filter(|f| {
            (1..=MAX_FRACTION_DIGITS).contains(&f.len()) && f.bytes().all(|b| b.is_ascii_digit())
        });
    if fraction.is_none() {
        return Err(ReportTimeError::Fraction(value.to_string()));
    }
    Ok(NaiveDateTime::parse_from_str(value, REPORT_TIME_FORMAT)?)
}

/// Whether a device that last reported at `reported` is still online at `now`.
///
/// Report times in the future count as online.
pub fn is_online(reported: NaiveDateTime, now: NaiveDateTime, threshold: Duration) -> bool {
    let elapsed = now.signed_duration_since(reported);
    match TimeDelta::from_std(threshold) {
        Ok(threshold) => elapsed < threshold,
        Err(_) => true,
    }
}

/// Derived device status.
///
/// Not authoritative: each refresh recomputes it from the previous status
/// and whatever the response carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub online: bool,
    /// Network type from the LoRa info block (e.g. "A", "D")
    pub net_type: Option<String>,
    /// Last parsed report time
    pub last_report: Option<NaiveDateTime>,
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self {
            online: true,
            net_type: None,
            last_report: None,
        }
    }
}

impl DeviceStatus {
    /// Derive the next status from a pull.
    ///
    /// A missing or unparseable report time keeps the previous online flag.
    /// `lora_net_type` is `None` when the state had no LoRa info block, which
    /// keeps the previous network type; `Some(None)` means the block was
    /// there without a network type and clears it.
    pub fn derive(
        &self,
        report_at: Option<&Value>,
        lora_net_type: Option<Option<&str>>,
        now: NaiveDateTime,
        threshold: Duration,
    ) -> DeviceStatus {
        let mut next = self.clone();

        match report_at {
            None | Some(Value::Null) => {}
            Some(Value::String(raw)) => match parse_report_time(raw) {
                Ok(reported) => {
                    next.online = is_online(reported, now, threshold);
                    next.last_report = Some(reported);
                }
                Err(e) => {
                    warn!(report_at = %raw, error = %e, "Ignoring unparseable report time");
                }
            },
            Some(other) => {
                warn!(report_at = %other, "Ignoring non-string report time");
            }
        }

        if let Some(net_type) = lora_net_type {
            next.net_type = net_type.map(str::to_string);
        }
        next
    }

    /// Whether the externally visible fields differ.
    pub fn differs_from(&self, other: &DeviceStatus) -> bool {
        self.online != other.online || self.net_type != other.net_type
    }
}
