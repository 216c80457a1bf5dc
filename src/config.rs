use bluer::Uuid;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TARGET_NAME: &str = "Austin";
pub const DEFAULT_SERVICE_UUID: &str = "2AA846A1-29D3-FE8A-59FC-ACD670A1D600";
pub const DEFAULT_CHAR_UUID: &str = "12345678-1234-5678-1234-56789abcdef1";
pub const DEFAULT_CSV_PATH: &str = "punch.csv";
pub const DEFAULT_SCAN_TIMEOUT_SECS: f64 = 8.0;

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Case-insensitive substring of the advertised name, empty disables
    pub target_name: String,
    pub service_uuid: Option<Uuid>,
    pub characteristic_uuid: Uuid,
    pub csv_path: PathBuf,
    pub scan_timeout: Duration,
}

impl LoggerConfig {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        // Load environment variables
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from a variable lookup, applying defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Box<dyn std::error::Error>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let target_name = lookup("ACCEL_TARGET_NAME")
            .unwrap_or_else(|| DEFAULT_TARGET_NAME.to_string())
            .trim()
            .to_string();

        let service_uuid = match lookup("ACCEL_SERVICE_UUID") {
            Some(value) if value.trim().is_empty() => None,
            Some(value) => Some(parse_uuid("ACCEL_SERVICE_UUID", &value)?),
            None => Some(parse_uuid("ACCEL_SERVICE_UUID", DEFAULT_SERVICE_UUID)?),
        };

        let characteristic_uuid = parse_uuid(
            "ACCEL_CHAR_UUID",
            &lookup("ACCEL_CHAR_UUID").unwrap_or_else(|| DEFAULT_CHAR_UUID.to_string()),
        )?;

        let csv_path = match lookup("ACCEL_CSV_PATH") {
            Some(value) if !value.trim().is_empty() => PathBuf::from(value.trim()),
            _ => PathBuf::from(DEFAULT_CSV_PATH),
        };

        let scan_timeout = match lookup("ACCEL_SCAN_TIMEOUT_SECS") {
            Some(value) => parse_timeout(&value)?,
            None => Duration::from_secs_f64(DEFAULT_SCAN_TIMEOUT_SECS),
        };

        if target_name.is_empty() && service_uuid.is_none() {
            return Err("Neither ACCEL_TARGET_NAME nor ACCEL_SERVICE_UUID is set, nothing to scan for".into());
        }

        Ok(LoggerConfig {
            target_name,
            service_uuid,
            characteristic_uuid,
            csv_path,
            scan_timeout,
        })
    }
}

fn parse_uuid(key: &str, value: &str) -> Result<Uuid, Box<dyn std::error::Error>> {
    Uuid::parse_str(value.trim()).map_err(|e| format!("{} is not a valid UUID '{}': {}", key, value, e).into())
}

fn parse_timeout(value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let secs: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("ACCEL_SCAN_TIMEOUT_SECS must be a number of seconds, got '{}'", value))?;

    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("ACCEL_SCAN_TIMEOUT_SECS must be positive, got '{}'", value).into());
    }

    Duration::try_from_secs_f64(secs)
        .map_err(|e| format!("ACCEL_SCAN_TIMEOUT_SECS out of range, got '{}': {}", value, e).into())
}
