/// Bluetooth Low Energy scanning and target device selection
use bluer::{Adapter, AdapterEvent, Address};
use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::time::sleep;

use crate::config::LoggerConfig;
use crate::models::DeviceDescriptor;

/// Scan for advertising peripherals and pick the configured target
///
/// Discovery runs for `config.scan_timeout`, then every device seen is
/// described and handed to [`select_device`]. This is a single scan: no
/// retries, no rescanning.
///
/// # Returns
/// The selected device, or an error with troubleshooting hints if nothing matched
pub async fn locate_device(
    adapter: &Adapter,
    config: &LoggerConfig,
) -> Result<DeviceDescriptor, Box<dyn std::error::Error>> {
    info!(
        "Scanning for BLE devices ({:.1}s)...",
        config.scan_timeout.as_secs_f64()
    );

    // Configure discovery filter for Low Energy devices only
    let filter = bluer::DiscoveryFilter {
        transport: bluer::DiscoveryTransport::Le,
        duplicate_data: false,
        ..Default::default()
    };

    // Apply the discovery filter (warn if it fails, but continue)
    if let Err(e) = adapter.set_discovery_filter(filter).await {
        warn!("Failed to set discovery filter: {}", e);
    }

    if let Some(uuid) = config.service_uuid {
        info!("Searching for device advertising service UUID {} ...", uuid);
    }

    let addresses = discover_addresses(adapter, config).await?;

    let mut candidates = Vec::with_capacity(addresses.len());
    for addr in addresses {
        let device = match adapter.device(addr) {
            Ok(device) => device,
            Err(_) => continue,
        };

        let name = device.name().await.unwrap_or_else(|e| {
            debug!("Failed to read name of {}: {}", addr, e);
            None
        });
        let service_uuids = match device.uuids().await {
            Ok(Some(uuids)) => uuids.into_iter().collect(),
            Ok(None) => Vec::new(),
            Err(e) => {
                debug!("Failed to read service UUIDs of {}: {}", addr, e);
                Vec::new()
            }
        };

        let rssi = device.rssi().await.unwrap_or_else(|e| {
            debug!("Failed to read RSSI of {}: {}", addr, e);
            None
        });

        match rssi {
            Some(rssi) => info!("  {} {} ({} dBm)", addr, name.as_deref().unwrap_or("(unknown)"), rssi),
            None => debug!("  {} {} (cached, not advertising)", addr, name.as_deref().unwrap_or("(unknown)")),
        }
        candidates.push(DeviceDescriptor {
            name,
            address: addr,
            service_uuids,
            rssi,
        });
    }

    choose_target(&candidates, config)
}

/// Apply [`select_device`] and turn a miss into the troubleshooting error
pub fn choose_target(
    candidates: &[DeviceDescriptor],
    config: &LoggerConfig,
) -> Result<DeviceDescriptor, Box<dyn std::error::Error>> {
    select_device(candidates, config)
        .cloned()
        .ok_or_else(|| device_not_found_message(config).into())
}

/// Collect device addresses in the order discovery reports them
///
/// BlueZ replays devices it already knows first, so the list can include
/// peripherals that are not advertising right now.
async fn discover_addresses(
    adapter: &Adapter,
    config: &LoggerConfig,
) -> Result<Vec<Address>, Box<dyn std::error::Error>> {
    let events = adapter.discover_devices().await?;
    tokio::pin!(events);

    let deadline = sleep(config.scan_timeout);
    tokio::pin!(deadline);

    let mut addresses = Vec::new();
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.next() => {
                match event {
                    Some(AdapterEvent::DeviceAdded(addr)) => {
                        if !addresses.contains(&addr) {
                            addresses.push(addr);
                        }
                    }
                    Some(other) => debug!("Discovery event: {:?}", other),
                    None => break,
                }
            }
        }
    }

    // Dropping the event stream stops discovery
    Ok(addresses)
}

/// Choose the target among scanned devices
///
/// Devices without an RSSI were not heard during the scan and are never
/// chosen. A service UUID match wins over a name match. Without a configured UUID,
/// or when nothing advertises it, the first device whose name contains
/// `target_name` (case-insensitive) is chosen. UUID comparison is on the
/// parsed value, so letter case never matters.
pub fn select_device<'a>(
    candidates: &'a [DeviceDescriptor],
    config: &LoggerConfig,
) -> Option<&'a DeviceDescriptor> {
    let mut advertising = candidates.iter().filter(|d| d.rssi.is_some());

    if let Some(uuid) = config.service_uuid {
        if let Some(device) = advertising
            .clone()
            .find(|d| d.service_uuids.contains(&uuid))
        {
            return Some(device);
        }
    }

    if config.target_name.is_empty() {
        return None;
    }

    let needle = config.target_name.to_lowercase();
    advertising.find(|d| {
        d.name
            .as_deref()
            .map_or(false, |name| name.to_lowercase().contains(&needle))
    })
}

fn device_not_found_message(config: &LoggerConfig) -> String {
    let mut message = String::from("Target device not found.\n- Make sure it is advertising BLE\n- Disconnect it from other centrals (phone, PC)\n");
    if !config.target_name.is_empty() {
        message.push_str(&format!(
            "- Check ACCEL_TARGET_NAME ('{}') matches the advertised local name\n",
            config.target_name
        ));
    }
    match config.service_uuid {
        Some(uuid) => message.push_str(&format!(
            "- Or verify ACCEL_SERVICE_UUID ({}) matches your firmware",
            uuid
        )),
        None => message.push_str("- Or set ACCEL_SERVICE_UUID to the service your firmware advertises"),
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluer::Uuid;
    use std::path::PathBuf;
    use std::time::Duration;

    const SERVICE: &str = "2AA846A1-29D3-FE8A-59FC-ACD670A1D600";

    fn config(name: &str, service: Option<&str>) -> LoggerConfig {
        LoggerConfig {
            target_name: name.to_string(),
            service_uuid: service.map(|s| Uuid::parse_str(s).unwrap()),
            characteristic_uuid: Uuid::parse_str("12345678-1234-5678-1234-56789abcdef1").unwrap(),
            csv_path: PathBuf::from("punch.csv"),
            scan_timeout: Duration::from_secs(8),
        }
    }

    fn device(last: u8, name: Option<&str>, services: &[&str]) -> DeviceDescriptor {
        DeviceDescriptor {
            name: name.map(str::to_string),
            address: Address::new([0xC0, 0xFF, 0xEE, 0x00, 0x00, last]),
            service_uuids: services.iter().map(|s| Uuid::parse_str(s).unwrap()).collect(),
            rssi: Some(-60),
        }
    }

    fn cached(last: u8, name: Option<&str>, services: &[&str]) -> DeviceDescriptor {
        DeviceDescriptor {
            rssi: None,
            ..device(last, name, services)
        }
    }

    #[test]
    fn service_uuid_beats_name() {
        let candidates = [
            device(1, Some("Austin's Nano"), &[]),
            device(2, Some("Arduino"), &[SERVICE]),
        ];
        let selected = select_device(&candidates, &config("austin", Some(SERVICE))).unwrap();
        assert_eq!(selected.address, candidates[1].address);
    }

    #[test]
    fn service_uuid_match_ignores_case() {
        let candidates = [device(3, None, &["2aa846a1-29d3-fe8a-59fc-acd670a1d600"])];
        let selected = select_device(&candidates, &config("", Some(SERVICE))).unwrap();
        assert_eq!(selected.address, candidates[0].address);
    }

    #[test]
    fn falls_back_to_name_substring() {
        let candidates = [
            device(1, None, &[]),
            device(2, Some("Speaker"), &[]),
            device(3, Some("AUSTIN-IMU"), &[]),
            device(4, Some("austin"), &[]),
        ];
        let selected = select_device(&candidates, &config("Austin", Some(SERVICE))).unwrap();
        assert_eq!(selected.address, candidates[2].address);
    }

    #[test]
    fn name_only_when_no_service_configured() {
        let candidates = [
            device(1, Some("Other"), &[SERVICE]),
            device(2, Some("my austin board"), &[]),
        ];
        let selected = select_device(&candidates, &config("Austin", None)).unwrap();
        assert_eq!(selected.address, candidates[1].address);
    }

    #[test]
    fn nothing_matches() {
        let candidates = [device(1, Some("Speaker"), &[]), device(2, None, &[])];
        assert!(select_device(&candidates, &config("Austin", Some(SERVICE))).is_none());
        assert!(select_device(&[], &config("Austin", Some(SERVICE))).is_none());
    }

    #[test]
    fn empty_name_disables_fallback() {
        let candidates = [device(1, Some("Austin"), &[])];
        assert!(select_device(&candidates, &config("", Some(SERVICE))).is_none());
    }

    #[test]
    fn cached_devices_are_never_selected() {
        let candidates = [
            cached(1, Some("Austin"), &[SERVICE]),
            device(2, Some("Speaker"), &[]),
        ];
        assert!(select_device(&candidates, &config("Austin", Some(SERVICE))).is_none());
    }

    #[test]
    fn advertising_device_chosen_over_earlier_cached_one() {
        let candidates = [
            cached(1, Some("Austin (paired)"), &[]),
            device(2, Some("austin"), &[]),
        ];
        let selected = select_device(&candidates, &config("Austin", None)).unwrap();
        assert_eq!(selected.address, candidates[1].address);
    }

    #[test]
    fn choose_target_reports_guidance_on_miss() {
        let err = choose_target(&[cached(1, Some("Austin"), &[])], &config("Austin", None)).unwrap_err();
        assert!(err.to_string().starts_with("Target device not found."));
    }

    #[test]
    fn not_found_message_names_settings() {
        let message = device_not_found_message(&config("Austin", Some(SERVICE)));
        assert!(message.starts_with("Target device not found."));
        assert!(message.contains("advertising"));
        assert!(message.contains("ACCEL_TARGET_NAME ('Austin')"));
        assert!(message.contains("2aa846a1-29d3-fe8a-59fc-acd670a1d600"));
    }
}
