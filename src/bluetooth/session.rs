/// Connection lifecycle: locate, connect, subscribe and stream to CSV
use bluer::gatt::remote::Characteristic;
use bluer::{Adapter, Device, Uuid};
use futures_util::stream::LocalBoxStream;
use futures_util::StreamExt;
use log::{error, info, warn};
use time::UtcOffset;
use tokio::sync::oneshot;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::bluetooth::scanner::locate_device;
use crate::config::LoggerConfig;
use crate::models::DeviceDescriptor;
use crate::recorder::{Recorder, SessionStats};
use crate::storage::CsvSink;

// Keep-alive tick while waiting for notifications; each tick checks the link
const IDLE_INTERVAL_SECS: u64 = 1;

type BoxError = Box<dyn std::error::Error>;

/// Scanning side of the Bluetooth stack
pub trait Central {
    type Peripheral: Peripheral;

    async fn locate(&self, config: &LoggerConfig) -> Result<DeviceDescriptor, BoxError>;

    fn peripheral(&self, target: &DeviceDescriptor) -> Result<Self::Peripheral, BoxError>;
}

/// A remote device the session connects to
pub trait Peripheral {
    type Characteristic;

    async fn connect(&self) -> Result<(), BoxError>;

    async fn is_connected(&self) -> Result<bool, BoxError>;

    async fn disconnect(&self) -> Result<(), BoxError>;

    async fn characteristic(&self, uuid: Uuid) -> Result<Self::Characteristic, BoxError>;

    async fn notifications<'a>(
        &'a self,
        characteristic: &'a Self::Characteristic,
    ) -> Result<LocalBoxStream<'a, Vec<u8>>, BoxError>;
}

impl Central for Adapter {
    type Peripheral = Device;

    async fn locate(&self, config: &LoggerConfig) -> Result<DeviceDescriptor, BoxError> {
        locate_device(self, config).await
    }

    fn peripheral(&self, target: &DeviceDescriptor) -> Result<Device, BoxError> {
        Ok(self.device(target.address)?)
    }
}

impl Peripheral for Device {
    type Characteristic = Characteristic;

    async fn connect(&self) -> Result<(), BoxError> {
        Ok(Device::connect(self).await?)
    }

    async fn is_connected(&self) -> Result<bool, BoxError> {
        Ok(Device::is_connected(self).await?)
    }

    async fn disconnect(&self) -> Result<(), BoxError> {
        Ok(Device::disconnect(self).await?)
    }

    async fn characteristic(&self, uuid: Uuid) -> Result<Characteristic, BoxError> {
        find_characteristic(self, uuid).await
    }

    async fn notifications<'a>(
        &'a self,
        characteristic: &'a Characteristic,
    ) -> Result<LocalBoxStream<'a, Vec<u8>>, BoxError> {
        Ok(characteristic.notify().await?.boxed_local())
    }
}

/// Run one logging session on the default adapter until interrupted
///
/// Sets up the BlueZ session and hands the adapter to [`drive_session`].
///
/// # Returns
/// `Ok(())` when stopped through `shutdown`, an error for discovery or connection failures
pub async fn run_session(
    config: &LoggerConfig,
    utc_offset: UtcOffset,
    mut shutdown: oneshot::Receiver<()>,
) -> Result<(), BoxError> {
    // Initialize Bluetooth session
    let session = match bluer::Session::new().await {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to create Bluetooth session: {}", e);
            return Err(e.into());
        }
    };

    // Get the default Bluetooth adapter
    let adapter = match session.default_adapter().await {
        Ok(adapter) => adapter,
        Err(e) => {
            error!("Failed to get default Bluetooth adapter: {}", e);
            return Err(e.into());
        }
    };

    // Ensure Bluetooth adapter is powered on
    if let Err(e) = adapter.set_powered(true).await {
        error!("Failed to power on adapter: {}", e);
        return Err(e.into());
    }

    drive_session(&adapter, config, utc_offset, &mut shutdown)
        .await
        .map(|_| ())
}

/// Locate, connect and stream until `shutdown` fires or the link fails
///
/// Scans once and never connects when nothing matches. Once a peripheral is
/// obtained it is disconnected on every exit path. There is no reconnection:
/// a lost link ends the session with an error.
pub async fn drive_session<C: Central>(
    central: &C,
    config: &LoggerConfig,
    utc_offset: UtcOffset,
    shutdown: &mut oneshot::Receiver<()>,
) -> Result<SessionStats, BoxError> {
    let target = tokio::select! {
        found = central.locate(config) => found?,
        _ = &mut *shutdown => {
            info!("Stopped.");
            return Ok(SessionStats::default());
        }
    };

    info!(
        "Connecting to: {} {}",
        target.name.as_deref().unwrap_or("(unknown)"),
        target.address
    );
    let sink = CsvSink::open(&config.csv_path)?;
    let mut recorder = Recorder::new(sink, utc_offset);

    let peripheral = central.peripheral(&target)?;
    let connected = tokio::select! {
        result = peripheral.connect() => Some(result),
        _ = &mut *shutdown => None,
    };

    let result = match connected {
        Some(Ok(())) => stream_notifications(&peripheral, config, &mut recorder, shutdown).await,
        Some(Err(e)) => {
            error!("Failed to connect to {}: {}", target.address, e);
            Err(e)
        }
        None => Ok(()),
    };

    // Release the connection whatever ended the session
    if let Err(e) = peripheral.disconnect().await {
        warn!("Failed to disconnect from {}: {}", target.address, e);
    }

    let stats = recorder.stats();
    info!(
        "Session summary: {} readings written, {} packets rejected, {} write failures",
        stats.accepted, stats.rejected, stats.write_failures
    );

    result.map(|()| {
        info!("Stopped.");
        stats
    })
}

/// Subscribe to the accelerometer characteristic and feed the recorder
///
/// Notifications are handled one at a time in arrival order.
async fn stream_notifications<P: Peripheral>(
    peripheral: &P,
    config: &LoggerConfig,
    recorder: &mut Recorder,
    shutdown: &mut oneshot::Receiver<()>,
) -> Result<(), BoxError> {
    info!("Connected: {}", peripheral.is_connected().await?);

    let characteristic = peripheral.characteristic(config.characteristic_uuid).await?;
    let mut notifications = peripheral.notifications(&characteristic).await?;

    info!("Streaming ACCEL... Ctrl+C to stop.");

    let mut idle = interval(Duration::from_secs(IDLE_INTERVAL_SECS));
    idle.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = &mut *shutdown => return Ok(()),
            value = notifications.next() => {
                match value {
                    Some(data) => {
                        recorder.handle(&data);
                    }
                    None => {
                        error!("Notification stream ended");
                        return Err("Connection lost while streaming".into());
                    }
                }
            }
            _ = idle.tick() => {
                if !peripheral.is_connected().await? {
                    error!("Device disconnected");
                    return Err("Connection lost while streaming".into());
                }
            }
        }
    }
}

/// Find a characteristic by UUID across all GATT services of the device
async fn find_characteristic(device: &Device, uuid: Uuid) -> Result<Characteristic, BoxError> {
    for service in device.services().await? {
        for characteristic in service.characteristics().await? {
            if characteristic.uuid().await? == uuid {
                return Ok(characteristic);
            }
        }
    }

    Err(format!(
        "Notification characteristic {} not found on {}",
        uuid,
        device.address()
    )
    .into())
}
