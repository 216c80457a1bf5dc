use bluer::{Address, Uuid};
use time::OffsetDateTime;

use crate::utils::format_timestamp;

/// Raw accelerometer packet as sent by the peripheral, values in milli-g
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccelPacket {
    pub counter: i16,
    pub x_mg: i16,
    pub y_mg: i16,
    pub z_mg: i16,
}

#[derive(Debug, Clone)]
pub struct Reading {
    pub timestamp: OffsetDateTime,
    pub counter: i16,
    pub acceleration_x: f64,
    pub acceleration_y: f64,
    pub acceleration_z: f64,
}

impl Reading {
    /// Convert a packet to g-units and stamp it with the given time
    pub fn from_packet(packet: AccelPacket, timestamp: OffsetDateTime) -> Self {
        Reading {
            timestamp,
            counter: packet.counter,
            acceleration_x: f64::from(packet.x_mg) / 1000.0,
            acceleration_y: f64::from(packet.y_mg) / 1000.0,
            acceleration_z: f64::from(packet.z_mg) / 1000.0,
        }
    }

    /// Format as `timestamp,ctr,ax_g,ay_g,az_g` without a trailing newline
    pub fn to_csv_line(&self) -> String {
        format!(
            "{},{},{:.3},{:.3},{:.3}",
            format_timestamp(&self.timestamp),
            self.counter,
            self.acceleration_x,
            self.acceleration_y,
            self.acceleration_z
        )
    }
}

#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    pub name: Option<String>,
    pub address: Address,
    pub service_uuids: Vec<Uuid>,
    /// Signal strength of the last advertisement, `None` for devices only known from BlueZ's cache
    pub rssi: Option<i16>,
}
