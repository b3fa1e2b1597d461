//! Bluetooth UUIDs for Mijia thermometers.
//!
//! This module contains the service and characteristic UUIDs needed to
//! talk to the supported sensors over Bluetooth Low Energy.

use uuid::{Uuid, uuid};

/// Bluetooth SIG base UUID, used to expand 16-bit short identifiers.
pub const BLUETOOTH_BASE: Uuid = uuid!("00000000-0000-1000-8000-00805f9b34fb");

// --- LYWSD02 (e-ink clock) ---

/// LYWSD02 vendor service.
pub const LYWSD02_SERVICE: Uuid = uuid!("ebe0ccb0-7a0a-4b0c-8a1a-6ff2997da3a6");

/// Clock: epoch seconds and timezone offset (read/write).
pub const LYWSD02_TIME: Uuid = uuid!("ebe0ccb7-7a0a-4b0c-8a1a-6ff2997da3a6");

/// Temperature and humidity, pushed by notification.
pub const LYWSD02_TEMP_HUM: Uuid = uuid!("ebe0ccc1-7a0a-4b0c-8a1a-6ff2997da3a6");

/// Battery percentage.
pub const LYWSD02_BATTERY: Uuid = uuid!("ebe0ccc4-7a0a-4b0c-8a1a-6ff2997da3a6");

/// Display temperature unit (read/write).
pub const LYWSD02_UNIT: Uuid = uuid!("ebe0ccbe-7a0a-4b0c-8a1a-6ff2997da3a6");

/// Last calculated hourly record index and the next uncalculated index.
pub const LYWSD02_HISTORY_INDEX: Uuid = uuid!("ebe0ccb9-7a0a-4b0c-8a1a-6ff2997da3a6");

/// Stream of hourly history records, pushed by notification.
pub const LYWSD02_HISTORY: Uuid = uuid!("ebe0ccbc-7a0a-4b0c-8a1a-6ff2997da3a6");

/// Most recent hourly history record.
pub const LYWSD02_LAST_HOUR: Uuid = uuid!("ebe0ccbb-7a0a-4b0c-8a1a-6ff2997da3a6");

// --- LYWSDCGQ/01ZM (MiJia round display) ---

/// LYWSDCGQ vendor service.
pub const LYWSDCGQ_SERVICE: Uuid = uuid!("226c0000-6476-4566-7562-66734470666d");

/// Temperature and humidity as text (`T=29.0 H=52.3`), pushed by notification.
pub const LYWSDCGQ_TEMP_HUM: Uuid = uuid!("226caa55-6476-4566-7562-66734470666d");

// --- Standard BLE services ---

/// Battery service.
pub const BATTERY_SERVICE: Uuid = uuid!("0000180f-0000-1000-8000-00805f9b34fb");

/// Battery level characteristic.
pub const BATTERY_LEVEL: Uuid = uuid!("00002a19-0000-1000-8000-00805f9b34fb");

/// Expand a 16-bit SIG-assigned number into a full 128-bit UUID.
pub fn from_short(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE.as_u128() | ((short as u128) << 96))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_short_battery() {
        assert_eq!(from_short(0x180f), BATTERY_SERVICE);
        assert_eq!(from_short(0x2a19), BATTERY_LEVEL);
    }

    #[test]
    fn test_uuid_display_is_lowercase() {
        assert_eq!(
            LYWSD02_SERVICE.to_string(),
            "ebe0ccb0-7a0a-4b0c-8a1a-6ff2997da3a6"
        );
        assert_eq!(
            LYWSDCGQ_TEMP_HUM.to_string(),
            "226caa55-6476-4566-7562-66734470666d"
        );
    }

    #[test]
    fn test_lywsd02_characteristics_share_vendor_base() {
        let suffix = "-7a0a-4b0c-8a1a-6ff2997da3a6";
        for uuid in [
            LYWSD02_TIME,
            LYWSD02_TEMP_HUM,
            LYWSD02_BATTERY,
            LYWSD02_UNIT,
            LYWSD02_HISTORY_INDEX,
            LYWSD02_HISTORY,
            LYWSD02_LAST_HOUR,
        ] {
            assert!(uuid.to_string().ends_with(suffix), "{uuid}");
        }
    }
}
