//! Platform-agnostic types for Xiaomi Mijia BLE thermometers.
//!
//! This crate holds the domain types and the bit-exact byte layouts shared by
//! the BLE layer (mijia-core) and anything else that needs to decode captured
//! payloads without a Bluetooth stack.
//!
//! # Features
//!
//! - Temperature/humidity samples in binary and text encodings
//! - Device clock with timezone handling
//! - Hourly history records and the history index
//! - UUID constants for the supported services and characteristics
//! - Error types for data parsing
//!
//! # Example
//!
//! ```
//! use mijia_types::{HistoryRecord, TempAndHumidity};
//!
//! let reading = TempAndHumidity::from_text(b"T=21.5 H=40.0").unwrap();
//! assert_eq!(reading.humidity, 40.0);
//!
//! assert!(HistoryRecord::from_bytes(&[0u8; 4]).is_err());
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::{
    CLOCK_BYTES, DeviceClock, HISTORY_INDEX_BYTES, HISTORY_RECORD_BYTES, HistoryIndex,
    HistoryRecord, NEXT_INDEX_OFFSET, TEMP_HUM_BYTES, TempAndHumidity, TemperatureUnit,
    raw_to_temperature, temperature_to_raw,
};
pub use uuid as uuids;


/// Property-based tests for the byte codecs.
///
/// ```bash
/// cargo test -p mijia-types proptests
/// ```
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use time::{OffsetDateTime, UtcOffset};

    proptest! {
        /// Every raw i16 decodes to raw/100 and encodes back to itself.
        #[test]
        fn temperature_scaling_round_trips(raw: i16) {
            let value = raw_to_temperature(raw);
            prop_assert!((f64::from(value) - f64::from(raw) / 100.0).abs() < 1e-3);
            prop_assert_eq!(temperature_to_raw(value), Ok(raw));
        }

        /// Writing a time and reading it back in the same timezone is exact
        /// to the second.
        #[test]
        fn clock_round_trips_in_same_timezone(
            secs in 0u32..=u32::MAX,
            hours in -12i8..=14,
        ) {
            let local = UtcOffset::from_hms(hours, 0, 0).unwrap();
            let time = OffsetDateTime::from_unix_timestamp(i64::from(secs)).unwrap();

            let clock = DeviceClock::from_datetime(time, local).unwrap();
            let decoded = DeviceClock::from_bytes(&clock.to_bytes()).unwrap();

            prop_assert_eq!(decoded, clock);
            prop_assert_eq!(decoded.to_local(local).unix_timestamp(), i64::from(secs));
        }

        /// Unit decoding never fails on a non-empty payload and only 0x01 is
        /// Fahrenheit.
        #[test]
        fn unit_decode_is_total(byte: u8) {
            let unit = TemperatureUnit::from_bytes(&[byte]).unwrap();
            prop_assert_eq!(unit == TemperatureUnit::Fahrenheit, byte == 0x01);
        }

        /// Decoding arbitrary bytes never panics.
        #[test]
        fn decoders_never_panic(data: Vec<u8>) {
            let _ = TempAndHumidity::from_bytes(&data);
            let _ = TempAndHumidity::from_text(&data);
            let _ = DeviceClock::from_bytes(&data);
            let _ = HistoryIndex::from_bytes(&data);
            let _ = HistoryRecord::from_bytes(&data);
        }

        /// The text decoder never yields a non-finite value.
        #[test]
        fn text_decode_is_finite(t in "[-0-9.a-z]{0,8}", h in "[-0-9.a-z]{0,8}") {
            let payload = format!("T={t} H={h}");
            if let Ok(reading) = TempAndHumidity::from_text(payload.as_bytes()) {
                prop_assert!(reading.temperature.is_finite());
                prop_assert!(reading.humidity.is_finite());
            }
        }

        /// Any 14-byte slice decodes and re-encodes to the same bytes.
        #[test]
        fn history_record_layout_is_stable(data in proptest::collection::vec(any::<u8>(), 14)) {
            let record = HistoryRecord::from_bytes(&data).unwrap();
            prop_assert_eq!(record.to_bytes().unwrap().to_vec(), data);
        }
    }
}
