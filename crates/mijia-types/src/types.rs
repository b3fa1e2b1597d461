//! Core types and byte layouts for Mijia sensor data.
//!
//! All multi-byte integers are little-endian. Temperatures travel as signed
//! 16-bit hundredths of a degree Celsius; percentages and small enums are
//! single unsigned bytes.

use core::fmt;
use core::str::FromStr;

use bytes::{Buf, BufMut};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, UtcOffset};

use crate::error::ParseError;

/// Size of the clock payload: u32 epoch seconds + i8 timezone hours.
pub const CLOCK_BYTES: usize = 5;

/// Size of the binary temperature/humidity payload (i16 temp + u8 humidity).
pub const TEMP_HUM_BYTES: usize = 3;

/// Size of one history record.
pub const HISTORY_RECORD_BYTES: usize = 14;

/// Byte offset of the "next index" field in the history index payload.
///
/// The first field occupies bytes 0-3, so this overlaps it by two bytes.
/// That is the layout observed on LYWSD02 firmware; it has not been
/// confirmed against a capture where the two indices differ in their
/// upper half, so treat the decoded `next` value with suspicion.
pub const NEXT_INDEX_OFFSET: usize = 2;

/// Minimum size of the history index payload.
pub const HISTORY_INDEX_BYTES: usize = NEXT_INDEX_OFFSET + 4;

/// Convert a raw temperature (hundredths of a degree) to degrees.
#[must_use]
pub fn raw_to_temperature(raw: i16) -> f32 {
    f32::from(raw) / 100.0
}

/// Convert degrees to the raw wire representation (hundredths of a degree).
///
/// # Errors
///
/// Returns [`ParseError::InvalidValue`] when the value is not finite or does
/// not fit a signed 16-bit field after scaling.
pub fn temperature_to_raw(value: f32) -> Result<i16, ParseError> {
    let scaled = (f64::from(value) * 100.0).round();
    if !scaled.is_finite() || scaled < f64::from(i16::MIN) || scaled > f64::from(i16::MAX) {
        return Err(ParseError::InvalidValue(format!(
            "temperature {value} is outside the encodable range"
        )));
    }
    Ok(scaled as i16)
}

/// Display unit configured on the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum TemperatureUnit {
    /// Degrees Celsius (`0x00`).
    #[default]
    Celsius = 0x00,
    /// Degrees Fahrenheit (`0x01`).
    Fahrenheit = 0x01,
}

impl TemperatureUnit {
    /// Decode the unit byte. Anything other than `0x01` reads as Celsius.
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        if byte == 0x01 {
            TemperatureUnit::Fahrenheit
        } else {
            TemperatureUnit::Celsius
        }
    }

    /// Decode the unit from a characteristic value.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] for an empty payload.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ParseError> {
        data.first()
            .copied()
            .map(Self::from_byte)
            .ok_or(ParseError::insufficient(1, 0))
    }

    /// The wire byte for this unit.
    #[must_use]
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Single-letter symbol (`C` or `F`).
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "C",
            TemperatureUnit::Fahrenheit => "F",
        }
    }
}

impl FromStr for TemperatureUnit {
    type Err = ParseError;

    /// Parse `C` or `F`. Nothing else is accepted.
    ///
    /// ```
    /// use mijia_types::TemperatureUnit;
    ///
    /// assert_eq!("F".parse::<TemperatureUnit>(), Ok(TemperatureUnit::Fahrenheit));
    /// assert!("K".parse::<TemperatureUnit>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "C" => Ok(TemperatureUnit::Celsius),
            "F" => Ok(TemperatureUnit::Fahrenheit),
            other => Err(ParseError::InvalidValue(format!(
                "unknown temperature unit {other:?} (expected \"C\" or \"F\")"
            ))),
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A temperature and relative humidity sample.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TempAndHumidity {
    /// Temperature in degrees (unit as configured on the sensor).
    pub temperature: f32,
    /// Relative humidity in percent.
    pub humidity: f32,
}

impl TempAndHumidity {
    /// Parse the binary layout used by LYWSD02.
    ///
    /// - bytes 0-1: temperature (i16 LE, hundredths)
    /// - byte 2: humidity (u8, percent)
    ///
    /// Trailing bytes (battery voltage on some firmware) are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] if `data` is shorter than
    /// [`TEMP_HUM_BYTES`].
    pub fn from_bytes(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < TEMP_HUM_BYTES {
            return Err(ParseError::insufficient(TEMP_HUM_BYTES, data.len()));
        }

        let mut buf = data;
        let temperature = raw_to_temperature(buf.get_i16_le());
        let humidity = f32::from(buf.get_u8());

        Ok(Self {
            temperature,
            humidity,
        })
    }

    /// Parse the text layout used by LYWSDCGQ, e.g. `T=29.0 H=52.3`.
    ///
    /// Trailing NUL padding is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Malformed`] if the payload is not UTF-8 or
    /// either field is missing or not a number.
    pub fn from_text(data: &[u8]) -> Result<Self, ParseError> {
        let text = core::str::from_utf8(data)
            .map_err(|_| ParseError::Malformed("payload is not valid UTF-8".to_string()))?;
        let text = text.trim_end_matches('\0').trim();

        Ok(Self {
            temperature: text_field(text, "T=")?,
            humidity: text_field(text, "H=")?,
        })
    }
}

fn text_field(text: &str, key: &str) -> Result<f32, ParseError> {
    let start = text
        .find(key)
        .ok_or_else(|| ParseError::Malformed(format!("missing `{key}` in {text:?}")))?
        + key.len();
    let rest = &text[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .unwrap_or(rest.len());
    let raw = &rest[..end];

    raw.parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseError::Malformed(format!("invalid `{key}` value in {text:?}")))
}

/// Raw contents of the clock characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceClock {
    /// Seconds since the Unix epoch (UTC).
    pub timestamp: u32,
    /// Timezone offset in whole hours that was written with the time.
    pub tz_offset_hours: i8,
}

impl DeviceClock {
    /// Parse the clock payload.
    ///
    /// - bytes 0-3: epoch seconds (u32 LE)
    /// - byte 4: timezone offset in hours (i8)
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] if `data` is shorter than
    /// [`CLOCK_BYTES`].
    pub fn from_bytes(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < CLOCK_BYTES {
            return Err(ParseError::insufficient(CLOCK_BYTES, data.len()));
        }

        let mut buf = data;
        Ok(Self {
            timestamp: buf.get_u32_le(),
            tz_offset_hours: buf.get_i8(),
        })
    }

    /// Encode the clock payload.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; CLOCK_BYTES] {
        let mut out = [0u8; CLOCK_BYTES];
        let mut buf = &mut out[..];
        buf.put_u32_le(self.timestamp);
        buf.put_i8(self.tz_offset_hours);
        out
    }

    /// Build the payload for `time` as written from a host at `local` offset.
    ///
    /// Only whole hours of the local offset are transmitted.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidValue`] if `time` is before the epoch or
    /// past the range of an unsigned 32-bit second counter.
    pub fn from_datetime(time: OffsetDateTime, local: UtcOffset) -> Result<Self, ParseError> {
        let timestamp = u32::try_from(time.unix_timestamp()).map_err(|_| {
            ParseError::InvalidValue(format!("{time} does not fit a 32-bit epoch timestamp"))
        })?;

        Ok(Self {
            timestamp,
            tz_offset_hours: local.whole_hours(),
        })
    }

    /// The stored moment, shifted by the difference between the timezone it
    /// was written with and `local`, expressed at the `local` offset.
    ///
    /// When the device was set from the same timezone this is exactly the
    /// instant that was written.
    #[must_use]
    pub fn to_local(&self, local: UtcOffset) -> OffsetDateTime {
        let shift = i64::from(self.tz_offset_hours) - i64::from(local.whole_hours());
        (OffsetDateTime::UNIX_EPOCH
            + Duration::seconds(i64::from(self.timestamp))
            + Duration::hours(shift))
        .to_offset(local)
    }
}

/// Position of the hourly history aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HistoryIndex {
    /// Index of the most recently calculated hourly record.
    pub last_calculated: u32,
    /// Index of the next record that has not been calculated yet.
    pub next: u32,
}

impl HistoryIndex {
    /// Parse the history index payload.
    ///
    /// - bytes 0-3: last calculated index (u32 LE)
    /// - bytes 2-5: next index (u32 LE), see [`NEXT_INDEX_OFFSET`]
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] if `data` is shorter than
    /// [`HISTORY_INDEX_BYTES`].
    pub fn from_bytes(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < HISTORY_INDEX_BYTES {
            return Err(ParseError::insufficient(HISTORY_INDEX_BYTES, data.len()));
        }

        let last_calculated = (&data[..4]).get_u32_le();
        let next = (&data[NEXT_INDEX_OFFSET..NEXT_INDEX_OFFSET + 4]).get_u32_le();

        Ok(Self {
            last_calculated,
            next,
        })
    }

    /// Index at which a history download is complete.
    #[must_use]
    pub fn final_record_index(&self) -> u32 {
        self.last_calculated.saturating_sub(1)
    }
}

/// One hourly aggregate stored by the sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HistoryRecord {
    /// Sequence index of the record.
    pub index: u32,
    /// Start of the hour, in seconds since the Unix epoch.
    pub timestamp: u32,
    /// Maximum temperature during the hour.
    pub temperature_max: f32,
    /// Maximum relative humidity during the hour (percent).
    pub humidity_max: u8,
    /// Minimum temperature during the hour.
    pub temperature_min: f32,
    /// Minimum relative humidity during the hour (percent).
    pub humidity_min: u8,
}

impl HistoryRecord {
    /// Parse a history record.
    ///
    /// - bytes 0-3: index (u32 LE)
    /// - bytes 4-7: timestamp (u32 LE)
    /// - bytes 8-9: max temperature (i16 LE, hundredths)
    /// - byte 10: max humidity (u8)
    /// - bytes 11-12: min temperature (i16 LE, hundredths)
    /// - byte 13: min humidity (u8)
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] if `data` is shorter than
    /// [`HISTORY_RECORD_BYTES`].
    pub fn from_bytes(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < HISTORY_RECORD_BYTES {
            return Err(ParseError::insufficient(HISTORY_RECORD_BYTES, data.len()));
        }

        let mut buf = data;
        Ok(Self {
            index: buf.get_u32_le(),
            timestamp: buf.get_u32_le(),
            temperature_max: raw_to_temperature(buf.get_i16_le()),
            humidity_max: buf.get_u8(),
            temperature_min: raw_to_temperature(buf.get_i16_le()),
            humidity_min: buf.get_u8(),
        })
    }

    /// Encode the record in the sensor's layout.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidValue`] if a temperature cannot be encoded.
    pub fn to_bytes(&self) -> Result<[u8; HISTORY_RECORD_BYTES], ParseError> {
        let mut out = [0u8; HISTORY_RECORD_BYTES];
        let mut buf = &mut out[..];
        buf.put_u32_le(self.index);
        buf.put_u32_le(self.timestamp);
        buf.put_i16_le(temperature_to_raw(self.temperature_max)?);
        buf.put_u8(self.humidity_max);
        buf.put_i16_le(temperature_to_raw(self.temperature_min)?);
        buf.put_u8(self.humidity_min);
        Ok(out)
    }

    /// The record timestamp as a UTC date-time.
    #[must_use]
    pub fn recorded_at(&self) -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + Duration::seconds(i64::from(self.timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{datetime, offset};

    #[test]
    fn test_raw_to_temperature() {
        assert!((raw_to_temperature(2345) - 23.45).abs() < 1e-4);
        assert!((raw_to_temperature(-550) + 5.5).abs() < 1e-4);
        assert_eq!(raw_to_temperature(0), 0.0);
    }

    #[test]
    fn test_temperature_to_raw_rejects_out_of_range() {
        assert!(temperature_to_raw(400.0).is_err());
        assert!(temperature_to_raw(-400.0).is_err());
        assert!(temperature_to_raw(f32::NAN).is_err());
        assert_eq!(temperature_to_raw(-12.34), Ok(-1234));
    }

    #[test]
    fn test_unit_decode_defaults_to_celsius() {
        assert_eq!(TemperatureUnit::from_byte(0x00), TemperatureUnit::Celsius);
        assert_eq!(TemperatureUnit::from_byte(0x01), TemperatureUnit::Fahrenheit);
        assert_eq!(TemperatureUnit::from_byte(0x02), TemperatureUnit::Celsius);
        assert_eq!(TemperatureUnit::from_byte(0xFF), TemperatureUnit::Celsius);
    }

    #[test]
    fn test_unit_parse_round_trip() {
        for unit in [TemperatureUnit::Celsius, TemperatureUnit::Fahrenheit] {
            let byte = unit.as_byte();
            assert_eq!(TemperatureUnit::from_byte(byte), unit);
            assert_eq!(unit.to_string().parse::<TemperatureUnit>(), Ok(unit));
        }
    }

    #[test]
    fn test_unit_parse_rejects_other_input() {
        for input in ["", "c", "K", "Celsius", "CF"] {
            assert!(matches!(
                input.parse::<TemperatureUnit>(),
                Err(ParseError::InvalidValue(_))
            ));
        }
    }

    #[test]
    fn test_unit_from_empty_payload() {
        assert_eq!(
            TemperatureUnit::from_bytes(&[]),
            Err(ParseError::InsufficientBytes {
                expected: 1,
                actual: 0
            })
        );
    }

    #[test]
    fn test_binary_temp_and_humidity() {
        // 0x0916 = 2326 -> 23.26 degrees, 48 %
        let reading = TempAndHumidity::from_bytes(&[0x16, 0x09, 48, 0xB8, 0x0B]).unwrap();
        assert!((reading.temperature - 23.26).abs() < 1e-4);
        assert_eq!(reading.humidity, 48.0);
    }

    #[test]
    fn test_binary_temp_and_humidity_negative() {
        // -1050 = 0xFBE6
        let reading = TempAndHumidity::from_bytes(&[0xE6, 0xFB, 80]).unwrap();
        assert!((reading.temperature + 10.5).abs() < 1e-4);
    }

    #[test]
    fn test_binary_temp_and_humidity_short() {
        assert_eq!(
            TempAndHumidity::from_bytes(&[0x16, 0x09]),
            Err(ParseError::insufficient(3, 2))
        );
    }

    #[test]
    fn test_text_temp_and_humidity() {
        let reading = TempAndHumidity::from_text(b"T=29.0 H=52.3\0").unwrap();
        assert!((reading.temperature - 29.0).abs() < 1e-4);
        assert!((reading.humidity - 52.3).abs() < 1e-4);
    }

    #[test]
    fn test_text_temp_below_zero() {
        let reading = TempAndHumidity::from_text(b"T=-4.5 H=90.1").unwrap();
        assert!((reading.temperature + 4.5).abs() < 1e-4);
    }

    #[test]
    fn test_text_rejects_non_numeric_temperature() {
        let result = TempAndHumidity::from_text(b"T=abc H=52.3");
        assert!(matches!(result, Err(ParseError::Malformed(_))));
    }

    #[test]
    fn test_text_rejects_missing_humidity() {
        let result = TempAndHumidity::from_text(b"T=21.0");
        assert!(matches!(result, Err(ParseError::Malformed(_))));
    }

    #[test]
    fn test_text_rejects_invalid_utf8() {
        let result = TempAndHumidity::from_text(&[0xFF, 0xFE, 0x00]);
        assert!(matches!(result, Err(ParseError::Malformed(_))));
    }

    #[test]
    fn test_clock_layout() {
        // 0x65A0_BC00 = 1705032704, tz +2
        let clock = DeviceClock::from_bytes(&[0x00, 0xBC, 0xA0, 0x65, 0x02]).unwrap();
        assert_eq!(clock.timestamp, 0x65A0_BC00);
        assert_eq!(clock.tz_offset_hours, 2);
        assert_eq!(clock.to_bytes(), [0x00, 0xBC, 0xA0, 0x65, 0x02]);
    }

    #[test]
    fn test_clock_negative_offset_byte() {
        let clock = DeviceClock {
            timestamp: 1,
            tz_offset_hours: -5,
        };
        assert_eq!(clock.to_bytes(), [0x01, 0x00, 0x00, 0x00, 0xFB]);
    }

    #[test]
    fn test_clock_from_datetime_uses_whole_local_hours() {
        let clock =
            DeviceClock::from_datetime(datetime!(2024-03-01 12:00 UTC), offset!(+5:30)).unwrap();
        assert_eq!(clock.tz_offset_hours, 5);
        assert_eq!(clock.timestamp, 1_709_294_400);
    }

    #[test]
    fn test_clock_from_datetime_rejects_pre_epoch() {
        let result = DeviceClock::from_datetime(datetime!(1969-12-31 23:59 UTC), offset!(UTC));
        assert!(matches!(result, Err(ParseError::InvalidValue(_))));
    }

    #[test]
    fn test_clock_to_local_shifts_by_timezone_difference() {
        // Written from UTC+3, read back in UTC+1: shown two hours later.
        let clock = DeviceClock {
            timestamp: 1_709_294_400,
            tz_offset_hours: 3,
        };
        let local = clock.to_local(offset!(+1));
        assert_eq!(local.offset(), offset!(+1));
        assert_eq!(local, datetime!(2024-03-01 14:00 UTC));
    }

    #[test]
    fn test_history_index_overlapping_offset() {
        let data = [0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        let index = HistoryIndex::from_bytes(&data).unwrap();
        assert_eq!(index.last_calculated, 16);
        assert_eq!(index.next, 0);

        let data = [0x10, 0x00, 0x11, 0x00, 0x00, 0x00];
        let index = HistoryIndex::from_bytes(&data).unwrap();
        assert_eq!(index.last_calculated, 0x0011_0010);
        assert_eq!(index.next, 0x11);
    }

    #[test]
    fn test_history_index_final_record_saturates() {
        let index = HistoryIndex {
            last_calculated: 0,
            next: 0,
        };
        assert_eq!(index.final_record_index(), 0);
    }

    #[test]
    fn test_history_record_layout() {
        let data = [
            0x07, 0x00, 0x00, 0x00, // index 7
            0x80, 0x51, 0x01, 0x00, // timestamp 86400
            0xF4, 0x09, // max 25.48
            0x3C, // max hum 60
            0x0C, 0xFE, // min -5.00
            0x28, // min hum 40
        ];
        let record = HistoryRecord::from_bytes(&data).unwrap();
        assert_eq!(record.index, 7);
        assert_eq!(record.timestamp, 86_400);
        assert!((record.temperature_max - 25.48).abs() < 1e-4);
        assert_eq!(record.humidity_max, 60);
        assert!((record.temperature_min + 5.0).abs() < 1e-4);
        assert_eq!(record.humidity_min, 40);
        assert_eq!(record.recorded_at(), datetime!(1970-01-02 0:00 UTC));
        assert_eq!(record.to_bytes().unwrap(), data);
    }

    #[test]
    fn test_history_record_short() {
        let result = HistoryRecord::from_bytes(&[0u8; 13]);
        assert_eq!(result, Err(ParseError::insufficient(14, 13)));
    }
}
