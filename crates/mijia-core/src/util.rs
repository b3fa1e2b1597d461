//! Peripheral identifier helpers.

use btleplug::platform::PeripheralId;

const ZERO_ADDRESS: &str = "00:00:00:00:00:00";

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are CoreBluetooth UUIDs; elsewhere they wrap the
/// MAC address.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Create an identifier string from an address and peripheral ID.
///
/// macOS reports every address as `00:00:00:00:00:00`, so the peripheral ID is
/// used there instead.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    if address == ZERO_ADDRESS {
        format_peripheral_id(peripheral_id)
    } else {
        address.to_string()
    }
}

/// Whether a user-supplied identifier names this address.
///
/// Comparison ignores case and colon separators; the all-zero macOS
/// placeholder never matches.
pub fn address_matches(address: &str, wanted: &str) -> bool {
    if address == ZERO_ADDRESS {
        return false;
    }
    let strip = |s: &str| s.replace(':', "").to_ascii_lowercase();
    strip(address) == strip(wanted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_matches_ignores_case_and_separators() {
        assert!(address_matches("E7:2E:00:AA:BB:CC", "e7:2e:00:aa:bb:cc"));
        assert!(address_matches("E7:2E:00:AA:BB:CC", "e72e00aabbcc"));
        assert!(!address_matches("E7:2E:00:AA:BB:CC", "e72e00aabbcd"));
    }

    #[test]
    fn test_zero_address_never_matches() {
        assert!(!address_matches(ZERO_ADDRESS, ZERO_ADDRESS));
        assert!(!address_matches(ZERO_ADDRESS, "000000000000"));
    }

    mod proptests {
        use super::*;
        use crate::device::parse_id;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn address_matches_any_spelling(bytes in proptest::array::uniform6(1u8..=255)) {
                let upper = bytes
                    .iter()
                    .map(|b| format!("{b:02X}"))
                    .collect::<Vec<_>>()
                    .join(":");
                let bare = upper.replace(':', "").to_ascii_lowercase();
                prop_assert!(address_matches(&upper, &bare));
                prop_assert!(address_matches(&upper, &upper.to_ascii_lowercase()));
            }

            #[test]
            fn short_ids_expand_to_sig_base(short in any::<u16>()) {
                let id = parse_id(&format!("{short:04x}")).unwrap();
                prop_assert_eq!(id.to_string(), format!("0000{short:04x}-0000-1000-8000-00805f9b34fb"));
                prop_assert_eq!(parse_id(&format!("0x{short:04X}")).unwrap(), id);
            }
        }
    }
}
