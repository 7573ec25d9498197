use serde_json::Value;

use crate::db_types::ShippingAddress;

// Historical field names seen in stored shipping blocks, oldest layouts last. The first name that yields a
// non-empty string wins.
const ADDR1_KEYS: [&str; 5] = ["addr1", "address1", "address_1", "line1", "street"];
const ADDR2_KEYS: [&str; 4] = ["addr2", "address2", "address_2", "line2"];
const CITY_KEYS: [&str; 3] = ["city", "town", "locality"];
const STATE_KEYS: [&str; 5] = ["state", "province", "region", "state_code", "province_code"];
const POSTAL_KEYS: [&str; 4] = ["postal", "postal_code", "postcode", "zip"];
const COUNTRY_KEYS: [&str; 2] = ["country", "country_code"];

/// Collapse a stored shipping block, which may use any of several historical field layouts, into the canonical
/// [`ShippingAddress`] shape. Absent, null, or non-object input yields an empty address.
pub fn normalize_shipping(raw: Option<&Value>) -> ShippingAddress {
    let Some(Value::Object(map)) = raw else {
        return ShippingAddress::default();
    };
    let pick = |keys: &[&str]| {
        keys.iter()
            .filter_map(|k| map.get(*k))
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(String::from)
    };
    ShippingAddress {
        addr1: pick(&ADDR1_KEYS),
        addr2: pick(&ADDR2_KEYS),
        city: pick(&CITY_KEYS),
        state: pick(&STATE_KEYS),
        postal: pick(&POSTAL_KEYS),
        country: pick(&COUNTRY_KEYS),
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn canonical_shape_passes_through() {
        let raw = json!({
            "addr1": "10 Oolong Lane", "addr2": "Unit 4", "city": "Leafton",
            "state": "WA", "postal": "98001", "country": "US"
        });
        let addr = normalize_shipping(Some(&raw));
        assert_eq!(addr.addr1.as_deref(), Some("10 Oolong Lane"));
        assert_eq!(addr.addr2.as_deref(), Some("Unit 4"));
        assert_eq!(addr.city.as_deref(), Some("Leafton"));
        assert_eq!(addr.state.as_deref(), Some("WA"));
        assert_eq!(addr.postal.as_deref(), Some("98001"));
        assert_eq!(addr.country.as_deref(), Some("US"));
    }

    #[test]
    fn legacy_field_names_are_collapsed() {
        let raw = json!({
            "address_1": "5 Sencha St",
            "line2": "Floor 2",
            "town": "Brewville",
            "province": "ON",
            "zip": "M5V 1A1",
            "country_code": "CA"
        });
        let addr = normalize_shipping(Some(&raw));
        assert_eq!(addr.addr1.as_deref(), Some("5 Sencha St"));
        assert_eq!(addr.addr2.as_deref(), Some("Floor 2"));
        assert_eq!(addr.city.as_deref(), Some("Brewville"));
        assert_eq!(addr.state.as_deref(), Some("ON"));
        assert_eq!(addr.postal.as_deref(), Some("M5V 1A1"));
        assert_eq!(addr.country.as_deref(), Some("CA"));
    }

    #[test]
    fn newer_names_take_precedence_over_older_ones() {
        let raw = json!({ "addr1": "Current", "street": "Ancient" });
        assert_eq!(normalize_shipping(Some(&raw)).addr1.as_deref(), Some("Current"));
    }

    #[test]
    fn blank_strings_are_skipped() {
        let raw = json!({ "addr1": "  ", "line1": "Fallback Rd" });
        assert_eq!(normalize_shipping(Some(&raw)).addr1.as_deref(), Some("Fallback Rd"));
    }

    #[test]
    fn missing_or_malformed_input_is_empty() {
        assert!(normalize_shipping(None).is_empty());
        assert!(normalize_shipping(Some(&json!(null))).is_empty());
        assert!(normalize_shipping(Some(&json!("not an object"))).is_empty());
    }

    #[test]
    fn normalization_is_idempotent() {
        let raw = json!({ "zip": "98001", "province": "WA" });
        let once = normalize_shipping(Some(&raw));
        let canonical = serde_json::to_value(&once).unwrap();
        let twice = normalize_shipping(Some(&canonical));
        assert_eq!(once, twice);
    }
}
