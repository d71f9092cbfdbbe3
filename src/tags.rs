// Auto-tag derivation for newly created vehicles

pub const LUXURY_PRICE: i64 = 200_000;
pub const EXOTIC_PRICE: i64 = 300_000;
pub const NEW_MODEL_YEAR: i32 = 2022;
pub const LOW_MILEAGE: i64 = 5_000;

const PREMIUM_MAKES: [&str; 4] = ["BMW", "MERCEDES", "AUDI", "PORSCHE"];
const SUPERCAR_MAKES: [&str; 3] = ["FERRARI", "LAMBORGHINI", "MCLAREN"];

/// Derives display tags from the creation-time attributes of a vehicle.
///
/// The output order is the display order: LUXURY, EXOTIC, NEW, LOW MILEAGE,
/// PREMIUM, SUPERCAR. Only called when a vehicle is created with auto-tagging
/// or when an admin explicitly re-tags it.
///
/// A 2023 Ferrari priced at 325,000 gets exactly LUXURY, EXOTIC, NEW and
/// SUPERCAR only when its mileage is at least 5,000; below that LOW MILEAGE
/// is added as well.
pub fn derive_tags(make: &str, year: i32, price: i64, mileage: i64) -> Vec<String> {
    derive_stored_tags(make, Some(year), Some(price), Some(mileage))
}

/// Same rules for a stored vehicle whose numbers may be missing or malformed.
/// An absent value never earns the tag it governs.
pub fn derive_stored_tags(
    make: &str,
    year: Option<i32>,
    price: Option<i64>,
    mileage: Option<i64>,
) -> Vec<String> {
    let make = make.trim().to_uppercase();
    let mut tags = Vec::new();

    if price.is_some_and(|p| p > LUXURY_PRICE) {
        tags.push("LUXURY");
    }
    if price.is_some_and(|p| p > EXOTIC_PRICE) {
        tags.push("EXOTIC");
    }
    if year.is_some_and(|y| y >= NEW_MODEL_YEAR) {
        tags.push("NEW");
    }
    // Negative mileage is malformed, not low
    if mileage.is_some_and(|m| (0..LOW_MILEAGE).contains(&m)) {
        tags.push("LOW MILEAGE");
    }
    if PREMIUM_MAKES.contains(&make.as_str()) {
        tags.push("PREMIUM");
    }
    if SUPERCAR_MAKES.contains(&make.as_str()) {
        tags.push("SUPERCAR");
    }

    tags.into_iter().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ferrari_gets_supercar_not_premium() {
        assert_eq!(
            derive_tags("Ferrari", 2023, 325_000, 1_200),
            vec!["LUXURY", "EXOTIC", "NEW", "LOW MILEAGE", "SUPERCAR"]
        );
        assert_eq!(
            derive_tags("Ferrari", 2023, 325_000, 12_000),
            vec!["LUXURY", "EXOTIC", "NEW", "SUPERCAR"]
        );
    }

    #[test]
    fn derivation_is_deterministic() {
        let first = derive_tags("porsche", 2024, 210_000, 300);
        let second = derive_tags("porsche", 2024, 210_000, 300);
        assert_eq!(first, second);
        assert_eq!(first, vec!["LUXURY", "NEW", "LOW MILEAGE", "PREMIUM"]);
    }

    #[test]
    fn thresholds_are_strict_for_price_and_inclusive_for_year() {
        assert_eq!(derive_tags("Audi", 2022, 200_000, 10_000), vec!["NEW", "PREMIUM"]);
        assert_eq!(derive_tags("Audi", 2021, 200_001, 5_000), vec!["LUXURY", "PREMIUM"]);
        assert_eq!(
            derive_tags("  mclaren ", 2019, 300_000, 4_999),
            vec!["LUXURY", "LOW MILEAGE", "SUPERCAR"]
        );
    }

    #[test]
    fn plain_vehicle_gets_no_tags() {
        assert!(derive_tags("Toyota", 2015, 12_000, 90_000).is_empty());
        assert!(derive_tags("Toyota", 2015, 12_000, -5).is_empty());
    }

    #[test]
    fn missing_numbers_earn_no_threshold_tags() {
        assert_eq!(derive_stored_tags("BMW", None, None, None), vec!["PREMIUM"]);
        assert_eq!(
            derive_stored_tags("Lamborghini", Some(2024), None, Some(80)),
            vec!["NEW", "LOW MILEAGE", "SUPERCAR"]
        );
    }
}
