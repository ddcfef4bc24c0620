//! Address value object

use serde::{Deserialize, Serialize};

/// Postal address embedded in a member or a delivery.
///
/// Immutable; compared by value. Changing an address means replacing it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    city: String,
    street: String,
    zipcode: String,
}

impl Address {
    pub fn new(
        city: impl Into<String>,
        street: impl Into<String>,
        zipcode: impl Into<String>,
    ) -> Self {
        Self {
            city: city.into(),
            street: street.into(),
            zipcode: zipcode.into(),
        }
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn street(&self) -> &str {
        &self.street
    }

    pub fn zipcode(&self) -> &str {
        &self.zipcode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_value_equality() {
        let a = Address::new("Incheon", "Gulporo", "21328");
        let b = Address::new("Incheon", "Gulporo", "21328");
        let c = Address::new("Seoul", "Gulporo", "21328");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.city(), "Incheon");
    }

    #[test]
    fn test_address_json_shape() {
        let json = serde_json::to_value(Address::new("Incheon", "Gulporo", "21328")).unwrap();
        assert_eq!(json["city"], "Incheon");
        assert_eq!(json["street"], "Gulporo");
        assert_eq!(json["zipcode"], "21328");
    }
}
