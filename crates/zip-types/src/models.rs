use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a stored or submitted enum string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Implements `as_str`, `Display` and `FromStr` over the SCREAMING_SNAKE_CASE
/// names that are both the wire format and the stored column value.
macro_rules! string_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok($ty::$variant),)+
                    _ => Err(UnknownVariant { kind: $kind, value: s.to_string() }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Renter,
    PropertyOwner,
}

string_enum!(UserRole, "user role", {
    Renter => "RENTER",
    PropertyOwner => "PROPERTY_OWNER",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyType {
    Shared,
    Studio,
    Private,
    Homestay,
    House,
}

string_enum!(PropertyType, "property type", {
    Shared => "SHARED",
    Studio => "STUDIO",
    Private => "PRIVATE",
    Homestay => "HOMESTAY",
    House => "HOUSE",
});

/// Verification package level, ordered by price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationTier {
    Standard,
    Comprehensive,
    Premium,
}

string_enum!(VerificationTier, "verification tier", {
    Standard => "STANDARD",
    Comprehensive => "COMPREHENSIVE",
    Premium => "PREMIUM",
});

pub const PACKAGE_CURRENCY: &str = "USD";

impl VerificationTier {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Standard => "Standard Verification",
            Self::Comprehensive => "Comprehensive Verification",
            Self::Premium => "Premium Verification",
        }
    }

    /// Current catalog price in whole currency units. Orders copy this at
    /// creation; it is never consulted for orders already placed.
    pub fn price(&self) -> i64 {
        match self {
            Self::Standard => 149,
            Self::Comprehensive => 249,
            Self::Premium => 399,
        }
    }

    /// Only the lowest tier has a hosted payment link.
    pub fn supports_hosted_checkout(&self) -> bool {
        matches!(self, Self::Standard)
    }
}

/// Lifecycle stage of a verification order. `Paid` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStage {
    PendingPayment,
    Paid,
}

string_enum!(OrderStage, "order stage", {
    PendingPayment => "PENDING_PAYMENT",
    Paid => "PAID",
});

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationPackage {
    pub package_type: VerificationTier,
    pub name: &'static str,
    pub price: i64,
    pub currency: &'static str,
}

pub fn package_catalog() -> Vec<VerificationPackage> {
    VerificationTier::ALL
        .iter()
        .map(|tier| VerificationPackage {
            package_type: *tier,
            name: tier.display_name(),
            price: tier.price(),
            currency: PACKAGE_CURRENCY,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lists_three_tiers_in_price_order() {
        let catalog = package_catalog();
        let prices: Vec<i64> = catalog.iter().map(|p| p.price).collect();
        assert_eq!(prices, vec![149, 249, 399]);
        assert!(catalog.iter().all(|p| p.currency == "USD"));
        assert_eq!(catalog[0].package_type, VerificationTier::Standard);
    }

    #[test]
    fn enum_strings_match_serde_names() {
        for tier in VerificationTier::ALL {
            let json = serde_json::to_string(tier).unwrap();
            assert_eq!(json, format!("\"{}\"", tier.as_str()));
            assert_eq!(tier.as_str().parse::<VerificationTier>().unwrap(), *tier);
        }
        assert_eq!("PROPERTY_OWNER".parse::<UserRole>().unwrap(), UserRole::PropertyOwner);
        assert_eq!("PENDING_PAYMENT".parse::<OrderStage>().unwrap(), OrderStage::PendingPayment);
    }

    #[test]
    fn unknown_variant_is_rejected() {
        let err = "PAID_STANDARD".parse::<OrderStage>().unwrap_err();
        assert_eq!(err.to_string(), "unknown order stage 'PAID_STANDARD'");
        assert!("apartment".parse::<PropertyType>().is_err());
    }

    #[test]
    fn only_standard_has_hosted_checkout() {
        assert!(VerificationTier::Standard.supports_hosted_checkout());
        assert!(!VerificationTier::Comprehensive.supports_hosted_checkout());
        assert!(!VerificationTier::Premium.supports_hosted_checkout());
    }
}
