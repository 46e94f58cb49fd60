//! `serde` helpers that encode [`Decimal`] as a string at envelope payload
//! boundaries, so monetary values never round-trip through a float.

use rust_decimal::Decimal;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

/// Serialize a [`Decimal`] as its exact string representation.
pub fn serialize<S>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    value.to_string().serialize(serializer)
}

/// Deserialize a [`Decimal`] from its string representation.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse::<Decimal>().map_err(D::Error::custom)
}

/// As above, but for an `Option<Decimal>`.
pub mod option {
    use super::*;

    pub fn serialize<S>(value: &Option<Decimal>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.map(|d| d.to_string()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|s| s.parse::<Decimal>().map_err(D::Error::custom))
            .transpose()
    }
}
