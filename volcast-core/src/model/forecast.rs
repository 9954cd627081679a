//! Day-indexed variance forecast.
//!
//! Serialized as a JSON object `{"1": v1, "2": v2, ...}`. Entry order is
//! preserved in both directions, since the on-chain submission sends the
//! values in document order.

use super::ModelError;
use indexmap::IndexMap;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Default)]
pub struct Forecast {
    entries: IndexMap<String, f64>,
}

impl Forecast {
    /// Key a variance path as days `"1"..="len"`.
    pub fn from_variances(variances: &[f64]) -> Result<Self, ModelError> {
        let mut entries = IndexMap::new();
        entries
            .try_reserve_exact(variances.len())
            .map_err(|_| ModelError::HorizonTooLarge(variances.len()))?;
        for (i, &v) in variances.iter().enumerate() {
            entries.insert((i + 1).to_string(), v);
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, day: &str) -> Option<f64> {
        self.entries.get(day).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Values in entry order.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.values().copied()
    }

    /// Insert or overwrite in place, keeping first-seen position.
    pub fn insert(&mut self, day: impl Into<String>, value: f64) {
        self.entries.insert(day.into(), value);
    }
}

/// Order-sensitive: two forecasts with the same days in a different order differ.
impl PartialEq for Forecast {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len() && self.entries.iter().eq(other.entries.iter())
    }
}

impl FromIterator<(String, f64)> for Forecast {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Serialize for Forecast {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct ForecastVisitor;

impl<'de> Visitor<'de> for ForecastVisitor {
    type Value = Forecast;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of day index to variance")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Forecast, A::Error> {
        let mut forecast = Forecast {
            entries: IndexMap::with_capacity(access.size_hint().unwrap_or(0).min(4096)),
        };
        while let Some((k, v)) = access.next_entry::<String, f64>()? {
            forecast.insert(k, v);
        }
        Ok(forecast)
    }
}

impl<'de> Deserialize<'de> for Forecast {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ForecastVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_one_indexed() {
        let f = Forecast::from_variances(&[0.1, 0.2, 0.3]).unwrap();
        let keys: Vec<&str> = f.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["1", "2", "3"]);
        assert_eq!(f.get("2"), Some(0.2));
        assert_eq!(f.get("0"), None);
    }

    #[test]
    fn serializes_in_day_order_past_nine() {
        let f = Forecast::from_variances(&[1.0; 11]).unwrap();
        let json = serde_json::to_string(&f).unwrap();
        assert!(json.starts_with(r#"{"1":1.0,"2":1.0"#));
        assert!(json.find(r#""9""#).unwrap() < json.find(r#""10""#).unwrap());
    }

    #[test]
    fn deserialize_keeps_document_order() {
        let f: Forecast = serde_json::from_str(r#"{"3": 0.3, "1": 0.1, "2": 0.2}"#).unwrap();
        assert_eq!(f.values().collect::<Vec<_>>(), vec![0.3, 0.1, 0.2]);
    }

    #[test]
    fn duplicate_key_overwrites_in_place() {
        let f: Forecast = serde_json::from_str(r#"{"1": 0.1, "2": 0.2, "1": 0.5}"#).unwrap();
        assert_eq!(f.len(), 2);
        assert_eq!(f.values().collect::<Vec<_>>(), vec![0.5, 0.2]);
    }

    #[test]
    fn rejects_non_numeric_values() {
        assert!(serde_json::from_str::<Forecast>(r#"{"1": "high"}"#).is_err());
    }

    #[test]
    fn equality_is_order_sensitive() {
        let a: Forecast = serde_json::from_str(r#"{"1": 0.1, "2": 0.2}"#).unwrap();
        let b: Forecast = serde_json::from_str(r#"{"2": 0.2, "1": 0.1}"#).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, Forecast::from_variances(&[0.1, 0.2]).unwrap());
    }

    #[test]
    fn large_body_deserializes_in_linear_time() {
        let n = 150_000;
        let mut json = String::from("{");
        for day in 1..=n {
            if day > 1 {
                json.push(',');
            }
            json.push_str(&format!(r#""{day}":0.{day}"#));
        }
        json.push('}');

        let started = std::time::Instant::now();
        let f: Forecast = serde_json::from_str(&json).unwrap();
        assert!(
            started.elapsed() < std::time::Duration::from_secs(10),
            "took {:?}",
            started.elapsed()
        );
        assert_eq!(f.len(), n);
        assert_eq!(f.iter().last().map(|(k, _)| k), Some("150000"));
        assert!(f.get("75000").is_some());
    }
}
