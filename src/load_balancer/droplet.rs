//! Persisted backend identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A droplet as defined in the inventory file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Droplet {
    pub id: u64,
    pub name: String,
    pub private_ip: String,
    pub server_host: String,
    /// Empty means the backend is never probed.
    #[serde(default)]
    pub health_url: String,
    #[serde(rename = "started-time", with = "started_time", default = "Utc::now")]
    pub started: DateTime<Utc>,
}

impl Droplet {
    /// The health URL, if one is configured.
    pub fn health_url(&self) -> Option<&str> {
        let url = self.health_url.trim();
        (!url.is_empty()).then_some(url)
    }
}

/// The on-disk inventory document.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Droplets {
    #[serde(rename = "droplet", default)]
    pub droplets: Vec<Droplet>,
}

/// `started-time` is written as a native TOML datetime and read from either
/// a native datetime or an RFC 3339 string.
mod started_time {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};
    use toml::value::Datetime;

    pub fn serialize<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        let text = time.to_rfc3339_opts(SecondsFormat::AutoSi, true);
        let native: Datetime = text.parse().map_err(ser::Error::custom)?;
        native.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = match toml::Value::deserialize(deserializer)? {
            toml::Value::Datetime(datetime) => datetime.to_string(),
            toml::Value::String(text) => text,
            other => {
                return Err(de::Error::custom(format!(
                    "expected a datetime, found {}",
                    other.type_str()
                )))
            }
        };
        parse(&text).map_err(de::Error::custom)
    }

    fn parse(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        match DateTime::parse_from_rfc3339(text) {
            Ok(time) => Ok(time.with_timezone(&Utc)),
            // Local datetimes without an offset are taken as UTC.
            Err(e) => NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|naive| naive.and_utc())
                .map_err(|_| e),
        }
    }
}
