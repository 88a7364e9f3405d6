//! Deserializing hosts-file entries.
//!
//! An entry is either a bare `[user@]host[:port]` string, parsed the same way as `--server`,
//! or a mapping with a required `hostname` and an optional `user`.

use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::host::HostEntry;

const FIELDS: &[&str] = &["hostname", "user"];

struct HostEntryVisitor;

impl<'de> Visitor<'de> for HostEntryVisitor {
    type Value = HostEntry;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("host string or mapping with a 'hostname' key")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match value.parse::<HostEntry>() {
            Ok(entry) => Ok(entry),
            Err(void) => void::unreachable(void),
        }
    }

    fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let mut hostname: Option<String> = None;
        let mut user: Option<String> = None;
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "hostname" => {
                    if hostname.is_some() {
                        return Err(de::Error::duplicate_field("hostname"));
                    }
                    hostname = Some(map.next_value()?);
                }
                "user" => {
                    if user.is_some() {
                        return Err(de::Error::duplicate_field("user"));
                    }
                    user = map.next_value()?;
                }
                other => return Err(de::Error::unknown_field(other, FIELDS)),
            }
        }
        let hostname = hostname.ok_or_else(|| de::Error::missing_field("hostname"))?;
        Ok(HostEntry { hostname, user })
    }
}

impl<'de> Deserialize<'de> for HostEntry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(HostEntryVisitor)
    }
}
