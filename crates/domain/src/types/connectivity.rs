//! Connectivity snapshot types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Raw reachability as reported by the platform.
///
/// Only `None` and `Unknown` count as disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reachability {
    None,
    #[default]
    Unknown,
    Wifi,
    Cellular,
    Ethernet,
    Bluetooth,
    Wimax,
    Vpn,
    Other,
}

impl Reachability {
    pub fn is_connected(self) -> bool {
        !matches!(self, Self::None | Self::Unknown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Unknown => "unknown",
            Self::Wifi => "wifi",
            Self::Cellular => "cellular",
            Self::Ethernet => "ethernet",
            Self::Bluetooth => "bluetooth",
            Self::Wimax => "wimax",
            Self::Vpn => "vpn",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Reachability {
    type Err = std::convert::Infallible;

    /// Lenient: platform strings we do not model map to `Other`, and the
    /// legacy `"none"`/`"unknown"` spellings are matched case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "none" => Self::None,
            "unknown" | "" => Self::Unknown,
            "wifi" => Self::Wifi,
            "cellular" | "cell" | "mobile" => Self::Cellular,
            "ethernet" => Self::Ethernet,
            "bluetooth" => Self::Bluetooth,
            "wimax" => Self::Wimax,
            "vpn" => Self::Vpn,
            _ => Self::Other,
        })
    }
}

/// Connectivity quality metadata attached to every status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetInfo {
    pub reach: Reachability,
    /// `None` when the platform cannot tell.
    #[serde(default)]
    pub is_connection_expensive: Option<bool>,
}

/// The two-valued signal the monitor reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityStatus {
    pub online: bool,
    pub net_info: NetInfo,
}

impl ConnectivityStatus {
    pub fn new(reach: Reachability, is_connection_expensive: Option<bool>) -> Self {
        Self { online: reach.is_connected(), net_info: NetInfo { reach, is_connection_expensive } }
    }

    pub fn offline() -> Self {
        Self::new(Reachability::None, None)
    }
}

/// Foreground/background transitions of the hosting application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    Active,
    Inactive,
    Background,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_none_and_unknown_are_disconnected() {
        assert!(!Reachability::None.is_connected());
        assert!(!Reachability::Unknown.is_connected());
        assert!(Reachability::Wifi.is_connected());
        assert!(Reachability::Cellular.is_connected());
        assert!(Reachability::Other.is_connected());
    }

    #[test]
    fn parses_platform_strings_leniently() {
        assert_eq!("NONE".parse::<Reachability>().unwrap(), Reachability::None);
        assert_eq!("wifi".parse::<Reachability>().unwrap(), Reachability::Wifi);
        assert_eq!("".parse::<Reachability>().unwrap(), Reachability::Unknown);
        assert_eq!("satellite".parse::<Reachability>().unwrap(), Reachability::Other);
    }

    #[test]
    fn net_info_uses_camel_case_on_the_wire() {
        let status = ConnectivityStatus::new(Reachability::Cellular, Some(true));
        let value = serde_json::to_value(status).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "online": true,
                "netInfo": {"reach": "cellular", "isConnectionExpensive": true}
            })
        );
    }
}
