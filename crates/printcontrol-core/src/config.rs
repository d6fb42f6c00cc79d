//! Connection configuration
//!
//! Provides the [`ConnectionConfig`] value handed to the driver on connect,
//! plus explicit enumerations for every serial option. Each option type maps
//! names to values in both directions (`as_str` / `FromStr`) and lists its
//! choices in `ALL`, so front ends can build picklists without lookup tables.
//!
//! Configurations can be read from JSON or TOML files.

use crate::error::{ConnectionError, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Baud rates offered by front ends
pub const STANDARD_BAUD_RATES: [u32; 7] = [9600, 19200, 31250, 38400, 57600, 115200, 230400];

/// Defines an option enum with a bidirectional name mapping.
macro_rules! serial_option {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident => $label:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $label)]
                $variant,
            )+
        }

        impl $name {
            /// Every choice, in presentation order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Display name of this choice
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ConnectionError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                $name::ALL
                    .iter()
                    .copied()
                    .find(|choice| choice.as_str().eq_ignore_ascii_case(s.trim()))
                    .ok_or_else(|| ConnectionError::InvalidParameters {
                        reason: format!("unknown {} '{}'", stringify!($name), s),
                    })
            }
        }
    };
}

serial_option! {
    /// Parity checking mode
    Parity {
        /// No parity bit
        None => "None",
        /// Even parity
        Even => "Even",
        /// Odd parity
        Odd => "Odd",
    }
}

serial_option! {
    /// Number of stop bits
    StopBits {
        /// One stop bit
        One => "1",
        /// Two stop bits
        Two => "2",
    }
}

serial_option! {
    /// Flow control mode
    FlowControl {
        /// RTS/CTS
        Hardware => "Hardware",
        /// XON/XOFF
        Software => "Software",
        /// Hardware and software together
        Both => "Both",
        /// No flow control
        None => "None",
    }
}

serial_option! {
    /// Number of data bits per character
    DataBits {
        /// Seven bits
        Seven => "7",
        /// Eight bits
        Eight => "8",
    }
}

/// Serial connection configuration
///
/// Immutable once handed to a connect operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Device path (e.g. "/dev/ttyUSB0", "COM3")
    pub device_path: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Parity
    pub parity: Parity,
    /// Stop bits
    pub stop_bits: StopBits,
    /// Flow control
    pub flow_control: FlowControl,
    /// Data bits
    pub data_bits: DataBits,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            device_path: String::new(),
            baud_rate: 9600,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            data_bits: DataBits::Eight,
        }
    }
}

impl ConnectionConfig {
    /// Create a config for a device with default serial options
    pub fn new(device_path: impl Into<String>) -> Self {
        Self {
            device_path: device_path.into(),
            ..Self::default()
        }
    }

    /// Set the baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.device_path.trim().is_empty() {
            return Err(ConnectionError::InvalidParameters {
                reason: "device path is empty".to_string(),
            }
            .into());
        }
        if self.baud_rate == 0 {
            return Err(ConnectionError::InvalidParameters {
                reason: "baud rate must be > 0".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::other(format!("Failed to read config file: {}", e)))?;

        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .map_err(|e| Error::other(format!("Invalid JSON config: {}", e)))?
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content)
                .map_err(|e| Error::other(format!("Invalid TOML config: {}", e)))?
        } else {
            return Err(Error::other("Config file must be .json or .toml"));
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_names_round_trip() {
        for parity in Parity::ALL {
            assert_eq!(parity.as_str().parse::<Parity>().unwrap(), *parity);
        }
        assert_eq!("both".parse::<FlowControl>().unwrap(), FlowControl::Both);
        assert_eq!("2".parse::<StopBits>().unwrap(), StopBits::Two);
        assert!("9".parse::<DataBits>().is_err());
    }

    #[test]
    fn test_default_matches_front_end_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.flow_control, FlowControl::None);
        assert_eq!(config.data_bits, DataBits::Eight);
    }

    #[test]
    fn test_validate() {
        assert!(ConnectionConfig::default().validate().is_err());
        assert!(ConnectionConfig::new("/dev/ttyUSB0").validate().is_ok());
        assert!(ConnectionConfig::new("/dev/ttyUSB0")
            .with_baud_rate(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_toml_names() {
        let config: ConnectionConfig = toml::from_str(
            r#"
            device_path = "/dev/ttyACM0"
            baud_rate = 115200
            parity = "Even"
            stop_bits = "2"
            "#,
        )
        .unwrap();
        assert_eq!(config.parity, Parity::Even);
        assert_eq!(config.stop_bits, StopBits::Two);
        assert_eq!(config.data_bits, DataBits::Eight);
    }
}
