//! Immediate Command Creator
//!
//! Maps the manual controls of a printer (homing, fans, heaters, extruder,
//! jogging) onto the G-Code lines that perform them.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Set of axes for homing
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Axes: u8 {
        /// X axis
        const X = 0b001;
        /// Y axis
        const Y = 0b010;
        /// Z axis
        const Z = 0b100;
    }
}

impl Axes {
    /// Axis letters present in the set, in X, Y, Z order
    pub fn letters(&self) -> Vec<char> {
        [(Axes::X, 'X'), (Axes::Y, 'Y'), (Axes::Z, 'Z')]
            .into_iter()
            .filter(|(axis, _)| self.contains(*axis))
            .map(|(_, letter)| letter)
            .collect()
    }
}

/// A single jog axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// X axis
    X,
    /// Y axis
    Y,
    /// Z axis
    Z,
}

impl Axis {
    /// Axis letter
    pub fn letter(&self) -> char {
        match self {
            Self::X => 'X',
            Self::Y => 'Y',
            Self::Z => 'Z',
        }
    }
}

/// Manual command issued outside of a print job
#[derive(Debug, Clone, PartialEq)]
pub enum ImmediateCommand {
    /// Home the given axes (all axes when empty)
    Home(Axes),
    /// Set a fan speed (0-255)
    Fan {
        /// Fan index
        channel: u8,
        /// PWM value
        speed: u8,
    },
    /// Set a hot-end target temperature in °C
    HotendTemperature {
        /// Extruder index
        channel: u8,
        /// Target in °C
        celsius: f64,
    },
    /// Set the bed target temperature in °C
    BedTemperature(f64),
    /// Extrude (positive) or retract (negative) filament, in mm
    Extrude(f64),
    /// Relative move of one axis
    Jog {
        /// Axis to move
        axis: Axis,
        /// Distance in mm, signed
        distance: f64,
        /// Feed rate in mm/min
        feed_rate: f64,
    },
    /// Raw G-Code line
    Raw(String),
}

impl ImmediateCommand {
    /// Retract `mm` of filament
    pub fn retract(mm: f64) -> Self {
        Self::Extrude(-mm.abs())
    }

    /// The G-Code lines for this command, in sending order
    pub fn to_gcode(&self) -> Vec<String> {
        match self {
            Self::Home(axes) => {
                let mut cmd = "G28".to_string();
                for letter in axes.letters() {
                    cmd.push(' ');
                    cmd.push(letter);
                }
                vec![cmd]
            }
            Self::Fan { channel, speed } => vec![format!("M106 P{} S{}", channel, speed)],
            Self::HotendTemperature { channel, celsius } => {
                vec![format!("M104 T{} S{}", channel, celsius)]
            }
            Self::BedTemperature(celsius) => vec![format!("M140 S{}", celsius)],
            Self::Extrude(mm) => vec!["M83".to_string(), format!("G1 E{}", mm)],
            Self::Jog {
                axis,
                distance,
                feed_rate,
            } => vec![
                "G91".to_string(),
                format!("G1 {}{} F{}", axis.letter(), distance, feed_rate),
                "G90".to_string(),
            ],
            Self::Raw(line) => vec![line.clone()],
        }
    }
}

impl fmt::Display for ImmediateCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_gcode().join(" | "))
    }
}
