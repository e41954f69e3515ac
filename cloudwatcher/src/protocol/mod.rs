//! Protocol implementations.

pub mod command;
pub mod frame;

use {crate::link::LinkConfig, std::fmt};

// Re-export common types
pub use {
    command::{Command, HeaterPwm},
    frame::{FRAME_LEN, Frame, HANDSHAKE, extract_bytes, extract_int, extract_string, read_frames},
};

/// Firmware generations of the station protocol.
///
/// The command set and framing are shared; the generations differ in line
/// settings and in what the host does right after opening the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolVariant {
    /// Older firmware: odd parity, inter-byte timeout, no probing on open.
    Legacy,
    /// Current firmware: no parity, electrical constants probed on open.
    #[default]
    Current,
}

impl ProtocolVariant {
    /// Normal-mode line settings for this generation.
    pub fn link_config(self) -> LinkConfig {
        match self {
            Self::Legacy => LinkConfig::legacy(),
            Self::Current => LinkConfig::normal(),
        }
    }

    /// Whether the electrical constants are read when the station is opened.
    pub fn probes_constants_on_open(self) -> bool {
        matches!(self, Self::Current)
    }

    /// Get the variant from a string name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "legacy" | "old" => Some(Self::Legacy),
            "current" | "latest" => Some(Self::Current),
            _ => None,
        }
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::Current => write!(f, "current"),
        }
    }
}
