//! Local mirror of the detector's configuration.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, FromRepr};

/// Hardware trigger source.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    AsRefStr,
    Display,
    EnumIter,
    FromRepr,
)]
#[repr(u8)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum TriggerMode {
    Software = 0,
    TtlRisingEdge = 1,
    Burst = 2,
    TtlVetoOnly = 3,
    SoftwareStartStop = 4,
    Idc = 5,
    TtlBoth = 6,
    LvdsVetoOnly = 7,
    LvdsBoth = 8,
}

impl TriggerMode {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a mode name, with or without the `tm_` prefix.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        let name = name
            .strip_prefix("tm_")
            .or_else(|| name.strip_prefix("TM_"))
            .unwrap_or(name);
        name.parse().ok()
    }
}

/// Every field the parameter tree exposes, typed.
///
/// All fields start zeroed; they only reflect the hardware after the first
/// configuration push has been followed by a poll reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectorState {
    pub debug_level: u32,
    pub ctrl_endpoint: String,

    pub num_cards: u32,
    pub num_tf: u32,
    pub base_ip: String,
    pub max_channels: u32,
    pub max_spectra: u32,
    pub debug: u32,
    pub settings_path: String,
    pub settings_save_path: String,
    pub use_resgrades: bool,
    pub run_flags: u32,
    pub dtc_energy: f64,
    pub trigger_mode: Option<TriggerMode>,
    pub invert_f0: bool,
    pub invert_veto: bool,
    // Opaque: the hardware takes an integer, meaning undocumented.
    pub debounce: i64,
    pub exposure_time: f64,
    pub frames: u32,

    pub daq_enabled: bool,
    pub daq_endpoints: Vec<String>,
}

/// Values pushed to the control server by the initial configure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    pub num_cards: u32,
    pub num_tf: u32,
    pub base_ip: String,
    pub max_channels: u32,
    pub max_spectra: u32,
    pub settings_path: String,
    pub run_flags: u32,
    pub debug: u32,
    pub daq_endpoints: Vec<String>,
}

impl DetectorState {
    pub(crate) fn apply_settings(&mut self, settings: &DetectorSettings) {
        self.num_cards = settings.num_cards;
        self.num_tf = settings.num_tf;
        self.base_ip = settings.base_ip.clone();
        self.max_channels = settings.max_channels;
        self.max_spectra = settings.max_spectra;
        self.settings_path = settings.settings_path.clone();
        self.run_flags = settings.run_flags;
        self.debug = settings.debug;
        self.daq_endpoints = settings.daq_endpoints.clone();
        self.daq_enabled = !settings.daq_endpoints.is_empty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_trigger_mode_codes() {
        for (i, mode) in TriggerMode::iter().enumerate() {
            assert_eq!(mode.code() as usize, i);
            assert_eq!(TriggerMode::from_repr(i as u8), Some(mode));
        }
        assert_eq!(TriggerMode::from_repr(9), None);
    }

    #[test]
    fn test_trigger_mode_names() {
        assert_eq!(TriggerMode::from_name("burst"), Some(TriggerMode::Burst));
        assert_eq!(
            TriggerMode::from_name("TM_TTL_RISING_EDGE"),
            Some(TriggerMode::TtlRisingEdge)
        );
        assert_eq!(TriggerMode::LvdsVetoOnly.as_ref(), "lvds_veto_only");
        assert_eq!(TriggerMode::from_name("sometimes"), None);
    }

    #[test]
    fn test_apply_settings() {
        let mut state = DetectorState::default();
        state.apply_settings(&DetectorSettings {
            num_cards: 4,
            base_ip: "192.168.0.1".into(),
            daq_endpoints: vec!["tcp://127.0.0.1:15150".into()],
            ..Default::default()
        });
        assert_eq!(state.num_cards, 4);
        assert_eq!(state.base_ip, "192.168.0.1");
        assert!(state.daq_enabled);
    }
}
