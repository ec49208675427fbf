//! The detector's parameter tree layout.

use serde_json::{Map, Value, json};

use super::tree::{Leaf, ParameterTree};
use super::value::{
    from_f64, to_bool, to_f64, to_i64, to_string, to_string_list, to_trigger_mode, to_u32,
};
use crate::Result;
use crate::message::{Params, Verb};
use crate::state::DetectorState;

/// Groups whose fields live on the device. A direct write to one of their
/// leaves is pushed to the control server; everything else stays local.
pub const DEVICE_GROUPS: [&str; 2] = ["xsp", "daq"];

/// Leaves carried by the initial configure message.
pub const CONFIG_PATHS: [&str; 10] = [
    "xsp/base_ip",
    "xsp/num_cards",
    "xsp/num_tf",
    "xsp/max_channels",
    "xsp/max_spectra",
    "xsp/config_path",
    "xsp/debug",
    "xsp/run_flags",
    "daq/enabled",
    "daq/endpoints",
];

macro_rules! field {
    ($tree:ident, $path:literal, $field:ident, $conv:path) => {
        $tree.insert(
            $path,
            Leaf::field(
                |s: &DetectorState| json!(s.$field),
                |s: &mut DetectorState, v: &Value| {
                    s.$field = $conv(v)?;
                    Ok(())
                },
            ),
        )?
    };
    ($tree:ident, $path:literal, $field:ident, $conv:path, $render:path) => {
        $tree.insert(
            $path,
            Leaf::field(
                |s: &DetectorState| $render(s.$field),
                |s: &mut DetectorState, v: &Value| {
                    s.$field = $conv(v)?;
                    Ok(())
                },
            ),
        )?
    };
}

pub fn detector_tree() -> Result<ParameterTree<DetectorState>> {
    let mut tree = ParameterTree::new();

    field!(tree, "debug_level", debug_level, to_u32);
    field!(tree, "ctrl_endpoint", ctrl_endpoint, to_string);

    field!(tree, "xsp/num_cards", num_cards, to_u32);
    field!(tree, "xsp/num_tf", num_tf, to_u32);
    field!(tree, "xsp/base_ip", base_ip, to_string);
    field!(tree, "xsp/max_channels", max_channels, to_u32);
    field!(tree, "xsp/max_spectra", max_spectra, to_u32);
    field!(tree, "xsp/debug", debug, to_u32);
    field!(tree, "xsp/config_path", settings_path, to_string);
    field!(tree, "xsp/config_save_path", settings_save_path, to_string);
    field!(tree, "xsp/use_resgrades", use_resgrades, to_bool);
    field!(tree, "xsp/run_flags", run_flags, to_u32);
    field!(tree, "xsp/dtc_energy", dtc_energy, to_f64, from_f64);
    field!(tree, "xsp/invert_f0", invert_f0, to_bool);
    field!(tree, "xsp/invert_veto", invert_veto, to_bool);
    field!(tree, "xsp/debounce", debounce, to_i64);
    field!(tree, "xsp/exposure_time", exposure_time, to_f64, from_f64);
    field!(tree, "xsp/frames", frames, to_u32);

    // Reported as the numeric code, settable by code or name.
    tree.insert(
        "xsp/trigger_mode",
        Leaf::field(
            |s: &DetectorState| json!(s.trigger_mode.map(|m| m.code())),
            |s: &mut DetectorState, v: &Value| {
                s.trigger_mode = Some(to_trigger_mode(v)?);
                Ok(())
            },
        ),
    )?;

    field!(tree, "daq/enabled", daq_enabled, to_bool);
    field!(tree, "daq/endpoints", daq_endpoints, to_string_list);

    for verb in Verb::COMMANDS {
        tree.insert(&format!("cmd/{verb}"), Leaf::command(verb))?;
    }

    Ok(tree)
}

/// Place `value` at `path` inside `params`, creating objects on the way.
pub fn insert_nested(params: &mut Params, path: &str, value: Value) {
    let mut parts = path.split('/').filter(|s| !s.is_empty()).peekable();
    let mut map = params;
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            map.insert(part.to_string(), value);
            return;
        }
        let slot = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(next) = slot else {
            return;
        };
        map = next;
    }
}

/// The device group a path belongs to, if any.
pub fn device_group(path: &str) -> Option<&'static str> {
    let head = path.trim_start_matches('/').split('/').next()?;
    DEVICE_GROUPS.iter().copied().find(|g| *g == head)
}
