#![allow(dead_code)]

use serde_json::Value;
use xspress_z::{
    Builder, Detector, DetectorBuilder,
    config::DetectorConfig,
    message::{self, Message, Params, Verb},
    state::DetectorSettings,
    transport::{MockLink, mock::MockConfig},
};

pub fn mock_detector(config: DetectorConfig) -> (Detector<MockLink>, MockLink) {
    let detector = DetectorBuilder::<MockLink>::with_link_config(config, MockConfig::default())
        .build()
        .expect("mock detector");
    let link = detector.client().link().clone();
    (detector, link)
}

pub fn settings() -> DetectorSettings {
    DetectorSettings {
        num_cards: 4,
        num_tf: 16384,
        base_ip: "192.168.0.1".into(),
        max_channels: 36,
        max_spectra: 4096,
        settings_path: "/etc/xspress/settings".into(),
        run_flags: 2,
        debug: 0,
        daq_endpoints: vec!["tcp://127.0.0.1:15150".into()],
    }
}

/// Decode and drain everything the link has sent so far.
pub fn sent(link: &MockLink) -> Vec<Message> {
    link.take_sent()
        .iter()
        .map(|frame| message::decode(frame).expect("outbound frame decodes"))
        .collect()
}

pub fn params(value: Value) -> Params {
    value.as_object().cloned().unwrap_or_default()
}

pub fn ack(verb: Verb, id: u32, value: Value) -> Vec<u8> {
    message::encode(&Message::ack(verb, id, params(value))).unwrap()
}
