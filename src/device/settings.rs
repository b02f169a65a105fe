// src/device/settings.rs - Device settings report
use serde_json::{Map, Number, Value, json};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::communication::EventData;
use crate::config::MachineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Int,
    Float,
    Str,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MachineSetting {
    pub key: &'static str,
    pub kind: SettingKind,
    pub in_report: bool,
    pub default: Option<&'static str>,
}

const fn setting(key: &'static str, kind: SettingKind, in_report: bool, default: Option<&'static str>) -> MachineSetting {
    MachineSetting {
        key,
        kind,
        in_report,
        default,
    }
}

use SettingKind::{Float, Int, Str};

/// Settings exchanged with the service, in key order.
pub static MACHINE_SETTINGS: &[MachineSetting] = &[
    setting("AAdc", Int, true, Some("204")),
    setting("AAfc", Int, true, Some("536870912")),
    setting("AShw", Str, true, Some("00000000000000000000000000000000000000000000000000000000000")),
    setting("BDet", Int, true, Some("96")),
    setting("BTvl", Int, true, Some("752")),
    setting("HCil", Int, false, None),
    setting("HEfv", Int, true, Some("199234110")),
    setting("HEid", Int, true, Some("1100")),
    setting("HEsn", Int, true, Some("123456789")),
    setting("MCdt", Int, true, None),
    setting("MCdv", Str, true, None),
    setting("MCip", Str, true, Some("127.0.0.1")),
    setting("MCla", Float, true, Some("0.13574219")),
    setting("MCov", Str, true, None),
    setting("MCsn", Int, true, None),
    setting("MCsv", Str, true, Some("2.3.0")),
    setting("MCut", Float, true, Some("0.26666668")),
    setting("NIma", Str, true, Some("de:ad:be:ef:00:00")),
    setting("SAid", Int, true, Some("0")),
    setting("XSrc", Int, true, Some("0")),
    setting("YSmm", Int, true, Some("1")),
    setting("ZHin", Int, true, Some("180")),
    setting("ZSen", Int, true, Some("0")),
];

fn typed(setting: &MachineSetting, raw: &str) -> Value {
    match setting.kind {
        Int => match raw.parse::<f64>() {
            Ok(value) => Value::from(value as i64),
            Err(_) => {
                if !raw.is_empty() {
                    tracing::warn!("Setting {} has non-numeric value '{}'", setting.key, raw);
                }
                Value::from(0)
            }
        },
        Float => raw
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map_or(Value::from(0.0), Value::Number),
        Str => Value::from(raw),
    }
}

/// Builds the `settings:completed` payload.
#[derive(Debug)]
pub struct SettingsReport {
    machine: MachineConfig,
    bypass_homing: bool,
    sent: AtomicBool,
}

impl SettingsReport {
    pub fn new(machine: MachineConfig, bypass_homing: bool) -> Self {
        Self {
            machine,
            bypass_homing,
            sent: AtomicBool::new(false),
        }
    }

    fn configured(&self, key: &str) -> Option<&str> {
        match key {
            "MCdv" => Some(&self.machine.app_version),
            "MCov" => Some(&self.machine.firmware_version),
            "MCsn" => Some(&self.machine.serial),
            "HEfv" => Some(&self.machine.head_firmware),
            "HEid" => Some(&self.machine.head_id),
            "HEsn" => Some(&self.machine.head_serial),
            _ => None,
        }
    }

    /// Every reported setting with its current value.
    pub fn values(&self, request_id: u64) -> Map<String, Value> {
        let mut values = Map::new();
        for setting in MACHINE_SETTINGS.iter().filter(|s| s.in_report) {
            let value = match setting.key {
                "SAid" => Value::from(request_id),
                "MCdt" => Value::from(chrono::Utc::now().timestamp()),
                key => typed(setting, self.configured(key).or(setting.default).unwrap_or_default()),
            };
            values.insert(setting.key.to_string(), value);
        }
        values
    }

    /// Only the first report carries values. Later reports, and every report when
    /// homing is bypassed, are empty.
    pub fn report(&self, request_id: u64) -> EventData {
        let value = if !self.bypass_homing && !self.sent.swap(true, Ordering::SeqCst) {
            tracing::info!("Sending full settings report");
            json!({ "values": self.values(request_id) })
        } else {
            json!({})
        };
        EventData::new("settings", value)
    }
}
