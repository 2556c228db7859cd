//! The 17-slot measurement record shared by every sampling source.

use std::fmt::Write;
use std::ops::{Index, IndexMut};

/// Number of recorded variables, timestamp included.
pub const NUM_VARIABLES: usize = 17;

/// Index of a variable within a [`Measurement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum VarId {
    Timestamp = 0,
    PowerAllPhases,
    PowerL1,
    PowerL2,
    PowerL3,
    CurrentNeutral,
    CurrentL1,
    CurrentL2,
    CurrentL3,
    VoltageL1,
    VoltageL2,
    VoltageL3,
    PhaseAngleVoltageL2L1,
    PhaseAngleVoltageL3L1,
    PhaseAngleCurrentVoltageL1,
    PhaseAngleCurrentVoltageL2,
    PhaseAngleCurrentVoltageL3,
}

impl VarId {
    /// All variables in slot order.
    pub const ALL: [VarId; NUM_VARIABLES] = [
        VarId::Timestamp,
        VarId::PowerAllPhases,
        VarId::PowerL1,
        VarId::PowerL2,
        VarId::PowerL3,
        VarId::CurrentNeutral,
        VarId::CurrentL1,
        VarId::CurrentL2,
        VarId::CurrentL3,
        VarId::VoltageL1,
        VarId::VoltageL2,
        VarId::VoltageL3,
        VarId::PhaseAngleVoltageL2L1,
        VarId::PhaseAngleVoltageL3L1,
        VarId::PhaseAngleCurrentVoltageL1,
        VarId::PhaseAngleCurrentVoltageL2,
        VarId::PhaseAngleCurrentVoltageL3,
    ];

    /// Stable display name, used for the stdout header and
    /// differences-only output.
    pub fn name(self) -> &'static str {
        match self {
            VarId::Timestamp => "timestamp",
            VarId::PowerAllPhases => "power",
            VarId::PowerL1 => "power-l1",
            VarId::PowerL2 => "power-l2",
            VarId::PowerL3 => "power-l3",
            VarId::CurrentNeutral => "current-neutral",
            VarId::CurrentL1 => "current-l1",
            VarId::CurrentL2 => "current-l2",
            VarId::CurrentL3 => "current-l3",
            VarId::VoltageL1 => "voltage-l1",
            VarId::VoltageL2 => "voltage-l2",
            VarId::VoltageL3 => "voltage-l3",
            VarId::PhaseAngleVoltageL2L1 => "phase-angle-voltage-l2-l1",
            VarId::PhaseAngleVoltageL3L1 => "phase-angle-voltage-l3-l1",
            VarId::PhaseAngleCurrentVoltageL1 => "phase-angle-current-voltage-l1",
            VarId::PhaseAngleCurrentVoltageL2 => "phase-angle-current-voltage-l2",
            VarId::PhaseAngleCurrentVoltageL3 => "phase-angle-current-voltage-l3",
        }
    }
}

/// One sample: all 17 slots, missing values left at 0. The timestamp slot
/// holds Unix seconds assigned locally at receive time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measurement {
    values: [f64; NUM_VARIABLES],
}

impl Measurement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(&self) -> &[f64; NUM_VARIABLES] {
        &self.values
    }

    /// The upload payload: a `measurement` object with the fixed key set
    /// and order of the ingest endpoint. Readings render with four
    /// decimal places, `createdOn` as whole Unix seconds.
    pub fn to_json(&self, token: &str) -> String {
        let mut out = String::with_capacity(512);
        out.push_str("{\"measurement\":{");

        let numeric = [
            ("powerAllPhases", VarId::PowerAllPhases),
            ("powerL1", VarId::PowerL1),
            ("powerL2", VarId::PowerL2),
            ("powerL3", VarId::PowerL3),
            ("currentNeutral", VarId::CurrentNeutral),
            ("currentL1", VarId::CurrentL1),
            ("currentL2", VarId::CurrentL2),
            ("currentL3", VarId::CurrentL3),
            ("voltageL1", VarId::VoltageL1),
            ("voltageL2", VarId::VoltageL2),
            ("voltageL3", VarId::VoltageL3),
            ("phaseAngleVoltageL2L1", VarId::PhaseAngleVoltageL2L1),
            ("phaseAngleVoltageL3L1", VarId::PhaseAngleVoltageL3L1),
            ("phaseAngleCurrentVoltageL1", VarId::PhaseAngleCurrentVoltageL1),
            ("phaseAngleCurrentVoltageL2", VarId::PhaseAngleCurrentVoltageL2),
            ("phaseAngleCurrentVoltageL3", VarId::PhaseAngleCurrentVoltageL3),
        ];

        for (key, id) in numeric {
            let _ = write!(out, "\"{key}\":{:.4},", self[id]);
        }

        let _ = write!(out, "\"createdOn\":{},", self[VarId::Timestamp] as u64);
        out.push_str("\"smartMeterId\":1,");
        let _ = write!(out, "\"smartMeterToken\":{}", json_string(token));

        out.push_str("}}");
        out
    }
}

impl Index<VarId> for Measurement {
    type Output = f64;

    fn index(&self, id: VarId) -> &f64 {
        &self.values[id as usize]
    }
}

impl IndexMut<VarId> for Measurement {
    fn index_mut(&mut self, id: VarId) -> &mut f64 {
        &mut self.values[id as usize]
    }
}

fn json_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPECTED_KEYS: [&str; 19] = [
        "powerAllPhases",
        "powerL1",
        "powerL2",
        "powerL3",
        "currentNeutral",
        "currentL1",
        "currentL2",
        "currentL3",
        "voltageL1",
        "voltageL2",
        "voltageL3",
        "phaseAngleVoltageL2L1",
        "phaseAngleVoltageL3L1",
        "phaseAngleCurrentVoltageL1",
        "phaseAngleCurrentVoltageL2",
        "phaseAngleCurrentVoltageL3",
        "createdOn",
        "smartMeterId",
        "smartMeterToken",
    ];

    fn sample() -> Measurement {
        let mut m = Measurement::new();
        m[VarId::Timestamp] = 1336300800.0;
        m[VarId::PowerAllPhases] = 60.0;
        m[VarId::PowerL1] = 10.0;
        m[VarId::PowerL2] = 20.0;
        m[VarId::PowerL3] = 30.0;
        m[VarId::VoltageL1] = 230.125;
        m
    }

    #[test]
    fn defaults_to_all_zeros() {
        let m = Measurement::new();
        assert!(m.values().iter().all(|v| *v == 0.0));
        assert_eq!(m.values().len(), NUM_VARIABLES);
    }

    #[test]
    fn payload_is_valid_json_with_exact_key_set() {
        let payload = sample().to_json("tok");
        let parsed: serde_json::Value = serde_json::from_str(&payload).unwrap();

        let measurement = parsed
            .get("measurement")
            .and_then(|v| v.as_object())
            .expect("payload wraps a measurement object");

        assert_eq!(measurement.len(), EXPECTED_KEYS.len());
        for key in EXPECTED_KEYS {
            assert!(measurement.contains_key(key), "missing key {key}");
        }

        assert_eq!(parsed.as_object().unwrap().len(), 1);
    }

    #[test]
    fn keys_appear_in_documented_order() {
        let payload = sample().to_json("tok");

        let mut last = 0;
        for key in EXPECTED_KEYS {
            let needle = format!("\"{key}\":");
            let at = payload.find(&needle).expect(key);
            assert!(at > last || last == 0, "{key} out of order");
            last = at;
        }
    }

    #[test]
    fn numeric_fields_render_with_four_decimals() {
        let payload = sample().to_json("tok");

        assert!(payload.contains("\"powerL1\":10.0000,"));
        assert!(payload.contains("\"voltageL1\":230.1250,"), "{payload}");
        assert!(payload.contains("\"currentNeutral\":0.0000,"));
    }

    #[test]
    fn created_on_is_whole_seconds_and_token_quoted() {
        let payload = sample().to_json("meter-7");

        assert!(payload.contains("\"createdOn\":1336300800,"));
        assert!(payload.contains("\"smartMeterId\":1,"));
        assert!(payload.ends_with("\"smartMeterToken\":\"meter-7\"}}"));
    }

    #[test]
    fn token_is_escaped() {
        let payload = Measurement::new().to_json("a\"b\\c");
        let parsed: serde_json::Value = serde_json::from_str(&payload).unwrap();

        assert_eq!(
            parsed["measurement"]["smartMeterToken"].as_str().unwrap(),
            "a\"b\\c"
        );
    }

    #[test]
    fn var_names_match_slot_order() {
        assert_eq!(VarId::ALL[0].name(), "timestamp");
        assert_eq!(VarId::ALL[1].name(), "power");
        assert_eq!(VarId::ALL[16].name(), "phase-angle-current-voltage-l3");
        assert_eq!(VarId::ALL.len(), NUM_VARIABLES);
    }
}
