//! The OBIS registry: which 6-octet object names map to which
//! measurement slots.

use crate::measurement::VarId;

/// OBIS object names recorded by the agent, in slot order. The table is
/// append-only; object names not listed here are ignored.
pub const TABLE: [([u8; 6], VarId); 16] = [
    ([0x01, 0x00, 0x0f, 0x07, 0x00, 0xff], VarId::PowerAllPhases),
    ([0x01, 0x00, 0x23, 0x07, 0x00, 0xff], VarId::PowerL1),
    ([0x01, 0x00, 0x37, 0x07, 0x00, 0xff], VarId::PowerL2),
    ([0x01, 0x00, 0x4b, 0x07, 0x00, 0xff], VarId::PowerL3),
    ([0x01, 0x00, 0x5b, 0x07, 0x00, 0xff], VarId::CurrentNeutral),
    ([0x01, 0x00, 0x1f, 0x07, 0x00, 0xff], VarId::CurrentL1),
    ([0x01, 0x00, 0x33, 0x07, 0x00, 0xff], VarId::CurrentL2),
    ([0x01, 0x00, 0x47, 0x07, 0x00, 0xff], VarId::CurrentL3),
    ([0x01, 0x00, 0x20, 0x07, 0x00, 0xff], VarId::VoltageL1),
    ([0x01, 0x00, 0x34, 0x07, 0x00, 0xff], VarId::VoltageL2),
    ([0x01, 0x00, 0x48, 0x07, 0x00, 0xff], VarId::VoltageL3),
    (
        [0x01, 0x00, 0x51, 0x07, 0x01, 0xff],
        VarId::PhaseAngleVoltageL2L1,
    ),
    (
        [0x01, 0x00, 0x51, 0x07, 0x02, 0xff],
        VarId::PhaseAngleVoltageL3L1,
    ),
    (
        [0x01, 0x00, 0x51, 0x07, 0x04, 0xff],
        VarId::PhaseAngleCurrentVoltageL1,
    ),
    (
        [0x01, 0x00, 0x51, 0x07, 0x0f, 0xff],
        VarId::PhaseAngleCurrentVoltageL2,
    ),
    (
        [0x01, 0x00, 0x51, 0x07, 0x1a, 0xff],
        VarId::PhaseAngleCurrentVoltageL3,
    ),
];

/// Find the measurement slot for an OBIS object name. Names longer than
/// six octets never match; shorter names compare against the leading
/// octets of each entry.
pub fn lookup(obj_name: &[u8]) -> Option<VarId> {
    if obj_name.is_empty() || obj_name.len() > 6 {
        return None;
    }

    TABLE
        .iter()
        .find(|(key, _)| &key[..obj_name.len()] == obj_name)
        .map(|(_, id)| *id)
}
