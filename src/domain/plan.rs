//! Energy management plan: the compacted instruction stream a materialized solution emits,
//! replacing the teacher's raw `Schedule`/`ScheduleEntry` power-target list with the typed
//! operation-mode + payload shape the spec's solution materializer requires.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// High-level operating mode for one battery-hour, derived from the SoC-clamped effective
/// factors by priority (AC charge > DC charge > discharge > idle). The two "illegal" variants
/// surface a genome state the repair pass should have eliminated before materialization ever
/// sees it — if one appears, it is logged rather than silently coerced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OperationMode {
    Idle,
    PeakShaving,
    GridSupportImport,
    NonExport,
    ForcedCharge,
    SelfConsumption,
    IllegalAcDcCombo,
    IllegalChargeDischargeCombo,
}

impl OperationMode {
    /// Classify one hour's SoC-clamped effective factors into an operation mode and its
    /// associated factor, per the fixed `(ac, dc, discharge)` truth table: priority AC > DC >
    /// discharge > idle, with the two AC+discharge combinations the repair pass should already
    /// have eliminated surfaced as distinct "illegal" variants rather than silently coerced.
    ///
    /// | ac | dc | discharge | mode | factor |
    /// |----|----|-----------|------|--------|
    /// | 0  | 0  | 0         | Idle | 1.0 |
    /// | 0  | 0  | 1         | PeakShaving | 1.0 |
    /// | >0 | 0  | 0         | GridSupportImport | ac |
    /// | 0  | >0 | 0         | NonExport | dc |
    /// | >0 | >0 | 0         | ForcedCharge | ac |
    /// | 0  | >0 | 1         | SelfConsumption | dc |
    /// | >0 | 0  | 1         | IllegalChargeDischargeCombo | — |
    /// | >0 | >0 | 1         | IllegalAcDcCombo | — |
    pub fn classify(effective_ac: f64, effective_dc: f64, effective_discharge: bool) -> (Self, f64) {
        let ac_active = effective_ac > 1e-9;
        let dc_active = effective_dc > 1e-9;

        match (ac_active, dc_active, effective_discharge) {
            (false, false, false) => (Self::Idle, 1.0),
            (false, false, true) => (Self::PeakShaving, 1.0),
            (true, false, false) => (Self::GridSupportImport, effective_ac),
            (false, true, false) => (Self::NonExport, effective_dc),
            (true, true, false) => (Self::ForcedCharge, effective_ac),
            (false, true, true) => (Self::SelfConsumption, effective_dc),
            (true, false, true) => (Self::IllegalChargeDischargeCombo, 0.0),
            (true, true, true) => (Self::IllegalAcDcCombo, 0.0),
        }
    }
}

/// Fill-Rate-Based Control vs Demand-Driven-Based Control instruction payload, the two
/// dispatch vocabularies an external adapter may speak.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum InstructionPayload {
    /// Target battery charge/discharge rate as a fraction of rated power, signed
    /// (positive = charge, negative = discharge).
    Frbc { fill_rate: f64 },
    /// Target demand at the grid connection point, in Watts (positive = import).
    Ddbc { demand_w: f64 },
}

/// Which device a plan instruction targets. Compaction (only emit on transition) is scoped
/// per-resource, since each resource's own instruction stream advances independently.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PlanResource {
    Battery,
    Ev,
    Appliance,
}

/// One instruction in the plan's compacted transition stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instruction {
    pub resource: PlanResource,
    pub effective_from: DateTime<Utc>,
    pub mode: OperationMode,
    pub payload: InstructionPayload,
}

/// The materialized, ready-to-dispatch energy management plan for a run's horizon.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EnergyManagementPlan {
    pub instructions: Vec<Instruction>,
}

impl EnergyManagementPlan {
    /// Build the battery resource's instruction stream from one `(mode, factor)` pair per
    /// hour, compacting consecutive hours with an identical `(mode, factor)` into a single
    /// instruction — emit only on transitions, per the materializer's compaction rule.
    pub fn from_hourly(hours: &[(DateTime<Utc>, OperationMode, f64)]) -> Self {
        let mut plan = Self::default();
        for &(ts, mode, factor) in hours {
            plan.push_compacted(PlanResource::Battery, ts, mode, InstructionPayload::Frbc { fill_rate: factor });
        }
        plan
    }

    /// Append an instruction for `resource`, skipping it if it repeats that resource's most
    /// recent `(mode, payload)` pair.
    pub fn push_compacted(
        &mut self,
        resource: PlanResource,
        effective_from: DateTime<Utc>,
        mode: OperationMode,
        payload: InstructionPayload,
    ) {
        let repeats_last = self
            .instructions
            .iter()
            .rev()
            .find(|i| i.resource == resource)
            .map(|i| i.mode == mode && i.payload == payload)
            .unwrap_or(false);
        if !repeats_last {
            self.instructions.push(Instruction {
                resource,
                effective_from,
                mode,
                payload,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn classify_prioritizes_ac_over_dc_and_discharge() {
        assert_eq!(
            OperationMode::classify(0.5, 0.0, true).0,
            OperationMode::IllegalChargeDischargeCombo
        );
        assert_eq!(
            OperationMode::classify(0.5, 0.5, true).0,
            OperationMode::IllegalAcDcCombo
        );
        assert_eq!(OperationMode::classify(0.5, 0.5, false), (OperationMode::ForcedCharge, 0.5));
        assert_eq!(OperationMode::classify(0.0, 0.5, true), (OperationMode::SelfConsumption, 0.5));
    }

    #[test]
    fn classify_distinguishes_idle_and_grid_contexts() {
        assert_eq!(OperationMode::classify(0.0, 0.0, false), (OperationMode::Idle, 1.0));
        assert_eq!(OperationMode::classify(0.0, 0.0, true), (OperationMode::PeakShaving, 1.0));
        assert_eq!(OperationMode::classify(0.0, 0.4, false), (OperationMode::NonExport, 0.4));
        assert_eq!(OperationMode::classify(0.3, 0.0, false), (OperationMode::GridSupportImport, 0.3));
    }

    #[test]
    fn compaction_only_emits_on_transitions() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let hours = vec![
            (t0, OperationMode::Idle, 0.0),
            (t0 + chrono::Duration::hours(1), OperationMode::Idle, 0.0),
            (t0 + chrono::Duration::hours(2), OperationMode::ForcedCharge, 1.0),
        ];
        let plan = EnergyManagementPlan::from_hourly(&hours);
        assert_eq!(plan.instructions.len(), 2);
    }
}
