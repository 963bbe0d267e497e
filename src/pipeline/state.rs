use std::collections::BTreeMap;

use crate::errors::InstrumentError;
use crate::pipeline::Stage;
use crate::plan::{CompositionPlan, PartInstruction, StructurePlan};
use crate::score::Part;

/// A per-instrument failure that did not stop the run.
#[derive(Debug)]
pub struct InstrumentFailure {
    pub instrument: String,
    pub stage: Stage,
    pub error: InstrumentError,
}

/// Everything the stages have produced so far.
///
/// Each stage fills in only its own field; nothing is removed once added.
/// Revision replaces parts through [`RunState::parts_mut`].
#[derive(Debug, Default)]
pub struct RunState {
    structure: Option<StructurePlan>,
    plan: Option<CompositionPlan>,
    instructions: BTreeMap<String, PartInstruction>,
    drafts: BTreeMap<String, Part>,
    failures: Vec<InstrumentFailure>,
}

impl RunState {
    pub fn structure(&self) -> Option<&StructurePlan> {
        self.structure.as_ref()
    }

    pub fn set_structure(&mut self, structure: StructurePlan) {
        self.structure = Some(structure);
    }

    pub fn plan(&self) -> Option<&CompositionPlan> {
        self.plan.as_ref()
    }

    pub fn set_plan(&mut self, plan: CompositionPlan) {
        self.plan = Some(plan);
    }

    pub fn instructions(&self) -> &BTreeMap<String, PartInstruction> {
        &self.instructions
    }

    pub fn add_instruction(&mut self, instrument: String, instruction: PartInstruction) {
        self.instructions.insert(instrument, instruction);
    }

    pub fn parts(&self) -> &BTreeMap<String, Part> {
        &self.drafts
    }

    pub fn add_part(&mut self, instrument: String, part: Part) {
        self.drafts.insert(instrument, part);
    }

    pub fn parts_mut(&mut self) -> &mut BTreeMap<String, Part> {
        &mut self.drafts
    }

    pub fn failures(&self) -> &[InstrumentFailure] {
        &self.failures
    }

    pub fn record_failure(&mut self, stage: Stage, error: InstrumentError) {
        self.failures.push(InstrumentFailure {
            instrument: error.instrument().to_string(),
            stage,
            error,
        });
    }

    /// Final parts and failures, consuming the state.
    pub fn into_results(self) -> (BTreeMap<String, Part>, Vec<InstrumentFailure>) {
        (self.drafts, self.failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_carry_instrument_and_stage() {
        let mut state = RunState::default();
        state.record_failure(
            Stage::GenerateInstructions,
            InstrumentError::MissingInstruction {
                instrument: "oboe".into(),
            },
        );
        let failure = &state.failures()[0];
        assert_eq!(failure.instrument, "oboe");
        assert_eq!(failure.stage, Stage::GenerateInstructions);
    }
}
