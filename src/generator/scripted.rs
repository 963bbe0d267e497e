//! Scripted generator for tests: replies are queued per capability and,
//! where it matters, per instrument.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Value, json};

use super::{
    ComposeRequest, Draft, Generator, InstructionRequest, JudgeRequest, PlanRequest,
    RepairRequest, ReviseRequest, StructureRequest,
};
use crate::score::test_support::valid_draft;

type Reply = Result<Value, String>;

#[derive(Default)]
pub(crate) struct ScriptedGenerator {
    structure: Mutex<VecDeque<Reply>>,
    plan: Mutex<VecDeque<Reply>>,
    instructions: Mutex<HashMap<String, VecDeque<Reply>>>,
    compose: Mutex<HashMap<String, VecDeque<Reply>>>,
    repair: Mutex<HashMap<String, VecDeque<Reply>>>,
    revise: Mutex<HashMap<String, VecDeque<Reply>>>,
    judge: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<(&'static str, String)>>,
    feedback_seen: Mutex<Vec<String>>,
    repairs_seen: Mutex<Vec<SeenRepair>>,
}

/// What one `repair` call was given.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SeenRepair {
    pub kind: String,
    pub note_index: Option<usize>,
    pub offending_value: Option<String>,
    pub draft: Value,
}

fn push(map: &Mutex<HashMap<String, VecDeque<Reply>>>, instrument: &str, reply: Reply) {
    map.lock()
        .unwrap()
        .entry(instrument.to_string())
        .or_default()
        .push_back(reply);
}

fn pop(map: &Mutex<HashMap<String, VecDeque<Reply>>>, capability: &str, instrument: &str) -> Result<Value> {
    map.lock()
        .unwrap()
        .get_mut(instrument)
        .and_then(|q| q.pop_front())
        .unwrap_or_else(|| Err(format!("no scripted {capability} reply for {instrument}")))
        .map_err(|e| anyhow!(e))
}

fn pop_one(queue: &Mutex<VecDeque<Reply>>, capability: &str) -> Result<Value> {
    queue
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(format!("no scripted {capability} reply")))
        .map_err(|e| anyhow!(e))
}

pub(crate) fn structure_json() -> Value {
    json!({
        "form": "rondo",
        "themes": ["A: stepwise rise", "B: dotted figure"],
        "harmonic_progression": ["I", "IV", "V", "I"],
        "instrumentation_roles": {"violin": "melody", "cello": "bass"},
        "dynamic_plan": "p to f and back",
        "rationale": "compact and clear"
    })
}

pub(crate) fn plan_json() -> Value {
    json!({
        "overall_structure": "A B A C A",
        "instrument_roles": {"violin": "carries the refrain"},
        "harmonic_and_dynamic_plan": "tonic returns with each refrain"
    })
}

pub(crate) fn instruction_json() -> Value {
    json!({
        "melody_position": "upper voice",
        "coordination_points": ["bar 2 entry"],
        "technical_challenges": []
    })
}

pub(crate) fn passing_verdict() -> Value {
    json!({"passed": true, "feedback": []})
}

impl ScriptedGenerator {
    /// A full run for `instruments`: every stage answers once, every part
    /// has `notes` valid notes, and the judge passes.
    pub fn happy_path(instruments: &[&str], notes: usize) -> Self {
        let generator = Self::default()
            .with_structure(structure_json())
            .with_plan(plan_json())
            .with_judge(passing_verdict());
        for instrument in instruments {
            push(&generator.instructions, instrument, Ok(instruction_json()));
            push(&generator.compose, instrument, Ok(valid_draft(instrument, notes)));
        }
        generator
    }

    pub fn with_structure(self, value: Value) -> Self {
        self.structure.lock().unwrap().push_back(Ok(value));
        self
    }

    pub fn with_plan(self, value: Value) -> Self {
        self.plan.lock().unwrap().push_back(Ok(value));
        self
    }

    pub fn with_instruction(self, instrument: &str, reply: Result<Value, &str>) -> Self {
        push(&self.instructions, instrument, reply.map_err(str::to_string));
        self
    }

    pub fn with_compose(self, instrument: &str, draft: Value) -> Self {
        push(&self.compose, instrument, Ok(draft));
        self
    }

    pub fn with_repair(self, instrument: &str, reply: Result<Value, &str>) -> Self {
        push(&self.repair, instrument, reply.map_err(str::to_string));
        self
    }

    pub fn with_revise(self, instrument: &str, draft: Value) -> Self {
        push(&self.revise, instrument, Ok(draft));
        self
    }

    pub fn with_judge(self, verdict: Value) -> Self {
        self.judge.lock().unwrap().push_back(Ok(verdict));
        self
    }

    /// Number of calls to `capability`, across all instruments.
    pub fn calls(&self, capability: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == capability)
            .count()
    }

    pub fn calls_for(&self, capability: &str, instrument: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, i)| *c == capability && i == instrument)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Feedback messages passed to `revise`, in call order.
    pub fn feedback_seen(&self) -> Vec<String> {
        self.feedback_seen.lock().unwrap().clone()
    }

    /// Defects and drafts passed to `repair`, in call order.
    pub fn repairs_seen(&self) -> Vec<SeenRepair> {
        self.repairs_seen.lock().unwrap().clone()
    }

    fn record(&self, capability: &'static str, instrument: &str) {
        self.calls
            .lock()
            .unwrap()
            .push((capability, instrument.to_string()));
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn design_structure(&self, _request: &StructureRequest<'_>) -> Result<Value> {
        self.record("design_structure", "");
        pop_one(&self.structure, "design_structure")
    }

    async fn plan_composition(&self, _request: &PlanRequest<'_>) -> Result<Value> {
        self.record("plan_composition", "");
        pop_one(&self.plan, "plan_composition")
    }

    async fn write_instruction(&self, request: &InstructionRequest<'_>) -> Result<Value> {
        self.record("write_instruction", request.profile.id);
        pop(&self.instructions, "write_instruction", request.profile.id)
    }

    async fn compose(&self, request: &ComposeRequest<'_>) -> Result<Draft> {
        self.record("compose", request.profile.id);
        pop(&self.compose, "compose", request.profile.id)
    }

    async fn repair(&self, request: &RepairRequest<'_>) -> Result<Draft> {
        self.record("repair", request.profile.id);
        self.repairs_seen.lock().unwrap().push(SeenRepair {
            kind: request.defect.kind.clone(),
            note_index: request.defect.note_index,
            offending_value: request.defect.offending_value.clone(),
            draft: request.draft.clone(),
        });
        pop(&self.repair, "repair", request.profile.id)
    }

    async fn revise(&self, request: &ReviseRequest<'_>) -> Result<Draft> {
        self.record("revise", request.profile.id);
        self.feedback_seen
            .lock()
            .unwrap()
            .push(request.feedback.to_string());
        pop(&self.revise, "revise", request.profile.id)
    }

    async fn judge(&self, _request: &JudgeRequest<'_>) -> Result<Value> {
        self.record("judge", "");
        pop_one(&self.judge, "judge")
    }
}
