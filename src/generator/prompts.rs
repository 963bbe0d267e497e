//! Prompt builders for the command-backed generator.

use serde_json::Value;

use super::{
    ComposeRequest, InstructionRequest, JudgeRequest, PlanRequest, RepairRequest, ReviseRequest,
    StructureRequest,
};
use crate::instruments::InstrumentProfile;
use crate::plan::GlobalParameters;

fn pretty(value: &impl serde::Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

fn parameters_section(params: &GlobalParameters) -> String {
    format!(
        r#"## Parameters
- Style: {style}
- Tempo: {tempo} BPM
- Key: {key}
- Time signature: {time_signature}
- Length: {measures} measures
- Instruments: {instruments}"#,
        style = params.style,
        tempo = params.tempo,
        key = params.key,
        time_signature = params.time_signature,
        measures = params.measures,
        instruments = params.instruments.join(", "),
    )
}

/// The part format and the rules every draft must satisfy.
fn part_format_section(profile: &InstrumentProfile) -> String {
    format!(
        r#"## Output
Respond with ONLY a JSON object in this exact format (no markdown, no explanation):

```json
{{
  "notes": [
    {{"pitch": "C4", "duration": 1.0, "technique": "{first_technique}"}},
    {{"pitch": "rest", "duration": 1.0, "technique": "none"}}
  ],
  "clef": "{clef}",
  "instrument": "{instrument}"
}}
```

## Rules
- `pitch` is a pitch name with octave (`C4`, `F#3`, `Bb2`), `rest`, or a chord as space-separated names (`C4 E4 G4`).
- Every pitch must lie between {low} and {high} inclusive.
- `duration` is in quarter notes (1.0 = quarter, 2.0 = half, 4.0 = whole) and must be greater than zero.
- `technique` must be one of: {techniques}. Rests use `none`."#,
        first_technique = profile.techniques.first().copied().unwrap_or("none"),
        clef = profile.clef,
        instrument = profile.display_name,
        low = profile.range.low,
        high = profile.range.high,
        techniques = profile.techniques.join(", "),
    )
}

pub fn design_structure(request: &StructureRequest<'_>) -> String {
    format!(
        r#"# Composition Design

You are a composer designing the framework of a new piece.

{parameters}

## Style Analysis
{analysis}

## Harmonic Options
```json
{harmonic}
```

## Form Options
```json
{forms}
```

## Output
Respond with ONLY a JSON object in this exact format (no markdown, no explanation):

```json
{{
  "form": "name of the chosen form",
  "themes": ["description of each theme"],
  "harmonic_progression": ["I", "IV", "V", "I"],
  "instrumentation_roles": {{"<instrument>": "melody|harmony|bass|rhythm|highlight"}},
  "dynamic_plan": "how dynamics develop across the piece",
  "rationale": "why this design fits the style"
}}
```

Assign a role to every instrument listed in the parameters."#,
        parameters = parameters_section(request.params),
        analysis = request.style.analysis(),
        harmonic = pretty(&request.harmonic_options),
        forms = pretty(&request.form_options),
    )
}

pub fn plan_composition(request: &PlanRequest<'_>) -> String {
    format!(
        r#"# Composition Plan

Turn the agreed structure into a working plan for the ensemble.

{parameters}

## Structure
```json
{structure}
```

## Output
Respond with ONLY a JSON object in this exact format (no markdown, no explanation):

```json
{{
  "overall_structure": "section-by-section outline",
  "instrument_roles": {{"<instrument>": "what this instrument does in each section"}},
  "harmonic_and_dynamic_plan": "how harmony and dynamics move through the sections"
}}
```"#,
        parameters = parameters_section(request.params),
        structure = pretty(request.structure),
    )
}

pub fn write_instruction(request: &InstructionRequest<'_>) -> String {
    format!(
        r#"# Performance Brief

You are the conductor briefing the {player} ({instrument}, role: {role}).

{parameters}

## Structure
```json
{structure}
```

## Plan
```json
{plan}
```

## Output
Respond with ONLY a JSON object in this exact format (no markdown, no explanation):

```json
{{
  "melody_position": "where this part sits in the texture",
  "coordination_points": ["moments where this part must align with others"],
  "technical_challenges": ["passages that need particular care"]
}}
```"#,
        player = request.profile.player,
        instrument = request.profile.display_name,
        role = request.role,
        parameters = parameters_section(request.params),
        structure = pretty(request.structure),
        plan = pretty(request.plan),
    )
}

pub fn compose(request: &ComposeRequest<'_>) -> String {
    let instruction = request.instruction;
    format!(
        r#"# Compose Part

You are the {player}. Write the {instrument} part (role: {role}).

{parameters}

## Structure
- Form: {form}
- Harmonic progression: {progression}
- Dynamic plan: {dynamics}

## Conductor's Brief
- Melody position: {position}
- Coordination points: {coordination}
- Technical challenges: {challenges}

Fill all {measures} measures of {time_signature}.

{format}"#,
        player = request.profile.player,
        instrument = request.profile.display_name,
        role = request.role,
        parameters = parameters_section(request.params),
        form = request.structure.form,
        progression = request.structure.harmonic_progression.join(" - "),
        dynamics = request.structure.dynamic_plan,
        position = instruction.melody_position,
        coordination = instruction.coordination_points.join("; "),
        challenges = instruction.technical_challenges.join("; "),
        measures = request.params.measures,
        time_signature = request.params.time_signature,
        format = part_format_section(request.profile),
    )
}

pub fn repair(request: &RepairRequest<'_>) -> String {
    let location = match (request.defect.note_index, &request.defect.offending_value) {
        (Some(index), Some(value)) => format!("\n- Note index: {index}\n- Offending value: {value}"),
        (Some(index), None) => format!("\n- Note index: {index}"),
        (None, Some(value)) => format!("\n- Offending value: {value}"),
        (None, None) => String::new(),
    };
    format!(
        r#"# Repair Part

The previous {instrument} part was rejected.

## Error
- Kind: {kind}
- Message: {message}{location}

## Rejected Draft
```json
{draft}
```

Return a complete replacement part that fixes the error above. Do not return only the changed notes.

{format}"#,
        instrument = request.profile.display_name,
        kind = request.defect.kind,
        message = request.defect.message,
        draft = pretty(request.draft),
        format = part_format_section(request.profile),
    )
}

pub fn revise(request: &ReviseRequest<'_>) -> String {
    format!(
        r#"# Revise Part

You are the {player}. The conductor has reviewed your {instrument} part.

{parameters}

## Current Part
```json
{current}
```

## Conductor's Feedback
{feedback}

Rewrite the whole part so it addresses the feedback.

{format}"#,
        player = request.profile.player,
        instrument = request.profile.display_name,
        parameters = parameters_section(request.params),
        current = pretty(request.current),
        feedback = request.feedback,
        format = part_format_section(request.profile),
    )
}

pub fn judge(request: &JudgeRequest<'_>) -> String {
    let criteria: String = request
        .criteria
        .iter()
        .map(|c| format!("- {c}\n"))
        .collect();
    let score: &Value = request.score;
    format!(
        r#"# Score Evaluation

You are the conductor evaluating a complete score.

## Criteria
{criteria}
Set "passed" to false if any part lacks clear thematic development, has monotonous harmony, or has no dynamic or expressive variation. Set it to true only when every part meets all criteria.

## Score
```json
{score}
```

## Output
Respond with ONLY a JSON object in this exact format (no markdown, no explanation):

```json
{{
  "passed": true,
  "feedback": [
    {{"target": "<instrument>", "message": "specific, actionable critique"}}
  ]
}}
```

Every `target` must be one of: {instruments}."#,
        score = pretty(score),
        instruments = request.instruments.join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::DraftDefect;
    use crate::instruments;
    use crate::plan::{GlobalParameters, PartInstruction, StructurePlan};
    use crate::theory::{StyleGuide, TheoryDatabase};
    use serde_json::json;

    fn structure() -> StructurePlan {
        StructurePlan {
            form: "rondo".into(),
            themes: vec!["rising fourths".into()],
            harmonic_progression: vec!["I".into(), "V".into(), "I".into()],
            instrumentation_roles: Default::default(),
            dynamic_plan: "p < f".into(),
            rationale: String::new(),
        }
    }

    #[test]
    fn test_design_prompt_includes_style_and_theory_data() {
        let params = GlobalParameters::default();
        let style = StyleGuide::for_style("classical");
        let prompt = design_structure(&StructureRequest {
            params: &params,
            style: &style,
            harmonic_options: TheoryDatabase::harmonic_options("classical"),
            form_options: TheoryDatabase::form_options(),
        });
        assert!(prompt.contains("Authentic Cadence"));
        assert!(prompt.contains("Recapitulation"));
        assert!(prompt.contains("[Form options]"));
        assert!(prompt.contains("Tempo: 120 BPM"));
    }

    #[test]
    fn test_compose_prompt_states_range_and_techniques() {
        let params = GlobalParameters::default();
        let cello = instruments::lookup("cello").unwrap();
        let instruction = PartInstruction {
            melody_position: "foundation".into(),
            coordination_points: vec!["bar 3 with viola".into()],
            technical_challenges: vec![],
        };
        let structure = structure();
        let prompt = compose(&ComposeRequest {
            params: &params,
            profile: cello,
            role: "bass",
            structure: &structure,
            instruction: &instruction,
        });
        assert!(prompt.contains("You are the Cellist"));
        assert!(prompt.contains("between C2 and A3"));
        assert!(prompt.contains("one of: arco, pizz"));
        assert!(prompt.contains("bar 3 with viola"));
    }

    #[test]
    fn test_repair_prompt_carries_the_defect_and_rejected_draft() {
        let violin = instruments::lookup("violin").unwrap();
        let defect = DraftDefect {
            kind: "pitch_out_of_range".into(),
            message: "note 0: pitch C2 is outside the range G3..E6".into(),
            note_index: Some(0),
            offending_value: Some("C2".into()),
        };
        let draft = json!({"notes": [{"pitch": "C2", "duration": 1.0, "technique": "arco"}]});
        let prompt = repair(&RepairRequest {
            profile: violin,
            defect: &defect,
            draft: &draft,
        });
        assert!(prompt.contains("Kind: pitch_out_of_range"));
        assert!(prompt.contains("Offending value: C2"));
        assert!(prompt.contains("complete replacement"));
        assert!(prompt.contains("\"pitch\": \"C2\""));
    }

    #[test]
    fn test_judge_prompt_restricts_targets() {
        let instruments = vec!["violin".to_string(), "cello".to_string()];
        let score = json!({"violin": {"notes": []}});
        let prompt = judge(&JudgeRequest {
            criteria: &["thematic development"],
            score: &score,
            instruments: &instruments,
        });
        assert!(prompt.contains("- thematic development"));
        assert!(prompt.contains("must be one of: violin, cello"));
    }
}
