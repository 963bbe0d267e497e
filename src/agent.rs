//! One performer: an instrument profile bound to a generator.

use crate::errors::InstrumentError;
use crate::generator::{ComposeRequest, Generator, ReviseRequest};
use crate::instruments::InstrumentProfile;
use crate::plan::{GlobalParameters, PartInstruction, StructurePlan};
use crate::realize::realize;
use crate::score::Part;

pub struct PartAgent<'a> {
    profile: &'static InstrumentProfile,
    generator: &'a dyn Generator,
    max_retries: u32,
}

impl<'a> PartAgent<'a> {
    pub fn new(profile: &'static InstrumentProfile, generator: &'a dyn Generator, max_retries: u32) -> Self {
        Self {
            profile,
            generator,
            max_retries,
        }
    }

    pub fn profile(&self) -> &'static InstrumentProfile {
        self.profile
    }

    /// Draft this instrument's part and realize it.
    pub async fn compose(
        &self,
        params: &GlobalParameters,
        structure: &StructurePlan,
        instruction: &PartInstruction,
    ) -> Result<Part, InstrumentError> {
        let role = structure.role_for(self.profile);
        let request = ComposeRequest {
            params,
            profile: self.profile,
            role: &role,
            structure,
            instruction,
        };
        let draft = self
            .generator
            .compose(&request)
            .await
            .map_err(|source| InstrumentError::Generator {
                instrument: self.profile.id.to_string(),
                source,
            })?;
        Ok(realize(draft, self.profile, self.generator, self.max_retries).await?)
    }

    /// Rewrite `current` in response to `feedback` and realize the result.
    pub async fn revise(
        &self,
        params: &GlobalParameters,
        current: &Part,
        feedback: &str,
    ) -> Result<Part, InstrumentError> {
        let current_draft = current.to_draft();
        let request = ReviseRequest {
            params,
            profile: self.profile,
            current: &current_draft,
            feedback,
        };
        let draft = self
            .generator
            .revise(&request)
            .await
            .map_err(|source| InstrumentError::Generator {
                instrument: self.profile.id.to_string(),
                source,
            })?;
        Ok(realize(draft, self.profile, self.generator, self.max_retries).await?)
    }
}
