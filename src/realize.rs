//! Validate-or-repair loop turning a generator draft into a [`Part`].

use tracing::{debug, warn};

use crate::errors::RealizationError;
use crate::generator::{Draft, DraftDefect, Generator, RepairRequest};
use crate::instruments::InstrumentProfile;
use crate::score::Part;

/// Drafts validated per request unless configured otherwise.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Validate `draft`; on failure ask the generator for a complete replacement
/// and try again.
///
/// The initial draft counts as attempt 1, so at most `max_retries` drafts are
/// validated and `repair` is called at most `max_retries - 1` times. A
/// `max_retries` of 0 behaves like 1. A failed repair call uses up an attempt
/// and leaves the last rejected draft in place.
pub async fn realize(
    draft: Draft,
    profile: &InstrumentProfile,
    generator: &dyn Generator,
    max_retries: u32,
) -> Result<Part, RealizationError> {
    let budget = max_retries.max(1);
    let mut draft = draft;
    let mut attempt = 1;

    let mut defect = match Part::from_draft(&draft, profile) {
        Ok(part) => {
            debug!(instrument = profile.id, attempt, "draft accepted");
            return Ok(part);
        }
        Err(err) => {
            warn!(instrument = profile.id, attempt, kind = err.kind(), "draft rejected: {}", err);
            DraftDefect::from(&err)
        }
    };
    let mut reason = defect.to_string();

    while attempt < budget {
        attempt += 1;
        let request = RepairRequest {
            profile,
            defect: &defect,
            draft: &draft,
        };
        match generator.repair(&request).await {
            Ok(replacement) => match Part::from_draft(&replacement, profile) {
                Ok(part) => {
                    debug!(instrument = profile.id, attempt, "repaired draft accepted");
                    return Ok(part);
                }
                Err(err) => {
                    warn!(instrument = profile.id, attempt, kind = err.kind(), "repaired draft rejected: {}", err);
                    defect = DraftDefect::from(&err);
                    reason = defect.to_string();
                    draft = replacement;
                }
            },
            Err(err) => {
                warn!(instrument = profile.id, attempt, "repair call failed: {:#}", err);
                reason = DraftDefect::transport(&err).to_string();
            }
        }
    }

    Err(RealizationError {
        instrument: profile.id.to_string(),
        attempts: attempt,
        reason,
        last_draft: draft,
    })
}
