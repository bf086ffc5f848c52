//! Derivation stages: Epic → Feature → Story
//!
//! Every stage follows the same contract:
//! 1. One reasoning call through the shared rate limiter
//! 2. Validation of the whole batch against its parents
//! 3. On a fatal service error or a rejected batch, one retry with the
//!    same inputs; a second failure is final
//!
//! No partial batch is ever returned. Cancellation and exhausted throttling
//! retries end the stage immediately.

mod epic;
mod feature;
mod story;

pub use epic::EpicDerivationStage;
pub use feature::FeatureDerivationStage;
pub use story::StoryDerivationStage;

use crate::cancel::CancellationToken;
use crate::error::{ServiceError, StageError};
use crate::limiter::RateLimiter;
use crate::reasoning::ReasoningClient;
use muse_artifact::{AttemptRecord, Stage, ValidationResult};
use muse_validate::ArtifactValidator;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, warn};

/// Attempts per stage invocation: the first plus one retry
pub const STAGE_ATTEMPTS: u8 = 2;

/// Collaborators shared by all derivation stages
#[derive(Clone)]
pub struct StageRuntime {
    /// Reasoning service
    pub client: Arc<dyn ReasoningClient>,
    /// Shared admission control
    pub limiter: Arc<RateLimiter>,
    /// Rules applied to every batch
    pub validator: Arc<ArtifactValidator>,
}

impl std::fmt::Debug for StageRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRuntime")
            .field("limiter", &self.limiter)
            .field("validator", &self.validator)
            .finish_non_exhaustive()
    }
}

impl StageRuntime {
    /// Bundle the collaborators
    #[must_use]
    pub fn new(
        client: Arc<dyn ReasoningClient>,
        limiter: Arc<RateLimiter>,
        validator: ArtifactValidator,
    ) -> Self {
        Self {
            client,
            limiter,
            validator: Arc::new(validator),
        }
    }
}

/// Accepted batch plus the attempts rejected on the way
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome<T> {
    /// The batch that passed validation
    pub artifacts: Vec<T>,
    /// Validation failures of earlier attempts
    pub rejected: Vec<AttemptRecord>,
    /// Whether the retry was spent
    pub retried: bool,
}

/// Run one stage invocation under the retry-once contract
///
/// `call` issues the reasoning request; `check` validates a returned batch.
pub(crate) async fn attempt_twice<T, Call, Fut, Check>(
    stage: Stage,
    input_id: &str,
    limiter: &RateLimiter,
    cancel: &CancellationToken,
    cost: u64,
    mut call: Call,
    check: Check,
) -> Result<StageOutcome<T>, StageError>
where
    Call: FnMut() -> Fut,
    Fut: Future<Output = Result<Vec<T>, ServiceError>>,
    Check: Fn(&[T]) -> ValidationResult,
{
    let mut rejected = Vec::new();
    let mut attempt = 1u8;
    loop {
        let failure = match limiter.run_weighted(cancel, cost, &mut call).await {
            Ok(artifacts) => {
                let result = check(&artifacts);
                if result.is_valid() {
                    return Ok(StageOutcome {
                        artifacts,
                        rejected,
                        retried: attempt > 1,
                    });
                }
                rejected.push(AttemptRecord {
                    stage,
                    input_id: input_id.to_string(),
                    attempt,
                    result: result.clone(),
                });
                StageError::Rejected {
                    attempts: attempt,
                    result,
                }
            }
            Err(err) if err.is_stage_retryable() => StageError::from(err),
            Err(err) => return Err(err.into()),
        };

        if attempt >= STAGE_ATTEMPTS {
            error!(%stage, input = input_id, attempts = attempt, error = %failure, "stage failed");
            return Err(failure);
        }
        warn!(%stage, input = input_id, attempt, error = %failure, "stage attempt rejected, retrying");
        attempt += 1;
    }
}
