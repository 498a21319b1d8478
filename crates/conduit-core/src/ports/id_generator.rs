//! IdGenerator port - job id generation.

use ulid::Ulid;

use crate::domain::JobId;
use crate::ports::Clock;

/// Generates ids for new jobs.
///
/// # Thread Safety
/// - `Send + Sync`: one generator is shared by every submitting task.
pub trait IdGenerator: Send + Sync {
    fn generate_job_id(&self) -> JobId;
}

/// ULID based generator.
///
/// The timestamp part comes from the injected `Clock`, so a `FixedClock`
/// yields ids with a deterministic time prefix; the random part keeps them
/// unique.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_job_id(&self) -> JobId {
        let timestamp_ms = u64::try_from(self.clock.now().timestamp_millis()).unwrap_or(0);
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        JobId::from(ulid)
    }
}
