pub mod clock;
pub mod pool;
pub mod recorder;
pub mod usage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use pool::{CredentialLease, QuotaPool};
pub use recorder::{InMemoryRecorder, NoopRecorder, UsageRecorder};
pub use usage::{ApiKeyUsage, SWITCH_THRESHOLD};
