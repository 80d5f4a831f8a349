pub mod batch;
pub mod clock;
pub mod eligibility;
pub mod engine;
pub mod report;

pub use batch::BulkReturnProcessor;
pub use clock::{Clock, FixedClock, SystemClock};
pub use eligibility::EligibilityPolicy;
pub use engine::{LifecycleEngine, ReturnReceipt, SweepSummary};
pub use report::{Page, PageRequest, Reporter};
