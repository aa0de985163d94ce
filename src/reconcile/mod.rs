pub mod engine;
pub mod machine;
pub mod store;

pub use engine::{FailureReason, IgnoreReason, ReconcileOutcome, reconcile};
pub use machine::{TransitionPlan, plan_transition};
pub use store::{
    Correlation, EventClaim, NewAnomaly, PaymentStore, PaymentUpsert, SqliteStore, StoreError,
    TransitionResult,
};
