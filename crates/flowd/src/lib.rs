pub mod actor;
pub mod audit_mirror;
pub mod cli;
pub mod collaborators;
pub mod engine;
pub mod guards;
pub mod logging;
pub mod store;

pub use audit_mirror::{AuditMirrorError, JsonlAuditMirror};
pub use collaborators::{
    BillingService, CollaboratorError, Collaborators, CrewDirectory, FormsService,
    HttpBillingService, HttpCrewDirectory, HttpFormsService,
};
pub use engine::{
    AppliedTransition, JobHistory, NewJobRequest, TransitionEngine, TransitionError,
    TransitionEvent, TransitionOption, TransitionRequest,
};
pub use guards::{GuardEvaluator, GuardOutcome};
pub use store::{CommitOutcome, SqliteStore, StoreError};
