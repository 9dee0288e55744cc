//! Collaborator lookups consumed by the guard evaluator.
//!
//! Crew assignment, form completion, and billing status live in other
//! services; the engine only ever asks them yes/no questions. Each trait is
//! object-safe so the evaluator can hold production HTTP clients or the
//! in-memory fakes interchangeably.

use async_trait::async_trait;
use flow_core::config::CollaboratorConfig;
use flow_core::types::JobId;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("collaborator request failed: {message}")]
    Request { message: String },
    #[error("collaborator returned status {status} for {path}")]
    Status { status: u16, path: String },
    #[error("collaborator returned a malformed response: {message}")]
    Malformed { message: String },
}

#[async_trait]
pub trait CrewDirectory: Send + Sync {
    async fn is_crew_assigned(&self, job_id: &JobId) -> Result<bool, CollaboratorError>;
    async fn is_crew_checked_in(&self, job_id: &JobId) -> Result<bool, CollaboratorError>;
}

#[async_trait]
pub trait FormsService: Send + Sync {
    async fn are_required_forms_complete(&self, job_id: &JobId)
        -> Result<bool, CollaboratorError>;
    async fn is_signature_required(&self, job_id: &JobId) -> Result<bool, CollaboratorError>;
    async fn is_signature_captured(&self, job_id: &JobId) -> Result<bool, CollaboratorError>;
}

#[async_trait]
pub trait BillingService: Send + Sync {
    async fn are_line_items_finalized(&self, job_id: &JobId) -> Result<bool, CollaboratorError>;
    async fn is_payment_recorded(&self, job_id: &JobId) -> Result<bool, CollaboratorError>;
}

/// The set of collaborators the evaluator needs, bundled for wiring.
#[derive(Clone)]
pub struct Collaborators {
    pub crew: Arc<dyn CrewDirectory>,
    pub forms: Arc<dyn FormsService>,
    pub billing: Arc<dyn BillingService>,
}

impl Collaborators {
    /// Wire the HTTP clients from configuration. A role with no base URL
    /// gets an [`UnconfiguredCollaborator`], whose lookups always error so
    /// the evaluator fails its guards closed.
    pub fn from_config(
        config: &CollaboratorConfig,
        timeout: Duration,
    ) -> Result<Self, CollaboratorError> {
        let crew: Arc<dyn CrewDirectory> = match &config.crew_base_url {
            Some(base) => Arc::new(HttpCrewDirectory::new(base.clone(), timeout)?),
            None => Arc::new(UnconfiguredCollaborator::new("crew")),
        };
        let forms: Arc<dyn FormsService> = match &config.forms_base_url {
            Some(base) => Arc::new(HttpFormsService::new(base.clone(), timeout)?),
            None => Arc::new(UnconfiguredCollaborator::new("forms")),
        };
        let billing: Arc<dyn BillingService> = match &config.billing_base_url {
            Some(base) => Arc::new(HttpBillingService::new(base.clone(), timeout)?),
            None => Arc::new(UnconfiguredCollaborator::new("billing")),
        };
        Ok(Self {
            crew,
            forms,
            billing,
        })
    }

    /// Wire every role to the same in-memory fake. Test and demo helper.
    pub fn from_fake(fake: Arc<fakes::InMemoryCollaborators>) -> Self {
        Self {
            crew: fake.clone(),
            forms: fake.clone(),
            billing: fake,
        }
    }
}

/// Stand-in for a collaborator with no configured base URL. Every lookup
/// errors, which the guard layer treats as an unverifiable precondition.
pub struct UnconfiguredCollaborator {
    service: &'static str,
}

impl UnconfiguredCollaborator {
    pub fn new(service: &'static str) -> Self {
        Self { service }
    }

    fn not_configured(&self) -> CollaboratorError {
        CollaboratorError::Request {
            message: format!("{} collaborator base URL not configured", self.service),
        }
    }
}

#[async_trait]
impl CrewDirectory for UnconfiguredCollaborator {
    async fn is_crew_assigned(&self, _job_id: &JobId) -> Result<bool, CollaboratorError> {
        Err(self.not_configured())
    }

    async fn is_crew_checked_in(&self, _job_id: &JobId) -> Result<bool, CollaboratorError> {
        Err(self.not_configured())
    }
}

#[async_trait]
impl FormsService for UnconfiguredCollaborator {
    async fn are_required_forms_complete(
        &self,
        _job_id: &JobId,
    ) -> Result<bool, CollaboratorError> {
        Err(self.not_configured())
    }

    async fn is_signature_required(&self, _job_id: &JobId) -> Result<bool, CollaboratorError> {
        Err(self.not_configured())
    }

    async fn is_signature_captured(&self, _job_id: &JobId) -> Result<bool, CollaboratorError> {
        Err(self.not_configured())
    }
}

#[async_trait]
impl BillingService for UnconfiguredCollaborator {
    async fn are_line_items_finalized(&self, _job_id: &JobId) -> Result<bool, CollaboratorError> {
        Err(self.not_configured())
    }

    async fn is_payment_recorded(&self, _job_id: &JobId) -> Result<bool, CollaboratorError> {
        Err(self.not_configured())
    }
}

#[derive(Debug, Deserialize)]
struct FlagResponse {
    value: bool,
}

/// Shared JSON flag fetcher for the HTTP collaborator clients.
///
/// Collaborators answer `GET {base}{path}` with `{"value": <bool>}`.
async fn fetch_flag(client: &Client, base_url: &str, path: &str) -> Result<bool, CollaboratorError> {
    let url = format!("{}{}", base_url.trim_end_matches('/'), path);
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|err| CollaboratorError::Request {
            message: err.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(CollaboratorError::Status {
            status: status.as_u16(),
            path: path.to_string(),
        });
    }

    let flag: FlagResponse = response
        .json()
        .await
        .map_err(|err| CollaboratorError::Malformed {
            message: err.to_string(),
        })?;
    Ok(flag.value)
}

fn build_client(timeout: Duration) -> Result<Client, CollaboratorError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| CollaboratorError::Request {
            message: err.to_string(),
        })
}

pub struct HttpCrewDirectory {
    client: Client,
    base_url: String,
}

impl HttpCrewDirectory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl CrewDirectory for HttpCrewDirectory {
    async fn is_crew_assigned(&self, job_id: &JobId) -> Result<bool, CollaboratorError> {
        fetch_flag(&self.client, &self.base_url, &format!("/jobs/{job_id}/assigned")).await
    }

    async fn is_crew_checked_in(&self, job_id: &JobId) -> Result<bool, CollaboratorError> {
        fetch_flag(&self.client, &self.base_url, &format!("/jobs/{job_id}/checked-in")).await
    }
}

pub struct HttpFormsService {
    client: Client,
    base_url: String,
}

impl HttpFormsService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl FormsService for HttpFormsService {
    async fn are_required_forms_complete(
        &self,
        job_id: &JobId,
    ) -> Result<bool, CollaboratorError> {
        fetch_flag(&self.client, &self.base_url, &format!("/jobs/{job_id}/forms-complete")).await
    }

    async fn is_signature_required(&self, job_id: &JobId) -> Result<bool, CollaboratorError> {
        fetch_flag(
            &self.client,
            &self.base_url,
            &format!("/jobs/{job_id}/signature-required"),
        )
        .await
    }

    async fn is_signature_captured(&self, job_id: &JobId) -> Result<bool, CollaboratorError> {
        fetch_flag(
            &self.client,
            &self.base_url,
            &format!("/jobs/{job_id}/signature-captured"),
        )
        .await
    }
}

pub struct HttpBillingService {
    client: Client,
    base_url: String,
}

impl HttpBillingService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl BillingService for HttpBillingService {
    async fn are_line_items_finalized(&self, job_id: &JobId) -> Result<bool, CollaboratorError> {
        fetch_flag(
            &self.client,
            &self.base_url,
            &format!("/jobs/{job_id}/line-items-finalized"),
        )
        .await
    }

    async fn is_payment_recorded(&self, job_id: &JobId) -> Result<bool, CollaboratorError> {
        fetch_flag(
            &self.client,
            &self.base_url,
            &format!("/jobs/{job_id}/payment-recorded"),
        )
        .await
    }
}

/// In-memory collaborators for tests and local demos. Each lookup can be
/// scripted to answer, fail, or hang (to exercise the fail-closed timeout).
pub mod fakes {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum FakeAnswer {
        Value(bool),
        Fail,
        Hang,
    }

    #[derive(Debug, Clone, Copy)]
    struct FakeState {
        crew_assigned: FakeAnswer,
        crew_checked_in: FakeAnswer,
        forms_complete: FakeAnswer,
        signature_required: FakeAnswer,
        signature_captured: FakeAnswer,
        line_items_finalized: FakeAnswer,
        payment_recorded: FakeAnswer,
    }

    #[derive(Debug)]
    pub struct InMemoryCollaborators {
        state: Mutex<FakeState>,
    }

    impl InMemoryCollaborators {
        fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
            self.state.lock().unwrap_or_else(|err| err.into_inner())
        }

        /// Every precondition unmet; signature not mandated.
        pub fn deny_all() -> Self {
            Self {
                state: Mutex::new(FakeState {
                    crew_assigned: FakeAnswer::Value(false),
                    crew_checked_in: FakeAnswer::Value(false),
                    forms_complete: FakeAnswer::Value(false),
                    signature_required: FakeAnswer::Value(false),
                    signature_captured: FakeAnswer::Value(false),
                    line_items_finalized: FakeAnswer::Value(false),
                    payment_recorded: FakeAnswer::Value(false),
                }),
            }
        }

        /// Every precondition met; signature not mandated.
        pub fn allow_all() -> Self {
            let fake = Self::deny_all();
            {
                let mut state = fake.state();
                state.crew_assigned = FakeAnswer::Value(true);
                state.crew_checked_in = FakeAnswer::Value(true);
                state.forms_complete = FakeAnswer::Value(true);
                state.signature_captured = FakeAnswer::Value(true);
                state.line_items_finalized = FakeAnswer::Value(true);
                state.payment_recorded = FakeAnswer::Value(true);
            }
            fake
        }

        pub fn set_crew_assigned(&self, answer: FakeAnswer) {
            self.state().crew_assigned = answer;
        }

        pub fn set_crew_checked_in(&self, answer: FakeAnswer) {
            self.state().crew_checked_in = answer;
        }

        pub fn set_forms_complete(&self, answer: FakeAnswer) {
            self.state().forms_complete = answer;
        }

        pub fn set_signature_required(&self, answer: FakeAnswer) {
            self.state().signature_required = answer;
        }

        pub fn set_signature_captured(&self, answer: FakeAnswer) {
            self.state().signature_captured = answer;
        }

        pub fn set_line_items_finalized(&self, answer: FakeAnswer) {
            self.state().line_items_finalized = answer;
        }

        pub fn set_payment_recorded(&self, answer: FakeAnswer) {
            self.state().payment_recorded = answer;
        }

        async fn answer(&self, pick: impl FnOnce(&FakeState) -> FakeAnswer) -> Result<bool, CollaboratorError> {
            let answer = pick(&self.state());
            match answer {
                FakeAnswer::Value(value) => Ok(value),
                FakeAnswer::Fail => Err(CollaboratorError::Request {
                    message: "scripted failure".to_string(),
                }),
                FakeAnswer::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(false)
                }
            }
        }
    }

    #[async_trait]
    impl CrewDirectory for InMemoryCollaborators {
        async fn is_crew_assigned(&self, _job_id: &JobId) -> Result<bool, CollaboratorError> {
            self.answer(|s| s.crew_assigned).await
        }

        async fn is_crew_checked_in(&self, _job_id: &JobId) -> Result<bool, CollaboratorError> {
            self.answer(|s| s.crew_checked_in).await
        }
    }

    #[async_trait]
    impl FormsService for InMemoryCollaborators {
        async fn are_required_forms_complete(
            &self,
            _job_id: &JobId,
        ) -> Result<bool, CollaboratorError> {
            self.answer(|s| s.forms_complete).await
        }

        async fn is_signature_required(&self, _job_id: &JobId) -> Result<bool, CollaboratorError> {
            self.answer(|s| s.signature_required).await
        }

        async fn is_signature_captured(&self, _job_id: &JobId) -> Result<bool, CollaboratorError> {
            self.answer(|s| s.signature_captured).await
        }
    }

    #[async_trait]
    impl BillingService for InMemoryCollaborators {
        async fn are_line_items_finalized(
            &self,
            _job_id: &JobId,
        ) -> Result<bool, CollaboratorError> {
            self.answer(|s| s.line_items_finalized).await
        }

        async fn is_payment_recorded(&self, _job_id: &JobId) -> Result<bool, CollaboratorError> {
            self.answer(|s| s.payment_recorded).await
        }
    }
}
