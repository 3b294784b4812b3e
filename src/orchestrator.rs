//! Generation state machine: validate, build the prompt, invoke the capability, capture the outcome.
//!
//! Every submission takes a fresh invocation number. Updates coming from an invocation that is no
//! longer the latest one are dropped, so a late result can never overwrite a newer submission.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::capability::{CapabilityRegistry, GenerationRequest, ProgressReporter};
use crate::error::GenerationError;
use crate::form::{FieldValue, FormState};
use crate::prompt::{build_prompt, PromptLayout};
use crate::results::{GenerationResult, ResultSet};
use crate::schema::{FieldKind, FieldRole, FieldSchema, ServiceDefinition};

pub const PREPARING_MESSAGE: &str = "Preparing generation...";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    #[default]
    Idle,
    Validating,
    Submitting,
    Succeeded,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrchestratorSnapshot {
    pub phase: Phase,
    /// Number of the latest submission; 0 before the first one.
    pub invocation: u64,
    pub loading_message: Option<String>,
    pub error: Option<GenerationError>,
    pub results: ResultSet,
}

#[derive(Clone)]
pub struct Orchestrator {
    capabilities: CapabilityRegistry,
    state: Arc<watch::Sender<OrchestratorSnapshot>>,
}

impl Orchestrator {
    pub fn new(capabilities: CapabilityRegistry) -> Self {
        let (state, _) = watch::channel(OrchestratorSnapshot::default());
        Self { capabilities, state: Arc::new(state) }
    }

    pub fn snapshot(&self) -> OrchestratorSnapshot {
        self.state.borrow().clone()
    }

    /// Observe every state change, including progress messages.
    pub fn subscribe(&self) -> watch::Receiver<OrchestratorSnapshot> {
        self.state.subscribe()
    }

    /// Back to `Idle`; whatever is in flight becomes stale.
    pub fn reset(&self) {
        self.state.send_modify(|s| {
            *s = OrchestratorSnapshot { invocation: s.invocation + 1, ..OrchestratorSnapshot::default() };
        });
    }

    /// Runs one generation to completion and returns the state it settled in.
    ///
    /// If another submission starts before this one settles, this call's outcome is discarded
    /// and the returned snapshot reflects the newer submission.
    pub async fn submit(&self, service: &ServiceDefinition, form: &FormState) -> OrchestratorSnapshot {
        let token = self.begin();
        self.run(token, service, form).await
    }

    /// Like [`Orchestrator::submit`], but the submission is registered before this returns and
    /// the generation itself runs on a background task.
    pub fn spawn(&self, service: ServiceDefinition, form: FormState) -> JoinHandle<OrchestratorSnapshot> {
        let token = self.begin();
        let orchestrator = self.clone();
        tokio::spawn(async move { orchestrator.run(token, &service, &form).await })
    }

    async fn run(&self, token: u64, service: &ServiceDefinition, form: &FormState) -> OrchestratorSnapshot {
        info!("🚀 Submission #{} for '{}'", token, service.service_name());

        if let Err(err) = validate(service, form) {
            warn!("⚠️ Submission #{} rejected: {}", token, err);
            self.settle(token, Err(err));
            return self.snapshot();
        }

        let prompt = build_prompt(form, &PromptLayout::for_service(service));
        let file_input = service
            .field_with_role(FieldRole::PrimaryInput)
            .and_then(|field| form.get(&field.name))
            .and_then(FieldValue::as_file)
            .cloned();
        info!(
            "📝 Prompt for #{} ({} chars, file input: {}): {}",
            token,
            prompt.len(),
            file_input.is_some(),
            &prompt[..prompt.char_indices().nth(120).map_or(prompt.len(), |(i, _)| i)]
        );

        self.update(token, |s| {
            s.phase = Phase::Submitting;
            s.loading_message = Some(PREPARING_MESSAGE.to_string());
        });

        let capability = self.capabilities.get(service.kind());
        let (reporter, mut progress) = ProgressReporter::channel();
        let request = GenerationRequest { service: service.kind(), prompt, file_input };
        let generation = capability.generate(request, reporter);
        tokio::pin!(generation);

        let outcome = loop {
            tokio::select! {
                biased;
                Some(message) = progress.recv() => self.report(token, message),
                outcome = &mut generation => break outcome,
            }
        };
        while let Ok(message) = progress.try_recv() {
            self.report(token, message);
        }

        self.settle(token, outcome.map_err(GenerationError::from));
        self.snapshot()
    }

    fn begin(&self) -> u64 {
        let mut token = 0;
        self.state.send_modify(|s| {
            token = s.invocation + 1;
            *s = OrchestratorSnapshot { phase: Phase::Validating, invocation: token, ..OrchestratorSnapshot::default() };
        });
        token
    }

    fn report(&self, token: u64, message: String) {
        debug!("⏳ #{} progress: {}", token, message);
        self.update(token, |s| s.loading_message = Some(message));
    }

    fn settle(&self, token: u64, outcome: Result<Vec<GenerationResult>, GenerationError>) {
        let applied = match outcome {
            Ok(results) => {
                let count = results.len();
                let applied = self.update(token, |s| {
                    s.phase = Phase::Succeeded;
                    s.loading_message = None;
                    s.error = None;
                    s.results = ResultSet::new(results);
                });
                if applied {
                    info!("✅ Submission #{} produced {} result(s)", token, count);
                }
                applied
            }
            Err(err) => {
                if !matches!(err, GenerationError::Validation { .. }) {
                    error!("❌ Submission #{} failed: {}", token, err);
                }
                self.update(token, |s| {
                    s.phase = Phase::Failed;
                    s.loading_message = None;
                    s.error = Some(err);
                    s.results = ResultSet::default();
                })
            }
        };
        if !applied {
            info!("🗑️ Submission #{} settled after being superseded; outcome ignored", token);
        }
    }

    /// Applies `f` only while `token` is still the latest invocation.
    fn update(&self, token: u64, f: impl FnOnce(&mut OrchestratorSnapshot)) -> bool {
        self.state.send_if_modified(|s| {
            if s.invocation != token {
                return false;
            }
            f(s);
            true
        })
    }
}

/// First failing field wins: required fields are scanned before value constraints.
pub fn validate(service: &ServiceDefinition, form: &FormState) -> Result<(), GenerationError> {
    if let Some(missing) = service.fields().iter().find(|f| f.required && value_of(form, f).is_empty()) {
        return Err(GenerationError::required(&missing.name));
    }

    for field in service.fields() {
        check_value(field, value_of(form, field))?;
    }
    Ok(())
}

fn value_of<'a>(form: &'a FormState, field: &FieldSchema) -> &'a FieldValue {
    form.get(&field.name).unwrap_or(&FieldValue::Empty)
}

fn check_value(field: &FieldSchema, value: &FieldValue) -> Result<(), GenerationError> {
    let not_an_option = |option: &str| GenerationError::invalid(&field.name, format!("\"{option}\" is not an available option"));

    match (field.kind, value) {
        (_, value) if value.is_empty() => Ok(()),
        (FieldKind::Upload, FieldValue::File(_)) => Ok(()),
        (FieldKind::Textarea, FieldValue::Text(_)) => Ok(()),
        (FieldKind::Dropdown, FieldValue::Text(text)) => {
            if field.options.contains(text) {
                Ok(())
            } else {
                Err(not_an_option(text.as_str()))
            }
        }
        (FieldKind::CheckboxGroup, FieldValue::Selection(items)) => {
            match items.iter().find(|item| !field.options.contains(item)) {
                Some(item) => Err(not_an_option(item.as_str())),
                None => Ok(()),
            }
        }
        (FieldKind::Number, FieldValue::Number(n)) => {
            if *n < 1 {
                Err(GenerationError::invalid(&field.name, "must be at least 1"))
            } else if let Some(max) = field.max.filter(|max| n > max) {
                Err(GenerationError::invalid(&field.name, format!("must be at most {max}")))
            } else {
                Ok(())
            }
        }
        (kind, _) => Err(GenerationError::invalid(&field.name, format!("value does not fit a {kind:?} field"))),
    }
}
