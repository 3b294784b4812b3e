//! The asynchronous generation capability and its closed dispatch table.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::form::FileHandle;
use crate::results::GenerationResult;
use crate::schema::ServiceKind;

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub service: ServiceKind,
    pub prompt: String,
    pub file_input: Option<FileHandle>,
}

/// Sends human-readable status lines back to the orchestrator. Never blocks.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    sender: Option<mpsc::UnboundedSender<String>>,
}

impl ProgressReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { sender: Some(tx) }, rx)
    }

    /// A reporter whose messages go nowhere.
    pub fn silent() -> Self {
        Self { sender: None }
    }

    pub fn report(&self, message: impl Into<String>) {
        if let Some(sender) = &self.sender {
            // the receiver may already be gone when the invocation was superseded
            let _ = sender.send(message.into());
        }
    }
}

#[async_trait]
pub trait GenerationCapability: Send + Sync {
    async fn generate(
        &self,
        request: GenerationRequest,
        progress: ProgressReporter,
    ) -> Result<Vec<GenerationResult>, ProviderError>;
}

/// One capability per [`ServiceKind`]; every kind has an entry, so dispatch is total.
#[derive(Clone)]
pub struct CapabilityRegistry {
    realistic_photo: Arc<dyn GenerationCapability>,
    photoshop_image: Arc<dyn GenerationCapability>,
    veo_video: Arc<dyn GenerationCapability>,
}

impl CapabilityRegistry {
    /// Routes every service to the same backend.
    pub fn uniform(capability: Arc<dyn GenerationCapability>) -> Self {
        Self::from_fn(|_| capability.clone())
    }

    pub fn from_fn(mut f: impl FnMut(ServiceKind) -> Arc<dyn GenerationCapability>) -> Self {
        Self {
            realistic_photo: f(ServiceKind::RealisticPhoto),
            photoshop_image: f(ServiceKind::PhotoshopImage),
            veo_video: f(ServiceKind::VeoVideo),
        }
    }

    pub fn get(&self, kind: ServiceKind) -> Arc<dyn GenerationCapability> {
        let capability = match kind {
            ServiceKind::RealisticPhoto => &self.realistic_photo,
            ServiceKind::PhotoshopImage => &self.photoshop_image,
            ServiceKind::VeoVideo => &self.veo_video,
        };
        capability.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Echo;

    #[async_trait]
    impl GenerationCapability for Echo {
        async fn generate(
            &self,
            request: GenerationRequest,
            progress: ProgressReporter,
        ) -> Result<Vec<GenerationResult>, ProviderError> {
            progress.report(format!("echo {:?}", request.service));
            Ok(vec![GenerationResult::image(request.prompt)])
        }
    }

    #[tokio::test]
    async fn registry_dispatches_every_kind() {
        let registry = CapabilityRegistry::uniform(Arc::new(Echo));
        for kind in ServiceKind::ALL {
            let (reporter, mut rx) = ProgressReporter::channel();
            let request = GenerationRequest { service: kind, prompt: "p".into(), file_input: None };
            let results = registry.get(kind).generate(request, reporter).await.unwrap();
            assert_eq!(results, vec![GenerationResult::image("p")]);
            assert_eq!(rx.recv().await, Some(format!("echo {kind:?}")));
        }
    }

    #[test]
    fn silent_reporter_discards_messages() {
        ProgressReporter::silent().report("nobody listens");
    }
}
