// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Runs the analysis pipeline off the caller's task
//!
//! One submission spawns one task. The caller is expected to hold off new
//! submissions while a run is in progress; two overlapping runs simply
//! complete independently.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};

use crate::client::VisionClient;
use crate::encoder::PayloadEncoder;
use crate::geo::{Coordinates, LocationReader};
use crate::request::{resolve_prompt, AnalysisRequest};
use crate::{Result, ShadowError};

/// Lifecycle of the most recent run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Raw inputs for one run, as entered by the user
#[derive(Clone, Default)]
pub struct Submission {
    pub api_key: String,
    pub image_path: Option<PathBuf>,
    pub latitude: String,
    pub longitude: String,
    pub prompt: String,
}

impl fmt::Debug for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submission")
            .field("api_key", &"<redacted>")
            .field("image_path", &self.image_path)
            .field("latitude", &self.latitude)
            .field("longitude", &self.longitude)
            .field("prompt", &self.prompt)
            .finish()
    }
}

/// A submission that passed validation
struct ValidSubmission {
    api_key: String,
    image_path: PathBuf,
    latitude: String,
    longitude: String,
    prompt: String,
}

impl Submission {
    fn validate(self) -> Result<ValidSubmission> {
        let api_key = self.api_key.trim();
        if api_key.is_empty() {
            return Err(ShadowError::Validation("Please enter your API key.".to_string()));
        }

        let image_path = match self.image_path {
            Some(path) if !path.as_os_str().is_empty() => path,
            _ => return Err(ShadowError::Validation("Please select an image first.".to_string())),
        };

        let latitude = self.latitude.trim();
        let longitude = self.longitude.trim();
        if latitude.is_empty() || longitude.is_empty() {
            return Err(ShadowError::Validation(
                "Please provide both latitude and longitude.".to_string(),
            ));
        }

        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            return Err(ShadowError::Validation("Prompt cannot be empty.".to_string()));
        }

        Ok(ValidSubmission {
            api_key: api_key.to_string(),
            image_path,
            latitude: latitude.to_string(),
            longitude: longitude.to_string(),
            prompt: prompt.to_string(),
        })
    }
}

/// Wires encoder, location reader and vision client into one pipeline
pub struct AnalysisOrchestrator {
    encoder: Arc<dyn PayloadEncoder>,
    locator: Arc<dyn LocationReader>,
    client: Arc<dyn VisionClient>,
    model: String,
    max_output_tokens: u32,
    state: Arc<watch::Sender<RunState>>,
}

impl AnalysisOrchestrator {
    pub fn new(
        encoder: Arc<dyn PayloadEncoder>,
        locator: Arc<dyn LocationReader>,
        client: Arc<dyn VisionClient>,
        model: impl Into<String>,
        max_output_tokens: u32,
    ) -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self {
            encoder,
            locator,
            client,
            model: model.into(),
            max_output_tokens,
            state: Arc::new(state),
        }
    }

    /// Current run state
    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Watch run state transitions
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Coordinates embedded in the image, if any
    pub fn prefill_coordinates(&self, path: &Path) -> Option<Coordinates> {
        self.locator.read(path)
    }

    /// Mark a finished result as consumed and return to `Idle`
    pub fn acknowledge(&self) {
        self.state.send_if_modified(|state| match state {
            RunState::Completed | RunState::Failed => {
                *state = RunState::Idle;
                true
            }
            _ => false,
        });
    }

    /// Validate and start a run.
    ///
    /// Validation failures come back immediately and never reach `Running`.
    /// Otherwise exactly one of the callbacks fires when the run ends.
    /// Must be called from within a tokio runtime.
    pub fn submit<C, F>(
        &self,
        submission: Submission,
        on_complete: C,
        on_failure: F,
    ) -> Result<JoinHandle<()>>
    where
        C: FnOnce(String) + Send + 'static,
        F: FnOnce(ShadowError) + Send + 'static,
    {
        let submission = submission.validate()?;

        let encoder = Arc::clone(&self.encoder);
        let client = Arc::clone(&self.client);
        let state = Arc::clone(&self.state);
        let model = self.model.clone();
        let max_output_tokens = self.max_output_tokens;

        let run_id = uuid::Uuid::new_v4();
        let span = info_span!("analysis", %run_id);

        state.send_replace(RunState::Running);
        info!(parent: &span, "Analyzing {:?}", submission.image_path);

        let handle = tokio::spawn(
            async move {
                match run_pipeline(encoder, client, submission, model, max_output_tokens).await {
                    Ok(answer) => {
                        info!("Analysis completed ({} chars)", answer.len());
                        state.send_replace(RunState::Completed);
                        on_complete(answer);
                    }
                    Err(e) => {
                        warn!("Analysis failed: {}", e);
                        state.send_replace(RunState::Failed);
                        on_failure(e);
                    }
                }
            }
            .instrument(span),
        );

        Ok(handle)
    }
}

async fn run_pipeline(
    encoder: Arc<dyn PayloadEncoder>,
    client: Arc<dyn VisionClient>,
    submission: ValidSubmission,
    model: String,
    max_output_tokens: u32,
) -> Result<String> {
    let ValidSubmission {
        api_key,
        image_path,
        latitude,
        longitude,
        prompt,
    } = submission;

    let payload = tokio::task::spawn_blocking(move || encoder.encode(&image_path))
        .await
        .map_err(|e| ShadowError::Unclassified(format!("Image worker failed: {}", e)))??;

    let prompt = resolve_prompt(&prompt, &latitude, &longitude)?;
    let request = AnalysisRequest::new(payload, prompt, model, max_output_tokens);

    client.analyze(request, &api_key).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::ImagePayload;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::{oneshot, Notify};

    const ANSWER: &str = "Shadow points northeast, consistent with 9:00 AM local time.";

    struct StubEncoder;

    impl PayloadEncoder for StubEncoder {
        fn encode(&self, _path: &Path) -> Result<ImagePayload> {
            Ok(ImagePayload {
                encoded_data: "QUJD".to_string(),
                mime_type: "image/jpeg".to_string(),
            })
        }
    }

    struct FailingEncoder;

    impl PayloadEncoder for FailingEncoder {
        fn encode(&self, path: &Path) -> Result<ImagePayload> {
            Err(image::ImageError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{:?} not found", path),
            ))
            .into())
        }
    }

    struct StubLocator(Option<Coordinates>);

    impl LocationReader for StubLocator {
        fn read(&self, _path: &Path) -> Option<Coordinates> {
            self.0
        }
    }

    #[derive(Default)]
    struct StubClient {
        calls: AtomicUsize,
        fail_with_status: Option<reqwest::StatusCode>,
        last_prompt: Mutex<Option<String>>,
    }

    #[async_trait]
    impl VisionClient for StubClient {
        async fn analyze(&self, request: AnalysisRequest, _api_key: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = Some(request.prompt().to_string());
            match self.fail_with_status {
                Some(status) => Err(ShadowError::from_status(status, "")),
                None => Ok(ANSWER.to_string()),
            }
        }
    }

    fn orchestrator(
        encoder: Arc<dyn PayloadEncoder>,
        client: Arc<StubClient>,
        coords: Option<Coordinates>,
    ) -> AnalysisOrchestrator {
        AnalysisOrchestrator::new(
            encoder,
            Arc::new(StubLocator(coords)),
            client,
            "gpt-4o",
            1000,
        )
    }

    fn valid_submission() -> Submission {
        Submission {
            api_key: "sk-test".to_string(),
            image_path: Some(PathBuf::from("photo.jpg")),
            latitude: "48.8584".to_string(),
            longitude: "2.2945".to_string(),
            prompt: "lat={lat} lon={lon}".to_string(),
        }
    }

    #[tokio::test]
    async fn test_full_run_delivers_answer() {
        let client = Arc::new(StubClient::default());
        let orch = orchestrator(
            Arc::new(StubEncoder),
            Arc::clone(&client),
            Some(Coordinates::new(48.8584, 2.2945)),
        );

        let coords = orch.prefill_coordinates(Path::new("photo.jpg")).unwrap();
        let submission = Submission {
            latitude: coords.latitude_text(),
            longitude: coords.longitude_text(),
            ..valid_submission()
        };

        let (tx, rx) = oneshot::channel();
        let failed = Arc::new(AtomicBool::new(false));
        let failed_flag = Arc::clone(&failed);

        let handle = orch
            .submit(
                submission,
                move |answer| {
                    let _ = tx.send(answer);
                },
                move |_| failed_flag.store(true, Ordering::SeqCst),
            )
            .unwrap();
        handle.await.unwrap();

        assert_eq!(rx.await.unwrap(), ANSWER);
        assert_eq!(orch.state(), RunState::Completed);
        assert!(!failed.load(Ordering::SeqCst));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            client.last_prompt.lock().unwrap().as_deref(),
            Some("lat=48.8584 lon=2.2945")
        );
    }

    #[tokio::test]
    async fn test_empty_api_key_never_reaches_client() {
        let client = Arc::new(StubClient::default());
        let orch = orchestrator(Arc::new(StubEncoder), Arc::clone(&client), None);

        let submission = Submission {
            api_key: "   ".to_string(),
            ..valid_submission()
        };
        let result = orch.submit(submission, |_| {}, |_| {});

        assert!(matches!(result, Err(ShadowError::Validation(_))));
        assert_eq!(orch.state(), RunState::Idle);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_fields_are_rejected() {
        let client = Arc::new(StubClient::default());
        let orch = orchestrator(Arc::new(StubEncoder), Arc::clone(&client), None);

        let cases = [
            Submission {
                image_path: None,
                ..valid_submission()
            },
            Submission {
                latitude: String::new(),
                ..valid_submission()
            },
            Submission {
                longitude: " ".to_string(),
                ..valid_submission()
            },
            Submission {
                prompt: "\n".to_string(),
                ..valid_submission()
            },
        ];

        for submission in cases {
            let result = orch.submit(submission, |_| {}, |_| {});
            assert!(matches!(result, Err(ShadowError::Validation(_))));
        }
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_goes_to_failure_callback() {
        let client = Arc::new(StubClient {
            fail_with_status: Some(reqwest::StatusCode::UNAUTHORIZED),
            ..Default::default()
        });
        let orch = orchestrator(Arc::new(StubEncoder), Arc::clone(&client), None);

        let (tx, rx) = oneshot::channel();
        let completed = Arc::new(AtomicBool::new(false));
        let completed_flag = Arc::clone(&completed);

        let handle = orch
            .submit(
                valid_submission(),
                move |_| completed_flag.store(true, Ordering::SeqCst),
                move |e| {
                    let _ = tx.send(e);
                },
            )
            .unwrap();
        handle.await.unwrap();

        assert!(matches!(rx.await.unwrap(), ShadowError::Authentication));
        assert_eq!(orch.state(), RunState::Failed);
        assert!(!completed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_encoding_failure_skips_network() {
        let client = Arc::new(StubClient::default());
        let orch = orchestrator(Arc::new(FailingEncoder), Arc::clone(&client), None);

        let (tx, rx) = oneshot::channel();
        let handle = orch
            .submit(valid_submission(), |_| {}, move |e| {
                let _ = tx.send(e);
            })
            .unwrap();
        handle.await.unwrap();

        assert!(matches!(rx.await.unwrap(), ShadowError::Encoding(_)));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_acknowledge_returns_to_idle() {
        let client = Arc::new(StubClient::default());
        let orch = orchestrator(Arc::new(StubEncoder), client, None);
        let mut states = orch.subscribe();

        let handle = orch.submit(valid_submission(), |_| {}, |_| {}).unwrap();
        handle.await.unwrap();
        assert_eq!(*states.borrow_and_update(), RunState::Completed);

        orch.acknowledge();
        assert_eq!(orch.state(), RunState::Idle);

        // Acknowledging while idle is a no-op
        orch.acknowledge();
        assert_eq!(orch.state(), RunState::Idle);
    }

    struct GatedClient {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl VisionClient for GatedClient {
        async fn analyze(&self, _request: AnalysisRequest, _api_key: &str) -> Result<String> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(ANSWER.to_string())
        }
    }

    #[tokio::test]
    async fn test_state_is_running_while_client_is_busy() {
        let client = Arc::new(GatedClient {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let orch = AnalysisOrchestrator::new(
            Arc::new(StubEncoder),
            Arc::new(StubLocator(None)),
            Arc::clone(&client) as Arc<dyn VisionClient>,
            "gpt-4o",
            1000,
        );
        assert_eq!(orch.state(), RunState::Idle);

        let handle = orch.submit(valid_submission(), |_| {}, |_| {}).unwrap();
        client.entered.notified().await;
        assert_eq!(orch.state(), RunState::Running);

        client.release.notify_one();
        handle.await.unwrap();
        assert_eq!(orch.state(), RunState::Completed);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let rendered = format!("{:?}", valid_submission());
        assert!(!rendered.contains("sk-test"));
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("photo.jpg"));
    }
}
