use std::io::Cursor;
use std::sync::LazyLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use regex::Regex;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use visage_contracts::images::ImageRef;
use visage_contracts::models::ModelTier;
use visage_contracts::settings::{AspectRatio, BlendSettings, FinalSettings};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Fallback retry interval when a rate-limit response carries no parseable
/// delay.
pub const DEFAULT_RETRY_AFTER_SECONDS: u64 = 60;

const DEFAULT_REQUEST_TIMEOUT_SECONDS: f64 = 90.0;
const NO_IMAGE_REASON: &str = "no image returned";
const GENERIC_FAILURE_REASON: &str = "the model failed to generate an image";
const UNREADABLE_REFERENCE_REASON: &str = "unreadable reference image";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("failed to initialize generation client: {0}")]
    Initialization(String),
    #[error("{0}")]
    Validation(String),
    #[error("rate limit exceeded, please retry in {retry_after_seconds} seconds")]
    RateLimited { retry_after_seconds: u64 },
    #[error("{reason}")]
    GenerationFailed { reason: String },
}

/// Classified result of one backend generation call. Transient: consumed by
/// the batch loop, never stored in workflow state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Success { image: ImageRef },
    RateLimited { retry_after_seconds: u64 },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Completed,
    HaltedRateLimited { retry_after_seconds: u64 },
    HaltedFailed { reason: String },
}

// ---------------------------------------------------------------------------
// Backend seam
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub model: String,
    pub instruction: String,
    pub image_parts: Vec<Value>,
    pub aspect_ratio: AspectRatio,
}

pub trait ImageBackend: Send + Sync {
    fn name(&self) -> &str;
    fn invoke(&self, request: &BackendRequest) -> Result<Value>;
}

/// Blocking HTTP transport for the Gemini `generateContent` endpoint.
pub struct GeminiBackend {
    http: HttpClient,
    api_key: String,
    api_base: String,
    timeout: Duration,
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: HttpClient::new(),
            api_key: api_key.into(),
            api_base: GEMINI_API_BASE.to_string(),
            timeout: Duration::from_secs_f64(DEFAULT_REQUEST_TIMEOUT_SECONDS),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: f64) -> Self {
        self.timeout = Duration::from_secs_f64(seconds.clamp(15.0, 300.0));
        self
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_payload(request: &BackendRequest) -> Value {
        let mut parts = request.image_parts.clone();
        parts.push(json!({ "text": request.instruction }));
        json!({
            "contents": [{
                "role": "user",
                "parts": parts,
            }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
                "imageConfig": {
                    "aspectRatio": request.aspect_ratio.as_str(),
                },
            },
        })
    }
}

impl ImageBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn invoke(&self, request: &BackendRequest) -> Result<Value> {
        let endpoint = self.endpoint_for_model(&request.model);
        let payload = Self::build_payload(request);
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        response_json_or_error("Gemini", response)
    }
}

/// Offline backend: renders a solid-color placeholder at the requested
/// aspect ratio, color derived from the instruction text, wrapped in a
/// Gemini-shaped payload. Lets the whole workflow run without a credential
/// or network.
pub struct DryRunBackend;

impl ImageBackend for DryRunBackend {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn invoke(&self, request: &BackendRequest) -> Result<Value> {
        let (width, height) = request.aspect_ratio.render_dims();
        let (r, g, b) = color_from_instruction(&request.instruction);
        let mut canvas = RgbImage::new(width, height);
        for pixel in canvas.pixels_mut() {
            *pixel = Rgb([r, g, b]);
        }
        let mut encoded = Vec::new();
        DynamicImage::ImageRgb8(canvas)
            .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)
            .context("dry-run placeholder encode failed")?;
        Ok(json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "dry-run placeholder" },
                        {
                            "inlineData": {
                                "mimeType": "image/png",
                                "data": BASE64.encode(&encoded),
                            }
                        },
                    ],
                },
            }],
        }))
    }
}

fn color_from_instruction(instruction: &str) -> (u8, u8, u8) {
    let digest = Sha256::digest(instruction.as_bytes());
    (digest[0], digest[1], digest[2])
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        let code = status.as_u16();
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

// ---------------------------------------------------------------------------
// Generation client
// ---------------------------------------------------------------------------

/// Intent-specific operations over one backend. Oblivious to workflow state;
/// never retries. Backoff policy belongs to the caller.
pub struct GenerationClient {
    backend: Box<dyn ImageBackend>,
}

impl GenerationClient {
    pub fn new(credential: &str) -> Result<Self, WorkflowError> {
        let trimmed = credential.trim();
        if trimmed.is_empty() {
            return Err(WorkflowError::Initialization(
                "credential must not be empty".to_string(),
            ));
        }
        Ok(Self::with_backend(Box::new(GeminiBackend::new(trimmed))))
    }

    pub fn with_backend(backend: Box<dyn ImageBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Blend two reference portraits. Image parts go out in
    /// `person1, person2` order; the instruction carries the
    /// `100 - blend_ratio / blend_ratio` split.
    pub fn blend_faces(
        &self,
        person1: &ImageRef,
        person2: &ImageRef,
        blend_ratio: u8,
        aspect_ratio: AspectRatio,
        model: ModelTier,
    ) -> GenerationOutcome {
        let parts = match inline_parts(&[person1, person2]) {
            Ok(parts) => parts,
            Err(_) => {
                return GenerationOutcome::Failed {
                    reason: UNREADABLE_REFERENCE_REASON.to_string(),
                }
            }
        };
        self.generate(model, blend_instruction(blend_ratio, aspect_ratio), parts, aspect_ratio)
    }

    /// Compose the final image from face, pose, and clothing references, in
    /// that order.
    pub fn compose_final(
        &self,
        face: &ImageRef,
        pose: &ImageRef,
        clothing: &ImageRef,
        aspect_ratio: AspectRatio,
        model: ModelTier,
    ) -> GenerationOutcome {
        let parts = match inline_parts(&[face, pose, clothing]) {
            Ok(parts) => parts,
            Err(_) => {
                return GenerationOutcome::Failed {
                    reason: UNREADABLE_REFERENCE_REASON.to_string(),
                }
            }
        };
        self.generate(model, compose_instruction(aspect_ratio), parts, aspect_ratio)
    }

    fn generate(
        &self,
        model: ModelTier,
        instruction: String,
        image_parts: Vec<Value>,
        aspect_ratio: AspectRatio,
    ) -> GenerationOutcome {
        let request = BackendRequest {
            model: model.model_name().to_string(),
            instruction,
            image_parts,
            aspect_ratio,
        };
        classify(self.backend.invoke(&request))
    }
}

fn inline_parts(refs: &[&ImageRef]) -> Result<Vec<Value>> {
    refs.iter().map(|image| image.inline_part()).collect()
}

fn blend_instruction(blend_ratio: u8, aspect_ratio: AspectRatio) -> String {
    let second = blend_ratio.min(100);
    let first = 100 - second;
    format!(
        "Blend the facial features of the two provided people. The blend ratio \
         should be {first}% of the first person and {second}% of the second. \
         Generate a realistic passport-style portrait: upper body, front-facing, \
         neutral expression, plain light background. The result will be used as \
         a face reference, so prioritize facial clarity and a {} aspect ratio.",
        aspect_ratio.as_str()
    )
}

fn compose_instruction(aspect_ratio: AspectRatio) -> String {
    format!(
        "You are given three reference images in order:\n\
         1. Face reference: a portrait of a person whose face should be used.\n\
         2. Pose reference: a photo showing the body pose and composition to replicate.\n\
         3. Clothing reference: a photo of an outfit that should be worn.\n\n\
         Generate a single photorealistic image of the person from image 1 (face), \
         placed in the exact pose from image 2 (pose), wearing the exact outfit \
         from image 3 (clothing). Preserve the face identity, match the pose \
         precisely, and accurately reproduce the clothing style. Use a {} aspect ratio.",
        aspect_ratio.as_str()
    )
}

// ---------------------------------------------------------------------------
// Result classification
// ---------------------------------------------------------------------------

static RETRY_DELAY_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"retryDelay":"(\d+)s"#).expect("retry delay pattern"));
static RETRY_IN_PHRASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"retry in (\d+\.?\d*)s").expect("retry phrase pattern"));

/// Map a raw backend call result to exactly one outcome. Pure; raw error
/// text never leaks into the generic failure reason.
pub fn classify(result: Result<Value>) -> GenerationOutcome {
    match result {
        Ok(payload) => classify_payload(&payload),
        Err(err) => classify_error_text(&error_chain_text(&err, 2048)),
    }
}

fn classify_payload(payload: &Value) -> GenerationOutcome {
    let Some((data, mime)) = first_inline_image(payload) else {
        return GenerationOutcome::Failed {
            reason: NO_IMAGE_REASON.to_string(),
        };
    };
    match BASE64.decode(data.as_bytes()) {
        Ok(bytes) => GenerationOutcome::Success {
            image: ImageRef::from_bytes(bytes, mime),
        },
        Err(_) => GenerationOutcome::Failed {
            reason: GENERIC_FAILURE_REASON.to_string(),
        },
    }
}

fn first_inline_image(payload: &Value) -> Option<(String, String)> {
    for candidate in payload
        .get("candidates")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        for part in candidate
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            let Some(inline) = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object)
            else {
                continue;
            };
            let data = inline
                .get("data")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            let mime = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .unwrap_or("image/png");
            return Some((data.to_string(), mime.to_string()));
        }
    }
    None
}

fn classify_error_text(message: &str) -> GenerationOutcome {
    if message.contains("429") || message.to_ascii_lowercase().contains("quota") {
        return GenerationOutcome::RateLimited {
            retry_after_seconds: extract_retry_seconds(message)
                .unwrap_or(DEFAULT_RETRY_AFTER_SECONDS),
        };
    }
    GenerationOutcome::Failed {
        reason: GENERIC_FAILURE_REASON.to_string(),
    }
}

fn extract_retry_seconds(message: &str) -> Option<u64> {
    let captures = RETRY_DELAY_FIELD
        .captures(message)
        .or_else(|| RETRY_IN_PHRASE.captures(message))?;
    let seconds: f64 = captures.get(1)?.as_str().parse().ok()?;
    Some(seconds.ceil() as u64)
}

fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

// ---------------------------------------------------------------------------
// Batch runner
// ---------------------------------------------------------------------------

/// Run up to `quantity` generation calls, strictly one in flight at a time.
/// After every success the accumulated prefix is handed to `on_progress`;
/// the first non-success outcome halts the loop, leaving earlier items
/// visible through the callbacks already issued.
pub fn run_batch(
    quantity: u32,
    mut generate: impl FnMut() -> GenerationOutcome,
    mut on_progress: impl FnMut(&[ImageRef]),
) -> BatchOutcome {
    let mut items: Vec<ImageRef> = Vec::new();
    for _ in 0..quantity {
        match generate() {
            GenerationOutcome::Success { image } => {
                items.push(image);
                on_progress(&items);
            }
            GenerationOutcome::RateLimited {
                retry_after_seconds,
            } => {
                return BatchOutcome::HaltedRateLimited {
                    retry_after_seconds,
                }
            }
            GenerationOutcome::Failed { reason } => {
                return BatchOutcome::HaltedFailed { reason }
            }
        }
    }
    BatchOutcome::Completed
}

// ---------------------------------------------------------------------------
// Workflow controller
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStep {
    AwaitingCredential,
    ConfiguringBlend,
    ReviewingBlendResults,
    ConfiguringFinal,
    ReviewingFinalResults,
}

impl WorkflowStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingCredential => "awaiting_credential",
            Self::ConfiguringBlend => "configuring_blend",
            Self::ReviewingBlendResults => "reviewing_blend_results",
            Self::ConfiguringFinal => "configuring_final",
            Self::ReviewingFinalResults => "reviewing_final_results",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlendSources {
    pub person1: ImageRef,
    pub person2: ImageRef,
}

/// One blended-face result awaiting selection. Never mutated after append;
/// the whole candidate sequence is replaced on a new batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlendCandidate {
    pub id: String,
    pub image: ImageRef,
    pub source: BlendSources,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowState {
    pub step: WorkflowStep,
    pub is_generating: bool,
    pub credential: Option<String>,
    pub blend_settings: Option<BlendSettings>,
    pub blend_candidates: Vec<BlendCandidate>,
    pub selected_candidate: Option<BlendCandidate>,
    pub final_settings: Option<FinalSettings>,
    pub final_results: Vec<ImageRef>,
    pub error_message: Option<String>,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self {
            step: WorkflowStep::AwaitingCredential,
            is_generating: false,
            credential: None,
            blend_settings: None,
            blend_candidates: Vec::new(),
            selected_candidate: None,
            final_settings: None,
            final_results: Vec::new(),
            error_message: None,
        }
    }
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::new()
    }
}

pub trait StateObserver {
    fn state_changed(&self, state: &WorkflowState);
}

/// The step state machine. Owns all workflow state; every mutation path ends
/// in a full-state publish to every subscribed observer.
pub struct WorkflowController {
    state: WorkflowState,
    client: Option<GenerationClient>,
    observers: Vec<Box<dyn StateObserver>>,
}

impl WorkflowController {
    pub fn new() -> Self {
        Self {
            state: WorkflowState::new(),
            client: None,
            observers: Vec::new(),
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn subscribe(&mut self, observer: Box<dyn StateObserver>) {
        self.observers.push(observer);
    }

    pub fn submit_credential(&mut self, credential: &str) -> Result<(), WorkflowError> {
        if self.state.step != WorkflowStep::AwaitingCredential {
            return Err(WorkflowError::Validation(
                "a credential has already been accepted".to_string(),
            ));
        }
        let client = GenerationClient::new(credential)?;
        self.state.credential = Some(credential.trim().to_string());
        self.client = Some(client);
        self.state.step = WorkflowStep::ConfiguringBlend;
        self.publish();
        Ok(())
    }

    /// Install a pre-built client (dry-run, tests). Same transition as a
    /// successful credential submission.
    pub fn install_client(&mut self, client: GenerationClient) {
        self.client = Some(client);
        if self.state.step == WorkflowStep::AwaitingCredential {
            self.state.step = WorkflowStep::ConfiguringBlend;
        }
        self.publish();
    }

    pub fn submit_blend(
        &mut self,
        settings: BlendSettings,
    ) -> Result<BatchOutcome, WorkflowError> {
        if self.state.step != WorkflowStep::ConfiguringBlend {
            return Err(WorkflowError::Validation(
                "blend submissions are only accepted on the blend step".to_string(),
            ));
        }
        self.ensure_not_generating()?;
        let Some(client) = self.client.as_ref() else {
            return Err(WorkflowError::Validation(
                "no generation client is installed".to_string(),
            ));
        };

        self.state.blend_settings = Some(settings.clone());
        self.state.blend_candidates.clear();
        self.state.selected_candidate = None;
        self.state.error_message = None;
        self.state.is_generating = true;
        self.publish();

        let stamp = timestamp_millis();
        let source = BlendSources {
            person1: settings.person1.clone(),
            person2: settings.person2.clone(),
        };
        let state = &mut self.state;
        let observers = &self.observers;
        let outcome = run_batch(
            settings.quantity,
            || {
                client.blend_faces(
                    &settings.person1,
                    &settings.person2,
                    settings.blend_ratio,
                    settings.aspect_ratio,
                    settings.model,
                )
            },
            |images| {
                state.blend_candidates = images
                    .iter()
                    .enumerate()
                    .map(|(idx, image)| BlendCandidate {
                        id: format!("blend_{stamp}_{idx}"),
                        image: image.clone(),
                        source: source.clone(),
                    })
                    .collect();
                publish_state(observers, state);
            },
        );
        self.finish_batch(&outcome);
        Ok(outcome)
    }

    /// Select one candidate by id. A stale id from a superseded batch is a
    /// guarded no-op.
    pub fn select_candidate(&mut self, id: &str) -> Result<(), WorkflowError> {
        if !matches!(
            self.state.step,
            WorkflowStep::ConfiguringBlend | WorkflowStep::ReviewingBlendResults
        ) {
            return Err(WorkflowError::Validation(
                "candidates can only be selected on the blend step".to_string(),
            ));
        }
        let Some(candidate) = self
            .state
            .blend_candidates
            .iter()
            .find(|candidate| candidate.id == id)
            .cloned()
        else {
            return Ok(());
        };
        self.state.selected_candidate = Some(candidate);
        self.state.final_settings = None;
        self.state.final_results.clear();
        self.state.step = WorkflowStep::ConfiguringFinal;
        self.publish();
        Ok(())
    }

    pub fn submit_final(
        &mut self,
        settings: FinalSettings,
    ) -> Result<BatchOutcome, WorkflowError> {
        if self.state.step != WorkflowStep::ConfiguringFinal {
            return Err(WorkflowError::Validation(
                "final submissions are only accepted on the final configuration step".to_string(),
            ));
        }
        self.ensure_not_generating()?;
        let Some(selected) = self.state.selected_candidate.as_ref() else {
            return Err(WorkflowError::Validation(
                "a blend candidate must be selected first".to_string(),
            ));
        };
        // The face identity input is the selected candidate's primary source
        // reference, not the blended bytes.
        let face = selected.source.person1.clone();
        let Some(client) = self.client.as_ref() else {
            return Err(WorkflowError::Validation(
                "no generation client is installed".to_string(),
            ));
        };

        self.state.final_settings = Some(settings.clone());
        self.state.final_results.clear();
        self.state.error_message = None;
        self.state.step = WorkflowStep::ReviewingFinalResults;
        self.state.is_generating = true;
        self.publish();

        let state = &mut self.state;
        let observers = &self.observers;
        let outcome = run_batch(
            settings.quantity,
            || {
                client.compose_final(
                    &face,
                    &settings.pose,
                    &settings.clothing,
                    settings.aspect_ratio,
                    settings.model,
                )
            },
            |images| {
                state.final_results = images.to_vec();
                publish_state(observers, state);
            },
        );
        self.finish_batch(&outcome);
        Ok(outcome)
    }

    /// Navigate to a post-credential step. Targeting the blend step is the
    /// "start over" reset: candidates, selection, final settings/results,
    /// and the error banner are all cleared (idempotent).
    pub fn navigate(&mut self, step: WorkflowStep) -> Result<(), WorkflowError> {
        if self.state.step == WorkflowStep::AwaitingCredential {
            return Err(WorkflowError::Validation(
                "a credential is required first".to_string(),
            ));
        }
        if step == WorkflowStep::AwaitingCredential {
            return Err(WorkflowError::Validation(
                "cannot navigate back to the credential step".to_string(),
            ));
        }
        if step == WorkflowStep::ConfiguringBlend {
            self.state.blend_candidates.clear();
            self.state.selected_candidate = None;
            self.state.final_settings = None;
            self.state.final_results.clear();
            self.state.error_message = None;
        }
        self.state.step = step;
        self.publish();
        Ok(())
    }

    fn ensure_not_generating(&self) -> Result<(), WorkflowError> {
        if self.state.is_generating {
            return Err(WorkflowError::Validation(
                "a batch is already running".to_string(),
            ));
        }
        Ok(())
    }

    fn finish_batch(&mut self, outcome: &BatchOutcome) {
        self.state.is_generating = false;
        match outcome {
            BatchOutcome::Completed => {}
            BatchOutcome::HaltedRateLimited {
                retry_after_seconds,
            } => {
                self.state.error_message = Some(
                    WorkflowError::RateLimited {
                        retry_after_seconds: *retry_after_seconds,
                    }
                    .to_string(),
                );
            }
            BatchOutcome::HaltedFailed { reason } => {
                self.state.error_message = Some(
                    WorkflowError::GenerationFailed {
                        reason: reason.clone(),
                    }
                    .to_string(),
                );
            }
        }
        self.publish();
    }

    fn publish(&self) {
        publish_state(&self.observers, &self.state);
    }
}

impl Default for WorkflowController {
    fn default() -> Self {
        Self::new()
    }
}

fn publish_state(observers: &[Box<dyn StateObserver>], state: &WorkflowState) {
    for observer in observers {
        observer.state_changed(state);
    }
}

pub fn timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0)
}
