//! The orchestration facade.
//!
//! [`Huginn`] composes the device profiler, classifier, prompt optimizer,
//! response cache and retry orchestrator into one pipeline:
//!
//! ```text
//! profile → classify → cache get ─hit─→ return (from_cache = true)
//!                          │
//!                         miss → optimize → call with retry → score → cache set → return
//! ```
//!
//! Within a request the steps run strictly in that order. Optimization and
//! caching are purely additive: neither can fail a request, and a fatal
//! provider error is always propagated as-is, never turned into a miss or
//! a degraded answer.

mod builder;

pub use builder::HuginnBuilder;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::cache::{
    CacheEntry, CacheQuery, ImportStatus, QualityWeights, ResponseCache, context_digest, score_response,
};
use crate::device::{DeviceProfile, DeviceProfiler};
use crate::optimizer::{PromptOptimizer, classify, device_adjusted_params};
use crate::persistence::SnapshotStore;
use crate::providers::{
    ProviderPort, ProviderRequest, StreamConfig, TokenStream, bounded_stream, synthesize_stream,
};
use crate::retry::RetryOrchestrator;
use crate::telemetry;
use crate::types::{
    ChatResponse, ContextFlags, GenerationParameters, ImageAttachment, Message, MessageContent,
    Provider, ProviderParams, RequestClassification, ResponseMetadata, Role,
};
use crate::{HuginnError, Result};

/// Per-request options for [`Huginn::send_message`] and
/// [`Huginn::stream_message`].
///
/// ```rust
/// # use huginn::{ChatRequest, ContextFlags, Provider};
/// let request = ChatRequest::new(Provider::Mistral, "mistral-small-latest")
///     .context(ContextFlags::new().documents(true))
///     .context_digest("doc-v3");
/// ```
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub provider: Provider,
    pub model: String,
    /// Caller parameters. Provider defaults when `None`.
    pub params: Option<ProviderParams>,
    /// Side-context available to this request.
    pub context: ContextFlags,
    /// Identifies the side-context content; part of the cache key.
    pub context_digest: String,
    /// Default: true.
    pub use_cache: bool,
    /// Default: true.
    pub optimize: bool,
    pub cancel: Option<CancellationToken>,
}

impl ChatRequest {
    pub fn new(provider: Provider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            params: None,
            context: ContextFlags::default(),
            context_digest: String::new(),
            use_cache: true,
            optimize: true,
            cancel: None,
        }
    }

    pub fn params(mut self, params: ProviderParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn context(mut self, context: ContextFlags) -> Self {
        self.context = context;
        self
    }

    pub fn context_digest(mut self, digest: impl Into<String>) -> Self {
        self.context_digest = digest.into();
        self
    }

    pub fn use_cache(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;
        self
    }

    pub fn optimize(mut self, enabled: bool) -> Self {
        self.optimize = enabled;
        self
    }

    /// Abandon the request once `token` is cancelled.
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Request state shared by the single-shot and streaming pipelines.
struct Prepared<'a> {
    start: Instant,
    cancel: CancellationToken,
    prompt: &'a str,
    classification: RequestClassification,
    device: DeviceProfile,
    params: ProviderParams,
    /// Caller digest with the context flags and images folded in.
    context_digest: String,
}

/// Request optimization, response caching and adaptive retry in front of a
/// [`ProviderPort`].
///
/// Construct once at startup with [`Huginn::builder`], call
/// [`init`](Self::init) to load the persisted cache, and
/// [`shutdown`](Self::shutdown) before exit to persist it again.
pub struct Huginn {
    provider: Arc<dyn ProviderPort>,
    cache: Option<Arc<ResponseCache>>,
    quality: QualityWeights,
    retry: Arc<RetryOrchestrator>,
    profiler: Arc<DeviceProfiler>,
    optimizer: PromptOptimizer,
    stream: StreamConfig,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    snapshot_key: String,
    snapshot_interval: Option<Duration>,
    snapshot_task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl Huginn {
    pub fn builder() -> HuginnBuilder {
        HuginnBuilder::new()
    }

    /// The response cache, `None` when caching is disabled.
    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_deref()
    }

    pub fn retry(&self) -> &RetryOrchestrator {
        &self.retry
    }

    pub fn profiler(&self) -> &DeviceProfiler {
        &self.profiler
    }

    pub fn optimizer(&self) -> &PromptOptimizer {
        &self.optimizer
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Load the persisted cache snapshot and start periodic snapshots.
    ///
    /// Persistence is best-effort: a failing store is logged and leaves the
    /// cache empty. Returns the import outcome when a snapshot was found.
    pub async fn init(&self) -> Result<Option<ImportStatus>> {
        let status = match (&self.cache, &self.snapshots) {
            (Some(cache), Some(store)) => match store.load_snapshot(&self.snapshot_key).await {
                Ok(Some(bytes)) => {
                    let status = cache.import(&bytes);
                    info!(key = %self.snapshot_key, ?status, "cache snapshot loaded");
                    Some(status)
                }
                Ok(None) => None,
                Err(e) => {
                    warn!(key = %self.snapshot_key, error = %e, "failed to load cache snapshot");
                    None
                }
            },
            _ => None,
        };

        if let (Some(cache), Some(store), Some(interval)) =
            (&self.cache, &self.snapshots, self.snapshot_interval)
        {
            let mut task = self
                .snapshot_task
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if task.is_none() {
                let token = CancellationToken::new();
                let handle = tokio::spawn(snapshot_loop(
                    cache.clone(),
                    store.clone(),
                    self.snapshot_key.clone(),
                    interval,
                    token.clone(),
                ));
                *task = Some((token, handle));
                debug!(interval_secs = interval.as_secs(), "periodic snapshots started");
            }
        }

        Ok(status)
    }

    /// Stop periodic snapshots and write a final one.
    pub async fn shutdown(&self) -> Result<()> {
        let task = self
            .snapshot_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((token, handle)) = task {
            token.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "snapshot task ended abnormally");
            }
        }
        self.save_snapshot().await?;
        info!("huginn shut down");
        Ok(())
    }

    /// Persist the cache now. Returns `false` when there is no cache or store.
    pub async fn save_snapshot(&self) -> Result<bool> {
        let (Some(cache), Some(store)) = (&self.cache, &self.snapshots) else {
            return Ok(false);
        };
        let bytes = cache.export()?;
        store.save_snapshot(&self.snapshot_key, &bytes).await?;
        debug!(key = %self.snapshot_key, bytes = bytes.len(), "cache snapshot saved");
        Ok(true)
    }

    /// Remove the persisted snapshot. The in-memory cache is untouched.
    pub async fn clear_persisted(&self) -> Result<()> {
        match &self.snapshots {
            Some(store) => store.remove_snapshot(&self.snapshot_key).await,
            None => Ok(()),
        }
    }

    // ========================================================================
    // Pipeline
    // ========================================================================

    /// Answer the latest user message in `messages`.
    ///
    /// Fatal provider errors and exhausted retries come back as
    /// [`HuginnError::RetryFailed`]; a cancelled request as
    /// [`HuginnError::Cancelled`].
    #[instrument(skip_all, fields(provider = %request.provider, model = %request.model))]
    pub async fn send_message(
        &self,
        request: &ChatRequest,
        messages: &[Message],
        images: &[ImageAttachment],
        system_prompt: Option<&str>,
    ) -> Result<ChatResponse> {
        let prepared = self.prepare(request, messages, images)?;

        if let Some(entry) = self.cache_lookup(request, &prepared) {
            let response = Self::cached_response(entry, &prepared);
            self.record_request(request.provider, prepared.start, "cached");
            return Ok(response);
        }

        let call = self.build_call(request, &prepared, messages, images, system_prompt);
        let port = self.provider.as_ref();
        let outcome = match self
            .retry
            .execute_with_retry_cancellable(request.provider, &prepared.cancel, || call_port(port, &call))
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.record_request(request.provider, prepared.start, "error");
                return Err(e);
            }
        };

        self.finish(request, prepared, outcome.value, outcome.attempts)
    }

    /// Like [`send_message`](Self::send_message), delivering the response
    /// incrementally through `on_token`.
    ///
    /// Cache hits are replayed through the same chunker used for providers
    /// without native streaming. Only complete responses are cached.
    #[instrument(skip_all, fields(provider = %request.provider, model = %request.model))]
    pub async fn stream_message<F>(
        &self,
        request: &ChatRequest,
        messages: &[Message],
        images: &[ImageAttachment],
        system_prompt: Option<&str>,
        mut on_token: F,
    ) -> Result<ChatResponse>
    where
        F: FnMut(&str) + Send,
    {
        let prepared = self.prepare(request, messages, images)?;

        if let Some(entry) = self.cache_lookup(request, &prepared) {
            let replay = synthesize_stream(&entry.response, &self.stream);
            if let Err(e) = drain(replay, &prepared.cancel, &mut on_token).await {
                self.record_request(request.provider, prepared.start, "error");
                return Err(e);
            }
            let response = Self::cached_response(entry, &prepared);
            self.record_request(request.provider, prepared.start, "cached");
            return Ok(response);
        }

        let call = self.build_call(request, &prepared, messages, images, system_prompt);
        let port = self.provider.as_ref();
        let stream_config = &self.stream;
        let opened = self
            .retry
            .execute_with_retry_cancellable(request.provider, &prepared.cancel, || {
                open_stream(port, &call, stream_config)
            })
            .await;

        let drained = match opened {
            Ok(outcome) => drain(outcome.value, &prepared.cancel, &mut on_token)
                .await
                .map(|content| (content, outcome.attempts)),
            Err(e) => Err(e),
        };
        let (content, attempts) = match drained {
            Ok(done) => done,
            Err(e) => {
                self.record_request(request.provider, prepared.start, "error");
                return Err(e);
            }
        };

        self.finish(request, prepared, content, attempts)
    }

    /// Steps 1 and 2: device profile and classification.
    fn prepare<'a>(
        &self,
        request: &ChatRequest,
        messages: &'a [Message],
        images: &[ImageAttachment],
    ) -> Result<Prepared<'a>> {
        let start = Instant::now();
        let cancel = request.cancel.clone().unwrap_or_default();
        if cancel.is_cancelled() {
            return Err(HuginnError::Cancelled);
        }

        let prompt = Message::latest_user(messages)
            .map(Message::text)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| HuginnError::InvalidInput("no user message to answer".to_string()))?;

        let params = match &request.params {
            Some(p) if p.provider() != request.provider => {
                return Err(HuginnError::InvalidInput(format!(
                    "{} parameters passed for provider {}",
                    p.provider(),
                    request.provider
                )));
            }
            Some(p) => p.clone().clamped(),
            None => ProviderParams::defaults_for(request.provider),
        };

        let device = self.profiler.profile();
        let context = request
            .context
            .merge(ContextFlags::new().images(!images.is_empty()));
        let classification = classify(prompt).with_context(context);
        let digest = context_digest(&request.context_digest, context, images);
        debug!(
            request_type = %classification.request_type,
            complexity = classification.complexity,
            language = %classification.language,
            device_tier = device.tier,
            "request classified"
        );

        Ok(Prepared {
            start,
            cancel,
            prompt,
            classification,
            device,
            params,
            context_digest: digest,
        })
    }

    fn cache_query<'a>(request: &'a ChatRequest, prepared: &'a Prepared<'_>) -> CacheQuery<'a> {
        CacheQuery::new(
            prepared.prompt,
            request.provider,
            &request.model,
            &prepared.params,
            &prepared.context_digest,
        )
    }

    /// Step 3.
    fn cache_lookup(&self, request: &ChatRequest, prepared: &Prepared<'_>) -> Option<CacheEntry> {
        if !request.use_cache {
            return None;
        }
        let cache = self.cache.as_ref()?;
        let entry = cache.get(&Self::cache_query(request, prepared))?;
        debug!(access_count = entry.access_count, "cache hit");
        Some(entry)
    }

    fn cached_response(entry: CacheEntry, prepared: &Prepared<'_>) -> ChatResponse {
        ChatResponse {
            metadata: ResponseMetadata {
                from_cache: true,
                optimization_applied: false,
                retry_attempts: 0,
                response_time: prepared.start.elapsed(),
                quality_score: entry.quality_score,
                classification: prepared.classification.clone(),
            },
            content: entry.response,
        }
    }

    /// Step 4: device-adjusted parameters, then the optimizer.
    fn build_call(
        &self,
        request: &ChatRequest,
        prepared: &Prepared<'_>,
        messages: &[Message],
        images: &[ImageAttachment],
        system_prompt: Option<&str>,
    ) -> ProviderRequest {
        let adjusted = device_adjusted_params(
            &prepared.params,
            &prepared.device,
            self.optimizer.config(),
        );
        let mut messages = messages.to_vec();
        let mut system_prompt = system_prompt.map(str::to_owned);

        let params = if request.optimize {
            let optimized = self.optimizer.optimize(
                request.provider,
                prepared.prompt,
                &prepared.classification,
                request.context,
                &prepared.device,
            );
            if let Some(last_user) = messages.iter_mut().rev().find(|m| m.role == Role::User) {
                last_user.content = MessageContent::Text(optimized.rewritten_prompt);
            }
            let instructions = optimized.provider_instructions.join("\n");
            system_prompt = Some(match system_prompt {
                Some(base) if !base.trim().is_empty() => format!("{base}\n\n{instructions}"),
                _ => instructions,
            });
            let generated = &optimized.generation_params;
            adjusted.with_sampling(
                generated.temperature(),
                generated.top_p(),
                generated.max_tokens(),
            )
        } else {
            adjusted
        };

        ProviderRequest {
            provider: request.provider,
            model: request.model.clone(),
            messages,
            system_prompt,
            params,
            images: images.to_vec(),
        }
    }

    /// Step 6: score, store and report.
    fn finish(
        &self,
        request: &ChatRequest,
        prepared: Prepared<'_>,
        content: String,
        attempts: u32,
    ) -> Result<ChatResponse> {
        // nobody is waiting for an abandoned answer, so it is not cached either
        if prepared.cancel.is_cancelled() {
            self.record_request(request.provider, prepared.start, "error");
            return Err(HuginnError::Cancelled);
        }

        let quality_score = match self.cache.as_ref() {
            Some(cache) if request.use_cache => cache
                .set(
                    &Self::cache_query(request, &prepared),
                    &content,
                    &prepared.classification,
                    None,
                )
                .map(|entry| entry.quality_score)
                .unwrap_or_else(|| {
                    score_response(&content, &prepared.classification, &self.quality)
                }),
            _ => score_response(&content, &prepared.classification, &self.quality),
        };

        self.record_request(request.provider, prepared.start, "ok");
        Ok(ChatResponse {
            content,
            metadata: ResponseMetadata {
                from_cache: false,
                optimization_applied: request.optimize,
                retry_attempts: attempts,
                response_time: prepared.start.elapsed(),
                quality_score,
                classification: prepared.classification,
            },
        })
    }

    fn record_request(&self, provider: Provider, start: Instant, status: &'static str) {
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "provider" => provider.as_str(),
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
            "provider" => provider.as_str(),
        )
        .record(start.elapsed().as_secs_f64());
    }
}

/// One provider call. A blank answer is a failed attempt.
async fn call_port(port: &dyn ProviderPort, request: &ProviderRequest) -> Result<String> {
    let text = port.call(request).await?;
    if text.trim().is_empty() {
        return Err(HuginnError::EmptyResponse);
    }
    Ok(text)
}

/// Native stream when the port has one, otherwise a synthesized stream
/// over the complete response.
///
/// A native stream is read up to its first non-blank chunk before it is
/// handed out, so a stream that ends blank fails the attempt with
/// [`HuginnError::EmptyResponse`] and can be retried.
async fn open_stream(
    port: &dyn ProviderPort,
    request: &ProviderRequest,
    config: &StreamConfig,
) -> Result<TokenStream> {
    match port.stream_call(request).await {
        Ok(stream) => {
            let mut stream = bounded_stream(stream, config.buffer);
            let mut leading = Vec::new();
            loop {
                match stream.next().await {
                    Some(Ok(chunk)) => {
                        let blank = chunk.trim().is_empty();
                        leading.push(Ok(chunk));
                        if !blank {
                            break;
                        }
                    }
                    Some(Err(e)) => return Err(e),
                    None => return Err(HuginnError::EmptyResponse),
                }
            }
            Ok(Box::pin(futures_util::stream::iter(leading).chain(stream)))
        }
        Err(HuginnError::Unsupported) => {
            let text = call_port(port, request).await?;
            Ok(synthesize_stream(&text, config))
        }
        Err(e) => Err(e),
    }
}

/// Forward every chunk to `on_token` and return the concatenation.
async fn drain<F>(mut stream: TokenStream, cancel: &CancellationToken, on_token: &mut F) -> Result<String>
where
    F: FnMut(&str) + Send,
{
    let mut content = String::new();
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Err(HuginnError::Cancelled),
            next = stream.next() => next,
        };
        match next {
            Some(Ok(chunk)) => {
                on_token(&chunk);
                content.push_str(&chunk);
            }
            Some(Err(e)) => return Err(e),
            None => return Ok(content),
        }
    }
}

async fn snapshot_loop(
    cache: Arc<ResponseCache>,
    store: Arc<dyn SnapshotStore>,
    key: String,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    // the first tick completes immediately; the cache was only just loaded
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let saved = match cache.export() {
                    Ok(bytes) => store.save_snapshot(&key, &bytes).await,
                    Err(e) => Err(e),
                };
                match saved {
                    Ok(()) => debug!(key = %key, "periodic cache snapshot saved"),
                    Err(e) => warn!(key = %key, error = %e, "periodic cache snapshot failed"),
                }
            }
        }
    }
}
