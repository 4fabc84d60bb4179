//! AI Gateway
//!
//! Provider-agnostic request router. One `generate()` call:
//! 1. Cache lookup (hit skips providers and breaker bookkeeping entirely)
//! 2. Provider order: priority list, language-preferred providers first
//! 3. Per provider: breaker check, call raced against a timeout
//! 4. Failure or timeout counts against the breaker and fails over
//! 5. First success is cached and returned
//!
//! Exhausting every provider yields `GatewayError::AllProvidersUnavailable`
//! naming each provider and its last error, so callers can switch to their
//! deterministic fallback.
//!
//! Breakers and the cache are process-wide state owned by the gateway
//! instance. Each provider has its own breaker lock; nothing locks across
//! providers.

pub mod cache;
pub mod circuit;
pub mod fake;
pub mod provider;

pub use cache::{fingerprint, CacheEntry, Lookup, ResponseCache};
pub use circuit::{CircuitBreaker, CircuitState};
pub use fake::{FakeProvider, FakeProviderBuilder, FakeReply};
pub use provider::{
    build_provider, OllamaProvider, OpenAiCompatibleProvider, ProviderAdapter, ProviderError,
};

use crate::clock::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use coach_common::{ChatMessage, CoachConfig, GatewayConfig};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

// ============================================================================
// Request / result types
// ============================================================================

/// One generation request
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Content domain ("question", "evaluation", ...); part of the cache key
    pub domain: Option<String>,
    /// Session language; reorders providers and is part of the cache key
    pub language: Option<String>,
    /// Overrides provider and gateway default timeouts
    pub timeout: Option<Duration>,
}

impl GenerateRequest {
    pub fn new(messages: Vec<ChatMessage>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            messages,
            max_tokens,
            temperature,
            domain: None,
            language: None,
            timeout: None,
        }
    }

    pub fn domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }

    pub fn language(mut self, language: &str) -> Self {
        self.language = Some(language.to_string());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Successful generation
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub content: String,
    pub provider_used: String,
    /// True when the answer did not come from the first provider in order
    pub fallback_used: bool,
    /// True when served from the response cache
    pub cached: bool,
}

/// Terminal failure of one generation call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("all providers unavailable: {}", describe_attempts(.attempts))]
    AllProvidersUnavailable { attempts: Vec<ProviderError> },
}

fn describe_attempts(attempts: &[ProviderError]) -> String {
    if attempts.is_empty() {
        return "no providers configured".to_string();
    }
    attempts
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl GatewayError {
    pub fn attempts(&self) -> &[ProviderError] {
        match self {
            GatewayError::AllProvidersUnavailable { attempts } => attempts,
        }
    }
}

/// Per-provider routing options
#[derive(Debug, Clone, Default)]
pub struct ProviderOptions {
    /// Languages this provider should be tried first for
    pub languages: Vec<String>,
    pub timeout: Option<Duration>,
}

// ============================================================================
// Observability
// ============================================================================

#[derive(Debug, Default)]
struct ProviderCounters {
    calls: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure: Option<DateTime<Utc>>,
    pub retry_at: Option<DateTime<Utc>>,
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_entries: usize,
    pub providers: Vec<ProviderStats>,
}

// ============================================================================
// Gateway
// ============================================================================

struct ProviderSlot {
    adapter: Arc<dyn ProviderAdapter>,
    options: ProviderOptions,
    breaker: Mutex<CircuitBreaker>,
    counters: ProviderCounters,
}

impl ProviderSlot {
    fn prefers(&self, language: &str) -> bool {
        self.options
            .languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(language))
    }
}

pub struct AiGateway {
    slots: Vec<ProviderSlot>,
    cache: Mutex<ResponseCache>,
    clock: Arc<dyn Clock>,
    default_timeout: Duration,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl AiGateway {
    pub fn builder(config: &GatewayConfig) -> AiGatewayBuilder {
        AiGatewayBuilder::new(config)
    }

    /// Build from the full config, constructing HTTP adapters for every
    /// enabled provider in priority order
    pub fn from_config(config: &CoachConfig, clock: Arc<dyn Clock>) -> Self {
        let mut builder = AiGatewayBuilder::new(&config.gateway).clock(clock);
        for provider in config.enabled_providers() {
            if let Some(adapter) = build_provider(&provider) {
                info!(provider = %provider.name, model = %provider.model, "provider registered");
                builder = builder.provider_with(
                    adapter,
                    ProviderOptions {
                        languages: provider.languages.clone(),
                        timeout: provider.timeout(),
                    },
                );
            }
        }
        builder.build()
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.slots
            .iter()
            .map(|s| s.adapter.name().to_string())
            .collect()
    }

    /// Effective provider order for `language`: providers preferring the
    /// language first, priority order preserved within each group
    pub fn provider_order(&self, language: Option<&str>) -> Vec<String> {
        self.ordered_slots(language)
            .into_iter()
            .map(|s| s.adapter.name().to_string())
            .collect()
    }

    fn ordered_slots(&self, language: Option<&str>) -> Vec<&ProviderSlot> {
        match language {
            Some(lang) => {
                let (preferred, rest): (Vec<&ProviderSlot>, Vec<&ProviderSlot>) =
                    self.slots.iter().partition(|s| s.prefers(lang));
                preferred.into_iter().chain(rest).collect()
            }
            None => self.slots.iter().collect(),
        }
    }

    /// Generate text through the first healthy provider
    pub async fn generate(&self, request: GenerateRequest) -> Result<Generation, GatewayError> {
        let key = fingerprint(
            &request.messages,
            request.language.as_deref(),
            request.domain.as_deref(),
            request.max_tokens,
            request.temperature,
        );
        let domain = request.domain.as_deref().unwrap_or("general");

        {
            let mut cache = self.cache.lock().await;
            match cache.lookup(&key, self.clock.now()) {
                Lookup::Hit(entry) => {
                    self.cache_hits.fetch_add(1, Ordering::Relaxed);
                    debug!(domain, provider = %entry.provider, "cache hit");
                    return Ok(Generation {
                        content: entry.content,
                        provider_used: entry.provider,
                        fallback_used: false,
                        cached: true,
                    });
                }
                Lookup::Expired => {
                    self.cache_misses.fetch_add(1, Ordering::Relaxed);
                    debug!(domain, "cache entry expired");
                }
                Lookup::Miss => {
                    self.cache_misses.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        let mut attempts = Vec::new();

        for (position, slot) in self
            .ordered_slots(request.language.as_deref())
            .into_iter()
            .enumerate()
        {
            let name = slot.adapter.name();

            let available = slot.breaker.lock().await.is_available(self.clock.now());
            if !available {
                debug!(provider = name, "circuit open, skipping");
                attempts.push(ProviderError::CircuitOpen {
                    provider: name.to_string(),
                });
                continue;
            }

            let timeout = request
                .timeout
                .or(slot.options.timeout)
                .unwrap_or(self.default_timeout);
            slot.counters.calls.fetch_add(1, Ordering::Relaxed);

            let outcome = match tokio::time::timeout(
                timeout,
                slot.adapter
                    .call(&request.messages, request.max_tokens, request.temperature),
            )
            .await
            {
                Ok(Ok(text)) if text.trim().is_empty() => {
                    Err(ProviderError::rejected(name, "empty response"))
                }
                Ok(Ok(text)) => Ok(text),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(ProviderError::Timeout {
                    provider: name.to_string(),
                    after_ms: timeout.as_millis() as u64,
                }),
            };

            match outcome {
                Ok(content) => {
                    slot.breaker.lock().await.record_success();
                    slot.counters.successes.fetch_add(1, Ordering::Relaxed);

                    self.cache.lock().await.insert(
                        key,
                        CacheEntry {
                            content: content.clone(),
                            provider: name.to_string(),
                            stored_at: self.clock.now(),
                        },
                    );

                    if position > 0 {
                        info!(provider = name, domain, "served by fallback provider");
                    }
                    return Ok(Generation {
                        content,
                        provider_used: name.to_string(),
                        fallback_used: position > 0,
                        cached: false,
                    });
                }
                Err(e) => {
                    slot.counters.failures.fetch_add(1, Ordering::Relaxed);
                    {
                        let mut breaker = slot.breaker.lock().await;
                        let was_open = breaker.state() == CircuitState::Open;
                        breaker.record_failure(self.clock.now());
                        if !was_open && breaker.state() == CircuitState::Open {
                            warn!(
                                provider = name,
                                failures = breaker.failure_count(),
                                "circuit opened"
                            );
                        }
                    }
                    warn!(provider = name, domain, error = %e, "provider failed, failing over");
                    attempts.push(e);
                }
            }
        }

        let err = GatewayError::AllProvidersUnavailable { attempts };
        error!(domain, "{}", err);
        Err(err)
    }

    /// Whether `provider` would be tried now (closes breakers whose
    /// recovery window elapsed). None for unknown providers.
    pub async fn is_available(&self, provider: &str) -> Option<bool> {
        let slot = self.slot(provider)?;
        let available = slot.breaker.lock().await.is_available(self.clock.now());
        Some(available)
    }

    /// Raw breaker state, without applying the recovery window
    pub async fn breaker_state(&self, provider: &str) -> Option<CircuitState> {
        let slot = self.slot(provider)?;
        let state = slot.breaker.lock().await.state();
        Some(state)
    }

    pub async fn reset_breaker(&self, provider: &str) -> bool {
        match self.slot(provider) {
            Some(slot) => {
                slot.breaker.lock().await.reset();
                info!(provider, "circuit reset");
                true
            }
            None => false,
        }
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }

    pub async fn cache_len(&self) -> usize {
        self.cache.lock().await.len()
    }

    pub async fn stats(&self) -> GatewayStats {
        let mut providers = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let breaker = slot.breaker.lock().await;
            providers.push(ProviderStats {
                name: slot.adapter.name().to_string(),
                state: breaker.state(),
                failure_count: breaker.failure_count(),
                last_failure: breaker.last_failure(),
                retry_at: breaker.retry_at(),
                calls: slot.counters.calls.load(Ordering::Relaxed),
                successes: slot.counters.successes.load(Ordering::Relaxed),
                failures: slot.counters.failures.load(Ordering::Relaxed),
            });
        }

        GatewayStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_entries: self.cache.lock().await.len(),
            providers,
        }
    }

    fn slot(&self, provider: &str) -> Option<&ProviderSlot> {
        self.slots.iter().find(|s| s.adapter.name() == provider)
    }
}

/// Builder for `AiGateway`. Providers keep the order they are added in.
pub struct AiGatewayBuilder {
    config: GatewayConfig,
    clock: Arc<dyn Clock>,
    providers: Vec<(Arc<dyn ProviderAdapter>, ProviderOptions)>,
}

impl AiGatewayBuilder {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            config: config.clone(),
            clock: Arc::new(SystemClock),
            providers: Vec::new(),
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn provider(self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.provider_with(adapter, ProviderOptions::default())
    }

    pub fn provider_with(
        mut self,
        adapter: Arc<dyn ProviderAdapter>,
        options: ProviderOptions,
    ) -> Self {
        self.providers.push((adapter, options));
        self
    }

    pub fn build(self) -> AiGateway {
        let slots = self
            .providers
            .into_iter()
            .map(|(adapter, options)| ProviderSlot {
                adapter,
                options,
                breaker: Mutex::new(CircuitBreaker::new(
                    self.config.failure_threshold,
                    self.config.recovery_window(),
                )),
                counters: ProviderCounters::default(),
            })
            .collect();

        AiGateway {
            slots,
            cache: Mutex::new(ResponseCache::new(
                self.config.cache_capacity,
                self.config.cache_ttl(),
            )),
            clock: self.clock,
            default_timeout: self.config.default_timeout(),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> GenerateRequest {
        GenerateRequest::new(vec![ChatMessage::user(text)], 100, 0.5)
    }

    #[tokio::test]
    async fn test_first_provider_serves() {
        let primary = FakeProvider::always("primary", "hello");
        let gateway = AiGateway::builder(&GatewayConfig::default())
            .provider(primary.clone())
            .build();

        let out = gateway.generate(request("hi")).await.unwrap();
        assert_eq!(out.content, "hello");
        assert_eq!(out.provider_used, "primary");
        assert!(!out.fallback_used);
        assert!(!out.cached);
    }

    #[tokio::test]
    async fn test_failover_marks_fallback() {
        let primary = FakeProvider::failing("primary");
        let secondary = FakeProvider::always("secondary", "backup");
        let gateway = AiGateway::builder(&GatewayConfig::default())
            .provider(primary.clone())
            .provider(secondary.clone())
            .build();

        let out = gateway.generate(request("hi")).await.unwrap();
        assert_eq!(out.provider_used, "secondary");
        assert!(out.fallback_used);
        assert_eq!(primary.call_count(), 1);
    }

    #[tokio::test]
    async fn test_no_providers_is_unavailable() {
        let gateway = AiGateway::builder(&GatewayConfig::default()).build();
        let err = gateway.generate(request("hi")).await.unwrap_err();
        assert!(err.attempts().is_empty());
        assert!(err.to_string().contains("no providers configured"));
    }

    #[tokio::test]
    async fn test_empty_text_counts_as_failure() {
        let blank = FakeProvider::always("blank", "   ");
        let gateway = AiGateway::builder(&GatewayConfig::default())
            .provider(blank)
            .build();

        let err = gateway.generate(request("hi")).await.unwrap_err();
        assert!(matches!(
            err.attempts()[0],
            ProviderError::Rejected { .. }
        ));
    }

    #[tokio::test]
    async fn test_language_reorders_providers() {
        let config = GatewayConfig::default();
        let gateway = AiGateway::builder(&config)
            .provider(FakeProvider::always("a", "x"))
            .provider(FakeProvider::always("b", "x"))
            .provider_with(
                FakeProvider::always("c", "x"),
                ProviderOptions {
                    languages: vec!["ES".to_string()],
                    timeout: None,
                },
            )
            .build();

        assert_eq!(gateway.provider_order(None), vec!["a", "b", "c"]);
        assert_eq!(gateway.provider_order(Some("es")), vec!["c", "a", "b"]);
        assert_eq!(gateway.provider_order(Some("de")), vec!["a", "b", "c"]);
    }
}
