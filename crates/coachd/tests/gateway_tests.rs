//! AI Gateway integration tests
//!
//! Scripted FakeProviders and a ManualClock drive breaker recovery and
//! cache expiry at exact instants. Timeout tests run on paused tokio time,
//! so nothing sleeps for real.

use chrono::Duration as ChronoDuration;
use coach_common::{ChatMessage, GatewayConfig};
use coachd::gateway::{
    AiGateway, CircuitState, FakeProvider, FakeProviderBuilder, GatewayError, GenerateRequest,
    ProviderError,
};
use coachd::ManualClock;
use std::sync::Arc;
use std::time::Duration;

fn request(text: &str) -> GenerateRequest {
    GenerateRequest::new(vec![ChatMessage::user(text)], 200, 0.7).domain("question")
}

fn config() -> GatewayConfig {
    GatewayConfig {
        failure_threshold: 3,
        recovery_window_secs: 300,
        ..Default::default()
    }
}

// ============================================================================
// Circuit breaker
// ============================================================================

/// Three consecutive failures open the breaker until the recovery window
/// elapses, then the provider is tried again
#[tokio::test]
async fn test_breaker_opens_and_recovers_at_boundary() {
    let clock = Arc::new(ManualClock::default());
    let primary = FakeProvider::failing("primary");
    let backup = FakeProvider::always("backup", "Tell me about yourself.");
    let gateway = AiGateway::builder(&config())
        .clock(clock.clone())
        .provider(primary.clone())
        .provider(backup.clone())
        .build();

    for i in 0..3 {
        let out = gateway.generate(request(&format!("q{}", i))).await.unwrap();
        assert_eq!(out.provider_used, "backup");
        assert!(out.fallback_used);
    }
    assert_eq!(primary.call_count(), 3);
    assert_eq!(
        gateway.breaker_state("primary").await,
        Some(CircuitState::Open)
    );

    // Open: skipped without a call
    gateway.generate(request("q3")).await.unwrap();
    assert_eq!(primary.call_count(), 3);

    clock.advance(ChronoDuration::seconds(299));
    assert_eq!(gateway.is_available("primary").await, Some(false));

    clock.advance(ChronoDuration::seconds(1));
    assert_eq!(gateway.is_available("primary").await, Some(true));
    assert_eq!(
        gateway.breaker_state("primary").await,
        Some(CircuitState::Closed)
    );

    gateway.generate(request("q4")).await.unwrap();
    assert_eq!(primary.call_count(), 4);

    // One failure after recovery does not reopen it
    assert_eq!(gateway.is_available("primary").await, Some(true));
}

/// A success between failures resets the consecutive count
#[tokio::test]
async fn test_success_resets_failure_count() {
    let flaky = FakeProviderBuilder::new("flaky")
        .reject("503")
        .reject("503")
        .text("ok")
        .reject("503")
        .reject("503")
        .text("ok")
        .build();
    let gateway = AiGateway::builder(&config()).provider(flaky.clone()).build();

    for i in 0..6 {
        let _ = gateway.generate(request(&format!("r{}", i))).await;
    }
    assert_eq!(flaky.call_count(), 6);
    assert_eq!(
        gateway.breaker_state("flaky").await,
        Some(CircuitState::Closed)
    );
}

#[tokio::test]
async fn test_reset_breaker() {
    let down = FakeProvider::failing("down");
    let gateway = AiGateway::builder(&config()).provider(down.clone()).build();
    for i in 0..3 {
        assert!(gateway.generate(request(&format!("x{}", i))).await.is_err());
    }
    assert_eq!(gateway.is_available("down").await, Some(false));

    assert!(gateway.reset_breaker("down").await);
    assert_eq!(gateway.is_available("down").await, Some(true));
    assert!(!gateway.reset_breaker("unknown").await);
    assert_eq!(gateway.is_available("unknown").await, None);
}

// ============================================================================
// Aggregate failure
// ============================================================================

/// Exhausting every provider names each one with its last error
#[tokio::test]
async fn test_all_providers_unavailable_names_each_provider() {
    let gateway = AiGateway::builder(&config())
        .provider(FakeProvider::failing("alpha"))
        .provider(FakeProviderBuilder::new("beta").reject("HTTP 401").build())
        .build();

    let err = gateway.generate(request("hello")).await.unwrap_err();
    let GatewayError::AllProvidersUnavailable { attempts } = &err;
    let names: Vec<&str> = attempts.iter().map(|a| a.provider()).collect();
    assert_eq!(names, vec!["alpha", "beta"]);

    let message = err.to_string();
    assert!(message.contains("alpha"));
    assert!(message.contains("HTTP 401"));
}

/// Open breakers show up as CircuitOpen attempts
#[tokio::test]
async fn test_open_breaker_reported_in_attempts() {
    let gateway = AiGateway::builder(&config())
        .provider(FakeProvider::failing("solo"))
        .build();
    for i in 0..3 {
        let _ = gateway.generate(request(&format!("y{}", i))).await;
    }

    let err = gateway.generate(request("y3")).await.unwrap_err();
    assert!(matches!(
        err.attempts(),
        [ProviderError::CircuitOpen { provider }] if provider == "solo"
    ));
}

// ============================================================================
// Timeouts
// ============================================================================

/// A slow provider times out, counts as a failure and fails over
#[tokio::test(start_paused = true)]
async fn test_timeout_fails_over() {
    let slow = FakeProviderBuilder::new("slow")
        .delay(Duration::from_secs(120), "too late")
        .build();
    let fast = FakeProvider::always("fast", "in time");
    let gateway = AiGateway::builder(&GatewayConfig {
        default_timeout_secs: 30,
        ..config()
    })
    .provider(slow.clone())
    .provider(fast)
    .build();

    let out = gateway.generate(request("hurry")).await.unwrap();
    assert_eq!(out.content, "in time");
    assert_eq!(out.provider_used, "fast");

    let stats = gateway.stats().await;
    let slow_stats = &stats.providers[0];
    assert_eq!(slow_stats.name, "slow");
    assert_eq!(slow_stats.failures, 1);
    assert_eq!(slow_stats.failure_count, 1);
}

/// A per-request timeout overrides the gateway default
#[tokio::test(start_paused = true)]
async fn test_request_timeout_override() {
    let slow = FakeProviderBuilder::new("slow")
        .delay(Duration::from_secs(10), "late")
        .build();
    let gateway = AiGateway::builder(&config()).provider(slow).build();

    let err = gateway
        .generate(request("quick").timeout(Duration::from_secs(2)))
        .await
        .unwrap_err();
    assert!(matches!(
        err.attempts()[0],
        ProviderError::Timeout { after_ms: 2000, .. }
    ));
}

// ============================================================================
// Cache
// ============================================================================

/// Same fingerprint within TTL is served from cache; after TTL a fresh
/// provider call happens
#[tokio::test]
async fn test_cache_hit_then_expiry() {
    let clock = Arc::new(ManualClock::default());
    let provider = FakeProvider::always("p", "cached text");
    let gateway = AiGateway::builder(&GatewayConfig {
        cache_ttl_secs: 3600,
        ..config()
    })
    .clock(clock.clone())
    .provider(provider.clone())
    .build();

    let first = gateway.generate(request("same")).await.unwrap();
    let second = gateway.generate(request("same")).await.unwrap();
    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(second.content, "cached text");
    assert_eq!(second.provider_used, "p");
    assert_eq!(provider.call_count(), 1);

    clock.advance(ChronoDuration::seconds(3601));
    let third = gateway.generate(request("same")).await.unwrap();
    assert!(!third.cached);
    assert_eq!(provider.call_count(), 2);

    let stats = gateway.stats().await;
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.cache_misses, 2);
}

/// Language and domain are part of the fingerprint
#[tokio::test]
async fn test_cache_key_includes_language_and_domain() {
    let provider = FakeProvider::always("p", "text");
    let gateway = AiGateway::builder(&config())
        .provider(provider.clone())
        .build();

    gateway.generate(request("hi").language("en")).await.unwrap();
    gateway.generate(request("hi").language("es")).await.unwrap();
    gateway.generate(request("hi").language("en").domain("summary")).await.unwrap();
    assert_eq!(provider.call_count(), 3);
    assert_eq!(gateway.cache_len().await, 3);
}

/// Capacity overflow evicts the oldest entry
#[tokio::test]
async fn test_cache_capacity_evicts_oldest() {
    let provider = FakeProvider::always("p", "text");
    let gateway = AiGateway::builder(&GatewayConfig {
        cache_capacity: 2,
        ..config()
    })
    .provider(provider.clone())
    .build();

    for key in ["a", "b", "c"] {
        gateway.generate(request(key)).await.unwrap();
    }
    assert_eq!(gateway.cache_len().await, 2);

    gateway.generate(request("c")).await.unwrap();
    assert_eq!(provider.call_count(), 3);
    gateway.generate(request("a")).await.unwrap();
    assert_eq!(provider.call_count(), 4);
}

/// A cache hit skips breaker checks, so an open breaker does not matter
#[tokio::test]
async fn test_cache_hit_bypasses_open_breaker() {
    let flaky = FakeProviderBuilder::new("flaky")
        .text("first answer")
        .reject("down")
        .build();
    let gateway = AiGateway::builder(&config()).provider(flaky.clone()).build();

    gateway.generate(request("stable")).await.unwrap();
    for i in 0..3 {
        let _ = gateway.generate(request(&format!("z{}", i))).await;
    }
    assert_eq!(gateway.breaker_state("flaky").await, Some(CircuitState::Open));

    let out = gateway.generate(request("stable")).await.unwrap();
    assert!(out.cached);
    assert_eq!(out.content, "first answer");
    assert_eq!(flaky.call_count(), 4);
}
