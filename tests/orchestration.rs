mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cfbypass_integrations::{
    BypassMiddleware, BypassPlugin, BypassServiceError, CaptureOptions, CaptureOutcome,
    DetectionOutcome, FallbackError, ServiceAvailability,
};
use serde_json::{Value, json};

use common::{ScriptedTransport, ok, refused, status};

const URL: &str = "https://protected.example";

fn middleware(transport: Arc<ScriptedTransport>) -> BypassMiddleware {
    BypassMiddleware::builder()
        .with_transport(transport)
        .build()
        .unwrap()
}

fn bypass_payload() -> Value {
    json!({
        "success": true,
        "data": {
            "screenshot": "QQ==",
            "finalUrl": "https://x",
            "cloudflareDetected": true,
            "bypassSuccessful": true
        }
    })
}

/// Healthy service reporting `detected` for every URL and answering
/// `/bypass` with `bypass`.
fn service(detected: bool, bypass: Value) -> Arc<ScriptedTransport> {
    ScriptedTransport::new(move |request| match request.path() {
        "/health" => ok(json!({"status": "healthy"})),
        "/detect" => ok(json!({"success": true, "data": {"cloudflareDetected": detected}})),
        "/bypass" => ok(bypass.clone()),
        _ => status(404, "{}"),
    })
}

/// Healthy service that detects protection but fails every bypass.
fn failing_bypass_service() -> Arc<ScriptedTransport> {
    ScriptedTransport::new(|request| match request.path() {
        "/health" => ok(json!({"status": "healthy"})),
        "/detect" => ok(json!({"success": true, "data": {"cloudflareDetected": true}})),
        "/bypass" => status(500, "{\"success\":false,\"error\":\"browser crashed\"}"),
        _ => status(404, "{}"),
    })
}

async fn host_capture(url: String, _options: CaptureOptions) -> Result<Value, String> {
    Ok(json!({"screenshot": null, "url": url}))
}

#[tokio::test]
async fn unreachable_service_never_needs_bypass() {
    let transport = ScriptedTransport::unreachable();
    let middleware = middleware(transport.clone());

    assert_eq!(middleware.service_availability(), ServiceAvailability::Unknown);
    assert!(!middleware.needs_bypass(URL).await);
    assert_eq!(middleware.service_availability(), ServiceAvailability::Unavailable);
    assert_eq!(transport.calls_to("/health"), 1);
    assert_eq!(transport.calls_to("/detect"), 0);
}

#[tokio::test]
async fn needs_bypass_follows_detection_verdict() {
    let protected = middleware(service(true, bypass_payload()));
    assert!(protected.needs_bypass(URL).await);
    assert_eq!(protected.service_availability(), ServiceAvailability::Available);

    let clear = middleware(service(false, bypass_payload()));
    assert!(!clear.needs_bypass(URL).await);
}

#[tokio::test]
async fn unhealthy_status_skips_detection() {
    let transport = ScriptedTransport::new(|request| match request.path() {
        "/health" => ok(json!({"status": "degraded"})),
        _ => ok(json!({"success": true, "data": {"cloudflareDetected": true}})),
    });
    let middleware = middleware(transport.clone());

    assert!(!middleware.needs_bypass(URL).await);
    assert_eq!(transport.calls_to("/detect"), 0);
    assert_eq!(middleware.service_availability(), ServiceAvailability::Unavailable);
}

#[tokio::test]
async fn non_ok_health_leaves_cached_availability_untouched() {
    let transport = ScriptedTransport::new(|_| status(503, "starting"));
    let middleware = middleware(transport);

    assert!(!middleware.is_service_available().await);
    assert_eq!(middleware.service_availability(), ServiceAvailability::Unknown);
}

#[tokio::test]
async fn disabled_auto_detect_makes_no_calls() {
    let transport = service(true, bypass_payload());
    let middleware = BypassMiddleware::builder()
        .with_transport(transport.clone())
        .disable_auto_detect()
        .build()
        .unwrap();

    assert!(!middleware.needs_bypass(URL).await);
    assert_eq!(transport.total_calls(), 0);
}

#[tokio::test]
async fn detection_failures_degrade_to_undetected() {
    let cases: Vec<Arc<ScriptedTransport>> = vec![
        ScriptedTransport::new(|_| Err(refused())),
        ScriptedTransport::new(|_| status(500, "internal error")),
        ScriptedTransport::new(|_| ok(json!({"success": false, "error": "Navigation timeout"}))),
        ScriptedTransport::new(|_| status(200, "not json")),
    ];

    for transport in cases {
        let outcome = middleware(transport).detect_cloudflare(URL).await;
        assert!(matches!(outcome, DetectionOutcome::Failed(_)));
        assert!(!outcome.cloudflare_detected());
        assert!(outcome.error().is_some());
    }
}

#[tokio::test]
async fn probes_use_their_own_timeouts() {
    let transport = service(true, bypass_payload());
    let middleware = BypassMiddleware::builder()
        .with_transport(transport.clone())
        .with_timeout(Duration::from_secs(90))
        .build()
        .unwrap();

    middleware.needs_bypass(URL).await;

    let requests = transport.requests();
    assert_eq!(requests[0].path(), "/health");
    assert_eq!(requests[0].timeout, Duration::from_secs(5));
    assert_eq!(requests[1].path(), "/detect");
    assert_eq!(requests[1].timeout, Duration::from_secs(90));
}

#[tokio::test]
async fn capture_translates_bypass_result() {
    let transport = service(true, bypass_payload());
    let middleware = middleware(transport.clone());

    assert!(middleware.needs_bypass(URL).await);
    let result = middleware
        .capture(URL, &CaptureOptions::default())
        .await
        .unwrap();

    assert!(result.cloudflare_bypass.detected);
    assert!(result.cloudflare_bypass.successful);
    assert_eq!(result.screenshot.as_deref(), Some("QQ=="));
    assert_eq!(result.final_url, "https://x");
    assert_eq!(result.screenshot_format, "png");
    assert!(result.network_logs.is_empty());
    assert!(result.cookies.is_none());
}

#[tokio::test]
async fn capture_maps_host_options_to_service_options() {
    let transport = service(true, bypass_payload());
    let middleware = middleware(transport.clone());
    let options = CaptureOptions {
        full_page: true,
        width: 1366,
        height: 900,
        delay: 4,
        user_agent: Some("Mozilla/5.0".into()),
        ..CaptureOptions::default()
    };

    middleware.capture(URL, &options).await.unwrap();

    let body = transport.last_body("/bypass").unwrap();
    assert_eq!(body["url"], URL);
    assert_eq!(
        body["options"],
        json!({
            "fullPage": true,
            "width": 1366,
            "height": 900,
            "waitAfterBypass": 4000,
            "screenshot": true,
            "userAgent": "Mozilla/5.0"
        })
    );

    let options = CaptureOptions {
        timeout: Some(45_000),
        proxy: Some("http://127.0.0.1:8080".into()),
        ..CaptureOptions::default()
    };
    middleware.capture(URL, &options).await.unwrap();

    let body = transport.last_body("/bypass").unwrap();
    assert_eq!(body["options"]["timeout"], 45_000);
    assert_eq!(body["options"]["proxy"], "http://127.0.0.1:8080");
    assert_eq!(body["options"]["waitAfterBypass"], 3000);
    assert!(body["options"].get("userAgent").is_none());
}

#[tokio::test]
async fn capture_rejects_empty_viewport_before_calling_service() {
    let transport = service(true, bypass_payload());
    let middleware = middleware(transport.clone());
    let options = CaptureOptions {
        width: 0,
        height: 0,
        ..CaptureOptions::default()
    };

    let err = middleware.capture(URL, &options).await.unwrap_err();

    assert!(matches!(err, BypassServiceError::InvalidOptions(_)));
    assert_eq!(transport.calls_to("/bypass"), 0);
}

#[tokio::test]
async fn empty_viewport_falls_back_to_host_capture() {
    let transport = service(true, bypass_payload());
    let middleware = middleware(transport.clone());
    let options = CaptureOptions {
        width: 0,
        ..CaptureOptions::default()
    };

    let outcome = middleware
        .capture_with_fallback(URL, host_capture, &options)
        .await
        .unwrap();

    assert!(!outcome.is_bypassed());
    assert_eq!(transport.calls_to("/bypass"), 0);
}

#[tokio::test]
async fn capture_accepts_null_fields_in_bypass_result() {
    let transport = service(
        true,
        json!({
            "success": true,
            "data": {
                "screenshot": "QQ==",
                "cookies": null,
                "title": null,
                "timing": null,
                "finalUrl": null,
                "bypassSuccessful": true
            }
        }),
    );

    let result = middleware(transport)
        .capture(URL, &CaptureOptions::default())
        .await
        .unwrap();

    assert_eq!(result.screenshot.as_deref(), Some("QQ=="));
    assert!(result.cookies.is_none());
    assert!(result.cloudflare_bypass.timing.is_empty());
    assert_eq!(result.final_url, URL);
    assert!(result.cloudflare_bypass.successful);
}

#[tokio::test]
async fn capture_rejects_success_false_with_raw_body() {
    let transport = service(true, json!({"success": false, "error": "Challenge not solved"}));
    let err = middleware(transport)
        .capture(URL, &CaptureOptions::default())
        .await
        .unwrap_err();

    match err {
        BypassServiceError::Rejected { body } => assert!(body.contains("Challenge not solved")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn capture_reports_http_failures_with_body() {
    let err = middleware(failing_bypass_service())
        .capture(URL, &CaptureOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, BypassServiceError::Status { status: 500, .. }));
    assert!(err.to_string().contains("browser crashed"));
}

#[tokio::test]
async fn protected_url_goes_through_bypass_only() {
    let transport = service(true, bypass_payload());
    let middleware = middleware(transport.clone());
    let host_calls = AtomicUsize::new(0);

    let outcome = middleware
        .capture_with_fallback(
            URL,
            |url, options| {
                host_calls.fetch_add(1, Ordering::SeqCst);
                host_capture(url, options)
            },
            &CaptureOptions::default(),
        )
        .await
        .unwrap();

    assert!(outcome.is_bypassed());
    assert_eq!(outcome.bypassed().unwrap().screenshot.as_deref(), Some("QQ=="));
    assert_eq!(host_calls.load(Ordering::SeqCst), 0);
    assert_eq!(transport.calls_to("/bypass"), 1);
}

#[tokio::test]
async fn unprotected_url_uses_host_capture_only() {
    let transport = service(false, bypass_payload());
    let middleware = middleware(transport.clone());
    let host_calls = AtomicUsize::new(0);

    let outcome = middleware
        .capture_with_fallback(
            URL,
            |url, options| {
                host_calls.fetch_add(1, Ordering::SeqCst);
                host_capture(url, options)
            },
            &CaptureOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(
        outcome,
        CaptureOutcome::Normal(json!({"screenshot": null, "url": URL}))
    );
    assert_eq!(host_calls.load(Ordering::SeqCst), 1);
    assert_eq!(transport.calls_to("/bypass"), 0);
}

#[tokio::test]
async fn failed_bypass_falls_back_to_host_capture() {
    let middleware = middleware(failing_bypass_service());
    let host_calls = AtomicUsize::new(0);

    let outcome = middleware
        .capture_with_fallback(
            URL,
            |url, options| {
                host_calls.fetch_add(1, Ordering::SeqCst);
                host_capture(url, options)
            },
            &CaptureOptions::default(),
        )
        .await
        .unwrap();

    assert!(!outcome.is_bypassed());
    assert_eq!(outcome.into_normal().unwrap()["url"], URL);
    assert_eq!(host_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_bypass_propagates_when_fallback_disabled() {
    let middleware = BypassMiddleware::builder()
        .with_transport(failing_bypass_service())
        .disable_fallback()
        .build()
        .unwrap();
    let host_calls = AtomicUsize::new(0);

    let err = middleware
        .capture_with_fallback(
            URL,
            |url, options| {
                host_calls.fetch_add(1, Ordering::SeqCst);
                host_capture(url, options)
            },
            &CaptureOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FallbackError::Bypass(BypassServiceError::Status { status: 500, .. })
    ));
    assert_eq!(host_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn host_errors_pass_through_unchanged() {
    let middleware = middleware(ScriptedTransport::unreachable());

    let err = middleware
        .capture_with_fallback(
            URL,
            |_url, _options| async { Err::<Value, _>("renderer exited".to_string()) },
            &CaptureOptions::default(),
        )
        .await
        .unwrap_err();

    match err {
        FallbackError::Host(message) => assert_eq!(message, "renderer exited"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn plugin_delegates_to_middleware() {
    let transport = service(true, bypass_payload());
    let plugin = BypassPlugin::from_middleware(middleware(transport.clone()));

    let outcome = plugin
        .process_capture(URL, host_capture, &CaptureOptions::default())
        .await
        .unwrap();

    assert!(outcome.is_bypassed());
    assert_eq!(transport.calls_to("/health"), 1);
    assert_eq!(transport.calls_to("/detect"), 1);
    assert_eq!(plugin.middleware().service_availability(), ServiceAvailability::Available);
}

#[tokio::test]
async fn metrics_track_routing_decisions() {
    let middleware = middleware(failing_bypass_service());

    middleware
        .capture_with_fallback(URL, host_capture, &CaptureOptions::default())
        .await
        .unwrap();

    let stats = middleware.metrics().unwrap();
    assert_eq!(stats.availability_checks, 1);
    assert_eq!(stats.detections_protected, 1);
    assert_eq!(stats.bypass_failures, 1);
    assert_eq!(stats.fallbacks, 1);
    assert_eq!(stats.normal_captures, 1);
}

#[tokio::test]
async fn shared_middleware_serves_concurrent_captures() {
    let middleware = Arc::new(middleware(service(true, bypass_payload())));

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let middleware = middleware.clone();
            tokio::spawn(async move {
                let url = format!("https://site-{i}.example");
                middleware
                    .capture_with_fallback(&url, host_capture, &CaptureOptions::default())
                    .await
                    .map(|outcome| outcome.is_bypassed())
            })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap().unwrap());
    }
    assert_eq!(middleware.metrics().unwrap().bypass_successes, 4);
}
