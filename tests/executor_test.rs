mod common;

use common::{bridge, OK_BODY};
use huectl::executor::{CommandExecutor, ExecutionStatus, ExecutorConfig};
use huectl::interpreter::Interpreter;
use huectl::rate_limit::{RateGovernor, RateLimitConfig};
use huectl::resolver::Resolver;
use huectl::state::StateCache;
use huectl::transport::BridgeClient;
use mockito::{Matcher, ServerGuard};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

async fn executor(server: &ServerGuard, limits: RateLimitConfig) -> CommandExecutor {
    let governor = Arc::new(RateGovernor::new(limits));
    let client = Arc::new(BridgeClient::with_base_url(server.url(), "test-key", governor).unwrap());
    let cache = Arc::new(StateCache::new());
    cache.sync(&client).await.unwrap();
    CommandExecutor::new(cache, Resolver::default(), client, ExecutorConfig::default())
}

fn fast() -> RateLimitConfig {
    RateLimitConfig {
        device_per_second: 1000.0,
        device_burst: 100,
        group_per_second: 1000.0,
        group_burst: 100,
    }
}

#[tokio::test]
async fn test_group_commands_are_paced_by_group_quota() {
    let (mut server, _listings) = bridge().await;
    let grouped = server
        .mock("PUT", "/clip/v2/resource/grouped_light/gl-kitchen")
        .with_status(200)
        .with_body(OK_BODY)
        .expect(2)
        .create_async()
        .await;

    let executor = executor(
        &server,
        RateLimitConfig {
            group_per_second: 4.0,
            group_burst: 1,
            ..fast()
        },
    )
    .await;
    let interpreter = Interpreter::default();

    let started = Instant::now();
    for line in ["turn on kitchen", "turn off kitchen"] {
        let report = executor
            .execute(&interpreter.parse(line).unwrap())
            .await
            .unwrap();
        assert_eq!(report.status, ExecutionStatus::Success);
    }

    // The second request waits for a refill (250 ms at 4/s)
    assert!(started.elapsed() >= Duration::from_millis(200));
    grouped.assert_async().await;
}

#[tokio::test]
async fn test_all_lights_goes_out_per_light() {
    let (mut server, _listings) = bridge().await;
    let mut mocks = Vec::new();
    for id in ["k1", "k2", "s1"] {
        mocks.push(
            server
                .mock("PUT", format!("/clip/v2/resource/light/{}", id).as_str())
                .match_body(Matcher::Json(json!({
                    "on": {"on": true},
                    "color_temperature": {"mirek": 250},
                    "dynamics": {"duration": 0}
                })))
                .with_status(200)
                .with_body(OK_BODY)
                .expect(1)
                .create_async()
                .await,
        );
    }
    let grouped = server
        .mock("PUT", "/clip/v2/resource/grouped_light/gl-kitchen")
        .expect(0)
        .create_async()
        .await;

    let executor = executor(&server, fast()).await;
    let intent = Interpreter::default()
        .parse("set all lights to 4000k instantly")
        .unwrap();
    let report = executor.execute(&intent).await.unwrap();

    for mock in &mocks {
        mock.assert_async().await;
    }
    grouped.assert_async().await;
    assert_eq!(report.status, ExecutionStatus::Success);
    assert_eq!(report.target_name, "all lights");
    assert_eq!(report.outcomes.len(), 3);
}

#[tokio::test]
async fn test_every_light_failing_is_failure() {
    let (mut server, _listings) = bridge().await;
    server
        .mock("PUT", Matcher::Regex(r"^/clip/v2/resource/light/".to_string()))
        .with_status(503)
        .with_body(r#"{"errors": [{"description": "bridge busy"}]}"#)
        .create_async()
        .await;

    let executor = executor(&server, fast()).await;
    let report = executor
        .execute(&Interpreter::default().parse("candle effect in kitchen").unwrap())
        .await
        .unwrap();

    assert_eq!(report.status, ExecutionStatus::Failure);
    assert_eq!(report.failed(), vec!["Kitchen Ceiling", "Kitchen Counter"]);
    assert!(report.affected.is_empty());
    assert!(!report.has_auth_failure());
    assert!(report.outcomes.iter().all(|o| o
        .error
        .as_ref()
        .is_some_and(|e| e.to_string().contains("bridge busy"))));
}
