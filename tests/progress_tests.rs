// Progress reporting tests against a mock listener
// Author: kelexine (https://github.com/kelexine)

use eval_adapter::adapter::{AdapterResponse, Interceptor, RequestContext};
use eval_adapter::interceptors::{ProgressConfig, ProgressInterceptor};
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::json;

async fn expect_report(server: &mut ServerGuard, samples: u64, times: usize) -> Mock {
    server
        .mock("POST", "/progress")
        .match_body(Matcher::Json(json!({ "samples_processed": samples })))
        .with_status(200)
        .expect(times)
        .create_async()
        .await
}

async fn respond(progress: &ProgressInterceptor, n: usize) {
    for _ in 0..n {
        let response = AdapterResponse::new(200, "{}", RequestContext::default());
        progress.intercept_response(response).await.unwrap();
    }
}

fn tracker(server: &ServerGuard, config: ProgressConfig) -> ProgressInterceptor {
    ProgressInterceptor::new(
        ProgressConfig {
            progress_url: Some(format!("{}/progress", server.url())),
            ..config
        },
        reqwest::Client::new(),
    )
}

#[tokio::test]
async fn test_interval_reports_and_final_report() {
    let mut server = mockito::Server::new_async().await;
    let at_3 = expect_report(&mut server, 3, 1).await;
    let at_6 = expect_report(&mut server, 6, 1).await;
    let at_7 = expect_report(&mut server, 7, 1).await;

    let progress = tracker(
        &server,
        ProgressConfig {
            interval: 3,
            ..Default::default()
        },
    );
    progress.on_start().await.unwrap();
    respond(&progress, 7).await;

    at_3.assert_async().await;
    at_6.assert_async().await;
    assert!(!at_7.matched_async().await);

    progress.on_shutdown().await.unwrap();
    at_7.assert_async().await;
}

#[tokio::test]
async fn test_no_final_report_when_nothing_changed() {
    let mut server = mockito::Server::new_async().await;
    let at_2 = expect_report(&mut server, 2, 1).await;

    let progress = tracker(
        &server,
        ProgressConfig {
            interval: 2,
            ..Default::default()
        },
    );
    respond(&progress, 2).await;
    progress.on_shutdown().await.unwrap();

    at_2.assert_async().await;
}

#[tokio::test]
async fn test_skip_initial_requests_excludes_sanity_call() {
    let mut server = mockito::Server::new_async().await;
    let mut mocks = Vec::new();
    for n in 1..=10 {
        mocks.push(expect_report(&mut server, n, 1).await);
    }

    let progress = tracker(
        &server,
        ProgressConfig {
            interval: 1,
            skip_initial_requests: 1,
            ..Default::default()
        },
    );

    respond(&progress, 1).await;
    assert_eq!(progress.state().processed, 0);

    respond(&progress, 10).await;
    for mock in &mocks {
        mock.assert_async().await;
    }
    assert_eq!(progress.state().processed, 10);
}

#[tokio::test]
async fn test_listener_failure_never_fails_the_call() {
    let mut server = mockito::Server::new_async().await;
    let failing = server
        .mock("POST", "/progress")
        .with_status(500)
        .expect(2)
        .create_async()
        .await;

    let progress = tracker(&server, ProgressConfig::default());
    respond(&progress, 2).await;
    failing.assert_async().await;

    let unreachable = ProgressInterceptor::new(
        ProgressConfig {
            progress_url: Some("http://127.0.0.1:9/progress".to_string()),
            ..Default::default()
        },
        reqwest::Client::new(),
    );
    respond(&unreachable, 1).await;
    assert_eq!(unreachable.state().processed, 1);
}

#[tokio::test]
async fn test_timer_reports_between_intervals() {
    let mut server = mockito::Server::new_async().await;
    let at_1 = expect_report(&mut server, 1, 1).await;

    let progress = tracker(
        &server,
        ProgressConfig {
            interval: 100,
            interval_secs: Some(1),
            ..Default::default()
        },
    );
    progress.on_start().await.unwrap();
    respond(&progress, 1).await;

    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    at_1.assert_async().await;

    // Already reported: shutdown stays silent and the timer is gone
    progress.on_shutdown().await.unwrap();
    at_1.assert_async().await;
}
