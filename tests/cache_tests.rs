// Cache store, export and import tests - public APIs only
// Author: kelexine (https://github.com/kelexine)

mod common;

use common::chat;
use eval_adapter::adapter::{AdapterRequest, AdapterResponse, Interceptor, RequestOutcome};
use eval_adapter::cache::{
    fingerprint, CacheExport, CacheInterceptor, CacheStore, CachingConfig, Namespace, CACHE_HEADER,
};
use std::path::Path;

fn on_disk(dir: &Path) -> CachingConfig {
    CachingConfig {
        cache_dir: Some(dir.to_path_buf()),
        save_requests: true,
        ..Default::default()
    }
}

/// Record one request/response pair through the interceptor.
async fn record(cache: &CacheInterceptor, question: &str, answer: &str) {
    let RequestOutcome::Continue(request) = cache
        .intercept_request(AdapterRequest::new(chat(question)))
        .await
        .unwrap()
    else {
        panic!("fresh request must not short-circuit");
    };
    let mut response = AdapterResponse::new(200, answer.to_string(), request.ctx.clone());
    response
        .headers
        .insert("x-model-version", "7".parse().unwrap());
    cache.intercept_response(response).await.unwrap();
}

#[tokio::test]
async fn test_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let cache = CacheInterceptor::new(on_disk(dir.path())).unwrap();
        record(&cache, "q1", r#"{"a":1}"#).await;
    }

    let reopened = CacheStore::open(dir.path()).unwrap();
    let key = fingerprint(&chat("q1"));
    assert_eq!(
        reopened.get(Namespace::Responses, &key).unwrap().unwrap(),
        br#"{"a":1}"#
    );
    assert!(reopened.contains(Namespace::Requests, &key).unwrap());
}

#[tokio::test]
async fn test_export_import_round_trip_between_directories() {
    let source_dir = tempfile::tempdir().unwrap();
    let target_dir = tempfile::tempdir().unwrap();
    let export_file = source_dir.path().join("exports").join("cache.bin");

    let source = CacheInterceptor::new(CachingConfig {
        export_path: Some(export_file.clone()),
        ..on_disk(source_dir.path())
    })
    .unwrap();
    record(&source, "q1", "one").await;
    record(&source, "q2", "two").await;
    source.on_shutdown().await.unwrap();
    assert!(export_file.exists());

    let target = CacheInterceptor::new(CachingConfig {
        import_path: Some(export_file),
        ..on_disk(target_dir.path())
    })
    .unwrap();

    let exported = source.export().unwrap();
    let imported = target.export().unwrap();
    assert_eq!(exported, imported);
    assert_eq!(imported.responses.len(), 2);
    assert_eq!(target.stats().saved_responses, 2);

    // Imported entries are served with their headers
    let outcome = target
        .intercept_request(AdapterRequest::new(chat("q2")))
        .await
        .unwrap();
    let RequestOutcome::ShortCircuit(hit) = outcome else {
        panic!("imported entry should be a hit");
    };
    assert_eq!(&hit.body[..], b"two");
    assert_eq!(hit.headers.get("x-model-version").unwrap(), "7");
    assert_eq!(hit.headers.get(CACHE_HEADER).unwrap(), "hit");
}

#[test]
fn test_missing_import_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let err = CacheInterceptor::new(CachingConfig {
        import_path: Some(dir.path().join("nope.bin")),
        ..on_disk(dir.path())
    })
    .err()
    .unwrap();
    assert!(err.is_config());
}

#[test]
fn test_corrupt_import_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("bad.bin");
    std::fs::write(&file, b"\x01\x02 definitely not bincode").unwrap();

    let err = CacheInterceptor::new(CachingConfig {
        import_path: Some(file),
        ..on_disk(dir.path())
    })
    .err()
    .unwrap();
    assert!(err.is_config());
}

#[test]
fn test_import_respects_and_counts_toward_limits() {
    let mut export = CacheExport::new();
    for i in 0..3 {
        export.responses.insert(format!("k{}", i), b"{}".to_vec());
    }

    let cache = CacheInterceptor::with_store(
        CachingConfig {
            max_saved_responses: Some(3),
            ..Default::default()
        },
        CacheStore::in_memory().unwrap(),
    );
    let summary = cache.import(&export);
    assert_eq!(summary.responses, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(cache.stats().saved_responses, 3);
}

#[test]
fn test_key_iteration_is_restartable() {
    let store = CacheStore::in_memory().unwrap();
    for i in 0..600 {
        store
            .put(Namespace::Responses, &format!("{:04}", i), b"v")
            .unwrap();
    }

    let first: Vec<String> = store
        .iter_keys(Namespace::Responses)
        .take(3)
        .map(Result::unwrap)
        .collect();
    let all: Vec<String> = store
        .iter_keys(Namespace::Responses)
        .map(Result::unwrap)
        .collect();

    assert_eq!(first, vec!["0000", "0001", "0002"]);
    assert_eq!(all.len(), 600);
    assert!(all.windows(2).all(|w| w[0] < w[1]));
    assert!(store.iter_keys(Namespace::Requests).next().is_none());
}
