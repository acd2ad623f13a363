use std::collections::HashSet;

use axum::{Router, body::Body, http::Request, middleware, routing::get};
use metrics_util::debugging::DebuggingRecorder;
use tower::ServiceExt;
use yatube::cache::{
    CacheConfig, CacheState, METRIC_CLEAR, METRIC_EVICT, METRIC_HIT, METRIC_MISS,
    response_cache_layer,
};

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let cache = CacheState::new(CacheConfig {
        capacity: 1,
        ..Default::default()
    });
    let app = Router::new()
        .route("/", get(|| async { "listing" }))
        .layer(middleware::from_fn_with_state(
            cache.clone(),
            response_cache_layer,
        ));

    // miss, hit, then a second key evicts the first
    for uri in ["/", "/", "/?page=2"] {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        app.clone().oneshot(request).await.unwrap();
    }
    cache.clear();

    let keys: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(key, _, _, _)| key.key().name().to_string())
        .collect();

    for expected in [METRIC_HIT, METRIC_MISS, METRIC_EVICT, METRIC_CLEAR] {
        assert!(keys.contains(expected), "missing metric {expected}");
    }
}
