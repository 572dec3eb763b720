use crate::helpers::{spawn_app, FakeCompletion, FakeVectorIndex};

#[tokio::test]
async fn health_check_works_without_calling_any_backend() {
    let app = spawn_app(
        FakeVectorIndex::unavailable(),
        FakeCompletion::unauthorized(),
    )
    .await;

    let response = reqwest::Client::new()
        .get(&format!("{}/health_check", &app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert_eq!(Some(0), response.content_length());
    assert!(app.vector_index.queries.lock().unwrap().is_empty());
}
