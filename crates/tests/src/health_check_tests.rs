use crate::fixtures::test_app::TestApp;
use serde_json::Value;

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let app = TestApp::spawn().await;

    let resp = app.http.get(app.http_url("/health")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}
