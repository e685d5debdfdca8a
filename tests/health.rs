use storefront_api::routes::health::health_check;

#[tokio::test]
async fn health_check_returns_ok() {
    let response = health_check().await;
    assert_eq!(response.0.data.status, "ok");
    assert!(response.0.meta.is_none());
}
