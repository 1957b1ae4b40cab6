use http2::Client;

#[tokio::test]
async fn ping_round_trip() {
    let client = Client::connect("example.com").await.unwrap();
    client.ping().await.unwrap();
}

#[tokio::test]
async fn set_header_is_sent_on_every_request() {
    let client = Client::connect("example.com").await.unwrap();
    client.set_header("x-test-client", "http2-engine").unwrap();
    let response = client.get("/").await.unwrap();
    assert_eq!(response.status(), Some(200));
}

#[tokio::test]
async fn stream_info_reports_completed_requests() {
    let client = Client::connect("example.com").await.unwrap();
    client.get("/").await.unwrap();
    let streams = client.stream_info(true).await.unwrap();
    assert!(streams.iter().any(|s| s.path.as_deref() == Some("/")));
}
