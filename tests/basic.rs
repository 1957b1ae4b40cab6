use http2::Client;

#[tokio::test]
async fn google_redirect() {
    let client = Client::connect("google.com").await.unwrap();
    let response = client.get("/").await.unwrap();
    assert_eq!(response.status(), Some(301));
    assert_eq!(response.header("location"), Some("https://www.google.com/"));
}

#[tokio::test]
async fn example_com() {
    let client = Client::connect("example.com").await.unwrap();
    let response = client.get("/").await.unwrap();
    assert_eq!(response.status(), Some(200));
    assert!(response.text().contains("This domain is for use in illustrative examples in documents."));
}
