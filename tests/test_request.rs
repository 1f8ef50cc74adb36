use wicket::http::request::{Method, RequestBuilder, Version};

#[test]
fn test_request_header_retrieval() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .url("/")
        .header("Host", "example.com")
        .header("Content-Type", "application/json")
        .build()
        .unwrap();

    assert_eq!(req.header("Host"), Some("example.com"));
    assert_eq!(req.header("content-type"), Some("application/json"));
    assert_eq!(req.header("CONTENT-TYPE"), Some("application/json"));
    assert_eq!(req.header("Missing"), None);
}

#[test]
fn test_request_header_last_write_wins() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .url("/")
        .header("Accept", "text/html")
        .header("accept", "application/json")
        .build()
        .unwrap();

    assert_eq!(req.headers.len(), 1);
    assert_eq!(req.header("Accept"), Some("application/json"));
}

#[test]
fn test_request_content_length_parsing() {
    let req = RequestBuilder::new()
        .method(Method::POST)
        .url("/api")
        .header("Content-Length", "42")
        .build()
        .unwrap();

    assert_eq!(req.content_length(), 42);
}

#[test]
fn test_request_content_length_invalid() {
    let req = RequestBuilder::new()
        .method(Method::POST)
        .url("/api")
        .header("Content-Length", "not-a-number")
        .build()
        .unwrap();

    assert_eq!(req.content_length(), 0);
}

#[test]
fn test_request_keep_alive_http11_default() {
    let req = RequestBuilder::new().method(Method::GET).url("/").build().unwrap();
    assert!(req.keep_alive);
}

#[test]
fn test_request_keep_alive_http10_default() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .url("/")
        .version(Version::HTTP_10)
        .build()
        .unwrap();
    assert!(!req.keep_alive);
}

#[test]
fn test_request_connection_close_wins_over_version() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .url("/")
        .header("Connection", "close")
        .build()
        .unwrap();
    assert!(!req.keep_alive);
}

#[test]
fn test_request_path_and_query() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .url("/files/report.txt?download=1")
        .build()
        .unwrap();

    assert_eq!(req.path(), "/files/report.txt");
    assert_eq!(req.query().as_deref(), Some("download=1"));
}

#[test]
fn test_request_path_is_percent_decoded() {
    let path = |url: &str| {
        RequestBuilder::new()
            .method(Method::GET)
            .url(url)
            .build()
            .unwrap()
            .path()
    };

    assert_eq!(path("/caf%C3%A9/a%20b?q=a%20b"), "/café/a b");
    assert_eq!(path("/files/a+b.txt"), "/files/a+b.txt");
    assert_eq!(path("/bad%zz/end%2"), "/bad%zz/end%2");
    assert_eq!(path("/ok%2fslash"), "/ok/slash");
}

#[test]
fn test_request_builder_requires_method_and_url() {
    assert!(RequestBuilder::new().url("/").build().is_err());
    assert!(RequestBuilder::new().method(Method::GET).build().is_err());
}

#[test]
fn test_method_tokens() {
    assert_eq!(Method::from_token(b"DELETE"), Method::DELETE);
    assert_eq!(Method::from_token(b"PATCH"), Method::OTHER);
    assert_eq!(Method::PUT.to_string(), "PUT");
}

#[test]
fn test_version_ordering_and_display() {
    assert!(Version::HTTP_10 < Version::HTTP_11);
    assert!(Version::new(2, 0) > Version::HTTP_11);
    assert_eq!(Version::HTTP_09.to_string(), "HTTP/0.9");
}
