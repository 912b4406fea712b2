//! Ordinary HTTP requests forwarded to the backend.

mod common;

use common::{start_http_backend, start_proxy, unused_addr};

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

fn field<'a>(body: &'a str, name: &str) -> &'a str {
    body.lines()
        .find_map(|line| line.strip_prefix(name)?.strip_prefix('='))
        .unwrap_or_else(|| panic!("backend did not report {name}: {body}"))
}

#[tokio::test]
async fn methods_and_bodies_pass_through() {
    let backend = start_http_backend().await;
    let proxy = start_proxy(&format!("http://{backend}")).await;
    let client = client();

    let cases = [
        (reqwest::Method::GET, ""),
        (reqwest::Method::POST, "created=1"),
        (reqwest::Method::PUT, "replaced=2"),
        (reqwest::Method::DELETE, ""),
    ];

    for (method, payload) in cases {
        let response = client
            .request(method.clone(), proxy.url("/items/7?verbose=true"))
            .body(payload)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200, "{method}");
        assert_eq!(response.headers()["x-backend"], "mock");
        let body = response.text().await.unwrap();
        assert_eq!(field(&body, "method"), method.as_str());
        assert_eq!(field(&body, "uri"), "/items/7?verbose=true");
        assert_eq!(field(&body, "body"), payload);
    }
}

#[tokio::test]
async fn host_is_rewritten_and_client_ip_recorded() {
    let backend = start_http_backend().await;
    let proxy = start_proxy(&format!("http://{backend}")).await;

    let body = client()
        .get(proxy.url("/whoami"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert_eq!(field(&body, "host"), backend.to_string());
    assert_eq!(field(&body, "x-forwarded-for"), "127.0.0.1");
}

#[tokio::test]
async fn backend_base_path_prefixes_requests() {
    let backend = start_http_backend().await;
    let proxy = start_proxy(&format!("http://{backend}/api/")).await;

    let body = client()
        .get(proxy.url("/users?page=2"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert_eq!(field(&body, "uri"), "/api/users?page=2");
}

#[tokio::test]
async fn backend_status_is_preserved() {
    let backend = start_http_backend().await;
    let proxy = start_proxy(&format!("http://{backend}")).await;

    let response = client().get(proxy.url("/missing")).send().await.unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(response.text().await.unwrap(), "not here");
}

#[tokio::test]
async fn unreachable_backend_is_bad_gateway() {
    let proxy = start_proxy(&format!("http://{}", unused_addr().await)).await;

    let response = client().get(proxy.url("/anything")).send().await.unwrap();
    assert_eq!(response.status(), 502);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.text().await.unwrap(), "Bad Gateway");
}
