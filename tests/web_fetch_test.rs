//! ProxyFetcher 集成测试：本地 TcpListener 扮演文本提取代理

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use agentnamix::tools::{FetchError, PageFetcher, ProxyFetcher};

const ARTICLE: &str = "Rust es un lenguaje de programación de sistemas centrado en la seguridad de memoria y la concurrencia.";

fn response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    )
}

/// 按目标 URL 返回固定响应；记录收到的请求头部分
async fn spawn_proxy() -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let seen_tx = seen_tx.clone();
            tokio::spawn(async move {
                let mut raw = Vec::new();
                let mut buf = [0u8; 1024];
                while !raw.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => raw.extend_from_slice(&buf[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&raw).to_string();
                let _ = seen_tx.send(head.clone());
                let target = head.split_whitespace().nth(1).unwrap_or("/").to_string();

                let reply = match target.as_str() {
                    "/https://ok.test/articulo" => response(
                        "200 OK",
                        "text/plain; charset=utf-8",
                        &format!("\u{FEFF}{}", ARTICLE),
                    ),
                    "/https://html.test/" => response(
                        "200 OK",
                        "text/html; charset=utf-8",
                        &format!(
                            "<!DOCTYPE html><html><body><h1>Portada</h1><p>{}</p></body></html>",
                            ARTICLE
                        ),
                    ),
                    "/https://deny.test/" => response("403 Forbidden", "text/plain", "no bots"),
                    "/https://missing.test/" => response("404 Not Found", "text/plain", "nada"),
                    "/https://broken.test/" => {
                        response("500 Internal Server Error", "text/plain", "fallo")
                    }
                    "/https://short.test/" => response("200 OK", "text/plain", "corto"),
                    "/https://slow.test/" => {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        return;
                    }
                    _ => response("404 Not Found", "text/plain", ""),
                };
                let _ = stream.write_all(reply.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    (format!("http://{}/", addr), seen_rx)
}

fn fetcher(proxy: &str) -> ProxyFetcher {
    ProxyFetcher::new(proxy, Duration::from_secs(15), 50)
}

#[tokio::test]
async fn test_plain_text_through_proxy_strips_bom() {
    let (proxy, mut seen) = spawn_proxy().await;
    let body = fetcher(&proxy)
        .fetch("https://ok.test/articulo")
        .await
        .unwrap();
    assert!(!body.starts_with('\u{FEFF}'));
    assert_eq!(body, ARTICLE);

    let head = seen.recv().await.unwrap().to_lowercase();
    assert!(head.starts_with("get /https://ok.test/articulo "));
    assert!(head.contains("x-target-selector: body"));
    assert!(head.contains("accept: text/plain"));
}

#[tokio::test]
async fn test_html_body_is_converted_to_text() {
    let (proxy, _seen) = spawn_proxy().await;
    let body = fetcher(&proxy).fetch("https://html.test/").await.unwrap();
    assert!(body.contains("Portada"));
    assert!(body.contains("seguridad de memoria"));
    assert!(!body.contains("<p>"));
    assert!(!body.contains("<h1>"));
}

#[tokio::test]
async fn test_status_codes_are_classified() {
    let (proxy, _seen) = spawn_proxy().await;
    let fetcher = fetcher(&proxy);
    assert_eq!(
        fetcher.fetch("https://deny.test/").await,
        Err(FetchError::AccessDenied(403))
    );
    assert_eq!(
        fetcher.fetch("https://missing.test/").await,
        Err(FetchError::NotFound)
    );
    assert_eq!(
        fetcher.fetch("https://broken.test/").await,
        Err(FetchError::Http {
            status: 500,
            reason: "Internal Server Error".into()
        })
    );
}

#[tokio::test]
async fn test_short_body_counts_as_empty() {
    let (proxy, _seen) = spawn_proxy().await;
    assert_eq!(
        fetcher(&proxy).fetch("https://short.test/").await,
        Err(FetchError::Empty)
    );
}

#[tokio::test]
async fn test_slow_site_times_out() {
    let (proxy, _seen) = spawn_proxy().await;
    let fetcher = ProxyFetcher::new(proxy, Duration::from_millis(200), 50);
    let start = std::time::Instant::now();
    assert_eq!(
        fetcher.fetch("https://slow.test/").await,
        Err(FetchError::Timeout)
    );
    assert!(start.elapsed() < Duration::from_secs(3));
}
