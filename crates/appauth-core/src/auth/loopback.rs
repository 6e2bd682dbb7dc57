use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;
use url::Url;

use super::AuthError;

const SUCCESS_HTML: &str = r#"<html><body><h1>Authorization received</h1><p>You may close this window and return to the terminal.</p></body></html>"#;
const ERROR_HTML: &str = r#"<html><body><h1>Authorization failed</h1><p>Please return to the terminal for details.</p></body></html>"#;
const NOT_FOUND_HTML: &str = r#"<html><body><h1>Not found</h1></body></html>"#;
const BAD_REQUEST_HTML: &str = r#"<html><body><h1>Bad request</h1></body></html>"#;

/// One-shot HTTP listener bound to the registered loopback redirect URI.
///
/// Bind before launching the browser so the redirect cannot race the listener.
pub struct CallbackListener {
    listener: TcpListener,
    redirect_uri: Url,
}

impl CallbackListener {
    pub async fn bind(redirect_uri: &Url) -> Result<Self, AuthError> {
        if redirect_uri.scheme() != "http" {
            return Err(AuthError::UnsupportedRedirect(redirect_uri.to_string()));
        }
        let host = redirect_uri
            .host_str()
            .ok_or_else(|| AuthError::UnsupportedRedirect(redirect_uri.to_string()))?;
        let port = redirect_uri.port_or_known_default().unwrap_or(80);
        let listener = TcpListener::bind((host, port)).await?;
        debug!(addr = %listener.local_addr()?, "callback listener bound");
        Ok(Self {
            listener,
            redirect_uri: redirect_uri.clone(),
        })
    }

    pub fn port(&self) -> Result<u16, AuthError> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Wait for the browser to hit the redirect path and return the full callback URL.
    ///
    /// Requests for other paths (favicon probes and the like) get a 404, and
    /// malformed requests a 400; neither ends the wait.
    pub async fn accept(self) -> Result<String, AuthError> {
        let port = self.port()?;
        let host = self.redirect_uri.host_str().unwrap_or("127.0.0.1");
        let origin = format!("http://{host}:{port}");

        loop {
            let (mut stream, _addr) = self.listener.accept().await?;
            let mut buffer = [0u8; 4096];
            let n = stream.read(&mut buffer).await?;
            if n == 0 {
                continue;
            }
            let request = String::from_utf8_lossy(&buffer[..n]);
            let url = match parse_request_target(&request)
                .and_then(|target| Ok(Url::parse(&format!("{origin}{target}"))?))
            {
                Ok(url) => url,
                Err(err) => {
                    debug!(%err, "ignoring malformed request");
                    let _ = respond(&mut stream, 400, BAD_REQUEST_HTML).await;
                    continue;
                }
            };

            if url.path() != self.redirect_uri.path() {
                let _ = respond(&mut stream, 404, NOT_FOUND_HTML).await;
                continue;
            }

            let failed = url.query_pairs().any(|(key, _)| key == "error");
            if failed {
                respond(&mut stream, 400, ERROR_HTML).await?;
            } else {
                respond(&mut stream, 200, SUCCESS_HTML).await?;
            }
            let _ = stream.shutdown().await;
            return Ok(url.to_string());
        }
    }
}

fn parse_request_target(request: &str) -> Result<&str, AuthError> {
    let first_line = request
        .lines()
        .next()
        .ok_or_else(|| AuthError::InvalidAuthorizationResponse("missing request line".into()))?;
    let mut parts = first_line.split_whitespace();
    let _method = parts
        .next()
        .ok_or_else(|| AuthError::InvalidAuthorizationResponse("missing method".into()))?;
    parts
        .next()
        .ok_or_else(|| AuthError::InvalidAuthorizationResponse("missing path".into()))
}

async fn respond(stream: &mut TcpStream, status: u16, body: &str) -> Result<(), AuthError> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let response = format!(
        "{status_line}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn send(port: u16, target: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let request = format!(
            "GET {target} HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\nConnection: close\r\n\r\n"
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        let _ = stream.read_to_string(&mut response).await;
        response
    }

    #[tokio::test]
    async fn returns_callback_url() {
        let redirect = Url::parse("http://127.0.0.1:0/callback").unwrap();
        let listener = CallbackListener::bind(&redirect).await.unwrap();
        let port = listener.port().unwrap();

        let client = tokio::spawn(async move {
            let favicon = send(port, "/favicon.ico").await;
            let callback = send(port, "/callback?code=test-code&state=abc").await;
            (favicon, callback)
        });

        let callback = listener.accept().await.unwrap();
        assert_eq!(
            callback,
            format!("http://127.0.0.1:{port}/callback?code=test-code&state=abc")
        );

        let (favicon, response) = client.await.unwrap();
        assert!(favicon.starts_with("HTTP/1.1 404"));
        assert!(response.starts_with("HTTP/1.1 200"));
    }

    async fn send_raw(port: u16, raw: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut response = String::new();
        let _ = stream.read_to_string(&mut response).await;
        response
    }

    #[tokio::test]
    async fn malformed_request_keeps_listening() {
        let redirect = Url::parse("http://127.0.0.1:0/callback").unwrap();
        let listener = CallbackListener::bind(&redirect).await.unwrap();
        let port = listener.port().unwrap();

        let client = tokio::spawn(async move {
            let garbage = send_raw(port, "hello\r\n\r\n").await;
            let callback = send(port, "/callback?code=c&state=s").await;
            (garbage, callback)
        });

        let callback = listener.accept().await.unwrap();
        assert_eq!(
            callback,
            format!("http://127.0.0.1:{port}/callback?code=c&state=s")
        );

        let (garbage, response) = client.await.unwrap();
        assert!(garbage.starts_with("HTTP/1.1 400"));
        assert!(response.starts_with("HTTP/1.1 200"));
    }

    #[tokio::test]
    async fn error_callback_gets_error_page() {
        let redirect = Url::parse("http://127.0.0.1:0/callback").unwrap();
        let listener = CallbackListener::bind(&redirect).await.unwrap();
        let port = listener.port().unwrap();

        let client =
            tokio::spawn(async move { send(port, "/callback?error=access_denied&state=abc").await });

        let callback = listener.accept().await.unwrap();
        assert!(callback.contains("error=access_denied"));
        assert!(client.await.unwrap().starts_with("HTTP/1.1 400"));
    }

    #[tokio::test]
    async fn rejects_non_loopback_schemes() {
        let redirect = Url::parse("io.curity.client:/callback").unwrap();
        let err = CallbackListener::bind(&redirect).await.err().unwrap();
        assert!(matches!(err, AuthError::UnsupportedRedirect(_)));
    }
}
