//! Minimal blocking HTTP/1.1 client for the remote table and flag stores.
//!
//! Only `http://` endpoints are supported; every request sets
//! `Connection: close` and reads the socket to EOF. The transport's own
//! connect/read/write timeouts are the only timeout layer in the service.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("dns error: {0}")]
    Dns(String),
    #[error("connect error: {0}")]
    Connect(std::io::Error),
    #[error("io error: {0}")]
    Io(std::io::Error),
    #[error("malformed http response: {0}")]
    Malformed(&'static str),
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    timeout: Duration,
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

impl Default for HttpClient {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn request(
        &self,
        method: &str,
        url: &str,
        headers: &[(&str, &str)],
        body: Option<&str>,
    ) -> Result<HttpResponse, HttpError> {
        let parsed = parse_http_url(url)?;
        let addr = (parsed.host, parsed.port)
            .to_socket_addrs()
            .map_err(|err| HttpError::Dns(err.to_string()))?
            .next()
            .ok_or_else(|| HttpError::Dns("no addresses resolved".to_string()))?;

        let mut stream =
            TcpStream::connect_timeout(&addr, self.timeout).map_err(HttpError::Connect)?;
        stream
            .set_read_timeout(Some(self.timeout))
            .map_err(HttpError::Io)?;
        stream
            .set_write_timeout(Some(self.timeout))
            .map_err(HttpError::Io)?;

        let mut request = format!(
            "{} {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n",
            method, parsed.path, parsed.host
        );
        for (name, value) in headers {
            request.push_str(&format!("{name}: {value}\r\n"));
        }
        let payload = body.unwrap_or("");
        if body.is_some() {
            request.push_str(&format!(
                "Content-Type: application/json\r\nContent-Length: {}\r\n",
                payload.len()
            ));
        }
        request.push_str("\r\n");
        request.push_str(payload);

        stream.write_all(request.as_bytes()).map_err(HttpError::Io)?;

        let mut response = String::new();
        stream
            .read_to_string(&mut response)
            .map_err(HttpError::Io)?;

        split_response(&response)
    }
}

/// Pieces of an `http://` URL, borrowed from the input.
struct ParsedUrl<'a> {
    host: &'a str,
    port: u16,
    path: &'a str,
}

fn parse_http_url(url: &str) -> Result<ParsedUrl<'_>, HttpError> {
    let rest = url
        .strip_prefix("http://")
        .ok_or_else(|| HttpError::InvalidUrl(format!("only http:// is supported: {url}")))?;

    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, "/"),
    };

    let (host, port) = match authority.split_once(':') {
        Some((host, port)) => (
            host,
            port.parse::<u16>()
                .map_err(|_| HttpError::InvalidUrl(format!("bad port in {url}")))?,
        ),
        None => (authority, 80),
    };
    if host.is_empty() {
        return Err(HttpError::InvalidUrl(format!("missing host in {url}")));
    }

    Ok(ParsedUrl { host, port, path })
}

fn split_response(response: &str) -> Result<HttpResponse, HttpError> {
    let (headers, body) = response
        .split_once("\r\n\r\n")
        .ok_or(HttpError::Malformed("missing header separator"))?;

    let status_line = headers
        .lines()
        .next()
        .ok_or(HttpError::Malformed("missing status line"))?;
    let status = status_line
        .split_whitespace()
        .nth(1)
        .ok_or(HttpError::Malformed("missing status code"))?
        .parse::<u16>()
        .map_err(|_| HttpError::Malformed("invalid status code"))?;

    Ok(HttpResponse {
        status,
        body: body.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_url_with_port_and_path() -> Result<(), HttpError> {
        let parsed = parse_http_url("http://db.internal:8000/rest/v1/measurements")?;

        assert_eq!(parsed.host, "db.internal");
        assert_eq!(parsed.port, 8000);
        assert_eq!(parsed.path, "/rest/v1/measurements");
        Ok(())
    }

    #[test]
    fn parse_url_defaults_port_and_path() -> Result<(), HttpError> {
        let parsed = parse_http_url("http://db.internal")?;

        assert_eq!(parsed.port, 80);
        assert_eq!(parsed.path, "/");
        Ok(())
    }

    #[test]
    fn parse_url_rejects_https() {
        let result = parse_http_url("https://db.internal/");

        assert!(matches!(result, Err(HttpError::InvalidUrl(_))));
    }

    #[test]
    fn parse_url_rejects_missing_host() {
        let result = parse_http_url("http:///path");

        assert!(matches!(result, Err(HttpError::InvalidUrl(_))));
    }

    #[test]
    fn parse_url_keeps_query_string_in_path() -> Result<(), HttpError> {
        let parsed = parse_http_url("http://kv.internal/get/rate_limit:device-a?EX=60")?;

        assert_eq!(parsed.host, "kv.internal");
        assert_eq!(parsed.path, "/get/rate_limit:device-a?EX=60");
        Ok(())
    }

    #[test]
    fn parse_url_rejects_unparseable_port() {
        assert!(matches!(
            parse_http_url("http://db.internal:port/x"),
            Err(HttpError::InvalidUrl(_))
        ));
        assert!(matches!(
            parse_http_url("http://db.internal:/x"),
            Err(HttpError::InvalidUrl(_))
        ));
    }

    #[test]
    fn split_response_extracts_status_and_body() -> Result<(), HttpError> {
        let raw = "HTTP/1.1 201 Created\r\nContent-Type: application/json\r\n\r\n[{\"id\":1}]";

        let response = split_response(raw)?;

        assert_eq!(response.status, 201);
        assert_eq!(response.body, "[{\"id\":1}]");
        Ok(())
    }

    #[test]
    fn split_response_rejects_garbage() {
        assert!(matches!(
            split_response("not an http response"),
            Err(HttpError::Malformed(_))
        ));
    }
}
