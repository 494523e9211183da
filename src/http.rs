//! Minimal HTTP/1.1 framing for HAP
//!
//! HAP speaks plain HTTP/1.1 over TCP: cleartext for the two pairing
//! endpoints, then the same framing tunneled through the secure session.
//! Only the subset the protocol needs is implemented: request encoding and
//! an incremental, sans-IO response parser.

use std::collections::HashMap;

use thiserror::Error;

/// Content type of TLV8 pairing bodies
pub const CONTENT_TYPE_TLV: &str = "application/pairing+tlv8";
/// Content type of characteristic JSON bodies
pub const CONTENT_TYPE_JSON: &str = "application/hap+json";

/// HTTP methods used by HAP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Read accessories or characteristics
    Get,
    /// Write characteristics
    Put,
    /// Pairing endpoints
    Post,
}

impl Method {
    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
        }
    }
}

/// Case-insensitive header collection
#[derive(Debug, Clone, Default)]
pub struct Headers {
    inner: HashMap<String, String>,
}

impl Headers {
    /// Create empty headers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, replacing any existing one with the same name
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let lowered = name.to_ascii_lowercase();
        self.inner.retain(|k, _| k.to_ascii_lowercase() != lowered);
        self.inner.insert(name, value.into());
    }

    /// Look up a header by name, case-insensitively
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        let lowered = name.to_ascii_lowercase();
        self.inner
            .iter()
            .find(|(k, _)| k.to_ascii_lowercase() == lowered)
            .map(|(_, v)| v.as_str())
    }

    /// The Content-Length value, if present and numeric
    #[must_use]
    pub fn content_length(&self) -> Option<usize> {
        self.get("Content-Length").and_then(|v| v.parse().ok())
    }

    /// Iterate over all headers
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.inner.iter()
    }
}

/// An HTTP request ready for encoding
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Method
    pub method: Method,
    /// Path plus query, e.g. `/characteristics?id=1.9`
    pub uri: String,
    /// Headers (Content-Length is added automatically)
    pub headers: Headers,
    /// Body, possibly empty
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Create a request with no body
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Attach a body and its content type
    #[must_use]
    pub fn with_body(mut self, content_type: &str, body: Vec<u8>) -> Self {
        self.headers.insert("Content-Type", content_type);
        self.body = body;
        self
    }

    /// Encode to wire bytes
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(128 + self.body.len());

        output.extend_from_slice(self.method.as_str().as_bytes());
        output.push(b' ');
        output.extend_from_slice(self.uri.as_bytes());
        output.extend_from_slice(b" HTTP/1.1\r\n");

        for (name, value) in self.headers.iter() {
            output.extend_from_slice(name.as_bytes());
            output.extend_from_slice(b": ");
            output.extend_from_slice(value.as_bytes());
            output.extend_from_slice(b"\r\n");
        }

        if !self.body.is_empty() {
            let len_header = format!("Content-Length: {}\r\n", self.body.len());
            output.extend_from_slice(len_header.as_bytes());
        }

        output.extend_from_slice(b"\r\n");
        output.extend_from_slice(&self.body);
        output
    }
}

/// A parsed HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Numeric status code
    pub status: u16,
    /// Reason phrase
    pub reason: String,
    /// Response headers
    pub headers: Headers,
    /// Body, possibly empty
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Whether the status is 2xx
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Errors during HTTP response parsing
#[derive(Debug, Error)]
pub enum HttpCodecError {
    /// Malformed status line
    #[error("invalid status line: {0}")]
    InvalidStatusLine(String),

    /// Malformed header line
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Response exceeded the configured size limit
    #[error("response too large: {size} bytes")]
    ResponseTooLarge {
        /// Accumulated size that broke the limit
        size: usize,
    },
}

/// Sans-IO incremental HTTP response parser
///
/// Feed bytes with [`feed`](Self::feed) as they arrive (cleartext reads or
/// decrypted session frames), poll [`decode`](Self::decode) for complete
/// responses.
pub struct HttpCodec {
    buffer: Vec<u8>,
    max_size: usize,
    state: ParseState,
}

#[derive(Debug, Clone)]
enum ParseState {
    StatusLine,
    Headers { status: u16, reason: String },
    Body {
        status: u16,
        reason: String,
        headers: Headers,
        content_length: usize,
    },
}

impl HttpCodec {
    /// Create a codec with a 1 MiB response limit
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            max_size: 1024 * 1024,
            state: ParseState::StatusLine,
        }
    }

    /// Feed received bytes into the codec
    ///
    /// # Errors
    ///
    /// Returns an error if the buffered response exceeds the size limit.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), HttpCodecError> {
        if self.buffer.len() + bytes.len() > self.max_size {
            return Err(HttpCodecError::ResponseTooLarge {
                size: self.buffer.len() + bytes.len(),
            });
        }
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Try to decode a complete response
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed status or header lines.
    pub fn decode(&mut self) -> Result<Option<HttpResponse>, HttpCodecError> {
        loop {
            match &self.state {
                ParseState::StatusLine => {
                    let Some(line_end) = self.find_line_end() else {
                        return Ok(None);
                    };
                    let line = String::from_utf8_lossy(&self.buffer[..line_end]).to_string();
                    let (status, reason) = Self::parse_status_line(&line)?;
                    self.buffer.drain(..line_end + 2);
                    self.state = ParseState::Headers { status, reason };
                }

                ParseState::Headers { status, reason } => {
                    let Some((headers, body_start)) = self.parse_headers()? else {
                        return Ok(None);
                    };
                    let content_length = headers.content_length().unwrap_or(0);
                    let status = *status;
                    let reason = reason.clone();
                    self.buffer.drain(..body_start);

                    if content_length == 0 {
                        self.state = ParseState::StatusLine;
                        return Ok(Some(HttpResponse {
                            status,
                            reason,
                            headers,
                            body: Vec::new(),
                        }));
                    }

                    self.state = ParseState::Body {
                        status,
                        reason,
                        headers,
                        content_length,
                    };
                }

                ParseState::Body {
                    status,
                    reason,
                    headers,
                    content_length,
                } => {
                    if self.buffer.len() < *content_length {
                        return Ok(None);
                    }
                    let body: Vec<u8> = self.buffer.drain(..*content_length).collect();
                    let response = HttpResponse {
                        status: *status,
                        reason: reason.clone(),
                        headers: headers.clone(),
                        body,
                    };
                    self.state = ParseState::StatusLine;
                    return Ok(Some(response));
                }
            }
        }
    }

    fn find_line_end(&self) -> Option<usize> {
        self.buffer.windows(2).position(|w| w == b"\r\n")
    }

    fn parse_status_line(line: &str) -> Result<(u16, String), HttpCodecError> {
        // "HTTP/1.1 200 OK"
        let mut parts = line.splitn(3, ' ');

        let version = parts
            .next()
            .ok_or_else(|| HttpCodecError::InvalidStatusLine(line.to_string()))?;
        if !version.starts_with("HTTP/") {
            return Err(HttpCodecError::InvalidStatusLine(line.to_string()));
        }

        let status = parts
            .next()
            .ok_or_else(|| HttpCodecError::InvalidStatusLine(line.to_string()))?
            .parse::<u16>()
            .map_err(|_| HttpCodecError::InvalidStatusLine(line.to_string()))?;

        let reason = parts.next().unwrap_or("").to_string();
        Ok((status, reason))
    }

    fn parse_headers(&self) -> Result<Option<(Headers, usize)>, HttpCodecError> {
        if self.buffer.starts_with(b"\r\n") {
            return Ok(Some((Headers::new(), 2)));
        }

        let Some(header_end) = self.buffer.windows(4).position(|w| w == b"\r\n\r\n") else {
            return Ok(None);
        };

        let header_str = String::from_utf8_lossy(&self.buffer[..header_end]);
        let mut headers = Headers::new();

        for line in header_str.split("\r\n") {
            if line.is_empty() {
                continue;
            }
            let colon_pos = line
                .find(':')
                .ok_or_else(|| HttpCodecError::InvalidHeader(line.to_string()))?;
            headers.insert(line[..colon_pos].trim(), line[colon_pos + 1..].trim());
        }

        Ok(Some((headers, header_end + 4)))
    }
}

impl Default for HttpCodec {
    fn default() -> Self {
        Self::new()
    }
}
