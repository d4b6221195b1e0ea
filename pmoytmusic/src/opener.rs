//! Ouverture de flux réseau par plage d'octets

use crate::error::NetworkError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(16);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(8);

/// Flux d'octets ouvert sur une plage
#[async_trait]
pub trait RangeStream: Send {
    /// Lit des octets ; `Ok(0)` signifie la fin normale de la plage
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, NetworkError>;

    /// Taille totale de la ressource, si le serveur l'a indiquée
    fn total_length(&self) -> Option<u64>;
}

#[async_trait]
pub trait ByteRangeOpener: Send + Sync {
    /// Ouvre `url` à partir de `position`, pour `length` octets au plus
    /// (jusqu'à la fin si `None`)
    async fn open(
        &self,
        url: &str,
        position: u64,
        length: Option<u64>,
    ) -> Result<Box<dyn RangeStream>, NetworkError>;
}

/// Valeur d'en-tête `Range`
pub fn range_header(position: u64, length: Option<u64>) -> String {
    match length {
        Some(length) if length > 0 => format!("bytes={}-{}", position, position + length - 1),
        _ => format!("bytes={}-", position),
    }
}

/// Taille totale extraite d'un `Content-Range: bytes a-b/total`
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

/// Implémentation HTTP de [`ByteRangeOpener`] avec des requêtes `Range`
///
/// ```rust,no_run
/// use pmoytmusic::{ByteRangeOpener, HttpRangeOpener, RangeStream};
///
/// # tokio_test::block_on(async {
/// let opener = HttpRangeOpener::default();
/// let mut stream = opener.open("https://example.com/audio", 0, Some(4096)).await?;
/// let mut buf = [0u8; 1024];
/// let n = stream.read(&mut buf).await?;
/// println!("{} bytes, total {:?}", n, stream.total_length());
/// # Ok::<(), pmoytmusic::NetworkError>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct HttpRangeOpener {
    client: Client,
    read_timeout: Duration,
}

impl HttpRangeOpener {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| NetworkError::from_reqwest(&e))?;
        Ok(Self {
            client,
            read_timeout,
        })
    }

    async fn send(&self, url: &str, position: u64, length: Option<u64>) -> Result<Response, NetworkError> {
        let request = self
            .client
            .get(url)
            .header(RANGE, range_header(position, length))
            .send();
        match tokio::time::timeout(self.read_timeout, request).await {
            Ok(result) => result.map_err(|e| NetworkError::from_reqwest(&e)),
            Err(_) => Err(NetworkError::Timeout(format!(
                "no response from {} within {:?}",
                url, self.read_timeout
            ))),
        }
    }
}

impl Default for HttpRangeOpener {
    fn default() -> Self {
        Self {
            client: Client::new(),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

#[async_trait]
impl ByteRangeOpener for HttpRangeOpener {
    async fn open(
        &self,
        url: &str,
        position: u64,
        length: Option<u64>,
    ) -> Result<Box<dyn RangeStream>, NetworkError> {
        let response = self.send(url, position, length).await?;
        let status = response.status();

        let total_length = match status {
            StatusCode::PARTIAL_CONTENT => response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_range_total),
            StatusCode::OK if position == 0 => response.content_length(),
            StatusCode::OK => {
                return Err(NetworkError::Transport(format!(
                    "server ignored range starting at {}",
                    position
                )));
            }
            StatusCode::RANGE_NOT_SATISFIABLE => return Err(NetworkError::RangeNotSatisfiable),
            other => return Err(NetworkError::Status(other.as_u16())),
        };

        let expected = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        debug!(
            "Opened {} at {} ({:?} bytes expected, total {:?})",
            status, position, expected, total_length
        );

        Ok(Box::new(HttpRangeStream {
            response,
            pending: Bytes::new(),
            position,
            received: 0,
            expected,
            total_length,
            read_timeout: self.read_timeout,
        }))
    }
}

struct HttpRangeStream {
    response: Response,
    pending: Bytes,
    position: u64,
    received: u64,
    expected: Option<u64>,
    total_length: Option<u64>,
    read_timeout: Duration,
}

#[async_trait]
impl RangeStream for HttpRangeStream {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, NetworkError> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.pending.is_empty() {
            let chunk = match tokio::time::timeout(self.read_timeout, self.response.chunk()).await {
                Ok(result) => {
                    let at = self.position + self.received;
                    result.map_err(|e| {
                        if e.is_body() && !e.is_timeout() {
                            NetworkError::UnexpectedEof(at)
                        } else {
                            NetworkError::from_reqwest(&e)
                        }
                    })?
                }
                Err(_) => {
                    return Err(NetworkError::Timeout(format!(
                        "no data within {:?} at byte {}",
                        self.read_timeout,
                        self.position + self.received
                    )));
                }
            };
            match chunk {
                Some(chunk) => self.pending = chunk,
                None => {
                    if self.expected.is_some_and(|expected| self.received < expected) {
                        return Err(NetworkError::UnexpectedEof(self.position + self.received));
                    }
                    return Ok(0);
                }
            }
        }

        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending.split_to(n));
        self.received += n as u64;
        Ok(n)
    }

    fn total_length(&self) -> Option<u64> {
        self.total_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_header() {
        assert_eq!(range_header(0, Some(524_288)), "bytes=0-524287");
        assert_eq!(range_header(100, None), "bytes=100-");
        assert_eq!(range_header(100, Some(0)), "bytes=100-");
    }

    #[test]
    fn test_parse_content_range_total() {
        assert_eq!(parse_content_range_total("bytes 0-524287/3456789"), Some(3_456_789));
        assert_eq!(parse_content_range_total("bytes 0-10/*"), None);
    }
}
