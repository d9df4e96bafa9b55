use async_trait::async_trait;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, HeaderMap, RANGE};
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::ReadAt;
use anyhow::{Result, anyhow, bail};

/// Remote archive volume read through HTTP Range requests.
///
/// Only single-volume archives can be read this way; the volume size is
/// learned once from the HEAD response.
pub struct HttpRangeReader {
    client: Client,
    url: String,
    size: u64,
    transferred_bytes: AtomicU64,
    max_retry: u32,
}

/// Whether the server advertises byte ranges.
fn accepts_byte_ranges(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|unit| unit.trim() == "bytes"))
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

/// Inclusive byte range covering `len` bytes from `offset`, clipped to a
/// volume of `size` bytes. `None` when nothing is left to read.
fn clipped_range(offset: u64, len: usize, size: u64) -> Option<(u64, u64)> {
    if len == 0 || offset >= size {
        return None;
    }
    let last = offset.saturating_add(len as u64 - 1).min(size - 1);
    Some((offset, last))
}

impl HttpRangeReader {
    /// Probe `url` with a HEAD request using a default client.
    pub async fn new(url: String) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Self::with_client(client, url).await
    }

    pub async fn with_client(client: Client, url: String) -> Result<Self> {
        let resp = client.head(&url).send().await?;
        if !resp.status().is_success() {
            bail!("HEAD {url} failed with status: {}", resp.status());
        }
        if !accepts_byte_ranges(resp.headers()) {
            bail!("{url} does not support Range requests");
        }
        let size = content_length(resp.headers())
            .ok_or_else(|| anyhow!("{url} did not return Content-Length"))?;

        log::debug!("remote volume {url}: {size} bytes");
        Ok(Self {
            client,
            url,
            size,
            transferred_bytes: AtomicU64::new(0),
            max_retry: 10,
        })
    }

    /// Attempts per request before a connection error is final.
    pub fn max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry.max(1);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Bytes received from the network so far
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    /// One GET for `first..=last`, retried on timeouts and refused
    /// connections. The server may answer with fewer bytes than asked for.
    async fn fetch(&self, first: u64, last: u64) -> Result<Vec<u8>> {
        let range = format!("bytes={first}-{last}");
        let mut attempt = 0;
        loop {
            match self.client.get(&self.url).header(RANGE, &range).send().await {
                Ok(resp) if resp.status() == StatusCode::PARTIAL_CONTENT => {
                    let body = resp.bytes().await?;
                    if body.is_empty() {
                        bail!("{range} of {} returned no data", self.url);
                    }
                    return Ok(body.to_vec());
                }
                Ok(resp) => bail!("{range} of {} failed with status: {}", self.url, resp.status()),
                Err(e) if e.is_timeout() || e.is_connect() => {
                    attempt += 1;
                    if attempt >= self.max_retry {
                        bail!("giving up on {} after {attempt} attempts: {e}", self.url);
                    }
                    log::warn!("{range} of {}: {e}, retry {attempt}/{}", self.url, self.max_retry);
                    tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[async_trait]
impl ReadAt for HttpRangeReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let Some((first, last)) = clipped_range(offset, buf.len(), self.size) else {
            return Ok(0);
        };
        let wanted = (last - first + 1) as usize;

        let mut filled = 0;
        while filled < wanted {
            let body = self.fetch(first + filled as u64, last).await?;
            let take = body.len().min(wanted - filled);
            buf[filled..filled + take].copy_from_slice(&body[..take]);
            filled += take;
            self.transferred_bytes.fetch_add(take as u64, Ordering::Relaxed);
        }
        Ok(filled)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn range_support_detection() {
        let mut headers = HeaderMap::new();
        assert!(!accepts_byte_ranges(&headers));
        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("none"));
        assert!(!accepts_byte_ranges(&headers));
        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        assert!(accepts_byte_ranges(&headers));

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("4096"));
        assert_eq!(content_length(&headers), Some(4096));
    }

    #[test]
    fn ranges_are_clipped_to_the_volume() {
        assert_eq!(clipped_range(0, 10, 100), Some((0, 9)));
        assert_eq!(clipped_range(95, 10, 100), Some((95, 99)));
        assert_eq!(clipped_range(100, 10, 100), None);
        assert_eq!(clipped_range(5, 0, 100), None);
    }
}
