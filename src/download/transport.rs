use std::io::Read;
use std::time::Duration;

use crate::error::{DatasetError, Result};

/// An open response whose body has not been read yet
pub struct ResponseBody {
    /// `Content-Length`, when the server sent one
    pub content_length: Option<u64>,
    /// Streaming body
    pub reader: Box<dyn Read + Send>,
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseBody")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// HTTP GET seam (enables testing the download loop via mocking)
#[cfg_attr(test, mockall::automock)]
pub trait Transport {
    /// Issue a GET and return the response body once a success status arrives
    ///
    /// # Errors
    /// Returns [`DatasetError::HttpStatus`] on non-success status, or
    /// [`DatasetError::Network`] if the request could not complete
    fn get(&self, url: &str) -> Result<ResponseBody>;
}

/// Blocking `reqwest` client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Build a client whose connect and read operations time out after `timeout`
    ///
    /// # Errors
    /// Returns error if the TLS backend cannot be initialized
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &str) -> Result<ResponseBody> {
        let response = self.client.get(url).send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(DatasetError::HttpStatus {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }

        Ok(ResponseBody {
            content_length: response.content_length(),
            reader: Box::new(response),
        })
    }
}
