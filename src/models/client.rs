//! Client identity: the key that isolates one uploader's bucket from another's.

use axum::http::HeaderMap;
use std::{fmt, net::IpAddr};
use thiserror::Error;

/// Longest accepted client id coming from an untrusted source (an IPv4 dotted quad).
pub const MAX_CLIENT_ID_LEN: usize = 15;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClientIdError {
    #[error("client id `{0}` is not a dotted IPv4 address")]
    Malformed(String),
    #[error("client id is longer than {} characters", MAX_CLIENT_ID_LEN)]
    TooLong,
    #[error("forwarded address header `{0}` is not valid text")]
    Unreadable(String),
}

/// Identifier of the uploading party; doubles as its bucket directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    /// Validate a client id supplied by an untrusted party (a header or a URL
    /// path segment).
    ///
    /// Accepts digits and dots only, at most [`MAX_CLIENT_ID_LEN`] characters,
    /// and at least one digit so `.` and `..` never become bucket names.
    pub fn parse_untrusted(raw: &str) -> Result<Self, ClientIdError> {
        if raw.len() > MAX_CLIENT_ID_LEN {
            return Err(ClientIdError::TooLong);
        }
        if !raw.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return Err(ClientIdError::Malformed(raw.to_string()));
        }
        if !raw.chars().any(|c| c.is_ascii_digit()) {
            return Err(ClientIdError::Malformed(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// Build a client id from the socket's peer address. Trusted as-is.
    pub fn from_peer(addr: IpAddr) -> Self {
        Self(addr.to_canonical().to_string())
    }

    /// Resolve the requesting client.
    ///
    /// When `header_name` is configured and the request carries it, the header
    /// value wins but must pass [`ClientId::parse_untrusted`]. Otherwise the
    /// peer address is used.
    pub fn resolve(
        peer: IpAddr,
        headers: &HeaderMap,
        header_name: Option<&str>,
    ) -> Result<Self, ClientIdError> {
        let Some(name) = header_name else {
            return Ok(Self::from_peer(peer));
        };
        match headers.get(name) {
            Some(value) => {
                let value = value
                    .to_str()
                    .map_err(|_| ClientIdError::Unreadable(name.to_string()))?;
                Self::parse_untrusted(value)
            }
            None => Ok(Self::from_peer(peer)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
