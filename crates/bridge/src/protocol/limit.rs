//! Request body size limits.
//!
//! A request body is bounded by whichever of the declared `content-length`
//! and the configured limit applies, see [`LengthBound::resolve`].

use std::fmt;
use std::str::FromStr;

use crate::ensure;
use crate::protocol::{InvalidLimit, RequestError};

/// The configured cap on request body size.
///
/// `None` (and a limit of `0`) means no cap: the declared `content-length`,
/// if any, is trusted.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct BodySizeLimit(Option<u64>);

impl BodySizeLimit {
    pub const UNLIMITED: BodySizeLimit = BodySizeLimit(None);

    pub fn bytes(limit: u64) -> Self {
        if limit == 0 { Self::UNLIMITED } else { Self(Some(limit)) }
    }

    pub fn get(self) -> Option<u64> {
        self.0
    }
}

impl From<u64> for BodySizeLimit {
    fn from(limit: u64) -> Self {
        Self::bytes(limit)
    }
}

impl From<Option<u64>> for BodySizeLimit {
    fn from(limit: Option<u64>) -> Self {
        limit.map_or(Self::UNLIMITED, Self::bytes)
    }
}

/// Parses `"512K"`, `"1M"`, `"2G"`, plain byte counts and `"Infinity"`.
///
/// Suffixes are binary multiples and case-insensitive.
impl FromStr for BodySizeLimit {
    type Err = InvalidLimit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("infinity") {
            return Ok(Self::UNLIMITED);
        }

        let (digits, shift) = match trimmed.as_bytes().last() {
            Some(b'k' | b'K') => (&trimmed[..trimmed.len() - 1], 10),
            Some(b'm' | b'M') => (&trimmed[..trimmed.len() - 1], 20),
            Some(b'g' | b'G') => (&trimmed[..trimmed.len() - 1], 30),
            _ => (trimmed, 0),
        };

        let value = digits.parse::<u64>().map_err(|_e| InvalidLimit::new(s))?;
        let bytes = value.checked_mul(1 << shift).ok_or_else(|| InvalidLimit::new(s))?;
        Ok(Self::bytes(bytes))
    }
}

/// The effective length bound of one request body.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LengthBound {
    /// Bounded by the declared `content-length`.
    ContentLength(u64),
    /// No length was declared, bounded by the configured limit.
    Limit(u64),
    Unbounded,
}

impl LengthBound {
    /// Derives the bound from the declared length and the configured limit.
    ///
    /// Fails when the declared length is larger than the limit. A limit of
    /// `0` is no limit.
    pub fn resolve(content_length: Option<u64>, limit: Option<u64>) -> Result<Self, RequestError> {
        match (content_length, limit.filter(|limit| *limit > 0)) {
            (Some(content_length), Some(limit)) => {
                ensure!(content_length <= limit, RequestError::content_length_exceeds_limit(content_length, limit));
                Ok(Self::ContentLength(content_length))
            }
            (Some(content_length), None) => Ok(Self::ContentLength(content_length)),
            (None, Some(limit)) => Ok(Self::Limit(limit)),
            (None, None) => Ok(Self::Unbounded),
        }
    }

    #[inline]
    pub fn max(self) -> Option<u64> {
        match self {
            Self::ContentLength(length) | Self::Limit(length) => Some(length),
            Self::Unbounded => None,
        }
    }

    /// Returns true if `size` bytes in total stay within the bound.
    #[inline]
    pub fn admits(self, size: u64) -> bool {
        self.max().is_none_or(|max| size <= max)
    }
}

impl fmt::Display for LengthBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContentLength(length) => write!(f, "'content-length' of {length}"),
            Self::Limit(length) => write!(f, "body size limit of {length}"),
            Self::Unbounded => f.write_str("no bound"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_limits() {
        assert_eq!("512".parse::<BodySizeLimit>().unwrap().get(), Some(512));
        assert_eq!("512K".parse::<BodySizeLimit>().unwrap().get(), Some(512 * 1024));
        assert_eq!("1m".parse::<BodySizeLimit>().unwrap().get(), Some(1024 * 1024));
        assert_eq!(" 2G ".parse::<BodySizeLimit>().unwrap().get(), Some(2 * 1024 * 1024 * 1024));
        assert_eq!("Infinity".parse::<BodySizeLimit>().unwrap(), BodySizeLimit::UNLIMITED);
        assert_eq!("0".parse::<BodySizeLimit>().unwrap(), BodySizeLimit::UNLIMITED);
    }

    #[test]
    fn reject_bad_limits() {
        assert!("".parse::<BodySizeLimit>().is_err());
        assert!("ten".parse::<BodySizeLimit>().is_err());
        assert!("-1".parse::<BodySizeLimit>().is_err());
        assert!("99999999999999999999G".parse::<BodySizeLimit>().is_err());
        assert!("18014398509481984G".parse::<BodySizeLimit>().is_err());
    }

    #[test]
    fn resolve_bound() {
        assert_eq!(LengthBound::resolve(None, None).unwrap(), LengthBound::Unbounded);
        assert_eq!(LengthBound::resolve(Some(5), None).unwrap(), LengthBound::ContentLength(5));
        assert_eq!(LengthBound::resolve(None, Some(500)).unwrap(), LengthBound::Limit(500));
        assert_eq!(LengthBound::resolve(Some(500), Some(500)).unwrap(), LengthBound::ContentLength(500));
        assert_eq!(LengthBound::resolve(Some(5), Some(0)).unwrap(), LengthBound::ContentLength(5));
    }

    #[test]
    fn declared_length_over_limit() {
        let error = LengthBound::resolve(Some(1000), Some(500)).unwrap_err();
        let message = error.to_string();
        assert!(message.contains("1000"), "{message}");
        assert!(message.contains("500"), "{message}");
    }

    #[test]
    fn admits() {
        assert!(LengthBound::Unbounded.admits(u64::MAX));
        assert!(LengthBound::Limit(5).admits(5));
        assert!(!LengthBound::Limit(5).admits(6));
        assert_eq!(LengthBound::ContentLength(5).to_string(), "'content-length' of 5");
        assert_eq!(LengthBound::Limit(500).to_string(), "body size limit of 500");
    }
}
