//! Azure Resource Manager probe — one authenticated GET, headers only.
//!
//! ARM meters management-plane calls per subscription and reports the
//! remaining budget in the `x-ms-ratelimit-remaining-resource` response
//! header. The probe lists one resource type purely for that side
//! channel: the response body is discarded, only the status code and
//! headers matter.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tracing::info;

use crate::auth::AccessToken;

pub const MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";
pub const RATELIMIT_REMAINING_HEADER: &str = "x-ms-ratelimit-remaining-resource";

const API_PATH: &str = "providers/Microsoft.Compute/virtualMachineScaleSets";
const API_VERSION: &str = "2019-12-01";
const CONNECT_TIMEOUT: Duration = Duration::from_millis(4000);

/// Remaining call budget per rate category, parsed from one response
/// header. Lives for one poll cycle.
pub type RateLimitSnapshot = HashMap<String, i64>;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failure sending HTTP request: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response code {0}")]
    UnexpectedStatus(u16),
    #[error("malformed rate-limit entry {entry:?}: {reason}")]
    Malformed { entry: String, reason: &'static str },
}

pub struct ResourceProbe {
    client: reqwest::Client,
    url: String,
}

impl ResourceProbe {
    /// Build a probe against the given management endpoint. The client
    /// is constructed once and reused across cycles. Only the connect
    /// phase is bounded; there is no overall request deadline.
    pub fn new(endpoint: &str, subscription_id: &str) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        let url = format!(
            "{}/subscriptions/{}/{}?api-version={}",
            endpoint.trim_end_matches('/'),
            subscription_id,
            API_PATH,
            API_VERSION
        );
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One authenticated GET against the target. A missing rate-limit
    /// header is not an error: ARM did not meter this request and there
    /// is nothing to publish this cycle.
    pub async fn fetch(&self, token: &AccessToken) -> Result<RateLimitSnapshot, ProbeError> {
        let resp = self
            .client
            .get(&self.url)
            .bearer_auth(token.secret())
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(ProbeError::UnexpectedStatus(status.as_u16()));
        }

        let raw = match resp.headers().get(RATELIMIT_REMAINING_HEADER) {
            Some(value) => match value.to_str() {
                Ok(s) => s.to_owned(),
                Err(_) => {
                    return Err(ProbeError::Malformed {
                        entry: String::from_utf8_lossy(value.as_bytes()).into_owned(),
                        reason: "header is not valid UTF-8",
                    })
                }
            },
            None => return Ok(RateLimitSnapshot::new()),
        };

        info!(header = %raw, "health probe ok");
        parse_remaining_header(&raw)
    }
}

/// Parse `name1;count1,name2;count2,...` into a snapshot.
///
/// Strict: every entry must be exactly a name and a base-10 integer
/// count separated by one semicolon. A malformed entry fails the whole
/// parse; nothing gets published for that cycle.
pub fn parse_remaining_header(raw: &str) -> Result<RateLimitSnapshot, ProbeError> {
    let mut snapshot = RateLimitSnapshot::new();

    for entry in raw.split(',') {
        let mut fields = entry.split(';');
        let (name, count) = match (fields.next(), fields.next(), fields.next()) {
            (Some(name), Some(count), None) => (name, count),
            _ => {
                return Err(ProbeError::Malformed {
                    entry: entry.to_owned(),
                    reason: "expected name;count",
                })
            }
        };

        let remaining: i64 = count.parse().map_err(|_| ProbeError::Malformed {
            entry: entry.to_owned(),
            reason: "count is not an integer",
        })?;

        snapshot.insert(name.to_owned(), remaining);
    }

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_entry() {
        let parsed = parse_remaining_header("subscription-reads;11999").unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed["subscription-reads"], 11999);
    }

    #[test]
    fn test_parse_multiple_entries() {
        let parsed = parse_remaining_header("a;1,b;2,c;3").unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed["a"], 1);
        assert_eq!(parsed["b"], 2);
        assert_eq!(parsed["c"], 3);
    }

    #[test]
    fn test_parse_accepts_signed_count() {
        let parsed = parse_remaining_header("reads;-5").unwrap();
        assert_eq!(parsed["reads"], -5);
    }

    #[test]
    fn test_parse_rejects_entry_without_semicolon() {
        let err = parse_remaining_header("a1,b;2").unwrap_err();
        match err {
            ProbeError::Malformed { entry, .. } => assert_eq!(entry, "a1"),
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_extra_fields() {
        assert!(parse_remaining_header("a;1;9").is_err());
    }

    #[test]
    fn test_parse_rejects_non_integer_count() {
        assert!(parse_remaining_header("a;lots").is_err());
        assert!(parse_remaining_header("a;").is_err());
    }

    #[test]
    fn test_parse_rejects_empty_header() {
        assert!(parse_remaining_header("").is_err());
    }

    #[test]
    fn test_duplicate_names_keep_last_value() {
        let parsed = parse_remaining_header("a;1,a;2").unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed["a"], 2);
    }

    #[test]
    fn test_probe_url_shape() {
        let probe = ResourceProbe::new(MANAGEMENT_ENDPOINT, "sub-0000").unwrap();
        assert_eq!(
            probe.url(),
            "https://management.azure.com/subscriptions/sub-0000/providers/Microsoft.Compute/virtualMachineScaleSets?api-version=2019-12-01"
        );
    }
}
