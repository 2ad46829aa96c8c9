use super::BreachError;
use crate::config::BreachSettings;
use crate::hashing::log_prefix;
use reqwest::header::USER_AGENT;
use tracing::debug;

/// Length of the hash prefix sent to the range endpoint.
pub const PREFIX_LEN: usize = 5;

/// k-anonymity range client: only the first [`PREFIX_LEN`] characters of a
/// hash ever leave the machine.
pub struct RangeClient {
    http: reqwest::Client,
    base_url: String,
    user_agent: String,
}

impl RangeClient {
    pub fn new(settings: &BreachSettings) -> Result<Self, BreachError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            user_agent: settings.user_agent.clone(),
        })
    }

    /// Breach count for an uppercase 40-character SHA-1 hex digest.
    pub async fn breach_count(&self, hash: &str) -> Result<u64, BreachError> {
        let (prefix, suffix) = split_hash(hash)?;
        let url = format!("{}/range/{}", self.base_url, prefix);

        let response = self
            .http
            .get(&url)
            .header(USER_AGENT, self.user_agent.as_str())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BreachError::Status(status));
        }

        let body = response.text().await?;
        let count = parse_range(&body, suffix)?;
        debug!(prefix = log_prefix(hash), count, "breach range lookup");
        Ok(count)
    }
}

/// Range prefix and the suffix to look for within it.
fn split_hash(hash: &str) -> Result<(&str, &str), BreachError> {
    match (hash.get(..PREFIX_LEN), hash.get(PREFIX_LEN..)) {
        (Some(prefix), Some(suffix)) if !suffix.is_empty() => Ok((prefix, suffix)),
        _ => Err(BreachError::InvalidHash(hash.to_string())),
    }
}

/// Finds `suffix` in a `SUFFIX:COUNT` listing. Absent means zero.
pub(crate) fn parse_range(body: &str, suffix: &str) -> Result<u64, BreachError> {
    for line in body.lines() {
        let Some((candidate, count)) = line.trim().split_once(':') else {
            continue;
        };
        if candidate.eq_ignore_ascii_case(suffix) {
            return count
                .trim()
                .parse()
                .map_err(|_| BreachError::MalformedCount(line.trim().to_string()));
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "0018A45C4D1DEF81644B54AB7F969B88D65:3\r\n\
                        1E4C9B93F3F0682250B6CF8331B7EE68FD8:3861493\r\n\
                        011053FD0102E94D6AE2F8B83D76FAF94F6:1\r\n";

    #[test]
    fn finds_suffix_case_insensitively() {
        assert_eq!(
            parse_range(BODY, "1e4c9b93f3f0682250b6cf8331b7ee68fd8").unwrap(),
            3861493
        );
    }

    #[test]
    fn missing_suffix_is_zero() {
        assert_eq!(parse_range(BODY, "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF").unwrap(), 0);
        assert_eq!(parse_range("", "ABC").unwrap(), 0);
    }

    #[test]
    fn short_or_split_char_hashes_are_rejected() {
        assert_eq!(
            split_hash("5BAA61E4C9").unwrap(),
            ("5BAA6", "1E4C9")
        );
        assert!(matches!(split_hash("5BA"), Err(BreachError::InvalidHash(_))));
        assert!(matches!(split_hash("5BAA6"), Err(BreachError::InvalidHash(_))));
        // Byte 5 falls inside the two-byte 'é'.
        assert!(matches!(split_hash("5BAAé61E4"), Err(BreachError::InvalidHash(_))));
    }

    #[tokio::test]
    async fn breach_count_rejects_short_hash_without_a_request() {
        let client = RangeClient::new(&BreachSettings {
            base_url: "http://127.0.0.1:9".into(),
            ..BreachSettings::default()
        })
        .unwrap();
        assert!(matches!(
            client.breach_count("AB").await,
            Err(BreachError::InvalidHash(hash)) if hash == "AB"
        ));
    }

    #[test]
    fn garbage_count_on_matching_line_is_an_error() {
        let body = "ABC:lots\nDEF:2\n";
        assert!(matches!(
            parse_range(body, "ABC"),
            Err(BreachError::MalformedCount(line)) if line == "ABC:lots"
        ));
        // Unrelated lines are never inspected.
        assert_eq!(parse_range(body, "DEF").unwrap(), 2);
    }
}
