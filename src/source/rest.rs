use crate::error::SourceError;
use crate::source::{LotSource, RawLotRecord, ensure_success, http_client, parse_rows, transport_error};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Lot rows read from a REST query endpoint (a view exposed by the hosted store).
#[derive(Debug, Clone)]
pub struct RestLotSource {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
    timeout: Duration,
}

impl RestLotSource {
    pub fn new(
        url: impl Into<String>,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            client: http_client(timeout)?,
            url: url.into(),
            headers: auth_headers(api_key)?,
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn auth_headers(api_key: Option<&str>) -> Result<HeaderMap, SourceError> {
    let mut headers = HeaderMap::new();
    let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) else {
        return Ok(headers);
    };
    let invalid = |_| SourceError::Payload("api key is not a valid header value".to_string());
    headers.insert("apikey", HeaderValue::from_str(key).map_err(invalid)?);
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {key}")).map_err(invalid)?,
    );
    Ok(headers)
}

impl LotSource for RestLotSource {
    async fn fetch_lots(&self) -> Result<Vec<RawLotRecord>, SourceError> {
        debug!(url = %self.url, "Fetching lot rows");
        let response = self
            .client
            .get(&self.url)
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|err| transport_error(err, self.timeout))?;
        let response = ensure_success(response).await?;
        let payload: Value = response
            .json()
            .await
            .map_err(|err| transport_error(err, self.timeout))?;
        let rows = parse_rows(payload)?;
        debug!(count = rows.len(), "Lot rows parsed");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_sets_both_headers() -> Result<(), SourceError> {
        let headers = auth_headers(Some(" secret "))?;

        assert_eq!(headers.get("apikey").map(|v| v.as_bytes()), Some(&b"secret"[..]));
        assert_eq!(
            headers.get(AUTHORIZATION).map(|v| v.as_bytes()),
            Some(&b"Bearer secret"[..])
        );
        Ok(())
    }

    #[test]
    fn missing_or_blank_key_sends_no_auth() -> Result<(), SourceError> {
        assert!(auth_headers(None)?.is_empty());
        assert!(auth_headers(Some("  "))?.is_empty());
        Ok(())
    }

    #[test]
    fn control_characters_in_key_are_rejected() {
        assert!(matches!(
            auth_headers(Some("bad\nkey")),
            Err(SourceError::Payload(_))
        ));
    }
}
