//! AISR API wire models
//!
//! Request and response bodies of the AISR signing and school query
//! endpoints, plus the small value types the registry client hands back.

use crate::domain::ResultId;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Body of `POST {api}/signing/puturl`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrlRequest {
    pub file_path: String,
    pub content_type: String,
    pub school_id: String,
}

/// Response of `POST {api}/signing/puturl`
#[derive(Debug, Clone, Deserialize)]
pub struct SignedUrlResponse {
    pub url: Option<String>,
}

/// One entry of `GET {api}/school/query/{schoolId}`
///
/// Only the fields the pipeline reads are modelled; the registry also returns
/// COVID, match and stats file links which are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolQueryEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub school_id: Option<String>,

    /// Upload time in epoch milliseconds
    #[serde(default)]
    pub upload_date_time: Option<i64>,

    #[serde(default)]
    pub file_name: Option<String>,

    #[serde(default)]
    pub full_vaccine_file_url: Option<String>,

    #[serde(default)]
    pub full_vaccine_file_name: Option<String>,
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    #[allow(dead_code)]
    pub token_type: Option<String>,
}

/// A downloadable result of an earlier bulk query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    pub id: ResultId,

    /// Signed URL of the full vaccine file
    pub download_url: String,

    pub file_name: Option<String>,

    pub uploaded_at: Option<DateTime<Utc>>,
}

impl QueryResult {
    pub fn new(id: impl Into<String>, download_url: impl Into<String>) -> Self {
        Self {
            id: ResultId::new(id),
            download_url: download_url.into(),
            file_name: None,
            uploaded_at: None,
        }
    }

    pub fn with_uploaded_at(mut self, uploaded_at: DateTime<Utc>) -> Self {
        self.uploaded_at = Some(uploaded_at);
        self
    }
}

impl SchoolQueryEntry {
    /// Converts the entry into a [`QueryResult`]; entries without a full
    /// vaccine file are still being processed by the registry and yield `None`
    pub fn into_result(self) -> Option<QueryResult> {
        let url = self.full_vaccine_file_url.filter(|u| !u.trim().is_empty())?;
        Some(QueryResult {
            id: ResultId::new(self.id),
            download_url: url,
            file_name: self.full_vaccine_file_name.or(self.file_name),
            uploaded_at: self
                .upload_date_time
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        })
    }
}

/// Acknowledgement of a bulk query upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfirmation {
    pub entity_id: String,
    pub bytes_sent: usize,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}
