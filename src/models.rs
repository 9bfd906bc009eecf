//! Core data models used throughout cverag.
//!
//! These types cover both sides of the pipeline: the serde view of the raw
//! vulnerability feed (`CveRecord` and friends) and the canonical [`Document`]
//! form that is stored in and retrieved from the index.

use serde::{Deserialize, Serialize};

/// One page of the remote feed response.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedPage {
    #[serde(rename = "totalResults", default)]
    pub total_results: u64,
    #[serde(default)]
    pub vulnerabilities: Vec<FeedEntry>,
}

/// Wrapper object around each record in a feed page.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedEntry {
    pub cve: CveRecord,
}

/// Raw vulnerability record as received from the feed.
///
/// Immutable as received; an updated record supersedes the previous one
/// wholesale. The `id` is optional at the wire level — records without one
/// are rejected during normalization, not during parsing.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CveRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub published: Option<String>,
    #[serde(rename = "lastModified", default)]
    pub last_modified: Option<String>,
    #[serde(rename = "vulnStatus", default)]
    pub vuln_status: Option<String>,
    #[serde(default)]
    pub descriptions: Vec<LocalizedText>,
    #[serde(default)]
    pub metrics: CveMetrics,
}

/// A localized description string.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalizedText {
    pub lang: String,
    pub value: String,
}

/// Scoring-metric blocks keyed by scheme version.
///
/// A record may carry both schemes at once; resolution precedence is fixed
/// (v3.1 over v2) and implemented in [`crate::normalize`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CveMetrics {
    #[serde(rename = "cvssMetricV31", default)]
    pub cvss_v31: Vec<CvssMetricV31>,
    #[serde(rename = "cvssMetricV2", default)]
    pub cvss_v2: Vec<CvssMetricV2>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CvssMetricV31 {
    #[serde(rename = "cvssData")]
    pub cvss_data: CvssDataV31,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CvssDataV31 {
    #[serde(rename = "baseScore", default)]
    pub base_score: Option<f64>,
    #[serde(rename = "baseSeverity", default)]
    pub base_severity: Option<String>,
}

/// Legacy v2 metric. The severity rating lives on the metric object itself,
/// not inside `cvssData`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CvssMetricV2 {
    #[serde(rename = "cvssData", default)]
    pub cvss_data: CvssDataV2,
    #[serde(rename = "baseSeverity", default)]
    pub base_severity: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CvssDataV2 {
    #[serde(rename = "baseScore", default)]
    pub base_score: Option<f64>,
}

/// Canonical normalized document, the unit stored in the index.
///
/// Derived deterministically from a [`CveRecord`]; never hand-edited.
/// The index holds at most one document per `cve_id` at any time.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub cve_id: String,
    /// Rendered body text: id, status, resolved severity/score, description.
    pub body: String,
    pub published: String,
    pub last_modified: String,
    pub status: String,
    pub score: String,
    pub severity: String,
    /// Feed tag, always `"NVD"`.
    pub source: String,
    /// First four characters of the publication timestamp.
    pub year: String,
}

/// A document as stored in the index, with its row identifier.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: String,
    pub doc: Document,
}

/// A document returned from similarity search, with its cosine score.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub doc: Document,
    pub similarity: f64,
}

/// One turn of caller-supplied conversation history.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversationTurn {
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

fn default_role() -> String {
    "user".to_string()
}

/// Structured source reference returned alongside an answer.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub cve_id: String,
    pub severity: String,
    pub score: String,
    pub status: String,
    /// Date portion only of the publication timestamp.
    pub published: String,
    pub year: String,
    pub description_preview: String,
}
