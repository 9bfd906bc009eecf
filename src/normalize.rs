//! Record normalization.
//!
//! Converts one raw feed record into a canonical [`Document`]: a rendered
//! text body plus fully-populated metadata. Pure — no I/O, deterministic for
//! identical input. The only fatal condition is a record without an
//! identifier; everything else degrades to sentinel values.

use anyhow::{bail, Result};

use crate::models::{CveMetrics, CveRecord, Document};

/// Feed tag recorded on every document.
pub const SOURCE_TAG: &str = "NVD";

/// Resolved severity/score pair, always populated.
///
/// `"N/A"` stands in when the record carries no scoring scheme at all, so
/// document metadata never has missing fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CvssSummary {
    pub score: String,
    pub severity: String,
}

/// Resolve the scoring-metric blocks into a single severity/score pair.
///
/// Precedence is fixed: CVSS v3.1 wins over v2 when both are present.
pub fn resolve_cvss(metrics: &CveMetrics) -> CvssSummary {
    if let Some(metric) = metrics.cvss_v31.first() {
        return CvssSummary {
            score: metric
                .cvss_data
                .base_score
                .map(fmt_score)
                .unwrap_or_else(|| "N/A".to_string()),
            severity: metric
                .cvss_data
                .base_severity
                .clone()
                .unwrap_or_else(|| "N/A".to_string()),
        };
    }

    if let Some(metric) = metrics.cvss_v2.first() {
        return CvssSummary {
            score: metric
                .cvss_data
                .base_score
                .map(fmt_score)
                .unwrap_or_else(|| "N/A".to_string()),
            severity: metric
                .base_severity
                .clone()
                .unwrap_or_else(|| "N/A".to_string()),
        };
    }

    CvssSummary {
        score: "N/A".to_string(),
        severity: "N/A".to_string(),
    }
}

/// Render a base score the way the feed displays it: one decimal place
/// for integral values (`10.0`), shortest form otherwise (`9.8`).
fn fmt_score(score: f64) -> String {
    if score.fract() == 0.0 {
        format!("{:.1}", score)
    } else {
        format!("{}", score)
    }
}

/// First description entry tagged English; absence yields an empty string.
pub fn english_description(record: &CveRecord) -> String {
    record
        .descriptions
        .iter()
        .find(|d| d.lang == "en")
        .map(|d| d.value.clone())
        .unwrap_or_default()
}

/// Convert a raw record into a canonical [`Document`].
///
/// Fails only when the record has no identifier — fatal for that record,
/// not for the batch it arrived in.
pub fn normalize(record: &CveRecord) -> Result<Document> {
    let cve_id = match record.id.as_deref() {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => bail!("record has no identifier"),
    };

    let status = record
        .vuln_status
        .clone()
        .unwrap_or_else(|| "Unknown".to_string());
    let cvss = resolve_cvss(&record.metrics);
    let description = english_description(record);

    let body = format!(
        "CVE ID: {}\nStatus: {}\nSeverity: {} (Score: {})\n\nDescription:\n{}\n",
        cve_id, status, cvss.severity, cvss.score, description
    );

    let published = record.published.clone().unwrap_or_default();
    let last_modified = record.last_modified.clone().unwrap_or_default();
    let year = published.chars().take(4).collect();

    Ok(Document {
        cve_id,
        body,
        published,
        last_modified,
        status,
        score: cvss.score,
        severity: cvss.severity,
        source: SOURCE_TAG.to_string(),
        year,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CvssDataV2, CvssDataV31, CvssMetricV2, CvssMetricV31, LocalizedText};

    fn record(id: &str) -> CveRecord {
        CveRecord {
            id: Some(id.to_string()),
            published: Some("2024-03-15T10:00:00.000".to_string()),
            last_modified: Some("2024-04-01T08:30:00.000".to_string()),
            vuln_status: Some("Analyzed".to_string()),
            descriptions: vec![
                LocalizedText {
                    lang: "es".to_string(),
                    value: "Desbordamiento de búfer.".to_string(),
                },
                LocalizedText {
                    lang: "en".to_string(),
                    value: "A buffer overflow in the parser.".to_string(),
                },
            ],
            metrics: CveMetrics::default(),
        }
    }

    fn v31(score: f64, severity: &str) -> CvssMetricV31 {
        CvssMetricV31 {
            cvss_data: CvssDataV31 {
                base_score: Some(score),
                base_severity: Some(severity.to_string()),
            },
        }
    }

    fn v2(score: f64, severity: &str) -> CvssMetricV2 {
        CvssMetricV2 {
            cvss_data: CvssDataV2 {
                base_score: Some(score),
            },
            base_severity: Some(severity.to_string()),
        }
    }

    #[test]
    fn test_missing_id_is_fatal() {
        let mut rec = record("CVE-2024-0001");
        rec.id = None;
        assert!(normalize(&rec).is_err());

        rec.id = Some(String::new());
        assert!(normalize(&rec).is_err());
    }

    #[test]
    fn test_v31_wins_over_v2() {
        let mut rec = record("CVE-2024-0001");
        rec.metrics.cvss_v31 = vec![v31(9.8, "CRITICAL")];
        rec.metrics.cvss_v2 = vec![v2(7.5, "HIGH")];

        let doc = normalize(&rec).unwrap();
        assert_eq!(doc.score, "9.8");
        assert_eq!(doc.severity, "CRITICAL");
    }

    #[test]
    fn test_v2_used_when_v31_absent() {
        let mut rec = record("CVE-2019-0042");
        rec.metrics.cvss_v2 = vec![v2(7.5, "HIGH")];

        let doc = normalize(&rec).unwrap();
        assert_eq!(doc.score, "7.5");
        assert_eq!(doc.severity, "HIGH");
    }

    #[test]
    fn test_no_metrics_yields_sentinels() {
        let doc = normalize(&record("CVE-2024-0002")).unwrap();
        assert_eq!(doc.score, "N/A");
        assert_eq!(doc.severity, "N/A");
    }

    #[test]
    fn test_integral_score_keeps_decimal() {
        let mut rec = record("CVE-2024-0003");
        rec.metrics.cvss_v31 = vec![v31(10.0, "CRITICAL")];
        assert_eq!(normalize(&rec).unwrap().score, "10.0");
    }

    #[test]
    fn test_english_description_selected() {
        let doc = normalize(&record("CVE-2024-0001")).unwrap();
        assert!(doc.body.contains("A buffer overflow in the parser."));
        assert!(!doc.body.contains("Desbordamiento"));
    }

    #[test]
    fn test_missing_description_is_empty_not_error() {
        let mut rec = record("CVE-2024-0004");
        rec.descriptions.clear();
        let doc = normalize(&rec).unwrap();
        assert!(doc.body.ends_with("Description:\n\n"));
    }

    #[test]
    fn test_body_template_stable() {
        let mut rec = record("CVE-2024-0001");
        rec.metrics.cvss_v31 = vec![v31(9.8, "CRITICAL")];

        let a = normalize(&rec).unwrap();
        let b = normalize(&rec).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            a.body,
            "CVE ID: CVE-2024-0001\nStatus: Analyzed\nSeverity: CRITICAL (Score: 9.8)\n\nDescription:\nA buffer overflow in the parser.\n"
        );
    }

    #[test]
    fn test_year_from_published() {
        let doc = normalize(&record("CVE-2024-0001")).unwrap();
        assert_eq!(doc.year, "2024");

        let mut rec = record("CVE-2024-0005");
        rec.published = None;
        assert_eq!(normalize(&rec).unwrap().year, "");
    }

    #[test]
    fn test_metadata_fully_populated() {
        let doc = normalize(&record("CVE-2024-0001")).unwrap();
        assert_eq!(doc.source, "NVD");
        assert_eq!(doc.status, "Analyzed");
        assert_eq!(doc.published, "2024-03-15T10:00:00.000");
        assert_eq!(doc.last_modified, "2024-04-01T08:30:00.000");
    }
}
