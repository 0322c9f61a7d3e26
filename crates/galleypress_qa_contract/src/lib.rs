use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

pub const CONTRACT_ID: &str = "galleypress.qa_contract";
pub const CONTRACT_VERSION: &str = "1";

// Number of minor issues the lenient profile absorbs before gating.
pub const LENIENT_MINOR_BUDGET: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Major,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Minor => "minor",
            Severity::Major => "major",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStage {
    Layout,
    Html,
    Artifact,
}

impl CheckStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStage::Layout => "layout",
            CheckStage::Html => "html",
            CheckStage::Artifact => "artifact",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckCategoryDef {
    pub id: &'static str,
    pub name: &'static str,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckDef {
    pub id: &'static str,
    pub category: &'static str,
    pub severity: Severity,
    pub stage: CheckStage,
}

pub const CHECK_CATEGORIES_V1: [CheckCategoryDef; 4] = [
    CheckCategoryDef {
        id: "paged-layout-integrity",
        name: "Paged Layout Integrity",
        weight: 40.0,
    },
    CheckCategoryDef {
        id: "document-structure",
        name: "Document Structure",
        weight: 25.0,
    },
    CheckCategoryDef {
        id: "embedded-media",
        name: "Embedded Media",
        weight: 15.0,
    },
    CheckCategoryDef {
        id: "artifact-packaging",
        name: "Artifact Packaging",
        weight: 20.0,
    },
];

pub const CHECKS_V1: [CheckDef; 16] = [
    CheckDef {
        id: "gp.layout.page_count_minimum",
        category: "paged-layout-integrity",
        severity: Severity::Critical,
        stage: CheckStage::Layout,
    },
    CheckDef {
        id: "gp.layout.page_count_expected",
        category: "paged-layout-integrity",
        severity: Severity::Major,
        stage: CheckStage::Layout,
    },
    CheckDef {
        id: "gp.layout.margin_band",
        category: "paged-layout-integrity",
        severity: Severity::Major,
        stage: CheckStage::Layout,
    },
    CheckDef {
        id: "gp.layout.overflow_none",
        category: "paged-layout-integrity",
        severity: Severity::Critical,
        stage: CheckStage::Layout,
    },
    CheckDef {
        id: "gp.layout.orphan_tail",
        category: "paged-layout-integrity",
        severity: Severity::Minor,
        stage: CheckStage::Layout,
    },
    CheckDef {
        id: "gp.layout.cover_bleed",
        category: "paged-layout-integrity",
        severity: Severity::Major,
        stage: CheckStage::Layout,
    },
    CheckDef {
        id: "gp.html.cover_single",
        category: "document-structure",
        severity: Severity::Critical,
        stage: CheckStage::Html,
    },
    CheckDef {
        id: "gp.html.chapter_count",
        category: "document-structure",
        severity: Severity::Major,
        stage: CheckStage::Html,
    },
    CheckDef {
        id: "gp.html.title_present",
        category: "document-structure",
        severity: Severity::Major,
        stage: CheckStage::Html,
    },
    CheckDef {
        id: "gp.html.images_embedded",
        category: "embedded-media",
        severity: Severity::Major,
        stage: CheckStage::Html,
    },
    CheckDef {
        id: "gp.html.contrast_minimum",
        category: "embedded-media",
        severity: Severity::Minor,
        stage: CheckStage::Html,
    },
    CheckDef {
        id: "gp.html.images_present",
        category: "embedded-media",
        severity: Severity::Minor,
        stage: CheckStage::Html,
    },
    CheckDef {
        id: "gp.artifact.pdf_parses",
        category: "artifact-packaging",
        severity: Severity::Critical,
        stage: CheckStage::Artifact,
    },
    CheckDef {
        id: "gp.artifact.page_count_match",
        category: "artifact-packaging",
        severity: Severity::Major,
        stage: CheckStage::Artifact,
    },
    CheckDef {
        id: "gp.artifact.media_box_trim",
        category: "artifact-packaging",
        severity: Severity::Critical,
        stage: CheckStage::Artifact,
    },
    CheckDef {
        id: "gp.artifact.metadata_present",
        category: "artifact-packaging",
        severity: Severity::Minor,
        stage: CheckStage::Artifact,
    },
];

pub fn check_defs_v1() -> &'static [CheckDef] {
    &CHECKS_V1
}

pub fn check_category_defs_v1() -> &'static [CheckCategoryDef] {
    &CHECK_CATEGORIES_V1
}

pub fn check_def(check_id: &str) -> Option<&'static CheckDef> {
    CHECKS_V1.iter().find(|d| d.id == check_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QaProfile {
    Strict,
    Lenient,
}

impl QaProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            QaProfile::Strict => "strict",
            QaProfile::Lenient => "lenient",
        }
    }

    pub fn from_str(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(QaProfile::Strict),
            "lenient" => Some(QaProfile::Lenient),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub check_id: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    pub detail: String,
    /// Measured/target values for checks with a numeric band, so a
    /// corrective action can know which direction to move.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measured: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<f64>,
}

impl Issue {
    /// Builds an issue for a registered check; the severity comes from the
    /// registry. Unknown check ids are treated as critical so a typo can
    /// never silently downgrade a failure.
    pub fn new(check_id: &str, detail: impl Into<String>) -> Self {
        let severity = check_def(check_id)
            .map(|d| d.severity)
            .unwrap_or(Severity::Critical);
        Self {
            check_id: check_id.to_string(),
            severity,
            page: None,
            detail: detail.into(),
            measured: None,
            expected: None,
        }
    }

    pub fn on_page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_band(mut self, measured: f64, expected: f64) -> Self {
        self.measured = Some(measured);
        self.expected = Some(expected);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDigest {
    pub path: String,
    pub bytes: usize,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaReport {
    pub contract: String,
    pub contract_version: String,
    pub profile: QaProfile,
    pub attempt: usize,
    pub passed: bool,
    pub issues: Vec<Issue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactDigest>,
}

impl QaReport {
    pub fn from_issues(profile: QaProfile, attempt: usize, issues: Vec<Issue>) -> Self {
        let passed = evaluate(profile, &issues);
        Self {
            contract: CONTRACT_ID.to_string(),
            contract_version: CONTRACT_VERSION.to_string(),
            profile,
            attempt,
            passed,
            issues,
            artifact: None,
        }
    }

    pub fn with_artifact(mut self, path: impl Into<String>, bytes: &[u8]) -> Self {
        self.artifact = Some(ArtifactDigest {
            path: path.into(),
            bytes: bytes.len(),
            sha256: hex_sha256(bytes),
        });
        self
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("qa report serializes")
    }
}

/// Gate policy. Strict gates on any issue at all; lenient absorbs a small
/// minor budget but never a major or critical.
pub fn evaluate(profile: QaProfile, issues: &[Issue]) -> bool {
    match profile {
        QaProfile::Strict => issues.is_empty(),
        QaProfile::Lenient => {
            let minor = issues
                .iter()
                .filter(|i| i.severity == Severity::Minor)
                .count();
            let gating = issues.len() - minor;
            gating == 0 && minor <= LENIENT_MINOR_BUDGET
        }
    }
}

pub fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

static CONTRACT_FINGERPRINT: OnceLock<String> = OnceLock::new();

/// Stable digest over the registry so reports can state which check set
/// produced them.
pub fn contract_fingerprint_sha256() -> String {
    CONTRACT_FINGERPRINT
        .get_or_init(|| {
            let mut hasher = Sha256::new();
            hasher.update(CONTRACT_ID.as_bytes());
            hasher.update(b"\n");
            hasher.update(CONTRACT_VERSION.as_bytes());
            for def in &CHECKS_V1 {
                hasher.update(b"\n");
                hasher.update(def.id.as_bytes());
                hasher.update(b"|");
                hasher.update(def.category.as_bytes());
                hasher.update(b"|");
                hasher.update(def.severity.as_str().as_bytes());
                hasher.update(b"|");
                hasher.update(def.stage.as_str().as_bytes());
            }
            let digest = hasher.finalize();
            let mut out = String::with_capacity(digest.len() * 2);
            for b in digest {
                use std::fmt::Write;
                let _ = write!(&mut out, "{:02x}", b);
            }
            out
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minor(n: usize) -> Vec<Issue> {
        (0..n)
            .map(|i| Issue::new("gp.layout.orphan_tail", format!("orphan {i}")))
            .collect()
    }

    #[test]
    fn category_weights_sum_to_100() {
        let sum: f64 = check_category_defs_v1().iter().map(|c| c.weight).sum();
        assert!((sum - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn every_check_references_a_known_category() {
        let ids: Vec<&str> = check_category_defs_v1().iter().map(|c| c.id).collect();
        for def in check_defs_v1() {
            assert!(ids.contains(&def.category), "unknown category for {}", def.id);
        }
    }

    #[test]
    fn check_ids_are_unique() {
        let mut seen = std::collections::BTreeSet::new();
        for def in check_defs_v1() {
            assert!(seen.insert(def.id), "duplicate check id {}", def.id);
        }
    }

    #[test]
    fn strict_gates_on_any_issue() {
        assert!(evaluate(QaProfile::Strict, &[]));
        assert!(!evaluate(QaProfile::Strict, &minor(1)));
    }

    #[test]
    fn lenient_absorbs_minor_budget_only() {
        assert!(evaluate(QaProfile::Lenient, &minor(LENIENT_MINOR_BUDGET)));
        assert!(!evaluate(QaProfile::Lenient, &minor(LENIENT_MINOR_BUDGET + 1)));

        let mut issues = minor(1);
        issues.push(Issue::new("gp.layout.overflow_none", "box past trim"));
        assert!(!evaluate(QaProfile::Lenient, &issues));
    }

    #[test]
    fn unknown_check_id_is_critical() {
        let issue = Issue::new("gp.bogus.not_registered", "x");
        assert_eq!(issue.severity, Severity::Critical);
        assert!(!evaluate(QaProfile::Lenient, &[issue]));
    }

    #[test]
    fn fingerprint_is_stable_and_nonempty() {
        let a = contract_fingerprint_sha256();
        let b = contract_fingerprint_sha256();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn report_round_trips_through_json() {
        let report = QaReport::from_issues(
            QaProfile::Lenient,
            2,
            vec![Issue::new("gp.layout.margin_band", "left margin 0.31in").on_page(4)],
        )
        .with_artifact("dist/book.pdf", b"%PDF-1.7 fake");
        let json = report.to_json();
        let back: QaReport = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, report);
        assert!(!back.passed, "a major issue gates even under lenient");
    }

    #[test]
    fn report_gate_matches_evaluate() {
        let issues = vec![Issue::new("gp.artifact.pdf_parses", "truncated file")];
        let report = QaReport::from_issues(QaProfile::Lenient, 1, issues.clone());
        assert_eq!(report.passed, evaluate(QaProfile::Lenient, &issues));
        assert!(!report.passed);
    }
}
