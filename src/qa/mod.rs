//! QA Audit Suite.
//!
//! Runs the six checks in `checks` over one station's dataset and folds the
//! findings into a `QaReport`. The report's `qa_score` feeds the ensemble's
//! contamination rate and is attached to every downstream anomaly.

pub mod checks;

use crate::config::QaPolicy;
use crate::ingest::StationDataset;
use crate::logging::{self, Component};
use serde::{Deserialize, Serialize};

/// Points deducted from the QA score per finding.
pub const PENALTY_PER_ISSUE: f64 = 10.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QaReport {
    pub format_issues: Vec<String>,
    pub physical_limit_issues: Vec<String>,
    pub climatological_issues: Vec<String>,
    pub persistence_issues: Vec<String>,
    pub consistency_issues: Vec<String>,
    pub neighbor_issues: Vec<String>,
    pub total_issues: usize,
    /// `max(0, 100 - 10 * total_issues)`.
    pub qa_score: f64,
}

impl QaReport {
    /// Builds a report from per-category findings, computing the totals.
    pub fn from_findings(
        format_issues: Vec<String>,
        physical_limit_issues: Vec<String>,
        climatological_issues: Vec<String>,
        persistence_issues: Vec<String>,
        consistency_issues: Vec<String>,
        neighbor_issues: Vec<String>,
    ) -> Self {
        let mut report = QaReport {
            format_issues,
            physical_limit_issues,
            climatological_issues,
            persistence_issues,
            consistency_issues,
            neighbor_issues,
            total_issues: 0,
            qa_score: 100.0,
        };
        let total: usize = report.categories().iter().map(|(_, f)| f.len()).sum();
        report.total_issues = total;
        report.qa_score = (100.0 - PENALTY_PER_ISSUE * total as f64).max(0.0);
        report
    }

    /// Findings by category, in audit order.
    pub fn categories(&self) -> [(&'static str, &Vec<String>); 6] {
        [
            ("Format Issues", &self.format_issues),
            ("Physical Limits", &self.physical_limit_issues),
            ("Climatological Limits", &self.climatological_issues),
            ("Temporal Persistence", &self.persistence_issues),
            ("Internal Consistency", &self.consistency_issues),
            ("Neighbor Comparison", &self.neighbor_issues),
        ]
    }

    pub fn is_clean(&self) -> bool {
        self.total_issues == 0
    }

    /// Plain-text report listing every non-empty category.
    pub fn render(&self) -> String {
        let rule = "=".repeat(60);
        let mut lines = vec![
            rule.clone(),
            "GHCN-DAILY QUALITY ASSURANCE REPORT".to_string(),
            rule.clone(),
            String::new(),
            format!("Overall QA Score: {:.0}/100", self.qa_score),
            format!("Total Issues Detected: {}", self.total_issues),
        ];

        if self.is_clean() {
            lines.push(String::new());
            lines.push("No issues detected.".to_string());
        } else {
            lines.push(String::new());
            lines.push("Detailed QA Results:".to_string());
            for (label, findings) in self.categories() {
                if findings.is_empty() {
                    continue;
                }
                lines.push(String::new());
                lines.push(format!("{}:", label.to_uppercase()));
                lines.extend(findings.iter().map(|f| format!("  - {}", f)));
            }
        }

        lines.push(String::new());
        lines.push(rule);
        lines.join("\n")
    }
}

/// Runs all six checks. `neighbors` may be empty.
pub fn run_audit(dataset: &StationDataset, neighbors: &[StationDataset], policy: &QaPolicy) -> QaReport {
    let report = QaReport::from_findings(
        checks::format_check(dataset, policy),
        checks::physical_limits_check(dataset, policy),
        checks::climatological_check(dataset, policy),
        checks::persistence_check(dataset, policy),
        checks::consistency_check(dataset, policy),
        checks::neighbor_check(dataset, neighbors, policy),
    );

    let station = dataset.station_id.as_deref();
    if report.is_clean() {
        logging::info(Component::Qa, station, "QA audit clean (score 100/100)");
    } else {
        logging::warn(
            Component::Qa,
            station,
            &format!("QA audit found {} issues (score {:.0}/100)", report.total_issues, report.qa_score),
        );
        for (label, findings) in report.categories() {
            for finding in findings {
                logging::debug(Component::Qa, station, &format!("{}: {}", label, finding));
            }
        }
    }
    report
}
