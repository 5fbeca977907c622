use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

use crate::attendance;
use crate::enrollment::EnrollmentIndex;
use crate::models::{StudentAttendance, SubjectSummary};
use crate::snapshot::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Standing {
    Good,
    #[serde(rename = "At Risk")]
    AtRisk,
}

impl fmt::Display for Standing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Standing::Good => f.write_str("Good"),
            Standing::AtRisk => f.write_str("At Risk"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("minimum attendance must be between 0 and 100, got {0}")]
    ThresholdOutOfRange(i64),
    #[error("edit window must not be negative, got {0} hours")]
    NegativeEditWindow(i64),
}

/// Meeting the threshold exactly counts as good standing.
pub fn classify(percentage: f64, threshold: u8) -> Standing {
    if percentage >= f64::from(threshold) {
        Standing::Good
    } else {
        Standing::AtRisk
    }
}

pub fn validate_threshold(value: i64) -> Result<u8, SettingsError> {
    u8::try_from(value)
        .ok()
        .filter(|v| *v <= 100)
        .ok_or(SettingsError::ThresholdOutOfRange(value))
}

pub fn validate_edit_window(hours: i64) -> Result<i64, SettingsError> {
    if hours < 0 {
        return Err(SettingsError::NegativeEditWindow(hours));
    }
    Ok(hours)
}

pub fn subject_standings(
    report: &StudentAttendance,
    threshold: u8,
) -> Vec<(&SubjectSummary, Standing)> {
    report
        .subjects
        .iter()
        .map(|subject| (subject, classify(subject.percentage, threshold)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RosterRow {
    #[serde(flatten)]
    pub attendance: StudentAttendance,
    pub standing: Standing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RosterReport {
    pub threshold: u8,
    pub good: usize,
    pub at_risk: usize,
    pub rows: Vec<RosterRow>,
}

/// Overall standing for every active student, at-risk students first and
/// lowest attendance first within each group.
pub fn roster_report(snapshot: &Snapshot) -> RosterReport {
    let threshold = snapshot.settings.min_attendance;
    let index = EnrollmentIndex::from_snapshot(snapshot);

    let mut rows: Vec<RosterRow> = snapshot
        .students
        .values()
        .filter(|student| !student.disabled)
        .map(|student| {
            let attendance = attendance::student_attendance(snapshot, &index, student);
            let standing = classify(attendance.overall_percentage, threshold);
            RosterRow {
                attendance,
                standing,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        let rank = |row: &RosterRow| (row.standing == Standing::Good) as u8;
        rank(a)
            .cmp(&rank(b))
            .then(
                a.attendance
                    .overall_percentage
                    .partial_cmp(&b.attendance.overall_percentage)
                    .unwrap_or(Ordering::Equal),
            )
            .then_with(|| a.attendance.student_name.cmp(&b.attendance.student_name))
    });

    let at_risk = rows
        .iter()
        .filter(|row| row.standing == Standing::AtRisk)
        .count();

    RosterReport {
        threshold,
        good: rows.len() - at_risk,
        at_risk,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scenario(threshold: u8) -> Snapshot {
        let mut attendance = serde_json::Map::new();
        for day in 1..=10u32 {
            let math = if day <= 8 { "Present" } else { "Absent" };
            let mut classes = json!({ "MATH": { "S1": math, "S2": "Absent" } });
            if day <= 5 {
                classes["SCI"] = json!({ "S1": "Present" });
            }
            attendance.insert(format!("2026-02-{day:02}"), classes);
        }

        Snapshot::from_value(&json!({
            "students": {
                "S1": { "StudentName": "Avery Lee", "classes": { "MATH": {}, "SCI": {} } },
                "S2": { "StudentName": "Jules Moreno", "ClassID": "MATH" },
                "S3": { "StudentName": "Kiara Patel", "classes": { "SCI": {} } },
                "S4": { "StudentName": "Remy Ortiz", "classes": { "MATH": {} }, "disabled": true }
            },
            "classes": {
                "MATH": { "SubjectName": "Math" },
                "SCI": { "SubjectName": "Science" }
            },
            "attendance": attendance,
            "settings": { "minAttendance": threshold }
        }))
    }

    #[test]
    fn threshold_is_inclusive() {
        assert_eq!(classify(75.0, 75), Standing::Good);
        assert_eq!(classify(74.999, 75), Standing::AtRisk);
        assert_eq!(classify(100.0, 100), Standing::Good);
        assert_eq!(classify(0.0, 0), Standing::Good);
    }

    #[test]
    fn validates_threshold_range() {
        assert_eq!(validate_threshold(0).unwrap(), 0);
        assert_eq!(validate_threshold(100).unwrap(), 100);
        assert!(matches!(
            validate_threshold(101),
            Err(SettingsError::ThresholdOutOfRange(101))
        ));
        assert!(validate_threshold(-5).is_err());
        assert!(validate_edit_window(-1).is_err());
    }

    #[test]
    fn subject_and_overall_standings_are_independent() {
        let snapshot = scenario(85);
        let report = roster_report(&snapshot);
        let avery = report
            .rows
            .iter()
            .find(|row| row.attendance.student_id == "S1")
            .unwrap();

        assert_eq!(avery.standing, Standing::Good);
        let subjects = subject_standings(&avery.attendance, 85);
        assert_eq!(subjects[0].0.subject_name, "Math");
        assert_eq!(subjects[0].1, Standing::AtRisk);
        assert_eq!(subjects[1].1, Standing::Good);

        let subjects = subject_standings(&avery.attendance, 75);
        assert!(subjects.iter().all(|(_, standing)| *standing == Standing::Good));
    }

    #[test]
    fn roster_counts_active_students_and_puts_risk_first() {
        let report = roster_report(&scenario(75));

        assert_eq!(report.threshold, 75);
        assert_eq!(report.rows.len(), 3);
        assert_eq!(report.at_risk, 1);
        assert_eq!(report.good, 2);

        let first = &report.rows[0];
        assert_eq!(first.attendance.student_name, "Jules Moreno");
        assert_eq!(first.standing, Standing::AtRisk);
        assert_eq!(first.attendance.overall_percentage, 0.0);

        let kiara = report
            .rows
            .iter()
            .find(|row| row.attendance.student_id == "S3")
            .unwrap();
        assert_eq!(kiara.attendance.overall.total, 0);
        assert_eq!(kiara.standing, Standing::Good);
    }

    #[test]
    fn standing_serializes_with_display_label() {
        let value = serde_json::to_value(Standing::AtRisk).unwrap();
        assert_eq!(value, json!("At Risk"));
    }
}
