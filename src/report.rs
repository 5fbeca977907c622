use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::AttendanceTotals;
use crate::risk::{self, RosterReport, Standing};

/// One decimal place, for display only.
pub fn display_pct(percentage: f64) -> String {
    format!("{percentage:.1}%")
}

fn counts(totals: &AttendanceTotals) -> String {
    format!(
        "{}/{} attended ({} late, {} absent)",
        totals.present, totals.total, totals.late, totals.absent
    )
}

pub fn build_report(generated_on: NaiveDate, roster: &RosterReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Attendance Report");
    let _ = writeln!(
        output,
        "Generated {} (minimum attendance {}%)",
        generated_on, roster.threshold
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Standing");
    let _ = writeln!(output, "- Active students: {}", roster.rows.len());
    let _ = writeln!(output, "- Good: {}", roster.good);
    let _ = writeln!(output, "- At Risk: {}", roster.at_risk);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Students At Risk");

    let at_risk: Vec<_> = roster
        .rows
        .iter()
        .filter(|row| row.standing == Standing::AtRisk)
        .collect();
    if at_risk.is_empty() {
        let _ = writeln!(output, "No students below the minimum.");
    }
    for row in &at_risk {
        let student = &row.attendance;
        let _ = writeln!(
            output,
            "### {} ({}) {}",
            student.student_name,
            student.student_id,
            display_pct(student.overall_percentage)
        );
        let _ = writeln!(output, "Overall: {}", counts(&student.overall));
        for (subject, standing) in risk::subject_standings(student, roster.threshold) {
            let _ = writeln!(
                output,
                "- {}: {} {}, {}",
                subject.subject_name,
                display_pct(subject.percentage),
                standing,
                counts(&subject.totals)
            );
        }
        let _ = writeln!(output);
    }

    let _ = writeln!(output, "## All Students");
    if roster.rows.is_empty() {
        let _ = writeln!(output, "No active students on the roster.");
    }
    for row in &roster.rows {
        let student = &row.attendance;
        // Nothing held yet shows as 100% but is not a measured result.
        let note = if student.overall.total == 0 {
            " (no classes held yet)"
        } else {
            ""
        };
        let _ = writeln!(
            output,
            "- {} ({}): {} {}{}",
            student.student_name,
            student.student_id,
            display_pct(student.overall_percentage),
            row.standing,
            note
        );
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Snapshot;
    use serde_json::json;

    fn roster() -> RosterReport {
        let snapshot = Snapshot::from_value(&json!({
            "students": {
                "S1": { "StudentName": "Avery Lee", "classes": { "MATH": {} } },
                "S2": { "StudentName": "Jules Moreno", "classes": { "MATH": {} } },
                "S3": { "StudentName": "Kiara Patel" }
            },
            "classes": { "MATH": { "SubjectName": "Math" } },
            "attendance": {
                "2026-02-02": { "MATH": { "S1": "Present", "S2": "Absent" } },
                "2026-02-04": { "MATH": { "S1": "Late", "S2": "Present" } },
                "2026-02-06": { "MATH": { "S1": "Present", "S2": "Absent" } }
            }
        }));
        risk::roster_report(&snapshot)
    }

    #[test]
    fn rounds_only_for_display() {
        assert_eq!(display_pct(200.0 / 3.0), "66.7%");
        assert_eq!(display_pct(100.0), "100.0%");
    }

    #[test]
    fn report_lists_at_risk_students_with_subject_breakdown() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 9).unwrap();
        let report = build_report(date, &roster());

        assert!(report.contains("Generated 2026-02-09 (minimum attendance 75%)"));
        assert!(report.contains("- At Risk: 1"));
        assert!(report.contains("### Jules Moreno (S2) 33.3%"));
        assert!(report.contains("- Math: 33.3% At Risk, 1/3 attended (0 late, 2 absent)"));
        assert!(report.contains("- Avery Lee (S1): 100.0% Good"));
        assert!(report.contains("- Kiara Patel (S3): 100.0% Good (no classes held yet)"));
    }
}
