use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::enrollment::EnrollmentIndex;
use crate::models::{
    AttendanceStatus, AttendanceTotals, AttendanceTree, Class, ClassDaySummary, Student,
    StudentAttendance, SubjectSummary,
};
use crate::snapshot::Snapshot;

/// Class id to subject label, for the classes a student is enrolled in now.
pub fn subject_map<'a>(classes: &[&'a Class]) -> BTreeMap<&'a str, &'a str> {
    classes
        .iter()
        .map(|class| (class.id.as_str(), class.subject()))
        .collect()
}

/// One summary per subject in `subjects`, sorted by subject name.
///
/// Buckets come from the current schedule only, so records under classes the
/// student has left are ignored. Records without a recognised status are
/// skipped entirely.
pub fn subject_summaries(
    tree: &AttendanceTree,
    student_id: &str,
    subjects: &BTreeMap<&str, &str>,
) -> Vec<SubjectSummary> {
    let mut buckets: BTreeMap<&str, AttendanceTotals> = subjects
        .values()
        .map(|subject| (*subject, AttendanceTotals::default()))
        .collect();

    for by_class in tree.values() {
        for (class_id, by_student) in by_class {
            let Some(subject) = subjects.get(class_id.as_str()) else {
                continue;
            };
            let Some(status) = by_student.get(student_id).and_then(|entry| entry.status) else {
                continue;
            };
            if let Some(bucket) = buckets.get_mut(subject) {
                bucket.record(status);
            }
        }
    }

    buckets
        .into_iter()
        .map(|(subject, totals)| SubjectSummary::new(subject.to_string(), totals))
        .collect()
}

pub fn overall(subjects: &[SubjectSummary]) -> AttendanceTotals {
    subjects
        .iter()
        .fold(AttendanceTotals::default(), |mut acc, subject| {
            acc.merge(&subject.totals);
            acc
        })
}

pub fn student_attendance(
    snapshot: &Snapshot,
    index: &EnrollmentIndex<'_>,
    student: &Student,
) -> StudentAttendance {
    let subjects = subject_map(index.classes_for(&student.id));
    let summaries = subject_summaries(&snapshot.attendance, &student.id, &subjects);
    let overall = overall(&summaries);

    StudentAttendance {
        student_id: student.id.clone(),
        student_name: student.name.clone(),
        subjects: summaries,
        overall_percentage: overall.percentage(),
        overall,
    }
}

/// Per-class counts for a single date, in class id order.
pub fn class_day(snapshot: &Snapshot, date: NaiveDate) -> Vec<ClassDaySummary> {
    let Some(by_class) = snapshot.attendance.get(&date) else {
        return Vec::new();
    };

    by_class
        .iter()
        .map(|(class_id, by_student)| {
            let mut totals = AttendanceTotals::default();
            let mut absent_students = Vec::new();
            let marked_by = by_student
                .values()
                .filter(|entry| entry.marked_by.is_some())
                .max_by_key(|entry| entry.timestamp.unwrap_or(i64::MIN))
                .and_then(|entry| entry.marked_by.clone());
            for (student_id, entry) in by_student {
                let Some(status) = entry.status else {
                    continue;
                };
                totals.record(status);
                if status == AttendanceStatus::Absent {
                    absent_students.push(student_id.clone());
                }
            }
            ClassDaySummary {
                class_id: class_id.clone(),
                class_name: snapshot
                    .classes
                    .get(class_id)
                    .map(|class| class.name.clone())
                    .unwrap_or_else(|| class_id.clone()),
                totals,
                absent_students,
                marked_by,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttendanceEntry;
    use serde_json::json;

    fn entry(status: AttendanceStatus) -> AttendanceEntry {
        AttendanceEntry {
            status: Some(status),
            timestamp: None,
            marked_by: None,
        }
    }

    fn day(offset: u32) -> String {
        let base = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        (base + chrono::Duration::days(offset as i64)).to_string()
    }

    /// Math: 10 held, 8 present. Science: 5 held, 5 present.
    fn scenario() -> Snapshot {
        let mut attendance = serde_json::Map::new();
        for i in 0..10u32 {
            let status = if i < 8 { "Present" } else { "Absent" };
            let mut classes = json!({ "MATH": { "S1": { "status": status } } });
            if i < 5 {
                classes["SCI"] = json!({ "S1": { "status": "Present" } });
            }
            attendance.insert(day(i), classes);
        }

        Snapshot::from_value(&json!({
            "students": {
                "S1": {
                    "StudentName": "Avery Lee",
                    "classes": { "MATH": { "enrolledOn": "2026-01-01" }, "SCI": {} }
                }
            },
            "classes": {
                "MATH": { "ClassName": "Algebra I", "SubjectName": "Math" },
                "SCI": { "ClassName": "Lab Science", "SubjectName": "Science" }
            },
            "attendance": attendance,
        }))
    }

    fn summarize(snapshot: &Snapshot, student_id: &str) -> StudentAttendance {
        let index = EnrollmentIndex::from_snapshot(snapshot);
        student_attendance(snapshot, &index, &snapshot.students[student_id])
    }

    #[test]
    fn computes_subject_and_overall_percentages() {
        let report = summarize(&scenario(), "S1");

        assert_eq!(report.subjects.len(), 2);
        let math = &report.subjects[0];
        assert_eq!(math.subject_name, "Math");
        assert_eq!((math.totals.total, math.totals.present, math.totals.absent), (10, 8, 2));
        assert!((math.percentage - 80.0).abs() < 1e-9);

        let science = &report.subjects[1];
        assert_eq!(science.subject_name, "Science");
        assert!((science.percentage - 100.0).abs() < 1e-9);

        assert_eq!(report.overall.total, 15);
        assert_eq!(report.overall.present, 13);
        assert!((report.overall_percentage - 13.0 / 15.0 * 100.0).abs() < 1e-9);
        assert_eq!(format!("{:.1}", report.overall_percentage), "86.7");
    }

    #[test]
    fn no_records_reads_as_full_attendance() {
        let mut snapshot = scenario();
        snapshot.attendance.clear();

        let report = summarize(&snapshot, "S1");
        assert_eq!(report.subjects.len(), 2);
        for subject in &report.subjects {
            assert_eq!(subject.totals.total, 0);
            assert_eq!(subject.percentage, 100.0);
        }
        assert_eq!(report.overall_percentage, 100.0);
    }

    #[test]
    fn late_counts_as_present_and_never_as_absent() {
        let mut snapshot = scenario();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        snapshot.attendance.entry(date).or_default().insert(
            "SCI".to_string(),
            [("S1".to_string(), entry(AttendanceStatus::Late))]
                .into_iter()
                .collect(),
        );

        let report = summarize(&snapshot, "S1");
        let science = &report.subjects[1];
        assert_eq!(science.totals.total, 6);
        assert_eq!(science.totals.present, 6);
        assert_eq!(science.totals.late, 1);
        assert_eq!(science.totals.absent, 0);
        for subject in &report.subjects {
            assert!(subject.totals.present + subject.totals.absent <= subject.totals.total);
        }
    }

    #[test]
    fn unrecognised_statuses_and_strangers_do_not_contribute() {
        let mut snapshot = scenario();
        let date = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();
        let by_class = snapshot.attendance.entry(date).or_default();
        by_class.insert(
            "MATH".to_string(),
            [
                (
                    "S1".to_string(),
                    AttendanceEntry {
                        status: None,
                        timestamp: None,
                        marked_by: None,
                    },
                ),
                ("S9".to_string(), entry(AttendanceStatus::Absent)),
            ]
            .into_iter()
            .collect(),
        );
        snapshot
            .attendance
            .entry(NaiveDate::from_ymd_opt(2026, 3, 4).unwrap())
            .or_default();

        let report = summarize(&snapshot, "S1");
        assert_eq!(report.subjects[0].totals.total, 10);
        assert_eq!(report.overall.total, 15);
    }

    #[test]
    fn unenrolled_class_history_is_left_out() {
        let mut snapshot = scenario();
        snapshot
            .students
            .get_mut("S1")
            .unwrap()
            .enrollments
            .remove("MATH");

        let report = summarize(&snapshot, "S1");
        assert_eq!(report.subjects.len(), 1);
        assert_eq!(report.subjects[0].subject_name, "Science");
        assert_eq!(report.overall.total, 5);
        assert!(snapshot.attendance.values().any(|d| d.contains_key("MATH")));
    }

    #[test]
    fn classes_sharing_a_subject_share_a_bucket() {
        let snapshot = Snapshot::from_value(&json!({
            "students": { "S1": { "classes": { "A": {}, "B": {} } } },
            "classes": {
                "A": { "SubjectName": "Math" },
                "B": { "SubjectName": "Math" }
            },
            "attendance": {
                "2026-01-05": { "A": { "S1": "Present" }, "B": { "S1": "Absent" } }
            }
        }));

        let report = summarize(&snapshot, "S1");
        assert_eq!(report.subjects.len(), 1);
        assert_eq!(report.subjects[0].totals.total, 2);
        assert_eq!(report.subjects[0].percentage, 50.0);
    }

    #[test]
    fn recomputation_is_stable() {
        let snapshot = scenario();
        assert_eq!(summarize(&snapshot, "S1"), summarize(&snapshot, "S1"));
    }

    #[test]
    fn another_present_record_raises_the_percentage() {
        let mut snapshot = scenario();
        let before = summarize(&snapshot, "S1").subjects[0].percentage;

        snapshot
            .attendance
            .entry(NaiveDate::from_ymd_opt(2026, 4, 1).unwrap())
            .or_default()
            .insert(
                "MATH".to_string(),
                [("S1".to_string(), entry(AttendanceStatus::Present))]
                    .into_iter()
                    .collect(),
            );

        let after = summarize(&snapshot, "S1").subjects[0].percentage;
        assert!(after > before);
    }

    #[test]
    fn class_day_lists_absentees() {
        let snapshot = scenario();
        let date = NaiveDate::from_ymd_opt(2026, 1, 13).unwrap();

        let summary = class_day(&snapshot, date);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].class_name, "Algebra I");
        assert_eq!(summary[0].totals.absent, 1);
        assert_eq!(summary[0].absent_students, vec!["S1".to_string()]);

        assert!(class_day(&snapshot, NaiveDate::from_ymd_opt(2030, 1, 1).unwrap()).is_empty());
    }
}
