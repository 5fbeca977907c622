use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime, Weekday};
use serde_json::{Map, Value};

use crate::models::{
    AttendanceEntry, AttendanceStatus, AttendanceTree, Class, Enrollment, EnrollmentOrigin,
    GuardianContact, Holiday, Schedule, Settings, Student,
};

/// Everything the aggregation pipeline reads, taken from one delivery of the
/// record store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub students: BTreeMap<String, Student>,
    pub classes: BTreeMap<String, Class>,
    pub attendance: AttendanceTree,
    pub settings: Settings,
    pub holidays: BTreeMap<NaiveDate, Holiday>,
}

impl Snapshot {
    /// Parses a record-store document tree. Records that cannot be read are
    /// skipped rather than reported.
    pub fn from_value(root: &Value) -> Self {
        let mut snapshot = Snapshot::default();

        for (key, record) in entries(root.get("students")) {
            match parse_student(&key, record) {
                Some(student) => {
                    snapshot.students.insert(student.id.clone(), student);
                }
                None => tracing::debug!(key = %key, "skipping unreadable student record"),
            }
        }

        for (key, record) in entries(root.get("classes")) {
            match parse_class(&key, record) {
                Some(class) => {
                    snapshot.classes.insert(class.id.clone(), class);
                }
                None => tracing::debug!(key = %key, "skipping unreadable class record"),
            }
        }

        snapshot.attendance = parse_attendance(root.get("attendance"));
        snapshot.settings = parse_settings(root.get("settings"));

        for (key, record) in entries(root.get("holidays")) {
            let Some(date) = parse_date(&key) else {
                tracing::debug!(key = %key, "skipping holiday with unreadable date");
                continue;
            };
            let name = record
                .as_object()
                .and_then(|obj| text(obj, "name"))
                .unwrap_or_else(|| "Holiday".to_string());
            snapshot.holidays.insert(date, Holiday { date, name });
        }

        snapshot
    }

    pub fn holiday_on(&self, date: NaiveDate) -> Option<&Holiday> {
        self.holidays.get(&date)
    }
}

/// Collections arrive either as objects keyed by id or, when every key is
/// numeric, as arrays with null holes.
fn entries(value: Option<&Value>) -> Vec<(String, &Value)> {
    match value {
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Vec::new(),
    }
}

/// Spreadsheet uploads leave numeric ids, so numbers are read as text too.
pub fn text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// The id a collection record is known by: its own id field when it has one,
/// otherwise the key it is stored under.
pub fn record_id(key: &str, record: &Value, id_field: &str) -> Option<String> {
    let obj = record.as_object()?;
    let id = text(obj, id_field).unwrap_or_else(|| key.trim().to_string());
    (!id.is_empty()).then_some(id)
}

fn flag(obj: &Map<String, Value>, key: &str) -> bool {
    obj.get(key).and_then(Value::as_bool).unwrap_or(false)
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

pub fn parse_clock(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

/// Reads weekday tokens such as `"Mon, Wed"` or `"monday tuesday"`.
/// Unknown tokens are dropped.
pub fn parse_days(raw: &str) -> Vec<Weekday> {
    let mut days: Vec<Weekday> = raw
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter_map(|token| {
            let token = token.trim().to_lowercase();
            match token.get(..3)? {
                "mon" => Some(Weekday::Mon),
                "tue" => Some(Weekday::Tue),
                "wed" => Some(Weekday::Wed),
                "thu" => Some(Weekday::Thu),
                "fri" => Some(Weekday::Fri),
                "sat" => Some(Weekday::Sat),
                "sun" => Some(Weekday::Sun),
                _ => None,
            }
        })
        .collect();
    days.sort_by_key(|day| day.num_days_from_monday());
    days.dedup();
    days
}

pub fn format_days(days: &[Weekday]) -> String {
    days.iter()
        .map(|day| day.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_student(key: &str, record: &Value) -> Option<Student> {
    let id = record_id(key, record, "StudentID")?;
    let obj = record.as_object()?;

    let mut enrollments = BTreeMap::new();
    if let Some(class_id) = text(obj, "ClassID") {
        enrollments.insert(
            class_id,
            Enrollment {
                enrolled_on: None,
                origin: EnrollmentOrigin::Legacy,
            },
        );
    }
    if let Some(classes) = obj.get("classes").and_then(Value::as_object) {
        for (class_id, meta) in classes {
            if meta.is_null() || meta == &Value::Bool(false) {
                continue;
            }
            let enrolled_on = meta
                .get("enrolledOn")
                .and_then(Value::as_str)
                .and_then(parse_date);
            enrollments.insert(
                class_id.clone(),
                Enrollment {
                    enrolled_on,
                    origin: EnrollmentOrigin::Mapping,
                },
            );
        }
    }

    Some(Student {
        name: text(obj, "StudentName").unwrap_or_else(|| "N/A".to_string()),
        contact: GuardianContact {
            father_name: text(obj, "FatherName").unwrap_or_default(),
            mother_name: text(obj, "MotherName").unwrap_or_default(),
            student_phone: text(obj, "StudentPhoneNumber").unwrap_or_default(),
            parent_phone: text(obj, "ParentPhoneNumber").unwrap_or_default(),
            student_email: text(obj, "StudentEmail").unwrap_or_default(),
            parent_email: text(obj, "ParentEmail").unwrap_or_default(),
        },
        enrollments,
        disabled: flag(obj, "disabled"),
        id,
    })
}

fn parse_class(key: &str, record: &Value) -> Option<Class> {
    let id = record_id(key, record, "ClassID")?;
    let obj = record.as_object()?;

    let start_date = text(obj, "StartDate").as_deref().and_then(parse_date);
    let end_date = text(obj, "EndDate").as_deref().and_then(parse_date);
    let validity = match (start_date, end_date) {
        (Some(start), Some(end)) => Some((start, end)),
        (None, None) => None,
        _ => {
            tracing::warn!(class = %id, "ignoring one-sided validity range");
            None
        }
    };

    Some(Class {
        name: text(obj, "ClassName").unwrap_or_else(|| id.clone()),
        subject_name: text(obj, "SubjectName"),
        teacher_id: text(obj, "TeacherID"),
        schedule: Schedule {
            days: text(obj, "Days").as_deref().map(parse_days).unwrap_or_default(),
            start_time: text(obj, "StartTime").as_deref().and_then(parse_clock),
            end_time: text(obj, "EndTime").as_deref().and_then(parse_clock),
            validity,
        },
        disabled: flag(obj, "disabled"),
        id,
    })
}

fn parse_entry(record: &Value) -> Option<AttendanceEntry> {
    match record {
        Value::String(status) => Some(AttendanceEntry {
            status: AttendanceStatus::parse(status),
            timestamp: None,
            marked_by: None,
        }),
        Value::Object(obj) => Some(AttendanceEntry {
            status: obj
                .get("status")
                .and_then(Value::as_str)
                .and_then(AttendanceStatus::parse),
            timestamp: obj.get("timestamp").and_then(Value::as_i64),
            marked_by: text(obj, "markedBy"),
        }),
        _ => None,
    }
}

fn parse_attendance(value: Option<&Value>) -> AttendanceTree {
    let mut tree = AttendanceTree::new();

    for (date_key, by_class) in entries(value) {
        let Some(date) = parse_date(&date_key) else {
            tracing::debug!(key = %date_key, "skipping attendance under unreadable date");
            continue;
        };
        let Some(by_class) = by_class.as_object() else {
            continue;
        };

        let day = tree.entry(date).or_default();
        for (class_id, by_student) in by_class {
            let Some(by_student) = by_student.as_object() else {
                continue;
            };
            let class_entries = day.entry(class_id.clone()).or_default();
            for (student_id, record) in by_student {
                if let Some(entry) = parse_entry(record) {
                    class_entries.insert(student_id.clone(), entry);
                }
            }
        }
    }

    tree
}

fn parse_settings(value: Option<&Value>) -> Settings {
    let mut settings = Settings::default();
    let Some(obj) = value.and_then(Value::as_object) else {
        return settings;
    };

    if let Some(raw) = obj.get("minAttendance").and_then(number) {
        let clamped = raw.clamp(0.0, 100.0);
        if clamped != raw {
            tracing::warn!(value = raw, "minAttendance outside 0..=100, clamping");
        }
        if clamped.fract() != 0.0 {
            tracing::warn!(value = raw, "fractional minAttendance, truncating");
        }
        settings.min_attendance = clamped.trunc() as u8;
    }
    if let Some(raw) = obj.get("editWindow").and_then(number) {
        settings.edit_window_hours = raw.max(0.0).round() as i64;
    }

    settings
}

/// Settings forms store numbers, but older writes stored strings.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn folds_legacy_class_id_into_enrollments() {
        let root = json!({
            "students": {
                "S1": { "StudentID": "S1", "StudentName": "Avery Lee", "ClassID": "C1" },
                "S2": {
                    "StudentName": "Jules Moreno",
                    "classes": { "C2": { "enrolledOn": "2026-01-05" } }
                }
            }
        });

        let snapshot = Snapshot::from_value(&root);
        let avery = &snapshot.students["S1"];
        assert_eq!(avery.enrollments["C1"].origin, EnrollmentOrigin::Legacy);

        let jules = &snapshot.students["S2"];
        assert_eq!(jules.id, "S2");
        assert_eq!(
            jules.enrollments["C2"].enrolled_on,
            NaiveDate::from_ymd_opt(2026, 1, 5)
        );
        assert_eq!(jules.enrollments["C2"].origin, EnrollmentOrigin::Mapping);
    }

    #[test]
    fn reads_bare_status_strings_and_keeps_unknown_statuses() {
        let root = json!({
            "attendance": {
                "2026-02-02": {
                    "C1": {
                        "S1": "Late",
                        "S2": { "status": "Excused", "markedBy": "Ms. Rao" },
                        "S3": 42
                    }
                },
                "not-a-date": { "C1": { "S1": "Present" } }
            }
        });

        let snapshot = Snapshot::from_value(&root);
        assert_eq!(snapshot.attendance.len(), 1);
        let day = &snapshot.attendance[&NaiveDate::from_ymd_opt(2026, 2, 2).unwrap()];
        assert_eq!(day["C1"]["S1"].status, Some(AttendanceStatus::Late));
        assert_eq!(day["C1"]["S2"].status, None);
        assert_eq!(day["C1"]["S2"].marked_by.as_deref(), Some("Ms. Rao"));
        assert!(!day["C1"].contains_key("S3"));
    }

    #[test]
    fn clamps_threshold_and_defaults_missing_settings() {
        let snapshot = Snapshot::from_value(&json!({ "settings": { "minAttendance": 140 } }));
        assert_eq!(snapshot.settings.min_attendance, 100);
        assert_eq!(snapshot.settings.edit_window_hours, 24);

        let snapshot = Snapshot::from_value(&json!({}));
        assert_eq!(snapshot.settings, Settings::default());
    }

    #[test]
    fn fractional_threshold_is_never_raised() {
        let snapshot = Snapshot::from_value(&json!({ "settings": { "minAttendance": 74.5 } }));
        assert_eq!(snapshot.settings.min_attendance, 74);

        let snapshot = Snapshot::from_value(&json!({ "settings": { "minAttendance": "99.9" } }));
        assert_eq!(snapshot.settings.min_attendance, 99);
    }

    #[test]
    fn record_id_prefers_the_id_field_over_the_key() {
        assert_eq!(
            record_id("k-1", &json!({ "StudentID": 1001 }), "StudentID").as_deref(),
            Some("1001")
        );
        assert_eq!(record_id("S7", &json!({}), "StudentID").as_deref(), Some("S7"));
        assert_eq!(record_id("S7", &json!("junk"), "StudentID"), None);
        assert_eq!(record_id(" ", &json!({}), "StudentID"), None);
    }

    #[test]
    fn drops_one_sided_validity_range() {
        let root = json!({
            "classes": [
                null,
                {
                    "ClassName": "Algebra I",
                    "SubjectName": "Math",
                    "Days": "Mon, Wed",
                    "StartTime": "09:00",
                    "EndTime": "09:45",
                    "StartDate": "2026-01-05"
                }
            ]
        });

        let snapshot = Snapshot::from_value(&root);
        let class = &snapshot.classes["1"];
        assert_eq!(class.schedule.validity, None);
        assert_eq!(class.schedule.days, vec![Weekday::Mon, Weekday::Wed]);
        assert_eq!(class.subject(), "Math");
    }

    #[test]
    fn parses_weekday_tokens_loosely() {
        assert_eq!(
            parse_days("friday, Mon mon,  tue,,xyz"),
            vec![Weekday::Mon, Weekday::Tue, Weekday::Fri]
        );
        assert_eq!(format_days(&parse_days("Wed,Mon")), "Mon, Wed");
    }
}
