use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

use crate::enrollment::EnrollmentIndex;
use crate::models::{AttendanceStatus, AttendanceWrite};
use crate::snapshot::Snapshot;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    #[error("unknown class {0}")]
    UnknownClass(String),
    #[error("class {0} is disabled")]
    ClassDisabled(String),
    #[error("{date} is a holiday ({name}), attendance cannot be marked")]
    Holiday { date: NaiveDate, name: String },
    #[error("class {class_id} does not meet on {date} ({weekday})")]
    NotScheduled {
        class_id: String,
        date: NaiveDate,
        weekday: Weekday,
    },
    #[error("attendance for {date} could only be edited until {closed_at}")]
    EditWindowClosed {
        date: NaiveDate,
        closed_at: NaiveDateTime,
    },
    #[error("student {0} is not on this register")]
    NotOnRegister(String),
    #[error("student {0} is listed as both absent and late")]
    ConflictingMarks(String),
    #[error("no active students are enrolled in this class")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterLine {
    pub student_id: String,
    pub student_name: String,
    pub status: AttendanceStatus,
}

/// The attendance sheet for one class on one date.
#[derive(Debug, Clone)]
pub struct Register {
    pub class_id: String,
    pub class_name: String,
    pub date: NaiveDate,
    pub lines: Vec<RegisterLine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub writes: Vec<AttendanceWrite>,
    pub absent_names: Vec<String>,
}

/// Marking stays open until `edit_window_hours` past the end of the day.
pub fn edit_window_closes(date: NaiveDate, edit_window_hours: i64) -> NaiveDateTime {
    (date + Duration::days(1)).and_time(NaiveTime::MIN) + Duration::hours(edit_window_hours)
}

impl Register {
    /// Lists the class's active students with their recorded status for the
    /// date, defaulting to `Present` where nothing is recorded yet.
    pub fn open(
        snapshot: &Snapshot,
        index: &EnrollmentIndex<'_>,
        class_id: &str,
        date: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<Self, RegisterError> {
        if let Some(holiday) = snapshot.holiday_on(date) {
            return Err(RegisterError::Holiday {
                date,
                name: holiday.name.clone(),
            });
        }

        let class = snapshot
            .classes
            .get(class_id)
            .ok_or_else(|| RegisterError::UnknownClass(class_id.to_string()))?;
        if class.disabled {
            return Err(RegisterError::ClassDisabled(class_id.to_string()));
        }
        if !class.runs_on(date) {
            return Err(RegisterError::NotScheduled {
                class_id: class_id.to_string(),
                date,
                weekday: date.weekday(),
            });
        }

        let closed_at = edit_window_closes(date, snapshot.settings.edit_window_hours);
        if now > closed_at {
            return Err(RegisterError::EditWindowClosed { date, closed_at });
        }

        let recorded = snapshot
            .attendance
            .get(&date)
            .and_then(|by_class| by_class.get(class_id));
        let lines = index
            .active_students_in(class_id)
            .into_iter()
            .map(|student| RegisterLine {
                student_id: student.id.clone(),
                student_name: student.name.clone(),
                status: recorded
                    .and_then(|entries| entries.get(&student.id))
                    .and_then(|entry| entry.status)
                    .unwrap_or(AttendanceStatus::Present),
            })
            .collect();

        Ok(Register {
            class_id: class.id.clone(),
            class_name: class.name.clone(),
            date,
            lines,
        })
    }

    pub fn mark(&mut self, student_id: &str, status: AttendanceStatus) -> Result<(), RegisterError> {
        let line = self
            .lines
            .iter_mut()
            .find(|line| line.student_id == student_id)
            .ok_or_else(|| RegisterError::NotOnRegister(student_id.to_string()))?;
        line.status = status;
        Ok(())
    }

    /// Marks absentees and late arrivals in one go. Nothing changes when a
    /// student appears in both lists or is not on the register.
    pub fn apply(&mut self, absent: &[String], late: &[String]) -> Result<(), RegisterError> {
        if let Some(both) = absent.iter().find(|id| late.contains(id)) {
            return Err(RegisterError::ConflictingMarks(both.clone()));
        }
        if let Some(stranger) = absent
            .iter()
            .chain(late)
            .find(|id| !self.lines.iter().any(|line| &line.student_id == *id))
        {
            return Err(RegisterError::NotOnRegister(stranger.clone()));
        }

        for id in absent {
            self.mark(id, AttendanceStatus::Absent)?;
        }
        for id in late {
            self.mark(id, AttendanceStatus::Late)?;
        }
        Ok(())
    }

    /// Every line is written, including untouched `Present` defaults.
    pub fn submit(&self, marked_by: &str, timestamp_ms: i64) -> Result<Submission, RegisterError> {
        if self.lines.is_empty() {
            return Err(RegisterError::Empty);
        }

        let writes = self
            .lines
            .iter()
            .map(|line| AttendanceWrite {
                date: self.date,
                class_id: self.class_id.clone(),
                student_id: line.student_id.clone(),
                status: line.status,
                timestamp: timestamp_ms,
                marked_by: marked_by.to_string(),
            })
            .collect();
        let absent_names = self
            .lines
            .iter()
            .filter(|line| line.status == AttendanceStatus::Absent)
            .map(|line| line.student_name.clone())
            .collect();

        Ok(Submission {
            writes,
            absent_names,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // 2026-02-02 is a Monday.
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 2).unwrap()
    }

    fn morning(date: NaiveDate) -> NaiveDateTime {
        date.and_hms_opt(9, 30, 0).unwrap()
    }

    fn snapshot() -> Snapshot {
        Snapshot::from_value(&json!({
            "students": {
                "S1": { "StudentName": "Avery Lee", "classes": { "MATH": {} } },
                "S2": { "StudentName": "Jules Moreno", "ClassID": "MATH" },
                "S3": { "StudentName": "Kiara Patel", "classes": { "MATH": {} }, "disabled": true }
            },
            "classes": {
                "MATH": { "ClassName": "Algebra I", "SubjectName": "Math", "Days": "Mon, Wed" },
                "EMPTY": { "ClassName": "Study Hall", "Days": "Mon" },
                "OLD": { "ClassName": "Retired Elective", "Days": "Mon", "disabled": true }
            },
            "attendance": {
                "2026-02-02": { "MATH": { "S2": { "status": "Late" } } }
            },
            "holidays": { "2026-02-04": { "name": "Founders Day", "date": "2026-02-04" } },
            "settings": { "minAttendance": 75, "editWindow": 24 }
        }))
    }

    #[test]
    fn opens_with_recorded_statuses_and_present_defaults() {
        let snapshot = snapshot();
        let index = EnrollmentIndex::from_snapshot(&snapshot);

        let register = Register::open(&snapshot, &index, "MATH", monday(), morning(monday())).unwrap();
        let statuses: Vec<(&str, AttendanceStatus)> = register
            .lines
            .iter()
            .map(|line| (line.student_id.as_str(), line.status))
            .collect();
        assert_eq!(
            statuses,
            vec![("S1", AttendanceStatus::Present), ("S2", AttendanceStatus::Late)]
        );
    }

    #[test]
    fn refuses_holidays_unscheduled_days_and_unknown_classes() {
        let snapshot = snapshot();
        let index = EnrollmentIndex::from_snapshot(&snapshot);
        let wednesday = NaiveDate::from_ymd_opt(2026, 2, 4).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2026, 2, 3).unwrap();

        let err = Register::open(&snapshot, &index, "MATH", wednesday, morning(wednesday)).unwrap_err();
        assert!(matches!(err, RegisterError::Holiday { ref name, .. } if name == "Founders Day"));

        let err = Register::open(&snapshot, &index, "MATH", tuesday, morning(tuesday)).unwrap_err();
        assert!(matches!(err, RegisterError::NotScheduled { weekday: Weekday::Tue, .. }));

        let err = Register::open(&snapshot, &index, "NOPE", monday(), morning(monday())).unwrap_err();
        assert_eq!(err, RegisterError::UnknownClass("NOPE".to_string()));

        let err = Register::open(&snapshot, &index, "OLD", monday(), morning(monday())).unwrap_err();
        assert_eq!(err, RegisterError::ClassDisabled("OLD".to_string()));
    }

    #[test]
    fn apply_rejects_a_student_both_absent_and_late() {
        let snapshot = snapshot();
        let index = EnrollmentIndex::from_snapshot(&snapshot);
        let mut register = Register::open(&snapshot, &index, "MATH", monday(), morning(monday())).unwrap();
        let ids = |list: &[&str]| list.iter().map(|id| id.to_string()).collect::<Vec<_>>();

        assert_eq!(
            register.apply(&ids(&["S1"]), &ids(&["S1"])),
            Err(RegisterError::ConflictingMarks("S1".to_string()))
        );
        assert_eq!(
            register.apply(&ids(&["S1"]), &ids(&["S3"])),
            Err(RegisterError::NotOnRegister("S3".to_string()))
        );
        assert!(register
            .lines
            .iter()
            .all(|line| line.student_id != "S1" || line.status == AttendanceStatus::Present));

        register.apply(&ids(&["S2"]), &ids(&["S1"])).unwrap();
        let statuses: Vec<AttendanceStatus> = register.lines.iter().map(|line| line.status).collect();
        assert_eq!(statuses, vec![AttendanceStatus::Late, AttendanceStatus::Absent]);
    }

    #[test]
    fn edit_window_closes_hours_after_the_day_ends() {
        let snapshot = snapshot();
        let index = EnrollmentIndex::from_snapshot(&snapshot);
        let closes = edit_window_closes(monday(), 24);
        assert_eq!(
            closes,
            NaiveDate::from_ymd_opt(2026, 2, 4).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );

        assert!(Register::open(&snapshot, &index, "MATH", monday(), closes).is_ok());
        let late = closes + Duration::minutes(1);
        assert!(matches!(
            Register::open(&snapshot, &index, "MATH", monday(), late),
            Err(RegisterError::EditWindowClosed { .. })
        ));
    }

    #[test]
    fn submit_writes_every_line_and_lists_absentees() {
        let snapshot = snapshot();
        let index = EnrollmentIndex::from_snapshot(&snapshot);
        let mut register = Register::open(&snapshot, &index, "MATH", monday(), morning(monday())).unwrap();

        register.mark("S1", AttendanceStatus::Absent).unwrap();
        assert_eq!(
            register.mark("S3", AttendanceStatus::Absent),
            Err(RegisterError::NotOnRegister("S3".to_string()))
        );

        let submission = register.submit("Ms. Rao", 1_770_000_000_000).unwrap();
        assert_eq!(submission.writes.len(), 2);
        assert!(submission
            .writes
            .iter()
            .all(|w| w.marked_by == "Ms. Rao" && w.date == monday() && w.class_id == "MATH"));
        assert_eq!(submission.absent_names, vec!["Avery Lee".to_string()]);
    }

    #[test]
    fn empty_register_cannot_be_submitted() {
        let snapshot = snapshot();
        let index = EnrollmentIndex::from_snapshot(&snapshot);
        let register = Register::open(&snapshot, &index, "EMPTY", monday(), morning(monday())).unwrap();
        assert_eq!(register.submit("Ms. Rao", 0), Err(RegisterError::Empty));
    }
}
