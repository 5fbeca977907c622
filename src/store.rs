use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::StoreConfig;
use crate::db;
use crate::models::{
    AttendanceStatus, AttendanceWrite, Class, GuardianContact, Holiday, Settings, StudentProfile,
};
use crate::schedule::ClassDraft;
use crate::snapshot::{self, format_days, Snapshot};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record store unavailable")]
    Unavailable(#[source] BoxError),
    #[error("record store write failed")]
    WriteFailed(#[source] BoxError),
    #[error("record store file {path} is not valid JSON")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0} is only supported by the Postgres store")]
    Unsupported(&'static str),
}

impl StoreError {
    fn unavailable(err: impl Into<BoxError>) -> Self {
        StoreError::Unavailable(err.into())
    }

    fn write_failed(err: impl Into<BoxError>) -> Self {
        StoreError::WriteFailed(err.into())
    }
}

/// The record store the pipeline reads snapshots from and writes edits to.
pub enum Store {
    File(JsonFileStore),
    Postgres(PgPool),
}

impl Store {
    pub async fn connect(config: &StoreConfig) -> anyhow::Result<Self> {
        match config {
            StoreConfig::File(path) => Ok(Store::File(JsonFileStore::new(path))),
            StoreConfig::Postgres {
                url,
                max_connections,
            } => {
                let pool = PgPoolOptions::new()
                    .max_connections(*max_connections)
                    .connect(url)
                    .await
                    .context("failed to connect to Postgres")?;
                Ok(Store::Postgres(pool))
            }
        }
    }

    pub async fn init(&self) -> Result<(), StoreError> {
        match self {
            Store::File(_) => Err(StoreError::Unsupported("init-db")),
            Store::Postgres(pool) => db::init_db(pool).await.map_err(StoreError::write_failed),
        }
    }

    pub async fn load_snapshot(&self) -> Result<Snapshot, StoreError> {
        match self {
            Store::File(file) => file.load_snapshot().await,
            Store::Postgres(pool) => db::load_snapshot(pool)
                .await
                .map_err(StoreError::unavailable),
        }
    }

    pub async fn upsert_students(&self, profiles: &[StudentProfile]) -> Result<usize, StoreError> {
        let written = match self {
            Store::File(file) => {
                file.update(|tree| {
                    for profile in profiles {
                        let node = record_mut(tree, "students", &profile.id, "StudentID");
                        for (key, value) in profile_fields(profile) {
                            node.insert(key.to_string(), Value::String(value));
                        }
                        node.entry("disabled").or_insert(Value::Bool(false));
                    }
                })
                .await?;
                profiles.len()
            }
            Store::Postgres(pool) => db::upsert_students(pool, profiles)
                .await
                .map_err(StoreError::write_failed)?,
        };
        tracing::info!(count = written, "upserted students");
        Ok(written)
    }

    pub async fn upsert_class(&self, class: &Class) -> Result<(), StoreError> {
        match self {
            Store::File(file) => {
                file.update(|tree| {
                    let node = record_mut(tree, "classes", &class.id, "ClassID");
                    node.clear();
                    node.extend(class_fields(class));
                })
                .await?
            }
            Store::Postgres(pool) => db::upsert_class(pool, class)
                .await
                .map_err(StoreError::write_failed)?,
        }
        tracing::info!(class = %class.id, name = %class.name, "saved class");
        Ok(())
    }

    pub async fn enroll(
        &self,
        student_ids: &[String],
        class_id: &str,
        enrolled_on: NaiveDate,
    ) -> Result<(), StoreError> {
        match self {
            Store::File(file) => {
                file.update(|tree| {
                    for student_id in student_ids {
                        let student = record_mut(tree, "students", student_id, "StudentID");
                        let node = as_object(student.entry("classes").or_insert(Value::Null));
                        node.insert(
                            class_id.to_string(),
                            json!({ "enrolledOn": enrolled_on.to_string() }),
                        );
                    }
                })
                .await?
            }
            Store::Postgres(pool) => db::enroll(pool, student_ids, class_id, enrolled_on)
                .await
                .map_err(StoreError::write_failed)?,
        }
        tracing::info!(class = %class_id, count = student_ids.len(), "enrolled students");
        Ok(())
    }

    /// Drops the membership from both schemas. Attendance history stays.
    pub async fn unenroll(&self, student_id: &str, class_id: &str) -> Result<(), StoreError> {
        match self {
            Store::File(file) => {
                file.update(|tree| {
                    let Some(student) =
                        existing_record_mut(tree, "students", student_id, "StudentID")
                    else {
                        return;
                    };
                    if let Some(Value::Object(classes)) = student.get_mut("classes") {
                        classes.remove(class_id);
                    }
                    if snapshot::text(student, "ClassID").as_deref() == Some(class_id) {
                        student.remove("ClassID");
                    }
                })
                .await?
            }
            Store::Postgres(pool) => db::unenroll(pool, student_id, class_id)
                .await
                .map_err(StoreError::write_failed)?,
        }
        tracing::info!(student = %student_id, class = %class_id, "unenrolled student");
        Ok(())
    }

    /// Returns false when no such student exists.
    pub async fn set_student_disabled(
        &self,
        student_id: &str,
        disabled: bool,
    ) -> Result<bool, StoreError> {
        let found = match self {
            Store::File(file) => {
                let mut found = false;
                file.update(|tree| {
                    if let Some(student) =
                        existing_record_mut(tree, "students", student_id, "StudentID")
                    {
                        student.insert("disabled".to_string(), Value::Bool(disabled));
                        found = true;
                    }
                })
                .await?;
                found
            }
            Store::Postgres(pool) => db::set_student_disabled(pool, student_id, disabled)
                .await
                .map_err(StoreError::write_failed)?,
        };
        if found {
            tracing::info!(student = %student_id, disabled, "updated student status");
        }
        Ok(found)
    }

    pub async fn write_attendance(&self, writes: &[AttendanceWrite]) -> Result<(), StoreError> {
        match self {
            Store::File(file) => {
                file.update(|tree| {
                    for write in writes {
                        let date = write.date.to_string();
                        let node = node_mut(tree, &["attendance", &date, &write.class_id]);
                        node.insert(
                            write.student_id.clone(),
                            json!({
                                "status": write.status.as_str(),
                                "timestamp": write.timestamp,
                                "markedBy": write.marked_by,
                            }),
                        );
                    }
                })
                .await?
            }
            Store::Postgres(pool) => db::write_attendance(pool, writes)
                .await
                .map_err(StoreError::write_failed)?,
        }
        tracing::info!(count = writes.len(), "saved attendance");
        Ok(())
    }

    pub async fn set_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        match self {
            Store::File(file) => {
                file.update(|tree| {
                    let node = node_mut(tree, &["settings"]);
                    node.insert("minAttendance".to_string(), json!(settings.min_attendance));
                    node.insert("editWindow".to_string(), json!(settings.edit_window_hours));
                })
                .await?
            }
            Store::Postgres(pool) => db::set_settings(pool, settings)
                .await
                .map_err(StoreError::write_failed)?,
        }
        tracing::info!(
            min_attendance = settings.min_attendance,
            edit_window_hours = settings.edit_window_hours,
            "saved settings"
        );
        Ok(())
    }

    pub async fn add_holiday(&self, holiday: &Holiday) -> Result<(), StoreError> {
        match self {
            Store::File(file) => {
                file.update(|tree| {
                    let date = holiday.date.to_string();
                    let node = node_mut(tree, &["holidays", &date]);
                    node.insert("name".to_string(), json!(holiday.name));
                    node.insert("date".to_string(), json!(date));
                })
                .await?
            }
            Store::Postgres(pool) => db::add_holiday(pool, holiday)
                .await
                .map_err(StoreError::write_failed)?,
        }
        tracing::info!(date = %holiday.date, name = %holiday.name, "added holiday");
        Ok(())
    }
}

/// A record-store export kept as a JSON document tree on disk.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    async fn read_tree(&self) -> Result<Value, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Malformed {
                path: self.path.clone(),
                source,
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(json!({})),
            Err(err) => Err(StoreError::unavailable(err)),
        }
    }

    async fn load_snapshot(&self) -> Result<Snapshot, StoreError> {
        let tree = self.read_tree().await?;
        Ok(Snapshot::from_value(&tree))
    }

    /// Read, edit, then replace the file through a sibling temp file.
    async fn update(&self, edit: impl FnOnce(&mut Value)) -> Result<(), StoreError> {
        let mut tree = self.read_tree().await?;
        if !tree.is_object() {
            tree = json!({});
        }
        edit(&mut tree);

        let bytes = serde_json::to_vec_pretty(&tree).map_err(StoreError::write_failed)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(StoreError::write_failed)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(StoreError::write_failed)?;
        Ok(())
    }
}

/// Array collections become the keyed object they are read as: position as
/// the key, null holes dropped. Any other non-object is replaced.
fn as_object(value: &mut Value) -> &mut Map<String, Value> {
    if let Value::Array(items) = value {
        let keyed = std::mem::take(items)
            .into_iter()
            .enumerate()
            .filter(|(_, item)| !item.is_null())
            .map(|(i, item)| (i.to_string(), item))
            .collect();
        *value = Value::Object(keyed);
    }
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("replaced with an object above"),
    }
}

/// Walks `path` from `root`, creating missing levels.
fn node_mut<'a>(root: &'a mut Value, path: &[&str]) -> &'a mut Map<String, Value> {
    let mut current = root;
    for segment in path {
        current = as_object(current)
            .entry(segment.to_string())
            .or_insert(Value::Null);
    }
    as_object(current)
}

/// Key of the record whose id, read the way ingestion reads it, is `id`.
fn record_key(records: &Map<String, Value>, id: &str, id_field: &str) -> Option<String> {
    records
        .iter()
        .find(|(key, record)| snapshot::record_id(key, record, id_field).as_deref() == Some(id))
        .map(|(key, _)| key.clone())
}

/// The record for `id` in a top-level collection, created when missing.
fn record_mut<'a>(
    root: &'a mut Value,
    collection: &str,
    id: &str,
    id_field: &str,
) -> &'a mut Map<String, Value> {
    let records = node_mut(root, &[collection]);
    let key = match record_key(records, id, id_field) {
        Some(key) => key,
        None => {
            let mut key = id.to_string();
            let mut n = 1;
            while records.contains_key(&key) {
                key = format!("{id}-{n}");
                n += 1;
            }
            let mut fresh = Map::new();
            fresh.insert(id_field.to_string(), Value::String(id.to_string()));
            records.insert(key.clone(), Value::Object(fresh));
            key
        }
    };
    as_object(records.entry(key).or_insert(Value::Null))
}

fn existing_record_mut<'a>(
    root: &'a mut Value,
    collection: &str,
    id: &str,
    id_field: &str,
) -> Option<&'a mut Map<String, Value>> {
    let records = root.get_mut(collection)?;
    if !matches!(records, Value::Object(_) | Value::Array(_)) {
        return None;
    }
    let records = as_object(records);
    let key = record_key(records, id, id_field)?;
    records.get_mut(&key)?.as_object_mut()
}

fn profile_fields(profile: &StudentProfile) -> Vec<(&'static str, String)> {
    let GuardianContact {
        father_name,
        mother_name,
        student_phone,
        parent_phone,
        student_email,
        parent_email,
    } = &profile.contact;
    vec![
        ("StudentID", profile.id.clone()),
        ("StudentName", profile.name.clone()),
        ("FatherName", father_name.clone()),
        ("MotherName", mother_name.clone()),
        ("StudentPhoneNumber", student_phone.clone()),
        ("ParentPhoneNumber", parent_phone.clone()),
        ("StudentEmail", student_email.clone()),
        ("ParentEmail", parent_email.clone()),
    ]
}

fn class_fields(class: &Class) -> Map<String, Value> {
    let schedule = &class.schedule;
    let clock = |time: Option<chrono::NaiveTime>| {
        time.map(|t| Value::String(t.format("%H:%M").to_string()))
            .unwrap_or(Value::Null)
    };
    let (start_date, end_date) = match schedule.validity {
        Some((start, end)) => (json!(start.to_string()), json!(end.to_string())),
        None => (Value::Null, Value::Null),
    };

    let mut fields = Map::new();
    fields.insert("ClassID".to_string(), json!(class.id));
    fields.insert("ClassName".to_string(), json!(class.name));
    fields.insert("SubjectName".to_string(), json!(class.subject_name));
    fields.insert("TeacherID".to_string(), json!(class.teacher_id));
    fields.insert("Days".to_string(), json!(format_days(&schedule.days)));
    fields.insert("StartTime".to_string(), clock(schedule.start_time));
    fields.insert("EndTime".to_string(), clock(schedule.end_time));
    fields.insert("StartDate".to_string(), start_date);
    fields.insert("EndDate".to_string(), end_date);
    fields.insert("disabled".to_string(), json!(class.disabled));
    fields
}

/// Loads a small, realistic term: two subjects, three students, two weeks of
/// attendance.
pub async fn seed(store: &Store) -> anyhow::Result<()> {
    let term_start = NaiveDate::from_ymd_opt(2026, 1, 5).context("invalid date")?;
    let term_end = NaiveDate::from_ymd_opt(2026, 6, 26).context("invalid date")?;

    let classes = [
        ("seed-math", "Algebra I", "Math", "T-100", "Mon, Wed, Fri", "09:00", "09:45"),
        ("seed-sci", "Lab Science", "Science", "T-200", "Tue, Thu", "10:00", "11:00"),
    ];
    for (id, name, subject, teacher, days, start, end) in classes {
        let draft = ClassDraft {
            name: name.to_string(),
            subject_name: Some(subject.to_string()),
            teacher_id: Some(teacher.to_string()),
            days: days.to_string(),
            start_time: start.to_string(),
            end_time: end.to_string(),
            start_date: Some(term_start),
            end_date: Some(term_end),
        };
        let mut class = draft.into_class()?;
        class.id = id.to_string();
        store.upsert_class(&class).await?;
    }

    let students = [
        ("seed-s1", "Avery Lee", "Daniel Lee", "avery.lee@campus.example"),
        ("seed-s2", "Jules Moreno", "Carlos Moreno", "jules.moreno@campus.example"),
        ("seed-s3", "Kiara Patel", "Raj Patel", "kiara.patel@campus.example"),
    ];
    let profiles: Vec<StudentProfile> = students
        .iter()
        .map(|(id, name, father, email)| StudentProfile {
            id: id.to_string(),
            name: name.to_string(),
            contact: GuardianContact {
                father_name: father.to_string(),
                student_email: email.to_string(),
                ..GuardianContact::default()
            },
        })
        .collect();
    store.upsert_students(&profiles).await?;

    let everyone: Vec<String> = students.iter().map(|(id, ..)| id.to_string()).collect();
    store.enroll(&everyone, "seed-math", term_start).await?;
    store.enroll(&everyone[..2], "seed-sci", term_start).await?;

    let mut writes = Vec::new();
    for offset in 0..14 {
        let date = term_start + chrono::Duration::days(offset);
        for (class_id, _, _, _, days, _, _) in classes {
            if !crate::snapshot::parse_days(days).contains(&chrono::Datelike::weekday(&date)) {
                continue;
            }
            for (i, student_id) in everyone.iter().enumerate() {
                if class_id == "seed-sci" && i == 2 {
                    continue;
                }
                let status = match (i, offset % 4) {
                    (1, 0) | (1, 1) => AttendanceStatus::Absent,
                    (2, 3) => AttendanceStatus::Late,
                    _ => AttendanceStatus::Present,
                };
                writes.push(AttendanceWrite {
                    date,
                    class_id: class_id.to_string(),
                    student_id: student_id.clone(),
                    status,
                    timestamp: date
                        .and_hms_opt(12, 0, 0)
                        .context("invalid time")?
                        .and_utc()
                        .timestamp_millis(),
                    marked_by: "Seed".to_string(),
                });
            }
        }
    }
    store.write_attendance(&writes).await?;
    store.set_settings(&Settings::default()).await?;

    Ok(())
}
