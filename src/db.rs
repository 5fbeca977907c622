use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Row};

use crate::models::{
    AttendanceEntry, AttendanceStatus, AttendanceWrite, Class, Enrollment, EnrollmentOrigin,
    GuardianContact, Holiday, Schedule, Settings, Student, StudentProfile,
};
use crate::snapshot::{format_days, parse_clock, parse_days, Snapshot};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn load_snapshot(pool: &PgPool) -> anyhow::Result<Snapshot> {
    let mut snapshot = Snapshot::default();

    let rows = sqlx::query(
        "SELECT id, full_name, father_name, mother_name, student_phone, parent_phone, \
         student_email, parent_email, legacy_class_id, disabled \
         FROM campus.students",
    )
    .fetch_all(pool)
    .await?;

    for row in rows {
        let id: String = row.get("id");
        let mut enrollments = BTreeMap::new();
        if let Some(class_id) = row.get::<Option<String>, _>("legacy_class_id") {
            enrollments.insert(
                class_id,
                Enrollment {
                    enrolled_on: None,
                    origin: EnrollmentOrigin::Legacy,
                },
            );
        }
        snapshot.students.insert(
            id.clone(),
            Student {
                id,
                name: row.get("full_name"),
                contact: GuardianContact {
                    father_name: row.get("father_name"),
                    mother_name: row.get("mother_name"),
                    student_phone: row.get("student_phone"),
                    parent_phone: row.get("parent_phone"),
                    student_email: row.get("student_email"),
                    parent_email: row.get("parent_email"),
                },
                enrollments,
                disabled: row.get("disabled"),
            },
        );
    }

    let rows = sqlx::query("SELECT student_id, class_id, enrolled_on FROM campus.enrollments")
        .fetch_all(pool)
        .await?;
    for row in rows {
        let student_id: String = row.get("student_id");
        if let Some(student) = snapshot.students.get_mut(&student_id) {
            student.enrollments.insert(
                row.get("class_id"),
                Enrollment {
                    enrolled_on: row.get("enrolled_on"),
                    origin: EnrollmentOrigin::Mapping,
                },
            );
        }
    }

    let rows = sqlx::query(
        "SELECT id, class_name, subject_name, teacher_id, days, start_time, end_time, \
         start_date, end_date, disabled \
         FROM campus.classes",
    )
    .fetch_all(pool)
    .await?;
    for row in rows {
        let id: String = row.get("id");
        let start_date: Option<NaiveDate> = row.get("start_date");
        let end_date: Option<NaiveDate> = row.get("end_date");
        let days: String = row.get("days");
        let start_time: Option<String> = row.get("start_time");
        let end_time: Option<String> = row.get("end_time");
        snapshot.classes.insert(
            id.clone(),
            Class {
                id,
                name: row.get("class_name"),
                subject_name: row.get("subject_name"),
                teacher_id: row.get("teacher_id"),
                schedule: Schedule {
                    days: parse_days(&days),
                    start_time: start_time.as_deref().and_then(parse_clock),
                    end_time: end_time.as_deref().and_then(parse_clock),
                    validity: start_date.zip(end_date),
                },
                disabled: row.get("disabled"),
            },
        );
    }

    let rows = sqlx::query(
        "SELECT class_date, class_id, student_id, status, marked_at, marked_by \
         FROM campus.attendance",
    )
    .fetch_all(pool)
    .await?;
    for row in rows {
        let status: String = row.get("status");
        let marked_at: Option<DateTime<Utc>> = row.get("marked_at");
        snapshot
            .attendance
            .entry(row.get("class_date"))
            .or_default()
            .entry(row.get("class_id"))
            .or_default()
            .insert(
                row.get("student_id"),
                AttendanceEntry {
                    status: AttendanceStatus::parse(&status),
                    timestamp: marked_at.map(|at| at.timestamp_millis()),
                    marked_by: row.get("marked_by"),
                },
            );
    }

    if let Some(row) = sqlx::query(
        "SELECT min_attendance, edit_window_hours FROM campus.settings WHERE id",
    )
    .fetch_optional(pool)
    .await?
    {
        let min_attendance: i32 = row.get("min_attendance");
        let edit_window_hours: i32 = row.get("edit_window_hours");
        snapshot.settings = Settings {
            min_attendance: min_attendance.clamp(0, 100) as u8,
            edit_window_hours: i64::from(edit_window_hours.max(0)),
        };
    }

    let rows = sqlx::query("SELECT holiday_date, name FROM campus.holidays")
        .fetch_all(pool)
        .await?;
    for row in rows {
        let date: NaiveDate = row.get("holiday_date");
        snapshot.holidays.insert(
            date,
            Holiday {
                date,
                name: row.get("name"),
            },
        );
    }

    Ok(snapshot)
}

pub async fn upsert_students(pool: &PgPool, profiles: &[StudentProfile]) -> anyhow::Result<usize> {
    let mut tx = pool.begin().await?;
    for profile in profiles {
        sqlx::query(
            r#"
            INSERT INTO campus.students
            (id, full_name, father_name, mother_name, student_phone, parent_phone,
             student_email, parent_email)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE
            SET full_name = EXCLUDED.full_name,
                father_name = EXCLUDED.father_name,
                mother_name = EXCLUDED.mother_name,
                student_phone = EXCLUDED.student_phone,
                parent_phone = EXCLUDED.parent_phone,
                student_email = EXCLUDED.student_email,
                parent_email = EXCLUDED.parent_email
            "#,
        )
        .bind(&profile.id)
        .bind(&profile.name)
        .bind(&profile.contact.father_name)
        .bind(&profile.contact.mother_name)
        .bind(&profile.contact.student_phone)
        .bind(&profile.contact.parent_phone)
        .bind(&profile.contact.student_email)
        .bind(&profile.contact.parent_email)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(profiles.len())
}

pub async fn upsert_class(pool: &PgPool, class: &Class) -> anyhow::Result<()> {
    let schedule = &class.schedule;
    let clock = |time: Option<chrono::NaiveTime>| time.map(|t| t.format("%H:%M").to_string());

    sqlx::query(
        r#"
        INSERT INTO campus.classes
        (id, class_name, subject_name, teacher_id, days, start_time, end_time,
         start_date, end_date, disabled)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (id) DO UPDATE
        SET class_name = EXCLUDED.class_name,
            subject_name = EXCLUDED.subject_name,
            teacher_id = EXCLUDED.teacher_id,
            days = EXCLUDED.days,
            start_time = EXCLUDED.start_time,
            end_time = EXCLUDED.end_time,
            start_date = EXCLUDED.start_date,
            end_date = EXCLUDED.end_date,
            disabled = EXCLUDED.disabled
        "#,
    )
    .bind(&class.id)
    .bind(&class.name)
    .bind(&class.subject_name)
    .bind(&class.teacher_id)
    .bind(format_days(&schedule.days))
    .bind(clock(schedule.start_time))
    .bind(clock(schedule.end_time))
    .bind(schedule.validity.map(|(start, _)| start))
    .bind(schedule.validity.map(|(_, end)| end))
    .bind(class.disabled)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn enroll(
    pool: &PgPool,
    student_ids: &[String],
    class_id: &str,
    enrolled_on: NaiveDate,
) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    for student_id in student_ids {
        sqlx::query(
            r#"
            INSERT INTO campus.enrollments (student_id, class_id, enrolled_on)
            VALUES ($1, $2, $3)
            ON CONFLICT (student_id, class_id) DO UPDATE
            SET enrolled_on = EXCLUDED.enrolled_on
            "#,
        )
        .bind(student_id)
        .bind(class_id)
        .bind(enrolled_on)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn unenroll(pool: &PgPool, student_id: &str, class_id: &str) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM campus.enrollments WHERE student_id = $1 AND class_id = $2")
        .bind(student_id)
        .bind(class_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        "UPDATE campus.students SET legacy_class_id = NULL \
         WHERE id = $1 AND legacy_class_id = $2",
    )
    .bind(student_id)
    .bind(class_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

pub async fn set_student_disabled(
    pool: &PgPool,
    student_id: &str,
    disabled: bool,
) -> anyhow::Result<bool> {
    let result = sqlx::query("UPDATE campus.students SET disabled = $2 WHERE id = $1")
        .bind(student_id)
        .bind(disabled)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Upserts by (date, class, student); the newest write wins.
pub async fn write_attendance(pool: &PgPool, writes: &[AttendanceWrite]) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    for write in writes {
        sqlx::query(
            r#"
            INSERT INTO campus.attendance
            (class_date, class_id, student_id, status, marked_at, marked_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (class_date, class_id, student_id) DO UPDATE
            SET status = EXCLUDED.status,
                marked_at = EXCLUDED.marked_at,
                marked_by = EXCLUDED.marked_by
            "#,
        )
        .bind(write.date)
        .bind(&write.class_id)
        .bind(&write.student_id)
        .bind(write.status.as_str())
        .bind(DateTime::<Utc>::from_timestamp_millis(write.timestamp))
        .bind(&write.marked_by)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn set_settings(pool: &PgPool, settings: &Settings) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO campus.settings (id, min_attendance, edit_window_hours)
        VALUES (TRUE, $1, $2)
        ON CONFLICT (id) DO UPDATE
        SET min_attendance = EXCLUDED.min_attendance,
            edit_window_hours = EXCLUDED.edit_window_hours
        "#,
    )
    .bind(i32::from(settings.min_attendance))
    .bind(i32::try_from(settings.edit_window_hours)?)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn add_holiday(pool: &PgPool, holiday: &Holiday) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO campus.holidays (holiday_date, name)
        VALUES ($1, $2)
        ON CONFLICT (holiday_date) DO UPDATE SET name = EXCLUDED.name
        "#,
    )
    .bind(holiday.date)
    .bind(&holiday.name)
    .execute(pool)
    .await?;
    Ok(())
}
