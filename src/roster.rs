use std::io::Read;
use std::path::Path;

use anyhow::Context;

use crate::models::{GuardianContact, StudentProfile};

#[derive(serde::Deserialize)]
struct RosterRow {
    #[serde(rename = "Student ID", alias = "StudentID", default)]
    student_id: String,
    #[serde(rename = "Student Name", alias = "StudentName", default)]
    student_name: String,
    #[serde(rename = "Father Name", alias = "FatherName", default)]
    father_name: String,
    #[serde(rename = "Mother Name", alias = "MotherName", default)]
    mother_name: String,
    #[serde(rename = "Student Phone Number", alias = "StudentPhoneNumber", default)]
    student_phone: String,
    #[serde(rename = "Parent Phone Number", alias = "ParentPhoneNumber", default)]
    parent_phone: String,
    #[serde(rename = "Student Email", alias = "StudentEmail", default)]
    student_email: String,
    #[serde(rename = "Parent Email", alias = "ParentEmail", default)]
    parent_email: String,
}

#[derive(serde::Deserialize)]
struct EnrollmentRow {
    #[serde(rename = "StudentID", alias = "Student ID", default)]
    student_id: String,
}

pub fn read_roster(path: &Path) -> anyhow::Result<Vec<StudentProfile>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open roster {}", path.display()))?;
    parse_roster(file)
}

/// Rows without a student id are skipped.
pub fn parse_roster(input: impl Read) -> anyhow::Result<Vec<StudentProfile>> {
    let mut reader = csv::Reader::from_reader(input);
    let mut profiles = Vec::new();

    for result in reader.deserialize::<RosterRow>() {
        let row = result.context("failed to parse roster row")?;
        let id = row.student_id.trim().to_string();
        if id.is_empty() {
            continue;
        }
        let name = row.student_name.trim();
        profiles.push(StudentProfile {
            id,
            name: if name.is_empty() { "N/A".to_string() } else { name.to_string() },
            contact: GuardianContact {
                father_name: row.father_name.trim().to_string(),
                mother_name: row.mother_name.trim().to_string(),
                student_phone: row.student_phone.trim().to_string(),
                parent_phone: row.parent_phone.trim().to_string(),
                student_email: row.student_email.trim().to_string(),
                parent_email: row.parent_email.trim().to_string(),
            },
        });
    }

    Ok(profiles)
}

pub fn read_enrollment_ids(path: &Path) -> anyhow::Result<Vec<String>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open enrollment list {}", path.display()))?;
    parse_enrollment_ids(file)
}

pub fn parse_enrollment_ids(input: impl Read) -> anyhow::Result<Vec<String>> {
    let mut reader = csv::Reader::from_reader(input);
    let mut ids = Vec::new();

    for result in reader.deserialize::<EnrollmentRow>() {
        let row = result.context("failed to parse enrollment row")?;
        let id = row.student_id.trim();
        if !id.is_empty() && !ids.iter().any(|known: &String| known == id) {
            ids.push(id.to_string());
        }
    }

    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_spreadsheet_headers() {
        let csv = "Student ID,Student Name,Father Name,Parent Email\n\
                   1001,Avery Lee,Daniel Lee,dlee@example.com\n\
                   ,Nobody,,\n\
                   1002,,,\n";
        let profiles = parse_roster(csv.as_bytes()).unwrap();

        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].id, "1001");
        assert_eq!(profiles[0].contact.father_name, "Daniel Lee");
        assert_eq!(profiles[0].contact.parent_email, "dlee@example.com");
        assert_eq!(profiles[1].name, "N/A");
    }

    #[test]
    fn accepts_compact_headers() {
        let csv = "StudentID,StudentName\nS1,Jules Moreno\n";
        let profiles = parse_roster(csv.as_bytes()).unwrap();
        assert_eq!(profiles[0].name, "Jules Moreno");
    }

    #[test]
    fn enrollment_ids_are_deduplicated() {
        let csv = "StudentID\nS1\n S2 \nS1\n";
        let ids = parse_enrollment_ids(csv.as_bytes()).unwrap();
        assert_eq!(ids, vec!["S1".to_string(), "S2".to_string()]);
    }
}
