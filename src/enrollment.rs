use std::collections::BTreeMap;

use crate::models::{Class, Student};
use crate::snapshot::Snapshot;

/// Class-to-students and student-to-classes lookups over one snapshot.
///
/// A membership whose class no longer exists is kept off both sides, so a
/// deleted class never shows up in anyone's schedule.
#[derive(Debug, Default)]
pub struct EnrollmentIndex<'a> {
    by_class: BTreeMap<&'a str, Vec<&'a Student>>,
    by_student: BTreeMap<&'a str, Vec<&'a Class>>,
}

impl<'a> EnrollmentIndex<'a> {
    pub fn build(
        students: &'a BTreeMap<String, Student>,
        classes: &'a BTreeMap<String, Class>,
    ) -> Self {
        let mut index = EnrollmentIndex::default();

        for student in students.values() {
            for class_id in student.enrollments.keys() {
                let Some(class) = classes.get(class_id) else {
                    continue;
                };
                index
                    .by_class
                    .entry(class.id.as_str())
                    .or_default()
                    .push(student);
                index
                    .by_student
                    .entry(student.id.as_str())
                    .or_default()
                    .push(class);
            }
        }

        index
    }

    pub fn from_snapshot(snapshot: &'a Snapshot) -> Self {
        Self::build(&snapshot.students, &snapshot.classes)
    }

    /// Every student enrolled in the class, disabled or not.
    pub fn students_in(&self, class_id: &str) -> &[&'a Student] {
        self.by_class.get(class_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Enrolled students still on the active roster.
    pub fn active_students_in(&self, class_id: &str) -> Vec<&'a Student> {
        self.students_in(class_id)
            .iter()
            .copied()
            .filter(|student| !student.disabled)
            .collect()
    }

    pub fn classes_for(&self, student_id: &str) -> &[&'a Class] {
        self.by_student
            .get(student_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
