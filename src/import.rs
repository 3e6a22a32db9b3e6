use std::io;

use serde::Deserialize;

use crate::models::NewStudent;
use crate::validate;

/// One row of a student CSV. Accepts the camelCase header written by the
/// directory export as well as snake_case headers; extra columns such as
/// `createdAt` are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentCsvRow {
    id: String,
    #[serde(alias = "first_name")]
    first_name: String,
    #[serde(alias = "last_name")]
    last_name: String,
    email: String,
    #[serde(default)]
    semester: Option<i32>,
    #[serde(default)]
    career: Option<String>,
}

impl From<StudentCsvRow> for NewStudent {
    fn from(row: StudentCsvRow) -> Self {
        Self {
            id: row.id.trim().to_string(),
            first_name: row.first_name.trim().to_string(),
            last_name: row.last_name.trim().to_string(),
            email: row.email.trim().to_string(),
            semester: row.semester.unwrap_or(1),
            career: row
                .career
                .map(|career| career.trim().to_string())
                .filter(|career| !career.is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct StudentImport {
    pub students: Vec<NewStudent>,
    pub rejected: Vec<RejectedRow>,
}

/// Parses and validates a student CSV. Rows that do not parse or fail the
/// same checks as the create endpoint are reported instead of imported.
pub fn read_students(input: impl io::Read) -> Result<StudentImport, csv::Error> {
    let mut reader = csv::Reader::from_reader(input);
    let headers = reader.headers()?.clone();
    let mut import = StudentImport::default();

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(error) if error.is_io_error() => return Err(error),
            Err(error) => {
                import.rejected.push(RejectedRow {
                    line: error.position().map_or(0, |position| position.line()),
                    reason: error.to_string(),
                });
                continue;
            }
        };
        let line = record.position().map_or(0, |position| position.line());

        let student = match record.deserialize::<StudentCsvRow>(Some(&headers)) {
            Ok(row) => NewStudent::from(row),
            Err(error) => {
                import.rejected.push(RejectedRow {
                    line,
                    reason: error.to_string(),
                });
                continue;
            }
        };

        match validate::check_new_student(&student) {
            Ok(()) => import.students.push(student),
            Err(errors) => import.rejected.push(RejectedRow {
                line,
                reason: errors.to_string(),
            }),
        }
    }

    Ok(import)
}
