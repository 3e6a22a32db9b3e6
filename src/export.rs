use chrono::SecondsFormat;

use crate::error::AppError;
use crate::models::Student;

pub const STUDENT_CSV_HEADER: [&str; 6] =
    ["id", "firstName", "lastName", "email", "semester", "createdAt"];

/// Renders the student directory as CSV with every field quoted.
pub fn students_csv(students: &[Student]) -> Result<String, AppError> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(STUDENT_CSV_HEADER)?;
    for student in students {
        let semester = student.semester.to_string();
        let created_at = student.created_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        writer.write_record([
            student.id.as_str(),
            student.first_name.as_str(),
            student.last_name.as_str(),
            student.email.as_str(),
            semester.as_str(),
            created_at.as_str(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|error| AppError::Csv(error.into_error().into()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
