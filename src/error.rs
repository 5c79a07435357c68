use thiserror::Error;

/// Why a detail page did not produce a usable course record
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("could not parse a Log Number from {url}")]
    MissingCourseId { url: String },

    #[error("course {course_id} from {url} is not a FIRE-101 course")]
    UnexpectedCourse { course_id: String, url: String },
}
