use axum::http::HeaderMap;
use axum::Extension;
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::auth::ensure_authenticated;
use crate::err::{parse_payload, Error};
use crate::models::{Address, Course, Student, UserRecord};
use crate::session::SessionRegistry;
use crate::{confirms, proceeds, Confirmation, Payload};

const TARGET_AGE: i32 = 30;

/// Validates caller input, queries the student store and shapes responses.
/// All store access of the service goes through this one component.
#[derive(Clone)]
pub struct StudentQueryService {
    pool: PgPool,
}

impl StudentQueryService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_user(&self, username: &str, password: &str) -> Result<(), Error> {
        // uniqueness is enforced here, not by the store schema
        let existing =
            sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE username = $1 LIMIT 1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::from)?;
        if existing.is_some() {
            return Err(Error::DuplicateUsername {
                message: format!("User `{}` already exists!", username),
            });
        }

        let res = sqlx::query("INSERT INTO users VALUES ($1, $2)")
            .bind(username)
            .bind(password)
            .execute(&self.pool)
            .await
            .map_err(Error::from)?;
        if res.rows_affected() < 1 {
            return Err(Error::StoreFailure {
                message: "Could not save the new user!".to_string(),
            });
        }
        Ok(())
    }

    pub async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<UserRecord, Error> {
        let user =
            sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE username = $1 LIMIT 1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::from)?
                .ok_or_else(|| Error::InvalidCredentials {
                    message: "Wrong username or password!".to_string(),
                })?;

        // passwords are kept and compared as plaintext, matching the legacy records
        if user.password != password {
            return Err(Error::InvalidCredentials {
                message: "Wrong username or password!".to_string(),
            });
        }
        Ok(user)
    }

    pub async fn count_students(&self) -> Result<i64, Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM students")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::from)
    }

    pub async fn student_by_email(&self, email: &str) -> Result<Student, Error> {
        sqlx::query_as::<_, Student>("SELECT * FROM students WHERE email = $1 LIMIT 1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from)?
            .ok_or_else(|| Error::NotFound {
                message: "Student not found.".to_string(),
            })
    }

    pub async fn students_born_in(&self, year: i32) -> Result<Vec<Student>, Error> {
        sqlx::query_as::<_, Student>("SELECT * FROM students WHERE year_of_birth = $1")
            .bind(year)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::from)
    }

    pub async fn students_born_no_later_than(&self, year: i32) -> Result<Vec<Student>, Error> {
        sqlx::query_as::<_, Student>("SELECT * FROM students WHERE year_of_birth <= $1")
            .bind(year)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::from)
    }

    pub async fn delete_student(&self, email: &str) -> Result<(), Error> {
        let res = sqlx::query("DELETE FROM students WHERE email = $1")
            .bind(email)
            .execute(&self.pool)
            .await
            .map_err(Error::from)?;
        if res.rows_affected() < 1 {
            return Err(Error::NotFound {
                message: "Student not found.".to_string(),
            });
        }
        Ok(())
    }

    /// Replaces the whole courses field of the matched record, never merges.
    pub async fn replace_courses(&self, email: &str, courses: Vec<Course>) -> Result<(), Error> {
        let res = sqlx::query("UPDATE students SET courses = $2 WHERE email = $1")
            .bind(email)
            .bind(Json(courses))
            .execute(&self.pool)
            .await
            .map_err(Error::from)?;
        if res.rows_affected() < 1 {
            return Err(Error::NotFound {
                message: "Student not found.".to_string(),
            });
        }
        Ok(())
    }
}

fn birth_year_for_age(age: i32) -> i32 {
    Utc::now().year() - age
}

fn parse_courses(raw: &Value) -> Result<Vec<Course>, Error> {
    serde_json::from_value(raw.clone()).map_err(|_| Error::InvalidCoursesShape {
        message: "Each course must be a single `name: score` entry with an integer score!"
            .to_string(),
    })
}

fn first_address(student: &Student) -> Result<StudentAddress, Error> {
    // only the first address on record is ever served
    let address: &Address = student
        .address
        .as_ref()
        .and_then(|entries| entries.first())
        .ok_or_else(|| Error::NoAddress {
            message: "Student has no address on record!".to_string(),
        })?;

    Ok(StudentAddress {
        name: student.name.clone(),
        street: address.street.clone(),
        postcode: address.postcode.clone(),
    })
}

fn passed_courses_of(student: &Student) -> Result<PassedCourses, Error> {
    let courses: &[Course] = match &student.courses {
        Some(entries) if !entries.is_empty() => entries,
        _ => {
            return Err(Error::NoCourses {
                message: "Student has no courses on record!".to_string(),
            })
        }
    };

    let passed: Vec<Course> = courses.iter().filter(|c| c.passed()).cloned().collect();
    if passed.is_empty() {
        return Err(Error::NoPassedCourses {
            message: "Student has no passed courses!".to_string(),
        });
    }

    Ok(PassedCourses {
        name: student.name.clone(),
        passed_courses: passed,
    })
}

pub async fn student_count(Extension(service): Extension<StudentQueryService>) -> Payload<i64> {
    proceeds(service.count_students().await?)
}

pub async fn get_student(
    headers: HeaderMap,
    Extension(sessions): Extension<SessionRegistry>,
    Extension(service): Extension<StudentQueryService>,
    body: String,
) -> Payload<Student> {
    ensure_authenticated(&headers, &sessions)?;
    let lookup: StudentLookup = parse_payload(&body)?;
    if lookup.email.is_empty() {
        return Err(Error::MissingFields {
            message: "`email` field was empty!".to_string(),
        });
    }

    let student = service.student_by_email(&lookup.email).await?;
    log::debug!("serving student record {}", student.id);
    proceeds(student)
}

pub async fn students_in_thirties(
    headers: HeaderMap,
    Extension(sessions): Extension<SessionRegistry>,
    Extension(service): Extension<StudentQueryService>,
) -> Payload<Vec<Student>> {
    ensure_authenticated(&headers, &sessions)?;
    // the threshold drifts forward with the calendar year
    proceeds(
        service
            .students_born_in(birth_year_for_age(TARGET_AGE))
            .await?,
    )
}

pub async fn students_thirty_or_older(
    headers: HeaderMap,
    Extension(sessions): Extension<SessionRegistry>,
    Extension(service): Extension<StudentQueryService>,
) -> Payload<Vec<Student>> {
    ensure_authenticated(&headers, &sessions)?;
    proceeds(
        service
            .students_born_no_later_than(birth_year_for_age(TARGET_AGE))
            .await?,
    )
}

pub async fn get_student_address(
    headers: HeaderMap,
    Extension(sessions): Extension<SessionRegistry>,
    Extension(service): Extension<StudentQueryService>,
    body: String,
) -> Payload<StudentAddress> {
    ensure_authenticated(&headers, &sessions)?;
    let lookup: StudentLookup = parse_payload(&body)?;
    if lookup.email.is_empty() {
        return Err(Error::MissingFields {
            message: "`email` field was empty!".to_string(),
        });
    }

    let student = service.student_by_email(&lookup.email).await?;
    proceeds(first_address(&student)?)
}

pub async fn delete_student(
    headers: HeaderMap,
    Extension(sessions): Extension<SessionRegistry>,
    Extension(service): Extension<StudentQueryService>,
    body: String,
) -> Confirmation {
    ensure_authenticated(&headers, &sessions)?;
    let lookup: StudentLookup = parse_payload(&body)?;
    if lookup.email.is_empty() {
        return Err(Error::MissingFields {
            message: "`email` field was empty!".to_string(),
        });
    }

    service.delete_student(&lookup.email).await?;
    confirms("Successfully deleted student.")
}

pub async fn add_courses(
    headers: HeaderMap,
    Extension(sessions): Extension<SessionRegistry>,
    Extension(service): Extension<StudentQueryService>,
    body: String,
) -> Confirmation {
    ensure_authenticated(&headers, &sessions)?;
    let request: AddCoursesRequest = parse_payload(&body)?;
    if request.email.is_empty() {
        return Err(Error::MissingFields {
            message: "`email` field was empty!".to_string(),
        });
    }

    let courses = parse_courses(&request.courses)?;
    service.replace_courses(&request.email, courses).await?;
    confirms("Successfully replaced student courses.")
}

pub async fn get_passed_courses(
    headers: HeaderMap,
    Extension(sessions): Extension<SessionRegistry>,
    Extension(service): Extension<StudentQueryService>,
    body: String,
) -> Payload<PassedCourses> {
    ensure_authenticated(&headers, &sessions)?;
    let lookup: StudentLookup = parse_payload(&body)?;
    if lookup.email.is_empty() {
        return Err(Error::MissingFields {
            message: "`email` field was empty!".to_string(),
        });
    }

    let student = service.student_by_email(&lookup.email).await?;
    proceeds(passed_courses_of(&student)?)
}

#[derive(Debug, Clone, Deserialize)]
pub struct StudentLookup {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddCoursesRequest {
    pub email: String,
    pub courses: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentAddress {
    pub name: String,
    pub street: String,
    pub postcode: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PassedCourses {
    pub name: String,
    #[serde(rename = "passed courses")]
    pub passed_courses: Vec<Course>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn student_with(address: Option<Vec<Address>>, courses: Option<Vec<Course>>) -> Student {
        Student {
            id: Uuid::new_v4(),
            email: "jane@uni.edu".to_string(),
            name: "Jane".to_string(),
            year_of_birth: 1994,
            address: address.map(Json),
            courses: courses.map(Json),
        }
    }

    fn course(name: &str, score: i64) -> Course {
        Course {
            name: name.to_string(),
            score,
        }
    }

    #[test]
    fn threshold_follows_the_current_year() {
        assert_eq!(birth_year_for_age(TARGET_AGE), Utc::now().year() - 30);
    }

    #[test]
    fn courses_parse_from_wire_entries() {
        let raw = serde_json::json!([{ "Algebra": 6 }, { "Geometry": 4 }]);
        let courses = parse_courses(&raw).unwrap();
        assert_eq!(courses, vec![course("Algebra", 6), course("Geometry", 4)]);
    }

    #[test]
    fn multi_key_course_entry_is_rejected() {
        let raw = serde_json::json!([{ "Algebra": 6, "Geometry": 4 }]);
        let parsed = parse_courses(&raw);
        assert!(matches!(parsed, Err(Error::InvalidCoursesShape { .. })));
    }

    #[test]
    fn non_integer_score_is_rejected() {
        let raw = serde_json::json!([{ "Algebra": "six" }]);
        assert!(matches!(
            parse_courses(&raw),
            Err(Error::InvalidCoursesShape { .. })
        ));
    }

    #[test]
    fn non_list_courses_are_rejected() {
        let raw = serde_json::json!({ "Algebra": 6 });
        assert!(matches!(
            parse_courses(&raw),
            Err(Error::InvalidCoursesShape { .. })
        ));
    }

    #[test]
    fn only_the_first_address_is_served() {
        let student = student_with(
            Some(vec![
                Address {
                    street: "12 Hill Road".to_string(),
                    postcode: "11741".to_string(),
                },
                Address {
                    street: "3 Ocean Avenue".to_string(),
                    postcode: "20100".to_string(),
                },
            ]),
            None,
        );
        let view = first_address(&student).unwrap();
        assert_eq!(view.name, "Jane");
        assert_eq!(view.street, "12 Hill Road");
        assert_eq!(view.postcode, "11741");
    }

    #[test]
    fn missing_address_is_no_address() {
        let student = student_with(None, None);
        assert!(matches!(
            first_address(&student),
            Err(Error::NoAddress { .. })
        ));

        let student = student_with(Some(vec![]), None);
        assert!(matches!(
            first_address(&student),
            Err(Error::NoAddress { .. })
        ));
    }

    #[test]
    fn passed_courses_keep_the_boundary_score() {
        let student = student_with(
            None,
            Some(vec![
                course("Algebra", 4),
                course("Geometry", 5),
                course("History", 9),
            ]),
        );
        let view = passed_courses_of(&student).unwrap();
        assert_eq!(
            view.passed_courses,
            vec![course("Geometry", 5), course("History", 9)]
        );
    }

    #[test]
    fn missing_courses_is_no_courses() {
        let student = student_with(None, None);
        assert!(matches!(
            passed_courses_of(&student),
            Err(Error::NoCourses { .. })
        ));

        let student = student_with(None, Some(vec![]));
        assert!(matches!(
            passed_courses_of(&student),
            Err(Error::NoCourses { .. })
        ));
    }

    #[test]
    fn all_failed_courses_is_no_passed_courses() {
        let student = student_with(None, Some(vec![course("Algebra", 4)]));
        assert!(matches!(
            passed_courses_of(&student),
            Err(Error::NoPassedCourses { .. })
        ));
    }

    #[test]
    fn passed_courses_response_uses_the_wire_key() {
        let view = PassedCourses {
            name: "Jane".to_string(),
            passed_courses: vec![course("Algebra", 6)],
        };
        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["name"], "Jane");
        assert_eq!(value["passed courses"], serde_json::json!([{ "Algebra": 6 }]));
    }
}
