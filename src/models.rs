use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::types::Json;
use uuid::Uuid;

/// Lowest score that still counts as a pass.
pub const PASS_MARK: i64 = 5;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Student {
    #[serde(skip)]
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub year_of_birth: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Json<Vec<Address>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub courses: Option<Json<Vec<Course>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub postcode: String,
}

/// A course with its score. On the wire (and in the store) this is kept as a
/// single-entry mapping, `{"Algebra": 6}`, for compatibility with existing
/// records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Course {
    pub name: String,
    pub score: i64,
}

impl Course {
    pub fn passed(&self) -> bool {
        self.score >= PASS_MARK
    }
}

impl Serialize for Course {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.name, &self.score)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Course {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct WireVisitor;

        impl<'de> Visitor<'de> for WireVisitor {
            type Value = Course;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a single `course name: integer score` mapping")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Course, A::Error>
            where
                A: MapAccess<'de>,
            {
                let (name, score) = access
                    .next_entry::<String, i64>()?
                    .ok_or_else(|| de::Error::custom("course mapping was empty"))?;
                if access.next_key::<String>()?.is_some() {
                    return Err(de::Error::custom("course mapping has more than one entry"));
                }
                Ok(Course { name, score })
            }
        }

        deserializer.deserialize_map(WireVisitor)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRecord {
    pub username: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_student() -> Student {
        Student {
            id: Uuid::new_v4(),
            email: "jane@uni.edu".to_string(),
            name: "Jane".to_string(),
            year_of_birth: 1994,
            address: Some(Json(vec![Address {
                street: "12 Hill Road".to_string(),
                postcode: "11741".to_string(),
            }])),
            courses: Some(Json(vec![Course {
                name: "Algebra".to_string(),
                score: 6,
            }])),
        }
    }

    #[test]
    fn course_serializes_to_wire_shape() {
        let course = Course {
            name: "Algebra".to_string(),
            score: 6,
        };
        let value = serde_json::to_value(&course).unwrap();
        assert_eq!(value, serde_json::json!({ "Algebra": 6 }));
    }

    #[test]
    fn course_round_trips_through_wire_shape() {
        let course: Course = serde_json::from_value(serde_json::json!({ "Geometry": 4 })).unwrap();
        assert_eq!(
            course,
            Course {
                name: "Geometry".to_string(),
                score: 4
            }
        );
    }

    #[test]
    fn course_rejects_extra_entries() {
        let parsed =
            serde_json::from_value::<Course>(serde_json::json!({ "Algebra": 6, "Geometry": 4 }));
        assert!(parsed.is_err());
    }

    #[test]
    fn course_rejects_non_integer_scores() {
        assert!(serde_json::from_value::<Course>(serde_json::json!({ "Algebra": "six" })).is_err());
        assert!(serde_json::from_value::<Course>(serde_json::json!({ "Algebra": 5.5 })).is_err());
    }

    #[test]
    fn course_rejects_empty_mapping() {
        assert!(serde_json::from_value::<Course>(serde_json::json!({})).is_err());
    }

    #[test]
    fn pass_mark_is_inclusive() {
        let course = Course {
            name: "Algebra".to_string(),
            score: 5,
        };
        assert!(course.passed());
        assert!(!Course {
            name: "Algebra".to_string(),
            score: 4
        }
        .passed());
    }

    #[test]
    fn projection_excludes_the_internal_id() {
        let student = sample_student();
        let value = serde_json::to_value(&student).unwrap();
        let fields = value.as_object().unwrap();
        assert!(!fields.contains_key("id"));
        assert_eq!(fields["email"], "jane@uni.edu");
        assert_eq!(fields["name"], "Jane");
        assert_eq!(fields["year_of_birth"], 1994);
        assert_eq!(fields["courses"], serde_json::json!([{ "Algebra": 6 }]));
    }

    #[test]
    fn projection_omits_absent_optional_fields() {
        let mut student = sample_student();
        student.address = None;
        student.courses = None;
        let value = serde_json::to_value(&student).unwrap();
        let fields = value.as_object().unwrap();
        assert!(!fields.contains_key("address"));
        assert!(!fields.contains_key("courses"));
    }
}
