use serde_json::{Map, Value as JsonValue};

/// A professor returned by the vector index, closest matches first.
///
/// The records are owned by the index: fields are optional as nothing guarantees
/// that every record was indexed with the same metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfessorMatch {
    /// The professor name
    pub id: String,
    pub score: Option<f32>,
    pub metadata: ProfessorMetadata,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfessorMetadata {
    pub subject: Option<String>,
    pub stars: Option<f64>,
    pub review: Option<String>,
    /// Any other field the record was indexed with
    pub extra: Map<String, JsonValue>,
}

impl ProfessorMetadata {
    /// Builds the metadata from a free-form JSON object, keeping unknown fields in `extra`.
    ///
    /// Fields with an unexpected type are treated as missing rather than rejected.
    pub fn from_json_object(mut object: Map<String, JsonValue>) -> Self {
        let subject = take_string(&mut object, "subject");
        let review = take_string(&mut object, "review");
        let stars = match object.remove("stars") {
            Some(JsonValue::Number(stars)) => stars.as_f64(),
            Some(JsonValue::String(stars)) => stars.trim().parse().ok(),
            Some(other) => {
                object.insert("stars".into(), other);
                None
            }
            None => None,
        };

        Self {
            subject,
            stars,
            review,
            extra: object,
        }
    }
}

fn take_string(object: &mut Map<String, JsonValue>, key: &str) -> Option<String> {
    match object.remove(key) {
        Some(JsonValue::String(value)) => Some(value),
        Some(other) => {
            object.insert(key.into(), other);
            None
        }
        None => None,
    }
}
