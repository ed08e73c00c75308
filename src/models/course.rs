use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::value::{to_boolean, to_int};
use crate::store::Document;

pub const FIELD_ESTADO: &str = "estado";
pub const FIELD_CUPOS: &str = "cupos";
pub const FIELD_INSCRITOS: &str = "inscritos";

/// A course as mirrored from the store: its id plus whatever attributes the
/// document carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Course {
    pub fn from_document(doc: Document) -> Self {
        Self {
            id: doc.id,
            attributes: doc.data,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field)
    }

    pub fn is_active(&self) -> bool {
        to_boolean(self.get(FIELD_ESTADO))
    }

    pub fn capacity(&self) -> i64 {
        to_int(self.get(FIELD_CUPOS), 0)
    }

    pub fn enrolled(&self) -> i64 {
        to_int(self.get(FIELD_INSCRITOS), 0)
    }

    pub fn remaining_seats(&self) -> i64 {
        self.capacity().saturating_sub(self.enrolled())
    }

    pub fn has_capacity(&self) -> bool {
        self.remaining_seats() > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCourseRequest {
    pub nombre: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descripcion: Option<String>,
    pub cupos: i64,
    pub estado: bool,
    #[serde(default)]
    pub inscritos: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NewCourseRequest {
    pub fn new(nombre: impl Into<String>, cupos: i64) -> Self {
        Self {
            nombre: nombre.into(),
            descripcion: None,
            cupos,
            estado: true,
            inscritos: 0,
            extra: Map::new(),
        }
    }
}

/// Partial course payload; only fields that are set get written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCourseRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nombre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descripcion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cupos: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estado: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Serializes a request struct into the attribute map stored in a document.
pub fn to_payload<T: Serialize>(req: &T) -> Result<Map<String, Value>, serde_json::Error> {
    match serde_json::to_value(req)? {
        Value::Object(map) => Ok(map),
        other => Err(<serde_json::Error as serde::ser::Error>::custom(format!(
            "expected an object payload, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn course(attrs: Value) -> Course {
        let Value::Object(attributes) = attrs else {
            panic!("attributes must be an object");
        };
        Course {
            id: "c1".to_string(),
            attributes,
        }
    }

    #[test]
    fn test_counters_are_coerced() {
        let c = course(json!({ "cupos": "30", "inscritos": 12.0, "estado": "1" }));
        assert!(c.is_active());
        assert_eq!(c.capacity(), 30);
        assert_eq!(c.enrolled(), 12);
        assert_eq!(c.remaining_seats(), 18);
        assert!(c.has_capacity());
    }

    #[test]
    fn test_missing_counters_mean_no_capacity() {
        let c = course(json!({ "nombre": "Álgebra" }));
        assert!(!c.is_active());
        assert_eq!(c.remaining_seats(), 0);
        assert!(!c.has_capacity());
    }

    #[test]
    fn test_extreme_counters_saturate() {
        let open = course(json!({ "cupos": i64::MAX, "inscritos": -1 }));
        assert_eq!(open.remaining_seats(), i64::MAX);
        assert!(open.has_capacity());

        let closed = course(json!({ "cupos": i64::MIN, "inscritos": 1 }));
        assert_eq!(closed.remaining_seats(), i64::MIN);
        assert!(!closed.has_capacity());
    }

    #[test]
    fn test_course_serializes_flat() {
        let c = course(json!({ "nombre": "Física", "cupos": 2 }));
        let value = serde_json::to_value(&c).expect("Failed to serialize course");
        assert_eq!(value, json!({ "id": "c1", "nombre": "Física", "cupos": 2 }));
    }

    #[test]
    fn test_update_payload_only_contains_set_fields() {
        let req = UpdateCourseRequest {
            cupos: Some(40),
            ..Default::default()
        };
        let payload = to_payload(&req).expect("Failed to build payload");
        assert_eq!(Value::Object(payload), json!({ "cupos": 40 }));
    }

    #[test]
    fn test_new_course_payload_keeps_extra_attributes() {
        let mut req = NewCourseRequest::new("Química", 10);
        req.extra.insert("profesor".to_string(), json!("Rivas"));
        let payload = to_payload(&req).expect("Failed to build payload");
        assert_eq!(payload.get("nombre"), Some(&json!("Química")));
        assert_eq!(payload.get("inscritos"), Some(&json!(0)));
        assert_eq!(payload.get("estado"), Some(&json!(true)));
        assert_eq!(payload.get("profesor"), Some(&json!("Rivas")));
        assert!(!payload.contains_key("descripcion"));
    }
}
