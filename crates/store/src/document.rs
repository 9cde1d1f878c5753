//! Conversion between JSON request/response bodies and BSON documents.
//!
//! Inbound bodies follow MongoDB Extended JSON, so clients may send
//! `{"$date": ...}` or `{"$oid": ...}` wrappers. Outbound documents are
//! rendered as relaxed Extended JSON with one exception: object ids are
//! flattened to their plain hex string at every depth, so a stored book reads
//! `{"_id": "65a1...", "title": "Dune"}` rather than `{"_id": {"$oid": ...}}`.

use crate::error::{StoreError, StoreResult};
use bson::{Bson, Document};
use serde_json::{Map, Value};

/// Name of the identifier field on every stored document.
pub const ID_FIELD: &str = "_id";

/// Convert a JSON object into a BSON document.
pub fn document_from_json(object: Map<String, Value>) -> StoreResult<Document> {
    match bson_from_json(Value::Object(object))? {
        Bson::Document(doc) => Ok(doc),
        other => Err(StoreError::Conversion(format!(
            "expected a document, got {:?}",
            other.element_type()
        ))),
    }
}

/// Convert an arbitrary JSON value into BSON.
pub fn bson_from_json(value: Value) -> StoreResult<Bson> {
    Bson::try_from(value).map_err(StoreError::from)
}

/// Render a BSON document as JSON.
pub fn document_to_json(doc: Document) -> Value {
    Value::Object(
        doc.into_iter()
            .map(|(key, value)| (key, bson_to_json(value)))
            .collect(),
    )
}

/// Render a BSON value as JSON.
pub fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::Document(doc) => document_to_json(doc),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        other => other.into_relaxed_extjson(),
    }
}

/// Render a batch of documents as a JSON array.
pub fn documents_to_json(docs: Vec<Document>) -> Value {
    Value::Array(docs.into_iter().map(document_to_json).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;
    use bson::doc;
    use serde_json::json;

    #[test]
    fn object_ids_render_as_plain_hex() {
        let oid = ObjectId::parse_str("65a1f0c2e4b0a1b2c3d4e5f6").unwrap();
        let rendered = document_to_json(doc! { "_id": oid, "title": "Dune" });
        assert_eq!(
            rendered,
            json!({ "_id": "65a1f0c2e4b0a1b2c3d4e5f6", "title": "Dune" })
        );
    }

    #[test]
    fn nested_object_ids_are_flattened() {
        let oid = ObjectId::new();
        let rendered = document_to_json(doc! {
            "author": { "ref": oid },
            "editions": [ { "ref": oid } ],
        });
        assert_eq!(rendered["author"]["ref"], json!(oid.to_hex()));
        assert_eq!(rendered["editions"][0]["ref"], json!(oid.to_hex()));
    }

    #[test]
    fn scalars_render_as_relaxed_json() {
        let rendered = document_to_json(doc! {
            "pages": 412_i32,
            "copies": 9_000_000_000_i64,
            "rating": 4.5,
            "in_print": true,
            "isbn": Bson::Null,
        });
        assert_eq!(
            rendered,
            json!({
                "pages": 412,
                "copies": 9_000_000_000_i64,
                "rating": 4.5,
                "in_print": true,
                "isbn": null,
            })
        );
    }

    #[test]
    fn json_objects_convert_to_documents() {
        let body = json!({ "title": "Dune", "tags": ["scifi", "classic"], "year": 1965 });
        let Value::Object(map) = body else {
            unreachable!()
        };
        let doc = document_from_json(map).unwrap();
        assert_eq!(doc.get_str("title").unwrap(), "Dune");
        assert_eq!(doc.get_array("tags").unwrap().len(), 2);
        assert_eq!(doc.get("year"), Some(&Bson::Int32(1965)));
    }

    #[test]
    fn extended_json_object_id_is_honoured() {
        let body = json!({ "_id": { "$oid": "65a1f0c2e4b0a1b2c3d4e5f6" } });
        let Value::Object(map) = body else {
            unreachable!()
        };
        let doc = document_from_json(map).unwrap();
        assert!(matches!(doc.get("_id"), Some(Bson::ObjectId(_))));
    }

    #[test]
    fn malformed_extended_json_is_a_conversion_error() {
        let body = json!({ "_id": { "$oid": "not-hex" } });
        let Value::Object(map) = body else {
            unreachable!()
        };
        assert!(matches!(
            document_from_json(map),
            Err(StoreError::Conversion(_))
        ));
    }

    #[test]
    fn document_survives_json_round_trip() {
        let original = json!({ "title": "Dune", "author": { "name": "Herbert" } });
        let Value::Object(map) = original.clone() else {
            unreachable!()
        };
        let doc = document_from_json(map).unwrap();
        assert_eq!(document_to_json(doc), original);
    }
}
