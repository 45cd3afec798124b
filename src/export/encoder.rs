//! Document encoders
//!
//! Turns one document into a byte payload and a file name:
//! - `json`: human-readable, lossy. ObjectIds, dates, 64-bit integers and
//!   decimals are flattened to plain JSON strings and numbers, so reading
//!   the files back does not restore the original BSON types.
//! - `bson`: the raw BSON bytes, round-trip safe for every BSON type.
//!
//! A [`CustomEncoder`] replaces both and takes over storage as well.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use mongodb::bson::{Bson, Document};
use serde_json::Value as JsonValue;

use crate::error::{ConfigError, Result};

/// Encodes a document into the payload of one file
pub trait DocumentEncoder: Send + Sync {
    /// File extension, without the dot
    fn extension(&self) -> &'static str;

    /// Encode a whole document
    fn encode(&self, doc: &Document) -> Result<Vec<u8>>;
}

/// Caller-supplied export of a single document
///
/// Receives the raw document and the collection's destination (a real
/// directory, or the virtual path of the collection inside an archive) and
/// is responsible for encoding and storing it.
#[async_trait]
pub trait CustomEncoder: Send + Sync {
    async fn export(&self, doc: Document, destination: &Path) -> Result<()>;
}

/// Encoding selected for a run
#[derive(Clone)]
pub enum Parser {
    Json,
    Bson,
    Custom(Arc<dyn CustomEncoder>),
}

impl fmt::Debug for Parser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parser::Json => f.write_str("Json"),
            Parser::Bson => f.write_str("Bson"),
            Parser::Custom(_) => f.write_str("Custom"),
        }
    }
}

impl FromStr for Parser {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Parser::Json),
            "bson" => Ok(Parser::Bson),
            _ => Err(ConfigError::InvalidValue {
                field: "parser".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Resolved encoding, built once per run
#[derive(Clone)]
pub enum Encoding {
    Builtin(Arc<dyn DocumentEncoder>),
    Custom(Arc<dyn CustomEncoder>),
}

impl From<&Parser> for Encoding {
    fn from(parser: &Parser) -> Self {
        match parser {
            Parser::Json => Encoding::Builtin(Arc::new(JsonEncoder)),
            Parser::Bson => Encoding::Builtin(Arc::new(BsonEncoder)),
            Parser::Custom(custom) => Encoding::Custom(Arc::clone(custom)),
        }
    }
}

/// Plain JSON encoder
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonEncoder;

impl DocumentEncoder for JsonEncoder {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn encode(&self, doc: &Document) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&document_to_json(doc))?)
    }
}

/// Raw BSON encoder
#[derive(Debug, Default, Clone, Copy)]
pub struct BsonEncoder;

impl DocumentEncoder for BsonEncoder {
    fn extension(&self) -> &'static str {
        "bson"
    }

    fn encode(&self, doc: &Document) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        doc.to_writer(&mut buf)?;
        Ok(buf)
    }
}

/// File name for `doc`: its `_id` plus `.ext`
///
/// Returns `None` for documents without an `_id`. Path separators in string
/// ids are replaced so every document stays inside its collection directory.
///
/// The name drops the BSON type of the id: `1`, `"1"` and `1.0` all map to
/// `1.<ext>`, and a later document overwrites an earlier one of that name.
pub fn file_name(doc: &Document, extension: &str) -> Option<String> {
    let id = match doc.get("_id")? {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        Bson::Double(f) => f.to_string(),
        Bson::Boolean(b) => b.to_string(),
        other => other.clone().into_relaxed_extjson().to_string(),
    };
    let id: String = id
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    Some(format!("{id}.{extension}"))
}

/// Convert a document to plain JSON, dropping BSON type information
pub fn document_to_json(doc: &Document) -> JsonValue {
    let map = doc
        .iter()
        .map(|(key, value)| (key.clone(), bson_to_json(value)))
        .collect();
    JsonValue::Object(map)
}

fn bson_to_json(value: &Bson) -> JsonValue {
    match value {
        Bson::String(s) => JsonValue::String(s.clone()),
        Bson::Int32(n) => JsonValue::Number((*n).into()),
        Bson::Int64(n) => JsonValue::Number((*n).into()),
        Bson::Double(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Bson::Boolean(b) => JsonValue::Bool(*b),
        Bson::Null | Bson::Undefined => JsonValue::Null,
        Bson::ObjectId(oid) => JsonValue::String(oid.to_hex()),
        Bson::DateTime(dt) => JsonValue::String(
            dt.try_to_rfc3339_string()
                .unwrap_or_else(|_| dt.timestamp_millis().to_string()),
        ),
        Bson::Decimal128(d) => JsonValue::String(d.to_string()),
        Bson::Array(arr) => JsonValue::Array(arr.iter().map(bson_to_json).collect()),
        Bson::Document(doc) => document_to_json(doc),
        Bson::Binary(bin) => JsonValue::String(
            base64::engine::general_purpose::STANDARD.encode(&bin.bytes),
        ),
        Bson::RegularExpression(regex) => {
            JsonValue::String(format!("/{}/{}", regex.pattern, regex.options))
        }
        Bson::Timestamp(ts) => serde_json::json!({ "t": ts.time, "i": ts.increment }),
        Bson::Symbol(s) => JsonValue::String(s.clone()),
        Bson::JavaScriptCode(code) => JsonValue::String(code.clone()),
        Bson::JavaScriptCodeWithScope(code) => JsonValue::String(code.code.clone()),
        Bson::MinKey => JsonValue::String("MinKey".to_string()),
        Bson::MaxKey => JsonValue::String("MaxKey".to_string()),
        other => other.clone().into_relaxed_extjson(),
    }
}
