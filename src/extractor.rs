use crate::error::{MarshalError, Result};
use crate::flatten::capture;
use crate::json;
use crate::types::{MarshalConfig, Node, Record, Scalar};
use serde::ser::{self, Serialize};
use serde_json::Value;
use tracing::debug;

/// One top-level sequence of records, captured element by element
///
/// A `None` row stands for a nil element and renders as an empty line.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub rows: Vec<Option<Record>>,
}

impl Block {
    /// The record whose shape determines the header
    pub fn header_record(&self) -> Option<&Record> {
        self.rows.first().and_then(Option::as_ref)
    }
}

/// Locate every sequence of records in `value` and capture its rows
///
/// A sequence yields one block; a record yields one block per
/// sequence-typed field, in declaration order. Anything else yields nothing.
pub fn extract<T: ?Sized + Serialize>(value: &T, config: &MarshalConfig) -> Result<Vec<Block>> {
    let blocks = value.serialize(BlockExtractor {
        config,
        position: Position::Root { dereferenced: false },
    })?;
    debug!(blocks = blocks.len(), "extracted table blocks");
    Ok(blocks)
}

/// Same as [`extract`] for a JSON document, with objects taken as records
pub fn extract_json(value: &Value, config: &MarshalConfig) -> Result<Vec<Block>> {
    let mut blocks = Vec::new();
    match value {
        Value::Array(items) => blocks.extend(json_block(items, config)?),
        Value::Object(obj) => {
            for (key, field) in obj.iter() {
                if config.is_reserved(key) {
                    continue;
                }
                if let Value::Array(items) = field {
                    blocks.extend(json_block(items, config)?);
                }
            }
        }
        _ => {}
    }
    debug!(blocks = blocks.len(), "extracted table blocks from JSON");
    Ok(blocks)
}

fn json_block(items: &[Value], config: &MarshalConfig) -> Result<Option<Block>> {
    if items.is_empty() {
        return Ok(None);
    }

    let reserved = config.reserved_fields.as_ref();
    let rows = items
        .iter()
        .enumerate()
        .map(|(index, item)| into_row(index, json::to_node(item, reserved)))
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(Block { rows }))
}

/// Accept a captured sequence element as a row
fn into_row(index: usize, node: Node) -> Result<Option<Record>> {
    match node {
        Node::Record(record) => Ok(Some(record)),
        Node::Reference(None) => Ok(None),
        Node::Reference(Some(target)) => match *target {
            Node::Record(record) => Ok(Some(record)),
            other => Err(MarshalError::NonRecordSequence {
                index,
                found: other.kind(),
            }),
        },
        other => Err(MarshalError::NonRecordSequence {
            index,
            found: other.kind(),
        }),
    }
}

#[derive(Debug, Clone, Copy)]
enum Position {
    /// The value handed to `extract`
    Root { dereferenced: bool },
    /// A field of the top-level record
    Field,
}

/// Top-level serializer: finds the sequences, captures nothing else
struct BlockExtractor<'a> {
    config: &'a MarshalConfig,
    position: Position,
}

impl<'a> ser::Serializer for BlockExtractor<'a> {
    type Ok = Vec<Block>;
    type Error = MarshalError;

    type SerializeSeq = BlockCapture<'a>;
    type SerializeTuple = Ignored;
    type SerializeTupleStruct = Ignored;
    type SerializeTupleVariant = Ignored;
    type SerializeMap = EntryBlocks<'a>;
    type SerializeStruct = FieldBlocks<'a>;
    type SerializeStructVariant = Ignored;

    fn serialize_bool(self, _v: bool) -> Result<Vec<Block>> {
        Ok(Vec::new())
    }

    fn serialize_i8(self, _v: i8) -> Result<Vec<Block>> {
        Ok(Vec::new())
    }

    fn serialize_i16(self, _v: i16) -> Result<Vec<Block>> {
        Ok(Vec::new())
    }

    fn serialize_i32(self, _v: i32) -> Result<Vec<Block>> {
        Ok(Vec::new())
    }

    fn serialize_i64(self, _v: i64) -> Result<Vec<Block>> {
        Ok(Vec::new())
    }

    fn serialize_i128(self, _v: i128) -> Result<Vec<Block>> {
        Ok(Vec::new())
    }

    fn serialize_u8(self, _v: u8) -> Result<Vec<Block>> {
        Ok(Vec::new())
    }

    fn serialize_u16(self, _v: u16) -> Result<Vec<Block>> {
        Ok(Vec::new())
    }

    fn serialize_u32(self, _v: u32) -> Result<Vec<Block>> {
        Ok(Vec::new())
    }

    fn serialize_u64(self, _v: u64) -> Result<Vec<Block>> {
        Ok(Vec::new())
    }

    fn serialize_u128(self, _v: u128) -> Result<Vec<Block>> {
        Ok(Vec::new())
    }

    fn serialize_f32(self, _v: f32) -> Result<Vec<Block>> {
        Ok(Vec::new())
    }

    fn serialize_f64(self, _v: f64) -> Result<Vec<Block>> {
        Ok(Vec::new())
    }

    fn serialize_char(self, _v: char) -> Result<Vec<Block>> {
        Ok(Vec::new())
    }

    fn serialize_str(self, _v: &str) -> Result<Vec<Block>> {
        Ok(Vec::new())
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<Vec<Block>> {
        Ok(Vec::new())
    }

    fn serialize_none(self) -> Result<Vec<Block>> {
        Ok(Vec::new())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Vec<Block>> {
        match self.position {
            // The top-level reference is followed once, and only once
            Position::Root {
                dereferenced: false,
            } => value.serialize(BlockExtractor {
                config: self.config,
                position: Position::Root { dereferenced: true },
            }),
            _ => Ok(Vec::new()),
        }
    }

    fn serialize_unit(self) -> Result<Vec<Block>> {
        Ok(Vec::new())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Vec<Block>> {
        Ok(Vec::new())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
    ) -> Result<Vec<Block>> {
        Ok(Vec::new())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Vec<Block>> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<Vec<Block>> {
        Ok(Vec::new())
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<BlockCapture<'a>> {
        Ok(BlockCapture {
            config: self.config,
            rows: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, _len: usize) -> Result<Ignored> {
        Ok(Ignored)
    }

    fn serialize_tuple_struct(self, _name: &'static str, _len: usize) -> Result<Ignored> {
        Ok(Ignored)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Ignored> {
        Ok(Ignored)
    }

    fn serialize_map(self, len: Option<usize>) -> Result<EntryBlocks<'a>> {
        // Only a flattened struct serializes as a map of unknown length
        Ok(EntryBlocks {
            config: self.config,
            blocks: Vec::new(),
            pending_key: None,
            collect: len.is_none() && matches!(self.position, Position::Root { .. }),
        })
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<FieldBlocks<'a>> {
        Ok(FieldBlocks {
            config: self.config,
            blocks: Vec::new(),
            collect: matches!(self.position, Position::Root { .. }),
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Ignored> {
        Ok(Ignored)
    }
}

/// Captures each element of a top-level sequence with its own traversal
struct BlockCapture<'a> {
    config: &'a MarshalConfig,
    rows: Vec<Option<Record>>,
}

impl ser::SerializeSeq for BlockCapture<'_> {
    type Ok = Vec<Block>;
    type Error = MarshalError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        let node = capture(value, self.config.reserved_fields.clone())?;
        let row = into_row(self.rows.len(), node)?;
        self.rows.push(row);
        Ok(())
    }

    fn end(self) -> Result<Vec<Block>> {
        if self.rows.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Block { rows: self.rows }])
    }
}

/// Collects one block per sequence-typed field of the top-level record
struct FieldBlocks<'a> {
    config: &'a MarshalConfig,
    blocks: Vec<Block>,
    collect: bool,
}

impl ser::SerializeStruct for FieldBlocks<'_> {
    type Ok = Vec<Block>;
    type Error = MarshalError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        if !self.collect || self.config.is_reserved(key) {
            return Ok(());
        }
        let blocks = value.serialize(BlockExtractor {
            config: self.config,
            position: Position::Field,
        })?;
        self.blocks.extend(blocks);
        Ok(())
    }

    fn end(self) -> Result<Vec<Block>> {
        Ok(self.blocks)
    }
}

/// [`FieldBlocks`] for a top-level struct with `#[serde(flatten)]` fields
struct EntryBlocks<'a> {
    config: &'a MarshalConfig,
    blocks: Vec<Block>,
    pending_key: Option<String>,
    collect: bool,
}

impl ser::SerializeMap for EntryBlocks<'_> {
    type Ok = Vec<Block>;
    type Error = MarshalError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<()> {
        if !self.collect {
            return Ok(());
        }
        self.pending_key = match capture(key, None)? {
            Node::Scalar(Scalar::Str(name)) if !self.config.is_reserved(&name) => Some(name),
            _ => None,
        };
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        if self.pending_key.take().is_none() {
            return Ok(());
        }
        let blocks = value.serialize(BlockExtractor {
            config: self.config,
            position: Position::Field,
        })?;
        self.blocks.extend(blocks);
        Ok(())
    }

    fn end(self) -> Result<Vec<Block>> {
        Ok(self.blocks)
    }
}

/// Swallows values that can never hold a block
struct Ignored;

impl ser::SerializeTuple for Ignored {
    type Ok = Vec<Block>;
    type Error = MarshalError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, _value: &T) -> Result<()> {
        Ok(())
    }

    fn end(self) -> Result<Vec<Block>> {
        Ok(Vec::new())
    }
}

impl ser::SerializeTupleStruct for Ignored {
    type Ok = Vec<Block>;
    type Error = MarshalError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, _value: &T) -> Result<()> {
        Ok(())
    }

    fn end(self) -> Result<Vec<Block>> {
        Ok(Vec::new())
    }
}

impl ser::SerializeTupleVariant for Ignored {
    type Ok = Vec<Block>;
    type Error = MarshalError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, _value: &T) -> Result<()> {
        Ok(())
    }

    fn end(self) -> Result<Vec<Block>> {
        Ok(Vec::new())
    }
}

impl ser::SerializeStructVariant for Ignored {
    type Ok = Vec<Block>;
    type Error = MarshalError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        _key: &'static str,
        _value: &T,
    ) -> Result<()> {
        Ok(())
    }

    fn end(self) -> Result<Vec<Block>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use serde_json::json;

    #[derive(Serialize)]
    struct Row {
        id: u32,
    }

    #[derive(Serialize)]
    struct Response {
        name: String,
        first: Vec<Row>,
        count: u32,
        second: Vec<Row>,
        empty: Vec<Row>,
    }

    #[test]
    fn test_sequence_yields_one_block() {
        let rows = vec![Row { id: 1 }, Row { id: 2 }];
        let blocks = extract(&rows, &MarshalConfig::default()).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].rows.len(), 2);
        assert_eq!(blocks[0].header_record().unwrap().name, "Row");
    }

    #[test]
    fn test_record_yields_block_per_sequence_field() {
        let response = Response {
            name: "r".into(),
            first: vec![Row { id: 1 }],
            count: 3,
            second: vec![Row { id: 2 }, Row { id: 3 }],
            empty: Vec::new(),
        };

        let blocks = extract(&response, &MarshalConfig::default()).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].rows.len(), 1);
        assert_eq!(blocks[1].rows.len(), 2);
    }

    #[test]
    fn test_other_shapes_yield_nothing() {
        let config = MarshalConfig::default();
        assert!(extract(&42, &config).unwrap().is_empty());
        assert!(extract("text", &config).unwrap().is_empty());
        assert!(extract(&None::<Vec<Row>>, &config).unwrap().is_empty());
        assert!(extract(&Vec::<Row>::new(), &config).unwrap().is_empty());
    }

    #[test]
    fn test_reference_is_followed_once() {
        let config = MarshalConfig::default();
        let once = Some(vec![Row { id: 1 }]);
        let twice = Some(Some(vec![Row { id: 1 }]));

        assert_eq!(extract(&once, &config).unwrap().len(), 1);
        assert!(extract(&twice, &config).unwrap().is_empty());
    }

    #[test]
    fn test_non_record_elements_are_rejected() {
        let err = extract(&vec!["a", "b"], &MarshalConfig::default()).unwrap_err();
        assert_eq!(
            err,
            MarshalError::NonRecordSequence {
                index: 0,
                found: "scalar"
            }
        );
    }

    #[test]
    fn test_nil_elements_become_empty_rows() {
        let rows = vec![Some(Row { id: 1 }), None];
        let blocks = extract(&rows, &MarshalConfig::default()).unwrap();
        assert_eq!(blocks[0].rows.len(), 2);
        assert!(blocks[0].rows[1].is_none());
    }

    #[test]
    fn test_json_objects_are_records() {
        let doc = json!({
            "users": [{"id": 1}, {"id": 2}],
            "total": 2,
            "tags": []
        });
        let blocks = extract_json(&doc, &MarshalConfig::default()).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].rows.len(), 2);

        let err = extract_json(&json!([1, 2]), &MarshalConfig::default()).unwrap_err();
        assert!(matches!(err, MarshalError::NonRecordSequence { index: 0, .. }));
    }

    #[derive(Serialize)]
    struct Audit {
        created: u64,
    }

    #[derive(Serialize)]
    struct AuditedRow {
        id: u32,
        #[serde(flatten)]
        audit: Audit,
    }

    #[test]
    fn test_flattened_elements_are_rows() {
        let rows = vec![AuditedRow {
            id: 1,
            audit: Audit { created: 5 },
        }];
        let blocks = extract(&rows, &MarshalConfig::default()).unwrap();
        let record = blocks[0].header_record().unwrap();
        let names: Vec<&str> = record.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "created"]);
    }

    #[test]
    fn test_flattened_root_yields_field_blocks() {
        #[derive(Serialize)]
        #[allow(non_snake_case)]
        struct Page {
            #[serde(flatten)]
            audit: Audit,
            rows: Vec<Row>,
            XXX_hidden: Vec<Row>,
        }

        let page = Page {
            audit: Audit { created: 1 },
            rows: vec![Row { id: 1 }, Row { id: 2 }],
            XXX_hidden: vec![Row { id: 3 }],
        };
        let blocks = extract(&page, &MarshalConfig::default()).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].rows.len(), 2);

        // Sized maps are plain maps, never a source of blocks
        let mut map = std::collections::BTreeMap::new();
        map.insert("rows", vec![Row { id: 1 }]);
        assert!(extract(&map, &MarshalConfig::default()).unwrap().is_empty());
    }
}
