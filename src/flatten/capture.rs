//! Capture a `Serialize` value into an owned [`Node`] tree
//!
//! serde's data model already tells us everything the flattener needs:
//! whether a value is a record, a sequence, a map, an `Option` or a leaf,
//! and for records the field names in declaration order. `Box`, `Rc`,
//! `RefCell` and newtype structs serialize transparently and stay
//! transparent here.
//!
//! Each capture owns a [`VisitGuard`]; a record that was already entered
//! during the same capture comes back as a record without fields.
//!
//! Structs with `#[serde(flatten)]` fields serialize as maps of unknown
//! length. When every key turns out to be a string such a map is captured as
//! a record named [`FLATTENED_RECORD`].

use crate::error::{MarshalError, Result};
use crate::flatten::guard::{Visit, VisitGuard};
use crate::types::{Field, Node, Record, Scalar};
use regex::Regex;
use serde::ser::{self, Serialize};
use tracing::trace;

/// Record name given to structs that serialize through `#[serde(flatten)]`
pub const FLATTENED_RECORD: &str = "flattened";

// serde_derive wraps `serialize_with` and `with` fields in a stack temporary
const SERIALIZE_WITH_WRAPPER: &str = "__SerializeWith";

/// Whether `value` borrows from the record itself and can stand for its identity
fn is_stable_borrow<T: ?Sized>(value: &T) -> bool {
    std::mem::size_of_val(value) > 0
        && !std::any::type_name::<T>().contains(SERIALIZE_WITH_WRAPPER)
}

/// State of one record traversal
#[derive(Debug, Default)]
pub struct Traversal {
    guard: VisitGuard,
    reserved: Option<Regex>,
}

impl Traversal {
    pub fn new(reserved: Option<Regex>) -> Self {
        Traversal {
            guard: VisitGuard::new(),
            reserved,
        }
    }

    /// Capture `value` with this traversal's guard
    pub fn capture<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<Node> {
        value.serialize(NodeSerializer { traversal: self })
    }

    fn is_reserved(&self, field_name: &str) -> bool {
        self.reserved
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(field_name))
    }

    /// Enter the record identified by `first_field`; `false` on a revisit
    fn enter<T: ?Sized>(&mut self, first_field: &T, record: &'static str) -> bool {
        let visit = Visit::new(first_field, record);
        if self.guard.enter(visit) {
            return true;
        }
        trace!(record, addr = visit.addr(), "cycle truncated");
        false
    }
}

/// Capture `value` with a fresh traversal
pub fn capture<T: ?Sized + Serialize>(value: &T, reserved: Option<Regex>) -> Result<Node> {
    Traversal::new(reserved).capture(value)
}

pub struct NodeSerializer<'t> {
    traversal: &'t mut Traversal,
}

impl<'t> ser::Serializer for NodeSerializer<'t> {
    type Ok = Node;
    type Error = MarshalError;

    type SerializeSeq = SequenceCapture<'t>;
    type SerializeTuple = SequenceCapture<'t>;
    type SerializeTupleStruct = SequenceCapture<'t>;
    type SerializeTupleVariant = SequenceCapture<'t>;
    type SerializeMap = MapCapture<'t>;
    type SerializeStruct = RecordCapture<'t>;
    type SerializeStructVariant = RecordCapture<'t>;

    fn serialize_bool(self, v: bool) -> Result<Node> {
        Ok(Node::Scalar(Scalar::Bool(v)))
    }

    fn serialize_i8(self, v: i8) -> Result<Node> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<Node> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<Node> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Node> {
        Ok(Node::Scalar(Scalar::I64(v)))
    }

    fn serialize_i128(self, v: i128) -> Result<Node> {
        Ok(Node::Scalar(Scalar::I128(v)))
    }

    fn serialize_u8(self, v: u8) -> Result<Node> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Node> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Node> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Node> {
        Ok(Node::Scalar(Scalar::U64(v)))
    }

    fn serialize_u128(self, v: u128) -> Result<Node> {
        Ok(Node::Scalar(Scalar::U128(v)))
    }

    fn serialize_f32(self, v: f32) -> Result<Node> {
        Ok(Node::Scalar(Scalar::F32(v)))
    }

    fn serialize_f64(self, v: f64) -> Result<Node> {
        Ok(Node::Scalar(Scalar::F64(v)))
    }

    fn serialize_char(self, v: char) -> Result<Node> {
        Ok(Node::Scalar(Scalar::Char(v)))
    }

    fn serialize_str(self, v: &str) -> Result<Node> {
        Ok(Node::Scalar(Scalar::Str(v.to_owned())))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Node> {
        Ok(Node::Scalar(Scalar::Bytes(v.to_vec())))
    }

    fn serialize_none(self) -> Result<Node> {
        Ok(Node::Reference(None))
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Node> {
        let target = value.serialize(self)?;
        Ok(Node::Reference(Some(Box::new(target))))
    }

    fn serialize_unit(self) -> Result<Node> {
        Ok(Node::Scalar(Scalar::Unit))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Node> {
        Ok(Node::Scalar(Scalar::Unit))
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Node> {
        Ok(Node::Scalar(Scalar::Str(variant.to_owned())))
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Node> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        value: &T,
    ) -> Result<Node> {
        value.serialize(self)
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SequenceCapture<'t>> {
        Ok(SequenceCapture::new(self.traversal, len.unwrap_or(0)))
    }

    fn serialize_tuple(self, len: usize) -> Result<SequenceCapture<'t>> {
        Ok(SequenceCapture::new(self.traversal, len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SequenceCapture<'t>> {
        Ok(SequenceCapture::new(self.traversal, len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        len: usize,
    ) -> Result<SequenceCapture<'t>> {
        Ok(SequenceCapture::new(self.traversal, len))
    }

    fn serialize_map(self, len: Option<usize>) -> Result<MapCapture<'t>> {
        Ok(MapCapture::new(self.traversal, len))
    }

    fn serialize_struct(self, name: &'static str, len: usize) -> Result<RecordCapture<'t>> {
        Ok(RecordCapture::new(self.traversal, name, len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<RecordCapture<'t>> {
        Ok(RecordCapture::new(self.traversal, variant, len))
    }
}

/// Collects the elements of sequences and tuples
pub struct SequenceCapture<'t> {
    traversal: &'t mut Traversal,
    items: Vec<Node>,
}

impl<'t> SequenceCapture<'t> {
    fn new(traversal: &'t mut Traversal, len: usize) -> Self {
        SequenceCapture {
            traversal,
            items: Vec::with_capacity(len),
        }
    }

    fn push<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        let item = self.traversal.capture(value)?;
        self.items.push(item);
        Ok(())
    }
}

impl ser::SerializeSeq for SequenceCapture<'_> {
    type Ok = Node;
    type Error = MarshalError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Node> {
        Ok(Node::Sequence(self.items))
    }
}

impl ser::SerializeTuple for SequenceCapture<'_> {
    type Ok = Node;
    type Error = MarshalError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Node> {
        Ok(Node::Sequence(self.items))
    }
}

impl ser::SerializeTupleStruct for SequenceCapture<'_> {
    type Ok = Node;
    type Error = MarshalError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Node> {
        Ok(Node::Sequence(self.items))
    }
}

impl ser::SerializeTupleVariant for SequenceCapture<'_> {
    type Ok = Node;
    type Error = MarshalError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Node> {
        Ok(Node::Sequence(self.items))
    }
}

/// Collects map entries in the order the map yields them
///
/// A map of unknown length may be a flattened struct; its entries then go
/// through the same reserved-name and cycle rules as record fields.
pub struct MapCapture<'t> {
    traversal: &'t mut Traversal,
    entries: Vec<(Node, Node)>,
    pending_key: Option<Node>,
    record_like: bool,
    identified: bool,
    truncated: bool,
}

impl<'t> MapCapture<'t> {
    fn new(traversal: &'t mut Traversal, len: Option<usize>) -> Self {
        MapCapture {
            traversal,
            entries: Vec::with_capacity(len.unwrap_or(0)),
            pending_key: None,
            record_like: len.is_none(),
            identified: false,
            truncated: false,
        }
    }

    fn push<T: ?Sized + Serialize>(&mut self, key: Node, value: &T) -> Result<()> {
        if self.truncated {
            return Ok(());
        }
        if self.record_like {
            if let Node::Scalar(Scalar::Str(name)) = &key {
                if self.traversal.is_reserved(name) {
                    return Ok(());
                }
            }
            if !self.identified && is_stable_borrow(value) {
                self.identified = true;
                if !self.traversal.enter(value, FLATTENED_RECORD) {
                    self.entries.clear();
                    self.truncated = true;
                    return Ok(());
                }
            }
        }

        let value = self.traversal.capture(value)?;
        self.entries.push((key, value));
        Ok(())
    }

    fn finish(self) -> Node {
        if self.truncated {
            return Node::Record(Record::new(FLATTENED_RECORD));
        }
        let string_keyed = self
            .entries
            .iter()
            .all(|(key, _)| matches!(key, Node::Scalar(Scalar::Str(_))));
        if !self.record_like || !string_keyed {
            return Node::Map(self.entries);
        }

        let fields = self
            .entries
            .into_iter()
            .filter_map(|(key, value)| match key {
                Node::Scalar(Scalar::Str(name)) => Some(Field::new(name, value)),
                _ => None,
            })
            .collect();
        Node::Record(Record {
            name: String::from(FLATTENED_RECORD),
            fields,
        })
    }
}

impl ser::SerializeMap for MapCapture<'_> {
    type Ok = Node;
    type Error = MarshalError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<()> {
        self.pending_key = Some(self.traversal.capture(key)?);
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| <MarshalError as ser::Error>::custom("map value without a key"))?;
        self.push(key, value)
    }

    fn end(self) -> Result<Node> {
        Ok(self.finish())
    }
}

/// Collects the fields of a record, cutting it if it was already entered
pub struct RecordCapture<'t> {
    traversal: &'t mut Traversal,
    name: &'static str,
    fields: Vec<Field>,
    identified: bool,
    truncated: bool,
}

impl<'t> RecordCapture<'t> {
    fn new(traversal: &'t mut Traversal, name: &'static str, len: usize) -> Self {
        RecordCapture {
            traversal,
            name,
            fields: Vec::with_capacity(len),
            identified: false,
            truncated: false,
        }
    }

    fn push<T: ?Sized + Serialize>(&mut self, key: &'static str, value: &T) -> Result<()> {
        if self.truncated || self.traversal.is_reserved(key) {
            return Ok(());
        }

        // Identify by the first field that is a real borrow into the record
        if !self.identified && is_stable_borrow(value) {
            self.identified = true;
            if !self.traversal.enter(value, self.name) {
                self.fields.clear();
                self.truncated = true;
                return Ok(());
            }
        }

        let node = self.traversal.capture(value)?;
        self.fields.push(Field::new(key, node));
        Ok(())
    }

    fn finish(self) -> Node {
        Node::Record(Record {
            name: self.name.to_owned(),
            fields: self.fields,
        })
    }
}

impl ser::SerializeStruct for RecordCapture<'_> {
    type Ok = Node;
    type Error = MarshalError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        self.push(key, value)
    }

    fn end(self) -> Result<Node> {
        Ok(self.finish())
    }
}

impl ser::SerializeStructVariant for RecordCapture<'_> {
    type Ok = Node;
    type Error = MarshalError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        self.push(key, value)
    }

    fn end(self) -> Result<Node> {
        Ok(self.finish())
    }
}
