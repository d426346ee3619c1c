use crate::format::{self, ScalarFormatter};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// Default terminator appended to every rendered row
pub const DEFAULT_ROW_DELIM: &str = "\n";

/// Default separator between the columns of a row
pub const DEFAULT_FIELD_DELIM: &str = ";";

/// Default separator between the elements merged into one cell
pub const DEFAULT_INNER_DELIM: &str = "|";

/// Fixed separator placed between two rendered blocks
pub const BLOCK_SEPARATOR: &str = "---\n";

// Fields generated by protobuf toolchains carry this prefix
static RESERVED_FIELDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^XXX_").unwrap());

/// A leaf value, rendered into a single cell by the scalar formatter
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Unit,
    Bool(bool),
    I64(i64),
    U64(u64),
    I128(i128),
    U128(u128),
    F32(f32),
    F64(f64),
    Char(char),
    Str(String),
    Bytes(Vec<u8>),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Unit => Ok(()),
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::I64(v) => write!(f, "{}", v),
            Scalar::U64(v) => write!(f, "{}", v),
            Scalar::I128(v) => write!(f, "{}", v),
            Scalar::U128(v) => write!(f, "{}", v),
            Scalar::F32(v) => write!(f, "{}", v),
            Scalar::F64(v) => write!(f, "{}", v),
            Scalar::Char(v) => write!(f, "{}", v),
            Scalar::Str(v) => f.write_str(v),
            Scalar::Bytes(v) => f.write_str(&String::from_utf8_lossy(v)),
        }
    }
}

/// Shape of a captured value
///
/// `Node` is the owned result of walking one record: every container is
/// materialized, every cyclic edge has already been cut.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Scalar(Scalar),
    Record(Record),
    Sequence(Vec<Node>),
    Map(Vec<(Node, Node)>),
    /// A nullable reference (`Option`); `None` is the nil reference
    Reference(Option<Box<Node>>),
}

impl Node {
    /// Short name of the shape, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Scalar(_) => "scalar",
            Node::Record(_) => "record",
            Node::Sequence(_) => "sequence",
            Node::Map(_) => "map",
            Node::Reference(_) => "reference",
        }
    }

    /// The record behind this node, following at most one reference
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Node::Record(record) => Some(record),
            Node::Reference(Some(target)) => match target.as_ref() {
                Node::Record(record) => Some(record),
                _ => None,
            },
            _ => None,
        }
    }
}

/// A fixed-shape aggregate with named fields in declaration order
///
/// A record cut by the cycle guard keeps its name but has no fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub name: String,
    pub fields: Vec<Field>,
}

impl Record {
    pub fn new(name: impl Into<String>) -> Self {
        Record {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Node) -> Self {
        self.fields.push(Field::new(name, value));
        self
    }
}

/// One named field of a record
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: Node,
}

impl Field {
    pub fn new(name: impl Into<String>, value: Node) -> Self {
        Field {
            name: name.into(),
            value,
        }
    }
}

/// Order of the entries rendered into a map cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MapOrder {
    /// Whatever order the map's own `Serialize` impl yields
    #[default]
    Iteration,
    /// Sorted by the rendered key
    SortedByKey,
}

/// Configuration for rendering tables
#[derive(Clone)]
pub struct MarshalConfig {
    /// Terminates each rendered row
    pub row_delim: String,

    /// Separates the columns of a row
    pub field_delim: String,

    /// Separates the elements merged into one sequence or map cell
    pub inner_delim: String,

    /// Omit the header line of every block
    pub no_header: bool,

    /// Renders every leaf value
    pub formatter: ScalarFormatter,

    /// Field names matching this pattern never appear in header or rows
    pub reserved_fields: Option<Regex>,

    /// Entry order inside map cells
    pub map_order: MapOrder,
}

impl Default for MarshalConfig {
    fn default() -> Self {
        MarshalConfig {
            row_delim: String::from(DEFAULT_ROW_DELIM),
            field_delim: String::from(DEFAULT_FIELD_DELIM),
            inner_delim: String::from(DEFAULT_INNER_DELIM),
            no_header: false,
            formatter: Arc::new(format::default_scalar),
            reserved_fields: Some(RESERVED_FIELDS.clone()),
            map_order: MapOrder::Iteration,
        }
    }
}

impl fmt::Debug for MarshalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarshalConfig")
            .field("row_delim", &self.row_delim)
            .field("field_delim", &self.field_delim)
            .field("inner_delim", &self.inner_delim)
            .field("no_header", &self.no_header)
            .field("reserved_fields", &self.reserved_fields.as_ref().map(Regex::as_str))
            .field("map_order", &self.map_order)
            .finish_non_exhaustive()
    }
}

impl MarshalConfig {
    /// Replace empty delimiters with their defaults
    pub fn with_defaults(mut self) -> Self {
        if self.row_delim.is_empty() {
            self.row_delim = String::from(DEFAULT_ROW_DELIM);
        }
        if self.field_delim.is_empty() {
            self.field_delim = String::from(DEFAULT_FIELD_DELIM);
        }
        if self.inner_delim.is_empty() {
            self.inner_delim = String::from(DEFAULT_INNER_DELIM);
        }
        self
    }

    pub fn with_row_delim(mut self, delim: impl Into<String>) -> Self {
        self.row_delim = delim.into();
        self
    }

    pub fn with_field_delim(mut self, delim: impl Into<String>) -> Self {
        self.field_delim = delim.into();
        self
    }

    pub fn with_inner_delim(mut self, delim: impl Into<String>) -> Self {
        self.inner_delim = delim.into();
        self
    }

    pub fn without_header(mut self) -> Self {
        self.no_header = true;
        self
    }

    pub fn with_formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&Scalar) -> String + Send + Sync + 'static,
    {
        self.formatter = Arc::new(formatter);
        self
    }

    pub fn with_reserved_fields(mut self, pattern: Option<Regex>) -> Self {
        self.reserved_fields = pattern;
        self
    }

    pub fn with_map_order(mut self, order: MapOrder) -> Self {
        self.map_order = order;
        self
    }

    /// Whether a field with this name is excluded from the table
    pub fn is_reserved(&self, field_name: &str) -> bool {
        self.reserved_fields
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(field_name))
    }

    /// Render a leaf value through the configured formatter
    pub fn render_scalar(&self, scalar: &Scalar) -> String {
        (self.formatter)(scalar)
    }
}
