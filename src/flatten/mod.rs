//! Row flattening - expand one record into header columns or data cells
//!
//! Flattening runs in two steps. [`capture`] walks a `Serialize` value with a
//! fresh cycle guard and produces an owned [`Node`] tree; [`RowFlattener`]
//! then renders a captured record either as column names or as cell values.
//! The same skip and truncation rules apply to both modes, so a header and a
//! row built from records of the same shape always have the same width.

pub mod capture;
pub mod guard;

pub use capture::{capture, Traversal};
pub use guard::{Visit, VisitGuard};

use crate::types::{MapOrder, MarshalConfig, Node, Record, Scalar};

/// What a flattening pass produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Column names
    Header,
    /// Rendered cell values
    Data,
}

/// Renders captured records as rows
pub struct RowFlattener<'a> {
    config: &'a MarshalConfig,
}

impl<'a> RowFlattener<'a> {
    pub fn new(config: &'a MarshalConfig) -> Self {
        RowFlattener { config }
    }

    /// Flatten a record into its columns (header) or cells (data)
    pub fn flatten(&self, record: &Record, mode: Mode) -> Vec<String> {
        let mut columns = Vec::new();
        self.flatten_into(record, mode, &mut columns);
        columns
    }

    fn flatten_into(&self, record: &Record, mode: Mode, columns: &mut Vec<String>) {
        for field in &record.fields {
            match &field.value {
                Node::Map(entries) => columns.push(match mode {
                    Mode::Header => field.name.clone(),
                    Mode::Data => self.map_cell(entries),
                }),
                Node::Sequence(items) => columns.push(match mode {
                    Mode::Header => field.name.clone(),
                    Mode::Data => self.sequence_cell(items),
                }),
                Node::Record(inner) => self.flatten_into(inner, mode, columns),
                // Only a reference to a record takes up columns
                Node::Reference(Some(target)) => {
                    if let Node::Record(inner) = target.as_ref() {
                        self.flatten_into(inner, mode, columns);
                    }
                }
                Node::Reference(None) => {}
                Node::Scalar(scalar) => columns.push(match mode {
                    Mode::Header => field.name.clone(),
                    Mode::Data => self.scalar(scalar),
                }),
            }
        }
    }

    fn map_cell(&self, entries: &[(Node, Node)]) -> String {
        let mut rendered: Vec<(String, String)> = entries
            .iter()
            .map(|(key, value)| (self.inline(key), self.inline(value)))
            .collect();

        if self.config.map_order == MapOrder::SortedByKey {
            rendered.sort_by(|a, b| a.0.cmp(&b.0));
        }

        rendered
            .iter()
            .map(|(key, value)| format!("{}:{}", key, value))
            .collect::<Vec<_>>()
            .join(&self.config.inner_delim)
    }

    fn sequence_cell(&self, items: &[Node]) -> String {
        let mut parts = Vec::with_capacity(items.len());
        for item in items {
            match item {
                // Record elements contribute their cells flat, not as one nested cell
                Node::Record(record) => self.flatten_into(record, Mode::Data, &mut parts),
                other => parts.push(self.inline(other)),
            }
        }
        parts.join(&self.config.inner_delim)
    }

    /// Render any node into the text of a single cell
    fn inline(&self, node: &Node) -> String {
        match node {
            Node::Scalar(scalar) => self.scalar(scalar),
            Node::Record(record) => self
                .flatten(record, Mode::Data)
                .join(&self.config.inner_delim),
            Node::Sequence(items) => self.sequence_cell(items),
            Node::Map(entries) => self.map_cell(entries),
            Node::Reference(Some(target)) => self.inline(target),
            Node::Reference(None) => String::new(),
        }
    }

    fn scalar(&self, scalar: &Scalar) -> String {
        self.config.render_scalar(scalar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format;

    fn text(s: &str) -> Node {
        Node::Scalar(Scalar::Str(s.to_string()))
    }

    fn int(v: i64) -> Node {
        Node::Scalar(Scalar::I64(v))
    }

    fn sample() -> Record {
        Record::new("outer")
            .with_field("col1", text("a"))
            .with_field("slice", Node::Sequence(vec![text("a"), text("b")]))
            .with_field(
                "map",
                Node::Map(vec![(int(3), int(4)), (int(1), int(2))]),
            )
            .with_field(
                "inner",
                Node::Record(
                    Record::new("inner")
                        .with_field("col3", text("c"))
                        .with_field("col4", int(6)),
                ),
            )
            .with_field("missing", Node::Reference(None))
    }

    #[test]
    fn test_header_and_row_have_same_width() {
        let config = MarshalConfig::default();
        let flattener = RowFlattener::new(&config);

        let header = flattener.flatten(&sample(), Mode::Header);
        let row = flattener.flatten(&sample(), Mode::Data);

        assert_eq!(header, vec!["col1", "slice", "map", "col3", "col4"]);
        assert_eq!(row, vec!["a", "a|b", "3:4|1:2", "c", "6"]);
    }

    #[test]
    fn test_sorted_map_order() {
        let config = MarshalConfig::default().with_map_order(MapOrder::SortedByKey);
        let row = RowFlattener::new(&config).flatten(&sample(), Mode::Data);
        assert_eq!(row[2], "1:2|3:4");
    }

    #[test]
    fn test_reference_to_scalar_contributes_nothing() {
        let record = Record::new("r")
            .with_field("a", text("x"))
            .with_field("b", Node::Reference(Some(Box::new(text("y")))));
        let config = MarshalConfig::default();
        let flattener = RowFlattener::new(&config);

        assert_eq!(flattener.flatten(&record, Mode::Header), vec!["a"]);
        assert_eq!(flattener.flatten(&record, Mode::Data), vec!["x"]);
    }

    #[test]
    fn test_reference_to_record_is_spliced() {
        let target = Record::new("t").with_field("deep", int(9));
        let record = Record::new("r")
            .with_field("a", text("x"))
            .with_field(
                "b",
                Node::Reference(Some(Box::new(Node::Record(target)))),
            );
        let config = MarshalConfig::default();
        let flattener = RowFlattener::new(&config);

        assert_eq!(flattener.flatten(&record, Mode::Header), vec!["a", "deep"]);
        assert_eq!(flattener.flatten(&record, Mode::Data), vec!["x", "9"]);
    }

    #[test]
    fn test_record_elements_are_spliced_into_cell() {
        let point = |x: i64, y: i64| {
            Node::Record(
                Record::new("point")
                    .with_field("x", int(x))
                    .with_field("y", int(y)),
            )
        };
        let record = Record::new("path")
            .with_field("points", Node::Sequence(vec![point(1, 2), point(3, 4)]))
            .with_field(
                "named",
                Node::Map(vec![(text("origin"), point(0, 0))]),
            );
        let config = MarshalConfig::default().with_inner_delim(",");
        let flattener = RowFlattener::new(&config);

        assert_eq!(flattener.flatten(&record, Mode::Header), vec!["points", "named"]);
        assert_eq!(
            flattener.flatten(&record, Mode::Data),
            vec!["1,2,3,4", "origin:0,0"]
        );
    }

    #[test]
    fn test_nested_containers_render_inline() {
        let record = Record::new("r").with_field(
            "grid",
            Node::Sequence(vec![
                Node::Sequence(vec![int(1), int(2)]),
                Node::Reference(None),
                Node::Map(vec![(text("k"), text("v"))]),
            ]),
        );
        let config = MarshalConfig::default();
        let row = RowFlattener::new(&config).flatten(&record, Mode::Data);
        assert_eq!(row, vec!["1|2||k:v"]);
    }

    #[test]
    fn test_formatter_applies_to_leaves() {
        let record = Record::new("r")
            .with_field("price", Node::Scalar(Scalar::F64(9.5)))
            .with_field("prices", Node::Sequence(vec![Node::Scalar(Scalar::F64(0.25))]))
            .with_field("count", int(3));
        let mut config = MarshalConfig::default();
        config.formatter = format::decimal_separator(',');
        let row = RowFlattener::new(&config).flatten(&record, Mode::Data);
        assert_eq!(row, vec!["9,5", "0,25", "3"]);

        let config = MarshalConfig::default().with_formatter(|s: &Scalar| format!("<{}>", s));
        let row = RowFlattener::new(&config).flatten(&record, Mode::Data);
        assert_eq!(row, vec!["<9.5>", "<0.25>", "<3>"]);
    }

    #[test]
    fn test_truncated_record_contributes_nothing() {
        let record = Record::new("r")
            .with_field("a", text("x"))
            .with_field("cycle", Node::Record(Record::new("r")));
        let config = MarshalConfig::default();
        let flattener = RowFlattener::new(&config);

        assert_eq!(flattener.flatten(&record, Mode::Header), vec!["a"]);
        assert_eq!(flattener.flatten(&record, Mode::Data), vec!["x"]);
    }
}
