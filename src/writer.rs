use crate::extractor::Block;
use crate::flatten::{Mode, RowFlattener};
use crate::types::{MarshalConfig, BLOCK_SEPARATOR};

/// Renders captured blocks as delimited text
pub struct TableWriter<'a> {
    config: &'a MarshalConfig,
}

impl<'a> TableWriter<'a> {
    pub fn new(config: &'a MarshalConfig) -> Self {
        TableWriter { config }
    }

    /// Render all blocks, separated by [`BLOCK_SEPARATOR`]
    pub fn render(&self, blocks: &[Block]) -> String {
        blocks
            .iter()
            .map(|block| self.render_block(block))
            .collect::<Vec<_>>()
            .join(BLOCK_SEPARATOR)
    }

    /// Render one block: the optional header, then one line per row
    pub fn render_block(&self, block: &Block) -> String {
        let flattener = RowFlattener::new(self.config);
        let mut out = String::new();

        if !self.config.no_header {
            let header = block
                .header_record()
                .map(|record| flattener.flatten(record, Mode::Header))
                .unwrap_or_default();
            self.push_row(&mut out, &header);
        }

        for row in &block.rows {
            let cells = row
                .as_ref()
                .map(|record| flattener.flatten(record, Mode::Data))
                .unwrap_or_default();
            self.push_row(&mut out, &cells);
        }

        out
    }

    fn push_row(&self, out: &mut String, cells: &[String]) {
        out.push_str(&cells.join(&self.config.field_delim));
        out.push_str(&self.config.row_delim);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Node, Record, Scalar};

    fn row(id: u64, name: &str) -> Option<Record> {
        Some(
            Record::new("row")
                .with_field("id", Node::Scalar(Scalar::U64(id)))
                .with_field("name", Node::Scalar(Scalar::Str(name.into()))),
        )
    }

    #[test]
    fn test_single_block() {
        let block = Block {
            rows: vec![row(1, "a"), row(2, "b")],
        };
        let config = MarshalConfig::default();
        let out = TableWriter::new(&config).render(&[block]);
        assert_eq!(out, "id;name\n1;a\n2;b\n");
    }

    #[test]
    fn test_blocks_are_separated() {
        let blocks = vec![
            Block { rows: vec![row(1, "a")] },
            Block { rows: vec![row(2, "b")] },
        ];
        let config = MarshalConfig::default()
            .with_field_delim(",")
            .with_row_delim("\r\n");
        let out = TableWriter::new(&config).render(&blocks);
        assert_eq!(out, "id,name\r\n1,a\r\n---\nid,name\r\n2,b\r\n");
    }

    #[test]
    fn test_without_header_and_nil_rows() {
        let block = Block {
            rows: vec![row(1, "a"), None],
        };
        let config = MarshalConfig::default().without_header();
        let out = TableWriter::new(&config).render(&[block]);
        assert_eq!(out, "1;a\n\n");
    }
}
