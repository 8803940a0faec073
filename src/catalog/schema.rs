//! Table and index metadata
//!
//! `DbMeta` persists to the `db.meta` file as line-oriented UTF-8 text:
//! database name, table count, then per table its name, column count, one
//! column per line, index count and one index block per index.

use std::collections::BTreeMap;

use crate::catalog::types::ColType;
use crate::error::{Error, Result};

/// Metadata of one column
#[derive(Debug, Clone, PartialEq)]
pub struct ColMeta {
    /// Owning table
    pub tab_name: String,
    pub name: String,
    pub ty: ColType,
    /// Byte width in the record layout
    pub len: usize,
    /// Byte offset in the record layout
    pub offset: usize,
    /// Whether some index uses this column
    pub index: bool,
}

impl ColMeta {
    fn write_line(&self, out: &mut String) {
        out.push_str(&format!(
            "{} {} {} {} {} {}\n",
            self.tab_name,
            self.name,
            self.ty.code(),
            self.len,
            self.offset,
            self.index as i32
        ));
    }

    fn parse_line(line: &str) -> Result<ColMeta> {
        let mut it = line.split_whitespace();
        let mut next = || {
            it.next()
                .ok_or_else(|| Error::Internal(format!("malformed column line '{line}'")))
        };
        let tab_name = next()?.to_string();
        let name = next()?.to_string();
        let ty = ColType::from_code(parse_i32(next()?)?)?;
        let len = parse_i32(next()?)? as usize;
        let offset = parse_i32(next()?)? as usize;
        let index = parse_i32(next()?)? != 0;
        Ok(ColMeta {
            tab_name,
            name,
            ty,
            len,
            offset,
            index,
        })
    }
}

/// Metadata of one index: the ordered key columns and their total width
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMeta {
    pub tab_name: String,
    /// Total key width: sum of column widths
    pub col_tot_len: usize,
    pub cols: Vec<ColMeta>,
}

impl IndexMeta {
    pub fn new(tab_name: &str, cols: Vec<ColMeta>) -> Self {
        let col_tot_len = cols.iter().map(|c| c.len).sum();
        Self {
            tab_name: tab_name.to_string(),
            col_tot_len,
            cols,
        }
    }

    pub fn col_names(&self) -> Vec<String> {
        self.cols.iter().map(|c| c.name.clone()).collect()
    }

    /// Deterministic on-disk file name for this index.
    pub fn file_name(&self) -> String {
        index_file_name(&self.tab_name, &self.col_names())
    }

    /// Extract this index's key bytes from a full record image.
    pub fn key_from_record(&self, record: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.col_tot_len);
        for col in &self.cols {
            key.extend_from_slice(&record[col.offset..col.offset + col.len]);
        }
        key
    }
}

/// Deterministic index file name built from the table and key column names.
pub fn index_file_name(tab_name: &str, col_names: &[String]) -> String {
    let mut name = tab_name.to_string();
    for col in col_names {
        name.push('_');
        name.push_str(col);
    }
    name.push_str(".idx");
    name
}

/// Heap file name for a table.
pub fn table_file_name(tab_name: &str) -> String {
    format!("{tab_name}.tbl")
}

/// Metadata of one table
#[derive(Debug, Clone, Default)]
pub struct TabMeta {
    pub name: String,
    pub cols: Vec<ColMeta>,
    pub indexes: Vec<IndexMeta>,
}

impl TabMeta {
    /// Fixed record width of this table.
    pub fn record_size(&self) -> usize {
        self.cols.iter().map(|c| c.len).sum()
    }

    pub fn is_col(&self, col_name: &str) -> bool {
        self.cols.iter().any(|c| c.name == col_name)
    }

    pub fn get_col(&self, col_name: &str) -> Result<&ColMeta> {
        self.cols
            .iter()
            .find(|c| c.name == col_name)
            .ok_or_else(|| Error::ColumnNotFound(col_name.to_string()))
    }

    pub fn is_index(&self, col_names: &[String]) -> bool {
        self.indexes
            .iter()
            .any(|ix| ix.col_names() == col_names)
    }

    pub fn get_index_meta(&self, col_names: &[String]) -> Result<&IndexMeta> {
        self.indexes
            .iter()
            .find(|ix| ix.col_names() == col_names)
            .ok_or_else(|| Error::IndexNotFound(self.name.clone(), col_names.join(",")))
    }
}

/// Whole-database metadata, persisted in `db.meta`
#[derive(Debug, Clone, Default)]
pub struct DbMeta {
    pub name: String,
    pub tabs: BTreeMap<String, TabMeta>,
}

impl DbMeta {
    pub fn is_table(&self, tab_name: &str) -> bool {
        self.tabs.contains_key(tab_name)
    }

    pub fn get_table(&self, tab_name: &str) -> Result<&TabMeta> {
        self.tabs
            .get(tab_name)
            .ok_or_else(|| Error::TableNotFound(tab_name.to_string()))
    }

    pub fn get_table_mut(&mut self, tab_name: &str) -> Result<&mut TabMeta> {
        self.tabs
            .get_mut(tab_name)
            .ok_or_else(|| Error::TableNotFound(tab_name.to_string()))
    }

    /// Serialize to the line-oriented `db.meta` text format.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{}\n{}\n", self.name, self.tabs.len()));
        for tab in self.tabs.values() {
            out.push_str(&format!("{}\n{}\n", tab.name, tab.cols.len()));
            for col in &tab.cols {
                col.write_line(&mut out);
            }
            out.push_str(&format!("{}\n", tab.indexes.len()));
            for index in &tab.indexes {
                out.push_str(&format!(
                    "{} {} {}\n",
                    index.tab_name,
                    index.col_tot_len,
                    index.cols.len()
                ));
                for col in &index.cols {
                    col.write_line(&mut out);
                }
            }
        }
        out
    }

    /// Parse the line-oriented `db.meta` text format.
    pub fn from_text(text: &str) -> Result<DbMeta> {
        let mut lines = text.lines();
        let mut next = || {
            lines
                .next()
                .ok_or_else(|| Error::Internal("truncated db.meta".to_string()))
        };

        let name = next()?.trim().to_string();
        let tab_count = parse_i32(next()?.trim())? as usize;
        let mut tabs = BTreeMap::new();

        for _ in 0..tab_count {
            let tab_name = next()?.trim().to_string();
            let col_count = parse_i32(next()?.trim())? as usize;
            let mut cols = Vec::with_capacity(col_count);
            for _ in 0..col_count {
                cols.push(ColMeta::parse_line(next()?)?);
            }
            let index_count = parse_i32(next()?.trim())? as usize;
            let mut indexes = Vec::with_capacity(index_count);
            for _ in 0..index_count {
                let hdr = next()?;
                let mut it = hdr.split_whitespace();
                let ix_tab = it
                    .next()
                    .ok_or_else(|| Error::Internal("malformed index header".to_string()))?
                    .to_string();
                let col_tot_len = parse_i32(
                    it.next()
                        .ok_or_else(|| Error::Internal("malformed index header".to_string()))?,
                )? as usize;
                let ix_col_count = parse_i32(
                    it.next()
                        .ok_or_else(|| Error::Internal("malformed index header".to_string()))?,
                )? as usize;
                let mut ix_cols = Vec::with_capacity(ix_col_count);
                for _ in 0..ix_col_count {
                    ix_cols.push(ColMeta::parse_line(next()?)?);
                }
                indexes.push(IndexMeta {
                    tab_name: ix_tab,
                    col_tot_len,
                    cols: ix_cols,
                });
            }
            tabs.insert(
                tab_name.clone(),
                TabMeta {
                    name: tab_name,
                    cols,
                    indexes,
                },
            );
        }

        Ok(DbMeta { name, tabs })
    }
}

fn parse_i32(s: &str) -> Result<i32> {
    s.parse()
        .map_err(|_| Error::Internal(format!("malformed number '{s}' in db.meta")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_meta() -> DbMeta {
        let cols = vec![
            ColMeta {
                tab_name: "t".into(),
                name: "a".into(),
                ty: ColType::Int,
                len: 4,
                offset: 0,
                index: true,
            },
            ColMeta {
                tab_name: "t".into(),
                name: "b".into(),
                ty: ColType::String,
                len: 8,
                offset: 4,
                index: false,
            },
        ];
        let index = IndexMeta::new("t", vec![cols[0].clone()]);
        let tab = TabMeta {
            name: "t".into(),
            cols,
            indexes: vec![index],
        };
        let mut tabs = BTreeMap::new();
        tabs.insert("t".to_string(), tab);
        DbMeta {
            name: "testdb".into(),
            tabs,
        }
    }

    #[test]
    fn test_meta_text_roundtrip() {
        let meta = sample_meta();
        let text = meta.to_text();
        let parsed = DbMeta::from_text(&text).unwrap();

        assert_eq!(parsed.name, "testdb");
        let tab = parsed.get_table("t").unwrap();
        assert_eq!(tab.cols.len(), 2);
        assert_eq!(tab.record_size(), 12);
        assert_eq!(tab.indexes.len(), 1);
        assert_eq!(tab.indexes[0].col_tot_len, 4);
        assert_eq!(tab.indexes[0].cols[0].name, "a");
    }

    #[test]
    fn test_index_helpers() {
        let meta = sample_meta();
        let tab = meta.get_table("t").unwrap();
        assert!(tab.is_index(&["a".to_string()]));
        assert!(!tab.is_index(&["b".to_string()]));

        let ix = tab.get_index_meta(&["a".to_string()]).unwrap();
        assert_eq!(ix.file_name(), "t_a.idx");

        let record = [1, 0, 0, 0, b'x', 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(ix.key_from_record(&record), vec![1, 0, 0, 0]);
    }

    #[test]
    fn test_missing_column() {
        let meta = sample_meta();
        let tab = meta.get_table("t").unwrap();
        assert!(matches!(tab.get_col("zzz"), Err(Error::ColumnNotFound(_))));
    }
}
