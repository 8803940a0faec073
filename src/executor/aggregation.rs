//! Single-group aggregation
//!
//! Consumes the whole child maintaining one accumulator per aggregate
//! column, then emits exactly one row. MIN/MAX start from the type extrema,
//! SUM from zero (rejected for strings), COUNT and COUNT(*) from zero.
//! There are no NULLs in this engine, so COUNT(*) equals the row count.

use crate::catalog::schema::ColMeta;
use crate::catalog::types::{
    compare_bytes, type_max_bytes, type_min_bytes, AggType, ColType,
};
use crate::error::{Error, Result};

use super::executor::{find_col, Executor, Record};
use super::plan::AggSpec;

struct Accumulator {
    agg: AggType,
    ty: ColType,
    len: usize,
    /// Input column position; `None` for COUNT(*)
    src: Option<(usize, usize)>,
    value: Vec<u8>,
    count: i32,
}

impl Accumulator {
    fn feed(&mut self, record: &[u8]) {
        match self.agg {
            AggType::CountStar => self.count += 1,
            AggType::Count => self.count += 1,
            AggType::Max => {
                let (off, len) = self.src.unwrap();
                let bytes = &record[off..off + len];
                if compare_bytes(self.ty, self.len, bytes, &self.value).is_gt() {
                    self.value = bytes.to_vec();
                }
            }
            AggType::Min => {
                let (off, len) = self.src.unwrap();
                let bytes = &record[off..off + len];
                if compare_bytes(self.ty, self.len, bytes, &self.value).is_lt() {
                    self.value = bytes.to_vec();
                }
            }
            AggType::Sum => {
                let (off, len) = self.src.unwrap();
                let bytes = &record[off..off + len];
                match self.ty {
                    ColType::Int => {
                        let cur = i32::from_le_bytes(self.value[..4].try_into().unwrap());
                        let add = i32::from_le_bytes(bytes[..4].try_into().unwrap());
                        self.value = cur.wrapping_add(add).to_le_bytes().to_vec();
                    }
                    ColType::Bigint => {
                        let cur = i64::from_le_bytes(self.value[..8].try_into().unwrap());
                        let add = i64::from_le_bytes(bytes[..8].try_into().unwrap());
                        self.value = cur.wrapping_add(add).to_le_bytes().to_vec();
                    }
                    ColType::Float => {
                        let cur = f32::from_le_bytes(self.value[..4].try_into().unwrap());
                        let add = f32::from_le_bytes(bytes[..4].try_into().unwrap());
                        self.value = (cur + add).to_le_bytes().to_vec();
                    }
                    _ => unreachable!("SUM over non-numeric column"),
                }
            }
        }
    }

    fn finish(&self) -> Vec<u8> {
        match self.agg {
            AggType::Count | AggType::CountStar => self.count.to_le_bytes().to_vec(),
            _ => self.value.clone(),
        }
    }
}

pub struct AggregationExecutor {
    child: Box<dyn Executor>,
    cols: Vec<ColMeta>,
    aggs: Vec<AggSpec>,
    row: Option<Record>,
    done: bool,
}

impl AggregationExecutor {
    pub fn new(child: Box<dyn Executor>, aggs: Vec<AggSpec>) -> Result<Self> {
        let mut cols = Vec::with_capacity(aggs.len());
        let mut offset = 0;
        for spec in &aggs {
            let (ty, len, tab) = match (&spec.col, spec.agg) {
                (_, AggType::CountStar) | (_, AggType::Count) => (ColType::Int, 4, String::new()),
                (Some(col), _) => {
                    let src = find_col(child.columns(), col)?;
                    (src.ty, src.len, src.tab_name.clone())
                }
                (None, _) => {
                    return Err(Error::Internal(
                        "aggregate other than COUNT(*) needs a column".to_string(),
                    ))
                }
            };
            if spec.agg == AggType::Sum && !matches!(ty, ColType::Int | ColType::Bigint | ColType::Float)
            {
                return Err(Error::IncompatibleType {
                    lhs: "SUM".to_string(),
                    rhs: ty.to_string(),
                });
            }
            cols.push(ColMeta {
                tab_name: tab,
                name: spec.out_name.clone(),
                ty,
                len,
                offset,
                index: false,
            });
            offset += len;
        }
        Ok(Self {
            child,
            cols,
            aggs,
            row: None,
            done: false,
        })
    }

    fn run(&mut self) -> Result<()> {
        let mut accs = Vec::with_capacity(self.aggs.len());
        for (spec, out) in self.aggs.iter().zip(&self.cols) {
            let src = match &spec.col {
                Some(col) if spec.agg != AggType::CountStar => {
                    let meta = find_col(self.child.columns(), col)?;
                    Some((meta.offset, meta.len))
                }
                _ => None,
            };
            let value = match spec.agg {
                AggType::Max => type_min_bytes(out.ty, out.len),
                AggType::Min => type_max_bytes(out.ty, out.len),
                AggType::Sum => vec![0u8; out.len],
                AggType::Count | AggType::CountStar => Vec::new(),
            };
            accs.push(Accumulator {
                agg: spec.agg,
                ty: out.ty,
                len: out.len,
                src,
                value,
                count: 0,
            });
        }

        self.child.begin_tuple()?;
        while !self.child.is_end() {
            let record = self.child.next()?;
            for acc in &mut accs {
                acc.feed(&record.data);
            }
            self.child.next_tuple()?;
        }

        let mut data = Vec::with_capacity(self.tuple_len());
        for acc in &accs {
            data.extend_from_slice(&acc.finish());
        }
        self.row = Some(Record::new(data));
        Ok(())
    }
}

impl Executor for AggregationExecutor {
    fn begin_tuple(&mut self) -> Result<()> {
        if self.row.is_none() {
            self.run()?;
        }
        self.done = false;
        Ok(())
    }

    fn next_tuple(&mut self) -> Result<()> {
        self.done = true;
        Ok(())
    }

    fn is_end(&self) -> bool {
        self.done || self.row.is_none()
    }

    fn next(&mut self) -> Result<Record> {
        Ok(self.row.clone().unwrap())
    }

    fn columns(&self) -> &[ColMeta] {
        &self.cols
    }
}
