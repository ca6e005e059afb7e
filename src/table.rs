// src/table.rs

use arrow::{
    array::ArrayRef,
    compute::concat,
    datatypes::{Schema, SchemaRef},
    record_batch::RecordBatch,
    util::pretty::pretty_format_batches,
};
use std::sync::Arc;

use crate::error::Result;

/// A fully materialized table: one schema, zero or more record batches.
///
/// This is what the loader reads sources into and what `fetch_df` returns.
#[derive(Debug, Clone)]
pub struct Table {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl Table {
    pub fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self { schema, batches }
    }

    /// A table with no columns and no rows.
    pub fn empty() -> Self {
        Self::new(Arc::new(Schema::empty()), Vec::new())
    }

    pub fn from_batch(batch: RecordBatch) -> Self {
        Self::new(batch.schema(), vec![batch])
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn column_names(&self) -> Vec<String> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().to_string())
            .collect()
    }

    /// The named column across every batch, concatenated.
    pub fn column(&self, name: &str) -> Result<Option<ArrayRef>> {
        let Ok(idx) = self.schema.index_of(name) else {
            return Ok(None);
        };
        if self.batches.is_empty() {
            return Ok(Some(arrow::array::new_empty_array(
                self.schema.field(idx).data_type(),
            )));
        }
        let parts: Vec<&dyn arrow::array::Array> = self
            .batches
            .iter()
            .map(|b| b.column(idx).as_ref())
            .collect();
        Ok(Some(concat(&parts)?))
    }

    /// Render as an ASCII table for the command line.
    pub fn pretty(&self) -> Result<String> {
        Ok(pretty_format_batches(&self.batches)?.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field};

    fn batch(ids: Vec<i64>, names: Vec<&str>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(ids)),
                Arc::new(StringArray::from(names)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn counts_across_batches() {
        let a = batch(vec![1, 2], vec!["a", "b"]);
        let b = batch(vec![3], vec!["c"]);
        let table = Table::new(a.schema(), vec![a, b]);
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.num_columns(), 2);
        assert_eq!(table.column_names(), vec!["id", "name"]);
        assert!(!table.is_empty());

        let ids = table.column("id").unwrap().unwrap();
        let ids = ids.as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(ids.values(), &[1, 2, 3]);
        assert!(table.column("missing").unwrap().is_none());
    }

    #[test]
    fn empty_table() {
        let table = Table::empty();
        assert_eq!(table.num_rows(), 0);
        assert_eq!(table.num_columns(), 0);
        assert!(table.is_empty());
    }

    #[test]
    fn column_of_schema_only_table_is_empty() {
        let schema = batch(vec![], vec![]).schema();
        let table = Table::new(schema, Vec::new());
        let col = table.column("name").unwrap().unwrap();
        assert_eq!(col.len(), 0);
        assert_eq!(col.data_type(), &DataType::Utf8);
    }

    #[test]
    fn pretty_prints_rows() {
        let table = Table::from_batch(batch(vec![7], vec!["seven"]));
        let text = table.pretty().unwrap();
        assert!(text.contains("seven"));
        assert!(text.contains("| id"));
    }
}
