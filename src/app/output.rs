use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use osmroute::columns::{ColumnValue, Row};
use osmroute::geometry::to_hex;
use osmroute::mapping::{ElementClass, Match};

/// One classified row as written to the output stream.
#[derive(Debug, Serialize)]
pub struct OutputRow {
    pub table: String,
    pub sub_mapping: Option<String>,
    pub class: &'static str,
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_index: Option<usize>,
    pub key: String,
    pub value: String,
    pub row: Map<String, Value>,
}

impl OutputRow {
    pub fn new(
        class: ElementClass,
        id: i64,
        member_index: Option<usize>,
        matched: &Match,
        row: Row,
    ) -> Self {
        let row = matched
            .columns()
            .zip(row)
            .map(|(name, value)| (name.to_string(), json_value(value)))
            .collect();
        Self {
            table: matched.table.name.to_string(),
            sub_mapping: matched.table.sub_mapping.as_deref().map(str::to_string),
            class: class.as_str(),
            id,
            member_index,
            key: matched.key.clone(),
            value: matched.value.clone(),
            row,
        }
    }
}

fn json_value(value: Option<ColumnValue>) -> Value {
    match value {
        None => Value::Null,
        Some(ColumnValue::String(val)) => Value::String(val),
        Some(ColumnValue::Integer(val)) => Value::from(val),
        Some(ColumnValue::Float(val)) => Value::from(val),
        Some(ColumnValue::Bool(val)) => Value::Bool(val),
        Some(ColumnValue::Json(val)) => val,
        Some(ColumnValue::Geometry(bytes)) => Value::String(to_hex(&bytes)),
    }
}

/// JSON lines writer for classified rows.
pub struct RowSink {
    writer: BufWriter<Box<dyn Write + Send>>,
    written: u64,
}

impl RowSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(Box::new(file)),
            written: 0,
        })
    }

    pub fn stdout() -> Result<Self> {
        Ok(Self {
            writer: BufWriter::new(Box::new(std::io::stdout())),
            written: 0,
        })
    }

    pub fn add_row(&mut self, row: &OutputRow) -> Result<()> {
        serde_json::to_writer(&mut self.writer, row)?;
        writeln!(self.writer)?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_values_are_hex() {
        assert_eq!(
            json_value(Some(ColumnValue::Geometry(vec![0x01, 0xff]))),
            Value::String("01FF".into())
        );
        assert_eq!(json_value(None), Value::Null);
    }

    #[test]
    fn row_keeps_column_order() {
        let row: Map<String, Value> = ["osm_id", "name", "amenity"]
            .into_iter()
            .map(|name| (name.to_string(), Value::Null))
            .collect();
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"osm_id":null,"name":null,"amenity":null}"#);
    }
}
