//! Parquet encoding of snapshots
//!
//! The schema is the sorted union of every field in the snapshot. Column
//! types are inferred from the cells: integers stay `Int64` unless a float
//! shows up (then `Float64`), booleans are `Boolean`, strings `Utf8`, and a
//! column mixing anything else is written as the display text of each cell.
//! Every column is nullable and a record without a field gets a null.
//! Key columns reach the codec with a single kind, [`merge`](crate::merge::merge)
//! rejects mixed ones, so keys keep their type across a round trip.

use arrow_array::cast::AsArray;
use arrow_array::types::{
    ArrowPrimitiveType, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type,
    UInt16Type, UInt32Type, UInt8Type,
};
use arrow_array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, RecordBatch, StringArray,
};
use arrow_cast::display::{ArrayFormatter, FormatOptions};
use arrow_schema::{DataType, Field, Schema};
use beatlake_common::{Record, Snapshot, Value};
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use std::sync::Arc;

use crate::error::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int,
    Float,
    Bool,
    Str,
    Text,
}

impl ColumnKind {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(ColumnKind::Bool),
            Value::Int(_) => Some(ColumnKind::Int),
            Value::Float(_) => Some(ColumnKind::Float),
            Value::Str(_) => Some(ColumnKind::Str),
        }
    }

    fn widen(self, other: Self) -> Self {
        use ColumnKind::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Int, Float) | (Float, Int) => Float,
            _ => Text,
        }
    }

    fn data_type(self) -> DataType {
        match self {
            ColumnKind::Int => DataType::Int64,
            ColumnKind::Float => DataType::Float64,
            ColumnKind::Bool => DataType::Boolean,
            ColumnKind::Str | ColumnKind::Text => DataType::Utf8,
        }
    }
}

fn infer_kind(records: &[Record], field: &str) -> ColumnKind {
    records
        .iter()
        .filter_map(|r| r.get(field).and_then(ColumnKind::of))
        .reduce(ColumnKind::widen)
        .unwrap_or(ColumnKind::Str)
}

fn build_column(records: &[Record], field: &str, kind: ColumnKind) -> ArrayRef {
    let cells = records.iter().map(|r| r.get(field).filter(|v| !v.is_null()));
    match kind {
        ColumnKind::Int => Arc::new(Int64Array::from(
            cells.map(|v| v.and_then(Value::as_i64)).collect::<Vec<_>>(),
        )),
        ColumnKind::Float => Arc::new(Float64Array::from(
            cells.map(|v| v.and_then(Value::as_f64)).collect::<Vec<_>>(),
        )),
        ColumnKind::Bool => Arc::new(BooleanArray::from(
            cells
                .map(|v| match v {
                    Some(Value::Bool(b)) => Some(*b),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnKind::Str | ColumnKind::Text => Arc::new(StringArray::from(
            cells.map(|v| v.map(|v| v.to_string())).collect::<Vec<_>>(),
        )),
    }
}

/// Encode a snapshot as a single Parquet file
pub fn encode(name: &str, snapshot: &Snapshot) -> Result<Vec<u8>, StorageError> {
    let records = snapshot.records();
    let columns = snapshot.columns();

    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays = Vec::with_capacity(columns.len());
    for column in &columns {
        let kind = infer_kind(records, column);
        fields.push(Field::new(column, kind.data_type(), true));
        arrays.push(build_column(records, column, kind));
    }

    let schema = Arc::new(Schema::new(fields));
    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema.clone(), None)
        .map_err(|e| StorageError::codec(name, e))?;

    if !records.is_empty() {
        let batch = RecordBatch::try_new(schema, arrays).map_err(|e| StorageError::codec(name, e))?;
        writer.write(&batch).map_err(|e| StorageError::codec(name, e))?;
    }
    writer.close().map_err(|e| StorageError::codec(name, e))?;

    Ok(buffer)
}

fn primitive_values<T, F>(array: &dyn Array, convert: F) -> Option<Vec<Value>>
where
    T: ArrowPrimitiveType,
    F: Fn(T::Native) -> Value,
{
    let array = array.as_primitive_opt::<T>()?;
    Some(
        array
            .iter()
            .map(|cell| cell.map(&convert).unwrap_or(Value::Null))
            .collect(),
    )
}

fn display_values(array: &dyn Array) -> Result<Vec<Value>, arrow_schema::ArrowError> {
    let formatter = ArrayFormatter::try_new(array, &FormatOptions::default())?;
    Ok((0..array.len())
        .map(|i| {
            if array.is_null(i) {
                Value::Null
            } else {
                Value::Str(formatter.value(i).to_string())
            }
        })
        .collect())
}

fn column_values(array: &dyn Array) -> Result<Vec<Value>, arrow_schema::ArrowError> {
    let values = match array.data_type() {
        DataType::Utf8 => array
            .as_string_opt::<i32>()
            .map(|a| a.iter().map(|s| s.map(Value::from).unwrap_or_default()).collect()),
        DataType::LargeUtf8 => array
            .as_string_opt::<i64>()
            .map(|a| a.iter().map(|s| s.map(Value::from).unwrap_or_default()).collect()),
        DataType::Boolean => array
            .as_boolean_opt()
            .map(|a| a.iter().map(|b| b.map(Value::Bool).unwrap_or_default()).collect()),
        DataType::Int8 => primitive_values::<Int8Type, _>(array, |v| Value::Int(v.into())),
        DataType::Int16 => primitive_values::<Int16Type, _>(array, |v| Value::Int(v.into())),
        DataType::Int32 => primitive_values::<Int32Type, _>(array, |v| Value::Int(v.into())),
        DataType::Int64 => primitive_values::<Int64Type, _>(array, Value::Int),
        DataType::UInt8 => primitive_values::<UInt8Type, _>(array, |v| Value::Int(v.into())),
        DataType::UInt16 => primitive_values::<UInt16Type, _>(array, |v| Value::Int(v.into())),
        DataType::UInt32 => primitive_values::<UInt32Type, _>(array, |v| Value::Int(v.into())),
        DataType::Float32 => primitive_values::<Float32Type, _>(array, |v| Value::Float(v.into())),
        DataType::Float64 => primitive_values::<Float64Type, _>(array, Value::Float),
        _ => None,
    };

    match values {
        Some(values) => Ok(values),
        None => display_values(array),
    }
}

/// Decode a Parquet file into a snapshot. Null cells are dropped from records.
pub fn decode(name: &str, data: Bytes) -> Result<Snapshot, StorageError> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(data)
        .map_err(|e| StorageError::codec(name, e))?
        .build()
        .map_err(|e| StorageError::codec(name, e))?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| StorageError::codec(name, e))?;
        let schema = batch.schema();

        let mut rows = vec![Record::new(); batch.num_rows()];
        for (field, column) in schema.fields().iter().zip(batch.columns()) {
            let values = column_values(column.as_ref()).map_err(|e| StorageError::codec(name, e))?;
            for (row, value) in rows.iter_mut().zip(values) {
                if !value.is_null() {
                    row.insert(field.name().as_str(), value);
                }
            }
        }
        records.extend(rows);
    }

    Ok(Snapshot::new(records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::TimestampMillisecondArray;

    fn roundtrip(snapshot: &Snapshot) -> Snapshot {
        let bytes = encode("test.parquet", snapshot).unwrap();
        decode("test.parquet", Bytes::from(bytes)).unwrap()
    }

    #[test]
    fn test_values_and_missing_fields_survive() {
        let snapshot = Snapshot::new(vec![
            Record::new()
                .with("video_id", "Eb8rXCzJMUc")
                .with("views", 1_000_000)
                .with("engagement_rate", 0.042)
                .with("licensed", true),
            Record::new().with("video_id", "abc").with("title", "Doxy"),
        ]);

        assert_eq!(roundtrip(&snapshot), snapshot);
    }

    #[test]
    fn test_int_float_mix_widens_to_float() {
        let snapshot = Snapshot::new(vec![
            Record::new().with("id", 1).with("score", 3),
            Record::new().with("id", 2).with("score", 2.5),
        ]);

        let decoded = roundtrip(&snapshot);
        assert_eq!(decoded.records()[0].get("score"), Some(&Value::Float(3.0)));
        assert_eq!(decoded.records()[1].get("score"), Some(&Value::Float(2.5)));
    }

    #[test]
    fn test_mixed_column_falls_back_to_text() {
        let snapshot = Snapshot::new(vec![
            Record::new().with("id", 1).with("rank", 7),
            Record::new().with("id", 2).with("rank", "n/a"),
        ]);

        let decoded = roundtrip(&snapshot);
        assert_eq!(decoded.records()[0].get("rank"), Some(&Value::from("7")));
        assert_eq!(decoded.records()[1].get("rank"), Some(&Value::from("n/a")));
    }

    #[test]
    fn test_explicit_nulls_are_treated_as_absent() {
        let snapshot = Snapshot::new(vec![Record::new().with("id", 1).with("preview", Value::Null)]);
        let decoded = roundtrip(&snapshot);
        assert!(!decoded.records()[0].contains("preview"));
    }

    #[test]
    fn test_schema_is_sorted_union() {
        let snapshot = Snapshot::new(vec![
            Record::new().with("title", "x").with("id", 1),
            Record::new().with("artist", "y").with("id", 2),
        ]);
        let bytes = Bytes::from(encode("s.parquet", &snapshot).unwrap());
        let builder = ParquetRecordBatchReaderBuilder::try_new(bytes).unwrap();
        let names: Vec<String> = builder
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, vec!["artist", "id", "title"]);
        assert!(builder.schema().fields().iter().all(|f| f.is_nullable()));
    }

    #[test]
    fn test_foreign_types_decode_as_text() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int32, false),
            Field::new(
                "published_at",
                DataType::Timestamp(arrow_schema::TimeUnit::Millisecond, None),
                true,
            ),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(arrow_array::Int32Array::from(vec![5])),
                Arc::new(TimestampMillisecondArray::from(vec![Some(0)])),
            ],
        )
        .unwrap();
        let mut buffer = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buffer, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let decoded = decode("legacy.parquet", Bytes::from(buffer)).unwrap();
        let record = &decoded.records()[0];
        assert_eq!(record.get("id"), Some(&Value::Int(5)));
        assert!(record
            .get_str("published_at")
            .is_some_and(|s| s.starts_with("1970-01-01")));
    }

    #[test]
    fn test_garbage_is_a_codec_error() {
        let err = decode("broken.parquet", Bytes::from_static(b"not parquet")).unwrap_err();
        assert!(matches!(err, StorageError::Codec { .. }));
    }
}
