use std::{error::Error, io::Write};

use clap::ValueEnum;
use serde::ser::{SerializeSeq, Serializer};
use serde_json::Value;
use strum::Display;

use crate::normalize::{Header, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Display)]
#[strum(serialize_all = "snake_case")]
pub enum OutputFormat {
    Json,
    Csv,
}

/// Streams every row into a pretty-printed JSON array, returning the row count.
pub fn write_json<W: Write>(
    writer: W,
    rows: impl Iterator<Item = Row>,
) -> Result<usize, Box<dyn Error + Send + Sync>> {
    let mut serializer = serde_json::Serializer::pretty(writer);
    let mut seq = serializer.serialize_seq(None)?;

    let mut count = 0;
    for row in rows {
        seq.serialize_element(&row)?;
        count += 1;
    }

    seq.end()?;
    Ok(count)
}

/// Writes the header record then one record per row, returning the row count.
pub fn write_csv<W: Write>(
    writer: W,
    header: &Header,
    rows: impl Iterator<Item = Row>,
) -> Result<usize, Box<dyn Error + Send + Sync>> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(header.columns())?;
    let count = write_records(&mut writer, header.columns(), rows)?;
    writer.flush()?;
    Ok(count)
}

/// Writes one record per row with a cell for each of `columns`, in that order.
pub fn write_records<W: Write>(
    writer: &mut csv::Writer<W>,
    columns: &[String],
    rows: impl Iterator<Item = Row>,
) -> Result<usize, csv::Error> {
    let mut count = 0;
    for row in rows {
        writer.write_record(
            columns
                .iter()
                .map(|column| cell(row.get(column).unwrap_or(&Value::Null))),
        )?;
        count += 1;
    }
    Ok(count)
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.to_owned(),
        other => other.to_string(),
    }
}
