//! Typed record builder
//!
//! Every collector describes its query columns as a static table of
//! `(column, attribute, setter)` entries. The table drives both the `SELECT`
//! list and the conversion of a decoded row into the collector's record type.
//!
//! Unit conversion follows the column naming convention:
//! - a column ending in `_MB` is scaled to bytes
//! - an attribute containing `Percent` or `Ratio` is scaled to a 0.0-1.0 ratio

use chrono::{DateTime, Utc};

use crate::decoder::{self, Record};
use crate::error_handling::{CollectError, ParseError};
use crate::normalize::{self, Zone, BYTES_PER_MB};

/// How a column value is written into the record
pub enum Setter<T> {
    Label(fn(&mut T, String)),
    Number(fn(&mut T, f64)),
    /// Numeric column that may legitimately be empty
    OptionalNumber(fn(&mut T, Option<f64>)),
    Timestamp(fn(&mut T, Option<DateTime<Utc>>)),
}

pub struct Column<T> {
    pub name: &'static str,
    pub attribute: &'static str,
    pub setter: Setter<T>,
}

impl<T> Column<T> {
    fn parse_number(&self, raw: &str) -> Result<f64, ParseError> {
        let value = if self.attribute.contains("Percent") || self.attribute.contains("Ratio") {
            normalize::parse_percent(raw)
        } else {
            normalize::parse_float(raw)
        }
        .map_err(|e| e.in_column(self.name))?;

        if self.name.ends_with("_MB") {
            Ok(value * BYTES_PER_MB)
        } else {
            Ok(value)
        }
    }

    fn apply(&self, record: &mut T, raw: &str, zone: &Zone) -> Result<(), ParseError> {
        match &self.setter {
            Setter::Label(set) => set(record, raw.trim().to_string()),
            Setter::Number(set) => {
                if raw.trim().is_empty() {
                    return Err(ParseError::Missing {
                        column: self.name.to_string(),
                    });
                }
                set(record, self.parse_number(raw)?)
            }
            Setter::OptionalNumber(set) => {
                let value = if raw.trim().is_empty() {
                    None
                } else {
                    Some(self.parse_number(raw)?)
                };
                set(record, value)
            }
            Setter::Timestamp(set) => {
                let value = normalize::parse_timestamp(raw, zone).map_err(|e| e.in_column(self.name))?;
                set(record, value)
            }
        }
        Ok(())
    }
}

/// Column table bound to the TSM table it is selected from
pub struct FieldMap<T: 'static> {
    table: &'static str,
    columns: &'static [Column<T>],
}

impl<T: 'static> FieldMap<T> {
    pub const fn new(table: &'static str, columns: &'static [Column<T>]) -> Self {
        Self { table, columns }
    }
}

impl<T: Default + 'static> FieldMap<T> {
    /// Number of fields a row must carry
    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    /// `SELECT <columns> FROM <table>`
    pub fn select(&self) -> String {
        format!("SELECT {} FROM {}", self.column_names().join(","), self.table)
    }

    pub fn build(&self, record: &Record, zone: &Zone) -> Result<T, ParseError> {
        let mut built = T::default();
        for (column, raw) in self.columns.iter().zip(record) {
            column.apply(&mut built, raw, zone)?;
        }
        Ok(built)
    }

    /// Decode raw output and map every row; any bad row fails the whole set
    pub fn parse(&self, output: &str, zone: &Zone) -> Result<Vec<T>, CollectError> {
        let records = decoder::decode(output, self.arity())?;
        let built = records
            .iter()
            .map(|record| self.build(record, zone))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(built)
    }
}

/// Declare a static column table for a record type.
///
/// ```ignore
/// static FIELDS: FieldMap<DbMetric> = FieldMap::new("DB", columns!(DbMetric {
///     "DATABASE_NAME" => "Name": Label(name),
///     "FREE_SPACE_MB" => "FreeSpace": Number(free_space),
/// }));
/// ```
macro_rules! columns {
    ($ty:ty { $( $column:literal => $attribute:literal : $kind:ident($field:ident) ),* $(,)? }) => {{
        const COLUMNS: &[$crate::mapper::Column<$ty>] = &[
            $(
                $crate::mapper::Column::<$ty> {
                    name: $column,
                    attribute: $attribute,
                    setter: $crate::mapper::Setter::$kind(|record: &mut $ty, value| record.$field = value),
                }
            ),*
        ];
        COLUMNS
    }};
}

pub(crate) use columns;
