use serde::Serialize;

use crate::{RecordError, ReplayError, Schema};

/// Синтетическая колонка с задержкой до следующего события (мс).
pub const DELAY_COLUMN: &str = "time_till_next_event_ms";

// ════════════════════════════════════════════════════════════════
//  Row
// ════════════════════════════════════════════════════════════════

/// Одна строка датасета: значения, выровненные по позициям схемы.
///
/// Ширину строки меняет только [`Table`], поэтому строки внутри
/// таблицы всегда совпадают со схемой по длине.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    values: Vec<String>,
}

impl Row {
    pub fn new(values: Vec<String>) -> Self {
        Self { values }
    }

    pub fn get(&self, pos: usize) -> Option<&str> {
        self.values.get(pos).map(String::as_str)
    }

    /// Заменить значение в существующей позиции. `false` если позиции нет.
    pub fn set(&mut self, pos: usize, value: impl Into<String>) -> bool {
        match self.values.get_mut(pos) {
            Some(slot) => {
                *slot = value.into();
                true
            }
            None => false,
        }
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Row {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

// ════════════════════════════════════════════════════════════════
//  Table
// ════════════════════════════════════════════════════════════════

/// Упорядоченная последовательность строк с единой схемой.
///
/// Инвариант: каждая строка содержит ровно `schema.len()` значений.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    schema: Schema,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(schema: Schema) -> Self {
        Self { schema, rows: Vec::new() }
    }

    pub fn from_rows(schema: Schema, rows: Vec<Row>) -> Result<Self, ReplayError> {
        let mut table = Self::new(schema);
        table.rows.reserve(rows.len());
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn push_row(&mut self, row: Row) -> Result<(), ReplayError> {
        if row.len() != self.schema.len() {
            return Err(ReplayError::Table(format!(
                "row {}: expected {} values, found {}",
                self.rows.len(),
                self.schema.len(),
                row.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Записать значение в существующую ячейку. Ширина строки не меняется.
    pub fn set_cell(&mut self, row: usize, pos: usize, value: impl Into<String>) -> Result<(), ReplayError> {
        let width = self.schema.len();
        let len = self.rows.len();
        match self.rows.get_mut(row) {
            Some(r) => {
                if r.set(pos, value) {
                    Ok(())
                } else {
                    Err(ReplayError::Table(format!(
                        "row {row}: position {pos} is outside the schema ({width} columns)"
                    )))
                }
            }
            None => Err(ReplayError::Table(format!("row {row} is outside the table ({len} rows)"))),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Вернуть позицию колонки, добавив её со значением `fill`, если её нет.
    pub fn ensure_column(&mut self, name: &str, fill: &str) -> Result<usize, ReplayError> {
        if let Some(pos) = self.schema.get(name) {
            return Ok(pos);
        }
        let pos = self.schema.push(name)?;
        for row in &mut self.rows {
            row.values.push(fill.to_string());
        }
        Ok(pos)
    }

    /// Значения одной колонки в порядке строк.
    pub fn column(&self, name: &str) -> Result<impl Iterator<Item = &str>, ReplayError> {
        let pos = self.schema.position(name)?;
        Ok(self.rows.iter().map(move |r| r.get(pos).unwrap_or_default()))
    }

    /// Таблица с той же схемой и подмножеством строк.
    pub fn with_rows(&self, rows: Vec<Row>) -> Result<Self, ReplayError> {
        Self::from_rows(self.schema.clone(), rows)
    }

    pub fn into_parts(self) -> (Schema, Vec<Row>) {
        (self.schema, self.rows)
    }
}

// ════════════════════════════════════════════════════════════════
//  DelayMode
// ════════════════════════════════════════════════════════════════

/// Стратегия вычисления паузы между событиями.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DelayMode {
    /// Без колонки задержки, replay с максимальной скоростью.
    #[default]
    None,
    /// Одинаковая задержка (мс) для всех строк, кроме последней.
    Static(u64),
    /// Задержка = разница timestamp'ов соседних строк в этой колонке.
    TimestampDiff(String),
}

impl DelayMode {
    pub fn is_active(&self) -> bool {
        !matches!(self, DelayMode::None)
    }
}

impl std::fmt::Display for DelayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DelayMode::None => f.write_str("none"),
            DelayMode::Static(ms) => write!(f, "static({ms}ms)"),
            DelayMode::TimestampDiff(col) => write!(f, "timestamp_diff({col})"),
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  OutboundRecord
// ════════════════════════════════════════════════════════════════

/// Запись, отправляемая в sink.
///
/// `payload` — JSON object колонка → строковое значение в порядке схемы,
/// без синтетической колонки задержки. `partition_key` — значение первой
/// колонки схемы. `index` — позиция строки в таблице (только для диагностики).
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRecord {
    pub index: usize,
    pub partition_key: String,
    pub payload: serde_json::Value,
}

impl OutboundRecord {
    /// Построить запись из строки таблицы.
    pub fn from_row(schema: &Schema, row: &Row, index: usize) -> Result<Self, RecordError> {
        let key_column = schema.first().unwrap_or_default();
        let partition_key = row.get(0).unwrap_or_default();
        if partition_key.trim().is_empty() {
            return Err(RecordError::PartitionKey {
                column: key_column.to_string(),
            });
        }

        let mut map = serde_json::Map::with_capacity(schema.len());
        for (name, value) in schema.columns().iter().zip(row.values()) {
            if name == DELAY_COLUMN {
                continue;
            }
            map.insert(name.clone(), serde_json::Value::String(value.clone()));
        }

        Ok(Self {
            index,
            partition_key: partition_key.to_string(),
            payload: serde_json::Value::Object(map),
        })
    }

    /// Payload в wire-формате (компактный JSON).
    pub fn encode_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.payload)
    }
}

impl Serialize for OutboundRecord {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("OutboundRecord", 2)?;
        s.serialize_field("partition_key", &self.partition_key)?;
        s.serialize_field("data", &self.payload)?;
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        let schema = Schema::new(["user_id", "amount"]).unwrap();
        Table::from_rows(
            schema,
            vec![Row::from_iter(["u1", "5"]), Row::from_iter(["u2", "7"])],
        )
        .unwrap()
    }

    #[test]
    fn push_row_rejects_wrong_width() {
        let mut t = table();
        let err = t.push_row(Row::from_iter(["u3"])).unwrap_err();
        assert!(matches!(err, ReplayError::Table(msg) if msg.contains("expected 2 values, found 1")));
    }

    #[test]
    fn set_cell_keeps_row_width() {
        let mut t = table();
        t.set_cell(1, 1, "9").unwrap();
        assert_eq!(t.column("amount").unwrap().collect::<Vec<_>>(), ["5", "9"]);

        assert!(matches!(t.set_cell(0, 2, "x"), Err(ReplayError::Table(_))));
        assert!(matches!(t.set_cell(5, 0, "x"), Err(ReplayError::Table(_))));
        assert!(t.rows().iter().all(|r| r.len() == t.schema().len()));
        assert_eq!(t.column("user_id").unwrap().collect::<Vec<_>>(), ["u1", "u2"]);
    }

    #[test]
    fn ensure_column_is_idempotent() {
        let mut t = table();
        let pos = t.ensure_column(DELAY_COLUMN, "0").unwrap();
        assert_eq!(pos, 2);
        assert_eq!(t.ensure_column(DELAY_COLUMN, "x").unwrap(), 2);
        assert_eq!(t.schema().len(), 3);
        assert!(t.rows().iter().all(|r| r.get(2) == Some("0")));
    }

    #[test]
    fn record_uses_first_column_as_key_and_drops_delay() {
        let mut t = table();
        let pos = t.ensure_column(DELAY_COLUMN, "1000").unwrap();
        t.set_cell(0, pos, "250").unwrap();

        let rec = OutboundRecord::from_row(t.schema(), &t.rows()[0], 0).unwrap();
        assert_eq!(rec.partition_key, "u1");
        assert_eq!(rec.payload, serde_json::json!({"user_id": "u1", "amount": "5"}));
        assert_eq!(
            String::from_utf8(rec.encode_payload().unwrap()).unwrap(),
            r#"{"user_id":"u1","amount":"5"}"#
        );
    }

    #[test]
    fn empty_key_is_a_record_error() {
        let schema = Schema::new(["user_id", "amount"]).unwrap();
        let row = Row::from_iter(["", "5"]);
        assert_eq!(
            OutboundRecord::from_row(&schema, &row, 3),
            Err(RecordError::PartitionKey { column: "user_id".into() })
        );
    }

    #[test]
    fn serialized_envelope_has_key_and_data() {
        let t = table();
        let rec = OutboundRecord::from_row(t.schema(), &t.rows()[1], 1).unwrap();
        let json = serde_json::to_string(&rec).unwrap();
        assert_eq!(json, r#"{"partition_key":"u2","data":{"user_id":"u2","amount":"7"}}"#);
    }
}
