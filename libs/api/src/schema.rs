use std::collections::HashMap;

use crate::ReplayError;

/// Привести имя колонки к каноническому виду: trim + lower case.
pub fn normalize_column(name: &str) -> String {
    name.trim().to_lowercase()
}

// ════════════════════════════════════════════════════════════════
//  Schema
// ════════════════════════════════════════════════════════════════

/// Упорядоченный список колонок таблицы + индекс имя → позиция.
///
/// Имена нормализуются при создании, дубли и пустые имена отклоняются.
/// Lookup через [`Schema::position`] падает с `ReplayError::Schema`,
/// а не возвращает значение по умолчанию.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<String>,
    index: HashMap<String, usize>,
}

impl Schema {
    pub fn new<I, S>(columns: I) -> Result<Self, ReplayError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut schema = Self {
            columns: Vec::new(),
            index: HashMap::new(),
        };
        for name in columns {
            schema.push(name.as_ref())?;
        }
        if schema.columns.is_empty() {
            return Err(ReplayError::Table("schema has no columns".into()));
        }
        Ok(schema)
    }

    /// Добавить колонку в конец. Возвращает её позицию.
    pub(crate) fn push(&mut self, name: &str) -> Result<usize, ReplayError> {
        let name = normalize_column(name);
        if name.is_empty() {
            return Err(ReplayError::Table(format!(
                "column {} has an empty name",
                self.columns.len()
            )));
        }
        if self.index.contains_key(&name) {
            return Err(ReplayError::Table(format!("duplicate column '{name}'")));
        }
        let pos = self.columns.len();
        self.index.insert(name.clone(), pos);
        self.columns.push(name);
        Ok(pos)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Позиция колонки или `None`. Имя нормализуется перед поиском.
    pub fn get(&self, name: &str) -> Option<usize> {
        self.index.get(&normalize_column(name)).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Позиция колонки или `ReplayError::Schema`.
    pub fn position(&self, name: &str) -> Result<usize, ReplayError> {
        self.get(name).ok_or_else(|| ReplayError::schema(normalize_column(name)))
    }

    /// Первая объявленная колонка (источник partition key).
    pub fn first(&self) -> Option<&str> {
        self.columns.first().map(String::as_str)
    }
}
