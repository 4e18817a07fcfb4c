//! Result reconstruction: returned rows to status-tagged results

use crate::{BulkError, Result, Row, Value};

/// Name of the synthetic status column appended to RETURNING lists
pub const STATUS_COLUMN: &str = "_status";

/// What happened to a returned row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowStatus {
    Created,
    Updated,
    /// The row existed and the update was skipped because nothing changed
    Untouched,
}

impl RowStatus {
    /// Status marker as emitted by the generated statements
    pub fn marker(&self) -> &'static str {
        match self {
            RowStatus::Created => "c",
            RowStatus::Updated => "u",
            RowStatus::Untouched => "n",
        }
    }

    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "c" => Some(RowStatus::Created),
            "u" => Some(RowStatus::Updated),
            "n" => Some(RowStatus::Untouched),
            _ => None,
        }
    }
}

impl std::fmt::Display for RowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowStatus::Created => write!(f, "created"),
            RowStatus::Updated => write!(f, "updated"),
            RowStatus::Untouched => write!(f, "untouched"),
        }
    }
}

/// One returned row with its status. Columns are keyed by logical field name.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    status: RowStatus,
    row: Row,
}

impl ResultRow {
    pub fn new(status: RowStatus, row: Row) -> Self {
        Self { status, row }
    }

    pub fn status(&self) -> RowStatus {
        self.status
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.row.get_by_name(name)
    }

    pub fn values(&self) -> &[Value] {
        &self.row.values
    }

    pub fn columns(&self) -> &[String] {
        self.row.columns()
    }

    pub fn into_row(self) -> Row {
        self.row
    }
}

/// Rows returned by a bulk write, with filtered views by status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpsertResult {
    rows: Vec<ResultRow>,
}

impl UpsertResult {
    pub fn new(rows: Vec<ResultRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResultRow> {
        self.rows.iter()
    }

    pub fn with_status(&self, status: RowStatus) -> impl Iterator<Item = &ResultRow> {
        self.rows.iter().filter(move |r| r.status == status)
    }

    pub fn created(&self) -> impl Iterator<Item = &ResultRow> {
        self.with_status(RowStatus::Created)
    }

    pub fn updated(&self) -> impl Iterator<Item = &ResultRow> {
        self.with_status(RowStatus::Updated)
    }

    pub fn untouched(&self) -> impl Iterator<Item = &ResultRow> {
        self.with_status(RowStatus::Untouched)
    }

    pub fn into_rows(self) -> Vec<ResultRow> {
        self.rows
    }
}

impl IntoIterator for UpsertResult {
    type Item = ResultRow;
    type IntoIter = std::vec::IntoIter<ResultRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a UpsertResult {
    type Item = &'a ResultRow;
    type IntoIter = std::slice::Iter<'a, ResultRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Tag raw rows with their status. Rows carrying the status column are
/// classified by its marker, which is removed from the row; rows without
/// it are updates.
pub fn reconstruct(rows: Vec<Row>) -> Result<UpsertResult> {
    rows.into_iter()
        .map(|mut row| {
            let status = match row.take_column(STATUS_COLUMN) {
                None => RowStatus::Updated,
                Some(Value::String(marker)) => RowStatus::from_marker(&marker).ok_or_else(|| {
                    BulkError::Other(format!("unexpected row status marker '{}'", marker))
                })?,
                Some(other) => {
                    return Err(BulkError::Other(format!(
                        "unexpected row status value {:?}",
                        other
                    )));
                }
            };
            Ok(ResultRow::new(status, row))
        })
        .collect::<Result<Vec<_>>>()
        .map(UpsertResult::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(id: i32, status: Option<&str>) -> Row {
        let mut columns = vec!["id".to_string()];
        let mut values = vec![Value::Int32(id)];
        if let Some(status) = status {
            columns.push(STATUS_COLUMN.to_string());
            values.push(Value::String(status.to_string()));
        }
        Row::new(columns, values)
    }

    #[test]
    fn test_reconstruct_classifies_by_marker() {
        let result = reconstruct(vec![
            row(1, Some("u")),
            row(2, Some("c")),
            row(3, Some("n")),
        ])
        .unwrap();

        assert_eq!(result.len(), 3);
        let created: Vec<_> = result.created().collect();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].get("id"), Some(&Value::Int32(2)));
        assert_eq!(created[0].columns(), &["id".to_string()]);
        assert_eq!(result.updated().count(), 1);
        assert_eq!(result.untouched().count(), 1);
    }

    #[test]
    fn test_rows_without_marker_are_updates() {
        let result = reconstruct(vec![row(1, None), row(2, None)]).unwrap();
        assert!(result.iter().all(|r| r.status() == RowStatus::Updated));
    }

    #[test]
    fn test_unknown_marker_is_an_error() {
        assert!(reconstruct(vec![row(1, Some("x"))]).is_err());
    }
}
