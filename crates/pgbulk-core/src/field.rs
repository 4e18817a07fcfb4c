//! Table and field descriptions consumed by the statement builders

use crate::{BulkError, Result};
use serde::{Deserialize, Serialize};

/// Description of one field of a table.
///
/// A field has a logical name (what callers use in records and option lists)
/// and a physical column name (what appears in SQL). They are usually equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Logical field name
    pub name: String,
    /// Physical column name
    pub column: String,
    /// SQL type as understood by the server, e.g. `integer`, `numeric(10,2)`, `text[]`
    pub sql_type: String,
    /// Value is assigned by the server (identity, serial)
    pub auto_generated: bool,
    pub primary_key: bool,
    /// Set to the current time on every write
    pub auto_timestamp: bool,
    /// Set to the current time when the row is created, never updated afterwards
    pub auto_timestamp_on_create: bool,
    /// Backed by a writable column
    pub concrete: bool,
}

impl FieldSpec {
    /// Create a plain concrete field whose column name equals its logical name
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            sql_type: sql_type.into(),
            auto_generated: false,
            primary_key: false,
            auto_timestamp: false,
            auto_timestamp_on_create: false,
            concrete: true,
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn auto_generated(mut self) -> Self {
        self.auto_generated = true;
        self
    }

    pub fn auto_now(mut self) -> Self {
        self.auto_timestamp = true;
        self
    }

    pub fn auto_now_add(mut self) -> Self {
        self.auto_timestamp_on_create = true;
        self
    }

    pub fn non_concrete(mut self) -> Self {
        self.concrete = false;
        self
    }

    /// Whether the field is filled with the current time before writing
    pub fn is_auto_timestamp(&self) -> bool {
        self.auto_timestamp || self.auto_timestamp_on_create
    }

    /// Whether the field may appear in an update set
    pub fn is_updatable(&self) -> bool {
        self.concrete && !self.auto_generated && !self.auto_timestamp_on_create
    }
}

/// Description of a target table: its name and the ordered list of fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Schema (namespace) name, `None` for the search path default
    pub schema: Option<String>,
    /// Table name
    pub name: String,
    fields: Vec<FieldSpec>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Append a field. A field with the same logical name replaces the old one.
    pub fn field(mut self, field: FieldSpec) -> Self {
        if let Some(existing) = self.fields.iter_mut().find(|f| f.name == field.name) {
            *existing = field;
        } else {
            self.fields.push(field);
        }
        self
    }

    /// All fields in declaration order
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Mutable access to a field, used to mark flags that introspection
    /// cannot discover (such as auto timestamps).
    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldSpec> {
        self.fields
            .iter_mut()
            .find(|f| f.name == name || f.column == name)
    }

    /// Resolve a logical field name (or physical column name) to its field
    pub fn resolve(&self, name: &str) -> Result<&FieldSpec> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.fields.iter().find(|f| f.column == name))
            .ok_or_else(|| BulkError::unknown_field(&self.display_name(), name))
    }

    /// Resolve a list of names, preserving order and dropping duplicates
    pub fn resolve_all<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<&FieldSpec>> {
        let mut resolved: Vec<&FieldSpec> = Vec::with_capacity(names.len());
        for name in names {
            let field = self.resolve(name.as_ref())?;
            if !resolved.iter().any(|f| f.name == field.name) {
                resolved.push(field);
            }
        }
        Ok(resolved)
    }

    pub fn primary_key(&self) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// Primary key field, or a configuration error naming the operation that needs it
    pub fn require_primary_key(&self, operation: &str) -> Result<&FieldSpec> {
        self.primary_key().ok_or_else(|| {
            BulkError::Configuration(format!(
                "{} requires a primary key but table {} has none",
                operation,
                self.display_name()
            ))
        })
    }

    /// Fields backed by a writable column
    pub fn concrete_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.concrete)
    }

    /// Human readable `schema.table` name, unquoted
    pub fn display_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }
}
