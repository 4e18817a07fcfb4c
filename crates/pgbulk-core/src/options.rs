//! Per-call options for the bulk operations

use crate::Expr;

/// Which columns to return from a write
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Returning {
    /// Return nothing; the operation yields no result rows
    #[default]
    None,
    /// Every concrete field of the table
    All,
    /// The named fields only
    Fields(Vec<String>),
}

impl Returning {
    pub fn fields<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Returning::Fields(names.into_iter().map(Into::into).collect())
    }

    pub fn is_requested(&self) -> bool {
        !matches!(self, Returning::None)
    }
}

impl From<bool> for Returning {
    fn from(all: bool) -> Self {
        if all { Returning::All } else { Returning::None }
    }
}

/// One field to update, optionally with a server-side expression instead
/// of the incoming value.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateField {
    pub name: String,
    pub expression: Option<Expr>,
}

impl UpdateField {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: None,
        }
    }

    /// Update the field with `expr`, e.g. `Expr::col("hits") + Expr::proposed("hits")`
    pub fn expr(name: impl Into<String>, expr: Expr) -> Self {
        Self {
            name: name.into(),
            expression: Some(expr),
        }
    }
}

impl From<&str> for UpdateField {
    fn from(name: &str) -> Self {
        UpdateField::new(name)
    }
}

impl From<String> for UpdateField {
    fn from(name: String) -> Self {
        UpdateField::new(name)
    }
}

/// Fields written when a row already exists
#[derive(Debug, Clone, Default, PartialEq)]
pub enum UpdateSpec {
    /// Every updatable field except the key and `exclude`d fields
    #[default]
    All,
    /// Exactly these fields. An empty list updates nothing.
    Fields(Vec<UpdateField>),
}

impl UpdateSpec {
    pub fn fields<I, F>(fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<UpdateField>,
    {
        UpdateSpec::Fields(fields.into_iter().map(Into::into).collect())
    }

    /// Insert only; existing rows are left alone
    pub fn none() -> Self {
        UpdateSpec::Fields(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOptions {
    /// Fields never updated on conflict
    pub exclude: Vec<String>,
    pub returning: Returning,
    /// Skip updates that would not change the row
    pub suppress_redundant: bool,
    /// Also return rows whose update was skipped, with status `Untouched`
    pub return_untouched: bool,
}

impl Default for UpsertOptions {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            returning: Returning::None,
            suppress_redundant: true,
            return_untouched: false,
        }
    }
}

impl UpsertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returning(mut self, returning: impl Into<Returning>) -> Self {
        self.returning = returning.into();
        self
    }

    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn suppress_redundant(mut self, suppress: bool) -> Self {
        self.suppress_redundant = suppress;
        self
    }

    pub fn return_untouched(mut self, untouched: bool) -> Self {
        self.return_untouched = untouched;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOptions {
    pub exclude: Vec<String>,
    pub returning: Returning,
    pub suppress_redundant: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            returning: Returning::None,
            suppress_redundant: true,
        }
    }
}

impl UpdateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returning(mut self, returning: impl Into<Returning>) -> Self {
        self.returning = returning.into();
        self
    }

    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn suppress_redundant(mut self, suppress: bool) -> Self {
        self.suppress_redundant = suppress;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CopyOptions {
    /// Fields left out of the copy column list
    pub exclude: Vec<String>,
    /// Use the binary copy format
    pub binary: bool,
}

impl CopyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn binary(mut self, binary: bool) -> Self {
        self.binary = binary;
        self
    }

    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = names.into_iter().map(Into::into).collect();
        self
    }
}
