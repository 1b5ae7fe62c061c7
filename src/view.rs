//! Per-record rendering adapters.
//!
//! A view wraps one record element and exposes it as named fields. Tables
//! never inspect a view beyond [`View::items`]; they only need a
//! [`ViewClass`] that knows how to build one from `(table, record)`.
//!
//! Views come from three places:
//!
//! - a Rust type implementing [`View`] + [`FromRecord`], via [`ViewClass::of`]
//! - a closure, via [`ViewClass::from_fn`]
//! - a declarative [`ViewSpec`], via [`ViewClass::from_spec`], rendered by
//!   [`FieldView`]

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TableError;
use crate::table::Table;
use crate::xml::Element;
use crate::xpath::XPath;

/// Field name to value, in field declaration order.
pub type Fields = IndexMap<String, Value>;

/// Upcast to [`Any`] so concrete views can be recovered from `dyn View`.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A rendered table record.
pub trait View: AsAny + fmt::Debug + Send {
    /// The record element this view is bound to.
    fn record(&self) -> &Element;

    /// Field name/value pairs derived from the record.
    fn items(&self) -> Fields;
}

/// Construction half of the view contract.
pub trait FromRecord {
    fn from_record(table: &Table, record: Element) -> Self;
}

type Constructor = dyn Fn(&Table, Element) -> Box<dyn View> + Send + Sync;

/// Named constructor for one kind of view.
#[derive(Clone)]
pub struct ViewClass {
    name: String,
    construct: Arc<Constructor>,
}

impl ViewClass {
    /// View class for a Rust view type.
    pub fn of<V>(name: impl Into<String>) -> Self
    where
        V: View + FromRecord + 'static,
    {
        Self::from_fn(name, |table, record| -> Box<dyn View> {
            Box::new(V::from_record(table, record))
        })
    }

    pub fn from_fn<F>(name: impl Into<String>, construct: F) -> Self
    where
        F: Fn(&Table, Element) -> Box<dyn View> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            construct: Arc::new(construct),
        }
    }

    /// View class rendering a declarative field list with [`FieldView`].
    ///
    /// Every field expression is compiled here; a bad one fails with
    /// [`TableError::InvalidView`].
    pub fn from_spec(name: impl Into<String>, spec: &ViewSpec) -> Result<Self, TableError> {
        let name = name.into();
        let mut fields = Vec::with_capacity(spec.fields.len());
        for (field, def) in &spec.fields {
            let path = XPath::parse(def.xpath()).map_err(|e| {
                TableError::InvalidView(format!("view '{name}' field '{field}': {e}"))
            })?;
            fields.push(CompiledField {
                name: field.clone(),
                path,
                kind: def.kind(),
            });
        }
        let fields: Arc<[CompiledField]> = fields.into();
        Ok(Self::from_fn(name, move |table, record| -> Box<dyn View> {
            Box::new(FieldView {
                table: table.name().to_string(),
                hostname: table.hostname().to_string(),
                record,
                fields: Arc::clone(&fields),
            })
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn construct(&self, table: &Table, record: Element) -> Box<dyn View> {
        (self.construct)(table, record)
    }
}

impl fmt::Debug for ViewClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewClass").field("name", &self.name).finish()
    }
}

/// How a field's matched element turns into a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Trimmed text, `null` when the field is missing.
    #[default]
    Text,
    /// Integer, `null` when missing; unparsable text is kept as a string.
    Int,
    /// `true` when the field element exists (`<up/>` style flags).
    Flag,
}

/// One declared field: a bare XPath or an XPath with a kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum FieldSpec {
    Path(String),
    Typed {
        xpath: String,
        #[serde(default)]
        kind: FieldKind,
    },
}

impl FieldSpec {
    pub fn xpath(&self) -> &str {
        match self {
            FieldSpec::Path(xpath) | FieldSpec::Typed { xpath, .. } => xpath,
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            FieldSpec::Path(_) => FieldKind::Text,
            FieldSpec::Typed { kind, .. } => *kind,
        }
    }
}

/// Declarative view: field name to field definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ViewSpec {
    pub fields: IndexMap<String, FieldSpec>,
}

impl ViewSpec {
    pub fn field(mut self, name: impl Into<String>, xpath: impl Into<String>) -> Self {
        self.fields.insert(name.into(), FieldSpec::Path(xpath.into()));
        self
    }

    pub fn typed_field(
        mut self,
        name: impl Into<String>,
        xpath: impl Into<String>,
        kind: FieldKind,
    ) -> Self {
        self.fields.insert(
            name.into(),
            FieldSpec::Typed {
                xpath: xpath.into(),
                kind,
            },
        );
        self
    }
}

#[derive(Debug)]
struct CompiledField {
    name: String,
    path: XPath,
    kind: FieldKind,
}

impl CompiledField {
    fn value(&self, record: &Element) -> Value {
        let found = self.path.select_from(record).into_iter().next();
        match (self.kind, found) {
            (FieldKind::Flag, found) => Value::Bool(found.is_some()),
            (_, None) => Value::Null,
            (FieldKind::Text, Some(e)) => Value::String(e.string_value().trim().to_string()),
            (FieldKind::Int, Some(e)) => {
                let text = e.string_value().trim().to_string();
                text.parse::<i64>()
                    .map(Value::from)
                    .unwrap_or(Value::String(text))
            }
        }
    }
}

/// View built from a [`ViewSpec`].
#[derive(Debug, Clone)]
pub struct FieldView {
    table: String,
    hostname: String,
    record: Element,
    fields: Arc<[CompiledField]>,
}

impl FieldView {
    /// Value of one declared field, `None` if the field is not declared.
    pub fn field(&self, name: &str) -> Option<Value> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value(&self.record))
    }

    /// Name of the table that produced this view.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }
}

impl View for FieldView {
    fn record(&self) -> &Element {
        &self.record
    }

    fn items(&self) -> Fields {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.value(&self.record)))
            .collect()
    }
}
