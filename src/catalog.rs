//! Declarative table and view definitions.
//!
//! A catalog is loaded from YAML or JSON and names every table a program
//! uses, together with the view that renders its records:
//!
//! ```yaml
//! tables:
//!   PhyPortTable:
//!     rpc: get-interface-information
//!     args: { terse: true }
//!     item: physical-interface
//!     view: PhyPortView
//! views:
//!   PhyPortView:
//!     fields:
//!       oper: oper-status
//!       mtu: { xpath: mtu, kind: int }
//! ```
//!
//! Views written in Rust join through [`TableCatalog::register_view`].
//! View references are resolved when a table is built, so a typo surfaces
//! as [`TableError::InvalidView`] before any RPC is sent.

use std::sync::Arc;

use indexmap::IndexMap;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::TableError;
use crate::session::Session;
use crate::table::{Table, TableSpec};
use crate::view::{ViewClass, ViewSpec};
use crate::xpath::XPath;

/// One table definition in a catalog document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TableEntry {
    #[serde(flatten)]
    pub spec: TableSpec,
    /// Name of the view rendering this table's records.
    #[serde(default)]
    pub view: Option<String>,
}

/// Serialized form of a catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CatalogDocument {
    #[serde(default)]
    pub tables: IndexMap<String, TableEntry>,
    #[serde(default)]
    pub views: IndexMap<String, ViewSpec>,
}

/// Diagnostics summary for a catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CatalogDiagnostics {
    /// Number of declared tables.
    pub total_tables: usize,
    /// `table: reason` for record or name-field selectors that do not compile.
    pub invalid_selectors: Vec<String>,
    /// `table -> view` references with no such view.
    pub unknown_views: Vec<String>,
    /// Registered views no table refers to.
    pub unused_views: Vec<String>,
    /// Tables without a record selector.
    pub composite_tables: Vec<String>,
}

impl CatalogDiagnostics {
    /// True when some table cannot be built.
    pub fn has_issues(&self) -> bool {
        !self.invalid_selectors.is_empty() || !self.unknown_views.is_empty()
    }
}

/// Named tables plus the views they render through.
#[derive(Debug, Clone, Default)]
pub struct TableCatalog {
    tables: IndexMap<String, TableEntry>,
    views: IndexMap<String, ViewClass>,
}

impl TableCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog, compiling every declarative view.
    pub fn from_document(document: CatalogDocument) -> Result<Self, TableError> {
        let mut catalog = Self::new();
        for (name, spec) in &document.views {
            catalog.register_view(ViewClass::from_spec(name.as_str(), spec)?);
        }
        for (name, mut entry) in document.tables {
            if entry.spec.name.is_empty() {
                entry.spec.name = name.clone();
            }
            catalog.tables.insert(name, entry);
        }
        debug!(
            "catalog loaded: {} tables, {} views",
            catalog.tables.len(),
            catalog.views.len()
        );
        Ok(catalog)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, TableError> {
        let document: CatalogDocument =
            serde_yaml::from_str(yaml).map_err(|e| TableError::Catalog(e.to_string()))?;
        Self::from_document(document)
    }

    pub fn from_json(json: &str) -> Result<Self, TableError> {
        let document: CatalogDocument =
            serde_json::from_str(json).map_err(|e| TableError::Catalog(e.to_string()))?;
        Self::from_document(document)
    }

    /// Adds or replaces a view under its own name.
    pub fn register_view(&mut self, view: ViewClass) -> &mut Self {
        self.views.insert(view.name().to_string(), view);
        self
    }

    /// Adds or replaces a table under `spec.name`.
    pub fn add_table(&mut self, spec: TableSpec, view: Option<&str>) -> &mut Self {
        let entry = TableEntry {
            view: view.map(str::to_string),
            spec,
        };
        self.tables.insert(entry.spec.name.clone(), entry);
        self
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn spec(&self, table: &str) -> Option<&TableSpec> {
        self.tables.get(table).map(|entry| &entry.spec)
    }

    pub fn view(&self, name: &str) -> Option<&ViewClass> {
        self.views.get(name)
    }

    /// Builds the named table bound to `session`, with its view attached.
    pub fn table(&self, name: &str, session: Arc<dyn Session>) -> Result<Table, TableError> {
        let entry = self
            .tables
            .get(name)
            .ok_or_else(|| TableError::UnknownTable(name.to_string()))?;
        let table = Table::new(session, entry.spec.clone())?;
        match &entry.view {
            None => Ok(table),
            Some(view) => {
                let class = self.views.get(view).ok_or_else(|| {
                    TableError::InvalidView(format!("table '{name}' refers to unknown view '{view}'"))
                })?;
                Ok(table.with_view(class.clone()))
            }
        }
    }

    /// Checks every table without building it.
    pub fn diagnose(&self) -> CatalogDiagnostics {
        let mut diagnostics = CatalogDiagnostics {
            total_tables: self.tables.len(),
            ..Default::default()
        };

        for (name, entry) in &self.tables {
            let selectors = entry.spec.item.iter().chain(std::iter::once(&entry.spec.key));
            for expr in selectors {
                if let Err(e) = XPath::parse(expr) {
                    diagnostics.invalid_selectors.push(format!("{name}: {e}"));
                }
            }
            if entry.spec.item.is_none() {
                diagnostics.composite_tables.push(name.clone());
            }
            if let Some(view) = &entry.view
                && !self.views.contains_key(view)
            {
                diagnostics.unknown_views.push(format!("{name} -> {view}"));
            }
        }

        diagnostics.unused_views = self
            .views
            .keys()
            .filter(|view| {
                !self
                    .tables
                    .values()
                    .any(|entry| entry.view.as_deref() == Some(view.as_str()))
            })
            .cloned()
            .collect();

        diagnostics
    }

    /// Diagnostics as pretty JSON.
    pub fn diagnose_json(&self) -> Result<String, TableError> {
        serde_json::to_string_pretty(&self.diagnose())
            .map_err(|e| TableError::Catalog(format!("diagnostics encode error: {e}")))
    }

    /// JSON schema of [`CatalogDocument`].
    pub fn json_schema() -> Result<String, TableError> {
        let schema = schemars::schema_for!(CatalogDocument);
        serde_json::to_string_pretty(&schema)
            .map_err(|e| TableError::Catalog(format!("schema encode error: {e}")))
    }
}
