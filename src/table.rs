//! Tables: indexable collections over a fetched RPC reply.
//!
//! A [`Table`] pairs a session with a [`TableSpec`]: which RPC to call, its
//! default arguments, an XPath selecting the repeating record elements and
//! an XPath selecting each record's name field. After [`Table::fetch`] the
//! records can be counted, listed by key, looked up by name or position,
//! or iterated; each comes back as raw XML or, when a [`ViewClass`] is set,
//! as a freshly built view.
//!
//! A spec without a record selector describes a *composite* table: the
//! whole reply is a single logical record, `count()` is always 1 and every
//! lookup returns the whole document.
//!
//! ```rust
//! use std::sync::Arc;
//! use rjunos::rpc::RpcArgs;
//! use rjunos::session::StaticSession;
//! use rjunos::table::{Table, TableSpec};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let session = StaticSession::new("vsrx").with_reply(
//!     "get-interface-information",
//!     "<interface-information>\
//!        <physical-interface><name>ge-0/0/0</name></physical-interface>\
//!        <physical-interface><name>ge-0/0/1</name></physical-interface>\
//!      </interface-information>",
//! );
//! let spec = TableSpec::new("PhyPortTable", "get-interface-information")
//!     .with_item("physical-interface")
//!     .with_arg("terse", true);
//!
//! let mut table = Table::new(Arc::new(session), spec)?;
//! table.fetch(&RpcArgs::new())?;
//!
//! assert_eq!(table.keys()?, vec!["ge-0/0/0", "ge-0/0/1"]);
//! assert!(table.get("ge-0/0/1")?.is_some());
//! assert!(table.get(-1)?.is_some());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use log::{debug, trace};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{RpcError, TableError};
use crate::rpc::{RpcArg, RpcArgs};
use crate::session::{Rpc, Session};
use crate::view::{Fields, View, ViewClass};
use crate::xml::{Document, Element};
use crate::xpath::{Predicate, XPath};

/// Name-field selector used when a spec does not set one.
pub const DEFAULT_KEY: &str = "name";

fn default_key() -> String {
    DEFAULT_KEY.to_string()
}

/// Static configuration of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TableSpec {
    /// Display name, e.g. `PhyPortTable`.
    #[serde(default)]
    pub name: String,
    /// Remote operation fetching the table, e.g. `get-interface-information`.
    pub rpc: String,
    /// Default RPC arguments; caller options passed to `fetch` win.
    #[serde(default)]
    pub args: RpcArgs,
    /// Record selector. `None` makes a composite table.
    #[serde(default)]
    pub item: Option<String>,
    /// Name-field selector, relative to a record.
    #[serde(default = "default_key")]
    pub key: String,
}

impl TableSpec {
    pub fn new(name: impl Into<String>, rpc: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rpc: rpc.into(),
            args: RpcArgs::new(),
            item: None,
            key: default_key(),
        }
    }

    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.item = Some(item.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<RpcArg>) -> Self {
        self.args.insert(name, value);
        self
    }
}

/// Lookup key for [`Table::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableKey {
    /// Record whose name field, whitespace-normalized, equals this.
    Name(String),
    /// Zero-based position; negative values count from the end.
    Position(isize),
}

impl From<&str> for TableKey {
    fn from(name: &str) -> Self {
        TableKey::Name(name.to_string())
    }
}

impl From<String> for TableKey {
    fn from(name: String) -> Self {
        TableKey::Name(name)
    }
}

impl From<isize> for TableKey {
    fn from(position: isize) -> Self {
        TableKey::Position(position)
    }
}

impl From<i32> for TableKey {
    fn from(position: i32) -> Self {
        // lossless on every target with at least 32-bit pointers
        TableKey::Position(position as isize)
    }
}

impl From<usize> for TableKey {
    fn from(position: usize) -> Self {
        TableKey::Position(isize::try_from(position).unwrap_or(isize::MAX))
    }
}

/// One record handed out by a table.
#[derive(Debug)]
pub enum Item {
    Xml(Element),
    View(Box<dyn View>),
}

impl Item {
    /// The underlying record element.
    pub fn record(&self) -> &Element {
        match self {
            Item::Xml(record) => record,
            Item::View(view) => view.record(),
        }
    }

    pub fn as_view(&self) -> Option<&dyn View> {
        match self {
            Item::Xml(_) => None,
            Item::View(view) => Some(&**view),
        }
    }

    /// The view as its concrete type.
    pub fn view_as<V: View + 'static>(&self) -> Option<&V> {
        self.as_view()?.as_any().downcast_ref::<V>()
    }

    pub fn into_entry(self) -> Entry {
        match self {
            Item::Xml(record) => Entry::Xml(record),
            Item::View(view) => Entry::Fields(view.items()),
        }
    }
}

/// A value from [`Table::values`]: raw XML, or a view's rendered fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Xml(Element),
    Fields(Fields),
}

/// A collection view over one session's RPC reply.
///
/// The table is either empty (no document yet) or loaded; `fetch` replaces
/// the document wholesale and nothing clears it.
pub struct Table {
    session: Arc<dyn Session>,
    spec: TableSpec,
    item: Option<XPath>,
    key: XPath,
    view: Option<ViewClass>,
    document: Option<Document>,
}

impl Table {
    /// Compiles the `TableSpec` selectors; a bad one fails with `InvalidXPath`.
    pub fn new(session: Arc<dyn Session>, spec: TableSpec) -> Result<Self, TableError> {
        let item = spec.item.as_deref().map(XPath::parse).transpose()?;
        let key = XPath::parse(&spec.key)?;
        Ok(Self {
            session,
            spec,
            item,
            key,
            view: None,
            document: None,
        })
    }

    /// Renders every record through `view`.
    pub fn with_view(mut self, view: ViewClass) -> Self {
        self.view = Some(view);
        self
    }

    /// Starts loaded with `document`, for offline use.
    pub fn with_document(mut self, document: Document) -> Self {
        self.document = Some(document);
        self
    }

    pub fn spec(&self) -> &TableSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    pub fn hostname(&self) -> &str {
        self.session.hostname()
    }

    /// RPC facade of the owning session.
    pub fn rpc(&self) -> Rpc<'_> {
        Rpc::new(self.session.as_ref())
    }

    /// The last fetched document, if any.
    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.document.is_some()
    }

    pub fn view(&self) -> Option<&ViewClass> {
        self.view.as_ref()
    }

    pub fn is_composite(&self) -> bool {
        self.item.is_none()
    }

    /// Calls the table RPC with the `TableSpec` default arguments overridden by
    /// `options` and stores the reply.
    ///
    /// Errors are the session's own, and leave the previous document in
    /// place. Returns `self` for chaining.
    pub fn fetch(&mut self, options: &RpcArgs) -> Result<&mut Self, RpcError> {
        let args = self.spec.args.merged(options);
        debug!(
            "{}@{} fetching via {}",
            self.spec.name,
            self.hostname(),
            self.spec.rpc
        );
        let document = self.rpc().call(&self.spec.rpc, &args)?;
        self.document = Some(document);
        Ok(self)
    }

    fn loaded(&self) -> Result<&Document, TableError> {
        self.document.as_ref().ok_or(TableError::NoData)
    }

    fn records(&self) -> Result<Vec<Element>, TableError> {
        let document = self.loaded()?;
        Ok(match &self.item {
            Some(item) => document.xpath(item),
            None => vec![document.root().clone()],
        })
    }

    /// Number of records; always 1 for a composite table.
    pub fn count(&self) -> Result<usize, TableError> {
        match &self.item {
            None => Ok(1),
            Some(item) => Ok(self.loaded()?.xpath(item).len()),
        }
    }

    /// Record names in document order; empty for a composite table.
    ///
    /// A record without a name field contributes an empty string, so the
    /// result always lines up with [`Table::values`].
    pub fn keys(&self) -> Result<Vec<String>, TableError> {
        let Some(item) = &self.item else {
            return Ok(Vec::new());
        };
        Ok(self
            .loaded()?
            .xpath(item)
            .iter()
            .map(|record| self.record_key(record))
            .collect())
    }

    /// Trimmed string value of `record`'s name field.
    ///
    /// Uses the same text name lookup compares against, so every key is
    /// found again by [`Table::get_by_name`].
    pub fn record_key(&self, record: &Element) -> String {
        self.key
            .select_from(record)
            .first()
            .map(|field| field.string_value().trim().to_string())
            .unwrap_or_default()
    }

    /// Raw records, or each view's fields when a view is set.
    pub fn values(&self) -> Result<Vec<Entry>, TableError> {
        Ok(self.iter()?.map(Item::into_entry).collect())
    }

    /// `keys()` paired with `values()`.
    pub fn items(&self) -> Result<Vec<(String, Entry)>, TableError> {
        Ok(self.keys()?.into_iter().zip(self.values()?).collect())
    }

    /// Looks a record up by name or by position.
    ///
    /// `Ok(None)` when nothing matches. See [`Table::get_by_name`] and
    /// [`Table::get_by_position`].
    pub fn get(&self, key: impl Into<TableKey>) -> Result<Option<Item>, TableError> {
        match key.into() {
            TableKey::Name(name) => self.get_by_name(&name),
            TableKey::Position(position) => self.get_by_position(position),
        }
    }

    /// First record whose whitespace-normalized name equals `name`.
    pub fn get_by_name(&self, name: &str) -> Result<Option<Item>, TableError> {
        let document = self.loaded()?;
        let Some(item) = &self.item else {
            return Ok(Some(self.render(document.root().clone())));
        };
        let narrowed = item.with_predicate(Predicate::field_equals(&self.key, name));
        trace!("{} lookup {}", self.spec.name, narrowed);
        Ok(document
            .xpath(&narrowed)
            .into_iter()
            .next()
            .map(|record| self.render(record)))
    }

    /// Record at zero-based `index`; `-1` is the last record.
    pub fn get_by_position(&self, index: isize) -> Result<Option<Item>, TableError> {
        let document = self.loaded()?;
        let Some(item) = &self.item else {
            return Ok(Some(self.render(document.root().clone())));
        };
        let records = document.xpath(item);
        let Some(position) = xpath_position(index, records.len()) else {
            trace!("{} position {} out of range", self.spec.name, index);
            return Ok(None);
        };
        Ok(records
            .into_iter()
            .nth(position - 1)
            .map(|record| self.render(record)))
    }

    /// Iterates every record in document order.
    ///
    /// The matched records are captured when this is called; views are built
    /// one at a time as the iterator advances.
    pub fn iter(&self) -> Result<Iter<'_>, TableError> {
        Ok(Iter {
            table: self,
            records: self.records()?.into_iter(),
        })
    }

    fn render(&self, record: Element) -> Item {
        match &self.view {
            Some(view) => Item::View(view.construct(self, record)),
            None => Item::Xml(record),
        }
    }
}

/// Maps a zero-based, possibly negative index onto a one-based position in
/// `1..=count`.
fn xpath_position(index: isize, count: usize) -> Option<usize> {
    let count = isize::try_from(count).ok()?;
    let position = if index < 0 {
        count + index + 1
    } else {
        index.checked_add(1)?
    };
    if (1..=count).contains(&position) {
        usize::try_from(position).ok()
    } else {
        None
    }
}

/// Iterator over a table's records, see [`Table::iter`].
pub struct Iter<'a> {
    table: &'a Table,
    records: std::vec::IntoIter<Element>,
}

impl Iterator for Iter<'_> {
    type Item = Item;

    fn next(&mut self) -> Option<Item> {
        self.records.next().map(|record| self.table.render(record))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.item {
            Some(item) => {
                let count = self
                    .document
                    .as_ref()
                    .map(|doc| doc.xpath(item).len())
                    .unwrap_or(0);
                write!(f, "{}\n@{}: {} items", self.spec.name, self.hostname(), count)
            }
            None => {
                let data = if self.is_loaded() { "yes" } else { "no" };
                write!(f, "{}\n@{}: data={}", self.spec.name, self.hostname(), data)
            }
        }
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("spec", &self.spec)
            .field("hostname", &self.hostname())
            .field("view", &self.view.as_ref().map(ViewClass::name))
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StaticSession;
    use crate::view::{FromRecord, ViewSpec};
    use serde_json::json;

    const ABC: &str = r#"<entries>
  <entry><name>a</name><value>1</value></entry>
  <entry><name>
      b
  </name><value>2</value></entry>
  <entry><name>c</name><value>3</value></entry>
</entries>"#;

    #[derive(Debug)]
    struct ValueView {
        record: Element,
        hostname: String,
    }

    impl FromRecord for ValueView {
        fn from_record(table: &Table, record: Element) -> Self {
            Self {
                record,
                hostname: table.hostname().to_string(),
            }
        }
    }

    impl View for ValueView {
        fn record(&self) -> &Element {
            &self.record
        }

        fn items(&self) -> Fields {
            let mut fields = Fields::new();
            let value = self.record.child("value").map(|v| v.text().to_string());
            fields.insert("value".to_string(), json!(value));
            fields
        }
    }

    fn session() -> Arc<StaticSession> {
        Arc::new(StaticSession::new("vsrx").with_reply("get-entries", ABC))
    }

    fn spec() -> TableSpec {
        TableSpec::new("EntryTable", "get-entries").with_item("entry")
    }

    fn loaded() -> Table {
        let mut table = Table::new(session(), spec()).expect("table");
        table.fetch(&RpcArgs::new()).expect("fetch");
        table
    }

    fn value_of(item: &Item) -> String {
        item.record()
            .child("value")
            .map(|v| v.text().to_string())
            .unwrap_or_default()
    }

    #[test]
    fn keys_count_and_items_agree() {
        let table = loaded();
        assert_eq!(table.count().expect("count"), 3);
        assert_eq!(table.keys().expect("keys"), vec!["a", "b", "c"]);
        let items = table.items().expect("items");
        assert_eq!(items.len(), 3);
        assert_eq!(items[1].0, "b");
        assert!(matches!(&items[1].1, Entry::Xml(e) if e.name() == "entry"));
    }

    #[test]
    fn name_lookup_normalizes_whitespace() {
        let table = loaded();
        let b = table.get("b").expect("get").expect("b exists");
        assert_eq!(value_of(&b), "2");
        assert!(table.get("z").expect("get").is_none());
        assert!(table.get(String::from("c")).expect("get").is_some());
    }

    #[test]
    fn positive_and_negative_positions_match() {
        let table = loaded();
        let k = table.count().expect("count") as isize;
        for i in 0..k {
            let forward = table.get(i).expect("get").expect("in range");
            let backward = table.get(i - k).expect("get").expect("in range");
            assert!(forward.record().ptr_eq(backward.record()));
        }
        let last = table.get(-1).expect("get").expect("last");
        assert_eq!(value_of(&last), "3");
        assert!(table.get(3).expect("get").is_none());
        assert!(table.get(-4).expect("get").is_none());
        assert!(table.get(usize::MAX).expect("get").is_none());
    }

    #[test]
    fn reads_before_fetch_fail_with_no_data() {
        let table = Table::new(session(), spec()).expect("table");
        assert!(matches!(table.count(), Err(TableError::NoData)));
        assert!(matches!(table.keys(), Err(TableError::NoData)));
        assert!(matches!(table.get(0), Err(TableError::NoData)));
        assert!(matches!(table.get("a"), Err(TableError::NoData)));
        assert!(matches!(table.iter(), Err(TableError::NoData)));
        assert!(matches!(table.values(), Err(TableError::NoData)));
        assert_eq!(table.to_string(), "EntryTable\n@vsrx: 0 items");
    }

    #[test]
    fn iteration_is_restartable_and_ordered() {
        let table = loaded();
        let first: Vec<Element> = table
            .iter()
            .expect("iter")
            .map(|i| i.record().clone())
            .collect();
        let second: Vec<Element> = table
            .iter()
            .expect("iter")
            .map(|i| i.record().clone())
            .collect();
        assert_eq!(first.len(), 3);
        assert!(first.iter().zip(&second).all(|(a, b)| a.ptr_eq(b)));
        assert_eq!(table.iter().expect("iter").len(), 3);
    }

    #[test]
    fn views_are_built_fresh_per_access() {
        let table = loaded().with_view(ViewClass::of::<ValueView>("ValueView"));
        let one = table.get(0).expect("get").expect("first");
        let two = table.get(0).expect("get").expect("first");

        let v1 = one.view_as::<ValueView>().expect("value view");
        let v2 = two.view_as::<ValueView>().expect("value view");
        assert!(!std::ptr::eq(v1, v2));
        assert!(v1.record.ptr_eq(&v2.record));
        assert_eq!(v1.hostname, "vsrx");
        assert_eq!(v1.items(), v2.items());

        let values = table.values().expect("values");
        assert_eq!(values.len(), 3);
        assert!(matches!(&values[2], Entry::Fields(f) if f["value"] == json!("3")));
    }

    #[test]
    fn composite_table_is_one_record() {
        let spec = TableSpec::new("EntriesDoc", "get-entries");
        let table = Table::new(session(), spec).expect("table");
        assert_eq!(table.count().expect("count"), 1);
        assert!(table.keys().expect("keys").is_empty());
        assert_eq!(table.to_string(), "EntriesDoc\n@vsrx: data=no");

        let mut table = table;
        table.fetch(&RpcArgs::new()).expect("fetch");
        assert_eq!(table.to_string(), "EntriesDoc\n@vsrx: data=yes");
        let by_name = table.get("whatever").expect("get").expect("whole doc");
        let by_pos = table.get(42).expect("get").expect("whole doc");
        assert_eq!(by_name.record().name(), "entries");
        assert!(by_name.record().ptr_eq(by_pos.record()));
        assert_eq!(table.iter().expect("iter").count(), 1);
        assert!(table.items().expect("items").is_empty());
    }

    #[test]
    fn fetch_merges_args_and_replaces_document() {
        let session = session();
        let spec = spec().with_arg("terse", true).with_arg("level", "brief");
        let mut table = Table::new(session.clone(), spec).expect("table");

        table
            .fetch(&RpcArgs::new().with("level", "detail"))
            .expect("fetch")
            .fetch(&RpcArgs::new())
            .expect("chained fetch");

        let requests = session.requests().expect("requests");
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].args.get("terse"), Some(&RpcArg::Flag(true)));
        assert_eq!(
            requests[0].args.get("level"),
            Some(&RpcArg::Text("detail".to_string()))
        );
        assert_eq!(
            requests[1].args.get("level"),
            Some(&RpcArg::Text("brief".to_string()))
        );

        session
            .set_reply("get-entries", "<entries><entry><name>z</name></entry></entries>")
            .expect("set reply");
        table.fetch(&RpcArgs::new()).expect("fetch");
        assert_eq!(table.keys().expect("keys"), vec!["z"]);
        assert!(table.get("a").expect("get").is_none());
    }

    #[test]
    fn failed_fetch_keeps_previous_document() {
        let session = session();
        let mut table = Table::new(session.clone(), spec()).expect("table");
        table.fetch(&RpcArgs::new()).expect("fetch");

        session
            .fail_with("get-entries", "connection reset")
            .expect("fail_with");
        let err = table.fetch(&RpcArgs::new()).expect_err("transport failure");
        assert!(matches!(err, RpcError::Transport(ref m) if m == "connection reset"));
        assert_eq!(table.count().expect("count"), 3);
    }

    #[test]
    fn missing_name_field_yields_empty_key() {
        let doc = Document::parse("<r><entry><name>a</name></entry><entry/></r>").expect("parse");
        let table = Table::new(session(), spec())
            .expect("table")
            .with_document(doc);
        assert_eq!(table.keys().expect("keys"), vec!["a", ""]);
        assert_eq!(table.values().expect("values").len(), 2);
    }

    #[test]
    fn nested_records_follow_document_order() {
        let doc = Document::parse(
            "<r><unit><name>1</name><unit><name>2</name></unit></unit><unit><name>3</name></unit></r>",
        )
        .expect("parse");
        let table = Table::new(session(), spec().with_item("//unit"))
            .expect("table")
            .with_document(doc);

        assert_eq!(table.keys().expect("keys"), vec!["1", "2", "3"]);
        let last = table.get(-1).expect("get").expect("last");
        assert_eq!(table.record_key(last.record()), "3");
        let second = table.get(1).expect("get").expect("second");
        assert!(second.record().ptr_eq(table.get("2").expect("get").expect("2").record()));
        let iterated: Vec<String> = table
            .iter()
            .expect("iter")
            .map(|item| table.record_key(item.record()))
            .collect();
        assert_eq!(iterated, vec!["1", "2", "3"]);
    }

    #[test]
    fn keys_with_markup_are_found_by_name() {
        let doc = Document::parse("<r><entry><name>ge-0/0/<b>1</b></name></entry></r>")
            .expect("parse");
        let table = Table::new(session(), spec())
            .expect("table")
            .with_document(doc);

        assert_eq!(table.keys().expect("keys"), vec!["ge-0/0/1"]);
        assert!(table.get("ge-0/0/1").expect("get").is_some());
    }

    #[test]
    fn bad_selectors_are_rejected() {
        let err = Table::new(session(), spec().with_item("entry[")).expect_err("bad item");
        assert!(matches!(err, TableError::InvalidXPath(_)));
        let err = Table::new(session(), spec().with_key("")).expect_err("bad key");
        assert!(matches!(err, TableError::InvalidXPath(_)));
    }

    #[test]
    fn declarative_view_on_table() {
        let view = ViewClass::from_spec("EntryView", &ViewSpec::default().field("value", "value"))
            .expect("view");
        let table = loaded().with_view(view);
        let item = table.get("c").expect("get").expect("c");
        assert_eq!(item.as_view().expect("view").items()["value"], json!("3"));
        assert!(item.view_as::<ValueView>().is_none());
    }

    #[test]
    fn xpath_position_mapping() {
        assert_eq!(xpath_position(0, 3), Some(1));
        assert_eq!(xpath_position(2, 3), Some(3));
        assert_eq!(xpath_position(-1, 3), Some(3));
        assert_eq!(xpath_position(-3, 3), Some(1));
        assert_eq!(xpath_position(-4, 3), None);
        assert_eq!(xpath_position(3, 3), None);
        assert_eq!(xpath_position(0, 0), None);
        assert_eq!(xpath_position(isize::MAX, 3), None);
    }
}
