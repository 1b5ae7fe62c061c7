//! XML document model for RPC replies.
//!
//! Replies are parsed once into an immutable tree of reference-counted
//! [`Element`] handles. Cloning an element is cheap, and a handle stays valid
//! after the [`Document`] it came from has been dropped or replaced, which is
//! what lets tables hand records out independently of later fetches.
//!
//! Namespace prefixes are stripped to local names and `xmlns` declarations
//! are dropped, so `junos:style` becomes `style` and selectors never need
//! namespace bindings.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{XPathError, XmlError};
use crate::xpath::XPath;

#[derive(Debug, PartialEq, Eq)]
struct Node {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

/// Shared handle to one element of a parsed document.
///
/// Equality is structural; use [`Element::ptr_eq`] to ask whether two handles
/// point at the same node.
#[derive(Clone, PartialEq, Eq)]
pub struct Element(Arc<Node>);

impl Element {
    /// Builds a detached element. Mostly useful for tests and synthetic replies.
    pub fn new(
        name: impl Into<String>,
        attributes: Vec<(String, String)>,
        text: impl Into<String>,
        children: Vec<Element>,
    ) -> Self {
        Self(Arc::new(Node {
            name: name.into(),
            attributes,
            text: text.into(),
            children,
        }))
    }

    /// Local element name.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.0
            .attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Text directly inside this element, untrimmed.
    pub fn text(&self) -> &str {
        &self.0.text
    }

    pub fn children(&self) -> &[Element] {
        &self.0.children
    }

    /// First child with the given local name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.0.children.iter().find(|c| c.name() == name)
    }

    /// All text in this subtree, concatenated in document order.
    pub fn string_value(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        out.push_str(&self.0.text);
        for child in &self.0.children {
            child.collect_text(out);
        }
    }

    /// Visits this element and every descendant in document order.
    pub(crate) fn for_each_self_or_descendant(&self, f: &mut impl FnMut(&Element)) {
        f(self);
        for child in &self.0.children {
            child.for_each_self_or_descendant(f);
        }
    }

    /// True when both handles refer to the same node.
    pub fn ptr_eq(&self, other: &Element) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Stable identity of the node while any handle to it is alive.
    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// Evaluates a compiled expression with this element as context node.
    pub fn xpath(&self, path: &XPath) -> Vec<Element> {
        path.select_from(self)
    }

    /// First element matched by `path`, relative to this element.
    pub fn find(&self, path: &str) -> Result<Option<Element>, XPathError> {
        let compiled = XPath::parse(path)?;
        Ok(compiled.select_from(self).into_iter().next())
    }

    /// Direct text of the first element matched by `path`.
    ///
    /// `Ok(None)` when nothing matches; an element without text yields an
    /// empty string.
    pub fn find_text(&self, path: &str) -> Result<Option<String>, XPathError> {
        Ok(self.find(path)?.map(|e| e.text().to_string()))
    }

    /// Serializes this subtree.
    pub fn to_xml(&self) -> Result<String, XmlError> {
        let mut writer = Writer::new(Vec::new());
        write_element(&mut writer, self)?;
        String::from_utf8(writer.into_inner()).map_err(write_err)
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("name", &self.0.name)
            .field("attributes", &self.0.attributes)
            .field("text", &self.0.text.trim())
            .field("children", &self.0.children.len())
            .finish()
    }
}

/// A parsed RPC reply.
///
/// Relative selectors are evaluated with the root element as context node.
/// Absolute selectors (`/a/b`, `//b`) start above the root.
#[derive(Debug, Clone)]
pub struct Document {
    root: Element,
    // synthetic parent of `root`, the context node for absolute selectors
    top: Element,
}

impl Document {
    pub fn parse(xml: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Partial> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => stack.push(Partial::open(&e)?),
                Ok(Event::Empty(e)) => {
                    let element = Partial::open(&e)?.close();
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::End(e)) => {
                    let name = decode(e.local_name().as_ref());
                    let partial = stack.pop().ok_or(XmlError::UnexpectedClose(name))?;
                    attach(&mut stack, &mut root, partial.close())?;
                }
                Ok(Event::Text(t)) => {
                    if let Some(top) = stack.last_mut() {
                        let text = t.unescape().map_err(malformed)?;
                        top.text.push_str(&text);
                    }
                }
                Ok(Event::CData(c)) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(malformed(e)),
            }
        }

        if let Some(open) = stack.last() {
            return Err(XmlError::Unclosed(open.name.clone()));
        }
        root.map(Self::from_root).ok_or(XmlError::Empty)
    }

    /// Wraps an existing element as a document.
    pub fn from_root(root: Element) -> Self {
        let top = Element::new("", Vec::new(), "", vec![root.clone()]);
        Self { root, top }
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub(crate) fn top(&self) -> &Element {
        &self.top
    }

    pub fn xpath(&self, path: &XPath) -> Vec<Element> {
        path.select(self)
    }

    pub fn to_xml(&self) -> Result<String, XmlError> {
        self.root.to_xml()
    }
}

impl FromStr for Document {
    type Err = XmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Collapses whitespace runs to single spaces and trims both ends.
pub fn normalize_space(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drops repeated nodes, keeping first occurrences in order.
pub(crate) fn dedup(elements: Vec<Element>) -> Vec<Element> {
    let mut seen = HashSet::with_capacity(elements.len());
    elements.into_iter().filter(|e| seen.insert(e.id())).collect()
}

struct Partial {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Partial {
    fn open(start: &BytesStart<'_>) -> Result<Self, XmlError> {
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(malformed)?;
            if attr.key.as_ref().starts_with(b"xmlns") {
                continue;
            }
            let key = decode(attr.key.local_name().as_ref());
            let value = attr.unescape_value().map_err(malformed)?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name: decode(start.local_name().as_ref()),
            attributes,
            text: String::new(),
            children: Vec::new(),
        })
    }

    fn close(self) -> Element {
        Element::new(self.name, self.attributes, self.text, self.children)
    }
}

fn attach(
    stack: &mut [Partial],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), XmlError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(XmlError::Malformed(format!(
            "second root element <{}>",
            element.name()
        )));
    }
    *root = Some(element);
    Ok(())
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<(), XmlError> {
    let mut start = BytesStart::new(element.name());
    for (key, value) in element.attributes() {
        start.push_attribute((key, value));
    }
    if element.children().is_empty() && element.text().is_empty() {
        writer.write_event(Event::Empty(start)).map_err(write_err)?;
        return Ok(());
    }
    writer.write_event(Event::Start(start)).map_err(write_err)?;
    if !element.text().is_empty() {
        writer
            .write_event(Event::Text(BytesText::new(element.text())))
            .map_err(write_err)?;
    }
    for child in element.children() {
        write_element(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name())))
        .map_err(write_err)?;
    Ok(())
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn malformed(err: impl fmt::Display) -> XmlError {
    XmlError::Malformed(err.to_string())
}

pub(crate) fn write_err(err: impl fmt::Display) -> XmlError {
    XmlError::Write(err.to_string())
}
