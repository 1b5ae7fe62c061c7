//! A small XPath 1.0 subset for selecting table records and fields.
//!
//! Supported:
//!
//! - location paths: `a/b`, `/a/b`, `//b`, `a//b`, `.`, `*`, `prefix:name`
//! - predicates: `[3]`, `[last()]`, `[name]`, `[@attr]`, `[text()]`,
//!   `[name='x']`, `[name!='x']`, `[normalize-space(name)="x"]`
//!
//! Positional predicates count within each context node, as in XPath.
//! Result sets are de-duplicated and returned in document order, including
//! `//` selections whose matches nest inside each other.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::XPathError;
use crate::xml::{Document, Element, dedup, normalize_space};

static NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[A-Za-z_][\w.\-]*:)?[A-Za-z_][\w.\-]*$").expect("valid name regex")
});

/// A compiled selector expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPath {
    expr: String,
    absolute: bool,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    // descendant-or-self::node()/child::
    Descendant,
    SelfNode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeTest {
    Name(String),
    Any,
}

/// Filter applied to the candidates of one location step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// One-based position among the step's candidates.
    Position(usize),
    Last,
    Exists(Operand),
    Compare {
        operand: Operand,
        negate: bool,
        value: String,
    },
}

/// Value source inside a predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// String values of the nodes a relative path selects.
    Path(XPath),
    Attr(String),
    /// Direct text of the context node.
    Text,
    NormalizeSpace(Box<Operand>),
}

impl Predicate {
    /// `[normalize-space(<field>)="<value>"]`
    pub fn field_equals(field: &XPath, value: &str) -> Self {
        Predicate::Compare {
            operand: Operand::NormalizeSpace(Box::new(Operand::Path(field.clone()))),
            negate: false,
            value: value.to_string(),
        }
    }

    fn matches(&self, node: &Element, position: usize, size: usize) -> bool {
        match self {
            Predicate::Position(n) => position == *n,
            Predicate::Last => position == size,
            Predicate::Exists(operand) => operand.exists(node),
            Predicate::Compare {
                operand,
                negate,
                value,
            } => operand
                .values(node)
                .iter()
                .any(|v| (v == value) != *negate),
        }
    }
}

impl Operand {
    fn values(&self, node: &Element) -> Vec<String> {
        match self {
            Operand::Path(path) => path
                .select_from(node)
                .iter()
                .map(Element::string_value)
                .collect(),
            Operand::Attr(name) => node.attr(name).map(str::to_string).into_iter().collect(),
            Operand::Text if node.text().is_empty() => Vec::new(),
            Operand::Text => vec![node.text().to_string()],
            Operand::NormalizeSpace(inner) => {
                let first = inner.values(node).into_iter().next().unwrap_or_default();
                vec![normalize_space(&first)]
            }
        }
    }

    fn exists(&self, node: &Element) -> bool {
        match self {
            Operand::NormalizeSpace(_) => self.values(node).iter().any(|v| !v.is_empty()),
            _ => !self.values(node).is_empty(),
        }
    }
}

impl XPath {
    pub fn parse(expr: &str) -> Result<Self, XPathError> {
        let mut parser = Parser::new(expr);
        let path = parser.path(true)?;
        parser.skip_ws();
        if !parser.at_end() {
            return Err(parser.error(format!("unexpected '{}'", parser.rest())));
        }
        Ok(path)
    }

    /// The expression text, including any predicates appended in code.
    pub fn as_str(&self) -> &str {
        &self.expr
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// Returns a copy narrowed by `predicate` on its final step.
    pub fn with_predicate(&self, predicate: Predicate) -> Self {
        let mut narrowed = self.clone();
        narrowed.expr = format!("{}[{}]", self.expr, predicate);
        if let Some(last) = narrowed.steps.last_mut() {
            last.predicates.push(predicate);
        }
        narrowed
    }

    /// Evaluates against a document: relative paths start at the root element.
    pub fn select(&self, doc: &Document) -> Vec<Element> {
        let context = if self.absolute { doc.top() } else { doc.root() };
        self.eval(context)
    }

    /// Evaluates with `context` as context node.
    ///
    /// Elements carry no parent links, so an absolute path treats `context`
    /// as the root of its own document.
    pub fn select_from(&self, context: &Element) -> Vec<Element> {
        if self.absolute {
            let top = Element::new("", Vec::new(), "", vec![context.clone()]);
            return self.eval(&top);
        }
        self.eval(context)
    }

    fn eval(&self, context: &Element) -> Vec<Element> {
        let mut current = vec![context.clone()];
        for step in &self.steps {
            let next = current.iter().flat_map(|node| step.apply(node)).collect();
            current = dedup(next);
        }
        document_order(context, current)
    }
}

/// Sorts `nodes` by preorder position under `context`.
///
/// Step evaluation groups candidates per parent, so a descendant step can
/// emit later siblings before the nested matches of an earlier one.
fn document_order(context: &Element, mut nodes: Vec<Element>) -> Vec<Element> {
    if nodes.len() < 2 {
        return nodes;
    }
    let mut rank = HashMap::new();
    context.for_each_self_or_descendant(&mut |node| {
        let next = rank.len();
        rank.entry(node.id()).or_insert(next);
    });
    nodes.sort_by_key(|node| rank.get(&node.id()).copied().unwrap_or(usize::MAX));
    nodes
}

impl Step {
    fn apply(&self, node: &Element) -> Vec<Element> {
        match self.axis {
            Axis::SelfNode => self.filter(vec![node.clone()]),
            Axis::Child => self.filter(self.matching_children(node)),
            Axis::Descendant => {
                let mut out = Vec::new();
                node.for_each_self_or_descendant(&mut |parent| {
                    out.extend(self.filter(self.matching_children(parent)));
                });
                out
            }
        }
    }

    fn matching_children(&self, node: &Element) -> Vec<Element> {
        node.children()
            .iter()
            .filter(|child| match &self.test {
                NodeTest::Any => true,
                NodeTest::Name(name) => child.name() == name,
            })
            .cloned()
            .collect()
    }

    fn filter(&self, mut candidates: Vec<Element>) -> Vec<Element> {
        for predicate in &self.predicates {
            let size = candidates.len();
            candidates = candidates
                .into_iter()
                .enumerate()
                .filter(|(i, node)| predicate.matches(node, i + 1, size))
                .map(|(_, node)| node)
                .collect();
        }
        candidates
    }
}

impl FromStr for XPath {
    type Err = XPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for XPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Position(n) => write!(f, "{n}"),
            Predicate::Last => f.write_str("last()"),
            Predicate::Exists(operand) => write!(f, "{operand}"),
            Predicate::Compare {
                operand,
                negate,
                value,
            } => {
                let op = if *negate { "!=" } else { "=" };
                if value.contains('"') {
                    write!(f, "{operand}{op}'{value}'")
                } else {
                    write!(f, "{operand}{op}\"{value}\"")
                }
            }
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Path(path) => write!(f, "{path}"),
            Operand::Attr(name) => write!(f, "@{name}"),
            Operand::Text => f.write_str("text()"),
            Operand::NormalizeSpace(inner) => write!(f, "normalize-space({inner})"),
        }
    }
}

struct Parser<'a> {
    expr: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(expr: &'a str) -> Self {
        Self { expr, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.expr[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.expr.len()
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.expr.len() - trimmed.len();
    }

    fn error(&self, reason: impl Into<String>) -> XPathError {
        XPathError::new(self.expr, reason)
    }

    fn path(&mut self, allow_absolute: bool) -> Result<XPath, XPathError> {
        let start = self.pos;
        self.skip_ws();
        let mut absolute = false;
        let mut axis = Axis::Child;
        if self.eat("//") {
            absolute = true;
            axis = Axis::Descendant;
        } else if self.eat("/") {
            absolute = true;
        }
        if absolute && !allow_absolute {
            return Err(self.error("absolute path not allowed in predicate"));
        }

        let mut steps = Vec::new();
        loop {
            steps.push(self.step(axis)?);
            if self.eat("//") {
                axis = Axis::Descendant;
            } else if self.eat("/") {
                axis = Axis::Child;
            } else {
                break;
            }
        }

        Ok(XPath {
            expr: self.expr[start..self.pos].trim().to_string(),
            absolute,
            steps,
        })
    }

    fn step(&mut self, axis: Axis) -> Result<Step, XPathError> {
        let (axis, test) = if self.eat("..") {
            return Err(self.error("parent axis is not supported"));
        } else if self.eat(".") {
            (Axis::SelfNode, NodeTest::Any)
        } else if self.eat("*") {
            (axis, NodeTest::Any)
        } else {
            (axis, NodeTest::Name(self.name()?))
        };

        let mut predicates = Vec::new();
        while self.eat("[") {
            predicates.push(self.predicate()?);
            self.skip_ws();
            if !self.eat("]") {
                return Err(self.error("expected ']'"));
            }
        }
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn name(&mut self) -> Result<String, XPathError> {
        let len = self
            .rest()
            .find(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')))
            .unwrap_or(self.rest().len());
        let raw = &self.rest()[..len];
        if raw.is_empty() {
            return Err(self.error("expected element name"));
        }
        if !NAME.is_match(raw) {
            return Err(self.error(format!("invalid name '{raw}'")));
        }
        self.pos += len;
        let local = raw.rsplit(':').next().unwrap_or(raw);
        Ok(local.to_string())
    }

    fn predicate(&mut self) -> Result<Predicate, XPathError> {
        self.skip_ws();
        let digits = self
            .rest()
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(self.rest().len());
        if digits > 0 {
            let n: usize = self.rest()[..digits]
                .parse()
                .map_err(|_| self.error("position out of range"))?;
            if n == 0 {
                return Err(self.error("positions start at 1"));
            }
            self.pos += digits;
            return Ok(Predicate::Position(n));
        }
        if self.eat("last()") {
            return Ok(Predicate::Last);
        }

        let operand = self.operand()?;
        self.skip_ws();
        let negate = if self.eat("!=") {
            true
        } else if self.eat("=") {
            false
        } else {
            return Ok(Predicate::Exists(operand));
        };
        self.skip_ws();
        let value = self.literal()?;
        Ok(Predicate::Compare {
            operand,
            negate,
            value,
        })
    }

    fn operand(&mut self) -> Result<Operand, XPathError> {
        self.skip_ws();
        if self.eat("normalize-space(") {
            self.skip_ws();
            let inner = if self.rest().starts_with(')') {
                Operand::Path(XPath {
                    expr: ".".to_string(),
                    absolute: false,
                    steps: vec![Step {
                        axis: Axis::SelfNode,
                        test: NodeTest::Any,
                        predicates: Vec::new(),
                    }],
                })
            } else {
                self.operand()?
            };
            self.skip_ws();
            if !self.eat(")") {
                return Err(self.error("expected ')'"));
            }
            return Ok(Operand::NormalizeSpace(Box::new(inner)));
        }
        if self.eat("@") {
            return Ok(Operand::Attr(self.name()?));
        }
        if self.eat("text()") {
            return Ok(Operand::Text);
        }
        Ok(Operand::Path(self.path(false)?))
    }

    fn literal(&mut self) -> Result<String, XPathError> {
        let quote = match self.rest().chars().next() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(self.error("expected quoted literal")),
        };
        self.pos += 1;
        let end = self
            .rest()
            .find(quote)
            .ok_or_else(|| self.error("unterminated literal"))?;
        let value = self.rest()[..end].to_string();
        self.pos += end + 1;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
<configuration>
  <security>
    <nat>
      <proxy-arp>
        <interface>
          <name>ge-0/0/1.124</name>
          <address><name>198.18.11.5/32</name></address>
          <address><name>198.18.11.6/32</name></address>
        </interface>
        <interface inactive="inactive">
          <name> ge-0/0/2.0 </name>
          <address><name>10.0.0.1/32</name></address>
        </interface>
      </proxy-arp>
    </nat>
  </security>
</configuration>"#;

    fn names(elements: &[Element]) -> Vec<String> {
        elements
            .iter()
            .map(|e| e.child("name").map(|n| n.text().trim().to_string()).unwrap_or_default())
            .collect()
    }

    fn doc() -> Document {
        Document::parse(CONFIG).expect("parse config")
    }

    #[test]
    fn relative_paths_start_at_root_element() {
        let path = XPath::parse("security/nat/proxy-arp/interface").expect("compile");
        assert_eq!(names(&doc().xpath(&path)), vec!["ge-0/0/1.124", "ge-0/0/2.0"]);
    }

    #[test]
    fn absolute_and_descendant_paths() {
        let doc = doc();
        let abs = XPath::parse("/configuration/security").expect("compile");
        assert_eq!(doc.xpath(&abs).len(), 1);

        let all = XPath::parse("//address").expect("compile");
        assert_eq!(
            names(&doc.xpath(&all)),
            vec!["198.18.11.5/32", "198.18.11.6/32", "10.0.0.1/32"]
        );

        let nested = XPath::parse("security//interface/address").expect("compile");
        assert_eq!(doc.xpath(&nested).len(), 3);
    }

    #[test]
    fn nested_descendant_matches_keep_document_order() {
        let doc = Document::parse(
            "<r><unit><name>1</name><unit><name>2</name></unit></unit><unit><name>3</name></unit></r>",
        )
        .expect("parse");
        let units = XPath::parse("//unit").expect("compile");
        assert_eq!(names(&doc.xpath(&units)), vec!["1", "2", "3"]);

        // positions still count per parent before ordering
        let first = XPath::parse("//unit[1]").expect("compile");
        assert_eq!(names(&doc.xpath(&first)), vec!["1", "2"]);
    }

    #[test]
    fn positional_predicates_count_per_parent() {
        let doc = doc();
        let first = XPath::parse("//interface/address[1]").expect("compile");
        assert_eq!(names(&doc.xpath(&first)), vec!["198.18.11.5/32", "10.0.0.1/32"]);

        let last = XPath::parse("//interface[last()]").expect("compile");
        assert_eq!(names(&doc.xpath(&last)), vec!["ge-0/0/2.0"]);
    }

    #[test]
    fn comparison_predicates() {
        let doc = doc();
        let exact = XPath::parse("//interface[name='ge-0/0/1.124']").expect("compile");
        assert_eq!(doc.xpath(&exact).len(), 1);

        // raw comparison sees the padding, normalize-space does not
        let padded = XPath::parse("//interface[name='ge-0/0/2.0']").expect("compile");
        assert!(doc.xpath(&padded).is_empty());
        let normalized =
            XPath::parse(r#"//interface[normalize-space(name)="ge-0/0/2.0"]"#).expect("compile");
        assert_eq!(doc.xpath(&normalized).len(), 1);

        let attr = XPath::parse("//interface[@inactive]").expect("compile");
        assert_eq!(names(&doc.xpath(&attr)), vec!["ge-0/0/2.0"]);

        let not = XPath::parse("//address[name != '10.0.0.1/32']").expect("compile");
        assert_eq!(doc.xpath(&not).len(), 2);
    }

    #[test]
    fn with_predicate_narrows_last_step() {
        let base = XPath::parse("security/nat/proxy-arp/interface").expect("compile");
        let key = XPath::parse("name").expect("compile");
        let narrowed = base.with_predicate(Predicate::field_equals(&key, "ge-0/0/2.0"));

        assert_eq!(
            narrowed.as_str(),
            r#"security/nat/proxy-arp/interface[normalize-space(name)="ge-0/0/2.0"]"#
        );
        assert_eq!(names(&doc().xpath(&narrowed)), vec!["ge-0/0/2.0"]);
        // rendering is parseable again
        assert_eq!(
            XPath::parse(narrowed.as_str()).expect("reparse").select(&doc()).len(),
            1
        );
    }

    #[test]
    fn prefixes_are_ignored() {
        let path = XPath::parse("junos:security/nat").expect("compile");
        assert_eq!(doc().xpath(&path).len(), 1);
    }

    #[test]
    fn invalid_expressions_are_rejected() {
        for expr in ["", "/", "a/", "a[", "a[0]", "a[name=x]", "../a", "a]", "9a", "a[/b]"] {
            let err = XPath::parse(expr).expect_err(expr);
            assert_eq!(err.expr, expr);
        }
    }
}
