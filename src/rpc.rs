//! RPC arguments and requests.
//!
//! Arguments follow the Junos convention: names are written with
//! underscores in code (`interface_name`) and become dashed XML elements
//! (`<interface-name>`); a `true` flag becomes an empty element
//! (`<terse/>`) and a `false` flag is left out.

use indexmap::IndexMap;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::XmlError;
use crate::xml::write_err;

/// One RPC argument value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum RpcArg {
    Flag(bool),
    Number(i64),
    Text(String),
}

impl From<bool> for RpcArg {
    fn from(value: bool) -> Self {
        RpcArg::Flag(value)
    }
}

impl From<i64> for RpcArg {
    fn from(value: i64) -> Self {
        RpcArg::Number(value)
    }
}

impl From<&str> for RpcArg {
    fn from(value: &str) -> Self {
        RpcArg::Text(value.to_string())
    }
}

impl From<String> for RpcArg {
    fn from(value: String) -> Self {
        RpcArg::Text(value)
    }
}

/// Ordered argument set for one RPC.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RpcArgs(IndexMap<String, RpcArg>);

impl RpcArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<RpcArg>) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts or replaces an argument. A replaced argument keeps its slot.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<RpcArg>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&RpcArg> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RpcArg)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy of `self` with every argument in `overrides` applied on top.
    pub fn merged(&self, overrides: &RpcArgs) -> RpcArgs {
        let mut merged = self.clone();
        for (name, value) in overrides.iter() {
            merged.insert(name, value.clone());
        }
        merged
    }
}

impl<K, V> FromIterator<(K, V)> for RpcArgs
where
    K: Into<String>,
    V: Into<RpcArg>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut args = RpcArgs::new();
        for (name, value) in iter {
            args.insert(name, value);
        }
        args
    }
}

/// A remote operation name plus its final arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RpcRequest {
    pub rpc: String,
    #[serde(default)]
    pub args: RpcArgs,
}

impl RpcRequest {
    pub fn new(rpc: impl Into<String>, args: RpcArgs) -> Self {
        Self {
            rpc: rpc.into(),
            args,
        }
    }

    /// XML element name of the operation (`get_route_information` ->
    /// `get-route-information`).
    pub fn tag(&self) -> String {
        xml_name(&self.rpc)
    }

    /// Renders the RPC payload element.
    pub fn to_xml(&self) -> Result<String, XmlError> {
        let tag = self.tag();
        let mut writer = Writer::new(Vec::new());
        if self.args.iter().all(|(_, v)| *v == RpcArg::Flag(false)) {
            writer
                .write_event(Event::Empty(BytesStart::new(tag.as_str())))
                .map_err(write_err)?;
        } else {
            writer
                .write_event(Event::Start(BytesStart::new(tag.as_str())))
                .map_err(write_err)?;
            for (name, value) in self.args.iter() {
                let arg = xml_name(name);
                match value {
                    RpcArg::Flag(false) => {}
                    RpcArg::Flag(true) => writer
                        .write_event(Event::Empty(BytesStart::new(arg.as_str())))
                        .map_err(write_err)?,
                    RpcArg::Number(n) => write_text(&mut writer, &arg, &n.to_string())?,
                    RpcArg::Text(text) => write_text(&mut writer, &arg, text)?,
                }
            }
            writer
                .write_event(Event::End(BytesEnd::new(tag.as_str())))
                .map_err(write_err)?;
        }
        String::from_utf8(writer.into_inner()).map_err(write_err)
    }
}

fn xml_name(name: &str) -> String {
    name.replace('_', "-")
}

fn write_text(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<(), XmlError> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(write_err)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(write_err)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(write_err)?;
    Ok(())
}
