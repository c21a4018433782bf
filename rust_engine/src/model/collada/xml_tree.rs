//! Minimal element tree over the xml-rs event stream

use std::io::Read;
use std::str::FromStr;

use xml::reader::{EventReader, XmlEvent};

use crate::{EngineError, Result};

#[derive(Clone, Debug, Default)]
pub(crate) struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    /// Read a whole document and return its root element
    pub fn parse<R: Read>(source: R) -> Result<Element> {
        let reader = EventReader::new(source);
        let mut stack: Vec<Element> = Vec::new();
        let mut root = None;

        for event in reader {
            match event? {
                XmlEvent::StartElement { name, attributes, .. } => {
                    stack.push(Element {
                        name: name.local_name,
                        attributes: attributes
                            .into_iter()
                            .map(|a| (a.name.local_name, a.value))
                            .collect(),
                        ..Element::default()
                    });
                }
                XmlEvent::EndElement { .. } => {
                    let Some(done) = stack.pop() else {
                        return Err(EngineError::Collada("unbalanced end element".into()));
                    };
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(done),
                        None => root = Some(done),
                    }
                }
                XmlEvent::Characters(text) | XmlEvent::CData(text) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text);
                    }
                }
                _ => {}
            }
        }

        root.ok_or_else(|| EngineError::Collada("document has no root element".into()))
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// First element with this name anywhere below, depth first
    pub fn find(&self, name: &str) -> Option<&Element> {
        for child in &self.children {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.find(name) {
                return Some(found);
            }
        }
        None
    }

    /// Whitespace separated values of the text content
    pub fn values<T: FromStr>(&self) -> Result<Vec<T>> {
        self.text
            .split_whitespace()
            .map(|token| {
                token.parse::<T>().map_err(|_| {
                    EngineError::Collada(format!("bad value '{}' in <{}>", token, self.name))
                })
            })
            .collect()
    }

    pub fn words(&self) -> Vec<String> {
        self.text.split_whitespace().map(str::to_owned).collect()
    }
}

/// Strip the leading '#' of a local URL
pub(crate) fn local_ref(url: &str) -> &str {
    url.strip_prefix('#').unwrap_or(url)
}
