//! Minimal element tree over quick-xml.
//!
//! Documents are small (a few thousand elements), so they are read into an
//! owned tree and written back from one. Attribute order is preserved.

use indexmap::IndexMap;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::entities::Properties;
use crate::error::{TimelineError, TimelineResult};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub name: String,
    pub attrs: IndexMap<String, String>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.attrs.insert(key.into(), value.to_string());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl ToString) {
        self.attrs.insert(key.into(), value.to_string());
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    pub fn attr_i32(&self, key: &str) -> Option<i32> {
        self.attr(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        self.attr(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(child);
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Depth-first search for every descendant named `name`.
    pub fn descendants_named<'a>(&'a self, name: &str, out: &mut Vec<&'a Element>) {
        for child in &self.children {
            if child.name == name {
                out.push(child);
            }
            child.descendants_named(name, out);
        }
    }

    /// `<property name="k">v</property>` children as a property map.
    pub fn properties(&self) -> Properties {
        self.children_named("property")
            .filter_map(|p| p.attr("name").map(|n| (n.to_string(), p.text.clone())))
            .collect()
    }

    /// Value of one `<property>` child.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.children_named("property")
            .find(|p| p.attr("name") == Some(name))
            .map(|p| p.text.as_str())
    }

    pub fn set_property(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .children
            .iter_mut()
            .find(|c| c.name == "property" && c.attr("name") == Some(name))
        {
            Some(existing) => existing.text = value,
            None => self.push(Element::new("property").with_attr("name", name).with_text(value)),
        }
    }

    pub fn remove_property(&mut self, name: &str) {
        self.children
            .retain(|c| !(c.name == "property" && c.attr("name") == Some(name)));
    }

    /// Append one `<property>` child per entry.
    pub fn push_properties(&mut self, props: &Properties) {
        for (name, value) in props.iter() {
            self.push(Element::new("property").with_attr("name", name).with_text(value));
        }
    }

    // ========================================================================
    // Reading
    // ========================================================================

    /// Parse a document and return its root element.
    pub fn parse(text: &str) -> TimelineResult<Element> {
        let mut reader = Reader::from_str(text);
        reader.trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| TimelineError::document(format!("at byte {}: {}", reader.buffer_position(), e)))?;
            match event {
                Event::Start(start) => stack.push(element_from(&start)?),
                Event::Empty(start) => {
                    let element = element_from(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| TimelineError::document("unbalanced closing tag"))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    let value = text.unescape().map_err(|e| TimelineError::document(e.to_string()))?;
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&value);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(TimelineError::document(format!("unclosed element <{}>", stack[stack.len() - 1].name)));
        }
        root.ok_or_else(|| TimelineError::document("empty document"))
    }

    // ========================================================================
    // Writing
    // ========================================================================

    /// Serialize with an XML declaration and one-space indentation.
    pub fn to_document(&self) -> TimelineResult<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 1);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(xml_err)?;
        self.write_into(&mut writer)?;
        String::from_utf8(writer.into_inner()).map_err(|e| TimelineError::document(e.to_string()))
    }

    fn write_into(&self, writer: &mut Writer<Vec<u8>>) -> TimelineResult<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attrs {
            start.push_attribute((key.as_str(), value.as_str()));
        }
        if self.children.is_empty() && self.text.is_empty() {
            return writer.write_event(Event::Empty(start)).map_err(xml_err);
        }
        writer.write_event(Event::Start(start)).map_err(xml_err)?;
        if !self.text.is_empty() {
            writer
                .write_event(Event::Text(BytesText::new(&self.text)))
                .map_err(xml_err)?;
        }
        for child in &self.children {
            child.write_into(writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(xml_err)
    }
}

fn xml_err(e: impl std::fmt::Display) -> TimelineError {
    TimelineError::document(e.to_string())
}

fn element_from(start: &BytesStart) -> TimelineResult<Element> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr.map_err(xml_err)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(xml_err)?;
        element.attrs.insert(key, value.into_owned());
    }
    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> TimelineResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.push(element),
        None => {
            if root.is_some() {
                return Err(TimelineError::document("more than one root element"));
            }
            *root = Some(element);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_properties() {
        let root = Element::parse(
            r#"<?xml version="1.0"?>
            <mlt profile="dv_pal">
              <producer id="c1" in="0" out="99">
                <property name="resource">/media/a &amp; b.mp4</property>
                <property name="length">100</property>
              </producer>
              <playlist id="p1"><blank length="10"/></playlist>
            </mlt>"#,
        )
        .expect("parse");
        assert_eq!(root.attr("profile"), Some("dv_pal"));
        let producer = root.child("producer").expect("producer");
        assert_eq!(producer.attr_i32("out"), Some(99));
        assert_eq!(producer.property("resource"), Some("/media/a & b.mp4"));
        assert_eq!(producer.properties().get_i32("length"), Some(100));
        let blank = root.child("playlist").and_then(|p| p.child("blank")).expect("blank");
        assert_eq!(blank.attr_i32("length"), Some(10));
    }

    #[test]
    fn test_write_then_parse_keeps_escapes() {
        let mut root = Element::new("mlt").with_attr("title", "a \"b\" <c>");
        let mut producer = Element::new("producer").with_attr("id", "c1");
        producer.set_property("kdenlive:clipname", "Tom & Jerry");
        producer.set_property("kdenlive:clipname", "Tom & Jerry <2>");
        root.push(producer);
        let text = root.to_document().expect("write");
        let back = Element::parse(&text).expect("parse");
        assert_eq!(back, root);
        assert_eq!(back.children[0].children.len(), 1);
    }

    #[test]
    fn test_malformed() {
        assert!(Element::parse("").is_err());
        assert!(Element::parse("<a><b></a>").is_err());
        assert!(Element::parse("<a/><b/>").is_err());
    }

    #[test]
    fn test_remove_property() {
        let mut e = Element::new("producer");
        e.set_property("a", "1");
        e.set_property("b", "2");
        e.remove_property("a");
        assert_eq!(e.properties().len(), 1);
        assert_eq!(e.property("b"), Some("2"));
    }
}
