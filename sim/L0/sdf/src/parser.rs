//! SDF XML to raw element tree.
//!
//! This is a shape-only adapter: it records tags, attributes and text and
//! reads the document's `version` attribute. Interpretation happens in the
//! version normalizer.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{Result, SdfError};

/// An uninterpreted XML element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawElement {
    /// Tag name.
    pub tag: String,
    /// Attributes in document order.
    pub attributes: Vec<(String, String)>,
    /// Concatenated text content.
    pub text: String,
    /// Child elements in document order.
    pub children: Vec<RawElement>,
}

impl RawElement {
    /// Create an element with the given tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    /// Add an attribute.
    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Set the text content.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Add a child element.
    #[must_use]
    pub fn with_child(mut self, child: RawElement) -> Self {
        self.children.push(child);
        self
    }

    /// Value of an attribute.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First child with the given tag.
    pub fn child(&self, tag: &str) -> Option<&RawElement> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// Trimmed text of the first child with the given tag.
    pub fn child_text(&self, tag: &str) -> Option<&str> {
        self.child(tag).map(|c| c.text.trim())
    }

    /// All children with the given tag.
    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a RawElement> {
        self.children.iter().filter(move |c| c.tag == tag)
    }
}

/// A parsed document: its declared version and the `<sdf>` root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    /// The `version` attribute of the root.
    pub version: String,
    /// The `<sdf>` element.
    pub root: RawElement,
}

/// Parse an SDF string into a raw document.
///
/// # Errors
///
/// Returns an error if the XML is malformed, the root is not `<sdf>`, or the
/// root has no `version` attribute.
pub fn parse_sdf_str(xml: &str) -> Result<RawDocument> {
    let root = parse_xml_tree(xml)?;
    if root.tag != "sdf" {
        return Err(SdfError::missing_element("sdf", "document root"));
    }
    let version = root
        .attr("version")
        .ok_or_else(|| SdfError::missing_attribute("version", "sdf"))?
        .trim()
        .to_string();
    Ok(RawDocument { version, root })
}

/// Parse any XML string into a raw element tree rooted at its first element.
pub fn parse_xml_tree(xml: &str) -> Result<RawElement> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<RawElement> = Vec::new();
    let mut root: Option<RawElement> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                stack.push(element_from_start(e)?);
            }
            Ok(Event::Empty(ref e)) => {
                let element = element_from_start(e)?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| SdfError::XmlParse("unbalanced closing tag".into()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(ref t)) => {
                if let Some(top) = stack.last_mut() {
                    let text = t
                        .unescape()
                        .map_err(|e| SdfError::XmlParse(e.to_string()))?;
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(ref c)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(c));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(SdfError::XmlParse(e.to_string())),
        }
    }

    if !stack.is_empty() {
        return Err(SdfError::XmlParse("unexpected EOF".into()));
    }
    root.ok_or_else(|| SdfError::XmlParse("document has no root element".into()))
}

/// Hand a finished element to its parent, or make it the root.
fn attach(
    stack: &mut [RawElement],
    root: &mut Option<RawElement>,
    element: RawElement,
) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        Ok(())
    } else if root.is_none() {
        *root = Some(element);
        Ok(())
    } else {
        Err(SdfError::XmlParse("multiple root elements".into()))
    }
}

fn element_from_start(e: &BytesStart) -> Result<RawElement> {
    let mut element = RawElement::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes() {
        let attr = attr.map_err(|err| SdfError::XmlParse(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| SdfError::XmlParse(err.to_string()))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}
