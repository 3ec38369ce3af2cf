use quick_xml::events::Event;
use quick_xml::Reader;

use super::error::RegistryError;

/// Minimal element tree for registry responses.
#[derive(Debug, Clone, Default)]
pub struct Element {
    pub name: String,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    /// Text of a direct child, if the child exists.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.children
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.text.as_str())
    }

    /// All descendants (excluding `self`) in document order.
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        let mut stack: Vec<&Element> = self.children.iter().rev().collect();
        while let Some(el) = stack.pop() {
            out.push(el);
            stack.extend(el.children.iter().rev());
        }
        out
    }

    /// Descendants with the given tag name, in document order.
    pub fn find_all(&self, name: &str) -> Vec<&Element> {
        self.descendants()
            .into_iter()
            .filter(|el| el.name == name)
            .collect()
    }

    /// First element reached by `path`, where `path[0]` may sit at any depth
    /// and each following segment is a direct child of the previous one.
    pub fn find_path(&self, path: &[&str]) -> Option<&Element> {
        let (first, rest) = path.split_first()?;
        self.find_all(first)
            .into_iter()
            .find_map(|start| follow(start, rest))
    }

    pub fn find_text(&self, path: &[&str]) -> Option<&str> {
        self.find_path(path).map(|el| el.text.as_str())
    }
}

fn follow<'a>(el: &'a Element, path: &[&str]) -> Option<&'a Element> {
    match path.split_first() {
        None => Some(el),
        Some((next, rest)) => el
            .children
            .iter()
            .filter(|c| c.name == *next)
            .find_map(|c| follow(c, rest)),
    }
}

/// Parse a document and return its root element.
pub fn parse(xml: &str) -> Result<Element, RegistryError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => stack.push(Element {
                name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                ..Default::default()
            }),
            Event::Empty(e) => {
                let el = Element {
                    name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                    ..Default::default()
                };
                attach(&mut stack, &mut root, el)?;
            }
            Event::Text(e) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::End(_) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| RegistryError::Malformed("unbalanced closing tag".into()))?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(RegistryError::Malformed("unexpected end of document".into()));
    }
    root.ok_or_else(|| RegistryError::Malformed("no root element".into()))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    el: Element,
) -> Result<(), RegistryError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(el),
        None if root.is_none() => *root = Some(el),
        None => return Err(RegistryError::Malformed("multiple root elements".into())),
    }
    Ok(())
}
