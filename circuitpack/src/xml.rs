//! Minimal XML tree used for every structured part of a package.
//!
//! Only the subset needed by the document, relationship and content-type
//! parts is supported: elements, attributes, text, the XML declaration and
//! comments. Namespaces are kept as literal prefixed names.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("Unexpected end of input")]
    UnexpectedEof,
    #[error("Unexpected token at position {0}: {1}")]
    UnexpectedToken(usize, String),
    #[error("Mismatched closing tag: expected </{expected}>, found </{found}>")]
    MismatchedTag { expected: String, found: String },
    #[error("Unknown entity: &{0};")]
    UnknownEntity(String),
    #[error("Invalid UTF-8 in part: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(key, value);
        self
    }

    pub fn attr_opt(self, key: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.attr(key, v),
            None => self,
        }
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn child(mut self, element: XmlElement) -> Self {
        self.push(element);
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    pub fn push(&mut self, element: XmlElement) {
        self.children.push(XmlNode::Element(element));
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Child elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// First child element with the given name.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.name == name)
    }

    pub fn find_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.elements().filter(move |e| e.name == name)
    }

    /// Concatenated text of direct text children.
    pub fn text_content(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                XmlNode::Text(t) => Some(t.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// Serialize as a standalone document, including the XML declaration.
    pub fn to_document_string(&self) -> String {
        format!("<?xml version=\"1.0\" encoding=\"utf-8\"?>{}", self)
    }

    pub fn to_document_bytes(&self) -> Vec<u8> {
        self.to_document_string().into_bytes()
    }
}

impl fmt::Display for XmlElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.name)?;
        for (k, v) in &self.attributes {
            write!(f, " {}=\"{}\"", k, escape(v, true))?;
        }
        if self.children.is_empty() {
            return write!(f, " />");
        }
        write!(f, ">")?;
        for child in &self.children {
            match child {
                XmlNode::Element(e) => write!(f, "{}", e)?,
                XmlNode::Text(t) => write!(f, "{}", escape(t, false))?,
            }
        }
        write!(f, "</{}>", self.name)
    }
}

fn escape(s: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Parse a byte buffer holding an XML document.
pub fn parse_document(bytes: &[u8]) -> Result<XmlElement, XmlError> {
    let text = String::from_utf8(bytes.to_vec())?;
    XmlParser::new(&text).parse()
}

pub struct XmlParser {
    input: Vec<char>,
    pos: usize,
}

impl XmlParser {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
        }
    }

    /// Parse the root element, skipping the prolog.
    pub fn parse(&mut self) -> Result<XmlElement, XmlError> {
        self.skip_misc()?;
        if self.is_eof() {
            return Err(XmlError::UnexpectedEof);
        }
        let root = self.parse_element()?;
        self.skip_misc()?;
        if !self.is_eof() {
            return Err(self.unexpected("content after root element"));
        }
        Ok(root)
    }

    /// Skip whitespace, declarations and comments.
    fn skip_misc(&mut self) -> Result<(), XmlError> {
        loop {
            self.skip_whitespace();
            if self.starts_with("<?") {
                self.skip_past("?>")?;
            } else if self.starts_with("<!--") {
                self.skip_past("-->")?;
            } else {
                return Ok(());
            }
        }
    }

    fn parse_element(&mut self) -> Result<XmlElement, XmlError> {
        self.expect_char('<')?;
        let name = self.parse_name()?;
        let mut element = XmlElement::new(name);

        loop {
            self.skip_whitespace();
            if self.is_eof() {
                return Err(XmlError::UnexpectedEof);
            }
            match self.peek() {
                '/' => {
                    self.advance();
                    self.expect_char('>')?;
                    return Ok(element);
                }
                '>' => {
                    self.advance();
                    break;
                }
                _ => {
                    let key = self.parse_name()?;
                    self.skip_whitespace();
                    self.expect_char('=')?;
                    self.skip_whitespace();
                    let value = self.parse_quoted()?;
                    element.attributes.push((key, value));
                }
            }
        }

        self.parse_content(&mut element)?;
        Ok(element)
    }

    fn parse_content(&mut self, element: &mut XmlElement) -> Result<(), XmlError> {
        let mut text = String::new();
        loop {
            if self.is_eof() {
                return Err(XmlError::UnexpectedEof);
            }
            if self.starts_with("<!--") {
                self.skip_past("-->")?;
            } else if self.starts_with("</") {
                self.pos += 2;
                let found = self.parse_name()?;
                self.skip_whitespace();
                self.expect_char('>')?;
                if found != element.name {
                    return Err(XmlError::MismatchedTag {
                        expected: element.name.clone(),
                        found,
                    });
                }
                Self::flush_text(element, &mut text);
                return Ok(());
            } else if self.peek() == '<' {
                Self::flush_text(element, &mut text);
                let child = self.parse_element()?;
                element.push(child);
            } else if self.peek() == '&' {
                text.push(self.parse_entity()?);
            } else {
                text.push(self.peek());
                self.advance();
            }
        }
    }

    /// Whitespace-only runs between elements are dropped.
    fn flush_text(element: &mut XmlElement, text: &mut String) {
        if !text.trim().is_empty() {
            element.children.push(XmlNode::Text(std::mem::take(text)));
        }
        text.clear();
    }

    fn parse_name(&mut self) -> Result<String, XmlError> {
        let mut s = String::new();
        while !self.is_eof() {
            let ch = self.peek();
            if ch.is_alphanumeric() || matches!(ch, ':' | '_' | '-' | '.') {
                s.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        if s.is_empty() {
            Err(self.unexpected("expected a name"))
        } else {
            Ok(s)
        }
    }

    fn parse_quoted(&mut self) -> Result<String, XmlError> {
        if self.is_eof() {
            return Err(XmlError::UnexpectedEof);
        }
        let quote = self.peek();
        if quote != '"' && quote != '\'' {
            return Err(self.unexpected("expected a quoted value"));
        }
        self.advance();
        let mut s = String::new();
        loop {
            if self.is_eof() {
                return Err(XmlError::UnexpectedEof);
            }
            let ch = self.peek();
            if ch == quote {
                self.advance();
                return Ok(s);
            } else if ch == '&' {
                s.push(self.parse_entity()?);
            } else {
                s.push(ch);
                self.advance();
            }
        }
    }

    fn parse_entity(&mut self) -> Result<char, XmlError> {
        self.expect_char('&')?;
        let mut name = String::new();
        while !self.is_eof() && self.peek() != ';' {
            name.push(self.peek());
            self.advance();
        }
        self.expect_char(';')?;
        let named = match name.as_str() {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => None,
        };
        if let Some(ch) = named {
            return Ok(ch);
        }
        let code = if let Some(hex) = name.strip_prefix("#x") {
            u32::from_str_radix(hex, 16).ok()
        } else if let Some(dec) = name.strip_prefix('#') {
            dec.parse::<u32>().ok()
        } else {
            None
        };
        code.and_then(char::from_u32)
            .ok_or(XmlError::UnknownEntity(name))
    }

    fn skip_past(&mut self, terminator: &str) -> Result<(), XmlError> {
        while !self.is_eof() {
            if self.starts_with(terminator) {
                self.pos += terminator.chars().count();
                return Ok(());
            }
            self.advance();
        }
        Err(XmlError::UnexpectedEof)
    }

    fn starts_with(&self, s: &str) -> bool {
        let mut i = self.pos;
        for ch in s.chars() {
            if i >= self.input.len() || self.input[i] != ch {
                return false;
            }
            i += 1;
        }
        true
    }

    fn skip_whitespace(&mut self) {
        while !self.is_eof() && self.peek().is_whitespace() {
            self.advance();
        }
    }

    fn peek(&self) -> char {
        if self.pos < self.input.len() {
            self.input[self.pos]
        } else {
            '\0'
        }
    }

    fn advance(&mut self) {
        if self.pos < self.input.len() {
            self.pos += 1;
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn unexpected(&self, message: &str) -> XmlError {
        XmlError::UnexpectedToken(self.pos, message.to_string())
    }

    fn expect_char(&mut self, expected: char) -> Result<(), XmlError> {
        if self.is_eof() {
            return Err(XmlError::UnexpectedEof);
        }

        let ch = self.peek();
        if ch == expected {
            self.advance();
            Ok(())
        } else {
            Err(XmlError::UnexpectedToken(
                self.pos,
                format!("Expected '{}', found '{}'", expected, ch),
            ))
        }
    }
}
