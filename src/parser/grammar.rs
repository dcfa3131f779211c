use std::collections::HashMap;

use pest::Parser;
use pest::iterators::{Pair, Pairs};
use pest_derive::Parser;

use crate::error::Error;
use crate::parser::screen::MARKUP_COMPATIBILITY_NS;
use crate::parser::{Token, XAML_NS, qualify};

#[derive(Parser)]
#[grammar = "../grammar/xaml.pest"]
struct XamlScanner;

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Reads a XAML document into start and end tokens, in document order.
///
/// Self-closing elements yield both tokens. Text content is attached to
/// the start token as an attribute named after the element, so
/// `<x:Reference>id</x:Reference>` carries `Reference="id"`.
pub fn scan(input: &str) -> Result<Vec<Token>, Error> {
    let document = XamlScanner::parse(Rule::Document, input)
        .map_err(|e| Error::ScanError(e.to_string()))?
        .next()
        .ok_or_else(|| Error::ScanError("empty document".to_string()))?;

    let mut scanner = Scanner::default();
    for pair in document.into_inner() {
        if pair.as_rule() == Rule::Element {
            scanner.element(pair)?;
        }
    }

    log::debug!("scanned {} tokens", scanner.tokens.len());
    Ok(scanner.tokens)
}

#[derive(Default)]
struct Scanner {
    tokens: Vec<Token>,
    scopes: Vec<HashMap<String, String>>,
}

impl Scanner {
    fn element(&mut self, pair: Pair<'_, Rule>) -> Result<(), Error> {
        let mut inner = pair.into_inner();
        let Some(tag) = inner.next() else {
            return Ok(());
        };
        let (name, attributes) = split_tag(tag)?;

        let mut declarations = HashMap::new();
        let mut plain = Vec::new();
        for (key, value) in attributes {
            if key == "xmlns" {
                declarations.insert(String::new(), value);
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                declarations.insert(prefix.to_string(), value);
            } else {
                plain.push((key, value));
            }
        }

        self.scopes.push(declarations);
        let result = self.element_body(name, plain, inner);
        self.scopes.pop();
        result
    }

    fn element_body(
        &mut self,
        name: &str,
        attributes: Vec<(&str, String)>,
        rest: Pairs<'_, Rule>,
    ) -> Result<(), Error> {
        let (namespace, local) = self.resolve(name)?;
        let ignorable = qualify(MARKUP_COMPATIBILITY_NS, "Ignorable");

        let mut start = Token::start(namespace.clone(), local.clone());
        for (key, value) in attributes {
            let key = self.attribute_key(key)?;
            let value = if key == ignorable {
                self.ignorable_namespaces(&value)
            } else {
                value
            };
            start.set_attribute(key, value);
        }
        let index = self.tokens.len();
        self.tokens.push(start);

        let mut text = String::new();
        for pair in rest {
            match pair.as_rule() {
                Rule::Element => self.element(pair)?,
                Rule::Text => text.push_str(&decode(pair.as_str())?),
                Rule::CData => {
                    if let Some(data) = pair.into_inner().next() {
                        text.push_str(data.as_str());
                    }
                }
                Rule::EndTag => {
                    let end = pair.into_inner().next().map_or("", |n| n.as_str());
                    if end != name {
                        return Err(Error::ScanError(format!(
                            "end tag '{end}' does not match '{name}'"
                        )));
                    }
                }
                _ => {}
            }
        }

        let text = text.trim();
        if !text.is_empty() {
            self.tokens[index].set_attribute(local.clone(), text);
        }
        self.tokens.push(Token::end(namespace, local));
        Ok(())
    }

    fn lookup(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NS);
        }
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(prefix))
            .map(String::as_str)
    }

    fn resolve(&self, name: &str) -> Result<(String, String), Error> {
        match name.split_once(':') {
            Some((prefix, local)) => {
                let namespace = self.lookup(prefix).ok_or_else(|| {
                    Error::ScanError(format!("undeclared namespace prefix '{prefix}'"))
                })?;
                Ok((namespace.to_string(), local.to_string()))
            }
            None => Ok((
                self.lookup("").unwrap_or_default().to_string(),
                name.to_string(),
            )),
        }
    }

    fn attribute_key(&self, key: &str) -> Result<String, Error> {
        let Some((prefix, local)) = key.split_once(':') else {
            return Ok(key.to_string());
        };
        let namespace = self.lookup(prefix).ok_or_else(|| {
            Error::ScanError(format!("undeclared namespace prefix '{prefix}'"))
        })?;
        if namespace == XAML_NS {
            Ok(format!("x:{local}"))
        } else {
            Ok(qualify(namespace, local))
        }
    }

    fn ignorable_namespaces(&self, prefixes: &str) -> String {
        prefixes
            .split_whitespace()
            .map(|prefix| self.lookup(prefix).unwrap_or(prefix))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn split_tag(tag: Pair<'_, Rule>) -> Result<(&str, Vec<(&str, String)>), Error> {
    let mut inner = tag.into_inner();
    let name = inner.next().map_or("", |n| n.as_str());

    let mut attributes = vec![];
    for attribute in inner {
        let mut parts = attribute.into_inner();
        let key = parts.next().map_or("", |k| k.as_str());
        let value = parts.next().map_or("", |v| v.as_str());
        attributes.push((key, decode(value)?));
    }
    Ok((name, attributes))
}

fn decode(raw: &str) -> Result<String, Error> {
    let mut decoded = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(amp) = rest.find('&') {
        decoded.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let end = rest
            .find(';')
            .ok_or_else(|| Error::ScanError(format!("unterminated entity in '{raw}'")))?;
        let entity = &rest[1..end];
        let ch = match entity {
            "lt" => '<',
            "gt" => '>',
            "amp" => '&',
            "quot" => '"',
            "apos" => '\'',
            _ => character_reference(entity)
                .ok_or_else(|| Error::ScanError(format!("unknown entity '&{entity};'")))?,
        };
        decoded.push(ch);
        rest = &rest[end + 1..];
    }

    decoded.push_str(rest);
    Ok(decoded)
}

fn character_reference(entity: &str) -> Option<char> {
    let code = if let Some(hex) = entity
        .strip_prefix("#x")
        .or_else(|| entity.strip_prefix("#X"))
    {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        entity.strip_prefix('#')?.parse().ok()?
    };
    char::from_u32(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ACTIVITIES_NS;

    const HEADER: &str = r#"xmlns="http://schemas.microsoft.com/netfx/2009/xaml/activities" xmlns:x="http://schemas.microsoft.com/winfx/2006/xaml""#;

    #[test]
    fn test_scan_nested_elements() {
        let input = format!(
            r#"<?xml version="1.0"?>
<!-- a workflow -->
<Activity {HEADER}>
  <Sequence x:Name="main" DisplayName="Main">
    <Delay />
  </Sequence>
</Activity>"#
        );
        let tokens = scan(&input).unwrap();
        let names: Vec<_> = tokens
            .iter()
            .map(|t| (t.local_name().to_string(), t.is_closing()))
            .collect();
        assert_eq!(
            names,
            [
                ("Activity".to_string(), false),
                ("Sequence".to_string(), false),
                ("Delay".to_string(), false),
                ("Delay".to_string(), true),
                ("Sequence".to_string(), true),
                ("Activity".to_string(), true),
            ]
        );
        assert_eq!(tokens[1].namespace(), ACTIVITIES_NS);
        assert_eq!(tokens[1].attribute("x:Name"), Some("main"));
        assert_eq!(tokens[1].attribute("DisplayName"), Some("Main"));
        assert!(tokens[0].attribute("xmlns").is_none());
    }

    #[test]
    fn test_scan_text_becomes_attribute() {
        let input =
            format!(r#"<Activity {HEADER}><x:Reference>__ReferenceID0</x:Reference></Activity>"#);
        let tokens = scan(&input).unwrap();
        assert_eq!(tokens[1].qname(), qualify(XAML_NS, "Reference"));
        assert_eq!(tokens[1].attribute("Reference"), Some("__ReferenceID0"));
    }

    #[test]
    fn test_scan_entities() {
        let input = format!(r#"<Activity {HEADER} Condition="[a &lt; b &amp;&amp; c &#x3E; 0]"/>"#);
        let tokens = scan(&input).unwrap();
        assert_eq!(tokens[0].attribute("Condition"), Some("[a < b && c > 0]"));
    }

    #[test]
    fn test_scan_prefixed_attribute() {
        let input = format!(
            r#"<Activity {HEADER} xmlns:sap="urn:presentation" sap:HintSize="200,100"/>"#
        );
        let tokens = scan(&input).unwrap();
        assert_eq!(tokens[0].attribute("{urn:presentation}HintSize"), Some("200,100"));
    }

    #[test]
    fn test_scan_ignorable_prefixes_resolved() {
        let input = format!(
            r#"<Activity {HEADER} xmlns:mc="{MARKUP_COMPATIBILITY_NS}" xmlns:sap="urn:presentation" mc:Ignorable="sap"/>"#
        );
        let tokens = scan(&input).unwrap();
        let key = qualify(MARKUP_COMPATIBILITY_NS, "Ignorable");
        assert_eq!(tokens[0].attribute(&key), Some("urn:presentation"));
    }

    #[test]
    fn test_scan_errors() {
        assert!(matches!(scan("<a><b></a>"), Err(Error::ScanError(_))));
        assert!(matches!(scan("<p:a/>"), Err(Error::ScanError(_))));
        assert!(matches!(scan("not xml"), Err(Error::ScanError(_))));
    }
}
