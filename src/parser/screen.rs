//! Removes designer-only content from a scanned token vector.

use std::collections::HashSet;

use crate::parser::{Token, XAML_NS, qualify};

pub const MARKUP_COMPATIBILITY_NS: &str =
    "http://schemas.openxmlformats.org/markup-compatibility/2006";

const PRESENTATION_NS: [&str; 3] = [
    "http://schemas.microsoft.com/netfx/2009/xaml/activities/presentation",
    "http://schemas.microsoft.com/netfx/2010/xaml/activities/presentation",
    "http://schemas.microsoft.com/netfx/2010/xaml/activities/debugger",
];

const VISUAL_BASIC_NS: &str =
    "clr-namespace:Microsoft.VisualBasic.Activities;assembly=System.Activities";

/// Drops view state, designer namespaces, variable and member declarations
/// and Visual Basic settings. Dropped elements take their whole subtree.
#[must_use]
pub fn screen(tokens: Vec<Token>) -> Vec<Token> {
    let mut ignorable: HashSet<String> = PRESENTATION_NS
        .iter()
        .chain([&MARKUP_COMPATIBILITY_NS, &VISUAL_BASIC_NS])
        .map(|ns| (*ns).to_string())
        .collect();
    let ignorable_key = qualify(MARKUP_COMPATIBILITY_NS, "Ignorable");
    if let Some(declared) = tokens.first().and_then(|t| t.attribute(&ignorable_key)) {
        ignorable.extend(declared.split_whitespace().map(str::to_string));
    }

    let before = tokens.len();
    let mut screened = Vec::with_capacity(before);
    let mut depth = 0usize;

    for mut token in tokens {
        if depth > 0 {
            if token.is_closing() {
                depth -= 1;
            } else {
                depth += 1;
            }
            continue;
        }
        if !token.is_closing() && drops_element(&token, &ignorable) {
            log::debug!("screening out '{}'", token.qname());
            depth = 1;
            continue;
        }

        token.retain_attributes(|key| !drops_attribute(key, &ignorable));
        screened.push(token);
    }

    log::debug!("screened {} of {before} tokens", before - screened.len());
    screened
}

fn drops_element(token: &Token, ignorable: &HashSet<String>) -> bool {
    let local = token.local_name();
    ignorable.contains(token.namespace())
        || token.qname() == qualify(XAML_NS, "Members")
        || local.ends_with(".Variables")
        || local.starts_with("TextExpression.")
        || local == "VisualBasic.Settings"
}

fn drops_attribute(key: &str, ignorable: &HashSet<String>) -> bool {
    key.strip_prefix('{')
        .and_then(|rest| rest.split_once('}'))
        .is_some_and(|(namespace, _)| ignorable.contains(namespace))
}
