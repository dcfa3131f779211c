//! Token queue and the document-level grammar.
//!
//! The scanner in [`grammar`] turns markup into tokens, [`screen`] strips
//! designer-only content, and [`parse_document`] hands the single root
//! activity to the [`Registry`].

use std::collections::VecDeque;

use crate::activity::{Activity, Registry};
use crate::error::Error;

pub mod grammar;
pub mod items;
pub mod screen;

pub use items::{Token, qualify};

pub const ACTIVITIES_NS: &str = "http://schemas.microsoft.com/netfx/2009/xaml/activities";
pub const SERVICE_MODEL_NS: &str = "http://schemas.microsoft.com/netfx/2009/xaml/servicemodel";
pub const XAML_NS: &str = "http://schemas.microsoft.com/winfx/2006/xaml";

const ROOT: &str = "Root";

/// FIFO queue of tokens that remembers how many have been consumed.
#[derive(Debug, Default)]
pub struct TokenStream {
    tokens: VecDeque<Token>,
    consumed: usize,
}

impl From<Vec<Token>> for TokenStream {
    fn from(tokens: Vec<Token>) -> Self {
        Self {
            tokens: tokens.into(),
            consumed: 0,
        }
    }
}

impl TokenStream {
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Number of tokens dequeued so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.consumed
    }

    #[must_use]
    pub fn peek(&self) -> Option<&Token> {
        self.tokens.front()
    }

    /// The front token, which must be a start tag.
    pub fn peek_start(&self, activity: &str) -> Result<&Token, Error> {
        match self.tokens.front() {
            Some(token) if !token.is_closing() => Ok(token),
            Some(token) => Err(self.structural(
                format!("unexpected end tag '{}'", token.qname()),
                activity,
            )),
            None => Err(self.structural("unexpected end of input", activity)),
        }
    }

    pub fn next_token(&mut self, activity: &str) -> Result<Token, Error> {
        let token = self
            .tokens
            .pop_front()
            .ok_or_else(|| self.structural("unexpected end of input", activity))?;
        self.consumed += 1;
        Ok(token)
    }

    pub fn expect_start(&mut self, qname: &str, activity: &str) -> Result<Token, Error> {
        match self.tokens.front() {
            Some(token) if token.opens(qname) => self.next_token(activity),
            Some(token) => Err(self.structural(
                format!("expected '{qname}', found '{}'", describe(token)),
                activity,
            )),
            None => Err(self.structural(format!("expected '{qname}'"), activity)),
        }
    }

    pub fn expect_end(&mut self, qname: &str, activity: &str) -> Result<Token, Error> {
        match self.tokens.front() {
            Some(token) if token.closes(qname) => self.next_token(activity),
            Some(token) => Err(self.structural(
                format!("expected '/{qname}', found '{}'", describe(token)),
                activity,
            )),
            None => Err(self.structural(format!("expected '/{qname}'"), activity)),
        }
    }

    /// True when the front token opens `qname`.
    #[must_use]
    pub fn at_start_of(&self, qname: &str) -> bool {
        self.peek().is_some_and(|token| token.opens(qname))
    }

    /// True when the front token closes `qname`.
    #[must_use]
    pub fn at_end_of(&self, qname: &str) -> bool {
        self.peek().is_some_and(|token| token.closes(qname))
    }

    /// Consumes the element at the front with everything nested in it and
    /// returns its start tag.
    pub fn skip_element(&mut self, activity: &str) -> Result<Token, Error> {
        self.peek_start(activity)?;
        let start = self.next_token(activity)?;

        let mut depth = 1usize;
        while depth > 0 {
            let token = self.next_token(activity)?;
            if token.is_closing() {
                depth -= 1;
            } else {
                depth += 1;
            }
        }
        Ok(start)
    }

    pub fn structural(&self, message: impl Into<String>, activity: &str) -> Error {
        Error::Structural {
            message: message.into(),
            activity: activity.to_string(),
            position: self.consumed,
        }
    }
}

fn describe(token: &Token) -> String {
    if token.is_closing() {
        format!("/{}", token.qname())
    } else {
        token.qname().to_string()
    }
}

/// Parses a whole (screened) document into its root activity.
///
/// The document must be an `Activity` or a `WorkflowService` wrapping
/// exactly one activity.
pub fn parse_document(
    tokens: Vec<Token>,
    registry: &Registry,
) -> Result<Box<dyn Activity>, Error> {
    let mut stream = TokenStream::from(tokens);
    let root = stream.peek_start(ROOT)?;
    let root_qname = root.qname().to_string();
    if root_qname != qualify(ACTIVITIES_NS, "Activity")
        && root_qname != qualify(SERVICE_MODEL_NS, "WorkflowService")
    {
        return Err(stream.structural(format!("unknown root element '{root_qname}'"), ROOT));
    }
    stream.next_token(ROOT)?;

    let activity = registry.parse_child(&mut stream, ROOT)?;

    stream.expect_end(&root_qname, ROOT)?;
    if let Some(token) = stream.peek() {
        return Err(stream.structural(
            format!("unexpected '{}' after the root activity", describe(token)),
            ROOT,
        ));
    }
    Ok(activity)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity(local: &str) -> (Token, Token) {
        (
            Token::start(ACTIVITIES_NS, local),
            Token::end(ACTIVITIES_NS, local),
        )
    }

    #[test]
    fn test_skip_element_is_balanced() {
        let (a, a_end) = activity("Assign");
        let (to, to_end) = activity("Assign.To");
        let (d, d_end) = activity("Delay");
        let mut stream = TokenStream::from(vec![a, to, to_end, a_end, d, d_end]);

        let skipped = stream.skip_element("test").unwrap();
        assert_eq!(skipped.local_name(), "Assign");
        assert_eq!(stream.position(), 4);
        assert!(stream.at_start_of(&qualify(ACTIVITIES_NS, "Delay")));
    }

    #[test]
    fn test_expect_reports_position() {
        let (a, _) = activity("Assign");
        let mut stream = TokenStream::from(vec![a]);
        stream.next_token("test").unwrap();

        let Err(Error::Structural { position, .. }) = stream.expect_end("{x}Y", "test") else {
            panic!("expected a structural error");
        };
        assert_eq!(position, 1);
    }

    #[test]
    fn test_unknown_root() {
        let (seq, seq_end) = activity("Sequence");
        let result = parse_document(vec![seq, seq_end], &Registry::standard());
        assert!(matches!(result, Err(Error::Structural { .. })));
    }

    #[test]
    fn test_trailing_tokens() {
        let (root, root_end) = activity("Activity");
        let (d, d_end) = activity("Delay");
        let (extra, extra_end) = activity("Delay");
        let tokens = vec![root, d, d_end, root_end, extra, extra_end];
        let result = parse_document(tokens, &Registry::standard());
        assert!(matches!(result, Err(Error::Structural { .. })));
    }

    #[test]
    fn test_unregistered_activity() {
        let (root, root_end) = activity("Activity");
        let tokens = vec![
            root,
            Token::start("urn:custom", "Thing"),
            Token::end("urn:custom", "Thing"),
            root_end,
        ];
        let Err(Error::Resolution {
            qname, position, ..
        }) = parse_document(tokens, &Registry::standard())
        else {
            panic!("expected a resolution error");
        };
        assert_eq!(qname, "{urn:custom}Thing");
        assert_eq!(position, 1);
    }

    #[test]
    fn test_workflow_service_root() {
        let root = Token::start(SERVICE_MODEL_NS, "WorkflowService");
        let root_end = Token::end(SERVICE_MODEL_NS, "WorkflowService");
        let (d, d_end) = activity("Delay");
        let parsed = parse_document(vec![root, d, d_end, root_end], &Registry::standard()).unwrap();
        assert_eq!(parsed.local_name(), "Delay");
    }
}
