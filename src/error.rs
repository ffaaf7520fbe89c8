//! Error types.
//!
//! None of these cross the runtime boundary: expression, watcher, directive and
//! lifecycle failures are logged and contained where they happen.

use thiserror::Error;

/// Failure to compile or evaluate a template expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    /// The lexer met a character that starts no token.
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar {
        /// Offending character.
        ch: char,
        /// Byte offset in the source.
        offset: usize,
    },
    /// A string literal was not closed.
    #[error("unterminated string literal starting at offset {offset}")]
    UnterminatedString {
        /// Byte offset of the opening quote.
        offset: usize,
    },
    /// A number literal could not be parsed.
    #[error("invalid number literal '{literal}'")]
    InvalidNumber {
        /// The literal text.
        literal: String,
    },
    /// The parser met a token it did not expect.
    #[error("unexpected {found} at offset {offset}, expected {expected}")]
    UnexpectedToken {
        /// Description of the token found.
        found: String,
        /// What the parser was looking for.
        expected: &'static str,
        /// Byte offset of the token.
        offset: usize,
    },
    /// The source ended in the middle of an expression.
    #[error("unexpected end of expression, expected {expected}")]
    UnexpectedEnd {
        /// What the parser was looking for.
        expected: &'static str,
    },
    /// The left side of an assignment is not a name or member chain.
    #[error("invalid assignment target")]
    InvalidAssignmentTarget,
    /// A call target is neither a scope function nor a known value method.
    #[error("'{name}' is not a function")]
    NotCallable {
        /// Name that was called.
        name: String,
    },
    /// A scope function panicked while being called.
    #[error("function '{name}' panicked")]
    CallPanicked {
        /// Name of the function.
        name: String,
    },
}

/// Failure while setting up a directive on a node.
#[derive(Debug, Error)]
pub enum DirectiveError {
    /// The directive's attribute value does not follow its syntax.
    #[error("invalid {directive} syntax: '{expression}'")]
    InvalidSyntax {
        /// Directive name.
        directive: &'static str,
        /// The attribute value.
        expression: String,
    },
    /// The directive only applies to form controls.
    #[error("{directive} requires a form control, found <{tag}>")]
    NotAControl {
        /// Directive name.
        directive: &'static str,
        /// Tag of the element it was placed on.
        tag: String,
    },
    /// The directive needs the node to have a parent.
    #[error("{directive} requires a node attached to the tree")]
    Detached {
        /// Directive name.
        directive: &'static str,
    },
    /// The host has no template with the requested name.
    #[error("template '{name}' not found")]
    TemplateNotFound {
        /// Template name.
        name: String,
    },
    /// No template source was installed.
    #[error("no template source installed")]
    NoTemplateSource,
    /// The directive's expression failed to compile.
    #[error(transparent)]
    Expression(#[from] ExprError),
}
