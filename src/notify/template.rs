//! Positional message templates.
//!
//! Placeholders are `{}` (next argument) or `{N}` (argument N); `{{` and `}}`
//! are literal braces. Templates are validated against their argument count
//! when parsed, so rendering cannot fail.

use crate::error::ConfigError;

use super::notification::{Notification, NotificationKind};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Arg(usize),
}

/// A parsed template with a fixed arity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
    arity: usize,
}

impl Template {
    /// Parses `source`, requiring every placeholder to index below `arity`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Template` (tagged with `field`) for unbalanced
    /// braces, non-numeric placeholders, or out-of-range indexes.
    pub fn parse(field: &str, source: &str, arity: usize) -> Result<Self, ConfigError> {
        let err = |reason: String| ConfigError::Template {
            field: field.to_string(),
            reason,
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut next_auto = 0usize;
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut spec = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(ch) => spec.push(ch),
                            None => return Err(err(format!("unclosed placeholder in {source:?}"))),
                        }
                    }
                    let index = if spec.is_empty() {
                        let i = next_auto;
                        next_auto += 1;
                        i
                    } else {
                        spec.trim()
                            .parse::<usize>()
                            .map_err(|_| err(format!("placeholder {{{spec}}} is not positional")))?
                    };
                    if index >= arity {
                        return Err(err(format!(
                            "placeholder index {index} out of range (template takes {arity} argument(s))"
                        )));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Arg(index));
                }
                '}' => return Err(err(format!("unmatched '}}' in {source:?}"))),
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
            arity,
        })
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub const fn arity(&self) -> usize {
        self.arity
    }

    /// Renders the template. Missing arguments render as empty strings.
    #[must_use]
    pub fn render(&self, args: &[&str]) -> String {
        let mut out = String::with_capacity(self.source.len());
        for seg in &self.segments {
            match seg {
                Segment::Literal(s) => out.push_str(s),
                Segment::Arg(i) => out.push_str(args.get(*i).copied().unwrap_or("")),
            }
        }
        out
    }
}

/// The pair of message templates used for outbound notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFormats {
    /// Formatted with (tag name, detector name).
    pub arrive: Template,
    /// Formatted with (tag name).
    pub leave: Template,
}

impl MessageFormats {
    /// # Errors
    ///
    /// Returns `ConfigError::Template` if either template is invalid.
    pub fn parse(arrive: &str, leave: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            arrive: Template::parse("webhook.msg_arrive_format", arrive, 2)?,
            leave: Template::parse("webhook.msg_leave_format", leave, 1)?,
        })
    }

    /// Renders the human-readable message for a notification.
    #[must_use]
    pub fn render(&self, notification: &Notification) -> String {
        match notification.kind {
            NotificationKind::Arrived => self.arrive.render(&[
                notification.tag_name.as_str(),
                notification.detector.as_deref().unwrap_or(""),
            ]),
            NotificationKind::Left => self.leave.render(&[notification.tag_name.as_str()]),
        }
    }
}
