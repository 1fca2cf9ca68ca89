//! Placeholder parsing and substitution.
//!
//! Build actions and templates reference values that are only known once a
//! component's workspace exists (its staging root, project directory, the
//! project install dir) or that a template's caller supplies. This module
//! parses `$${name}` references and substitutes resolved values.
//!
//! # Shell Variables
//!
//! Single `$` characters pass through unchanged, so shell variables like
//! `$HOME` and `${PATH}` work naturally without any escaping.
//!
//! # Escaping
//!
//! Use `$$$` before `{` to produce a literal `$${` sequence.
//!
//! # Example
//!
//! ```
//! use stagehand_lib::placeholder::{parse, Segment};
//!
//! let segments = parse("$${install_dir}/bin:$PATH").unwrap();
//! assert_eq!(segments, vec![
//!     Segment::Variable("install_dir".to_string()),
//!     Segment::Literal("/bin:$PATH".to_string()),
//! ]);
//! ```

use std::collections::BTreeMap;

use thiserror::Error;

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text (no placeholders)
  Literal(String),

  /// A named value to be resolved
  Variable(String),
}

/// Errors that can occur during placeholder parsing or resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("malformed placeholder: '{0}'")]
  Malformed(String),

  #[error("unknown variable '{0}'")]
  Unknown(String),
}

/// Resolves placeholder names to values.
pub trait Resolver {
  fn resolve(&self, name: &str) -> Result<&str, PlaceholderError>;
}

impl Resolver for BTreeMap<String, String> {
  fn resolve(&self, name: &str) -> Result<&str, PlaceholderError> {
    self
      .get(name)
      .map(String::as_str)
      .ok_or_else(|| PlaceholderError::Unknown(name.to_string()))
  }
}

/// Parse a string containing placeholders into segments.
///
/// # Errors
///
/// Returns an error if a placeholder is unclosed or its name is not made of
/// ASCII letters, digits, `_`, `-` or `.`.
pub fn parse(input: &str) -> Result<Vec<Segment>, PlaceholderError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    if ch != '$' {
      literal.push(ch);
      continue;
    }

    match chars.peek() {
      Some((_, '$')) => {
        chars.next();

        match chars.peek() {
          Some((_, '$')) => {
            chars.next();
            if let Some((_, '{')) = chars.peek() {
              // $$${ -> literal $${
              literal.push_str("$${");
              chars.next();
            } else {
              literal.push_str("$$$");
            }
          }
          Some((_, '{')) => {
            chars.next();

            if !literal.is_empty() {
              segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }

            let mut name = String::new();
            let mut found_close = false;
            for (_, c) in chars.by_ref() {
              if c == '}' {
                found_close = true;
                break;
              }
              name.push(c);
            }

            if !found_close {
              return Err(PlaceholderError::Unclosed(pos));
            }

            segments.push(Segment::Variable(validate_name(name)?));
          }
          _ => literal.push_str("$$"),
        }
      }
      // A lone $ is a shell variable
      _ => literal.push('$'),
    }
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

fn validate_name(name: String) -> Result<String, PlaceholderError> {
  let trimmed = name.trim();
  let valid = !trimmed.is_empty()
    && trimmed
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
  if valid {
    Ok(trimmed.to_string())
  } else {
    Err(PlaceholderError::Malformed(name))
  }
}

/// Names referenced by the placeholders in `input`, in order of appearance.
pub fn variables(input: &str) -> Result<Vec<String>, PlaceholderError> {
  Ok(
    parse(input)?
      .into_iter()
      .filter_map(|segment| match segment {
        Segment::Variable(name) => Some(name),
        Segment::Literal(_) => None,
      })
      .collect(),
  )
}

/// Substitute all placeholders in a string using the provided resolver.
///
/// # Errors
///
/// Returns an error if parsing fails or if any placeholder cannot be resolved.
pub fn substitute(input: &str, resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let segments = parse(input)?;
  substitute_segments(&segments, resolver)
}

/// Substitute placeholders in pre-parsed segments.
pub fn substitute_segments(segments: &[Segment], resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let mut result = String::new();

  for segment in segments {
    match segment {
      Segment::Literal(s) => result.push_str(s),
      Segment::Variable(name) => result.push_str(resolver.resolve(name)?),
    }
  }

  Ok(result)
}
