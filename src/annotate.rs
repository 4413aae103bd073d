//! Dependency token derivation
//!
//! Every injectable carries an [`Annotation`]. Explicit annotations (the
//! array-literal form) are authoritative. Inferred annotations come from
//! parameter or field names captured at compile time by the derive crate;
//! they are refused in strict mode because they silently change meaning
//! when the source is renamed.

use crate::{DiError, Injectable, Result};
use std::sync::Arc;

/// Label used when a failing injectable has no name.
pub const ANONYMOUS: &str = "anonymous function";

/// Where an injectable's token list came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    /// Tokens listed by the registrant
    Explicit(Vec<String>),
    /// Parameter names, in declared order
    Inferred(Vec<String>),
}

impl Annotation {
    /// Build an explicit annotation
    pub fn explicit<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Explicit(tokens.into_iter().map(Into::into).collect())
    }

    /// Build an inferred annotation from parameter names
    pub fn inferred<I, S>(params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Inferred(params.into_iter().map(Into::into).collect())
    }

    /// Raw tokens or parameter names, before normalization
    pub fn tokens(&self) -> &[String] {
        match self {
            Self::Explicit(tokens) | Self::Inferred(tokens) => tokens,
        }
    }

    /// Check if the tokens were listed explicitly
    #[inline]
    pub fn is_explicit(&self) -> bool {
        matches!(self, Self::Explicit(_))
    }
}

/// Derive the ordered token list for `injectable`.
///
/// `name` labels the injectable in a strict-mode error when given; otherwise
/// its declared name, then [`ANONYMOUS`], is used. The normalized list is
/// memoized on the injectable.
pub fn derive_tokens(injectable: &Injectable, strict: bool, name: Option<&str>) -> Result<Arc<[String]>> {
    if let Annotation::Inferred(params) = injectable.annotation() {
        if strict && !params.is_empty() {
            let label = name
                .filter(|n| !n.is_empty())
                .or_else(|| injectable.name())
                .unwrap_or(ANONYMOUS);
            return Err(DiError::strict(label));
        }
    }

    let memo = injectable.memoized_tokens();
    if let Some(tokens) = memo.get() {
        return Ok(Arc::clone(tokens));
    }

    let tokens = normalize(injectable.annotation())?;
    Ok(Arc::clone(memo.get_or_init(|| tokens)))
}

fn normalize(annotation: &Annotation) -> Result<Arc<[String]>> {
    match annotation {
        Annotation::Explicit(tokens) => tokens
            .iter()
            .map(|token| validate(token).map(str::to_string))
            .collect(),
        Annotation::Inferred(params) => params
            .iter()
            .map(|param| validate(strip_underscores(param)).map(str::to_string))
            .collect(),
    }
}

/// Strip one pair of surrounding underscores from a parameter name.
///
/// `_config_` becomes `config`; a one-sided underscore is part of the name.
pub fn strip_underscores(param: &str) -> &str {
    let trimmed = param.trim();
    trimmed
        .strip_prefix('_')
        .and_then(|rest| rest.strip_suffix('_'))
        .filter(|inner| !inner.is_empty())
        .unwrap_or(trimmed)
}

/// A token must be a non-empty name without whitespace or control characters.
fn validate(token: &str) -> Result<&str> {
    if token.is_empty() || token.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(DiError::invalid_token(token));
    }
    Ok(token)
}
