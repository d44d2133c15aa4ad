//! `{key}` placeholder substitution for file name templates.
use std::fmt::Display;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Values substituted into file name templates, keyed by placeholder name.
#[derive(Debug, Clone, Default)]
pub struct Replacements(FxHashMap<String, String>);

impl Replacements {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn set(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }

    /// Returns a copy with the additional `pairs` set.
    #[must_use]
    pub fn with<V: Display>(&self, pairs: &[(&str, V)]) -> Self {
        let mut out = self.clone();
        for (key, value) in pairs {
            out.set(key, value);
        }
        out
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// Returns the placeholder names used in `template`, in order of appearance.
#[must_use]
pub fn placeholders(template: &str) -> Vec<&str> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Substitutes every `{key}` in `template`. Fails if any key has no value.
///
/// # Examples
/// ```
/// # use a2a_contract::config::template::{fill_template, Replacements};
/// let mut replacements = Replacements::new();
/// replacements.set("w", "e1000").set("v", "vseed3");
/// let name = fill_template("mf/{w}_{v}.h5", &replacements).unwrap();
/// assert_eq!(name, "mf/e1000_vseed3.h5");
/// ```
pub fn fill_template(template: &str, replacements: &Replacements) -> Result<String> {
    if let Some(key) = placeholders(template)
        .into_iter()
        .find(|key| replacements.get(key).is_none())
    {
        return Err(Error::Template {
            template: template.to_string(),
            key: key.to_string(),
        });
    }

    Ok(PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            replacements.get(&caps[1]).unwrap_or_default().to_string()
        })
        .into_owned())
}
