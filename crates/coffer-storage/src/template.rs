//! Sub-directory templates
//!
//! A template such as `{ext}/{^name}/{^^name}` maps a file name onto a
//! sub-directory path, spreading large populations of files across many small
//! directories while staying a pure function of the file name.
//!
//! Placeholders:
//! - `{name}` - the file name
//! - `{ext}` / `{extension}` - the file extension, without the dot
//!
//! Any number of `^` may precede the identifier to select a single character:
//! for `54321.tmp`, `{^name}` resolves to `5`, `{^^name}` to `4` and so on.
//! Selecting past the end of the value, or resolving to an empty value or to
//! `.`, yields the default segment `0`.
//!
//! Identifiers are ASCII (`[A-Za-z0-9_]`); braces around anything else, such
//! as `{名}`, are kept as literal text.

use crate::traits::{StorageError, StorageResult};
use regex::{Captures, Regex};
use std::path::Path;
use std::sync::LazyLock;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\^*)([A-Za-z0-9_]+)\}").expect("placeholder pattern is valid"));

/// Segment used whenever a placeholder would produce an unusable directory name.
pub const DEFAULT_SEGMENT: &str = "0";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubDirTemplate {
    template: String,
}

impl SubDirTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    pub fn is_empty(&self) -> bool {
        self.template.is_empty()
    }

    /// Resolve the template for `file_name`.
    ///
    /// Only `name`, `ext` and `extension` are known; any other identifier fails
    /// with `UnknownPlaceholder`.
    pub fn resolve(&self, file_name: &str) -> StorageResult<String> {
        if self.template.is_empty() {
            return Ok(String::new());
        }

        let mut unknown = None;
        let resolved = PLACEHOLDER_RE.replace_all(&self.template, |caps: &Captures<'_>| {
            let offset = caps[1].len();
            let identifier = &caps[2];
            let value = match identifier {
                "name" => file_name.to_string(),
                "ext" | "extension" => extension(file_name).to_string(),
                other => {
                    unknown.get_or_insert_with(|| other.to_string());
                    return String::new();
                }
            };
            let value = pick(value, offset);
            if value.is_empty() || value == "." {
                DEFAULT_SEGMENT.to_string()
            } else {
                value
            }
        });

        match unknown {
            Some(identifier) => Err(StorageError::UnknownPlaceholder(identifier)),
            None => Ok(resolved.into_owned()),
        }
    }

    /// Resolve the template against caller-supplied values.
    ///
    /// Identifiers are looked up through `lookup`; an identifier it cannot
    /// resolve is substituted by its own name. `^` selection applies as in
    /// [`SubDirTemplate::resolve`], but empty values are kept as they are.
    /// This is the variant used to build per-record sub paths outside a bucket.
    pub fn resolve_with<F>(&self, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.template.is_empty() {
            return String::new();
        }

        PLACEHOLDER_RE
            .replace_all(&self.template, |caps: &Captures<'_>| {
                let offset = caps[1].len();
                let identifier = &caps[2];
                let value = lookup(identifier).unwrap_or_else(|| identifier.to_string());
                pick(value, offset)
            })
            .into_owned()
    }

    /// Name of the file prefixed with its resolved sub-directory, e.g. `5/4/54321.tmp`.
    pub fn file_name_with_sub_dir(&self, file_name: &str) -> StorageResult<String> {
        let sub_dir = self.resolve(file_name)?;
        if sub_dir.is_empty() {
            Ok(file_name.to_string())
        } else {
            Ok(format!("{}/{}", sub_dir, file_name))
        }
    }
}

impl From<&str> for SubDirTemplate {
    fn from(template: &str) -> Self {
        Self::new(template)
    }
}

impl From<String> for SubDirTemplate {
    fn from(template: String) -> Self {
        Self::new(template)
    }
}

/// Resolve `template` for `file_name`; see [`SubDirTemplate::resolve`].
pub fn resolve(template: &str, file_name: &str) -> StorageResult<String> {
    SubDirTemplate::new(template).resolve(file_name)
}

/// Extension of a file name. Dot files such as `.gitignore` have none.
fn extension(file_name: &str) -> &str {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
}

/// Apply `^` selection: offset 0 keeps the value, offset k picks its k-th character.
fn pick(value: String, offset: usize) -> String {
    if offset == 0 {
        return value;
    }
    value
        .chars()
        .nth(offset - 1)
        .map(String::from)
        .unwrap_or_else(|| DEFAULT_SEGMENT.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_char_placeholders() {
        assert_eq!(resolve("{^name}/{^^name}", "54321.tmp").unwrap(), "5/4");
        assert_eq!(resolve("{ext}/{^name}", "photo.JPG").unwrap(), "JPG/p");
        assert_eq!(resolve("{^^^^^name}", "54321.tmp").unwrap(), "1");
    }

    #[test]
    fn test_offset_beyond_length_defaults() {
        assert_eq!(resolve("{^^^^^^name}", "ab").unwrap(), "0");
        assert_eq!(resolve("{^ext}", "README").unwrap(), "0");
    }

    #[test]
    fn test_dot_file_extension_defaults() {
        assert_eq!(resolve("{name}", ".gitignore").unwrap(), ".gitignore");
        assert_eq!(resolve("{ext}", ".gitignore").unwrap(), "0");
        assert_eq!(resolve("{extension}", "archive.tar.gz").unwrap(), "gz");
        // leading dot selected by ^ is not a usable segment
        assert_eq!(resolve("{^name}", ".gitignore").unwrap(), "0");
    }

    #[test]
    fn test_empty_template_and_literal_text() {
        assert_eq!(resolve("", "file.txt").unwrap(), "");
        assert_eq!(resolve("static/dir", "file.txt").unwrap(), "static/dir");
        assert_eq!(resolve("v1-{^name}", "zeta.txt").unwrap(), "v1-z");
    }

    #[test]
    fn test_unknown_placeholder() {
        let result = resolve("{^name}/{owner}", "file.txt");
        assert!(matches!(
            result,
            Err(StorageError::UnknownPlaceholder(ref name)) if name == "owner"
        ));
    }

    #[test]
    fn test_non_ascii_braces_are_literal() {
        assert_eq!(resolve("{名}/{^name}", "abc").unwrap(), "{名}/a");
        let template = SubDirTemplate::new("{é}/{pk}");
        assert_eq!(
            template.resolve_with(|key| (key == "pk").then(|| "7".to_string())),
            "{é}/7"
        );
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let template = SubDirTemplate::new("{ext}/{^name}/{^^name}");
        let first = template.resolve("document.pdf").unwrap();
        for _ in 0..10 {
            assert_eq!(template.resolve("document.pdf").unwrap(), first);
        }
        assert_eq!(first, "pdf/d/o");
    }

    #[test]
    fn test_multibyte_names_select_characters() {
        assert_eq!(resolve("{^name}/{^^name}", "été.txt").unwrap(), "é/t");
    }

    #[test]
    fn test_file_name_with_sub_dir() {
        let template = SubDirTemplate::new("{^name}/{^^name}");
        assert_eq!(
            template.file_name_with_sub_dir("54321.tmp").unwrap(),
            "5/4/54321.tmp"
        );
        let flat = SubDirTemplate::default();
        assert_eq!(flat.file_name_with_sub_dir("54321.tmp").unwrap(), "54321.tmp");
    }

    #[test]
    fn test_resolve_with_context() {
        let values: HashMap<&str, String> =
            [("pk", "54321".to_string()), ("group", String::new())].into();
        let template = SubDirTemplate::new("{^pk}/{pk}/{group}/{missing}");
        let resolved = template.resolve_with(|key| values.get(key).cloned());
        assert_eq!(resolved, "5/54321//missing");
    }
}
