//! Comparators the rules delegate to once a payload is resolved: byte
//! length against numeric bounds, and content type or extension against
//! an allow-list. Hosts with their own conventions can swap these out.

use crate::error::{Result, RuleError};

/// The size-family rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeRule {
    Max,
    Min,
    Between,
    Size,
}

impl SizeRule {
    pub fn name(self) -> &'static str {
        match self {
            SizeRule::Max => "max",
            SizeRule::Min => "min",
            SizeRule::Between => "between",
            SizeRule::Size => "size",
        }
    }

    fn required_parameters(self) -> usize {
        match self {
            SizeRule::Between => 2,
            _ => 1,
        }
    }
}

/// The allow-list rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimeRule {
    /// Parameters are content types, `image/*` wildcards allowed
    Mimetypes,

    /// Parameters are file extensions
    Mimes,
}

pub trait SizeComparator: Send + Sync {
    fn compare(&self, rule: SizeRule, bytes: u64, params: &[&str]) -> Result<bool>;
}

pub trait MimeMatcher: Send + Sync {
    fn matches(&self, rule: MimeRule, content_type_or_ext: &str, params: &[&str]) -> bool;
}

/// Compares file sizes in kilobytes (fractional), the unit web frameworks
/// conventionally use for upload limits. `max:512` allows up to 512 KiB.
#[derive(Debug, Default, Clone, Copy)]
pub struct Kilobytes;

impl SizeComparator for Kilobytes {
    fn compare(&self, rule: SizeRule, bytes: u64, params: &[&str]) -> Result<bool> {
        let required = rule.required_parameters();
        if params.len() < required {
            return Err(RuleError::MissingParameters {
                rule: rule.name(),
                required,
            });
        }

        let bound = |i: usize| -> Result<f64> {
            params[i]
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(|| RuleError::InvalidParameter {
                    rule: rule.name(),
                    value: params[i].to_string(),
                })
        };

        let kilobytes = bytes as f64 / 1024.0;
        Ok(match rule {
            SizeRule::Max => kilobytes <= bound(0)?,
            SizeRule::Min => kilobytes >= bound(0)?,
            SizeRule::Between => bound(0)? <= kilobytes && kilobytes <= bound(1)?,
            SizeRule::Size => kilobytes == bound(0)?,
        })
    }
}

/// Case-insensitive allow-list matching with the usual aliases
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowList;

impl MimeMatcher for AllowList {
    fn matches(&self, rule: MimeRule, content_type_or_ext: &str, params: &[&str]) -> bool {
        let value = content_type_or_ext.to_ascii_lowercase();
        match rule {
            MimeRule::Mimetypes => {
                let wildcard = value
                    .split_once('/')
                    .map(|(kind, _)| format!("{kind}/*"));
                params.iter().any(|p| {
                    let p = p.trim().to_ascii_lowercase();
                    p == value || Some(&p) == wildcard.as_ref()
                })
            }
            MimeRule::Mimes => params
                .iter()
                .any(|p| same_extension(&p.trim().to_ascii_lowercase(), &value)),
        }
    }
}

fn same_extension(allowed: &str, actual: &str) -> bool {
    const ALIASES: &[&[&str]] = &[&["jpg", "jpeg", "jpe"], &["tif", "tiff"], &["svg", "svgz"]];

    allowed == actual
        || ALIASES
            .iter()
            .any(|group| group.contains(&allowed) && group.contains(&actual))
}
