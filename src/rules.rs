//! The public rules. Every rule runs the same pipeline: resolve the payload
//! into a `Resource`, then evaluate one `RuleKind` against it.

use crate::compare::{AllowList, Kilobytes, MimeMatcher, MimeRule, SizeComparator, SizeRule};
use crate::config::Settings;
use crate::dimensions::check_dimensions;
use crate::error::{Result, RuleError};
use crate::payload::{InputValue, PayloadResolver, Resource};
use crate::probe::{DimensionProbe, ImageProbe};
use std::fmt;
use std::str::FromStr;
use tracing::*;

/// Extensions accepted by the `image` rule
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "svg", "webp"];

/// Prefix of the rule names exposed to a host framework
pub const RULE_PREFIX: &str = "base64_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    Max,
    Min,
    Between,
    Size,
    File,
    Image,
    Mimetypes,
    Mimes,
    Dimensions,
}

impl RuleKind {
    pub const ALL: [RuleKind; 9] = [
        RuleKind::Max,
        RuleKind::Min,
        RuleKind::Between,
        RuleKind::Size,
        RuleKind::File,
        RuleKind::Image,
        RuleKind::Mimetypes,
        RuleKind::Mimes,
        RuleKind::Dimensions,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RuleKind::Max => "max",
            RuleKind::Min => "min",
            RuleKind::Between => "between",
            RuleKind::Size => "size",
            RuleKind::File => "file",
            RuleKind::Image => "image",
            RuleKind::Mimetypes => "mimetypes",
            RuleKind::Mimes => "mimes",
            RuleKind::Dimensions => "dimensions",
        }
    }

    /// The name a host registers the rule under, e.g. `base64_max`
    pub fn rule_name(self) -> String {
        format!("{RULE_PREFIX}{}", self.name())
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{RULE_PREFIX}{}", self.name())
    }
}

/// Accepts both `base64_max` and `max`
impl FromStr for RuleKind {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        let name = name.strip_prefix(RULE_PREFIX).unwrap_or(name);
        RuleKind::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| RuleError::UnknownRule(s.to_string()))
    }
}

/// Validates Base64 payloads and stored uploads against upload rules.
///
/// Empty and absent values pass every rule. Malformed payloads fail with
/// `Ok(false)`; a misconfigured rule is an `Err`.
pub struct Base64Validator {
    resolver: PayloadResolver,
    sizes: Box<dyn SizeComparator>,
    mimes: Box<dyn MimeMatcher>,
    probe: Box<dyn DimensionProbe>,
    ratio_tolerance: f64,
}

impl fmt::Debug for Base64Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Base64Validator {{ resolver: {:?}, ratio_tolerance: {} }}",
            self.resolver, self.ratio_tolerance
        )
    }
}

impl Default for Base64Validator {
    fn default() -> Self {
        Base64Validator::new(&Settings::default())
    }
}

impl Base64Validator {
    pub fn new(settings: &Settings) -> Self {
        Base64Validator {
            resolver: PayloadResolver::new(settings),
            sizes: Box::new(Kilobytes),
            mimes: Box::new(AllowList),
            probe: Box::new(ImageProbe),
            ratio_tolerance: settings.ratio_tolerance,
        }
    }

    /// Replace the comparator used by `max`, `min`, `between` and `size`
    pub fn with_size_comparator(mut self, sizes: impl SizeComparator + 'static) -> Self {
        self.sizes = Box::new(sizes);
        self
    }

    /// Replace the allow-list used by `mimetypes`, `mimes` and `image`
    pub fn with_mime_matcher(mut self, mimes: impl MimeMatcher + 'static) -> Self {
        self.mimes = Box::new(mimes);
        self
    }

    /// Replace the probe used by `dimensions`
    pub fn with_probe(mut self, probe: impl DimensionProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    /// Run a rule by its registered name, e.g. `base64_dimensions`
    pub fn validate_rule<'a>(
        &self,
        rule: &str,
        attribute: &str,
        value: impl Into<InputValue<'a>>,
        params: &[&str],
    ) -> Result<bool> {
        let kind: RuleKind = rule.parse()?;
        self.validate(kind, attribute, value, params)
    }

    /// Resolve `value` and evaluate `kind` against it. The transient file
    /// behind a decoded payload is gone when this returns.
    #[tracing::instrument(skip(self, value, params), fields(rule = %kind))]
    pub fn validate<'a>(
        &self,
        kind: RuleKind,
        attribute: &str,
        value: impl Into<InputValue<'a>>,
        params: &[&str],
    ) -> Result<bool> {
        let value = value.into();
        if value.is_empty() {
            return Ok(true);
        }

        let resource = match self.resolver.resolve(value) {
            Ok(resource) => resource,
            Err(RuleError::Storage(e)) => {
                error!("failing {attribute}: cannot store decoded payload: {e}");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let passed = self.evaluate(kind, &resource, params)?;
        debug!("{attribute} passed = {passed}");
        Ok(passed)
    }

    /// Evaluate a rule against an already resolved resource
    pub fn evaluate(
        &self,
        kind: RuleKind,
        resource: &Resource<'_>,
        params: &[&str],
    ) -> Result<bool> {
        let size = |rule| self.sizes.compare(rule, resource.len(), params);

        match kind {
            RuleKind::Max => size(SizeRule::Max),
            RuleKind::Min => size(SizeRule::Min),
            RuleKind::Between => size(SizeRule::Between),
            RuleKind::Size => size(SizeRule::Size),
            RuleKind::File => Ok(resource.is_readable_file()),
            RuleKind::Image => Ok(self.matches_extension(resource, IMAGE_EXTENSIONS)),
            RuleKind::Mimes => Ok(self.matches_extension(resource, params)),
            RuleKind::Mimetypes => Ok(resource.is_readable_file()
                && self
                    .mimes
                    .matches(MimeRule::Mimetypes, resource.content_type(), params)),
            RuleKind::Dimensions => {
                check_dimensions(resource, params, self.probe.as_ref(), self.ratio_tolerance)
            }
        }
    }

    fn matches_extension(&self, resource: &Resource<'_>, allowed: &[&str]) -> bool {
        if !resource.is_readable_file() {
            return false;
        }
        match resource.extension() {
            Some(ext) => self.mimes.matches(MimeRule::Mimes, ext, allowed),
            None => {
                debug!("no known extension for {}", resource.content_type());
                false
            }
        }
    }

    pub fn base64_max<'a>(
        &self,
        attribute: &str,
        value: impl Into<InputValue<'a>>,
        params: &[&str],
    ) -> Result<bool> {
        self.validate(RuleKind::Max, attribute, value, params)
    }

    pub fn base64_min<'a>(
        &self,
        attribute: &str,
        value: impl Into<InputValue<'a>>,
        params: &[&str],
    ) -> Result<bool> {
        self.validate(RuleKind::Min, attribute, value, params)
    }

    pub fn base64_between<'a>(
        &self,
        attribute: &str,
        value: impl Into<InputValue<'a>>,
        params: &[&str],
    ) -> Result<bool> {
        self.validate(RuleKind::Between, attribute, value, params)
    }

    pub fn base64_size<'a>(
        &self,
        attribute: &str,
        value: impl Into<InputValue<'a>>,
        params: &[&str],
    ) -> Result<bool> {
        self.validate(RuleKind::Size, attribute, value, params)
    }

    pub fn base64_file<'a>(
        &self,
        attribute: &str,
        value: impl Into<InputValue<'a>>,
        params: &[&str],
    ) -> Result<bool> {
        self.validate(RuleKind::File, attribute, value, params)
    }

    pub fn base64_image<'a>(
        &self,
        attribute: &str,
        value: impl Into<InputValue<'a>>,
        params: &[&str],
    ) -> Result<bool> {
        self.validate(RuleKind::Image, attribute, value, params)
    }

    pub fn base64_mimetypes<'a>(
        &self,
        attribute: &str,
        value: impl Into<InputValue<'a>>,
        params: &[&str],
    ) -> Result<bool> {
        self.validate(RuleKind::Mimetypes, attribute, value, params)
    }

    pub fn base64_mimes<'a>(
        &self,
        attribute: &str,
        value: impl Into<InputValue<'a>>,
        params: &[&str],
    ) -> Result<bool> {
        self.validate(RuleKind::Mimes, attribute, value, params)
    }

    pub fn base64_dimensions<'a>(
        &self,
        attribute: &str,
        value: impl Into<InputValue<'a>>,
        params: &[&str],
    ) -> Result<bool> {
        self.validate(RuleKind::Dimensions, attribute, value, params)
    }
}
