//! The `dimensions` rule: pixel bounds, exact sizes and aspect ratio

use crate::error::{Result, RuleError};
use crate::payload::Resource;
use crate::probe::{DimensionProbe, SVG};
use tracing::{debug, warn};

/// Named parameters of a `dimensions` rule, e.g. `min_width=100`
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DimensionParameters {
    pub min_width: Option<f64>,
    pub max_width: Option<f64>,
    pub min_height: Option<f64>,
    pub max_height: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub ratio: Option<f64>,
}

impl DimensionParameters {
    /// Parse `key=value` tokens. Unknown keys and tokens without `=` are
    /// ignored and a repeated key keeps its last value.
    pub fn parse<S: AsRef<str>>(params: &[S]) -> Self {
        let mut parsed = DimensionParameters::default();

        for token in params {
            let Some((key, value)) = token.as_ref().split_once('=') else {
                debug!("ignoring dimensions parameter without a value: {:?}", token.as_ref());
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            let slot = match key {
                "min_width" => &mut parsed.min_width,
                "max_width" => &mut parsed.max_width,
                "min_height" => &mut parsed.min_height,
                "max_height" => &mut parsed.max_height,
                "width" => &mut parsed.width,
                "height" => &mut parsed.height,
                "ratio" => {
                    parsed.ratio = Some(parse_ratio(value));
                    continue;
                }
                _ => {
                    debug!("ignoring unknown dimensions parameter {key:?}");
                    continue;
                }
            };

            match value.parse::<f64>() {
                Ok(pixels) if pixels.is_finite() => *slot = Some(pixels),
                _ => warn!("ignoring dimensions parameter {key}={value:?}: not a number"),
            }
        }

        parsed
    }

    /// Every present constraint holds for a `width` x `height` image
    pub fn is_satisfied_by(&self, width: u32, height: u32, tolerance: f64) -> bool {
        !self.fails_basic_checks(width, height) && !self.fails_ratio_check(width, height, tolerance)
    }

    fn fails_basic_checks(&self, width: u32, height: u32) -> bool {
        let (width, height) = (f64::from(width), f64::from(height));

        violates(self.min_width, |min| width >= min)
            || violates(self.max_width, |max| width <= max)
            || violates(self.min_height, |min| height >= min)
            || violates(self.max_height, |max| height <= max)
            || violates(self.width, |exact| width == exact)
            || violates(self.height, |exact| height == exact)
    }

    fn fails_ratio_check(&self, width: u32, height: u32, tolerance: f64) -> bool {
        let Some(requested) = self.ratio else {
            return false;
        };
        let actual = f64::from(width) / f64::from(height);
        (requested - actual).abs() > tolerance
    }
}

/// An absent bound never fails
fn violates(bound: Option<f64>, holds: impl Fn(f64) -> bool) -> bool {
    bound.map_or(false, |bound| !holds(bound))
}

/// A ratio given as `1.5` or `3/2`. Zero or missing parts count as 1. An
/// unreadable numerator stops parsing, so `ratio=abc` and `ratio=/2` both
/// ask for a square image.
pub fn parse_ratio(value: &str) -> f64 {
    let number = |s: &str| s.trim().parse::<f64>().ok().filter(|n| n.is_finite());
    let nonzero = |n: Option<f64>| n.filter(|n| *n != 0.0).unwrap_or(1.0);

    let (numerator, denominator) = value.split_once('/').unwrap_or((value, ""));
    let Some(numerator) = number(numerator) else {
        return 1.0;
    };
    nonzero(Some(numerator)) / nonzero(number(denominator))
}

/// Evaluate a `dimensions` rule against a resolved resource.
///
/// SVG documents always pass since they have no intrinsic raster size and
/// anything that cannot be probed fails. Only a probed image makes a rule
/// without parameters a configuration error.
pub fn check_dimensions<S: AsRef<str>>(
    resource: &Resource<'_>,
    params: &[S],
    probe: &dyn DimensionProbe,
    tolerance: f64,
) -> Result<bool> {
    if !resource.is_readable_file() {
        return Ok(false);
    }

    if resource.content_type() == SVG {
        debug!("svg payload, dimensions do not apply");
        return Ok(true);
    }

    let Some((width, height)) = probe.probe(resource.path()) else {
        debug!("payload is not a probeable image");
        return Ok(false);
    };

    if params.is_empty() {
        return Err(RuleError::MissingParameters {
            rule: "dimensions",
            required: 1,
        });
    }

    let parsed = DimensionParameters::parse(params);
    let passed = parsed.is_satisfied_by(width, height, tolerance);
    debug!("{width}x{height} image against {parsed:?}: passed = {passed}");
    Ok(passed)
}
