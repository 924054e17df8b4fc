//! Directional quality comparison of a replacement against an original.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::error::ExtractionError;
use crate::model::{AudioProperties, QualityComparison};
use crate::probe::MediaInspector;

/// Maximum relative duration drift, as a fraction of the original.
pub const DURATION_TOLERANCE: f64 = 0.02;

/// Issue recorded when either file could not be inspected.
pub const EXTRACTION_FAILED: &str = "property extraction failed";

/// Compares media files through a [`MediaInspector`].
#[derive(Clone)]
pub struct QualityComparator {
    inspector: Arc<dyn MediaInspector>,
}

impl std::fmt::Debug for QualityComparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityComparator").finish_non_exhaustive()
    }
}

impl QualityComparator {
    /// Build a comparator over `inspector`.
    #[must_use]
    pub fn new(inspector: Arc<dyn MediaInspector>) -> Self {
        Self { inspector }
    }

    /// Extract properties of one file.
    ///
    /// # Errors
    ///
    /// Returns an [`ExtractionError`] when the file is missing or unreadable by the probe.
    pub fn extract_properties(&self, path: &Path) -> Result<AudioProperties, ExtractionError> {
        self.inspector.inspect(path)
    }

    /// Compare `replacement` against `original`. Never fails; extraction
    /// problems become a rejected comparison.
    #[must_use]
    pub fn compare(&self, original: &Path, replacement: &Path) -> QualityComparison {
        let original_props = self.extract_properties(original);
        let replacement_props = self.extract_properties(replacement);
        match (original_props, replacement_props) {
            (Ok(original), Ok(replacement)) => compare_properties(&original, &replacement),
            (original_props, replacement_props) => {
                if let Err(err) = &original_props {
                    info!(path = %original.display(), error = %err, "original not inspectable");
                }
                if let Err(err) = &replacement_props {
                    info!(
                        path = %replacement.display(),
                        error = %err,
                        "replacement not inspectable"
                    );
                }
                QualityComparison {
                    original: original_props.ok(),
                    replacement: replacement_props.ok(),
                    codec_match: false,
                    duration_match: false,
                    bitrate_acceptable: false,
                    issues: vec![EXTRACTION_FAILED.to_string()],
                    is_better_or_equal: false,
                }
            }
        }
    }
}

/// Compare two sets of already extracted properties.
#[must_use]
pub fn compare_properties(
    original: &AudioProperties,
    replacement: &AudioProperties,
) -> QualityComparison {
    let mut issues = Vec::new();

    let codec_match = original.codec == replacement.codec;
    if !codec_match {
        issues.push(format!(
            "codec mismatch: original {}, replacement {}",
            original.codec, replacement.codec
        ));
    }

    let duration_match =
        duration_within_tolerance(original.duration_secs, replacement.duration_secs);
    if !duration_match {
        issues.push(duration_issue(original.duration_secs, replacement.duration_secs));
    }

    let bitrate_acceptable = match (original.bitrate_bps, replacement.bitrate_bps) {
        (Some(original_bps), Some(replacement_bps)) => {
            bitrate_within_floor(original_bps, replacement_bps)
        }
        (original_bps, replacement_bps) => {
            info!(
                original_bps = ?original_bps,
                replacement_bps = ?replacement_bps,
                "bitrate unknown; not blocking replacement"
            );
            true
        }
    };
    // Exact bps so a near-miss never prints as equal values.
    if let (false, Some(original_bps), Some(replacement_bps)) =
        (bitrate_acceptable, original.bitrate_bps, replacement.bitrate_bps)
    {
        issues.push(format!(
            "bitrate too low: original {original_bps} bps, replacement {replacement_bps} bps"
        ));
    }

    QualityComparison {
        original: Some(original.clone()),
        replacement: Some(replacement.clone()),
        codec_match,
        duration_match,
        bitrate_acceptable,
        issues,
        is_better_or_equal: codec_match && duration_match && bitrate_acceptable,
    }
}

fn duration_within_tolerance(original: f64, replacement: f64) -> bool {
    if original <= 0.0 {
        return false;
    }
    (replacement - original).abs() / original <= DURATION_TOLERANCE
}

fn duration_issue(original: f64, replacement: f64) -> String {
    if original <= 0.0 {
        return format!(
            "duration mismatch: original duration is zero, replacement {replacement:.1}s"
        );
    }
    let drift = (replacement - original).abs() / original * 100.0;
    format!(
        "duration differs by {drift:.1}%: original {original:.1}s, replacement {replacement:.1}s"
    )
}

// Integer form of `replacement >= 0.9 * original`.
fn bitrate_within_floor(original_bps: u64, replacement_bps: u64) -> bool {
    u128::from(replacement_bps) * 10 >= u128::from(original_bps) * 9
}
