//! Interpretation options and configuration.

use crate::geometry::{BboxOrigin, ResolverConfig};

/// Default product name stamped into `/Processor`.
pub const DEFAULT_PROCESSOR_NAME: &str = "pdfremedy";

/// Options for executing an instruction set against a document.
#[derive(Debug, Clone)]
pub struct InterpretOptions {
    /// Error handling mode
    pub error_mode: ErrorMode,

    /// Region matching policy
    pub resolver: ResolverConfig,

    /// Product name for the `/Processor` stamp
    pub processor_name: String,

    /// Product version for the `/Processor` stamp
    pub processor_version: String,

    /// Whether to set `/ModDate` in the info dictionary
    pub stamp_mod_date: bool,

    /// Whether authored streams are Flate-compressed
    pub compress_streams: bool,

    /// OCR words below this confidence are skipped
    pub ocr_min_confidence: f64,
}

impl InterpretOptions {
    /// Create new interpret options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set error mode.
    pub fn with_error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }

    /// Enable lenient mode (unmatched regions are logged and skipped).
    pub fn lenient(mut self) -> Self {
        self.error_mode = ErrorMode::Lenient;
        self
    }

    /// Set the resolver configuration.
    pub fn with_resolver(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = resolver;
        self
    }

    /// Read declared boxes with a top-left origin.
    pub fn top_left_origin(mut self) -> Self {
        self.resolver = self.resolver.with_origin(BboxOrigin::TopLeft);
        self
    }

    /// Set the product name and version stamped into `/Processor`.
    pub fn with_processor(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.processor_name = name.into();
        self.processor_version = version.into();
        self
    }

    /// Enable or disable `/ModDate` stamping.
    pub fn with_mod_date(mut self, stamp: bool) -> Self {
        self.stamp_mod_date = stamp;
        self
    }

    /// Enable or disable stream compression.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress_streams = compress;
        self
    }

    /// Set the OCR confidence threshold (0..=1).
    pub fn with_ocr_min_confidence(mut self, confidence: f64) -> Self {
        self.ocr_min_confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// `"<name> <version>"` as written to `/Processor`.
    pub fn processor(&self) -> String {
        format!("{} {}", self.processor_name, self.processor_version)
            .trim()
            .to_string()
    }
}

impl Default for InterpretOptions {
    fn default() -> Self {
        Self {
            error_mode: ErrorMode::Strict,
            resolver: ResolverConfig::default(),
            processor_name: DEFAULT_PROCESSOR_NAME.to_string(),
            processor_version: env!("CARGO_PKG_VERSION").to_string(),
            stamp_mod_date: true,
            compress_streams: true,
            ocr_min_confidence: 0.0,
        }
    }
}

/// Error handling mode while applying instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Fail when a declared region matches no content
    #[default]
    Strict,
    /// Log unmatched regions and continue
    Lenient,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpret_options_builder() {
        let options = InterpretOptions::new()
            .lenient()
            .top_left_origin()
            .with_processor("Acme Remediator", "2.1")
            .with_compression(false)
            .with_ocr_min_confidence(1.5);

        assert_eq!(options.error_mode, ErrorMode::Lenient);
        assert_eq!(options.resolver.origin, BboxOrigin::TopLeft);
        assert_eq!(options.processor(), "Acme Remediator 2.1");
        assert!(!options.compress_streams);
        assert_eq!(options.ocr_min_confidence, 1.0);
    }

    #[test]
    fn test_default_options() {
        let options = InterpretOptions::default();
        assert_eq!(options.error_mode, ErrorMode::Strict);
        assert!(options.processor().starts_with("pdfremedy "));
        assert!(options.stamp_mod_date);
    }
}
