//! Weaver configuration.
//!
//! [`WeaverConfig`] controls which namespace holds the marker vocabulary, how debug
//! information is maintained and how warnings and parallelism are handled. It can be
//! built in code or parsed from the host's XML configuration element:
//!
//! ```rust
//! use cilweave::{SequencePointMode, WeaverConfig};
//!
//! let config = WeaverConfig::from_xml(r#"<InlineIL SequencePoints="Release" WarningsAsErrors="true" />"#)?;
//! assert_eq!(config.sequence_points, SequencePointMode::Release);
//! assert!(config.warnings_as_errors);
//! # Ok::<(), cilweave::Error>(())
//! ```

use std::str::FromStr;

use quick_xml::{events::Event, Reader};

use crate::{Error, Result};

/// When sequence points are maintained for rewritten call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequencePointMode {
    /// Only for modules compiled without optimizations
    #[default]
    Debug,
    /// Only for modules compiled with optimizations
    Release,
    /// Always
    True,
    /// Never
    False,
}

impl SequencePointMode {
    /// Whether sequence points are maintained for a module with the given optimization setting.
    #[must_use]
    pub fn enabled(self, optimized: bool) -> bool {
        match self {
            SequencePointMode::Debug => !optimized,
            SequencePointMode::Release => optimized,
            SequencePointMode::True => true,
            SequencePointMode::False => false,
        }
    }
}

impl FromStr for SequencePointMode {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "debug" => Ok(SequencePointMode::Debug),
            "release" => Ok(SequencePointMode::Release),
            "true" => Ok(SequencePointMode::True),
            "false" => Ok(SequencePointMode::False),
            _ => Err(Error::Config(format!(
                "Invalid SequencePoints value: {value} (expected Debug, Release, True or False)"
            ))),
        }
    }
}

/// Configuration of a weaving pass.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct WeaverConfig {
    /// Namespace holding the marker vocabulary.
    pub marker_namespace: String,
    /// When sequence points are maintained for rewritten call sites.
    pub sequence_points: SequencePointMode,
    /// Report warnings as errors, failing the affected methods.
    pub warnings_as_errors: bool,
    /// Weave the methods of a module concurrently.
    pub parallel: bool,
    /// Reject unsafe uses of the raw-value push primitive.
    pub validate_push: bool,
}

impl Default for WeaverConfig {
    fn default() -> Self {
        Self {
            marker_namespace: "InlineIL".to_string(),
            sequence_points: SequencePointMode::Debug,
            warnings_as_errors: false,
            parallel: false,
            validate_push: true,
        }
    }
}

impl WeaverConfig {
    /// Sets the marker namespace.
    #[must_use]
    pub fn with_marker_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.marker_namespace = namespace.into();
        self
    }

    /// Sets the sequence point mode.
    #[must_use]
    pub fn with_sequence_points(mut self, mode: SequencePointMode) -> Self {
        self.sequence_points = mode;
        self
    }

    /// Treats warnings as errors.
    #[must_use]
    pub fn with_warnings_as_errors(mut self, enabled: bool) -> Self {
        self.warnings_as_errors = enabled;
        self
    }

    /// Enables parallel weaving.
    #[must_use]
    pub fn with_parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    /// Enables or disables push validation.
    #[must_use]
    pub fn with_validate_push(mut self, enabled: bool) -> Self {
        self.validate_push = enabled;
        self
    }

    /// Parses the first element of `xml`; its attributes override the defaults.
    ///
    /// Recognized attributes: `SequencePoints`, `WarningsAsErrors`, `Parallel`,
    /// `ValidatePush` and `MarkerNamespace`. Unknown attributes are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for malformed XML, a missing element or invalid values.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        loop {
            match reader.read_event() {
                Ok(Event::Start(element) | Event::Empty(element)) => {
                    let mut config = WeaverConfig::default();
                    for attribute in element.attributes() {
                        let attribute = attribute.map_err(|e| Error::Config(e.to_string()))?;
                        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
                        let value = attribute
                            .unescape_value()
                            .map_err(|e| Error::Config(e.to_string()))?;
                        config.apply(&key, value.trim())?;
                    }
                    return Ok(config);
                }
                Ok(Event::Eof) => {
                    return Err(Error::Config(
                        "no configuration element found".to_string(),
                    ))
                }
                Ok(_) => {}
                Err(error) => return Err(Error::Config(error.to_string())),
            }
        }
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "SequencePoints" => self.sequence_points = value.parse()?,
            "WarningsAsErrors" => self.warnings_as_errors = parse_bool(key, value)?,
            "Parallel" => self.parallel = parse_bool(key, value)?,
            "ValidatePush" => self.validate_push = parse_bool(key, value)?,
            "MarkerNamespace" => {
                if value.is_empty() {
                    return Err(Error::Config("MarkerNamespace cannot be empty".to_string()));
                }
                self.marker_namespace = value.to_string();
            }
            _ => log::debug!("ignoring unknown configuration attribute {key}"),
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(Error::Config(format!(
            "Invalid {key} value: {value} (expected true or false)"
        ))),
    }
}
