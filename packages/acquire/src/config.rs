//! Acquisition settings.
//!
//! One [`AcquisitionConfig`] is built at startup (defaults, optionally
//! overridden by a TOML file) and handed to the orchestrator, which copies
//! it into every worker. Earth Engine credentials are kept apart in
//! [`EarthEngineCredentials`] so they never end up in shard files.

use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Environment variable holding the Earth Engine cloud project.
pub const ENV_PROJECT: &str = "EE_PROJECT";

/// Environment variable holding the OAuth access token.
pub const ENV_ACCESS_TOKEN: &str = "EE_ACCESS_TOKEN";

/// Errors raised while loading or validating a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML for this schema.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("Invalid config: {message}")]
    Invalid {
        /// Description of the offending value.
        message: String,
    },

    /// A required credential is not set.
    #[error("Missing credential: set {variable} or pass it on the command line")]
    MissingCredential {
        /// Environment variable that would provide it.
        variable: &'static str,
    },
}

/// Inclusive start, exclusive end of the imagery acquisition window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First day included.
    pub start: NaiveDate,
    /// First day excluded.
    pub end: NaiveDate,
}

/// Settings shared by the orchestrator and every worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AcquisitionConfig {
    /// Imagery collection to mosaic (e.g., `"USDA/NAIP/DOQQ"`).
    pub collection_id: String,
    /// Acquisition window.
    pub date_range: DateRange,
    /// Band names selected from the mosaic.
    pub bands: Vec<String>,
    /// Ground size of one output pixel, in metres.
    pub scale_m: f64,
    /// Half of the tile width, in degrees of longitude.
    pub half_width_deg: f64,
    /// Half of the tile height, in degrees of latitude.
    pub half_height_deg: f64,
    /// Worker processes (and shards) per region.
    pub workers: usize,
    /// Per-request timeout for the imagery service.
    pub request_timeout_secs: u64,
    /// Retries for transient imagery service failures.
    pub max_retries: u32,
    /// Regions to acquire; empty means every region present.
    pub include_regions: Vec<String>,
    /// Regions to skip.
    pub exclude_regions: Vec<String>,
    /// Earth Engine REST endpoint.
    pub api_base_url: String,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            collection_id: "USDA/NAIP/DOQQ".to_string(),
            date_range: DateRange {
                start: NaiveDate::from_ymd_opt(2010, 1, 1).unwrap_or_default(),
                end: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            },
            bands: vec!["R".to_string(), "G".to_string(), "B".to_string()],
            scale_m: 1.0,
            half_width_deg: 0.01,
            half_height_deg: 0.01,
            workers: 4,
            request_timeout_secs: 300,
            max_retries: 3,
            include_regions: Vec::new(),
            exclude_regions: Vec::new(),
            api_base_url: "https://earthengine.googleapis.com/v1".to_string(),
        }
    }
}

impl AcquisitionConfig {
    /// Loads a config from a TOML file, or the defaults when `path` is
    /// `None`. Missing keys keep their default values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or the
    /// result fails [`Self::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                log::info!("Loaded acquisition config from {}", path.display());
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document without validating it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] if the document does not match the
    /// schema.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| {
            Err(ConfigError::Invalid {
                message: message.to_string(),
            })
        };

        if self.collection_id.trim().is_empty() {
            return invalid("collection_id must not be empty");
        }
        if self.workers == 0 {
            return invalid("workers must be at least 1");
        }
        if self.bands.is_empty() || self.bands.iter().any(|b| b.trim().is_empty()) {
            return invalid("bands must list at least one non-empty band name");
        }
        if !(self.scale_m.is_finite() && self.scale_m > 0.0) {
            return invalid("scale_m must be positive");
        }
        if !(self.half_width_deg.is_finite() && self.half_width_deg > 0.0)
            || !(self.half_height_deg.is_finite() && self.half_height_deg > 0.0)
        {
            return invalid("tile half sizes must be positive");
        }
        if self.date_range.start >= self.date_range.end {
            return invalid("date_range.start must be before date_range.end");
        }
        if self.request_timeout_secs == 0 {
            return invalid("request_timeout_secs must be at least 1");
        }
        Ok(())
    }

    /// Whether `region` passes the include/exclude filters.
    #[must_use]
    pub fn wants_region(&self, region: &str) -> bool {
        let listed = |list: &[String]| list.iter().any(|r| r.trim().eq_ignore_ascii_case(region));
        (self.include_regions.is_empty() || listed(&self.include_regions))
            && !listed(&self.exclude_regions)
    }
}

/// Earth Engine project and bearer token.
#[derive(Clone)]
pub struct EarthEngineCredentials {
    /// Cloud project that owns the requests.
    pub project: String,
    /// OAuth 2.0 access token.
    pub access_token: String,
}

impl std::fmt::Debug for EarthEngineCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EarthEngineCredentials")
            .field("project", &self.project)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

impl EarthEngineCredentials {
    /// Resolves credentials, preferring explicit values over
    /// [`ENV_PROJECT`] and [`ENV_ACCESS_TOKEN`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredential`] if a value is available
    /// from neither source.
    pub fn resolve(
        project: Option<String>,
        access_token: Option<String>,
    ) -> Result<Self, ConfigError> {
        let pick = |explicit: Option<String>, variable: &'static str| {
            explicit
                .or_else(|| std::env::var(variable).ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingCredential { variable })
        };

        Ok(Self {
            project: pick(project, ENV_PROJECT)?,
            access_token: pick(access_token, ENV_ACCESS_TOKEN)?,
        })
    }

    /// Environment pairs that let a child process resolve the same
    /// credentials.
    #[must_use]
    pub fn env_pairs(&self) -> [(&'static str, &str); 2] {
        [
            (ENV_PROJECT, self.project.as_str()),
            (ENV_ACCESS_TOKEN, self.access_token.as_str()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_naip_run() {
        let config = AcquisitionConfig::default();
        assert_eq!(config.collection_id, "USDA/NAIP/DOQQ");
        assert_eq!(config.date_range.start.to_string(), "2010-01-01");
        assert_eq!(config.date_range.end.to_string(), "2024-01-01");
        assert_eq!(config.bands, vec!["R", "G", "B"]);
        assert!((config.scale_m - 1.0).abs() < f64::EPSILON);
        assert!((config.half_width_deg - 0.01).abs() < f64::EPSILON);
        assert_eq!(config.workers, 4);
        assert_eq!(config.request_timeout_secs, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AcquisitionConfig::from_toml_str(
            r#"
            workers = 8
            bands = ["R", "G", "B", "N"]
            exclude_regions = ["AK"]

            [date_range]
            start = "2018-01-01"
            end = "2020-01-01"
            "#,
        )
        .unwrap();

        assert_eq!(config.workers, 8);
        assert_eq!(config.bands.len(), 4);
        assert_eq!(config.date_range.start.to_string(), "2018-01-01");
        assert_eq!(config.collection_id, "USDA/NAIP/DOQQ");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            AcquisitionConfig::from_toml_str("wrokers = 3"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let cases: Vec<fn(&mut AcquisitionConfig)> = vec![
            |c| c.workers = 0,
            |c| c.bands.clear(),
            |c| c.scale_m = 0.0,
            |c| c.half_height_deg = -0.01,
            |c| c.date_range.end = c.date_range.start,
            |c| c.request_timeout_secs = 0,
            |c| c.collection_id = " ".to_string(),
        ];
        for mutate in cases {
            let mut config = AcquisitionConfig::default();
            mutate(&mut config);
            assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
        }
    }

    #[test]
    fn region_filters() {
        let mut config = AcquisitionConfig::default();
        assert!(config.wants_region("CA"));

        config.exclude_regions = vec!["ak".to_string()];
        assert!(!config.wants_region("AK"));
        assert!(config.wants_region("CA"));

        config.include_regions = vec!["CA".to_string(), "AK".to_string()];
        assert!(config.wants_region("CA"));
        assert!(!config.wants_region("TX"));
        assert!(!config.wants_region("AK"));
    }

    #[test]
    fn explicit_credentials_win() {
        let creds =
            EarthEngineCredentials::resolve(Some("proj".to_string()), Some(" tok ".to_string()))
                .unwrap();
        assert_eq!(creds.project, "proj");
        assert_eq!(creds.access_token, "tok");
        assert!(!format!("{creds:?}").contains("tok\""));
    }
}
