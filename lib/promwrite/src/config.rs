//! Configuration.
use std::{borrow::Cow, time::Duration};

use figment::{
    error::Kind,
    providers::{Env, Serialized},
    Figment, Provider,
};
use http::Uri;
use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// Prefix for environment variables that configure the exporter.
pub const ENV_PREFIX: &str = "PROMWRITE_";

const fn default_flush_interval_secs() -> u64 {
    5
}

/// A configuration error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum ConfigurationError {
    /// Requested field was missing from the configuration.
    #[snafu(display(
        "Missing field '{}' in configuration. It can be set with the '{}{}' environment variable.",
        field,
        ENV_PREFIX,
        field.to_uppercase()
    ))]
    MissingField {
        /// Name of the missing field.
        field: Cow<'static, str>,
    },

    /// Requested field's data type was not the expected data type.
    #[snafu(display(
        "Expected value for field '{}' to be '{}', got '{}' instead.",
        field,
        expected_ty,
        actual_ty
    ))]
    InvalidFieldType {
        /// Name of the invalid field.
        field: String,

        /// Expected data type.
        expected_ty: String,

        /// Actual data type.
        actual_ty: String,
    },

    /// A field had a value of the right type, but outside of the accepted range.
    #[snafu(display("Invalid value for field '{}': {}", field, reason))]
    InvalidValue {
        /// Name of the invalid field.
        field: &'static str,

        /// Why the value was rejected.
        reason: String,
    },

    /// The remote write endpoint is not a usable HTTP URL.
    #[snafu(display("Invalid remote write endpoint '{}': {}", endpoint, reason))]
    InvalidEndpoint {
        /// The endpoint as given.
        endpoint: String,

        /// Why the endpoint was rejected.
        reason: String,
    },

    /// The TLS client configuration could not be built.
    #[snafu(display("Failed to build TLS client configuration: {}", source))]
    Tls {
        /// Error source.
        source: rustls::Error,
    },

    /// Generic configuration error.
    #[snafu(display("Failed to load configuration: {}", source))]
    Generic {
        /// Error source.
        source: figment::Error,
    },
}

impl From<figment::Error> for ConfigurationError {
    fn from(e: figment::Error) -> Self {
        match e.kind {
            Kind::MissingField(field) => Self::MissingField { field },
            Kind::InvalidType(actual_ty, expected_ty) => Self::InvalidFieldType {
                field: e.path.join("."),
                expected_ty,
                actual_ty: actual_ty.to_string(),
            },
            _ => Self::Generic { source: e },
        }
    }
}

/// Remote write exporter configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RemoteWriteConfiguration {
    /// URL of the remote write endpoint.
    ///
    /// Must be an `http` or `https` URL.
    pub remote_write_url: String,

    /// How often to export metrics, in seconds.
    ///
    /// Defaults to 5 seconds.
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Maximum time to wait for the remote endpoint to respond to a write request, in seconds.
    ///
    /// Defaults to no timeout.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Prefix prepended to the name of every metric recorded by the application.
    ///
    /// Defaults to no prefix.
    #[serde(default)]
    pub metrics_prefix: Option<String>,
}

impl RemoteWriteConfiguration {
    /// Loads the configuration from the environment.
    ///
    /// Every field can be set with an environment variable named after the field, in uppercase, prefixed with
    /// `PROMWRITE_`: `PROMWRITE_REMOTE_WRITE_URL`, `PROMWRITE_FLUSH_INTERVAL_SECS`, and so on.
    ///
    /// # Errors
    ///
    /// If a required field is missing, or any field is invalid, an error will be returned.
    pub fn from_environment() -> Result<Self, ConfigurationError> {
        Self::from_figment(&Figment::new().merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Loads the configuration from the environment, with the values in `overrides` taking precedence.
    ///
    /// Fields that `overrides` doesn't serialize (such as `None` values skipped during serialization) fall back to
    /// the environment, and then to their defaults.
    ///
    /// # Errors
    ///
    /// If a required field is missing, or any field is invalid, an error will be returned.
    pub fn from_environment_with_overrides<T>(overrides: &T) -> Result<Self, ConfigurationError>
    where
        T: Serialize,
    {
        let figment = Figment::new()
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(overrides));
        Self::from_figment(&figment)
    }

    /// Loads the configuration from an arbitrary provider.
    ///
    /// # Errors
    ///
    /// If a required field is missing, or any field is invalid, an error will be returned.
    pub fn from_provider<P>(provider: P) -> Result<Self, ConfigurationError>
    where
        P: Provider,
    {
        Self::from_figment(&Figment::from(provider))
    }

    fn from_figment(figment: &Figment) -> Result<Self, ConfigurationError> {
        let config = figment.extract::<Self>()?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        parse_endpoint(&self.remote_write_url)?;

        if self.flush_interval_secs == 0 {
            return InvalidValue {
                field: "flush_interval_secs",
                reason: "must be greater than zero",
            }
            .fail();
        }

        if self.request_timeout_secs == Some(0) {
            return InvalidValue {
                field: "request_timeout_secs",
                reason: "must be greater than zero when set",
            }
            .fail();
        }

        Ok(())
    }

    /// Returns the interval between exports.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    /// Returns the per-request timeout, if any.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// Parses a remote write endpoint.
///
/// # Errors
///
/// If `endpoint` is not an absolute `http` or `https` URL, an error will be returned.
pub fn parse_endpoint(endpoint: &str) -> Result<Uri, ConfigurationError> {
    let uri = endpoint.parse::<Uri>().map_err(|e| ConfigurationError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;

    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        Some(scheme) => {
            return InvalidEndpoint {
                endpoint,
                reason: format!("unsupported scheme '{}'", scheme),
            }
            .fail()
        }
        None => {
            return InvalidEndpoint {
                endpoint,
                reason: "missing scheme",
            }
            .fail()
        }
    }

    if uri.authority().is_none() {
        return InvalidEndpoint {
            endpoint,
            reason: "missing host",
        }
        .fail();
    }

    Ok(uri)
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    #[derive(Serialize)]
    struct Overrides {
        #[serde(skip_serializing_if = "Option::is_none")]
        remote_write_url: Option<String>,

        #[serde(skip_serializing_if = "Option::is_none")]
        flush_interval_secs: Option<u64>,
    }

    #[test]
    fn defaults() {
        Jail::expect_with(|jail| {
            jail.set_env("PROMWRITE_REMOTE_WRITE_URL", "http://localhost:9090/api/v1/write");

            let config = RemoteWriteConfiguration::from_environment().unwrap();
            assert_eq!(config.remote_write_url, "http://localhost:9090/api/v1/write");
            assert_eq!(config.flush_interval(), Duration::from_secs(5));
            assert_eq!(config.request_timeout(), None);
            assert_eq!(config.metrics_prefix, None);

            Ok(())
        });
    }

    #[test]
    fn overrides_take_precedence_over_environment() {
        Jail::expect_with(|jail| {
            jail.set_env("PROMWRITE_REMOTE_WRITE_URL", "http://env:9090/api/v1/write");
            jail.set_env("PROMWRITE_FLUSH_INTERVAL_SECS", "30");
            jail.set_env("PROMWRITE_REQUEST_TIMEOUT_SECS", "10");

            let overrides = Overrides {
                remote_write_url: Some("https://cli:9090/api/v1/write".to_string()),
                flush_interval_secs: None,
            };
            let config = RemoteWriteConfiguration::from_environment_with_overrides(&overrides).unwrap();
            assert_eq!(config.remote_write_url, "https://cli:9090/api/v1/write");
            assert_eq!(config.flush_interval(), Duration::from_secs(30));
            assert_eq!(config.request_timeout(), Some(Duration::from_secs(10)));

            Ok(())
        });
    }

    #[test]
    fn missing_url() {
        Jail::expect_with(|_| {
            let result = RemoteWriteConfiguration::from_environment();
            match result {
                Err(ConfigurationError::MissingField { field }) => assert_eq!(field, "remote_write_url"),
                other => panic!("expected missing field error, got {:?}", other),
            }

            Ok(())
        });
    }

    #[test]
    fn zero_interval_is_rejected() {
        let result = RemoteWriteConfiguration::from_provider(Serialized::defaults(Overrides {
            remote_write_url: Some("http://localhost:9090/api/v1/write".to_string()),
            flush_interval_secs: Some(0),
        }));

        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidValue {
                field: "flush_interval_secs",
                ..
            })
        ));
    }

    #[derive(Serialize)]
    struct TimeoutOverrides {
        remote_write_url: String,
        request_timeout_secs: u64,
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let result = RemoteWriteConfiguration::from_provider(Serialized::defaults(TimeoutOverrides {
            remote_write_url: "http://localhost:9090/api/v1/write".to_string(),
            request_timeout_secs: 0,
        }));

        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidValue {
                field: "request_timeout_secs",
                ..
            })
        ));

        let config = RemoteWriteConfiguration::from_provider(Serialized::defaults(TimeoutOverrides {
            remote_write_url: "http://localhost:9090/api/v1/write".to_string(),
            request_timeout_secs: 3,
        }))
        .unwrap();
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn wrong_type_is_reported() {
        Jail::expect_with(|jail| {
            jail.set_env("PROMWRITE_REMOTE_WRITE_URL", "http://localhost:9090/api/v1/write");
            jail.set_env("PROMWRITE_FLUSH_INTERVAL_SECS", "soon");

            let result = RemoteWriteConfiguration::from_environment();
            assert!(matches!(result, Err(ConfigurationError::InvalidFieldType { .. })));

            Ok(())
        });
    }

    #[test]
    fn endpoints() {
        assert!(parse_endpoint("http://localhost:9090/api/v1/write").is_ok());
        assert!(parse_endpoint("https://prometheus.example.com/api/v1/write").is_ok());
        assert!(parse_endpoint("localhost:9090").is_err());
        assert!(parse_endpoint("/api/v1/write").is_err());
        assert!(parse_endpoint("ftp://localhost/write").is_err());
        assert!(parse_endpoint("not a url").is_err());
    }
}
