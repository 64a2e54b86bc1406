//! Application-wide pipeline configuration
//!
//! Global enhancers are live instances registered at bootstrap; they are
//! never resolved through the container. Settings are plain data and can
//! be loaded from YAML or JSON.

use crate::error::{PipelineError, PipelineResult};
use crate::guards::CanActivate;
use crate::interceptors::Interceptor;
use crate::logging::LoggingConfig;
use crate::pipes::PipeTransform;
use ouroboros_common::HttpStatus;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// Tunables read by the context creators
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Status used for redirects that declare none
    pub default_redirect_status: u16,
    /// Content type set when an interceptor renders a view to a string
    pub html_content_type: String,
    pub logging: LoggingConfig,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            default_redirect_status: HttpStatus::FOUND.code(),
            html_content_type: "text/html; charset=utf-8".to_string(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineSettings {
    pub fn from_yaml_str(source: &str) -> PipelineResult<Self> {
        serde_yaml::from_str(source)
            .map_err(|e| PipelineError::Configuration(format!("Invalid pipeline settings: {}", e)))
    }

    pub fn from_json_str(source: &str) -> PipelineResult<Self> {
        serde_json::from_str(source)
            .map_err(|e| PipelineError::Configuration(format!("Invalid pipeline settings: {}", e)))
    }
}

/// Global enhancers plus settings
#[derive(Clone, Default)]
pub struct ApplicationConfig {
    global_guards: Vec<Arc<dyn CanActivate>>,
    global_pipes: Vec<Arc<dyn PipeTransform>>,
    global_interceptors: Vec<Arc<dyn Interceptor>>,
    pub settings: PipelineSettings,
}

impl ApplicationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn use_global_guard<G: CanActivate + 'static>(mut self, guard: G) -> Self {
        self.global_guards.push(Arc::new(guard));
        self
    }

    pub fn use_global_pipe<P: PipeTransform + 'static>(mut self, pipe: P) -> Self {
        self.global_pipes.push(Arc::new(pipe));
        self
    }

    pub fn use_global_interceptor<I: Interceptor + 'static>(mut self, interceptor: I) -> Self {
        self.global_interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn global_guards(&self) -> &[Arc<dyn CanActivate>] {
        &self.global_guards
    }

    pub fn global_pipes(&self) -> &[Arc<dyn PipeTransform>] {
        &self.global_pipes
    }

    pub fn global_interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.global_interceptors
    }
}

impl fmt::Debug for ApplicationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationConfig")
            .field("global_guards", &self.global_guards.len())
            .field("global_pipes", &self.global_pipes.len())
            .field("global_interceptors", &self.global_interceptors.len())
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipes::ParseIntPipe;

    #[test]
    fn test_settings_defaults() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.default_redirect_status, 302);
        assert_eq!(settings.html_content_type, "text/html; charset=utf-8");
        assert!(!settings.logging.json);
    }

    #[test]
    fn test_settings_from_yaml() {
        let settings = PipelineSettings::from_yaml_str(
            "default_redirect_status: 307\nlogging:\n  filter: debug\n  json: true\n",
        )
        .unwrap();
        assert_eq!(settings.default_redirect_status, 307);
        assert_eq!(settings.html_content_type, "text/html; charset=utf-8");
        assert_eq!(settings.logging.filter, "debug");
        assert!(settings.logging.json);
    }

    #[test]
    fn test_settings_from_json() {
        let settings = PipelineSettings::from_json_str(r#"{"html_content_type": "text/html"}"#).unwrap();
        assert_eq!(settings.html_content_type, "text/html");
        assert_eq!(settings.default_redirect_status, 302);

        let err = PipelineSettings::from_json_str(r#"{"default_redirect_status": "x"}"#).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn test_global_enhancers() {
        let config = ApplicationConfig::new().use_global_pipe(ParseIntPipe).use_global_pipe(ParseIntPipe);
        assert_eq!(config.global_pipes().len(), 2);
        assert!(config.global_guards().is_empty());
        assert!(config.global_interceptors().is_empty());
    }
}
