use crate::config::InstallationConfig;
use crate::core::{FrameworkError, Result};
use std::sync::Mutex;

/// Receives errors that developers need to hear about
pub trait ErrorReporter: Send + Sync {
    fn report_error(&self, prefix: &str, error: Option<&FrameworkError>);
}

/// Writes reports to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report_error(&self, prefix: &str, error: Option<&FrameworkError>) {
        match error {
            Some(error) => log::error!("{} {}", prefix, error),
            None => log::error!("{}", prefix),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub prefix: String,
    pub message: Option<String>,
}

/// Keeps every report in memory
#[derive(Debug, Default)]
pub struct CollectingReporter {
    reports: Mutex<Vec<ErrorReport>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports
            .lock()
            .map(|reports| reports.clone())
            .unwrap_or_default()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report_error(&self, prefix: &str, error: Option<&FrameworkError>) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(ErrorReport {
                prefix: prefix.to_string(),
                message: error.map(|e| e.to_string()),
            });
        }
    }
}

/// Fail in development; elsewhere report the problem and carry on
pub fn report_developer_error(
    installation: &InstallationConfig,
    reporter: &dyn ErrorReporter,
    message: impl Into<String>,
) -> Result<()> {
    let message = message.into();
    if installation.is_development() {
        return Err(FrameworkError::Developer(message));
    }

    tracing::warn!(%message, "developer error reported");
    reporter.report_error(&message, None);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstallationType;

    #[test]
    fn test_developer_error_is_fatal_in_development() {
        let reporter = CollectingReporter::new();
        let result = report_developer_error(
            &InstallationConfig::development("test"),
            &reporter,
            "two default buttons",
        );
        assert!(matches!(result, Err(FrameworkError::Developer(_))));
        assert!(reporter.reports().is_empty());
    }

    #[test]
    fn test_developer_error_is_reported_when_live() {
        let reporter = CollectingReporter::new();
        report_developer_error(
            &InstallationConfig::new("test", InstallationType::Live),
            &reporter,
            "two default buttons",
        )
        .unwrap();
        assert_eq!(
            reporter.reports(),
            vec![ErrorReport {
                prefix: "two default buttons".into(),
                message: None
            }]
        );
    }
}
