//! Coordinator configuration.

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Label added to log records (e.g. the request or handler name).
    pub name: Option<String>,
    /// Roll back participants when an unfinalized coordinator is dropped.
    pub rollback_on_drop: bool,
    /// Emit a warning when an unfinalized coordinator is dropped.
    pub warn_on_unfinalized_drop: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            name: None,
            rollback_on_drop: true,
            warn_on_unfinalized_drop: true,
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("UNITWORK_NAME") {
            config.name = Some(name);
        }

        if let Ok(flag) = std::env::var("UNITWORK_ROLLBACK_ON_DROP") {
            if let Ok(flag) = flag.parse() {
                config.rollback_on_drop = flag;
            }
        }

        if let Ok(flag) = std::env::var("UNITWORK_WARN_ON_UNFINALIZED_DROP") {
            if let Ok(flag) = flag.parse() {
                config.warn_on_unfinalized_drop = flag;
            }
        }

        config
    }

    /// Set the log label.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err("Coordinator name cannot be blank".to_string());
            }
        }

        Ok(())
    }

    /// Label used in log records.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("unitwork")
    }
}
