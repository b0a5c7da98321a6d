//! Shared handler state and the health endpoint.

use std::env;
use std::str::FromStr;
use std::sync::Arc;

use axum::Json;

use crate::infrastructure::{ConfigurationError, DocumentStore, ReferenceSynchronizer};

/// Page size applied to `GET /tasks` when the client sends no `limit`.
pub const DEFAULT_TASK_LIMIT: usize = 100;

// =============================================================================
// Application Configuration
// =============================================================================

/// How `PUT /users/{id}` treats task ids added to `pendingTasks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserUpdatePolicy {
    /// Reject the update if an added task is completed or assigned to
    /// another user.
    #[default]
    Checked,
    /// Save the update as sent and reassign the added tasks.
    Unchecked,
}

impl FromStr for UserUpdatePolicy {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "checked" => Ok(Self::Checked),
            "unchecked" => Ok(Self::Unchecked),
            _ => Err(ConfigurationError::InvalidUserUpdatePolicy(value.to_string())),
        }
    }
}

/// Application configuration for runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Limit applied to task listings without `limit`; `None` is unlimited.
    pub task_default_limit: Option<usize>,
    /// Limit applied to user listings without `limit`; `None` is unlimited.
    pub user_default_limit: Option<usize>,
    pub user_update_policy: UserUpdatePolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            task_default_limit: Some(DEFAULT_TASK_LIMIT),
            user_default_limit: None,
            user_update_policy: UserUpdatePolicy::default(),
        }
    }
}

impl AppConfig {
    /// Reads `USER_UPDATE_POLICY` on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidUserUpdatePolicy` for an unknown
    /// policy name.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        let user_update_policy = match env::var("USER_UPDATE_POLICY") {
            Ok(value) if !value.trim().is_empty() => value.parse()?,
            _ => UserUpdatePolicy::default(),
        };
        Ok(Self {
            user_update_policy,
            ..Self::default()
        })
    }
}

// =============================================================================
// Application State
// =============================================================================

/// Shared application dependencies.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    /// Issues the secondary writes that follow task and user mutations.
    pub synchronizer: ReferenceSynchronizer,
    pub config: AppConfig,
}

impl AppState {
    /// Creates a state over `store` with the default configuration.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_config(store, AppConfig::default())
    }

    #[must_use]
    pub fn with_config(store: Arc<dyn DocumentStore>, config: AppConfig) -> Self {
        Self {
            synchronizer: ReferenceSynchronizer::new(Arc::clone(&store)),
            store,
            config,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AppState")
            .field("synchronizer", &self.synchronizer)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// GET /health Handler
// =============================================================================

/// Health check response body.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Reports that the service is running.
///
/// ```json
/// { "status": "healthy", "version": "0.1.0" }
/// ```
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::InMemoryDocumentStore;
    use rstest::rstest;

    #[rstest]
    #[case("checked", UserUpdatePolicy::Checked)]
    #[case("UNCHECKED", UserUpdatePolicy::Unchecked)]
    #[case(" unchecked ", UserUpdatePolicy::Unchecked)]
    fn test_user_update_policy_from_str(#[case] input: &str, #[case] expected: UserUpdatePolicy) {
        assert_eq!(input.parse::<UserUpdatePolicy>(), Ok(expected));
    }

    #[rstest]
    fn test_user_update_policy_rejects_unknown() {
        assert_eq!(
            "strict".parse::<UserUpdatePolicy>(),
            Err(ConfigurationError::InvalidUserUpdatePolicy("strict".to_string()))
        );
    }

    #[rstest]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.task_default_limit, Some(100));
        assert_eq!(config.user_default_limit, None);
        assert_eq!(config.user_update_policy, UserUpdatePolicy::Checked);
    }

    #[rstest]
    fn test_app_state_starts_idle() {
        let state = AppState::new(Arc::new(InMemoryDocumentStore::new()));
        assert_eq!(state.synchronizer.in_flight(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_health_check() {
        let Json(response) = health_check().await;
        assert_eq!(response.status, "healthy");
        assert_eq!(response.version, env!("CARGO_PKG_VERSION"));
    }
}
