//! Issue registry
//!
//! Issues are actionable notices shown in the repairs dashboard. A fixable
//! issue can be resolved through the owning integration's fix flow, after
//! which the host deletes it. All operations are idempotent.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Severity of an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Critical,
    Error,
    Warning,
}

/// A single issue, keyed by `(domain, issue_id)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    /// Integration that owns the issue
    pub domain: String,
    /// Identifier unique within the domain
    pub issue_id: String,
    /// Whether the integration provides a fix flow for it
    pub is_fixable: bool,
    pub severity: IssueSeverity,
    /// Key of the translated title/description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation_key: Option<String>,
    /// Extra data handed to the fix flow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// First time the issue was raised
    pub created: DateTime<Utc>,
}

impl Issue {
    /// Create a non-fixable warning issue
    pub fn new(domain: impl Into<String>, issue_id: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            issue_id: issue_id.into(),
            is_fixable: false,
            severity: IssueSeverity::Warning,
            translation_key: None,
            data: None,
            created: Utc::now(),
        }
    }

    pub fn fixable(mut self, is_fixable: bool) -> Self {
        self.is_fixable = is_fixable;
        self
    }

    pub fn severity(mut self, severity: IssueSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn translation_key(mut self, key: impl Into<String>) -> Self {
        self.translation_key = Some(key.into());
        self
    }
}

/// Registry of active issues
#[derive(Debug, Default)]
pub struct IssueRegistry {
    issues: DashMap<(String, String), Issue>,
}

impl IssueRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or update an issue
    ///
    /// Returns true if the issue did not exist yet. Re-raising an existing
    /// issue keeps its original creation time.
    pub fn create(&self, mut issue: Issue) -> bool {
        let key = (issue.domain.clone(), issue.issue_id.clone());

        if let Some(created) = self.issues.get(&key).map(|existing| existing.created) {
            issue.created = created;
        }
        let is_new = self.issues.insert(key, issue.clone()).is_none();

        if is_new {
            info!(domain = %issue.domain, issue_id = %issue.issue_id, "Created issue");
        } else {
            debug!(domain = %issue.domain, issue_id = %issue.issue_id, "Updated issue");
        }
        is_new
    }

    /// Delete an issue
    ///
    /// Returns the deleted issue if it existed; deleting a missing issue is a no-op.
    pub fn delete(&self, domain: &str, issue_id: &str) -> Option<Issue> {
        let removed = self
            .issues
            .remove(&(domain.to_string(), issue_id.to_string()))
            .map(|(_, issue)| issue);

        if removed.is_some() {
            info!(domain = %domain, issue_id = %issue_id, "Deleted issue");
        }
        removed
    }

    /// Get an issue
    pub fn get(&self, domain: &str, issue_id: &str) -> Option<Issue> {
        self.issues
            .get(&(domain.to_string(), issue_id.to_string()))
            .map(|r| r.value().clone())
    }

    /// All issues owned by a domain
    pub fn issues_for_domain(&self, domain: &str) -> Vec<Issue> {
        self.issues
            .iter()
            .filter(|r| r.key().0 == domain)
            .map(|r| r.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}
