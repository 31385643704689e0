//! Consent gate: maps a student identifier to a consent level
//!
//! The gate is a pure lookup over an opaque identity/consent directory.
//! Under-granting trust is safe and over-granting is not, so a missing
//! profile defaults to the most restrictive level unless the directory
//! vouches for the session, and an ambiguous answer about the session
//! never widens access.

use crate::error::{PaideiaError, Result};
use crate::types::{ConsentLevel, Student};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Consent profile as recorded by the identity collaborator
#[derive(Debug, Clone)]
pub struct ConsentProfile {
    pub consent_level: ConsentLevel,
    pub session_purpose: Option<String>,
    pub data_sharing_scope: BTreeMap<String, bool>,
}

/// Identity/consent lookup contract
///
/// May be backed by a relational store; the gate treats it as opaque.
/// A transport failure from `lookup` is fatal for the request and must
/// not be mistaken for "student has no profile".
#[async_trait]
pub trait ConsentDirectory: Send + Sync {
    /// Fetch the stored consent profile, if one exists
    async fn lookup(&self, student_id: &str) -> Result<Option<ConsentProfile>>;

    /// Whether the current caller context is an authenticated session
    async fn session_authenticated(&self, student_id: &str) -> Result<bool>;
}

/// Resolves students for the pipeline; no caching, no retries
pub struct ConsentGate {
    directory: Arc<dyn ConsentDirectory>,
}

impl ConsentGate {
    pub fn new(directory: Arc<dyn ConsentDirectory>) -> Self {
        Self { directory }
    }

    /// Resolve a student identifier to a session-scoped [`Student`]
    pub async fn resolve(&self, student_id: &str) -> Result<Student> {
        let profile = self
            .directory
            .lookup(student_id)
            .await
            .map_err(|e| PaideiaError::ConsentResolution(e.to_string()))?;

        if let Some(profile) = profile {
            debug!(student_id, level = ?profile.consent_level, "Resolved consent profile");
            return Ok(Student {
                student_id: student_id.to_string(),
                consent_level: profile.consent_level,
                session_purpose: profile.session_purpose,
                data_sharing_scope: profile.data_sharing_scope,
            });
        }

        // No stored profile. The permissive default applies only to
        // authenticated sessions; if the directory can't say, stay
        // restrictive rather than widening access on uncertainty.
        let authenticated = match self.directory.session_authenticated(student_id).await {
            Ok(authenticated) => authenticated,
            Err(e) => {
                warn!(student_id, error = %e, "Session authentication check failed, treating as unauthenticated");
                false
            }
        };

        let consent_level = if authenticated {
            ConsentLevel::FullProfile
        } else {
            ConsentLevel::MinimalPseudonymous
        };

        debug!(student_id, authenticated, level = ?consent_level, "Defaulted consent level");

        Ok(Student {
            student_id: student_id.to_string(),
            consent_level,
            session_purpose: None,
            data_sharing_scope: default_sharing_scope(consent_level),
        })
    }
}

/// Sharing permissions implied by a defaulted consent level
fn default_sharing_scope(level: ConsentLevel) -> BTreeMap<String, bool> {
    let permitted = level.permits_personalization();
    BTreeMap::from([
        ("personal_data".to_string(), permitted),
        ("cross_student_patterns".to_string(), permitted),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDirectory {
        profile: Option<ConsentProfile>,
        authenticated: Result<bool>,
        fail_lookup: bool,
    }

    #[async_trait]
    impl ConsentDirectory for FixedDirectory {
        async fn lookup(&self, _student_id: &str) -> Result<Option<ConsentProfile>> {
            if self.fail_lookup {
                return Err(PaideiaError::Other("directory unreachable".to_string()));
            }
            Ok(self.profile.clone())
        }

        async fn session_authenticated(&self, _student_id: &str) -> Result<bool> {
            match &self.authenticated {
                Ok(v) => Ok(*v),
                Err(_) => Err(PaideiaError::Other("auth check failed".to_string())),
            }
        }
    }

    fn gate(directory: FixedDirectory) -> ConsentGate {
        ConsentGate::new(Arc::new(directory))
    }

    #[tokio::test]
    async fn test_stored_profile_is_used() {
        let gate = gate(FixedDirectory {
            profile: Some(ConsentProfile {
                consent_level: ConsentLevel::LimitedAnonymized,
                session_purpose: Some("homework_help".to_string()),
                data_sharing_scope: BTreeMap::new(),
            }),
            authenticated: Ok(false),
            fail_lookup: false,
        });

        let student = gate.resolve("student-1").await.unwrap();
        assert_eq!(student.consent_level, ConsentLevel::LimitedAnonymized);
        assert_eq!(student.session_purpose.as_deref(), Some("homework_help"));
    }

    #[tokio::test]
    async fn test_missing_profile_authenticated_defaults_permissive() {
        let gate = gate(FixedDirectory {
            profile: None,
            authenticated: Ok(true),
            fail_lookup: false,
        });

        let student = gate.resolve("student-1").await.unwrap();
        assert_eq!(student.consent_level, ConsentLevel::FullProfile);
        assert_eq!(student.data_sharing_scope.get("personal_data"), Some(&true));
    }

    #[tokio::test]
    async fn test_missing_profile_unauthenticated_defaults_restrictive() {
        let gate = gate(FixedDirectory {
            profile: None,
            authenticated: Ok(false),
            fail_lookup: false,
        });

        let student = gate.resolve("student-1").await.unwrap();
        assert_eq!(student.consent_level, ConsentLevel::MinimalPseudonymous);
        assert_eq!(student.data_sharing_scope.get("personal_data"), Some(&false));
    }

    #[tokio::test]
    async fn test_ambiguous_auth_check_stays_restrictive() {
        let gate = gate(FixedDirectory {
            profile: None,
            authenticated: Err(PaideiaError::Other("x".to_string())),
            fail_lookup: false,
        });

        let student = gate.resolve("student-1").await.unwrap();
        assert_eq!(student.consent_level, ConsentLevel::MinimalPseudonymous);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_an_error_not_a_downgrade() {
        let gate = gate(FixedDirectory {
            profile: None,
            authenticated: Ok(true),
            fail_lookup: true,
        });

        let err = gate.resolve("student-1").await.unwrap_err();
        assert!(matches!(err, PaideiaError::ConsentResolution(_)));
    }
}
