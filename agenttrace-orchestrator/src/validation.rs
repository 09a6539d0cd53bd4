use std::collections::HashSet;
use std::time::Duration;

use agenttrace_core::domain::ids::CategoryId;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{AuthScheme, EndpointConfig, Submission, ValidationResult};
use crate::quota::{QuotaTracker, QuotaViolation};

static SEMVER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\d+\.\d+(-[0-9A-Za-z.-]+)?$").unwrap());
static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

/// `validate(submission)` (spec.md §4.5 "Submission handler"): nine checks
/// run in order, each contributing to the accumulated `ValidationResult`.
pub async fn validate(
    submission: &Submission,
    quota: &QuotaTracker,
    known_categories: &HashSet<CategoryId>,
    http_client: &reqwest::Client,
    local_modules: &HashSet<String>,
) -> ValidationResult {
    let mut result = ValidationResult::default();

    result = check_required_fields(submission, result);
    if !submission.terms_accepted {
        result = result.reject("terms_accepted", "terms of participation were not accepted");
    } else {
        result = result.pass("terms_accepted");
    }

    result = match quota.check(&submission.submitter_email, submission.submitted_at) {
        Ok(()) => result.pass("quota"),
        Err(QuotaViolation::DayLimit) => result.reject("quota", "daily submission limit (5/24h) exceeded"),
        Err(QuotaViolation::WeekLimit) => result.reject("quota", "weekly submission limit (20/7d) exceeded"),
        Err(QuotaViolation::MinGap) => result.reject("quota", "must wait at least 1h between submissions"),
    };

    result = check_endpoint_reachable(submission, http_client, local_modules).await.fold(result);
    result = check_categories_valid(submission, known_categories, result);
    result = check_endpoint_type(submission, result);
    result = check_authentication(submission, result);

    result = if EMAIL.is_match(&submission.submitter_email) {
        result.pass("email_valid")
    } else {
        result.reject("email_valid", "submitter_email is not a valid RFC 5322 address")
    };

    result = if SEMVER.is_match(&submission.agent_version) {
        result.pass("version_format")
    } else {
        result.warn("version_format", format!("agent_version '{}' is not valid semver", submission.agent_version))
    };

    result = match &submission.organization {
        Some(_) => result.pass("organization"),
        None => result.warn("organization", "no organization affiliation provided; unverified submitter"),
    };

    result.valid = result.errors.is_empty();
    result
}

fn check_required_fields(submission: &Submission, result: ValidationResult) -> ValidationResult {
    let mut missing = Vec::new();
    if submission.agent_name.trim().is_empty() {
        missing.push("agent_name");
    }
    if submission.agent_version.trim().is_empty() {
        missing.push("agent_version");
    }
    if submission.category_ids.is_empty() {
        missing.push("category_ids");
    }
    if submission.submitter_email.trim().is_empty() {
        missing.push("submitter_email");
    }
    if missing.is_empty() {
        result.pass("required_fields")
    } else {
        result.reject("required_fields", format!("missing required fields: {}", missing.join(", ")))
    }
}

fn check_categories_valid(submission: &Submission, known: &HashSet<CategoryId>, result: ValidationResult) -> ValidationResult {
    let unknown: Vec<String> =
        submission.category_ids.iter().filter(|c| !known.contains(c)).map(|c| c.to_string()).collect();
    if unknown.is_empty() {
        result.pass("categories_valid")
    } else {
        result.reject("categories_valid", format!("unknown category ids: {}", unknown.join(", ")))
    }
}

fn check_endpoint_type(submission: &Submission, result: ValidationResult) -> ValidationResult {
    match &submission.endpoint {
        EndpointConfig::Http { url, .. } if url.starts_with("http://") || url.starts_with("https://") => {
            result.pass("endpoint_type")
        }
        EndpointConfig::Http { url, .. } => result.reject("endpoint_type", format!("unsupported endpoint url scheme: {url}")),
        EndpointConfig::Local { module } if !module.trim().is_empty() => result.pass("endpoint_type"),
        EndpointConfig::Local { .. } => result.reject("endpoint_type", "local module path is empty"),
    }
}

fn check_authentication(submission: &Submission, result: ValidationResult) -> ValidationResult {
    match &submission.endpoint {
        EndpointConfig::Http { auth_scheme, credential, .. } => match auth_scheme {
            AuthScheme::Bearer | AuthScheme::ApiKey if !credential.trim().is_empty() => result.pass("authentication"),
            AuthScheme::Bearer | AuthScheme::ApiKey => {
                result.reject("authentication", "auth_scheme requires a non-empty credential")
            }
            AuthScheme::None => result.warn("authentication", "HTTP endpoint configured without authentication"),
        },
        EndpointConfig::Local { .. } => result.pass("authentication"),
    }
}

enum Reachability {
    Ok,
    Unreachable(String),
}

impl Reachability {
    fn fold(self, result: ValidationResult) -> ValidationResult {
        match self {
            Reachability::Ok => result.pass("endpoint_reachable"),
            Reachability::Unreachable(msg) => result.reject("endpoint_reachable", msg),
        }
    }
}

async fn check_endpoint_reachable(
    submission: &Submission,
    http_client: &reqwest::Client,
    local_modules: &HashSet<String>,
) -> Reachability {
    match &submission.endpoint {
        EndpointConfig::Http { url, .. } => {
            let probe = http_client.head(url).timeout(Duration::from_secs(5)).send().await;
            match probe {
                Ok(resp) if resp.status().is_success() || resp.status().is_redirection() => Reachability::Ok,
                Ok(resp) => match http_client.post(url).timeout(Duration::from_secs(5)).send().await {
                    Ok(r2) if r2.status().as_u16() != 404 => Reachability::Ok,
                    _ => Reachability::Unreachable(format!("endpoint returned {}", resp.status())),
                },
                Err(e) => Reachability::Unreachable(format!("endpoint unreachable: {e}")),
            }
        }
        EndpointConfig::Local { module } => {
            if local_modules.contains(module) {
                Reachability::Ok
            } else {
                Reachability::Unreachable(format!("local module '{module}' does not resolve"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenttrace_core::domain::ids::SubmissionId;

    fn submission(endpoint: EndpointConfig) -> Submission {
        Submission {
            id: SubmissionId::new(),
            submitter_email: "dev@example.com".into(),
            organization: Some("Acme".into()),
            agent_name: "agent".into(),
            agent_version: "1.0.0".into(),
            endpoint,
            category_ids: vec![],
            terms_accepted: true,
            submitted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn rejects_when_terms_not_accepted() {
        let mut s = submission(EndpointConfig::Local { module: "m".into() });
        s.terms_accepted = false;
        let quota = QuotaTracker::default();
        let mut local = HashSet::new();
        local.insert("m".to_string());
        let result = validate(&s, &quota, &HashSet::new(), &reqwest::Client::new(), &local).await;
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("terms")));
    }

    #[tokio::test]
    async fn warns_on_missing_organization_and_bad_semver() {
        let mut s = submission(EndpointConfig::Local { module: "m".into() });
        s.organization = None;
        s.agent_version = "not-semver".into();
        let quota = QuotaTracker::default();
        let mut local = HashSet::new();
        local.insert("m".to_string());
        let result = validate(&s, &quota, &HashSet::new(), &reqwest::Client::new(), &local).await;
        assert!(result.warnings.iter().any(|w| w.contains("organization")));
        assert!(result.warnings.iter().any(|w| w.contains("semver")));
    }

    #[tokio::test]
    async fn rejects_invalid_email() {
        let mut s = submission(EndpointConfig::Local { module: "m".into() });
        s.submitter_email = "not-an-email".into();
        let quota = QuotaTracker::default();
        let mut local = HashSet::new();
        local.insert("m".to_string());
        let result = validate(&s, &quota, &HashSet::new(), &reqwest::Client::new(), &local).await;
        assert!(!result.valid);
    }

    #[tokio::test]
    async fn rejects_unresolvable_local_module() {
        let s = submission(EndpointConfig::Local { module: "missing".into() });
        let quota = QuotaTracker::default();
        let result = validate(&s, &quota, &HashSet::new(), &reqwest::Client::new(), &HashSet::new()).await;
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("endpoint")));
    }
}
