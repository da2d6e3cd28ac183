//! Counters for authorization decisions, authentication failures, dropped
//! audit events and errors.
//!
//! Recording goes through the `metrics` facade; installing an exporter is up
//! to the embedding service.

use metrics::{counter, describe_counter};

use crate::rbac::{ActionType, ResourceType};

pub const AUTHZ_DECISIONS_TOTAL: &str = "rolegate_authz_decisions_total";
pub const AUTH_FAILURES_TOTAL: &str = "rolegate_auth_failures_total";
pub const AUDIT_DROPPED_TOTAL: &str = "rolegate_audit_dropped_total";
pub const ERRORS_TOTAL: &str = "rolegate_errors_total";

/// Register descriptions with the installed recorder. Call once at startup.
pub fn describe_metrics() {
    describe_counter!(
        AUTHZ_DECISIONS_TOTAL,
        "Permission checks by resource, action and outcome"
    );
    describe_counter!(
        AUTH_FAILURES_TOTAL,
        "Requests rejected before evaluation, by error code"
    );
    describe_counter!(
        AUDIT_DROPPED_TOTAL,
        "Audit events dropped because the sink was full or closed"
    );
    describe_counter!(ERRORS_TOTAL, "Errors by category and code");
}

pub struct DecisionCounter;

impl DecisionCounter {
    pub fn increment(resource: ResourceType, action: ActionType, outcome: &'static str) {
        counter!(
            AUTHZ_DECISIONS_TOTAL,
            "resource" => resource.as_str(),
            "action" => action.as_str(),
            "outcome" => outcome,
        )
        .increment(1);
    }
}

pub struct AuthFailureCounter;

impl AuthFailureCounter {
    pub fn increment(code: &str) {
        counter!(AUTH_FAILURES_TOTAL, "code" => code.to_string()).increment(1);
    }
}

pub struct AuditDropCounter;

impl AuditDropCounter {
    pub fn increment(reason: &'static str) {
        counter!(AUDIT_DROPPED_TOTAL, "reason" => reason).increment(1);
    }
}

pub struct ErrorCounter;

impl ErrorCounter {
    pub fn increment(category: &str, code: &str) {
        counter!(
            ERRORS_TOTAL,
            "category" => category.to_string(),
            "code" => code.to_string(),
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Without an installed recorder these are no-ops; they must not panic.
    #[test]
    fn test_counters_without_recorder() {
        describe_metrics();
        DecisionCounter::increment(ResourceType::Campaigns, ActionType::Read, "allow");
        AuthFailureCounter::increment("TOKEN_EXPIRED");
        AuditDropCounter::increment("full");
        ErrorCounter::increment("authorization", "FORBIDDEN");
    }
}
