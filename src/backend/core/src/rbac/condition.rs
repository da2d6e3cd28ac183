//! Record-level condition evaluation.
//!
//! Pure comparisons between the user and the attributes of the record being
//! checked. Missing data never raises: it simply fails the condition.

use tracing::{trace, warn};

use super::models::{Condition, PermissionContext, UserWithRole};

/// Evaluate one condition for `user` against the per-check context.
pub fn evaluate_condition(
    user: &UserWithRole,
    condition: &Condition,
    context: &PermissionContext,
) -> bool {
    let passed = match condition {
        Condition::Own { .. } | Condition::Assigned { .. } => {
            attribute(condition, context) == Some(user.id.as_str())
        }
        Condition::Team { .. } => match &user.team_id {
            Some(team) => attribute(condition, context) == Some(team.as_str()),
            None => false,
        },
        Condition::Organization { .. } => {
            let claimed = context
                .organization_id
                .as_ref()
                .map(|o| o.as_str())
                .or_else(|| attribute(condition, context));
            claimed == Some(user.organization_id.as_str())
        }
        Condition::Unrecognized { tag, .. } => {
            warn!(
                user_id = %user.id,
                condition = %tag,
                "Unrecognized condition tag, denying"
            );
            false
        }
    };

    trace!(
        user_id = %user.id,
        condition = %condition,
        passed,
        "Condition evaluated"
    );
    passed
}

/// First condition that does not hold, in declaration order.
pub fn first_failing<'a>(
    user: &UserWithRole,
    conditions: &'a [Condition],
    context: &PermissionContext,
) -> Option<&'a Condition> {
    conditions
        .iter()
        .find(|c| !evaluate_condition(user, c, context))
}

/// Conjunction of all conditions; an empty list holds.
pub fn evaluate_all(
    user: &UserWithRole,
    conditions: &[Condition],
    context: &PermissionContext,
) -> bool {
    first_failing(user, conditions, context).is_none()
}

fn attribute<'a>(condition: &Condition, context: &'a PermissionContext) -> Option<&'a str> {
    condition.field().and_then(|field| context.attribute(field))
}
