//! Access evaluation over per-record policies.
//!
//! Pure functions with no I/O; called once per candidate record inside the
//! paginator's scan loop.

use std::collections::HashSet;

use crate::model::{AccessPolicy, Actor, Assignment, Permission, Record, Role};

/// Decide whether `principal_id` holds `permission` on a record.
///
/// Owners bypass the policy entirely, an absent policy means the record is
/// public, and otherwise the principal (or one of its groups) must appear in
/// the allow-set for `permission`.
pub fn permitted(
    owner_id: &str,
    principal_id: &str,
    permission: Permission,
    policy: Option<&AccessPolicy>,
    principal_group_ids: &HashSet<String>,
) -> bool {
    if owner_id == principal_id {
        return true;
    }
    match policy {
        None => true,
        Some(policy) => has_access(principal_id, permission, policy, principal_group_ids),
    }
}

/// Policy check without the owner and public fast paths.
pub fn has_access(
    principal_id: &str,
    permission: Permission,
    policy: &AccessPolicy,
    principal_group_ids: &HashSet<String>,
) -> bool {
    let Some(grant) = policy.grant(permission) else {
        return false;
    };
    grant.user_ids.contains(principal_id)
        || grant
            .group_ids
            .iter()
            .any(|group| principal_group_ids.contains(group))
}

/// [`permitted`] applied to a [`Record`].
pub fn record_permitted<R: Record>(
    record: &R,
    principal_id: &str,
    permission: Permission,
    principal_group_ids: &HashSet<String>,
) -> bool {
    permitted(
        record.owner_id(),
        principal_id,
        permission,
        record.access_policy(),
        principal_group_ids,
    )
}

/// Whether `actor` may grade submissions to `assignment`.
///
/// Admins always may. Teachers may if they own the assignment or hold
/// `write` on its policy; an absent policy grants nobody `write` here.
pub fn is_grading_identity(
    actor: &Actor,
    assignment: &Assignment,
    principal_group_ids: &HashSet<String>,
) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Student => false,
        Role::Teacher => {
            assignment.teacher_id == actor.principal_id
                || assignment.access_control.as_ref().is_some_and(|policy| {
                    has_access(
                        &actor.principal_id,
                        Permission::Write,
                        policy,
                        principal_group_ids,
                    )
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn groups(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn owner_bypasses_policy() {
        let policy = AccessPolicy::new();
        assert!(permitted(
            "t1",
            "t1",
            Permission::Write,
            Some(&policy),
            &groups(&[])
        ));
    }

    #[test]
    fn absent_policy_is_public() {
        assert!(permitted("t1", "s9", Permission::Write, None, &groups(&[])));
        assert!(permitted("t1", "s9", Permission::Read, None, &groups(&[])));
    }

    #[test]
    fn user_allow_list() {
        let policy = AccessPolicy::new().with_users(Permission::Read, ["s1"]);
        assert!(permitted(
            "t1",
            "s1",
            Permission::Read,
            Some(&policy),
            &groups(&[])
        ));
        assert!(!permitted(
            "t1",
            "s1",
            Permission::Write,
            Some(&policy),
            &groups(&[])
        ));
        assert!(!permitted(
            "t1",
            "s2",
            Permission::Read,
            Some(&policy),
            &groups(&[])
        ));
    }

    #[test]
    fn group_intersection() {
        let policy = AccessPolicy::new().with_groups(Permission::Read, ["class-7a", "class-7b"]);
        assert!(permitted(
            "t1",
            "s1",
            Permission::Read,
            Some(&policy),
            &groups(&["chess-club", "class-7b"])
        ));
        assert!(!permitted(
            "t1",
            "s1",
            Permission::Read,
            Some(&policy),
            &groups(&["chess-club"])
        ));
    }

    #[test]
    fn empty_policy_denies_non_owners() {
        let policy = AccessPolicy::new();
        assert!(!permitted(
            "t1",
            "s1",
            Permission::Read,
            Some(&policy),
            &groups(&["class-7a"])
        ));
    }

    fn assignment(policy: Option<AccessPolicy>) -> Assignment {
        let now = Utc::now();
        Assignment {
            id: "a1".into(),
            teacher_id: "t1".into(),
            title: "Essay".into(),
            description: None,
            due_date: None,
            max_score: 100.0,
            rubric: None,
            ai_assist: true,
            access_control: policy,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn grading_identities() {
        let none = groups(&[]);
        let public = assignment(None);
        assert!(is_grading_identity(&Actor::admin("root"), &public, &none));
        assert!(is_grading_identity(&Actor::teacher("t1"), &public, &none));
        assert!(!is_grading_identity(&Actor::teacher("t2"), &public, &none));
        assert!(!is_grading_identity(&Actor::student("t1"), &public, &none));

        let shared = assignment(Some(
            AccessPolicy::new()
                .with_groups(Permission::Write, ["maths-dept"])
                .with_users(Permission::Read, ["t3"]),
        ));
        assert!(is_grading_identity(
            &Actor::teacher("t2"),
            &shared,
            &groups(&["maths-dept"])
        ));
        assert!(!is_grading_identity(&Actor::teacher("t3"), &shared, &none));
    }
}
