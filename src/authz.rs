//! Authorization decisions for every mutating operation.
//!
//! All role checks live here as one pure function over the caller, the
//! action, and (where ownership or state matters) the targeted bug, so the
//! policy reads as a table instead of ad hoc checks per handler.

use crate::entity::bug::{self, BugStatus};
use crate::entity::user::{self, Role};
use crate::model::global_error::{AppError, ErrorCode};

#[derive(Debug)]
pub enum Action<'a> {
    CreateBug,
    UpdateBug(&'a bug::Model),
    DeleteBug,
    UpdateBugStatus {
        bug: &'a bug::Model,
        new_status: BugStatus,
    },
    AssignBug,
    ManageHierarchy,
    ManageUsers,
}

pub fn authorize(user: &user::Model, action: &Action<'_>) -> Result<(), AppError> {
    if is_allowed(user, action) {
        Ok(())
    } else {
        Err(AppError::new(ErrorCode::NotEnoughPermission))
    }
}

fn is_allowed(user: &user::Model, action: &Action<'_>) -> bool {
    match action {
        Action::CreateBug => matches!(user.role, Role::SuperAdmin | Role::Admin | Role::Tester),

        // Testers may only touch their own bugs while still pending;
        // admins and developers go through assign/update_status instead.
        Action::UpdateBug(bug) => match user.role {
            Role::SuperAdmin => true,
            Role::Tester => bug.creator_id == user.id && bug.status == BugStatus::Pending,
            Role::Admin | Role::Developer => false,
        },

        Action::DeleteBug => user.role == Role::SuperAdmin,

        Action::UpdateBugStatus { bug, new_status } => match user.role {
            Role::SuperAdmin => true,
            Role::Developer => {
                bug.assignee_id == Some(user.id)
                    && matches!(
                        new_status,
                        BugStatus::Processing | BugStatus::Resolved | BugStatus::Rejected
                    )
            }
            Role::Admin | Role::Tester => false,
        },

        Action::AssignBug => matches!(user.role, Role::SuperAdmin | Role::Admin),

        Action::ManageHierarchy | Action::ManageUsers => user.role == Role::SuperAdmin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::bug::{Priority, Severity};
    use crate::entity::user::UserStatus;
    use chrono::Utc;

    fn user(id: i32, role: Role) -> user::Model {
        user::Model {
            id,
            username: format!("user{id}"),
            password: String::new(),
            email: String::new(),
            phone: String::new(),
            role,
            status: UserStatus::Active,
            avatar: None,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    fn bug(creator_id: i32, assignee_id: Option<i32>, status: BugStatus) -> bug::Model {
        bug::Model {
            id: 1,
            title: "t".to_string(),
            description: "d".to_string(),
            severity: Severity::Minor,
            priority: Priority::Medium,
            status,
            module_id: None,
            version: String::new(),
            creator_id,
            assignee_id,
            solution: String::new(),
            reject_reason: String::new(),
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    #[test]
    fn developers_cannot_create_bugs() {
        assert!(authorize(&user(1, Role::Developer), &Action::CreateBug).is_err());
        for role in [Role::SuperAdmin, Role::Admin, Role::Tester] {
            assert!(authorize(&user(1, role), &Action::CreateBug).is_ok());
        }
    }

    #[test]
    fn tester_updates_only_own_pending_bugs() {
        let tester = user(1, Role::Tester);

        let own_pending = bug(1, None, BugStatus::Pending);
        assert!(authorize(&tester, &Action::UpdateBug(&own_pending)).is_ok());

        let own_processing = bug(1, None, BugStatus::Processing);
        assert!(authorize(&tester, &Action::UpdateBug(&own_processing)).is_err());

        let foreign_pending = bug(2, None, BugStatus::Pending);
        assert!(authorize(&tester, &Action::UpdateBug(&foreign_pending)).is_err());
    }

    #[test]
    fn super_admin_updates_anything() {
        let root = user(1, Role::SuperAdmin);
        let foreign_closed = bug(2, Some(3), BugStatus::Closed);
        assert!(authorize(&root, &Action::UpdateBug(&foreign_closed)).is_ok());
        assert!(authorize(&root, &Action::DeleteBug).is_ok());
    }

    #[test]
    fn admins_have_no_generic_update_or_delete_path() {
        let admin = user(1, Role::Admin);
        let own_pending = bug(1, None, BugStatus::Pending);
        assert!(authorize(&admin, &Action::UpdateBug(&own_pending)).is_err());
        assert!(authorize(&admin, &Action::DeleteBug).is_err());
    }

    #[test]
    fn developer_status_change_gated_by_assignment_and_target() {
        let dev = user(5, Role::Developer);
        let assigned = bug(1, Some(5), BugStatus::Pending);
        let unassigned = bug(1, Some(6), BugStatus::Pending);

        for status in [BugStatus::Processing, BugStatus::Resolved, BugStatus::Rejected] {
            assert!(
                authorize(&dev, &Action::UpdateBugStatus { bug: &assigned, new_status: status }).is_ok()
            );
            assert!(
                authorize(&dev, &Action::UpdateBugStatus { bug: &unassigned, new_status: status })
                    .is_err()
            );
        }

        for status in [BugStatus::Pending, BugStatus::Closed] {
            assert!(
                authorize(&dev, &Action::UpdateBugStatus { bug: &assigned, new_status: status })
                    .is_err()
            );
        }
    }

    #[test]
    fn super_admin_may_set_any_status() {
        let root = user(1, Role::SuperAdmin);
        let b = bug(2, Some(3), BugStatus::Closed);

        // No source-state transition table: even closed -> pending goes through.
        for status in [
            BugStatus::Pending,
            BugStatus::Processing,
            BugStatus::Resolved,
            BugStatus::Rejected,
            BugStatus::Closed,
        ] {
            assert!(
                authorize(&root, &Action::UpdateBugStatus { bug: &b, new_status: status }).is_ok()
            );
        }
    }

    #[test]
    fn other_roles_cannot_change_status() {
        let b = bug(1, Some(1), BugStatus::Pending);
        for role in [Role::Admin, Role::Tester] {
            assert!(
                authorize(
                    &user(1, role),
                    &Action::UpdateBugStatus { bug: &b, new_status: BugStatus::Processing }
                )
                .is_err()
            );
        }
    }

    #[test]
    fn assignment_is_for_admins() {
        assert!(authorize(&user(1, Role::SuperAdmin), &Action::AssignBug).is_ok());
        assert!(authorize(&user(1, Role::Admin), &Action::AssignBug).is_ok());
        assert!(authorize(&user(1, Role::Tester), &Action::AssignBug).is_err());
        assert!(authorize(&user(1, Role::Developer), &Action::AssignBug).is_err());
    }

    #[test]
    fn hierarchy_and_user_management_are_super_admin_only() {
        for action in [Action::ManageHierarchy, Action::ManageUsers] {
            assert!(authorize(&user(1, Role::SuperAdmin), &action).is_ok());
            for role in [Role::Admin, Role::Tester, Role::Developer] {
                assert!(authorize(&user(1, role), &action).is_err());
            }
        }
    }
}
