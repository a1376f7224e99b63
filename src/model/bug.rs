use std::collections::HashMap;

use sea_orm::ActiveEnum;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entity::bug::{BugStatus, Priority, Severity};
use crate::entity::bug_attachment::Model as AttachmentModel;
use crate::model::global_error::{AppError, ErrorCode, ValidationFieldError};

/// Title prefix applied by the copy endpoint.
pub const COPY_TITLE_PREFIX: &str = "[Copy] ";

/// Fields accepted by bug create/update, decoded from the multipart form.
#[derive(Debug, PartialEq)]
pub struct BugForm {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub priority: Priority,
    pub module: Option<i32>,
    pub version: String,
    pub assignee: Option<i32>,
}

fn parse_enum_field<E>(fields: &HashMap<String, String>, name: &str, default: E) -> Result<E, ValidationFieldError>
where
    E: ActiveEnum<Value = String>,
{
    match fields.get(name).map(|s| s.trim()).filter(|s| !s.is_empty()) {
        Some(raw) => E::try_from_value(&raw.to_string()).map_err(|_| ValidationFieldError {
            field: name.to_string(),
            message: format!("invalid value: {raw}"),
        }),
        None => Ok(default),
    }
}

fn parse_id_field(fields: &HashMap<String, String>, name: &str) -> Result<Option<i32>, ValidationFieldError> {
    match fields.get(name).map(|s| s.trim()).filter(|s| !s.is_empty()) {
        Some(raw) => raw
            .parse::<i32>()
            .map(Some)
            .map_err(|_| ValidationFieldError {
                field: name.to_string(),
                message: format!("not a valid id: {raw}"),
            }),
        None => Ok(None),
    }
}

/// Decodes the text fields of a bug form. Unknown fields are ignored,
/// empty strings count as absent (multipart forms send them for cleared
/// inputs).
pub fn parse_bug_form(fields: &HashMap<String, String>) -> Result<BugForm, AppError> {
    let mut errors = Vec::new();

    let title = fields.get("title").map(|s| s.trim().to_string()).unwrap_or_default();
    if title.is_empty() {
        errors.push(ValidationFieldError {
            field: "title".to_string(),
            message: "title is required".to_string(),
        });
    }

    let description = fields.get("description").map(|s| s.to_string()).unwrap_or_default();
    if description.trim().is_empty() {
        errors.push(ValidationFieldError {
            field: "description".to_string(),
            message: "description is required".to_string(),
        });
    }

    let severity = parse_enum_field(fields, "severity", Severity::Minor).unwrap_or_else(|e| {
        errors.push(e);
        Severity::Minor
    });
    let priority = parse_enum_field(fields, "priority", Priority::Medium).unwrap_or_else(|e| {
        errors.push(e);
        Priority::Medium
    });
    let module = parse_id_field(fields, "module").unwrap_or_else(|e| {
        errors.push(e);
        None
    });
    let assignee = parse_id_field(fields, "assignee").unwrap_or_else(|e| {
        errors.push(e);
        None
    });

    if !errors.is_empty() {
        return Err(AppError::ValidationError(errors));
    }

    Ok(BugForm {
        title,
        description,
        severity,
        priority,
        module,
        version: fields.get("version").map(|s| s.trim().to_string()).unwrap_or_default(),
        assignee,
    })
}

/// Turns dangling `module`/`assignee` references into field-level errors.
/// The handler looks the rows up; passing the form through to the insert
/// would surface the FK violation as a database error instead.
pub fn validate_bug_refs(
    form: &BugForm,
    module_exists: bool,
    assignee_exists: bool,
) -> Result<(), AppError> {
    let mut errors = Vec::new();

    if form.module.is_some() && !module_exists {
        errors.push(ValidationFieldError {
            field: "module".to_string(),
            message: "unknown module".to_string(),
        });
    }
    if form.assignee.is_some() && !assignee_exists {
        errors.push(ValidationFieldError {
            field: "assignee".to_string(),
            message: "unknown user".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::ValidationError(errors))
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BugStatusUpdateRequest {
    pub status: BugStatus,
    pub solution: Option<String>,
    pub reject_reason: Option<String>,
}

/// Checks the note fields required by the target status. Runs before any
/// role gate so a developer filling the form wrong sees the real problem.
pub fn validate_status_change(request: &BugStatusUpdateRequest) -> Result<(), AppError> {
    match request.status {
        BugStatus::Resolved if request.solution.as_deref().is_none_or(|s| s.trim().is_empty()) => {
            Err(AppError::field("solution", "a solution is required when resolving a bug"))
        }
        BugStatus::Rejected
            if request.reject_reason.as_deref().is_none_or(|s| s.trim().is_empty()) =>
        {
            Err(AppError::field(
                "reject_reason",
                "a reject reason is required when rejecting a bug",
            ))
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BugAssignRequest {
    pub assignee: Option<i32>,
}

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum MyBugsFilter {
    Created,
    Assigned,
}

#[derive(Debug, Deserialize)]
pub struct BugListQuery {
    pub status: Option<BugStatus>,
    pub severity: Option<Severity>,
    pub priority: Option<Priority>,
    pub assignee: Option<i32>,
    pub creator: Option<i32>,
    pub search: Option<String>,
    pub my_bugs: Option<MyBugsFilter>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AttachmentResponse {
    pub id: i32,
    pub file: String,
    pub created_at: DateTime<FixedOffset>,
}

impl From<AttachmentModel> for AttachmentResponse {
    fn from(model: AttachmentModel) -> Self {
        Self {
            id: model.id,
            file: model.file,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BugListResponse {
    pub id: i32,
    pub title: String,
    pub severity: Severity,
    pub priority: Priority,
    pub status: BugStatus,
    pub module: Option<i32>,
    pub module_path: String,
    pub version: String,
    pub creator: i32,
    pub creator_name: String,
    pub assignee: Option<i32>,
    pub assignee_name: String,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BugDetailResponse {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub priority: Priority,
    pub status: BugStatus,
    pub module: Option<i32>,
    pub module_path: String,
    pub module_cascade: Vec<i32>,
    pub version: String,
    pub creator: i32,
    pub creator_name: String,
    pub assignee: Option<i32>,
    pub assignee_name: String,
    pub solution: String,
    pub reject_reason: String,
    pub attachments: Vec<AttachmentResponse>,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
}

/// Prefilled draft returned by the copy endpoint. Never persisted; the
/// client submits it through the normal create flow.
#[derive(Debug, Serialize, ToSchema)]
pub struct BugCopyResponse {
    pub module: Option<i32>,
    pub module_cascade: Vec<i32>,
    pub severity: Severity,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub version: String,
    pub status: BugStatus,
    pub creator: i32,
    pub assignee: Option<i32>,
    pub attachments: Vec<AttachmentResponse>,
}

impl BugCopyResponse {
    pub fn from_bug(
        bug: &crate::entity::bug::Model,
        caller_id: i32,
        module_cascade: Vec<i32>,
        attachments: Vec<AttachmentResponse>,
    ) -> Self {
        Self {
            module: bug.module_id,
            module_cascade,
            severity: bug.severity,
            priority: bug.priority,
            title: format!("{COPY_TITLE_PREFIX}{}", bug.title),
            description: bug.description.clone(),
            version: bug.version.clone(),
            status: BugStatus::Pending,
            creator: caller_id,
            assignee: None,
            attachments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::bug;
    use chrono::Utc;

    fn form_fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn parse_form_applies_defaults() {
        let form = parse_bug_form(&form_fields(&[
            ("title", "login broken"),
            ("description", "cannot sign in"),
        ]))
        .unwrap();

        assert_eq!(form.severity, Severity::Minor);
        assert_eq!(form.priority, Priority::Medium);
        assert_eq!(form.module, None);
        assert_eq!(form.assignee, None);
        assert_eq!(form.version, "");
    }

    #[test]
    fn parse_form_reads_every_field() {
        let form = parse_bug_form(&form_fields(&[
            ("title", "crash on save"),
            ("description", "steps..."),
            ("severity", "critical"),
            ("priority", "high"),
            ("module", "7"),
            ("assignee", "3"),
            ("version", "1.2.0"),
        ]))
        .unwrap();

        assert_eq!(form.severity, Severity::Critical);
        assert_eq!(form.priority, Priority::High);
        assert_eq!(form.module, Some(7));
        assert_eq!(form.assignee, Some(3));
        assert_eq!(form.version, "1.2.0");
    }

    #[test]
    fn parse_form_treats_empty_strings_as_absent() {
        let form = parse_bug_form(&form_fields(&[
            ("title", "t"),
            ("description", "d"),
            ("module", ""),
            ("severity", ""),
        ]))
        .unwrap();

        assert_eq!(form.module, None);
        assert_eq!(form.severity, Severity::Minor);
    }

    #[test]
    fn parse_form_collects_field_errors() {
        let err = parse_bug_form(&form_fields(&[("severity", "catastrophic"), ("module", "x")]));

        match err {
            Err(AppError::ValidationError(errors)) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                assert!(fields.contains(&"title"));
                assert!(fields.contains(&"description"));
                assert!(fields.contains(&"severity"));
                assert!(fields.contains(&"module"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn dangling_references_fail_validation() {
        let form = parse_bug_form(&form_fields(&[
            ("title", "t"),
            ("description", "d"),
            ("module", "9999"),
            ("assignee", "8"),
        ]))
        .unwrap();

        match validate_bug_refs(&form, false, false) {
            Err(AppError::ValidationError(errors)) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                assert!(fields.contains(&"module"));
                assert!(fields.contains(&"assignee"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn existing_or_absent_references_pass_validation() {
        let resolved = parse_bug_form(&form_fields(&[
            ("title", "t"),
            ("description", "d"),
            ("module", "7"),
        ]))
        .unwrap();
        assert!(validate_bug_refs(&resolved, true, true).is_ok());

        // Absent references need no lookup at all.
        let bare = parse_bug_form(&form_fields(&[("title", "t"), ("description", "d")])).unwrap();
        assert!(validate_bug_refs(&bare, false, false).is_ok());
    }

    #[test]
    fn resolving_requires_solution() {
        let request = BugStatusUpdateRequest {
            status: BugStatus::Resolved,
            solution: Some("  ".to_string()),
            reject_reason: None,
        };
        assert!(validate_status_change(&request).is_err());

        let request = BugStatusUpdateRequest {
            status: BugStatus::Resolved,
            solution: Some("fixed the null check".to_string()),
            reject_reason: None,
        };
        assert!(validate_status_change(&request).is_ok());
    }

    #[test]
    fn rejecting_requires_reason() {
        let request = BugStatusUpdateRequest {
            status: BugStatus::Rejected,
            solution: None,
            reject_reason: None,
        };
        assert!(validate_status_change(&request).is_err());

        let request = BugStatusUpdateRequest {
            status: BugStatus::Rejected,
            solution: None,
            reject_reason: Some("works as designed".to_string()),
        };
        assert!(validate_status_change(&request).is_ok());
    }

    #[test]
    fn other_statuses_need_no_notes() {
        for status in [BugStatus::Pending, BugStatus::Processing, BugStatus::Closed] {
            let request = BugStatusUpdateRequest {
                status,
                solution: None,
                reject_reason: None,
            };
            assert!(validate_status_change(&request).is_ok());
        }
    }

    #[test]
    fn copy_payload_resets_workflow_fields() {
        let source = bug::Model {
            id: 9,
            title: "broken layout".to_string(),
            description: "details".to_string(),
            severity: Severity::Major,
            priority: Priority::High,
            status: BugStatus::Resolved,
            module_id: Some(5),
            version: "2.0".to_string(),
            creator_id: 1,
            assignee_id: Some(4),
            solution: "patched".to_string(),
            reject_reason: String::new(),
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        };

        let copy = BugCopyResponse::from_bug(&source, 42, vec![1, 2, 5], vec![]);

        assert_eq!(copy.title, "[Copy] broken layout");
        assert_eq!(copy.status, BugStatus::Pending);
        assert_eq!(copy.creator, 42);
        assert_eq!(copy.assignee, None);
        assert_eq!(copy.module, Some(5));
        assert_eq!(copy.module_cascade, vec![1, 2, 5]);
        assert_eq!(copy.severity, Severity::Major);
        assert_eq!(copy.priority, Priority::High);
        assert_eq!(copy.description, "details");
        assert_eq!(copy.version, "2.0");
    }
}
