use std::collections::HashMap;

use actix_multipart::Multipart;
use actix_web::{HttpResponse, delete, get, post, put, web};
use chrono::Utc;
use futures_util::TryStreamExt;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use sea_query::Condition;

use crate::api::user::current_user;
use crate::authz::{Action, authorize};
use crate::entity::bug::{self, BugStatus, Entity as BugEntity};
use crate::entity::bug_attachment::{self, Entity as AttachmentEntity};
use crate::entity::user::{self, Entity as UserEntity};
use crate::entity::{module, product, project};
use crate::model::bug::{
    AttachmentResponse, BugAssignRequest, BugCopyResponse, BugDetailResponse, BugForm,
    BugListQuery, BugListResponse, BugStatusUpdateRequest, MyBugsFilter, parse_bug_form,
    validate_bug_refs, validate_status_change,
};
use crate::model::global_error::{AppError, ErrorCode};
use crate::storage::BlobStore;

pub(crate) fn multipart_err(err: actix_multipart::MultipartError) -> AppError {
    tracing::warn!("malformed multipart payload: {err}");
    AppError::field("body", "malformed multipart payload")
}

/// Splits a multipart form into its text fields and the uploaded files.
/// Files arrive under `attachments` (bug forms) or `file` (the standalone
/// upload endpoint) and are written to the blob store as they stream in.
async fn collect_multipart(
    mut payload: Multipart,
    store: &BlobStore,
) -> Result<(HashMap<String, String>, Vec<String>), AppError> {
    let mut fields = HashMap::new();
    let mut files = Vec::new();

    while let Some(mut field) = payload.try_next().await.map_err(multipart_err)? {
        let name = field.name().to_string();
        let filename = field.content_disposition().get_filename().map(str::to_string);

        let mut data = web::BytesMut::new();
        while let Some(chunk) = field.try_next().await.map_err(multipart_err)? {
            data.extend_from_slice(&chunk);
        }

        if name == "attachments" || name == "file" {
            let filename = filename.unwrap_or_default();
            let url = store.save("bug_attachments", &filename, &data).await?;
            files.push(url);
        } else {
            fields.insert(name, String::from_utf8_lossy(&data).to_string());
        }
    }

    Ok((fields, files))
}

/// Resolves module ids to their display path ("Project / Product / Module")
/// and the [project_id, product_id, module_id] selector triplet.
async fn module_paths(
    db: &DatabaseConnection,
    module_ids: Vec<i32>,
) -> Result<HashMap<i32, (String, Vec<i32>)>, AppError> {
    if module_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let modules = module::Entity::find()
        .filter(module::Column::Id.is_in(module_ids))
        .all(db)
        .await?;
    let product_ids: Vec<i32> = modules.iter().map(|m| m.product_id).collect();
    let products = product::Entity::find()
        .filter(product::Column::Id.is_in(product_ids))
        .all(db)
        .await?;
    let project_ids: Vec<i32> = products.iter().map(|p| p.project_id).collect();
    let projects: HashMap<i32, project::Model> = project::Entity::find()
        .filter(project::Column::Id.is_in(project_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();
    let products: HashMap<i32, product::Model> =
        products.into_iter().map(|p| (p.id, p)).collect();

    let mut paths = HashMap::new();
    for m in modules {
        let Some(product) = products.get(&m.product_id) else { continue };
        let Some(project) = projects.get(&product.project_id) else { continue };
        paths.insert(
            m.id,
            (
                format!("{} / {} / {}", project.name, product.name, m.name),
                vec![project.id, product.id, m.id],
            ),
        );
    }

    Ok(paths)
}

async fn usernames(db: &DatabaseConnection, ids: Vec<i32>) -> Result<HashMap<i32, String>, AppError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    Ok(UserEntity::find()
        .filter(user::Column::Id.is_in(ids))
        .all(db)
        .await?
        .into_iter()
        .map(|u| (u.id, u.username))
        .collect())
}

/// Confirms the form's `module`/`assignee` rows exist before any write.
async fn check_bug_refs(db: &DatabaseConnection, form: &BugForm) -> Result<(), AppError> {
    let module_exists = match form.module {
        Some(id) => module::Entity::find_by_id(id).one(db).await?.is_some(),
        None => true,
    };
    let assignee_exists = match form.assignee {
        Some(id) => UserEntity::find_by_id(id).one(db).await?.is_some(),
        None => true,
    };

    validate_bug_refs(form, module_exists, assignee_exists)
}

async fn find_bug(db: &DatabaseConnection, id: i32) -> Result<bug::Model, AppError> {
    BugEntity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::BugNotFound))
}

async fn bug_detail(db: &DatabaseConnection, bug: bug::Model) -> Result<BugDetailResponse, AppError> {
    let mut user_ids = vec![bug.creator_id];
    if let Some(assignee) = bug.assignee_id {
        user_ids.push(assignee);
    }
    let names = usernames(db, user_ids).await?;

    let (module_path, module_cascade) = match bug.module_id {
        Some(id) => module_paths(db, vec![id])
            .await?
            .remove(&id)
            .unwrap_or_default(),
        None => Default::default(),
    };

    let attachments = AttachmentEntity::find()
        .filter(bug_attachment::Column::BugId.eq(bug.id))
        .order_by_asc(bug_attachment::Column::CreatedAt)
        .all(db)
        .await?
        .into_iter()
        .map(AttachmentResponse::from)
        .collect();

    Ok(BugDetailResponse {
        id: bug.id,
        title: bug.title,
        description: bug.description,
        severity: bug.severity,
        priority: bug.priority,
        status: bug.status,
        module: bug.module_id,
        module_path,
        module_cascade,
        version: bug.version,
        creator: bug.creator_id,
        creator_name: names.get(&bug.creator_id).cloned().unwrap_or_default(),
        assignee: bug.assignee_id,
        assignee_name: bug
            .assignee_id
            .and_then(|id| names.get(&id).cloned())
            .unwrap_or_default(),
        solution: bug.solution,
        reject_reason: bug.reject_reason,
        attachments,
        created_at: bug.created_at,
        updated_at: bug.updated_at,
    })
}

#[get("/bugs")]
pub async fn list_bugs(
    db: web::Data<DatabaseConnection>,
    query: web::Query<BugListQuery>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    // Filters combine with AND; visibility itself is not role-gated.
    let mut condition = Condition::all();
    if let Some(status) = query.status {
        condition = condition.add(bug::Column::Status.eq(status));
    }
    if let Some(severity) = query.severity {
        condition = condition.add(bug::Column::Severity.eq(severity));
    }
    if let Some(priority) = query.priority {
        condition = condition.add(bug::Column::Priority.eq(priority));
    }
    if let Some(assignee) = query.assignee {
        condition = condition.add(bug::Column::AssigneeId.eq(assignee));
    }
    if let Some(creator) = query.creator {
        condition = condition.add(bug::Column::CreatorId.eq(creator));
    }
    if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        condition = condition.add(
            Condition::any()
                .add(bug::Column::Title.contains(search))
                .add(bug::Column::Description.contains(search)),
        );
    }
    match query.my_bugs {
        Some(MyBugsFilter::Created) => {
            condition = condition.add(bug::Column::CreatorId.eq(*user_id));
        }
        Some(MyBugsFilter::Assigned) => {
            condition = condition.add(bug::Column::AssigneeId.eq(*user_id));
        }
        None => {}
    }

    let bugs = BugEntity::find()
        .filter(condition)
        .order_by_desc(bug::Column::CreatedAt)
        .all(db.get_ref())
        .await?;

    let mut user_ids: Vec<i32> = bugs.iter().map(|b| b.creator_id).collect();
    user_ids.extend(bugs.iter().filter_map(|b| b.assignee_id));
    let names = usernames(db.get_ref(), user_ids).await?;

    let module_ids: Vec<i32> = bugs.iter().filter_map(|b| b.module_id).collect();
    let paths = module_paths(db.get_ref(), module_ids).await?;

    let response: Vec<BugListResponse> = bugs
        .into_iter()
        .map(|b| BugListResponse {
            id: b.id,
            title: b.title,
            severity: b.severity,
            priority: b.priority,
            status: b.status,
            module: b.module_id,
            module_path: b
                .module_id
                .and_then(|id| paths.get(&id).map(|(path, _)| path.clone()))
                .unwrap_or_default(),
            version: b.version,
            creator: b.creator_id,
            creator_name: names.get(&b.creator_id).cloned().unwrap_or_default(),
            assignee: b.assignee_id,
            assignee_name: b
                .assignee_id
                .and_then(|id| names.get(&id).cloned())
                .unwrap_or_default(),
            created_at: b.created_at,
            updated_at: b.updated_at,
        })
        .collect();

    Ok(HttpResponse::Ok().json(response))
}

#[post("/bugs")]
pub async fn create_bug(
    payload: Multipart,
    db: web::Data<DatabaseConnection>,
    store: web::Data<BlobStore>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let caller = current_user(db.get_ref(), *user_id).await?;
    authorize(&caller, &Action::CreateBug)?;

    let (fields, files) = collect_multipart(payload, store.get_ref()).await?;
    let form = parse_bug_form(&fields)?;
    check_bug_refs(db.get_ref(), &form).await?;

    let txn = db.begin().await?;
    let now = Utc::now();

    let new_bug = bug::ActiveModel {
        title: Set(form.title),
        description: Set(form.description),
        severity: Set(form.severity),
        priority: Set(form.priority),
        status: Set(BugStatus::Pending),
        module_id: Set(form.module),
        version: Set(form.version),
        // The creator is always the caller, whatever the form says.
        creator_id: Set(caller.id),
        assignee_id: Set(form.assignee),
        solution: Set(String::new()),
        reject_reason: Set(String::new()),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        ..Default::default()
    };
    let inserted = new_bug.insert(&txn).await?;

    for file in files {
        let attachment = bug_attachment::ActiveModel {
            bug_id: Set(inserted.id),
            file: Set(file),
            created_at: Set(now.into()),
            ..Default::default()
        };
        attachment.insert(&txn).await?;
    }

    txn.commit().await?;

    let response = bug_detail(db.get_ref(), inserted).await?;
    Ok(HttpResponse::Created().json(response))
}

#[get("/bugs/{id}")]
pub async fn get_bug(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let bug = find_bug(db.get_ref(), path.into_inner()).await?;
    let response = bug_detail(db.get_ref(), bug).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Full update of the editable fields; freshly uploaded files append to the
/// existing attachments, removal goes through the attachment endpoint.
#[put("/bugs/{id}")]
pub async fn update_bug(
    path: web::Path<i32>,
    payload: Multipart,
    db: web::Data<DatabaseConnection>,
    store: web::Data<BlobStore>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let caller = current_user(db.get_ref(), *user_id).await?;
    let bug = find_bug(db.get_ref(), path.into_inner()).await?;
    authorize(&caller, &Action::UpdateBug(&bug))?;

    let (fields, files) = collect_multipart(payload, store.get_ref()).await?;
    let form: BugForm = parse_bug_form(&fields)?;
    check_bug_refs(db.get_ref(), &form).await?;

    let txn = db.begin().await?;
    let now = Utc::now();

    let mut model: bug::ActiveModel = bug.into();
    model.title = Set(form.title);
    model.description = Set(form.description);
    model.severity = Set(form.severity);
    model.priority = Set(form.priority);
    model.module_id = Set(form.module);
    model.version = Set(form.version);
    model.assignee_id = Set(form.assignee);
    model.updated_at = Set(now.into());
    let updated = model.update(&txn).await?;

    for file in files {
        let attachment = bug_attachment::ActiveModel {
            bug_id: Set(updated.id),
            file: Set(file),
            created_at: Set(now.into()),
            ..Default::default()
        };
        attachment.insert(&txn).await?;
    }

    txn.commit().await?;

    let response = bug_detail(db.get_ref(), updated).await?;
    Ok(HttpResponse::Ok().json(response))
}

#[delete("/bugs/{id}")]
pub async fn delete_bug(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let caller = current_user(db.get_ref(), *user_id).await?;
    authorize(&caller, &Action::DeleteBug)?;

    let result = BugEntity::delete_by_id(path.into_inner())
        .exec(db.get_ref())
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::new(ErrorCode::BugNotFound));
    }

    Ok(HttpResponse::NoContent().finish())
}

#[post("/bugs/{id}/update_status")]
pub async fn update_bug_status(
    path: web::Path<i32>,
    body: web::Json<BugStatusUpdateRequest>,
    db: web::Data<DatabaseConnection>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    // Note requirements are checked before the role gate.
    validate_status_change(&body)?;

    let bug = find_bug(db.get_ref(), path.into_inner()).await?;
    let caller = current_user(db.get_ref(), *user_id).await?;
    authorize(&caller, &Action::UpdateBugStatus { bug: &bug, new_status: body.status })?;

    let mut model: bug::ActiveModel = bug.into();
    model.status = Set(body.status);
    match body.status {
        BugStatus::Resolved => {
            model.solution = Set(body.solution.clone().unwrap_or_default());
        }
        BugStatus::Rejected => {
            model.reject_reason = Set(body.reject_reason.clone().unwrap_or_default());
        }
        _ => {}
    }
    model.updated_at = Set(Utc::now().into());
    let updated = model.update(db.get_ref()).await?;

    Ok(HttpResponse::Ok()
        .json(serde_json::json!({ "detail": "status updated", "status": updated.status })))
}

/// The assignee's role is deliberately not checked here; the frontend picker
/// is backed by `/users/developers` but the API accepts any user id.
#[post("/bugs/{id}/assign")]
pub async fn assign_bug(
    path: web::Path<i32>,
    body: web::Json<BugAssignRequest>,
    db: web::Data<DatabaseConnection>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let caller = current_user(db.get_ref(), *user_id).await?;
    authorize(&caller, &Action::AssignBug)?;

    let bug = find_bug(db.get_ref(), path.into_inner()).await?;

    let assignee = body.assignee.ok_or_else(|| AppError::new(ErrorCode::MissingAssignee))?;

    let mut model: bug::ActiveModel = bug.into();
    model.assignee_id = Set(Some(assignee));
    model.updated_at = Set(Utc::now().into());
    model.update(db.get_ref()).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "detail": "bug assigned" })))
}

#[post("/bugs/{id}/upload_attachment")]
pub async fn upload_attachment(
    path: web::Path<i32>,
    payload: Multipart,
    db: web::Data<DatabaseConnection>,
    store: web::Data<BlobStore>,
) -> Result<HttpResponse, AppError> {
    let bug = find_bug(db.get_ref(), path.into_inner()).await?;

    let (_, mut files) = collect_multipart(payload, store.get_ref()).await?;
    let file = files.pop().ok_or_else(|| AppError::new(ErrorCode::MissingFile))?;

    let attachment = bug_attachment::ActiveModel {
        bug_id: Set(bug.id),
        file: Set(file),
        created_at: Set(Utc::now().into()),
        ..Default::default()
    };
    let inserted = attachment.insert(db.get_ref()).await?;

    Ok(HttpResponse::Created().json(AttachmentResponse::from(inserted)))
}

#[delete("/bugs/{id}/attachment/{attachment_id}")]
pub async fn delete_attachment(
    path: web::Path<(i32, i32)>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let (bug_id, attachment_id) = path.into_inner();
    let bug = find_bug(db.get_ref(), bug_id).await?;

    let attachment = AttachmentEntity::find()
        .filter(
            Condition::all()
                .add(bug_attachment::Column::Id.eq(attachment_id))
                .add(bug_attachment::Column::BugId.eq(bug.id)),
        )
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::AttachmentNotFound))?;

    AttachmentEntity::delete_by_id(attachment.id)
        .exec(db.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "detail": "attachment deleted" })))
}

/// Returns a draft for re-reporting an existing bug. Nothing is persisted;
/// attachments are listed by reference and the blobs are not duplicated.
#[get("/bugs/{id}/copy")]
pub async fn copy_bug(
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let bug = find_bug(db.get_ref(), path.into_inner()).await?;

    let module_cascade = match bug.module_id {
        Some(id) => module_paths(db.get_ref(), vec![id])
            .await?
            .remove(&id)
            .map(|(_, cascade)| cascade)
            .unwrap_or_default(),
        None => vec![],
    };

    let attachments: Vec<AttachmentResponse> = AttachmentEntity::find()
        .filter(bug_attachment::Column::BugId.eq(bug.id))
        .order_by_asc(bug_attachment::Column::CreatedAt)
        .all(db.get_ref())
        .await?
        .into_iter()
        .map(AttachmentResponse::from)
        .collect();

    let response = BugCopyResponse::from_bug(&bug, *user_id, module_cascade, attachments);
    Ok(HttpResponse::Ok().json(response))
}
