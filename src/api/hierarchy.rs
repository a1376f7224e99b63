use std::collections::HashMap;

use actix_web::{HttpResponse, delete, get, post, put, web};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use sea_query::Condition;

use crate::api::user::current_user;
use crate::authz::{Action, authorize};
use crate::entity::{module, product, project};
use crate::model::global_error::{AppError, ErrorCode};
use crate::model::hierarchy::{
    ModuleCreateRequest, ModuleListQuery, ModuleResponse, ModuleUpdateRequest, ProductCreateRequest,
    ProductListQuery, ProductResponse, ProductSummary, ProductUpdateRequest, ProjectCreateRequest,
    ProjectListQuery, ProjectResponse, ProjectUpdateRequest, build_cascade_tree,
};

fn project_response(project: project::Model, products: Vec<ProductSummary>) -> ProjectResponse {
    ProjectResponse {
        id: project.id,
        name: project.name,
        description: project.description,
        is_active: project.is_active,
        products,
        created_at: project.created_at,
    }
}

fn module_response(module: module::Model, product_name: String) -> ModuleResponse {
    ModuleResponse {
        id: module.id,
        product: module.product_id,
        product_name,
        name: module.name,
        description: module.description,
        is_active: module.is_active,
        created_at: module.created_at,
    }
}

fn product_response(
    product: product::Model,
    project_name: String,
    modules: Vec<module::Model>,
) -> ProductResponse {
    let product_name = product.name.clone();
    ProductResponse {
        id: product.id,
        project: product.project_id,
        project_name,
        name: product.name,
        description: product.description,
        is_active: product.is_active,
        modules: modules
            .into_iter()
            .map(|m| module_response(m, product_name.clone()))
            .collect(),
        created_at: product.created_at,
    }
}

// ---- projects ----

#[get("/modules/projects")]
pub async fn list_projects(
    db: web::Data<DatabaseConnection>,
    query: web::Query<ProjectListQuery>,
) -> Result<HttpResponse, AppError> {
    let mut condition = Condition::all();
    if let Some(is_active) = query.is_active {
        condition = condition.add(project::Column::IsActive.eq(is_active));
    }

    let projects = project::Entity::find()
        .filter(condition)
        .order_by_asc(project::Column::Name)
        .all(db.get_ref())
        .await?;

    let products = product::Entity::find()
        .order_by_asc(product::Column::Name)
        .all(db.get_ref())
        .await?;
    let mut by_project: HashMap<i32, Vec<ProductSummary>> = HashMap::new();
    for p in products {
        by_project.entry(p.project_id).or_default().push(ProductSummary {
            id: p.id,
            name: p.name,
            is_active: p.is_active,
        });
    }

    let response: Vec<ProjectResponse> = projects
        .into_iter()
        .map(|p| {
            let children = by_project.remove(&p.id).unwrap_or_default();
            project_response(p, children)
        })
        .collect();

    Ok(HttpResponse::Ok().json(response))
}

#[post("/modules/projects")]
pub async fn create_project(
    body: web::Json<ProjectCreateRequest>,
    db: web::Data<DatabaseConnection>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let caller = current_user(db.get_ref(), *user_id).await?;
    authorize(&caller, &Action::ManageHierarchy)?;

    if body.name.trim().is_empty() {
        return Err(AppError::field("name", "name is required"));
    }

    let now = Utc::now();
    let new_project = project::ActiveModel {
        name: Set(body.name.trim().to_string()),
        description: Set(body.description.clone().unwrap_or_default()),
        is_active: Set(body.is_active.unwrap_or(true)),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        ..Default::default()
    };

    let inserted = new_project.insert(db.get_ref()).await?;
    Ok(HttpResponse::Created().json(project_response(inserted, vec![])))
}

#[get("/modules/projects/{id}")]
pub async fn get_project(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let project = project::Entity::find_by_id(path.into_inner())
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::ProjectNotFound))?;

    let products = product::Entity::find()
        .filter(product::Column::ProjectId.eq(project.id))
        .order_by_asc(product::Column::Name)
        .all(db.get_ref())
        .await?
        .into_iter()
        .map(|p| ProductSummary {
            id: p.id,
            name: p.name,
            is_active: p.is_active,
        })
        .collect();

    Ok(HttpResponse::Ok().json(project_response(project, products)))
}

#[put("/modules/projects/{id}")]
pub async fn update_project(
    path: web::Path<i32>,
    body: web::Json<ProjectUpdateRequest>,
    db: web::Data<DatabaseConnection>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let caller = current_user(db.get_ref(), *user_id).await?;
    authorize(&caller, &Action::ManageHierarchy)?;

    let project = project::Entity::find_by_id(path.into_inner())
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::ProjectNotFound))?;

    let mut model: project::ActiveModel = project.into();
    if let Some(name) = &body.name {
        model.name = Set(name.clone());
    }
    if let Some(description) = &body.description {
        model.description = Set(description.clone());
    }
    if let Some(is_active) = body.is_active {
        model.is_active = Set(is_active);
    }
    model.updated_at = Set(Utc::now().into());

    let updated = model.update(db.get_ref()).await?;
    Ok(HttpResponse::Ok().json(project_response(updated, vec![])))
}

/// Products and modules underneath go with it (FK cascade); bugs that
/// pointed at those modules keep existing with a null module.
#[delete("/modules/projects/{id}")]
pub async fn delete_project(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let caller = current_user(db.get_ref(), *user_id).await?;
    authorize(&caller, &Action::ManageHierarchy)?;

    let result = project::Entity::delete_by_id(path.into_inner())
        .exec(db.get_ref())
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::new(ErrorCode::ProjectNotFound));
    }

    Ok(HttpResponse::NoContent().finish())
}

// ---- products ----

#[get("/modules/products")]
pub async fn list_products(
    db: web::Data<DatabaseConnection>,
    query: web::Query<ProductListQuery>,
) -> Result<HttpResponse, AppError> {
    let mut condition = Condition::all();
    if let Some(project_id) = query.project {
        condition = condition.add(product::Column::ProjectId.eq(project_id));
    }
    if let Some(is_active) = query.is_active {
        condition = condition.add(product::Column::IsActive.eq(is_active));
    }

    let products = product::Entity::find()
        .filter(condition)
        .order_by_asc(product::Column::Name)
        .all(db.get_ref())
        .await?;

    let projects: HashMap<i32, String> = project::Entity::find()
        .all(db.get_ref())
        .await?
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect();

    let modules = module::Entity::find()
        .order_by_asc(module::Column::Name)
        .all(db.get_ref())
        .await?;
    let mut by_product: HashMap<i32, Vec<module::Model>> = HashMap::new();
    for m in modules {
        by_product.entry(m.product_id).or_default().push(m);
    }

    let response: Vec<ProductResponse> = products
        .into_iter()
        .map(|p| {
            let project_name = projects.get(&p.project_id).cloned().unwrap_or_default();
            let children = by_product.remove(&p.id).unwrap_or_default();
            product_response(p, project_name, children)
        })
        .collect();

    Ok(HttpResponse::Ok().json(response))
}

#[post("/modules/products")]
pub async fn create_product(
    body: web::Json<ProductCreateRequest>,
    db: web::Data<DatabaseConnection>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let caller = current_user(db.get_ref(), *user_id).await?;
    authorize(&caller, &Action::ManageHierarchy)?;

    if body.name.trim().is_empty() {
        return Err(AppError::field("name", "name is required"));
    }

    let parent = project::Entity::find_by_id(body.project)
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::field("project", "unknown project"))?;

    let now = Utc::now();
    let new_product = product::ActiveModel {
        project_id: Set(parent.id),
        name: Set(body.name.trim().to_string()),
        description: Set(body.description.clone().unwrap_or_default()),
        is_active: Set(body.is_active.unwrap_or(true)),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        ..Default::default()
    };

    let inserted = new_product.insert(db.get_ref()).await?;
    Ok(HttpResponse::Created().json(product_response(inserted, parent.name, vec![])))
}

#[get("/modules/products/{id}")]
pub async fn get_product(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let product = product::Entity::find_by_id(path.into_inner())
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::ProductNotFound))?;

    let project_name = project::Entity::find_by_id(product.project_id)
        .one(db.get_ref())
        .await?
        .map(|p| p.name)
        .unwrap_or_default();

    let modules = module::Entity::find()
        .filter(module::Column::ProductId.eq(product.id))
        .order_by_asc(module::Column::Name)
        .all(db.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(product_response(product, project_name, modules)))
}

#[put("/modules/products/{id}")]
pub async fn update_product(
    path: web::Path<i32>,
    body: web::Json<ProductUpdateRequest>,
    db: web::Data<DatabaseConnection>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let caller = current_user(db.get_ref(), *user_id).await?;
    authorize(&caller, &Action::ManageHierarchy)?;

    let product = product::Entity::find_by_id(path.into_inner())
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::ProductNotFound))?;

    let mut model: product::ActiveModel = product.into();
    if let Some(project_id) = body.project {
        project::Entity::find_by_id(project_id)
            .one(db.get_ref())
            .await?
            .ok_or_else(|| AppError::field("project", "unknown project"))?;
        model.project_id = Set(project_id);
    }
    if let Some(name) = &body.name {
        model.name = Set(name.clone());
    }
    if let Some(description) = &body.description {
        model.description = Set(description.clone());
    }
    if let Some(is_active) = body.is_active {
        model.is_active = Set(is_active);
    }
    model.updated_at = Set(Utc::now().into());

    let updated = model.update(db.get_ref()).await?;

    let project_name = project::Entity::find_by_id(updated.project_id)
        .one(db.get_ref())
        .await?
        .map(|p| p.name)
        .unwrap_or_default();

    Ok(HttpResponse::Ok().json(product_response(updated, project_name, vec![])))
}

#[delete("/modules/products/{id}")]
pub async fn delete_product(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let caller = current_user(db.get_ref(), *user_id).await?;
    authorize(&caller, &Action::ManageHierarchy)?;

    let result = product::Entity::delete_by_id(path.into_inner())
        .exec(db.get_ref())
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::new(ErrorCode::ProductNotFound));
    }

    Ok(HttpResponse::NoContent().finish())
}

// ---- modules ----

#[get("/modules/modules")]
pub async fn list_modules(
    db: web::Data<DatabaseConnection>,
    query: web::Query<ModuleListQuery>,
) -> Result<HttpResponse, AppError> {
    let mut condition = Condition::all();
    if let Some(product_id) = query.product {
        condition = condition.add(module::Column::ProductId.eq(product_id));
    }
    if let Some(is_active) = query.is_active {
        condition = condition.add(module::Column::IsActive.eq(is_active));
    }

    let modules = module::Entity::find()
        .filter(condition)
        .order_by_asc(module::Column::Name)
        .all(db.get_ref())
        .await?;

    let products: HashMap<i32, String> = product::Entity::find()
        .all(db.get_ref())
        .await?
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect();

    let response: Vec<ModuleResponse> = modules
        .into_iter()
        .map(|m| {
            let product_name = products.get(&m.product_id).cloned().unwrap_or_default();
            module_response(m, product_name)
        })
        .collect();

    Ok(HttpResponse::Ok().json(response))
}

#[post("/modules/modules")]
pub async fn create_module(
    body: web::Json<ModuleCreateRequest>,
    db: web::Data<DatabaseConnection>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let caller = current_user(db.get_ref(), *user_id).await?;
    authorize(&caller, &Action::ManageHierarchy)?;

    if body.name.trim().is_empty() {
        return Err(AppError::field("name", "name is required"));
    }

    let parent = product::Entity::find_by_id(body.product)
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::field("product", "unknown product"))?;

    let now = Utc::now();
    let new_module = module::ActiveModel {
        product_id: Set(parent.id),
        name: Set(body.name.trim().to_string()),
        description: Set(body.description.clone().unwrap_or_default()),
        is_active: Set(body.is_active.unwrap_or(true)),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        ..Default::default()
    };

    let inserted = new_module.insert(db.get_ref()).await?;
    Ok(HttpResponse::Created().json(module_response(inserted, parent.name)))
}

#[get("/modules/modules/{id}")]
pub async fn get_module(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let module = module::Entity::find_by_id(path.into_inner())
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::ModuleNotFound))?;

    let product_name = product::Entity::find_by_id(module.product_id)
        .one(db.get_ref())
        .await?
        .map(|p| p.name)
        .unwrap_or_default();

    Ok(HttpResponse::Ok().json(module_response(module, product_name)))
}

#[put("/modules/modules/{id}")]
pub async fn update_module(
    path: web::Path<i32>,
    body: web::Json<ModuleUpdateRequest>,
    db: web::Data<DatabaseConnection>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let caller = current_user(db.get_ref(), *user_id).await?;
    authorize(&caller, &Action::ManageHierarchy)?;

    let module = module::Entity::find_by_id(path.into_inner())
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::ModuleNotFound))?;

    let mut model: module::ActiveModel = module.into();
    if let Some(product_id) = body.product {
        product::Entity::find_by_id(product_id)
            .one(db.get_ref())
            .await?
            .ok_or_else(|| AppError::field("product", "unknown product"))?;
        model.product_id = Set(product_id);
    }
    if let Some(name) = &body.name {
        model.name = Set(name.clone());
    }
    if let Some(description) = &body.description {
        model.description = Set(description.clone());
    }
    if let Some(is_active) = body.is_active {
        model.is_active = Set(is_active);
    }
    model.updated_at = Set(Utc::now().into());

    let updated = model.update(db.get_ref()).await?;

    let product_name = product::Entity::find_by_id(updated.product_id)
        .one(db.get_ref())
        .await?
        .map(|p| p.name)
        .unwrap_or_default();

    Ok(HttpResponse::Ok().json(module_response(updated, product_name)))
}

#[delete("/modules/modules/{id}")]
pub async fn delete_module(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let caller = current_user(db.get_ref(), *user_id).await?;
    authorize(&caller, &Action::ManageHierarchy)?;

    let result = module::Entity::delete_by_id(path.into_inner())
        .exec(db.get_ref())
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::new(ErrorCode::ModuleNotFound));
    }

    Ok(HttpResponse::NoContent().finish())
}

// ---- cascade selector ----

/// Active-only project/product/module tree for the bug form selector.
#[get("/modules/cascade")]
pub async fn module_cascade(db: web::Data<DatabaseConnection>) -> Result<HttpResponse, AppError> {
    let projects = project::Entity::find()
        .filter(project::Column::IsActive.eq(true))
        .order_by_asc(project::Column::Name)
        .all(db.get_ref())
        .await?;
    let products = product::Entity::find()
        .filter(product::Column::IsActive.eq(true))
        .order_by_asc(product::Column::Name)
        .all(db.get_ref())
        .await?;
    let modules = module::Entity::find()
        .filter(module::Column::IsActive.eq(true))
        .order_by_asc(module::Column::Name)
        .all(db.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(build_cascade_tree(&projects, &products, &modules)))
}
