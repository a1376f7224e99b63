use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entity::{module, product, project};

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProjectCreateRequest {
    pub name: String,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProjectUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProductCreateRequest {
    pub project: i32,
    pub name: String,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProductUpdateRequest {
    pub project: Option<i32>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ModuleCreateRequest {
    pub product: i32,
    pub name: String,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ModuleUpdateRequest {
    pub product: Option<i32>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectListQuery {
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ProductListQuery {
    pub project: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ModuleListQuery {
    pub product: Option<i32>,
    pub is_active: Option<bool>,
}

/// Summary used when projects embed their products.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProductSummary {
    pub id: i32,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectResponse {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub products: Vec<ProductSummary>,
    pub created_at: DateTime<FixedOffset>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ModuleResponse {
    pub id: i32,
    pub product: i32,
    pub product_name: String,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub created_at: DateTime<FixedOffset>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductResponse {
    pub id: i32,
    pub project: i32,
    pub project_name: String,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub modules: Vec<ModuleResponse>,
    pub created_at: DateTime<FixedOffset>,
}

/// One node of the selector tree. Modules are leaves and omit the
/// `children` key entirely.
#[derive(Debug, Serialize, PartialEq, ToSchema)]
pub struct CascadeNode {
    pub value: i32,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<CascadeNode>>,
}

/// Builds the project -> product -> module selector tree.
///
/// Inactive rows are pruned at every level, including inactive children of
/// active parents. An active parent keeps an empty `children` array when
/// everything below it is pruned.
pub fn build_cascade_tree(
    projects: &[project::Model],
    products: &[product::Model],
    modules: &[module::Model],
) -> Vec<CascadeNode> {
    projects
        .iter()
        .filter(|p| p.is_active)
        .map(|project| CascadeNode {
            value: project.id,
            label: project.name.clone(),
            children: Some(
                products
                    .iter()
                    .filter(|p| p.is_active && p.project_id == project.id)
                    .map(|product| CascadeNode {
                        value: product.id,
                        label: product.name.clone(),
                        children: Some(
                            modules
                                .iter()
                                .filter(|m| m.is_active && m.product_id == product.id)
                                .map(|module| CascadeNode {
                                    value: module.id,
                                    label: module.name.clone(),
                                    children: None,
                                })
                                .collect(),
                        ),
                    })
                    .collect(),
            ),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn project(id: i32, name: &str, is_active: bool) -> project::Model {
        project::Model {
            id,
            name: name.to_string(),
            description: String::new(),
            is_active,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    fn product(id: i32, project_id: i32, name: &str, is_active: bool) -> product::Model {
        product::Model {
            id,
            project_id,
            name: name.to_string(),
            description: String::new(),
            is_active,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    fn module(id: i32, product_id: i32, name: &str, is_active: bool) -> module::Model {
        module::Model {
            id,
            product_id,
            name: name.to_string(),
            description: String::new(),
            is_active,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    #[test]
    fn nests_three_levels() {
        let tree = build_cascade_tree(
            &[project(1, "shop", true)],
            &[product(10, 1, "accounts", true)],
            &[module(100, 10, "signup", true), module(101, 10, "login", true)],
        );

        assert_eq!(tree.len(), 1);
        let products = tree[0].children.as_ref().unwrap();
        assert_eq!(products.len(), 1);
        let modules = products[0].children.as_ref().unwrap();
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0].value, 100);
        assert!(modules[0].children.is_none());
    }

    #[test]
    fn prunes_inactive_nodes_at_every_level() {
        let tree = build_cascade_tree(
            &[project(1, "shop", true), project(2, "old", false)],
            &[product(10, 1, "accounts", true), product(11, 1, "legacy", false)],
            &[module(100, 10, "signup", true), module(101, 10, "retired", false)],
        );

        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].value, 1);
        let products = tree[0].children.as_ref().unwrap();
        assert_eq!(products.len(), 1);
        let modules = products[0].children.as_ref().unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].value, 100);
    }

    #[test]
    fn active_parent_without_active_children_keeps_empty_list() {
        let tree = build_cascade_tree(
            &[project(1, "shop", true)],
            &[product(10, 1, "accounts", true)],
            &[module(100, 10, "retired", false)],
        );

        let products = tree[0].children.as_ref().unwrap();
        assert!(matches!(&products[0].children, Some(children) if children.is_empty()));
    }

    #[test]
    fn module_leaves_omit_children_key() {
        let tree = build_cascade_tree(
            &[project(1, "shop", true)],
            &[product(10, 1, "accounts", true)],
            &[module(100, 10, "signup", true)],
        );

        let json = serde_json::to_value(&tree).unwrap();
        let module = &json[0]["children"][0]["children"][0];
        assert_eq!(module["value"], 100);
        assert!(module.get("children").is_none());
    }
}
