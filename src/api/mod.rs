pub mod bug;
pub mod health_check;
pub mod hierarchy;
pub mod user;

pub use crate::api::bug::{
    assign_bug, copy_bug, create_bug, delete_attachment, delete_bug, get_bug, list_bugs,
    update_bug, update_bug_status, upload_attachment,
};
pub use crate::api::hierarchy::{
    create_module, create_product, create_project, delete_module, delete_product, delete_project,
    get_module, get_product, get_project, list_modules, list_products, list_projects,
    module_cascade, update_module, update_product, update_project,
};
pub use crate::api::user::{
    change_password, create_user, delete_user, get_profile, get_user, list_developers, list_users,
    login, logout, refresh_token, reset_password, toggle_status, update_profile, update_user,
    upload_avatar,
};
