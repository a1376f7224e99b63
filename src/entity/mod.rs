pub mod bug;
pub mod bug_attachment;
pub mod module;
pub mod product;
pub mod project;
pub mod user;
