pub use sea_orm_migration::prelude::*;

mod m20260215_000001_create_user_table;
mod m20260215_000002_create_project_table;
mod m20260215_000003_create_product_table;
mod m20260215_000004_create_module_table;
mod m20260215_000005_create_bug_table;
mod m20260215_000006_create_bug_attachment_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260215_000001_create_user_table::Migration),
            Box::new(m20260215_000002_create_project_table::Migration),
            Box::new(m20260215_000003_create_product_table::Migration),
            Box::new(m20260215_000004_create_module_table::Migration),
            Box::new(m20260215_000005_create_bug_table::Migration),
            Box::new(m20260215_000006_create_bug_attachment_table::Migration),
        ]
    }
}
