use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bug_attachments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub bug_id: i32,
    pub file: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::bug::Entity",
        from = "Column::BugId",
        to = "super::bug::Column::Id"
    )]
    Bug,
}

impl Related<super::bug::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bug.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
