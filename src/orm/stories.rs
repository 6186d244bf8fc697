use sea_orm::entity::prelude::*;

/// `expires_at` is fixed at creation time (24 hours out). Readers filter on
/// it; nothing reaps the rows.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "stories")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub author_id: i32,
    pub media_url: String,
    pub created_at: DateTime,
    pub expires_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::AuthorId",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Users,
    #[sea_orm(has_many = "super::story_views::Entity")]
    StoryViews,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl Related<super::story_views::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StoryViews.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
