use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "genres")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::track_genre::Entity")]
    TrackGenre,
}

impl Related<super::track::Entity> for Entity {
    fn to() -> RelationDef {
        super::track_genre::Relation::Track.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::track_genre::Relation::Genre.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
