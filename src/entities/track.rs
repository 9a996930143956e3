use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "tracks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub site_name: String,
    pub source_link: Option<String>,
    pub published_date: Option<Date>,
    /// Catalog track id, `None` until a match has been found
    pub resolved_catalog_id: Option<String>,
    pub preview_url: Option<String>,
    /// Site, name, artist set and genre set folded into one comparable string
    #[sea_orm(unique)]
    pub dedup_key: String,
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::site::Entity",
        from = "Column::SiteName",
        to = "super::site::Column::Name"
    )]
    Site,
    #[sea_orm(has_many = "super::track_artist::Entity")]
    TrackArtist,
    #[sea_orm(has_many = "super::track_genre::Entity")]
    TrackGenre,
}

impl Related<super::site::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Site.def()
    }
}

impl Related<super::artist::Entity> for Entity {
    fn to() -> RelationDef {
        super::track_artist::Relation::Artist.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::track_artist::Relation::Track.def().rev())
    }
}

impl Related<super::genre::Entity> for Entity {
    fn to() -> RelationDef {
        super::track_genre::Relation::Genre.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::track_genre::Relation::Track.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
