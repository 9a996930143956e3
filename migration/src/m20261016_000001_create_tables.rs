use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Reference tables keyed by name
        manager
            .create_table(
                Table::create()
                    .table(Site::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Site::Name).string().not_null().primary_key())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Artist::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Artist::Name)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Genre::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Genre::Name).string().not_null().primary_key())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Track::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Track::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Track::Name).string().not_null())
                    .col(ColumnDef::new(Track::SiteName).string().not_null())
                    .col(ColumnDef::new(Track::SourceLink).string())
                    .col(ColumnDef::new(Track::PublishedDate).date())
                    .col(ColumnDef::new(Track::ResolvedCatalogId).string())
                    .col(ColumnDef::new(Track::PreviewUrl).string())
                    .col(
                        ColumnDef::new(Track::DedupKey)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Track::CreatedAt)
                            .integer()
                            .not_null()
                            .default(Expr::cust("(strftime('%s', 'now'))")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tracks_site_name")
                            .from(Track::Table, Track::SiteName)
                            .to(Site::Table, Site::Name),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tracks_name_site")
                    .table(Track::Table)
                    .col(Track::Name)
                    .col(Track::SiteName)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TrackArtist::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(TrackArtist::TrackId).integer().not_null())
                    .col(ColumnDef::new(TrackArtist::ArtistName).string().not_null())
                    .primary_key(
                        Index::create()
                            .col(TrackArtist::TrackId)
                            .col(TrackArtist::ArtistName),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_track_artists_track_id")
                            .from(TrackArtist::Table, TrackArtist::TrackId)
                            .to(Track::Table, Track::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_track_artists_artist_name")
                            .from(TrackArtist::Table, TrackArtist::ArtistName)
                            .to(Artist::Table, Artist::Name),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TrackGenre::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(TrackGenre::TrackId).integer().not_null())
                    .col(ColumnDef::new(TrackGenre::GenreName).string().not_null())
                    .primary_key(
                        Index::create()
                            .col(TrackGenre::TrackId)
                            .col(TrackGenre::GenreName),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_track_genres_track_id")
                            .from(TrackGenre::Table, TrackGenre::TrackId)
                            .to(Track::Table, Track::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_track_genres_genre_name")
                            .from(TrackGenre::Table, TrackGenre::GenreName)
                            .to(Genre::Table, Genre::Name),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CatalogAccount::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CatalogAccount::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CatalogAccount::UserId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(CatalogAccount::DisplayName).string())
                    .col(ColumnDef::new(CatalogAccount::RefreshToken).string().not_null())
                    .col(ColumnDef::new(CatalogAccount::PlaylistId).string())
                    .col(
                        ColumnDef::new(CatalogAccount::CreatedAt)
                            .integer()
                            .not_null()
                            .default(Expr::cust("(strftime('%s', 'now'))")),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AuthSession::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AuthSession::Token)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AuthSession::Label).string().not_null())
                    .col(ColumnDef::new(AuthSession::ExpiresAt).integer().not_null())
                    .col(
                        ColumnDef::new(AuthSession::CreatedAt)
                            .integer()
                            .not_null()
                            .default(Expr::cust("(strftime('%s', 'now'))")),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AuthSession::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CatalogAccount::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TrackGenre::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TrackArtist::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Track::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Genre::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Artist::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Site::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Site {
    #[sea_orm(iden = "sites")]
    Table,
    Name,
}

#[derive(DeriveIden)]
enum Artist {
    #[sea_orm(iden = "artists")]
    Table,
    Name,
}

#[derive(DeriveIden)]
enum Genre {
    #[sea_orm(iden = "genres")]
    Table,
    Name,
}

#[derive(DeriveIden)]
enum Track {
    #[sea_orm(iden = "tracks")]
    Table,
    Id,
    Name,
    SiteName,
    SourceLink,
    PublishedDate,
    ResolvedCatalogId,
    PreviewUrl,
    DedupKey,
    CreatedAt,
}

#[derive(DeriveIden)]
enum TrackArtist {
    #[sea_orm(iden = "track_artists")]
    Table,
    TrackId,
    ArtistName,
}

#[derive(DeriveIden)]
enum TrackGenre {
    #[sea_orm(iden = "track_genres")]
    Table,
    TrackId,
    GenreName,
}

#[derive(DeriveIden)]
enum CatalogAccount {
    #[sea_orm(iden = "catalog_accounts")]
    Table,
    Id,
    UserId,
    DisplayName,
    RefreshToken,
    PlaylistId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum AuthSession {
    #[sea_orm(iden = "auth_sessions")]
    Table,
    Token,
    Label,
    ExpiresAt,
    CreatedAt,
}
