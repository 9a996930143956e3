pub mod artist;
pub mod auth_session;
pub mod catalog_account;
pub mod genre;
pub mod site;
pub mod track;
pub mod track_artist;
pub mod track_genre;
