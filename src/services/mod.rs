pub mod account;
pub mod auth_session;
pub mod catalog;
pub mod publish;
pub mod resolve;
pub mod resync;
pub mod track;
