pub mod record;
pub mod user;
