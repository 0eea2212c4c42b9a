pub mod events;
pub mod images;
pub mod models;
pub mod settings;
pub mod summary;
