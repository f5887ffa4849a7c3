pub mod health;
pub mod technical_metadata;
