pub mod admin;
pub mod agent;
pub mod artisan;
pub mod events;
pub mod public;
pub mod wizard;
