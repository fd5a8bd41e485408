pub mod calendar_grid;
pub mod models;
pub mod time_layout;
