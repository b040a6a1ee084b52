pub mod jimeng;
pub mod projects;
pub mod system;
