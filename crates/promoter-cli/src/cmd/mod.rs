pub mod config;
pub mod controller;
pub mod crds;
pub mod promote;
