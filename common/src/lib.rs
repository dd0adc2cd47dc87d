// MySQL data-access layer shared by the portal's web and bot processes

pub mod config;
pub mod db;
pub mod errors;
pub mod net;
pub mod telemetry;
