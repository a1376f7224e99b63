pub mod api;
pub mod auth;
pub mod authz;
pub mod configuration;
pub mod db;
pub mod entity;
pub mod migration;
pub mod model;
pub mod storage;
pub mod telemetry;
