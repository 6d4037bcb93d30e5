//! CNTEMAD distance-learning backend.
//!
//! Students pay per EC (teaching unit) by mobile money or bank transfer,
//! follow lessons, take quizzes and earn yearly certificates. Role dashboards
//! cover teachers, evaluators, center and national administrators; mentor and
//! guardian views run on simulated data.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod enrollment;
pub mod errors;
pub mod export;
pub mod jobs;
pub mod mock;
pub mod models;
pub mod notify;
pub mod payments;
pub mod period;
pub mod providers;
pub mod quiz;
pub mod webhooks;

#[cfg(test)]
mod test_support;
