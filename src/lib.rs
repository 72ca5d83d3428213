//! ant-watcher: an in-memory mirror of GitHub Actions state.
//!
//! Organizations, repositories, workflows, runs, jobs and steps are kept in
//! one [`store::EntityStore`], fed by two independent producers: the REST
//! [`backfill`] walker and the [`webhooks`] ingester. Both deliver partial
//! views that are merged field by field into the stored tree.

pub mod backfill;
pub mod config;
pub mod github;
pub mod logging;
pub mod server;
pub mod store;
pub mod types;
pub mod webhooks;

#[cfg(test)]
mod test_utils;
