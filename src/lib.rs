//! Persistence layer for a realworld-style social blogging backend: articles,
//! comments, tags, users, favorites and the follow graph, on Postgres via
//! Diesel.
//!
//! The two entry points are [`store::ArticleStore`] and [`store::UserStore`],
//! both constructed over a shared [`db::Pool`]. Multi-statement mutations (an
//! article created with its tags, a favorite edge with its counter update)
//! run in one transaction; the denormalized `favorites_count` is only ever
//! moved by relative updates evaluated inside the database, so it stays equal
//! to the number of favorite edges under concurrent callers.

pub mod db;
pub mod error;
pub mod model;
pub mod store;

pub use db::{connect, connect_from_env, Pool};
pub use error::{StoreError, StoreResult};
pub use store::{ArticleStore, UserStore};
