//! Owner-scoped todo list.
//!
//! The [`store::TodoStore`] trait abstracts persistence; [`sqlite`] is the
//! shipped implementation and [`board::TodoBoard`] the controller the
//! presentation layer drives.

pub mod board;
pub mod sqlite;
pub mod store;
