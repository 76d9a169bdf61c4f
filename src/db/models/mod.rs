#![allow(unused_imports)]

//! Database models split into separate files.
//! This module re-exports individual model modules so
//! `use crate::db::models::*;` reaches every type from one place.

pub mod group_config;
pub mod notification_task;
pub mod opportunity;
pub mod run;
pub mod system_config;

pub use self::group_config::*;
pub use self::notification_task::*;
pub use self::opportunity::*;
pub use self::run::*;
pub use self::system_config::*;
