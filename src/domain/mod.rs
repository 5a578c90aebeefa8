//! Travel planning domain
//!
//! Tool definitions, prompt construction, place candidates and the repair
//! pipeline that turns raw model output into one validated JSON document.

pub mod places;
pub mod prompt;
pub mod repair;
pub mod tools;
