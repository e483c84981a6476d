//! CLI command implementations.
//!
//! | Module    | Commands handled |
//! |-----------|------------------|
//! | `serve`   | `Serve`          |
//! | `config`  | `Config`         |
//! | `token`   | `Token`          |

pub mod config;
pub mod serve;
pub mod token;

pub use config::cmd_config;
pub use serve::{ServeOverrides, cmd_serve};
pub use token::cmd_token;
