//! MCP Host
//!
//! An in-process library that supervises multiple external MCP capability
//! servers over stdio and presents a single, routed surface for calling
//! their tools, prompts, and resources. Construct a [`Host`] and embed it;
//! there is no global state, so a process can run more than one.

pub mod cache;
pub mod config;
pub mod error;
pub mod host;
pub mod metrics;
pub mod process;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use host::Host;
