//! Turn LLM artifact responses into a project tree, mount it into a sandbox
//! and run it.
//!
//! The pipeline is: [`step::parse`] a response into steps, reduce them into a
//! file tree and a command queue ([`reducer`]), mount the tree through a
//! [`sandbox::SessionManager`], run the queue with an
//! [`executor::CommandExecutor`] and start the dev server.
//! [`workspace::Workspace`] ties the pieces together across responses.

pub mod config;
pub mod errors;
pub mod executor;
pub mod export;
pub mod logging;
pub mod reducer;
pub mod sandbox;
pub mod step;
pub mod tree;
pub mod ui;
pub mod workspace;
