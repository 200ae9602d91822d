//! # Jewei MSSQL MCP Server
//!
//! A Model Context Protocol (MCP) server for Microsoft SQL Server.
//!
//! This crate provides:
//! - **Tools**: Run read queries, describe tables, list tables, database info, health
//! - **Resources**: SQL authoring guidelines (`data://sql_describe`)
//! - **Prompts**: Greeting and table query templates
//!
//! ## Architecture
//!
//! MCP handlers are thin adapters over [`bridge::QueryBridge`], which owns
//! validation, row limits and catalog queries. The bridge talks to SQL Server
//! through the [`database::SqlBackend`] trait, implemented by
//! [`database::MssqlBackend`] on top of tiberius.

pub mod bridge;
pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod handlers;
pub mod prompts;
pub mod resources;
pub mod security;
pub mod server;
pub mod tools;
pub mod transport;

pub use bridge::{QueryBridge, QueryRequest};
pub use config::Config;
pub use database::{MssqlBackend, QueryResult, SqlBackend, SqlParam, SqlValue};
pub use error::{ErrorKind, ServerError};
pub use security::ValidationMode;
pub use server::JeweiMcpServer;
