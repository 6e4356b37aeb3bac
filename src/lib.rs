//! vMCP: a multiplexing gateway that fronts multiple backend MCP servers
//! behind one unified endpoint.
//!
//! A declared `config::Config` is loaded (`loader::document` or
//! `loader::object_store`), reconciled into a materialized deployment
//! artifact (`control_loop::reconcile`), and used to discover and merge
//! backend capabilities (`aggregator`) into a routing table
//! (`router::Router`) that the request path consults to dispatch tool
//! calls to the right backend, under per-backend health tracking and
//! circuit breaking (`health`), with outgoing requests authenticated per
//! `auth::strategy`. Composite tools are orchestrated by
//! `workflow::WorkflowEngine`.

pub mod aggregator;
pub mod auth;
pub mod config;
pub mod control_loop;
pub mod duration;
pub mod error;
pub mod health;
pub mod identity;
pub mod loader;
pub mod mcp_client;
pub mod router;
pub mod workflow;

pub use error::VmcpError;
