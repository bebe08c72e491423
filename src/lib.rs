//! Curricula: a hierarchical course-catalog engine.
//!
//! A local-first catalog of course categories (a forest with materialized
//! paths and a dense global display order), courses with pluggable formats,
//! sections, and plugin-owned activity modules, all stored in one SQLite
//! database under a store root.
//!
//! # Architecture
//!
//! ## The Thin Waist
//!
//! Every state mutation routes through [`core::broker::DbBroker`]:
//! - Serialization (in-process lock around the connection)
//! - Audit logging (`catalog.events.jsonl`)
//!
//! ## Capability Gate
//!
//! Operations never assume an ambient actor. Each call takes an explicit
//! [`core::capability::Actor`] and a [`core::capability::CapabilityGate`],
//! and checks capabilities along the target's context chain (module,
//! course, category ancestry, system).
//!
//! ## External Surface
//!
//! [`core::external`] wraps the managers with declared output schemas:
//! whatever a manager returns is cleaned against the schema before it
//! leaves the process, so internal bookkeeping columns never leak.
//!
//! # Quick Start
//!
//! ```text
//! curricula init
//! curricula category add "Science"
//! curricula course add --category 1 --fullname "Physics 101" --shortname phys101
//! curricula course contents 1
//! ```

pub mod cli;
pub mod core;
