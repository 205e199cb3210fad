//! Hierarchical configuration resolution for Windows backup templates.
//!
//! A template declares settings (registry keys, files, application probes)
//! in a shared block, selector-gated machine-specific blocks and
//! check-gated conditional sections. Resolution decides which blocks apply
//! to a machine, merges items that target the same resource, applies the
//! template's inheritance rules and emits an ordered, conflict-free
//! [`resolve::OperationPlan`] for an external executor.
//!
//! The public API is organised into layers:
//!
//! - **[`template`]**: data model, YAML loading and structural validation
//! - **[`context`]**: the machine facts resolution reads (live or fixed)
//! - **[`resolve`]**: selector and condition evaluation, aggregation,
//!   merging, rules, plan validation
//! - **[`commands`]**: top-level subcommands (`resolve`, `validate`, `version`)
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod context;
pub mod error;
pub mod exec;
pub mod hive;
pub mod logging;
pub mod resolve;
pub mod settings;
pub mod template;
