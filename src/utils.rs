//! This module provides various utility functions needed throughout pimcore-ops.
//!
//! These include running shell commands, keeping a sudo session and looking up the invoking user.

pub(crate) mod commands;
pub(crate) mod common;
pub(crate) mod sudo;
