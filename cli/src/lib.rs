//! Bunny CLI - BuildKit frontend for unikernel packages.

pub mod commands;
