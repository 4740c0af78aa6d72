//! Subcommands for knowledge base maintenance.

pub mod init;
