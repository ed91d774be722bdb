//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::commands::{
    audit::AuditArgs, policy::PolicyArgs, run::RunArgs, status::StatusArgs, submit::SubmitArgs,
};

#[derive(Parser)]
#[command(name = "aianalysis")]
#[command(about = "AIAnalysis - root cause analysis controller", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file to use instead of the .aianalysis/ layering
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the analysis controller until interrupted
    Run(RunArgs),

    /// Create an analysis from a YAML manifest
    Submit(SubmitArgs),

    /// Show one analysis or list analyses
    Status(StatusArgs),

    /// Query the audit trail of a remediation
    Audit(AuditArgs),

    /// Approval policy commands
    Policy(PolicyArgs),
}
