use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mesa_core::model::{Operation, TenantId, UserId};

#[derive(Debug, Parser)]
#[command(name = "mesa", version, about = "Tenant-scoped module access checks")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Answer from an in-memory store seeded with this JSON batch of writes
    /// instead of Postgres.
    #[arg(long, global = true)]
    pub fixture: Option<PathBuf>,

    /// Print the metrics counters to stderr before exiting.
    #[arg(long, global = true)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Migrate,
    /// Exits 0 when allowed, 2 when denied, 1 on error.
    Check {
        #[arg(long)]
        tenant: TenantId,
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        module: String,
        #[arg(long)]
        operation: Operation,
    },
    /// Prints the effective permission map as JSON.
    Permissions {
        #[arg(long)]
        tenant: TenantId,
        #[arg(long)]
        user: UserId,
    },
    /// Applies a JSON batch of writes.
    Seed {
        #[arg(long)]
        file: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    const TENANT: &str = "6f1c1d2e-8a4b-4c39-9a52-3f0d7b5e2a10";
    const USER: &str = "0b8e3a52-77f1-4f0e-8d4c-2c6a9e1b5d33";

    #[test]
    fn cli_parses_migrate_subcommand() {
        let cli = Cli::parse_from(["mesa", "migrate"]);
        assert!(matches!(cli.command, Command::Migrate));
        assert!(!cli.metrics);
    }

    #[test]
    fn cli_parses_check() {
        let cli = Cli::parse_from([
            "mesa",
            "check",
            "--tenant",
            TENANT,
            "--user",
            USER,
            "--module",
            "coupons",
            "--operation",
            "delete",
        ]);
        assert!(matches!(
            cli.command,
            Command::Check { ref module, operation: Operation::Delete, tenant, .. }
                if module == "coupons" && tenant.to_string() == TENANT
        ));
    }

    #[test]
    fn cli_rejects_unknown_operation() {
        let result = Cli::try_parse_from([
            "mesa",
            "check",
            "--tenant",
            TENANT,
            "--user",
            USER,
            "--module",
            "coupons",
            "--operation",
            "truncate",
        ]);
        assert!(result.is_err(), "unknown operation must not parse");
    }

    #[test]
    fn cli_rejects_malformed_tenant_id() {
        let result = Cli::try_parse_from([
            "mesa",
            "permissions",
            "--tenant",
            "not-a-uuid",
            "--user",
            USER,
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_global_flags_work_after_subcommand() {
        let cli = Cli::parse_from([
            "mesa",
            "permissions",
            "--tenant",
            TENANT,
            "--user",
            USER,
            "--fixture",
            "/tmp/restaurant.json",
            "--config",
            "/etc/mesa.toml",
            "--metrics",
        ]);
        assert_eq!(cli.fixture, Some(PathBuf::from("/tmp/restaurant.json")));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/mesa.toml")));
        assert!(cli.metrics);
        assert!(matches!(cli.command, Command::Permissions { .. }));
    }

    #[test]
    fn cli_parses_seed() {
        let cli = Cli::parse_from(["mesa", "seed", "--file", "writes.json"]);
        assert!(matches!(
            cli.command,
            Command::Seed { ref file } if file == &PathBuf::from("writes.json")
        ));
    }

    #[test]
    fn cli_requires_subcommand() {
        let result = Cli::try_parse_from(["mesa"]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_version_flag() {
        let result = Cli::try_parse_from(["mesa", "--version"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }
}
