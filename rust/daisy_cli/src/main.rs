//! `daisy-perms` - provisioning and inspection for the DAISY permission store.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::debug;

use daisy_core::config::parse_entity_records;
use daisy_core::types::{Capability, CheckRequest, EntityRecord, EntityRef, Principal};
use daisy_store::PermissionService;

#[derive(Parser)]
#[command(name = "daisy-perms")]
#[command(about = "Permission store administration for DAISY")]
#[command(version)]
struct Cli {
    /// Path of the permission database
    #[arg(long, env = "DAISY_PERMS_DB", default_value = config::DEFAULT_DB, global = true)]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the default group permissions
    Seed,
    /// Check a permission; exits non-zero when forbidden
    Check {
        /// user:<id> or group:<name>
        principal: String,
        /// One capability or a comma-separated set, e.g. edit_dataset
        capability: String,
        /// Entity type, e.g. dataset
        entity_type: String,
        entity_id: String,
        /// Only consult global and direct grants on the entity itself
        #[arg(long, default_value = "false")]
        suppress_delegation: bool,
    },
    /// Grant a capability on an entity (kind:id), or globally with --global
    Grant {
        principal: Principal,
        capability: Capability,
        #[arg(required_unless_present = "global")]
        entity: Option<EntityRef>,
        #[arg(long, conflicts_with = "entity")]
        global: bool,
    },
    /// Revoke an explicit grant
    Revoke {
        principal: Principal,
        capability: Capability,
        #[arg(required_unless_present = "global")]
        entity: Option<EntityRef>,
        #[arg(long, conflicts_with = "entity")]
        global: bool,
    },
    /// Create or replace an entity
    PutEntity {
        /// kind:id
        entity: EntityRef,
        /// Link to a related entity, NAME=VALUE (repeatable)
        #[arg(long = "link", value_parser = config::parse_link)]
        links: Vec<(String, String)>,
    },
    /// Load entities from a JSON array of {"type", "id", ...links}
    Import { file: PathBuf },
    /// Make a principal custodian of an entity
    AddCustodian { principal: Principal, entity: EntityRef },
    /// Remove a custodian
    RemoveCustodian { principal: Principal, entity: EntityRef },
    /// Add a user to a group
    JoinGroup { user: String, group: String },
    /// Remove a user from a group
    LeaveGroup { user: String, group: String },
    /// Re-apply custodian grants for every stored membership
    Reconcile,
    /// List a principal's grants
    Grants { principal: Principal },
    /// Print the audit trail
    Audit {
        /// Only records after this sequence number
        #[arg(long, default_value = "0")]
        since: u64,
    },
}

enum Outcome {
    Done,
    Forbidden,
}

fn run(cli: Cli) -> anyhow::Result<Outcome> {
    let service = PermissionService::open(&cli.db)
        .with_context(|| format!("opening permission store at {}", cli.db.display()))?;

    match cli.command {
        Commands::Seed => {
            let report = service.seed_group_defaults()?;
            println!("granted {} revoked {}", report.granted, report.revoked);
        }
        Commands::Check {
            principal,
            capability,
            entity_type,
            entity_id,
            suppress_delegation,
        } => {
            let request = CheckRequest::parse(
                &principal,
                &capability,
                &entity_type,
                &entity_id,
                suppress_delegation,
            )?;
            if service.check_request(&request)? {
                println!("allowed");
            } else {
                println!("forbidden");
                return Ok(Outcome::Forbidden);
            }
        }
        Commands::Grant {
            principal,
            capability,
            entity,
            ..
        } => {
            let changed = match entity {
                Some(entity) => service.grant(&principal, capability, &entity)?,
                None => service.grant_global(&principal, capability)?,
            };
            println!("{}", if changed { "granted" } else { "unchanged" });
        }
        Commands::Revoke {
            principal,
            capability,
            entity,
            ..
        } => {
            let changed = match entity {
                Some(entity) => service.revoke(&principal, capability, &entity)?,
                None => service.revoke_global(&principal, capability)?,
            };
            println!("{}", if changed { "revoked" } else { "unchanged" });
        }
        Commands::PutEntity { entity, links } => {
            let mut record = EntityRecord::new(entity.kind, entity.id);
            for (name, value) in links {
                record = record.with_link(name, value);
            }
            service.put_entity(&record)?;
        }
        Commands::Import { file } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let records = parse_entity_records(&json)
                .with_context(|| format!("parsing {}", file.display()))?;
            let count = service.import(&records)?;
            println!("imported {}", count);
        }
        Commands::AddCustodian { principal, entity } => {
            service.add_custodian(&principal, &entity)?;
        }
        Commands::RemoveCustodian { principal, entity } => {
            service.remove_custodian(&principal, &entity)?;
        }
        Commands::JoinGroup { user, group } => {
            service.join_group(&user, &group)?;
        }
        Commands::LeaveGroup { user, group } => {
            service.leave_group(&user, &group)?;
        }
        Commands::Reconcile => {
            let report = service.reconcile_memberships()?;
            println!(
                "memberships {} granted {} revoked {}",
                report.memberships, report.granted, report.revoked
            );
        }
        Commands::Grants { principal } => {
            let grants = service.grants_for(&principal)?;
            for row in &grants.object {
                println!("{} on {}", row.capability, row.entity);
            }
            for (capability, _) in &grants.global {
                println!("{} (global)", capability);
            }
        }
        Commands::Audit { since } => {
            for record in service.audit_since(since)? {
                println!("{}", record);
            }
        }
    }
    Ok(Outcome::Done)
}

fn main() -> anyhow::Result<ExitCode> {
    config::init_tracing();
    let cli = Cli::parse();
    debug!(db = %cli.db.display(), "starting");

    match run(cli)? {
        Outcome::Done => Ok(ExitCode::SUCCESS),
        Outcome::Forbidden => Ok(ExitCode::FAILURE),
    }
}
