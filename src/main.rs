use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use decl_perms::db;
use decl_perms::manifest::Manifest;
use decl_perms::store::{IdentityStore, ObjectPermissionIndex, ObjectRef, SqliteIdentityStore, SqliteObjectPermissionIndex};
use decl_perms::{PermissionBackend, PermissionRef, Reconciler, Resolver, Settings};

#[derive(Parser, Debug)]
#[command(author, version, about = "declarative permission and group reconciliation", long_about = None)]
struct Cli {
    /// JSON declaration manifest
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations and register the manifest's entity types
    Migrate,
    /// Create or update every declared permission
    CreatePermissions,
    /// Create permissions, then the default groups and their permission sets
    CreateGroups,
    /// Create a user account
    CreateUser {
        username: String,
        #[arg(long)]
        superuser: bool,
    },
    /// Grant a permission to a user, optionally for one object
    Grant {
        username: String,
        identifier: String,
        /// Object as `app.model:id`
        #[arg(long)]
        object: Option<String>,
    },
    /// Add a user to a group
    AddToGroup { username: String, group: String },
    /// Check whether a user holds a permission
    Check {
        username: String,
        identifier: String,
        /// Object as `app.model:id`
        #[arg(long)]
        object: Option<String>,
    },
    /// List stored permissions
    ListPermissions,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    let manifest = match &cli.manifest {
        Some(path) => Manifest::load(path)?,
        None => Manifest::default(),
    };

    let pool = db::init(&settings.database_url)
        .await
        .context("failed to open the identity store")?;
    let store = SqliteIdentityStore::new(pool.clone());

    match cli.command {
        Commands::Migrate => {
            for entity_type in manifest.entity_types() {
                store
                    .register_entity_type(&entity_type.app_label, &entity_type.model)
                    .await?;
            }
            println!("Migrations applied");
        }
        Commands::CreatePermissions => {
            let registry = manifest.build_registry()?;
            let report = Reconciler::new(&registry, &store).create_permissions().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::CreateGroups => {
            let registry = manifest.build_registry()?;
            let module = settings
                .default_groups_module
                .as_deref()
                .or(manifest.default_groups_module.as_deref());
            let report = Reconciler::new(&registry, &store).create_groups(module).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::CreateUser { username, superuser } => {
            let user = store.create_user(&username, superuser).await?;
            println!("Created user {} ({})", user.username, user.id);
        }
        Commands::Grant {
            username,
            identifier,
            object,
        } => {
            let user = store
                .find_user_by_username(&username)
                .await?
                .with_context(|| format!("unknown user {}", username))?;

            match object.as_deref().map(parse_object).transpose()? {
                Some(object) => {
                    SqliteObjectPermissionIndex::new(pool.clone())
                        .grant(&identifier, &user, &object)
                        .await?;
                    println!("Granted {} to {} on {}", identifier, username, object);
                }
                None => {
                    let permission = store
                        .find_permission_by_identifier(&identifier)
                        .await?
                        .with_context(|| format!("unknown permission {}", identifier))?;
                    store.grant_user_permission(user.id, permission.id).await?;
                    println!("Granted {} to {}", identifier, username);
                }
            }
        }
        Commands::AddToGroup { username, group } => {
            let user = store
                .find_user_by_username(&username)
                .await?
                .with_context(|| format!("unknown user {}", username))?;
            let group = store
                .find_group(&group)
                .await?
                .with_context(|| format!("unknown group {}", group))?;
            store.add_user_to_group(user.id, group.id).await?;
            println!("Added {} to {}", username, group.name);
        }
        Commands::Check {
            username,
            identifier,
            object,
        } => {
            let user = store
                .find_user_by_username(&username)
                .await?
                .with_context(|| format!("unknown user {}", username))?;
            let object = object.as_deref().map(parse_object).transpose()?;

            let resolver = Resolver::new(Arc::new(manifest.build_registry()?), Arc::new(store.clone()))
                .with_object_index(Arc::new(SqliteObjectPermissionIndex::new(pool.clone())));
            let allowed = resolver
                .has_permission(&user, PermissionRef::from(identifier.as_str()), object.as_ref())
                .await?;

            println!("{}", if allowed { "allowed" } else { "denied" });
            if !allowed {
                std::process::exit(1);
            }
        }
        Commands::ListPermissions => {
            for permission in store.list_permissions().await? {
                println!("{}\t{}", permission.identifier(), permission.description);
            }
        }
    }

    Ok(())
}

fn parse_object(value: &str) -> anyhow::Result<ObjectRef> {
    ObjectRef::parse(value).with_context(|| format!("object must look like app.model:id, got {}", value))
}

fn load_env() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(crate_env);
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
