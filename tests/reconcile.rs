use anyhow::Result;

use decl_perms::authz::AuthzMode;
use decl_perms::db;
use decl_perms::declarations::{AppConfig, AppRegistry, DeclarationRegistry, GroupMember, GroupSpec, PermissionSpec};
use decl_perms::store::{IdentityStore, SqliteIdentityStore};
use decl_perms::{Reconciler, Settings};

const RESTRICTED: &str = "test_app.restricted_model";
const GLOBAL: &str = "global_permissions.test_app.global";

async fn setup_store() -> Result<SqliteIdentityStore> {
    let store = SqliteIdentityStore::new(db::memory_pool().await?);
    store.register_entity_type("test_app", "RestrictedModel").await?;
    store.register_entity_type("test_app", "UnrestrictedModel").await?;
    Ok(store)
}

fn named(names: &[&str]) -> Vec<GroupMember> {
    names.iter().map(|name| GroupMember::Named(name.to_string())).collect()
}

/// The test app's declarations, with a configurable description and member list.
fn declarations(restricted_description: &str, authorized: &[&str]) -> Result<DeclarationRegistry> {
    let mut registry = DeclarationRegistry::new(AppRegistry::new().install(AppConfig::new("test_app", "test_app")));

    registry.declare_permission(
        PermissionSpec::new("RestrictedModelPermission", "test_app::permissions")
            .model("RestrictedModel")
            .description(restricted_description),
    )?;
    registry.declare_permission(
        PermissionSpec::new("GlobalPermission", "test_app::permissions")
            .global()
            .description("Enables the user to write in any model"),
    )?;

    registry.declare_group(GroupSpec::new("AuthorizedGroup", "test_app::groups").members(named(authorized)))?;
    registry.declare_group(GroupSpec::new("UnauthorizedGroup", "test_app::groups").members(vec![]))?;

    Ok(registry)
}

async fn group_identifiers(store: &SqliteIdentityStore, group: &str) -> Result<Vec<String>> {
    let group = store.find_group(group).await?.expect("group exists");
    let mut identifiers: Vec<String> = store
        .group_permissions(group.id)
        .await?
        .iter()
        .map(|p| p.identifier())
        .collect();
    identifiers.sort();
    Ok(identifiers)
}

#[tokio::test]
async fn create_permissions_is_idempotent() -> Result<()> {
    let store = setup_store().await?;
    let registry = declarations("Enables the user to write in RestrictedModel", &["RestrictedModelPermission"])?;
    let reconciler = Reconciler::new(&registry, &store);

    let first = reconciler.create_permissions().await?;
    assert_eq!(first.permissions_created, 2);
    assert_eq!(store.count_permissions().await?, 2);
    let stored = store.find_permission_by_identifier(RESTRICTED).await?.expect("stored");

    let second = reconciler.create_permissions().await?;
    assert_eq!(second.permissions_created, 0);
    assert_eq!(second.permissions_unchanged, 2);
    assert_eq!(store.count_permissions().await?, 2);
    let again = store.find_permission_by_identifier(RESTRICTED).await?.expect("stored");
    assert_eq!(stored.id, again.id);

    Ok(())
}

#[tokio::test]
async fn get_or_create_returns_the_same_row() -> Result<()> {
    let store = setup_store().await?;
    let registry = declarations("Write RestrictedModel", &[])?;
    let declaration = registry.lookup(RESTRICTED).expect("declared");

    let (first, created) = declaration.get_or_create(&store).await?;
    assert!(created);
    let (second, created) = declaration.get_or_create(&store).await?;
    assert!(!created);
    assert_eq!(first.id, second.id);
    assert_eq!(store.count_permissions().await?, 1);

    Ok(())
}

#[tokio::test]
async fn group_get_or_create_returns_the_same_row() -> Result<()> {
    let store = setup_store().await?;
    let registry = declarations("Write RestrictedModel", &[])?;
    let declaration = registry.groups_in("test_app::groups").into_iter().next().expect("declared");

    let err = declaration.get(&store).await.unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {}", err);

    let (first, created) = declaration.get_or_create(&store).await?;
    assert!(created);
    assert_eq!(first.name, "authorized");
    let (second, created) = declaration.get_or_create(&store).await?;
    assert!(!created);
    assert_eq!(first.id, second.id);

    let fetched = declaration.get(&store).await?;
    assert_eq!(fetched.id, first.id);

    Ok(())
}

#[tokio::test]
async fn global_permissions_live_under_the_marker_entity_type() -> Result<()> {
    let store = setup_store().await?;
    let registry = declarations("Write RestrictedModel", &[])?;
    Reconciler::new(&registry, &store).create_permissions().await?;

    let globals = store.global_permissions().await?;
    assert_eq!(globals.len(), 1);
    assert_eq!(globals[0].codename, "test_app.global");
    assert_eq!(globals[0].identifier(), GLOBAL);

    Ok(())
}

#[tokio::test]
async fn changed_description_is_updated_in_place() -> Result<()> {
    let store = setup_store().await?;

    let old = declarations("Old description", &[])?;
    Reconciler::new(&old, &store).create_permissions().await?;
    let before = store.find_permission_by_identifier(RESTRICTED).await?.expect("stored");

    let new = declarations("New description", &[])?;
    let report = Reconciler::new(&new, &store).create_permissions().await?;
    assert_eq!(report.permissions_updated, 1);
    assert_eq!(report.permissions_unchanged, 1);

    let after = store.find_permission_by_identifier(RESTRICTED).await?.expect("stored");
    assert_eq!(after.id, before.id);
    assert_eq!(after.codename, before.codename);
    assert_eq!(after.description, "New description");
    assert_eq!(store.count_permissions().await?, 2);

    Ok(())
}

#[tokio::test]
async fn group_permissions_are_replaced_not_merged() -> Result<()> {
    let store = setup_store().await?;

    let v1 = declarations("Write RestrictedModel", &["RestrictedModelPermission"])?;
    let report = Reconciler::new(&v1, &store).create_groups(Some("test_app::groups")).await?;
    assert_eq!(report.groups_created, 2);
    assert_eq!(report.groups_synced, 2);
    assert_eq!(group_identifiers(&store, "authorized").await?, vec![RESTRICTED.to_string()]);
    assert!(group_identifiers(&store, "unauthorized").await?.is_empty());

    // unchanged declarations leave the associations alone
    let report = Reconciler::new(&v1, &store).create_groups(Some("test_app::groups")).await?;
    assert_eq!(report.groups_created, 0);
    assert_eq!(group_identifiers(&store, "authorized").await?, vec![RESTRICTED.to_string()]);

    let v2 = declarations("Write RestrictedModel", &["GlobalPermission"])?;
    Reconciler::new(&v2, &store).create_groups(Some("test_app::groups")).await?;
    assert_eq!(group_identifiers(&store, "authorized").await?, vec![GLOBAL.to_string()]);

    Ok(())
}

#[tokio::test]
async fn syncing_groups_before_permissions_fails_with_not_found() -> Result<()> {
    let store = setup_store().await?;
    let registry = declarations("Write RestrictedModel", &["RestrictedModelPermission"])?;

    let err = Reconciler::new(&registry, &store)
        .sync_groups("test_app::groups")
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {}", err);

    Ok(())
}

#[tokio::test]
async fn permissions_outside_the_permissions_module_are_not_created() -> Result<()> {
    let store = setup_store().await?;
    let mut registry = declarations("Write RestrictedModel", &[])?;
    registry.declare_permission(
        PermissionSpec::new("ExportPermission", "test_app::views")
            .global()
            .description("Export reports"),
    )?;
    registry.declare_group(
        GroupSpec::new("ExportersGroup", "test_app::export_groups").members(named(&["ExportPermission"])),
    )?;

    let reconciler = Reconciler::new(&registry, &store);
    let err = reconciler.create_groups(Some("test_app::export_groups")).await.unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {}", err);
    assert_eq!(store.count_permissions().await?, 2);

    Ok(())
}

#[tokio::test]
async fn unregistered_target_model_is_not_found() -> Result<()> {
    let store = SqliteIdentityStore::new(db::memory_pool().await?);
    let registry = declarations("Write RestrictedModel", &[])?;

    let err = Reconciler::new(&registry, &store).create_permissions().await.unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {}", err);

    Ok(())
}

#[tokio::test]
async fn missing_default_groups_module_is_a_configuration_error() -> Result<()> {
    let store = setup_store().await?;
    let registry = declarations("Write RestrictedModel", &[])?;
    let reconciler = Reconciler::new(&registry, &store);

    assert!(reconciler.create_groups(None).await.unwrap_err().is_configuration());
    assert!(reconciler.create_groups(Some("  ")).await.unwrap_err().is_configuration());
    assert!(reconciler
        .create_groups(Some("test_app::no_groups_here"))
        .await
        .unwrap_err()
        .is_configuration());

    // permissions still ran first
    assert_eq!(store.count_permissions().await?, 2);
    assert!(store.find_group("authorized").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn synchronize_all_uses_the_configured_module() -> Result<()> {
    let store = setup_store().await?;
    let registry = declarations("Write RestrictedModel", &["RestrictedModelPermission", "GlobalPermission"])?;
    let settings = Settings {
        database_url: "sqlite::memory:".to_string(),
        default_groups_module: Some("test_app::groups".to_string()),
        authz_mode: AuthzMode::Strict,
        login_url: None,
    };

    let report = Reconciler::new(&registry, &store).synchronize_all(&settings).await?;
    assert_eq!(report.permissions_created, 2);
    assert_eq!(report.groups_synced, 2);
    assert_eq!(
        group_identifiers(&store, "authorized").await?,
        vec![GLOBAL.to_string(), RESTRICTED.to_string()]
    );

    Ok(())
}
