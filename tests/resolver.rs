use std::sync::Arc;

use anyhow::Result;

use decl_perms::db;
use decl_perms::declarations::{AppConfig, AppRegistry, DeclarationRegistry, GroupMember, GroupSpec, PermissionSpec};
use decl_perms::models::User;
use decl_perms::store::{IdentityStore, SqliteIdentityStore};
use decl_perms::{PermissionBackend, PermissionRef, Reconciler, Resolver};

const RESTRICTED: &str = "test_app.restricted_model";
const GLOBAL: &str = "global_permissions.test_app.global";
const OTHER_GLOBAL: &str = "global_permissions.other_app.global";

struct Fixture {
    store: SqliteIdentityStore,
    resolver: Resolver,
}

impl Fixture {
    async fn new() -> Result<Self> {
        let store = SqliteIdentityStore::new(db::memory_pool().await?);
        store.register_entity_type("test_app", "RestrictedModel").await?;

        let mut registry = DeclarationRegistry::new(
            AppRegistry::new()
                .install(AppConfig::new("test_app", "test_app"))
                .install(AppConfig::new("other_app", "other_app")),
        );
        registry.declare_permission(
            PermissionSpec::new("RestrictedModelPermission", "test_app::permissions")
                .model("RestrictedModel")
                .description("Enables the user to write in RestrictedModel"),
        )?;
        registry.declare_permission(
            PermissionSpec::new("GlobalPermission", "test_app::permissions")
                .global()
                .description("Enables the user to write in any model"),
        )?;
        // same declared name and codename in another app
        registry.declare_permission(
            PermissionSpec::new("GlobalPermission", "other_app::permissions")
                .global()
                .description("Enables the user to write in any other_app model"),
        )?;
        registry.declare_group(
            GroupSpec::new("AuthorizedGroup", "test_app::groups")
                .members(vec![GroupMember::Named(RESTRICTED.to_string())]),
        )?;
        registry.declare_group(GroupSpec::new("UnauthorizedGroup", "test_app::groups").members(vec![]))?;

        Reconciler::new(&registry, &store)
            .create_groups(Some("test_app::groups"))
            .await?;

        let resolver = Resolver::new(Arc::new(registry), Arc::new(store.clone()));
        Ok(Self { store, resolver })
    }

    async fn grant(&self, user: &User, identifier: &str) -> Result<()> {
        let permission = self
            .store
            .find_permission_by_identifier(identifier)
            .await?
            .expect("permission exists");
        self.store.grant_user_permission(user.id, permission.id).await?;
        Ok(())
    }

    async fn join(&self, user: &User, group: &str) -> Result<()> {
        let group = self.store.find_group(group).await?.expect("group exists");
        self.store.add_user_to_group(user.id, group.id).await?;
        Ok(())
    }

    async fn has(&self, user: &User, identifier: &str) -> Result<bool> {
        Ok(self
            .resolver
            .has_permission(user, PermissionRef::from(identifier), None)
            .await?)
    }
}

#[tokio::test]
async fn user_without_grants_has_nothing() -> Result<()> {
    let fx = Fixture::new().await?;
    let user = fx.store.create_user("nobody", false).await?;

    for declaration in fx.resolver.registry().permissions() {
        assert!(
            !declaration.user_has_permission(&fx.resolver, &user).await?,
            "{} unexpectedly granted",
            declaration.identifier()
        );
    }

    Ok(())
}

#[tokio::test]
async fn direct_grant_resolves() -> Result<()> {
    let fx = Fixture::new().await?;
    let user = fx.store.create_user("direct", false).await?;
    fx.grant(&user, RESTRICTED).await?;

    assert!(fx.has(&user, RESTRICTED).await?);
    assert!(!fx.has(&user, GLOBAL).await?);

    let declaration = fx.resolver.registry().lookup(RESTRICTED).expect("declared");
    assert!(declaration.user_has_permission(&fx.resolver, &user).await?);

    let held = fx.store.user_permissions(&user).await?;
    assert!(held.contains(RESTRICTED));
    assert_eq!(held.len(), 1);

    Ok(())
}

#[tokio::test]
async fn group_membership_resolves() -> Result<()> {
    let fx = Fixture::new().await?;
    let authorized = fx.store.create_user("authorized", false).await?;
    let unauthorized = fx.store.create_user("unauthorized", false).await?;
    fx.join(&authorized, "authorized").await?;
    fx.join(&unauthorized, "unauthorized").await?;

    assert!(fx.has(&authorized, RESTRICTED).await?);
    assert!(!fx.has(&unauthorized, RESTRICTED).await?);

    Ok(())
}

#[tokio::test]
async fn inactive_users_are_denied() -> Result<()> {
    let fx = Fixture::new().await?;
    let user = fx.store.create_user("inactive", false).await?;
    fx.grant(&user, RESTRICTED).await?;
    fx.store.set_user_active(user.id, false).await?;

    let user = fx.store.get_user(user.id).await?.expect("user exists");
    assert!(!user.is_active);
    assert!(!fx.has(&user, RESTRICTED).await?);

    Ok(())
}

#[tokio::test]
async fn superusers_pass_every_check() -> Result<()> {
    let fx = Fixture::new().await?;
    let admin = fx.store.create_user("admin", true).await?;

    assert!(fx.has(&admin, RESTRICTED).await?);
    assert!(fx.has(&admin, GLOBAL).await?);
    assert!(fx.has(&admin, "test_app.never_declared").await?);

    Ok(())
}

#[tokio::test]
async fn missing_permission_reference_never_grants() -> Result<()> {
    let fx = Fixture::new().await?;
    let admin = fx.store.create_user("admin", true).await?;

    assert!(!fx.resolver.has_permission(&admin, PermissionRef::Nothing, None).await?);
    assert!(!fx
        .resolver
        .has_permission(&admin, PermissionRef::from(None::<&str>), None)
        .await?);

    Ok(())
}

#[tokio::test]
async fn global_permissions_of_different_apps_do_not_collide() -> Result<()> {
    let fx = Fixture::new().await?;
    let user = fx.store.create_user("global", false).await?;
    fx.grant(&user, GLOBAL).await?;

    assert!(fx.has(&user, GLOBAL).await?);
    assert!(!fx.has(&user, OTHER_GLOBAL).await?);

    let globals = fx.store.global_permissions().await?;
    let identifiers: Vec<String> = globals.iter().map(|p| p.identifier()).collect();
    assert!(identifiers.contains(&GLOBAL.to_string()));
    assert!(identifiers.contains(&OTHER_GLOBAL.to_string()));

    Ok(())
}

#[tokio::test]
async fn malformed_identifiers_are_denied() -> Result<()> {
    let fx = Fixture::new().await?;
    let user = fx.store.create_user("someone", false).await?;
    fx.grant(&user, RESTRICTED).await?;

    assert!(!fx.has(&user, "restricted_model").await?);
    assert!(!fx.has(&user, "").await?);

    Ok(())
}
