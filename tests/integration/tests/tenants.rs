//! Multi-tenant configuration scenarios.

use ds_model::{EntityKind, User, UserStorage};
use ds_store::{ReaderStore, WriterStore};

use crate::common::{realm, request, TestEnv, ADDRESSES, ORGANIZATIONS, PARTNERS, USERS};

/// Settings fall back from storage to realm to global defaults.
#[tokio::test]
async fn test_configuration_fallback() -> anyhow::Result<()> {
    let mut realm = realm().with_property("unique_emails", "true").with_property("page_size", "100");
    realm.user_storages[1] = UserStorage::new("partners")
        .with_sources(PARTNERS, ORGANIZATIONS, ADDRESSES)
        .with_property("unique_emails", "false");
    let env = TestEnv::with_realm(realm);

    let default = env.stores()?;
    let partners = env.storage("partners")?;

    assert!(default.config().unique_emails);
    assert!(!partners.config().unique_emails);
    assert_eq!(partners.config().page_size, 100);
    assert_eq!(default.config().group_filter_pattern, "*_{app}");
    Ok(())
}

/// Storages of one realm see only their own users.
#[tokio::test]
async fn test_storages_are_isolated() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let default = env.stores()?;
    let partners = env.storage("partners")?;

    default.writer.create_user(&User::new("jdoe"), &request()).await?;
    partners.writer.create_user(&User::new("pdupont"), &request()).await?;

    assert!(env.directory.contains(&format!("uid=jdoe,{USERS}")));
    assert!(env.directory.contains(&format!("uid=pdupont,{PARTNERS}")));
    assert!(default.reader.get_user("pdupont").await?.is_none());
    assert!(partners.reader.get_user("jdoe").await?.is_none());

    let err = partners
        .writer
        .delete_user("jdoe", &request())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(
        err.to_string(),
        "user 'jdoe' not found in realm domaine1, storage partners"
    );
    Ok(())
}

/// A storage-level mapping replaces the user rules of that storage only.
#[tokio::test]
async fn test_storage_mapping_override() -> anyhow::Result<()> {
    let mut realm = realm();
    realm.user_storages[1] = realm.user_storages[1].clone().with_mapping(
        EntityKind::User,
        vec![
            "username:uid".into(),
            "mail:mail".into(),
            "attributes.employee_number:employeeNumber".into(),
        ],
    );
    let env = TestEnv::with_realm(realm);
    let partners = env.storage("partners")?;

    let user = User::new("pdupont")
        .with_name("Pierre", "Dupont")
        .with_attribute("employee_number", vec!["E-042".into()]);
    partners.writer.create_user(&user, &request()).await?;

    let entry = env
        .directory
        .entry(&format!("uid=pdupont,{PARTNERS}"))
        .expect("entry written");
    assert_eq!(entry.get_attr("employeeNumber"), Some("E-042"));
    assert!(!entry.has_attr("sn"));

    let read = partners.reader.get_user("pdupont").await?.expect("user exists");
    assert_eq!(read.attributes["employee_number"], vec!["E-042"]);
    assert!(read.last_name.is_none());
    Ok(())
}

/// Unique emails are enforced across the users of a storage.
#[tokio::test]
async fn test_unique_emails() -> anyhow::Result<()> {
    let env = TestEnv::with_realm(realm().with_property("unique_emails", "true"));
    let stores = env.stores()?;
    stores
        .writer
        .create_user(&User::new("jdoe").with_mail("john.doe@insee.fr"), &request())
        .await?;

    let err = stores
        .writer
        .create_user(&User::new("jdoe2").with_mail("john.doe@insee.fr"), &request())
        .await
        .unwrap_err();
    assert!(err.is_policy_violation());
    assert!(stores.reader.get_user("jdoe2").await?.is_none());

    let err = stores
        .writer
        .update_user(&User::new("nobody").with_mail("john.doe@insee.fr"), &request())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

/// Only listed attributes can be managed by applications.
#[tokio::test]
async fn test_app_managed_attributes() -> anyhow::Result<()> {
    let env = TestEnv::with_realm(realm().with_property("app_managed_attribute_keys", "inseeGroupeDefaut,inseeRoleApplicatif"));
    let stores = env.stores()?;
    stores.writer.create_user(&User::new("jdoe"), &request()).await?;

    stores
        .writer
        .add_app_managed_attribute("jdoe", "inseeRoleApplicatif", "sirene_reader", &request())
        .await?;
    stores
        .writer
        .add_app_managed_attribute("jdoe", "inseeRoleApplicatif", "sirene_reader", &request())
        .await?;
    let entry = env.directory.entry(&format!("uid=jdoe,{USERS}")).expect("entry exists");
    assert_eq!(entry.get_attrs("inseeRoleApplicatif").map(Vec::len), Some(1));

    let err = stores
        .writer
        .add_app_managed_attribute("jdoe", "userPassword", "x", &request())
        .await
        .unwrap_err();
    assert!(err.is_policy_violation());
    Ok(())
}

/// Changed definitions apply after the tenant is invalidated.
#[tokio::test]
async fn test_registry_invalidation() -> anyhow::Result<()> {
    let mut env = TestEnv::new();
    let before = env.stores()?;
    assert!(!before.config().unique_emails);

    env.realm = realm().with_property("unique_emails", "true");
    assert!(!env.stores()?.config().unique_emails);

    assert_eq!(env.registry.invalidate_realm("domaine1"), 1);
    assert!(env.stores()?.config().unique_emails);
    Ok(())
}
