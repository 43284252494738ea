//! Certificate and key scenarios.

use ds_model::{Organization, User};
use ds_store::{PageRequest, ReaderStore, SearchCriteria, StoreError, WriterStore};

use crate::common::{certificate, request, TestEnv};

/// Rotating a certificate keeps exactly one correlation id, the new one.
#[tokio::test]
async fn test_certificate_rotation() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let stores = env.stores()?;
    stores
        .writer
        .create_user(
            &User::new("jdoe").with_attribute("properties", vec!["theme$dark".into()]),
            &request(),
        )
        .await?;
    let old = certificate("John Doe", 2040)?;
    let new = certificate("John Doe 2", 2041)?;

    stores.writer.update_user_certificate("jdoe", &old, &request()).await?;
    let first_id = stores
        .reader
        .get_user("jdoe")
        .await?
        .and_then(|u| u.metadata.certificate)
        .and_then(|m| m.id)
        .expect("certificate id recorded");

    stores.writer.update_user_certificate("jdoe", &new, &request()).await?;
    let user = stores.reader.get_user("jdoe").await?.expect("user exists");
    let metadata = user.metadata.certificate.clone().expect("metadata derived");
    assert_ne!(metadata.id.as_deref(), Some(first_id.as_str()));
    assert!(metadata.valid);
    assert!(metadata.subject.contains("John Doe 2"));

    let properties = &user.attributes["properties"];
    assert!(properties.contains(&"theme$dark".to_string()));
    assert_eq!(properties.iter().filter(|p| p.starts_with("certificateId$")).count(), 1);

    let by_new = stores
        .reader
        .search_users(&SearchCriteria::new().certificate(new), PageRequest::default())
        .await?;
    assert_eq!(by_new.total, 1);
    let by_old = stores
        .reader
        .search_users(&SearchCriteria::new().certificate(old), PageRequest::default())
        .await?;
    assert_eq!(by_old.total, 0);

    stores.writer.delete_user_certificate("jdoe", &request()).await?;
    let user = stores.reader.get_user("jdoe").await?.expect("user exists");
    assert!(user.certificate.is_none());
    assert_eq!(user.attributes["properties"], vec!["theme$dark"]);
    Ok(())
}

/// Expired certificates are stored and reported as invalid.
#[tokio::test]
async fn test_expired_certificate_is_flagged() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let stores = env.stores()?;
    stores.writer.create_user(&User::new("jdoe"), &request()).await?;

    stores
        .writer
        .update_user_certificate("jdoe", &certificate("John Doe", 2021)?, &request())
        .await?;

    let metadata = stores
        .reader
        .get_user("jdoe")
        .await?
        .and_then(|u| u.metadata.certificate)
        .expect("metadata derived");
    assert!(!metadata.valid);

    let err = stores
        .writer
        .update_user_certificate("jdoe", b"garbage", &request())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidCertificate(_)));
    Ok(())
}

/// GPG keys are replaced and removed on the organization entry.
#[tokio::test]
async fn test_organization_gpg_key() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let stores = env.stores()?;
    stores
        .writer
        .create_organization(&Organization::new("insee"), &request())
        .await?;

    stores
        .writer
        .update_organization_gpg_key("insee", b"first key", &request())
        .await?;
    stores
        .writer
        .update_organization_gpg_key("insee", b"second key", &request())
        .await?;
    let organization = stores.reader.get_organization("insee").await?.expect("organization exists");
    assert_eq!(organization.gpg_key.as_deref(), Some(&b"second key"[..]));

    stores.writer.delete_organization_gpg_key("insee", &request()).await?;
    stores.writer.delete_organization_gpg_key("insee", &request()).await?;
    let organization = stores.reader.get_organization("insee").await?.expect("organization exists");
    assert!(organization.gpg_key.is_none());
    Ok(())
}

/// Replacing a user's properties keeps the id of its certificate.
#[tokio::test]
async fn test_properties_update_keeps_certificate_id() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let stores = env.stores()?;
    stores.writer.create_user(&User::new("jdoe"), &request()).await?;
    let der = certificate("John Doe", 2040)?;
    stores.writer.update_user_certificate("jdoe", &der, &request()).await?;

    stores
        .writer
        .update_user(
            &User::new("jdoe").with_attribute("properties", vec!["theme$light".into()]),
            &request(),
        )
        .await?;

    let user = stores.reader.get_user("jdoe").await?.expect("user exists");
    assert!(user.metadata.certificate.and_then(|m| m.id).is_some());
    assert!(user.attributes["properties"].contains(&"theme$light".to_string()));

    let by_certificate = stores
        .reader
        .search_users(&SearchCriteria::new().certificate(der), PageRequest::default())
        .await?;
    assert_eq!(by_certificate.total, 1);
    Ok(())
}
