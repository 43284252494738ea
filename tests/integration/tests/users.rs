//! User and organization scenarios.

use ds_model::{Application, Group, Organization, PostalAddress, User};
use ds_store::{PageRequest, ReaderStore, SearchCriteria, SearchType, StoreError, WriterStore};

use crate::common::{request, TestEnv, ADDRESSES};

fn insee_address() -> PostalAddress {
    PostalAddress::new(vec![
        "Insee".into(),
        "88 avenue Verdier".into(),
        "".into(),
        "92120 Montrouge".into(),
    ])
}

/// An organization with an address, and a user attached to it.
#[tokio::test]
async fn test_organization_and_member_with_addresses() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let stores = env.stores()?;

    let organization = Organization::new("insee")
        .with_address(insee_address())
        .with_attribute("description", "Institut national de la statistique");
    stores.writer.create_organization(&organization, &request()).await?;

    let user = User::new("jdoe")
        .with_name("John", "Doe")
        .with_mail("john.doe@insee.fr")
        .with_organization("insee")
        .with_address(PostalAddress::new(vec!["John Doe".into(), "Metz".into()]))
        .with_habilitation("role_sirene_reader");
    let response = stores.writer.create_user(&user, &request()).await?;
    assert!(response.is_ok());
    assert_eq!(response.correlation_id.as_deref(), Some("it-1"));

    let read = stores.reader.get_user("jdoe").await?.expect("user exists");
    assert_eq!(read.first_name.as_deref(), Some("John"));
    assert_eq!(read.organization.as_deref(), Some("insee"));
    assert_eq!(read.habilitations, vec!["role_sirene_reader"]);
    assert_eq!(read.address.as_ref().map(|a| a.lines[1].as_str()), Some("Metz"));

    let read = stores.reader.get_organization("insee").await?.expect("organization exists");
    let address = read.address.expect("address resolved");
    assert_eq!(address.lines[3], "92120 Montrouge");
    assert_eq!(
        read.attributes["description"],
        vec!["Institut national de la statistique"]
    );

    let members = stores
        .reader
        .search_users(&SearchCriteria::new().organization("insee"), PageRequest::default())
        .await?;
    assert_eq!(members.total, 1);
    Ok(())
}

/// Deleting a user removes its memberships and its address.
#[tokio::test]
async fn test_user_delete_cascades() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let stores = env.stores()?;
    let application = Application::new("Sirene").with_group(Group::new("Sirene", "Reader_Sirene"));
    stores.writer.create_application(&application, &request()).await?;
    stores
        .writer
        .create_user(&User::new("jdoe").with_address(insee_address()), &request())
        .await?;
    stores
        .writer
        .add_user_to_group("Sirene", "Reader_Sirene", "jdoe", &request())
        .await?;
    let address_id = stores
        .reader
        .get_user("jdoe")
        .await?
        .and_then(|u| u.address)
        .and_then(|a| a.id)
        .expect("address id recorded");

    stores.writer.delete_user("jdoe", &request()).await?;

    assert!(stores.reader.get_user("jdoe").await?.is_none());
    assert!(stores.reader.get_address(&address_id).await?.is_none());
    assert!(!env.directory.contains(&format!("l={address_id},{ADDRESSES}")));
    let group = stores.reader.get_group("Sirene", "Reader_Sirene").await?.expect("group kept");
    assert!(group.members.is_empty());
    Ok(())
}

/// Updating writes only the fields the caller set.
#[tokio::test]
async fn test_partial_update_keeps_other_fields() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let stores = env.stores()?;
    let user = User::new("jdoe")
        .with_name("John", "Doe")
        .with_mail("john.doe@insee.fr")
        .with_attribute("common_name", vec!["John Doe".into()]);
    stores.writer.create_user(&user, &request()).await?;

    stores
        .writer
        .update_user(&User::new("jdoe").with_mail("jd@insee.fr"), &request())
        .await?;

    let read = stores.reader.get_user("jdoe").await?.expect("user exists");
    assert_eq!(read.mail.as_deref(), Some("jd@insee.fr"));
    assert_eq!(read.last_name.as_deref(), Some("Doe"));
    assert_eq!(read.attributes["common_name"], vec!["John Doe"]);

    let found = stores
        .reader
        .search_users(
            &SearchCriteria::new().common_name("john").search_type(SearchType::Substring),
            PageRequest::default(),
        )
        .await?;
    assert_eq!(found.results.len(), 1);
    assert_eq!(found.results[0].username, "jdoe");
    Ok(())
}

/// Password initialization, change and reinitialization.
#[tokio::test]
async fn test_password_lifecycle() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let stores = env.stores()?;
    stores.writer.create_user(&User::new("jdoe"), &request()).await?;

    stores.writer.init_password("jdoe", "s3cret!", true, &request()).await?;
    let read = stores.reader.get_user("jdoe").await?.expect("user exists");
    assert_eq!(read.password_reset, Some(true));

    let err = stores
        .writer
        .change_password("jdoe", "nope", "n3w!", &request())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidCredential(_)));

    stores.writer.change_password("jdoe", "s3cret!", "n3w!", &request()).await?;
    stores.writer.reinit_password("jdoe", "g3nerated", false, &request()).await?;
    let read = stores.reader.get_user("jdoe").await?.expect("user exists");
    assert_eq!(read.password_reset, Some(false));

    let err = stores
        .writer
        .init_password("ghost", "s3cret!", true, &request())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

/// Paging over a filtered search reads no further than the requested page.
#[tokio::test]
async fn test_search_pages() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let stores = env.stores()?;
    for i in 0..5 {
        let user = User::new(format!("user{i}")).with_mail(format!("user{i}@insee.fr"));
        stores.writer.create_user(&user, &request()).await?;
    }
    stores
        .writer
        .create_user(&User::new("other").with_mail("other@example.org"), &request())
        .await?;

    let criteria = SearchCriteria::new().mail("@insee.fr").search_type(SearchType::Substring);
    let before = env.directory.entries_returned();
    let first = stores.reader.search_users(&criteria, PageRequest::at(0, 2)).await?;
    assert_eq!(first.results.len(), 2);
    assert!(first.has_more_results);
    assert_eq!(first.total, 3);
    assert_eq!(env.directory.entries_returned() - before, 3);

    let last = stores.reader.search_users(&criteria, PageRequest::at(4, 2)).await?;
    assert_eq!(last.results.len(), 1);
    assert_eq!(last.total, 5);
    assert!(!last.has_more_results);
    Ok(())
}
