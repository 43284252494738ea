//! Application, group and membership scenarios.

use ds_model::{Application, Group, User};
use ds_store::{PageRequest, ReaderStore, SearchCriteria, WriterStore};

use crate::common::{request, TestEnv};

fn applitest() -> Application {
    Application::new("Applitest")
        .with_group(Group::new("Applitest", "Admin_Applitest").with_description("administrators"))
        .with_group(Group::new("Applitest", "Reader_Applitest"))
}

/// Create, reconcile and delete an application with its groups.
#[tokio::test]
async fn test_application_lifecycle() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let stores = env.stores()?;
    let naming = stores.reader.naming();

    stores.writer.create_application(&applitest(), &request()).await?;
    assert!(env.directory.contains(&naming.group_container("Applitest")));
    assert!(stores.reader.get_manager_group("Applitest").await?.is_some());

    let read = stores.reader.get_application("Applitest").await?.expect("application exists");
    assert_eq!(read.groups.len(), 2);
    assert_eq!(
        read.group("ADMIN_APPLITEST").and_then(|g| g.description.as_deref()),
        Some("administrators")
    );

    let reconciled = Application::new("Applitest")
        .with_group(Group::new("Applitest", "Reader_Applitest").with_description("readers"))
        .with_group(Group::new("Applitest", "Writer_Applitest"));
    stores.writer.update_application(&reconciled, &request()).await?;

    let read = stores.reader.get_application("Applitest").await?.expect("application exists");
    let mut names: Vec<_> = read.groups.iter().map(|g| g.name.clone()).collect();
    names.sort();
    assert_eq!(names, vec!["Reader_Applitest", "Writer_Applitest"]);
    assert!(stores.reader.get_group("Applitest", "Admin_Applitest").await?.is_none());

    let found = stores
        .reader
        .search_applications(&SearchCriteria::new().identifier("Applitest"), PageRequest::default())
        .await?;
    assert_eq!(found.total, 1);

    stores.writer.delete_application("Applitest", &request()).await?;
    assert!(stores.reader.get_application("Applitest").await?.is_none());
    assert!(!env.directory.contains(&naming.manager_group("Applitest")));
    Ok(())
}

/// Membership writes succeed whatever the current membership.
#[tokio::test]
async fn test_membership_is_idempotent() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let stores = env.stores()?;
    stores.writer.create_application(&applitest(), &request()).await?;
    stores.writer.create_user(&User::new("jdoe"), &request()).await?;
    stores.writer.create_user(&User::new("asmith"), &request()).await?;

    for _ in 0..3 {
        stores
            .writer
            .add_user_to_group("Applitest", "Reader_Applitest", "jdoe", &request())
            .await?;
    }
    stores
        .writer
        .add_user_to_group("Applitest", "Reader_Applitest", "asmith", &request())
        .await?;
    stores
        .writer
        .add_user_to_manager_group("Applitest", "asmith", &request())
        .await?;

    let members = stores
        .reader
        .get_users_in_group("Applitest", "Reader_Applitest")
        .await?;
    let mut usernames: Vec<_> = members.iter().map(|u| u.username.clone()).collect();
    usernames.sort();
    assert_eq!(usernames, vec!["asmith", "jdoe"]);

    let jdoe = stores.reader.get_user("jdoe").await?.expect("user exists");
    assert!(jdoe.is_member_of("Applitest", "reader_applitest"));
    let asmith = stores.reader.get_user("asmith").await?.expect("user exists");
    assert_eq!(asmith.groups.len(), 1);

    let readers = SearchCriteria::new().membership("Applitest", Some("Reader_Applitest".into()));
    let found = stores.reader.search_users(&readers, PageRequest::default()).await?;
    assert_eq!(found.total, 2);

    for _ in 0..2 {
        stores
            .writer
            .remove_user_from_group("Applitest", "Reader_Applitest", "jdoe", &request())
            .await?;
    }
    let group = stores.reader.get_group("Applitest", "Reader_Applitest").await?.expect("group exists");
    assert_eq!(group.members, vec!["asmith"]);
    Ok(())
}

/// Group names outside the tenant pattern are refused.
#[tokio::test]
async fn test_group_name_policy() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let stores = env.stores()?;
    stores.writer.create_application(&applitest(), &request()).await?;

    let err = stores
        .writer
        .create_group("Applitest", &Group::new("Applitest", "Writer_Other"), &request())
        .await
        .unwrap_err();
    assert!(err.is_policy_violation());

    let err = stores
        .writer
        .create_group("Applitest", &Group::new("Applitest", "Reader_Applitest"), &request())
        .await
        .unwrap_err();
    assert!(err.is_already_exists());
    Ok(())
}

/// Groups are shared by the storages of a realm; each storage sees and
/// rewrites only its own members.
#[tokio::test]
async fn test_members_from_other_storages() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let default = env.stores()?;
    let partners = env.storage("partners")?;
    default.writer.create_application(&applitest(), &request()).await?;
    default.writer.create_user(&User::new("jdoe"), &request()).await?;
    partners.writer.create_user(&User::new("jdoe"), &request()).await?;

    partners
        .writer
        .add_user_to_group("Applitest", "Admin_Applitest", "jdoe", &request())
        .await?;
    assert!(default
        .reader
        .get_users_in_group("Applitest", "Admin_Applitest")
        .await?
        .is_empty());
    assert!(default.reader.get_user("jdoe").await?.expect("user exists").groups.is_empty());

    let mut admins = Group::new("Applitest", "Admin_Applitest");
    admins.members = vec!["jdoe".into()];
    default.writer.update_group("Applitest", &admins, &request()).await?;

    let location = default.reader.naming().group_location("Applitest", "Admin_Applitest");
    let entry = env.directory.entry(&location).expect("group exists");
    assert_eq!(entry.get_attrs("uniqueMember").map(Vec::len), Some(2));
    assert_eq!(
        partners
            .reader
            .get_users_in_group("Applitest", "Admin_Applitest")
            .await?
            .len(),
        1
    );
    assert_eq!(
        default
            .reader
            .get_users_in_group("Applitest", "Admin_Applitest")
            .await?
            .len(),
        1
    );
    Ok(())
}
