//! User and group administration

mod common;

use common::{pool, schema_objects, warden};
use warden_store::{StoreError, Warden};

#[tokio::test]
async fn test_user_crud() {
    let warden = warden().await;
    let users = warden.users();

    let alice = users.create("alice").await.unwrap();
    let bob = users.create("bob").await.unwrap();
    assert_ne!(alice.id, bob.id);

    assert_eq!(users.get(alice.id).await.unwrap(), alice);
    assert_eq!(users.get_by_username("bob").await.unwrap(), Some(bob.clone()));
    assert!(users.get_by_username("nobody").await.unwrap().is_none());
    assert!(users.exists(alice.id).await.unwrap());

    let listed = users.list().await.unwrap();
    assert_eq!(listed, vec![alice.clone(), bob.clone()]);

    users.delete(alice.id).await.unwrap();
    assert!(!users.exists(alice.id).await.unwrap());
    assert!(matches!(
        users.get(alice.id).await,
        Err(StoreError::NotFound { entity: "user", .. })
    ));
    assert!(matches!(
        users.delete(alice.id).await,
        Err(StoreError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_duplicate_username_conflicts() {
    let warden = warden().await;
    warden.users().create("alice").await.unwrap();

    let err = warden.users().create("alice").await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));
    assert!(err.to_string().contains("alice"));
}

#[tokio::test]
async fn test_group_membership() {
    let warden = warden().await;
    let users = warden.users();
    let groups = warden.groups();

    let alice = users.create("alice").await.unwrap();
    let bob = users.create("bob").await.unwrap();
    let admins = groups.create("admins").await.unwrap();
    let staff = groups.create("staff").await.unwrap();

    groups.add_member(admins.id, alice.id).await.unwrap();
    groups.add_member(admins.id, alice.id).await.unwrap();
    groups.add_member(admins.id, bob.id).await.unwrap();
    groups.add_member(staff.id, alice.id).await.unwrap();

    assert_eq!(
        groups.members(admins.id).await.unwrap(),
        vec![alice.clone(), bob.clone()]
    );
    assert_eq!(
        groups.groups_for(alice.id).await.unwrap(),
        vec![admins.clone(), staff.clone()]
    );

    assert!(groups.remove_member(admins.id, bob.id).await.unwrap());
    assert!(!groups.remove_member(admins.id, bob.id).await.unwrap());
    assert_eq!(groups.members(admins.id).await.unwrap(), vec![alice.clone()]);

    // Memberships follow their user and group
    users.delete(alice.id).await.unwrap();
    assert!(groups.members(admins.id).await.unwrap().is_empty());

    groups.add_member(staff.id, bob.id).await.unwrap();
    groups.delete(staff.id).await.unwrap();
    assert!(groups.groups_for(bob.id).await.unwrap().is_empty());
    assert!(matches!(
        groups.get(staff.id).await,
        Err(StoreError::NotFound { entity: "group", .. })
    ));
}

#[tokio::test]
async fn test_membership_requires_existing_rows() {
    let warden = warden().await;
    let group = warden.groups().create("admins").await.unwrap();

    assert!(matches!(
        warden.groups().add_member(group.id, 42).await,
        Err(StoreError::Database(_))
    ));
    assert!(matches!(
        warden.groups().create("admins").await,
        Err(StoreError::Conflict { .. })
    ));
}

#[tokio::test]
async fn test_group_tables() {
    let pool = pool().await;
    Warden::open(pool.clone()).await.unwrap();

    let objects = schema_objects(&pool).await;
    for table in ["user_groups", "group_members", "group_migration"] {
        assert!(objects.contains(&table.to_string()), "missing {}", table);
    }
    assert!(!objects.contains(&"groups".to_string()));
}
