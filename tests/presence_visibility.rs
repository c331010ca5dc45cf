mod common;
use common::TestCore;
use tat_core::ErrorKind;
use tat_core::services::{EventKind, PresenceCriteria};

async fn dm_pair(core: &TestCore) -> anyhow::Result<()> {
    core.active_user("alice").await?;
    core.active_user("bob").await?;
    let lifecycle = &core.services.lifecycle;
    lifecycle
        .create_private_topic("alice", "/Private/alice/DM/bob")
        .await?;
    lifecycle
        .create_private_topic("bob", "/Private/bob/DM/alice")
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_dm_presence_is_symmetric() -> anyhow::Result<()> {
    let mut core = TestCore::spawn().await?;
    dm_pair(&core).await?;

    // 1. Each side writes under its own tree
    core.services
        .presences
        .create("alice", "Private/alice/DM/bob", "online")
        .await?;
    let event = core.next_event(EventKind::PresenceCreated).await?;
    assert_eq!(event.payload["topic"], "/Private/alice/DM/bob");
    let presences = &core.services.presences;

    // 2. Bob sees alice through his mirror topic
    let (count, seen) = presences
        .list("bob", "Private/bob/DM/alice", PresenceCriteria::default())
        .await?;
    assert_eq!(count, 1);
    assert_eq!(seen[0].username, "alice");

    // 3. And the other way round
    presences.create("bob", "/Private/bob/DM/alice", "away").await?;
    let (count, seen) = presences
        .list("alice", "/Private/alice/DM/bob", PresenceCriteria::default())
        .await?;
    assert_eq!(count, 2);
    assert_eq!(seen[0].username, "bob");
    Ok(())
}

#[tokio::test]
async fn test_malformed_dm_path_fails() -> anyhow::Result<()> {
    let core = TestCore::spawn().await?;
    dm_pair(&core).await?;

    for path in ["/Private/alice/DM", "/Private/alice/DM/bob/extra"] {
        let err = core
            .services
            .presences
            .list("alice", path, PresenceCriteria::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "{path}");
    }
    Ok(())
}

#[tokio::test]
async fn test_presence_requires_topic_and_access() -> anyhow::Result<()> {
    let core = TestCore::spawn().await?;
    dm_pair(&core).await?;
    let presences = &core.services.presences;

    let err = presences.create("alice", "/Nowhere", "online").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = presences
        .create("alice", "/Private/bob/DM/alice", "online")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = presences
        .create("alice", "/Private/alice", "  ")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    Ok(())
}

#[tokio::test]
async fn test_presence_upsert_and_recent_window() -> anyhow::Result<()> {
    let core = TestCore::spawn().await?;
    core.active_user("alice").await?;
    let presences = &core.services.presences;

    presences.create("alice", "/Private/alice", "online").await?;
    let (count, seen) = presences
        .create_and_get("alice", "/Private/alice", "busy")
        .await?;
    assert_eq!(count, 1);
    assert_eq!(seen[0].status, "busy");

    let criteria = PresenceCriteria {
        status: Some("online".into()),
        ..Default::default()
    };
    let (count, _) = presences.list("alice", "/Private/alice", criteria).await?;
    assert_eq!(count, 0);
    Ok(())
}

#[tokio::test]
async fn test_contacts_presences() -> anyhow::Result<()> {
    let core = TestCore::spawn().await?;
    core.active_user("alice").await?;
    core.active_user("bob").await?;
    core.active_user("carol").await?;
    let services = &core.services;

    services.presences.create("bob", "/Private/bob", "online").await?;
    services.presences.create("carol", "/Private/carol", "online").await?;
    services.registry.add_contact("alice", "bob").await?;

    let view = services.registry.contacts_presences("alice", 60).await?;
    assert_eq!(view.contacts.len(), 1);
    assert_eq!(view.count_presences, 1);
    assert_eq!(view.presences[0].username, "bob");
    Ok(())
}
