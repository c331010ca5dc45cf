mod common;
use common::{TestCore, new_user};
use tat_core::ErrorKind;

const CONFIG: &str = r#"
[accounts]
default_group = "everyone"
"#;

#[tokio::test]
async fn test_check_repairs_then_reports_ok() -> anyhow::Result<()> {
    let core = TestCore::with_config(CONFIG).await?;
    // Pending user: nothing provisioned yet
    core.services.lifecycle.create(new_user("carol")).await?;
    let checker = &core.services.checker;

    // 1. First pass creates what is missing
    let first = checker.check("carol", true, true).await?;
    assert!(first.topics.iter().any(|(_, status)| status == "created"));
    assert_eq!(first.default_group, "user added to default group everyone");

    // 2. Second pass finds everything in place
    let second = checker.check("carol", true, true).await?;
    assert_eq!(second.topics.len(), 4);
    assert!(second.topics.iter().all(|(_, status)| status == "OK"));
    assert_eq!(second.default_group, "user in everyone OK");

    // No duplicate was created on the second pass
    let err = core.db.topics().create("/Private/carol", None).await.unwrap_err();
    assert!(err.to_string().contains("already exists"));
    Ok(())
}

#[tokio::test]
async fn test_check_after_verification_is_clean() -> anyhow::Result<()> {
    let core = TestCore::with_config(CONFIG).await?;
    core.active_user("dave").await?;

    let report = core.services.checker.check("dave", false, false).await?;
    assert!(report.topics_ok());
    assert_eq!(report.default_group, "user in everyone OK");
    Ok(())
}

#[tokio::test]
async fn test_check_without_fix_reports_ko() -> anyhow::Result<()> {
    let core = TestCore::with_config(CONFIG).await?;
    core.services.lifecycle.create(new_user("erin")).await?;

    let report = core.services.checker.check("erin", false, false).await?;
    assert!(report.topics.iter().all(|(_, status)| status == "KO: not exist"));
    assert_eq!(report.default_group, "user in default group everyone KO");

    let err = core
        .services
        .checker
        .check("nobody", true, true)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}
