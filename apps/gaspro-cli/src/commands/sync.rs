//! # Sync Commands
//!
//! `push` and `pull` fail with `SYNC_ERROR` while the device is offline;
//! `status` always answers.

use serde_json::Value;

use gaspro_sync::SyncAgent;

use super::to_json;
use crate::cli::SyncCommand;
use crate::error::CliResult;

pub async fn run(agent: &SyncAgent, cmd: SyncCommand) -> CliResult<Value> {
    match cmd {
        SyncCommand::Status => to_json(&agent.status().await?),
        SyncCommand::Push => to_json(&agent.push_now().await?),
        SyncCommand::Pull => to_json(&agent.pull_now().await?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::{customer, setup};
    use crate::error::ErrorCode;

    #[tokio::test]
    async fn test_offline_status_and_push() {
        let db = setup().await;
        customer(&db, "Omar").await;
        let agent = SyncAgent::offline(db);

        let status = run(&agent, SyncCommand::Status).await.unwrap();
        assert_eq!(status["mode"], "offline");
        assert_eq!(status["needsSync"], true);
        assert!(status["pendingCount"].as_i64().unwrap() > 0);

        let err = run(&agent, SyncCommand::Push).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SyncError);
    }
}
