//! Workspace commands: files

use anyhow::Result;

use crate::client::ApiClient;
use crate::output::{print_json, print_success, OutputFormat};

/// Creates the project directory of `workspace`, or deletes it when `clear`
pub async fn files(
    client: &ApiClient,
    workspace: &str,
    clear: bool,
    format: OutputFormat,
) -> Result<()> {
    if clear {
        client.clear_files(workspace).await?;
    } else {
        client.make_files(workspace).await?;
    }

    let action = if clear { "cleared" } else { "created" };
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "workspace": workspace,
            "files": action,
        }))?,
        OutputFormat::Table => {
            print_success(&format!("Project files of {} {}", workspace, action))
        }
    }
    Ok(())
}
