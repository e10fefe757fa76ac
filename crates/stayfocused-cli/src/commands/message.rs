use stayfocused_core::Request;

use super::{print_json, CliResult, Host};

pub async fn run(json: &str) -> CliResult {
    let request: Request = serde_json::from_str(json)?;
    let host = Host::open().await?;
    let response = host.manager.handle(request).await;
    print_json(&response)
}
