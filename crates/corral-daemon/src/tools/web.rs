//! Host-executed agent tools: directory listing and web search.

use std::sync::Arc;

use serde_json::{Value, json};

use corral_infra::tools::{ToolHandler, ToolRegistry};
use corral_shared::outcome::Outcome;

pub fn register(registry: &mut ToolRegistry) {
    let list: ToolHandler = Arc::new(|args, _ctx| Box::pin(directory_list(args)));
    registry.bind_handler("fs__directory__list", list);

    let search: ToolHandler = Arc::new(|args, _ctx| Box::pin(web_search(args)));
    registry.bind_handler("web__search", search);
}

async fn directory_list(args: Value) -> Outcome {
    let Some(path) = args.get("path").and_then(|v| v.as_str()) else {
        return Outcome::failure("fs__directory__list requires a path argument");
    };

    let mut read_dir = match tokio::fs::read_dir(path).await {
        Ok(rd) => rd,
        Err(e) => return Outcome::failure(format!("failed to list {path}: {e}")),
    };

    let mut entries = Vec::new();
    while let Ok(Some(entry)) = read_dir.next_entry().await {
        let kind = match entry.file_type().await {
            Ok(t) if t.is_dir() => "dir",
            Ok(t) if t.is_symlink() => "link",
            _ => "file",
        };
        entries.push(json!({
            "name": entry.file_name().to_string_lossy(),
            "type": kind,
        }));
    }
    entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
    Outcome::success(Value::Array(entries))
}

/// Google Custom Search; `GOOGLE_API_KEY` and `GOOGLE_CX` stay host-side.
async fn web_search(args: Value) -> Outcome {
    let Some(query) = args.get("query").and_then(|v| v.as_str()) else {
        return Outcome::failure("web__search requires a query argument");
    };
    let (Ok(api_key), Ok(cx)) = (std::env::var("GOOGLE_API_KEY"), std::env::var("GOOGLE_CX"))
    else {
        return Outcome::failure("web search is not configured: set GOOGLE_API_KEY and GOOGLE_CX");
    };

    let response = reqwest::Client::new()
        .get("https://www.googleapis.com/customsearch/v1")
        .query(&[("key", api_key.as_str()), ("cx", cx.as_str()), ("q", query)])
        .send()
        .await;

    let response = match response {
        Ok(r) => r,
        Err(e) => return Outcome::failure(format!("web search failed: {e}")),
    };
    if !response.status().is_success() {
        return Outcome::failure(format!("web search returned {}", response.status()));
    }
    let body: Value = match response.json().await {
        Ok(b) => b,
        Err(e) => return Outcome::failure(format!("web search sent malformed JSON: {e}")),
    };

    let results: Vec<Value> = body
        .get("items")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .take(10)
                .map(|item| {
                    json!({
                        "title": item.get("title").and_then(|v| v.as_str()).unwrap_or(""),
                        "link": item.get("link").and_then(|v| v.as_str()).unwrap_or(""),
                        "snippet": item.get("snippet").and_then(|v| v.as_str()).unwrap_or(""),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Outcome::success(Value::Array(results))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn directory_list_reports_entry_kinds() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "x").unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();

        let out = directory_list(json!({"path": tmp.path().to_string_lossy()})).await;
        let Outcome::Success { result } = out else {
            panic!("expected success");
        };
        let entries = result.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["name"], "a.txt");
        assert_eq!(entries[0]["type"], "file");
        assert_eq!(entries[1]["type"], "dir");
    }
}
