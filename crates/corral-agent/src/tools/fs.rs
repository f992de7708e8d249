//! Workspace file tools: `fs__file__read` and `fs__file__write`.
//!
//! Paths resolve against the child's working directory, which is the
//! session workspace.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use corral_infra::fsutil::write_creating_dirs;
use corral_infra::tools::ToolRegistry;
use corral_shared::outcome::Outcome;

pub fn register(registry: &mut ToolRegistry) {
    registry.bind_handler(
        "fs__file__read",
        Arc::new(|args, _ctx| {
            Box::pin(async move {
                let Some(path) = super::string_arg(&args, "path") else {
                    return Outcome::failure("fs__file__read requires a path argument");
                };
                match tokio::fs::read_to_string(&path).await {
                    Ok(content) => Outcome::success(content),
                    Err(e) => Outcome::failure(format!("failed to read {path}: {e}")),
                }
            })
        }),
    );

    registry.bind_handler(
        "fs__file__write",
        Arc::new(|args, _ctx| {
            Box::pin(async move {
                let Some(path) = super::string_arg(&args, "path") else {
                    return Outcome::failure("fs__file__write requires a path argument");
                };
                let content = args
                    .get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                match write_creating_dirs(Path::new(&path), content) {
                    Ok(()) => Outcome::success(json!({
                        "path": path,
                        "bytes": content.len(),
                    })),
                    Err(e) => Outcome::failure(format!("failed to write {path}: {e}")),
                }
            })
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_infra::tools::catalog::builtin_metas;
    use corral_infra::tools::{ToolCtx, ToolDef};

    #[tokio::test]
    async fn write_then_read_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let mut registry = ToolRegistry::new();
        for meta in builtin_metas() {
            registry.register(ToolDef::meta_only(meta));
        }
        register(&mut registry);

        let path = tmp.path().join("notes/a.txt");
        let write = registry.get("fs__file__write").unwrap().handler.clone().unwrap();
        let out = write(
            json!({"path": path.to_string_lossy(), "content": "hello"}),
            ToolCtx::new(1, "tc_w"),
        )
        .await;
        assert!(out.is_success());

        let read = registry.get("fs__file__read").unwrap().handler.clone().unwrap();
        let out = read(
            json!({"path": path.to_string_lossy()}),
            ToolCtx::new(1, "tc_r"),
        )
        .await;
        let Outcome::Success { result } = out else {
            panic!("expected success");
        };
        assert_eq!(result.as_str().unwrap(), "hello");
    }
}
