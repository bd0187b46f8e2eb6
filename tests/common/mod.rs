#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use text2sql::{
    LlmBackend, ModelGateway, PromptLibrary, SchemaCatalog, SchemaIntrospector, SqlGenerator, TableDescriptor,
    Text2SqlError,
};

/// Replays canned model replies in order and records the prompts it was sent.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> text2sql::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Text2SqlError::Backend("no scripted reply left".to_string()))
    }
}

const USER_DDL: &str = r#"# user

## DDL

```sql
CREATE TABLE "user" (
    id BIGSERIAL PRIMARY KEY,
    姓名 VARCHAR(64) NOT NULL,
    邮箱 VARCHAR(128) UNIQUE NOT NULL,
    status VARCHAR(16) NOT NULL DEFAULT 'active'
);
```

## 业务规则

1. 用户邮箱必须唯一
2. 用户状态只能是 active 或 disabled
"#;

/// Introspector whose database cannot be reached.
pub struct DownIntrospector;

#[async_trait]
impl SchemaIntrospector for DownIntrospector {
    async fn list_tables(&self) -> text2sql::Result<Vec<TableDescriptor>> {
        Err(Text2SqlError::Database("connection refused".to_string()))
    }
}

/// Resources and config directories with a documented `user` table and a
/// `ghost_table` that has a description but no DDL document. Removed on drop.
pub struct Workspace {
    _root: TempDir,
    pub resources: PathBuf,
    pub config: PathBuf,
}

impl Workspace {
    pub async fn catalog(&self) -> SchemaCatalog {
        SchemaCatalog::load(&self.resources, &self.config).await.unwrap()
    }

    pub async fn generator(&self, backend: Arc<ScriptedBackend>) -> SqlGenerator {
        generator_over(self.catalog().await, backend)
    }
}

pub fn workspace() -> Workspace {
    let root = TempDir::new().unwrap();
    let resources = root.path().join("resources");
    let config = root.path().join("config");
    let descriptions = resources.join("schemas").join("descriptions");
    let ddl = resources.join("schemas").join("ddl");
    for dir in [&descriptions, &ddl, &config] {
        std::fs::create_dir_all(dir).unwrap();
    }

    std::fs::write(descriptions.join("user.md"), "# user\n\n用户表，存储平台注册用户\n").unwrap();
    std::fs::write(descriptions.join("ghost_table.md"), "# ghost_table\n\nA table nobody documented\n").unwrap();
    std::fs::write(ddl.join("user.md"), USER_DDL).unwrap();
    std::fs::write(
        config.join("business_rules.json"),
        r#"{"user": ["密码必须经过加密存储"], "ghost_table": ["must not appear"]}"#,
    )
    .unwrap();

    Workspace {
        _root: root,
        resources,
        config,
    }
}

pub fn prompts() -> PromptLibrary {
    PromptLibrary::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("resources").join("prompts"))
}

pub fn generator_over(catalog: SchemaCatalog, backend: Arc<ScriptedBackend>) -> SqlGenerator {
    SqlGenerator::new(Arc::new(ModelGateway::new(backend)), Arc::new(catalog), prompts())
}
