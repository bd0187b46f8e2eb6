//! Shared fixtures for unit tests.

use crate::catalog::{SchemaCatalog, SchemaIntrospector, TableDescriptor};
use crate::error::{Result, Text2SqlError};
use crate::llm::LlmBackend;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

/// Backend that replays canned replies in order and records every prompt.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(err: Text2SqlError) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from([Err(err)])),
            prompts: Mutex::new(Vec::new()),
        }
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

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Text2SqlError::Backend("no scripted reply left".to_string())))
    }
}

pub const USER_DESCRIPTION: &str = "# user\n\nRegistered platform users, one row per account.\n";

pub const USER_DDL: &str = r#"# user

## DDL

```sql
CREATE TABLE "user" (
    id BIGSERIAL PRIMARY KEY,
    姓名 VARCHAR(64) NOT NULL,
    邮箱 VARCHAR(128) UNIQUE NOT NULL
);
```

## Business Rules

1. Email addresses are unique per user
2. Deleted users keep their row with status = 'disabled'
"#;

pub const ORDER_DESCRIPTION: &str = "# order\n\nCustomer orders placed on the platform.\n";

pub const ORDER_DDL: &str = r#"# order

## DDL

```sql
CREATE TABLE "order" (
    id BIGSERIAL PRIMARY KEY,
    user_id BIGINT REFERENCES "user"(id),
    amount NUMERIC(12, 2) NOT NULL
);
```
"#;

/// Introspector whose database is down.
pub struct UnreachableIntrospector;

#[async_trait]
impl SchemaIntrospector for UnreachableIntrospector {
    async fn list_tables(&self) -> Result<Vec<TableDescriptor>> {
        Err(Text2SqlError::Database("connection refused".to_string()))
    }
}

/// Resources/config layout in a temporary directory, removed on drop.
/// `user` and `order` have description and DDL documents, `ghost_table` has a
/// description but no DDL.
pub struct Fixture {
    _root: TempDir,
    pub resources: PathBuf,
    pub config: PathBuf,
}

impl Fixture {
    pub async fn catalog(&self) -> SchemaCatalog {
        SchemaCatalog::load(&self.resources, &self.config).await.unwrap()
    }
}

pub fn fixture() -> Fixture {
    let root = TempDir::new().unwrap();
    let resources = root.path().join("resources");
    let config = root.path().join("config");
    let descriptions = resources.join("schemas").join("descriptions");
    let ddl = resources.join("schemas").join("ddl");
    std::fs::create_dir_all(&descriptions).unwrap();
    std::fs::create_dir_all(&ddl).unwrap();
    std::fs::create_dir_all(&config).unwrap();

    write(&descriptions, "user.md", USER_DESCRIPTION);
    write(&descriptions, "order.md", ORDER_DESCRIPTION);
    write(&descriptions, "ghost_table.md", "# ghost_table\n");
    write(&ddl, "user.md", USER_DDL);
    write(&ddl, "order.md", ORDER_DDL);
    write(
        &config,
        "business_rules.json",
        r#"{"user": ["Email addresses are unique per user", "Passwords are stored hashed"], "ghost_table": ["never shown"]}"#,
    );

    Fixture {
        _root: root,
        resources,
        config,
    }
}

fn write(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

/// The prompt templates shipped with the crate.
pub fn shipped_prompts_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("resources").join("prompts")
}
