//! 工作流注册表：名称 → 处理器，启动时注册，运行期只读为主

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::workflow::builtin;
use crate::workflow::{WorkflowError, WorkflowHandler};

#[derive(Default)]
pub struct WorkflowRegistry {
    handlers: RwLock<BTreeMap<String, Arc<dyn WorkflowHandler>>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置 content-creation / social-media-campaign / inbox-triage
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.insert(builtin::CONTENT_CREATION, Arc::new(builtin::ContentCreation));
        registry.insert(builtin::SOCIAL_MEDIA_CAMPAIGN, Arc::new(builtin::SocialMediaCampaign));
        registry.insert(builtin::INBOX_TRIAGE, Arc::new(builtin::InboxTriage));
        registry
    }

    fn insert(&self, name: &str, handler: Arc<dyn WorkflowHandler>) {
        self.handlers.write().insert(name.to_string(), handler);
    }

    /// 注册新工作流；同名已存在时报错
    pub fn register(&self, name: &str, handler: Arc<dyn WorkflowHandler>) -> Result<(), WorkflowError> {
        let name = name.trim();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(WorkflowError::InvalidName(name.to_string()));
        }
        let mut handlers = self.handlers.write();
        if handlers.contains_key(name) {
            return Err(WorkflowError::AlreadyRegistered(name.to_string()));
        }
        handlers.insert(name.to_string(), handler);
        tracing::info!(workflow = name, "workflow registered");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn WorkflowHandler>, WorkflowError> {
        self.handlers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| WorkflowError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.read().contains_key(name)
    }

    /// 已注册名称（有序）
    pub fn names(&self) -> Vec<String> {
        self.handlers.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{FnWorkflow, WorkflowFuture};

    fn echo() -> Arc<dyn WorkflowHandler> {
        Arc::new(FnWorkflow::new("echo inputs", |_ctx, inputs| {
            Box::pin(async move { Ok(inputs) }) as WorkflowFuture
        }))
    }

    #[test]
    fn test_builtins_registered() {
        let registry = WorkflowRegistry::with_builtins();
        assert_eq!(
            registry.names(),
            vec!["content-creation", "inbox-triage", "social-media-campaign"]
        );
    }

    #[test]
    fn test_register_rejects_duplicates_and_bad_names() {
        let registry = WorkflowRegistry::with_builtins();
        assert_eq!(
            registry.register("content-creation", echo()).unwrap_err(),
            WorkflowError::AlreadyRegistered("content-creation".into())
        );
        assert!(matches!(registry.register("bad name", echo()), Err(WorkflowError::InvalidName(_))));
        registry.register("echo", echo()).unwrap();
        assert_eq!(registry.get("echo").unwrap().description(), "echo inputs");
        assert!(matches!(registry.get("missing"), Err(WorkflowError::NotFound(_))));
    }
}
