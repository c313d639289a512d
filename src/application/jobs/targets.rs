//! Registry of named job targets that invocation strings resolve against.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::invoke::{Invocation, InvokeArg, InvokeError, is_valid_class_name};

#[async_trait]
pub trait JobTarget: Send + Sync {
    /// Method names this target answers to.
    fn methods(&self) -> &'static [&'static str];

    async fn invoke(&self, method: &str, args: &[InvokeArg]) -> Result<(), InvokeError>;
}

#[derive(Clone, Default)]
pub struct JobTargetRegistry {
    beans: HashMap<String, Arc<dyn JobTarget>>,
    aliases: HashMap<String, Arc<dyn JobTarget>>,
}

impl JobTargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `target` under `bean`, and under the fully-qualified `alias` when given.
    pub fn register(
        &mut self,
        bean: impl Into<String>,
        alias: Option<&str>,
        target: Arc<dyn JobTarget>,
    ) -> &mut Self {
        if let Some(alias) = alias {
            self.aliases.insert(alias.to_string(), target.clone());
        }
        self.beans.insert(bean.into(), target);
        self
    }

    fn lookup(&self, target: &str, bean: &str) -> Option<&Arc<dyn JobTarget>> {
        if is_valid_class_name(target) {
            self.aliases.get(bean)
        } else {
            self.beans.get(bean)
        }
    }

    /// Parse `target` and check that its bean and method exist.
    pub fn resolve(&self, target: &str) -> Result<(Arc<dyn JobTarget>, Invocation), InvokeError> {
        let invocation = Invocation::parse(target)?;
        let resolved = self
            .lookup(target.trim(), &invocation.bean)
            .cloned()
            .ok_or_else(|| InvokeError::UnknownBean(invocation.bean.clone()))?;

        if !resolved.methods().contains(&invocation.method.as_str()) {
            return Err(InvokeError::UnknownMethod {
                bean: invocation.bean,
                method: invocation.method,
            });
        }
        Ok((resolved, invocation))
    }

    pub async fn invoke_target(&self, target: &str) -> Result<(), InvokeError> {
        let (resolved, invocation) = self.resolve(target)?;
        resolved.invoke(&invocation.method, &invocation.args).await
    }
}
