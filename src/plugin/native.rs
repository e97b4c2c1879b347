//! Closure-backed plugin modules
//!
//! Lets an embedding host (or a custom [`ModuleLoader`](crate::plugin::loader::ModuleLoader))
//! build a [`PluginModule`] in Rust without writing the capability traits by hand.

use crate::plugin::traits::{FaultResult, Initializable, MethodTable, PluginModule, Teardown};
use crate::plugin::types::ActivationContext;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;
type ActivateFn = Arc<dyn Fn(ActivationContext) -> BoxFuture<FaultResult<()>> + Send + Sync>;
type MethodFn = Arc<dyn Fn(Vec<Value>) -> BoxFuture<FaultResult<Value>> + Send + Sync>;
type DeactivateFn = Arc<dyn Fn() -> BoxFuture<FaultResult<()>> + Send + Sync>;

/// A plugin module assembled from async closures
#[derive(Default)]
pub struct NativeModule {
    on_activate: Option<ActivateFn>,
    on_deactivate: Option<DeactivateFn>,
    methods: BTreeMap<String, MethodFn>,
}

impl NativeModule {
    pub fn builder() -> NativeModuleBuilder {
        NativeModuleBuilder::default()
    }
}

/// Builder for [`NativeModule`]
#[derive(Default)]
pub struct NativeModuleBuilder {
    module: NativeModule,
}

impl NativeModuleBuilder {
    pub fn on_activate<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(ActivationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FaultResult<()>> + Send + 'static,
    {
        let hook: ActivateFn =
            Arc::new(move |context: ActivationContext| -> BoxFuture<FaultResult<()>> {
                Box::pin(hook(context))
            });
        self.module.on_activate = Some(hook);
        self
    }

    pub fn on_deactivate<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FaultResult<()>> + Send + 'static,
    {
        let hook: DeactivateFn = Arc::new(move || -> BoxFuture<FaultResult<()>> { Box::pin(hook()) });
        self.module.on_deactivate = Some(hook);
        self
    }

    pub fn method<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FaultResult<Value>> + Send + 'static,
    {
        let boxed: MethodFn = Arc::new(move |args: Vec<Value>| -> BoxFuture<FaultResult<Value>> {
            Box::pin(handler(args))
        });
        self.module.methods.insert(name.into(), boxed);
        self
    }

    pub fn build(self) -> NativeModule {
        self.module
    }
}

#[async_trait::async_trait]
impl Initializable for NativeModule {
    async fn activate(&self, context: &ActivationContext) -> FaultResult<()> {
        match &self.on_activate {
            Some(hook) => hook(context.clone()).await,
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl MethodTable for NativeModule {
    fn method_names(&self) -> Vec<String> {
        self.methods.keys().cloned().collect()
    }

    fn has_method(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    async fn call(&self, method: &str, args: Vec<Value>) -> FaultResult<Value> {
        match self.methods.get(method) {
            Some(handler) => handler(args).await,
            None => Err(format!("Method {method} not found").into()),
        }
    }
}

#[async_trait::async_trait]
impl Teardown for NativeModule {
    async fn deactivate(&self) -> FaultResult<()> {
        match &self.on_deactivate {
            Some(hook) => hook().await,
            None => Ok(()),
        }
    }
}

impl PluginModule for NativeModule {
    fn initializer(&self) -> Option<&dyn Initializable> {
        self.on_activate.as_ref().map(|_| self as &dyn Initializable)
    }

    fn methods(&self) -> Option<&dyn MethodTable> {
        if self.methods.is_empty() {
            None
        } else {
            Some(self)
        }
    }

    fn teardown(&self) -> Option<&dyn Teardown> {
        self.on_deactivate.as_ref().map(|_| self as &dyn Teardown)
    }
}
