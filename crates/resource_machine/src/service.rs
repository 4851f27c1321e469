//! Load/save/delete collaborators injected into a machine.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use shared::{
    domain::{FieldMap, ListPage},
    error::{ApiError, ErrorCode},
};

use crate::context::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Fetch,
    Save,
    Delete,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fetch => "fetch",
            Self::Save => "save",
            Self::Delete => "delete",
        })
    }
}

/// What a load call produced: one record for forms, one page for lists.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Record(FieldMap),
    Page(ListPage),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceOutput {
    Loaded(Fetched),
    /// Whatever the save call returned, handed to success actions untouched.
    Saved(Value),
    Deleted,
}

/// Async collaborators of a machine. Each call receives a snapshot of the
/// context taken when the invoking state was entered.
///
/// Implementations own all transport concerns (timeouts, retries, status
/// mapping); the engine only sees `Ok` or `Err`.
#[async_trait]
pub trait ResourceService: Send + Sync {
    async fn fetch(&self, ctx: &Context) -> Result<Fetched, ApiError>;

    async fn save(&self, ctx: &Context) -> Result<Value, ApiError>;

    async fn delete(&self, _ctx: &Context) -> Result<(), ApiError> {
        Err(ApiError::new(
            ErrorCode::Internal,
            "delete is not supported by this resource",
        ))
    }
}

/// Runs the call matching `kind`.
pub async fn invoke(
    service: &dyn ResourceService,
    kind: ServiceKind,
    ctx: &Context,
) -> Result<ServiceOutput, ApiError> {
    match kind {
        ServiceKind::Fetch => service.fetch(ctx).await.map(ServiceOutput::Loaded),
        ServiceKind::Save => service.save(ctx).await.map(ServiceOutput::Saved),
        ServiceKind::Delete => service.delete(ctx).await.map(|()| ServiceOutput::Deleted),
    }
}

/// Service for forms that start from their context defaults instead of a
/// server record, such as a login form. Saving is unsupported.
pub struct LocalDefaults;

#[async_trait]
impl ResourceService for LocalDefaults {
    async fn fetch(&self, ctx: &Context) -> Result<Fetched, ApiError> {
        Ok(Fetched::Record(ctx.data.clone()))
    }

    async fn save(&self, _ctx: &Context) -> Result<Value, ApiError> {
        Err(ApiError::new(
            ErrorCode::Internal,
            "save is not supported by this resource",
        ))
    }
}

type FetchFn = dyn Fn(Context) -> BoxFuture<'static, Result<Fetched, ApiError>> + Send + Sync;
type SaveFn = dyn Fn(Context) -> BoxFuture<'static, Result<Value, ApiError>> + Send + Sync;
type DeleteFn = dyn Fn(Context) -> BoxFuture<'static, Result<(), ApiError>> + Send + Sync;

/// Service assembled from plain async closures.
pub struct FnService {
    fetch: Arc<FetchFn>,
    save: Option<Arc<SaveFn>>,
    delete: Option<Arc<DeleteFn>>,
}

/// Starts an [`FnService`] from its load function.
pub fn service_fn<F, Fut>(fetch: F) -> FnService
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Fetched, ApiError>> + Send + 'static,
{
    FnService {
        fetch: Arc::new(move |ctx| Box::pin(fetch(ctx))),
        save: None,
        delete: None,
    }
}

impl FnService {
    pub fn with_save<F, Fut>(mut self, save: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, ApiError>> + Send + 'static,
    {
        self.save = Some(Arc::new(move |ctx| Box::pin(save(ctx))));
        self
    }

    pub fn with_delete<F, Fut>(mut self, delete: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        self.delete = Some(Arc::new(move |ctx| Box::pin(delete(ctx))));
        self
    }
}

#[async_trait]
impl ResourceService for FnService {
    async fn fetch(&self, ctx: &Context) -> Result<Fetched, ApiError> {
        (self.fetch)(ctx.clone()).await
    }

    async fn save(&self, ctx: &Context) -> Result<Value, ApiError> {
        match &self.save {
            Some(save) => save(ctx.clone()).await,
            None => LocalDefaults.save(ctx).await,
        }
    }

    async fn delete(&self, ctx: &Context) -> Result<(), ApiError> {
        match &self.delete {
            Some(delete) => delete(ctx.clone()).await,
            None => Err(ApiError::new(
                ErrorCode::Internal,
                "delete is not supported by this resource",
            )),
        }
    }
}
