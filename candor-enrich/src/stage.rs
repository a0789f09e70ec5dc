//! Funnel stages
//!
//! A stage pairs an async transform (`candidate → candidate′`) with an
//! optional filter. A stage without a filter keeps everything its transform
//! returns. Stages are built once and shared read-only across runs.

use crate::lookup::CriticalError;
use crate::scheduler::BatchOptions;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Why a transform did not produce a candidate
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StageError {
    /// Aborts the whole run
    #[error(transparent)]
    Critical(#[from] CriticalError),

    /// Drops this candidate only (e.g. required input missing)
    #[error("Rejected: {0}")]
    Rejected(String),
}

impl StageError {
    pub fn is_critical(&self) -> bool {
        matches!(self, StageError::Critical(_))
    }
}

/// Stage transform
///
/// Implementations call zero or more lookup adapters. Non-critical lookup
/// failures are already absorbed by the adapters and must not surface here.
#[async_trait]
pub trait Transform<C>: Send + Sync {
    async fn apply(&self, candidate: C) -> Result<C, StageError>;
}

/// Closure-backed transform
pub struct FnTransform<F>(pub F);

#[async_trait]
impl<C, F, Fut> Transform<C> for FnTransform<F>
where
    C: Send + 'static,
    F: Fn(C) -> Fut + Send + Sync,
    Fut: Future<Output = Result<C, StageError>> + Send,
{
    async fn apply(&self, candidate: C) -> Result<C, StageError> {
        (self.0)(candidate).await
    }
}

pub type Filter<C> = Arc<dyn Fn(&C) -> bool + Send + Sync>;

/// Named transform + optional filter + scheduling parameters
pub struct Stage<C> {
    name: String,
    transform: Arc<dyn Transform<C>>,
    filter: Option<Filter<C>>,
    options: BatchOptions,
}

impl<C: Send + 'static> Stage<C> {
    pub fn new(name: impl Into<String>, transform: impl Transform<C> + 'static) -> Self {
        Self {
            name: name.into(),
            transform: Arc::new(transform),
            filter: None,
            options: BatchOptions::default(),
        }
    }

    pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<C, StageError>> + Send + 'static,
    {
        Self::new(name, FnTransform(f))
    }

    pub fn with_filter(mut self, filter: impl Fn(&C) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn with_options(mut self, options: BatchOptions) -> Self {
        self.options = options;
        self
    }
}

impl<C> Stage<C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    pub async fn transform(&self, candidate: C) -> Result<C, StageError> {
        self.transform.apply(candidate).await
    }

    /// Filter verdict; always true without a filter
    pub fn keeps(&self, candidate: &C) -> bool {
        self.filter.as_ref().map_or(true, |f| f(candidate))
    }
}

impl<C> fmt::Debug for Stage<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("has_filter", &self.filter.is_some())
            .field("options", &self.options)
            .finish()
    }
}

/// Result of [`accumulate_until`]
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulated<S> {
    pub state: S,
    /// Items folded before stopping
    pub consumed: usize,
    /// True if `stop_early_when` cut the scan short
    pub stopped_early: bool,
}

/// Fold `items` into `state`, checking `stop_early_when` after each item
///
/// Covers both "stop at the first match" and "keep counting" scans: the
/// stopping rule is the caller's predicate over the accumulated state.
pub fn accumulate_until<T, S>(
    items: impl IntoIterator<Item = T>,
    mut state: S,
    mut fold: impl FnMut(&mut S, T),
    stop_early_when: impl Fn(&S) -> bool,
) -> Accumulated<S> {
    let mut consumed = 0;
    for item in items {
        fold(&mut state, item);
        consumed += 1;
        if stop_early_when(&state) {
            return Accumulated {
                state,
                consumed,
                stopped_early: true,
            };
        }
    }
    Accumulated {
        state,
        consumed,
        stopped_early: false,
    }
}
