//! Capacity
//!
//! A named asynchronous operation (device I/O, inference, ...) with a cheap
//! admission check. Combinators wrap a capacity in a new value and leave
//! the original untouched; the wrapper keeps the inner name and pre-check
//! unless it adds one of its own.

use crate::error::CapacityError;
use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Guarded asynchronous unit of work
#[async_trait]
pub trait Capacity: Send + Sync {
    type Input: Send + 'static;
    type Output: Send + 'static;

    fn name(&self) -> &str;

    /// Environment-dependent availability
    fn pre_check(&self) -> bool {
        true
    }

    async fn handle(&self, input: Self::Input) -> Result<Self::Output, CapacityError>;
}

#[async_trait]
impl<C: Capacity + ?Sized> Capacity for Arc<C> {
    type Input = C::Input;
    type Output = C::Output;

    fn name(&self) -> &str {
        (**self).name()
    }

    fn pre_check(&self) -> bool {
        (**self).pre_check()
    }

    async fn handle(&self, input: Self::Input) -> Result<Self::Output, CapacityError> {
        (**self).handle(input).await
    }
}

/// Composition operators available on every capacity
pub trait CapacityExt: Capacity + Sized {
    /// Transform the caller's input before delegating
    fn map_payload<Q, F>(self, mapper: F) -> MapPayload<Self, F, Q>
    where
        F: Fn(Q) -> Self::Input + Send + Sync,
        Q: Send + 'static,
    {
        MapPayload {
            inner: self,
            mapper,
            _input: PhantomData,
        }
    }

    /// Transform a successful result; errors pass through
    fn map_result<R, F>(self, mapper: F) -> MapResult<Self, F, fn(CapacityError) -> R>
    where
        F: Fn(Self::Output) -> R + Send + Sync,
        R: Send + 'static,
    {
        MapResult {
            inner: self,
            mapper,
            recover: None,
        }
    }

    /// Transform a successful result, and turn failures into the same
    /// output type
    fn map_result_or_else<R, F, E>(self, mapper: F, recover: E) -> MapResult<Self, F, E>
    where
        F: Fn(Self::Output) -> R + Send + Sync,
        E: Fn(CapacityError) -> R + Send + Sync,
        R: Send + 'static,
    {
        MapResult {
            inner: self,
            mapper,
            recover: Some(recover),
        }
    }

    /// Map input and result around one call. The result mapper also sees
    /// the original input.
    fn map<Q, R, FP, FR>(
        self,
        payload: FP,
        result: FR,
    ) -> Mapped<Self, FP, FR, fn(CapacityError, &Q) -> R, Q>
    where
        FP: Fn(&Q) -> Self::Input + Send + Sync,
        FR: Fn(Self::Output, &Q) -> R + Send + Sync,
        Q: Send + Sync + 'static,
        R: Send + 'static,
    {
        Mapped {
            inner: self,
            payload,
            result,
            recover: None,
            _input: PhantomData,
        }
    }

    /// Like [`CapacityExt::map`], with failures converted by `recover`
    fn map_or_recover<Q, R, FP, FR, FE>(
        self,
        payload: FP,
        result: FR,
        recover: FE,
    ) -> Mapped<Self, FP, FR, FE, Q>
    where
        FP: Fn(&Q) -> Self::Input + Send + Sync,
        FR: Fn(Self::Output, &Q) -> R + Send + Sync,
        FE: Fn(CapacityError, &Q) -> R + Send + Sync,
        Q: Send + Sync + 'static,
        R: Send + 'static,
    {
        Mapped {
            inner: self,
            payload,
            result,
            recover: Some(recover),
            _input: PhantomData,
        }
    }

    /// Require `check` in addition to the existing pre-check
    fn and_pre_check<F>(self, check: F) -> AndPreCheck<Self, F>
    where
        F: Fn() -> bool + Send + Sync,
    {
        AndPreCheck { inner: self, check }
    }
}

impl<C: Capacity> CapacityExt for C {}

/// See [`CapacityExt::map_payload`]
pub struct MapPayload<C, F, Q> {
    inner: C,
    mapper: F,
    _input: PhantomData<fn(Q)>,
}

#[async_trait]
impl<C, F, Q> Capacity for MapPayload<C, F, Q>
where
    C: Capacity,
    F: Fn(Q) -> C::Input + Send + Sync,
    Q: Send + 'static,
{
    type Input = Q;
    type Output = C::Output;

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn pre_check(&self) -> bool {
        self.inner.pre_check()
    }

    async fn handle(&self, input: Q) -> Result<C::Output, CapacityError> {
        self.inner.handle((self.mapper)(input)).await
    }
}

/// See [`CapacityExt::map_result`]
pub struct MapResult<C, F, E> {
    inner: C,
    mapper: F,
    recover: Option<E>,
}

#[async_trait]
impl<C, F, E, R> Capacity for MapResult<C, F, E>
where
    C: Capacity,
    F: Fn(C::Output) -> R + Send + Sync,
    E: Fn(CapacityError) -> R + Send + Sync,
    R: Send + 'static,
{
    type Input = C::Input;
    type Output = R;

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn pre_check(&self) -> bool {
        self.inner.pre_check()
    }

    async fn handle(&self, input: C::Input) -> Result<R, CapacityError> {
        match self.inner.handle(input).await {
            Ok(output) => Ok((self.mapper)(output)),
            Err(e) => match &self.recover {
                Some(recover) => Ok(recover(e)),
                None => Err(e),
            },
        }
    }
}

/// See [`CapacityExt::map`]
pub struct Mapped<C, FP, FR, FE, Q> {
    inner: C,
    payload: FP,
    result: FR,
    recover: Option<FE>,
    _input: PhantomData<fn(Q)>,
}

#[async_trait]
impl<C, FP, FR, FE, Q, R> Capacity for Mapped<C, FP, FR, FE, Q>
where
    C: Capacity,
    FP: Fn(&Q) -> C::Input + Send + Sync,
    FR: Fn(C::Output, &Q) -> R + Send + Sync,
    FE: Fn(CapacityError, &Q) -> R + Send + Sync,
    Q: Send + Sync + 'static,
    R: Send + 'static,
{
    type Input = Q;
    type Output = R;

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn pre_check(&self) -> bool {
        self.inner.pre_check()
    }

    async fn handle(&self, input: Q) -> Result<R, CapacityError> {
        match self.inner.handle((self.payload)(&input)).await {
            Ok(output) => Ok((self.result)(output, &input)),
            Err(e) => match &self.recover {
                Some(recover) => Ok(recover(e, &input)),
                None => Err(e),
            },
        }
    }
}

/// See [`CapacityExt::and_pre_check`]
pub struct AndPreCheck<C, F> {
    inner: C,
    check: F,
}

#[async_trait]
impl<C, F> Capacity for AndPreCheck<C, F>
where
    C: Capacity,
    F: Fn() -> bool + Send + Sync,
{
    type Input = C::Input;
    type Output = C::Output;

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn pre_check(&self) -> bool {
        self.inner.pre_check() && (self.check)()
    }

    async fn handle(&self, input: C::Input) -> Result<C::Output, CapacityError> {
        self.inner.handle(input).await
    }
}

type PreCheck = Box<dyn Fn() -> bool + Send + Sync>;

/// Capacity built from a name and an async function
pub struct FnCapacity<P, R, F> {
    name: String,
    pre_check: Option<PreCheck>,
    handler: F,
    _types: PhantomData<fn(P) -> R>,
}

/// Create a capacity from an async function
pub fn capacity_fn<P, R, F, Fut>(name: impl Into<String>, handler: F) -> FnCapacity<P, R, F>
where
    F: Fn(P) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, CapacityError>> + Send,
{
    FnCapacity {
        name: name.into(),
        pre_check: None,
        handler,
        _types: PhantomData,
    }
}

impl<P, R, F> FnCapacity<P, R, F> {
    /// Availability check evaluated by `pre_check`
    pub fn with_pre_check(mut self, check: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.pre_check = Some(Box::new(check));
        self
    }
}

#[async_trait]
impl<P, R, F, Fut> Capacity for FnCapacity<P, R, F>
where
    P: Send + 'static,
    R: Send + 'static,
    F: Fn(P) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, CapacityError>> + Send,
{
    type Input = P;
    type Output = R;

    fn name(&self) -> &str {
        &self.name
    }

    fn pre_check(&self) -> bool {
        self.pre_check.as_ref().map_or(true, |check| check())
    }

    async fn handle(&self, input: P) -> Result<R, CapacityError> {
        (self.handler)(input).await
    }
}
