//! Static registration table for host routines
//!
//! Built once at startup. Each entry maps a routine id to a typed closure
//! erased behind a uniform body, plus a descriptor of its shape.

use super::convert::{FromArgs, IntoDispatch};
use super::dispatch::DispatchResult;
use super::driver::NativeCtx;
use super::error::{DispatchError, RegistryError, RoutineError};
use crate::interpreter::{RoutineId, Value};
use futures::future::{FutureExt, LocalBoxFuture};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;

/// Whether a routine can suspend on nested invocations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutineMode {
    Sync,
    Suspending,
}

/// Shape of a registered routine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineDescriptor {
    pub id: RoutineId,
    pub name: String,
    pub params: Vec<String>,
    pub mode: RoutineMode,
}

impl RoutineDescriptor {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

pub(crate) type SyncBody = Box<dyn Fn(Vec<Value>) -> Result<DispatchResult, DispatchError>>;
pub(crate) type SuspendingBody =
    Box<dyn Fn(NativeCtx, Vec<Value>) -> Result<LocalBoxFuture<'static, DispatchResult>, DispatchError>>;

pub(crate) enum Body {
    Sync(SyncBody),
    Suspending(SuspendingBody),
}

pub struct Routine {
    pub descriptor: RoutineDescriptor,
    pub(crate) body: Body,
}

/// Routines by id
#[derive(Default)]
pub struct Registry {
    routines: HashMap<RoutineId, Routine>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a routine that returns without re-entering the interpreter
    pub fn register_sync<A, R, F>(&mut self, id: RoutineId, name: &str, routine: F) -> Result<&mut Self, RegistryError>
    where
        A: FromArgs + 'static,
        R: IntoDispatch,
        F: Fn(A) -> Result<R, RoutineError> + 'static,
    {
        let routine_name = name.to_string();
        let body: SyncBody = Box::new(move |args| {
            let args = convert_args::<A>(&routine_name, args)?;
            routine(args)
                .map(IntoDispatch::into_dispatch)
                .map_err(|source| DispatchError::Routine {
                    routine: routine_name.clone(),
                    source,
                })
        });

        self.insert(id, name, A::shapes(), RoutineMode::Sync, Body::Sync(body))
    }

    /// Register an `async` routine that may await nested invocations
    pub fn register_suspending<A, R, F, Fut>(
        &mut self,
        id: RoutineId,
        name: &str,
        routine: F,
    ) -> Result<&mut Self, RegistryError>
    where
        A: FromArgs + 'static,
        R: IntoDispatch + 'static,
        F: Fn(NativeCtx, A) -> Fut + 'static,
        Fut: Future<Output = Result<R, RoutineError>> + 'static,
    {
        let routine_name = name.to_string();
        let body: SuspendingBody = Box::new(move |ctx, args| {
            let args = convert_args::<A>(&routine_name, args)?;
            let name = routine_name.clone();
            let future = routine(ctx, args).map(move |result| match result {
                Ok(value) => value.into_dispatch(),
                Err(source) => DispatchResult::Fault(
                    DispatchError::Routine {
                        routine: name,
                        source,
                    }
                    .into_fault(),
                ),
            });
            Ok(future.boxed_local())
        });

        self.insert(id, name, A::shapes(), RoutineMode::Suspending, Body::Suspending(body))
    }

    fn insert(
        &mut self,
        id: RoutineId,
        name: &str,
        params: Vec<String>,
        mode: RoutineMode,
        body: Body,
    ) -> Result<&mut Self, RegistryError> {
        if self.routines.contains_key(&id) {
            return Err(RegistryError::DuplicateId(id));
        }
        if self.routines.values().any(|r| r.descriptor.name == name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }

        let descriptor = RoutineDescriptor {
            id,
            name: name.to_string(),
            params,
            mode,
        };
        self.routines.insert(id, Routine { descriptor, body });
        Ok(self)
    }

    pub fn get(&self, id: RoutineId) -> Option<&Routine> {
        self.routines.get(&id)
    }

    pub fn contains(&self, id: RoutineId) -> bool {
        self.routines.contains_key(&id)
    }

    /// Descriptors ordered by id
    pub fn descriptors(&self) -> Vec<&RoutineDescriptor> {
        let mut descriptors: Vec<_> = self.routines.values().map(|r| &r.descriptor).collect();
        descriptors.sort_by_key(|d| d.id);
        descriptors
    }

    /// Name -> id, for the assembler
    pub fn symbols(&self) -> HashMap<String, RoutineId> {
        self.routines
            .values()
            .map(|r| (r.descriptor.name.clone(), r.descriptor.id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.routines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.descriptors()).finish()
    }
}

fn convert_args<A: FromArgs>(routine: &str, args: Vec<Value>) -> Result<A, DispatchError> {
    A::from_args(args).map_err(|(index, source)| DispatchError::ArgumentConversion {
        routine: routine.to_string(),
        index,
        source,
    })
}
