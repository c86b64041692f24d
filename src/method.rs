//! Method scopes: locals/args, mutex acquisition accounting, and return plumbing (spec §3
//! "Method scope", §4.7).

use crate::{
    misc::{ArgNum, LocalNum, SyncLevel},
    mutex::MutexAcquisitions,
    name_object::AmlName,
    value::{AmlValue, Args},
    AmlError,
};

/// One method invocation's private state. Method scopes form their own stack, independent of
/// the namespace scope stack, but move in lockstep with it (spec §3).
pub struct MethodScope {
    pub locals: [AmlValue; 8],
    pub args: Args,
    pub return_value: Option<AmlValue>,
    pub mutex_acquisitions: MutexAcquisitions,
    /// The SyncLevel floor inherited from the caller (0 for a top-level invocation).
    pub caller_sync_level_floor: SyncLevel,
    /// The namespace scope this invocation executes in (its own absolute path).
    pub scope_path: AmlName,
}

impl MethodScope {
    pub fn new(args: Args, caller_sync_level_floor: SyncLevel, scope_path: AmlName) -> MethodScope {
        const UNINIT: AmlValue = AmlValue::Uninitialized;
        MethodScope {
            locals: [UNINIT; 8],
            args,
            return_value: None,
            mutex_acquisitions: MutexAcquisitions::new(),
            caller_sync_level_floor,
            scope_path,
        }
    }

    pub fn local(&self, num: LocalNum) -> Result<&AmlValue, AmlError> {
        self.locals.get(num as usize).ok_or(AmlError::InvalidLocalAccess(num)).and_then(|value| match value {
            AmlValue::Uninitialized => Err(AmlError::InvalidLocalAccess(num)),
            v => Ok(v),
        })
    }

    pub fn store_local(&mut self, num: LocalNum, value: AmlValue) -> Result<(), AmlError> {
        if num > 7 {
            return Err(AmlError::InvalidLocalAccess(num));
        }
        self.locals[num as usize] = value;
        Ok(())
    }

    pub fn arg(&self, num: ArgNum) -> Result<&AmlValue, AmlError> {
        self.args.arg(num)
    }

    pub fn store_arg(&mut self, num: ArgNum, value: AmlValue) -> Result<(), AmlError> {
        self.args.store_arg(num, value)
    }

    /// The effective SyncLevel for mutex-acquisition validation (spec §4.6 "SyncLevel rule").
    pub fn current_sync_level(&self) -> SyncLevel {
        self.mutex_acquisitions.current_sync_level(self.caller_sync_level_floor)
    }
}

/// The stack of method invocations currently in progress. Re-entrant: invoking a method from
/// within another is just another push (spec §5 "Scheduling model").
#[derive(Default)]
pub struct MethodScopeStack {
    scopes: alloc::vec::Vec<MethodScope>,
}

impl MethodScopeStack {
    pub fn new() -> MethodScopeStack {
        MethodScopeStack { scopes: alloc::vec::Vec::new() }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn push(&mut self, scope: MethodScope) {
        self.scopes.push(scope);
    }

    pub fn pop(&mut self) -> Option<MethodScope> {
        self.scopes.pop()
    }

    pub fn current(&self) -> Option<&MethodScope> {
        self.scopes.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut MethodScope> {
        self.scopes.last_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::str::FromStr;

    #[test]
    fn locals_start_uninitialized() {
        let scope = MethodScope::new(Args::EMPTY, 0, AmlName::from_str("\\").unwrap());
        assert!(scope.local(0).is_err());
    }

    #[test]
    fn store_then_read_local() {
        let mut scope = MethodScope::new(Args::EMPTY, 0, AmlName::from_str("\\").unwrap());
        scope.store_local(3, AmlValue::Integer(42)).unwrap();
        match scope.local(3).unwrap() {
            AmlValue::Integer(v) => assert_eq!(*v, 42),
            _ => panic!("wrong value"),
        }
    }

    #[test]
    fn out_of_range_local_is_error() {
        let mut scope = MethodScope::new(Args::EMPTY, 0, AmlName::from_str("\\").unwrap());
        assert!(scope.store_local(8, AmlValue::Integer(0)).is_err());
    }
}
