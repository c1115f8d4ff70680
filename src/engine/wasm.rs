//! In-process execution of `wasm` target modules.
//!
//! The module gets a single host capability, `env.abort`, which records
//! abnormal termination. Everything else the module imports is left
//! unresolved and fails instantiation.

use crate::engine::error::ExecError;
use crate::model::{EntryPoint, Execution};
use anyhow::anyhow;
use std::sync::atomic::{AtomicBool, Ordering};
use wasmtime::{
    Config, Engine, ExternType, Func, Linker, Module, ResourceLimiter, Store, Val, ValType,
};

const MAX_MEMORY_BYTES: usize = 64 * 1024 * 1024;
const MAX_TABLE_ELEMENTS: usize = 10_000;

/// Executes compiled modules. Implementations run on a blocking thread.
pub trait ModuleRunner: Send + Sync {
    /// Instantiate `wasm` and invoke its entry point. `on_stage` reports progress.
    fn execute(&self, wasm: &[u8], on_stage: &dyn Fn(&str)) -> Result<Execution, ExecError>;

    /// Stop any execution in progress and refuse new ones. Called on shutdown,
    /// from another thread than the one blocked in `execute`.
    fn interrupt(&self) {}
}

/// Per-execution host state.
#[derive(Default)]
struct HostState {
    aborted: bool,
}

impl ResourceLimiter for HostState {
    fn memory_growing(
        &mut self,
        _current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        Ok(desired <= MAX_MEMORY_BYTES)
    }

    fn table_growing(
        &mut self,
        _current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        Ok(desired <= MAX_TABLE_ELEMENTS)
    }
}

pub struct WasmRunner {
    engine: Engine,
    interrupted: AtomicBool,
}

impl WasmRunner {
    pub fn new() -> anyhow::Result<Self> {
        // Epoch checks let `interrupt` stop a module that never returns.
        let mut config = Config::new();
        config.epoch_interruption(true);
        Ok(Self {
            engine: Engine::new(&config)?,
            interrupted: AtomicBool::new(false),
        })
    }

    /// Build a linker that satisfies `env.abort` with whatever signature the module declares.
    fn linker_for(&self, module: &Module) -> anyhow::Result<Linker<HostState>> {
        let mut linker: Linker<HostState> = Linker::new(&self.engine);
        for import in module.imports() {
            if import.module() != "env" || import.name() != "abort" {
                continue;
            }
            if let ExternType::Func(ty) = import.ty() {
                let result_types: Vec<ValType> = ty.results().collect();
                linker.func_new("env", "abort", ty, move |mut caller, _params, results| {
                    tracing::error!("abort called");
                    caller.data_mut().aborted = true;
                    for (r, t) in results.iter_mut().zip(&result_types) {
                        *r = zero_for(t)
                            .ok_or_else(|| anyhow!("unsupported abort result type {t:?}"))?;
                    }
                    Ok(())
                })?;
            }
        }
        Ok(linker)
    }
}

/// Zero value for a numeric type; reference types are unsupported.
fn zero_for(ty: &ValType) -> Option<Val> {
    match ty {
        ValType::I32 => Some(Val::I32(0)),
        ValType::I64 => Some(Val::I64(0)),
        ValType::F32 => Some(Val::F32(0)),
        ValType::F64 => Some(Val::F64(0)),
        _ => None,
    }
}

fn call_entry(store: &mut Store<HostState>, func: Func) -> anyhow::Result<()> {
    let ty = func.ty(&*store);
    let params = ty
        .params()
        .map(|p| zero_for(&p).ok_or_else(|| anyhow!("unsupported entry point parameter type {p:?}")))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let mut results = vec![Val::I32(0); ty.results().len()];
    func.call(store, &params, &mut results)
}

impl ModuleRunner for WasmRunner {
    fn execute(&self, wasm: &[u8], on_stage: &dyn Fn(&str)) -> Result<Execution, ExecError> {
        on_stage("Instantiating WASM...");
        let module = Module::new(&self.engine, wasm).map_err(ExecError::Instantiate)?;
        let linker = self.linker_for(&module).map_err(ExecError::Instantiate)?;
        let mut store = Store::new(&self.engine, HostState::default());
        store.limiter(|state| state as &mut dyn ResourceLimiter);
        // Traps once `interrupt` bumps the engine epoch.
        store.set_epoch_deadline(1);
        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(ExecError::Instantiate)?;

        let found = EntryPoint::ALL
            .into_iter()
            .find_map(|entry| {
                instance
                    .get_func(&mut store, entry.export_name())
                    .map(|f| (entry, f))
            });
        let Some((entry, func)) = found else {
            tracing::info!("module exports no entry point");
            return Ok(Execution::NoEntryPoint);
        };

        // Checked after the deadline is armed so an interrupt racing this call
        // either lands here or trips the epoch.
        if self.interrupted.load(Ordering::SeqCst) {
            return Err(ExecError::Runtime(anyhow!("execution interrupted")));
        }
        on_stage("Executing...");
        tracing::debug!(entry = entry.export_name(), "invoking entry point");
        call_entry(&mut store, func).map_err(ExecError::Runtime)?;

        Ok(Execution::Completed {
            entry,
            aborted: store.data().aborted,
        })
    }

    fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        self.engine.increment_epoch();
    }
}
