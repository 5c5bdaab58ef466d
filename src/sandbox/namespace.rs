//! Safe namespace construction for sandboxed evaluation.
//!
//! Every execution gets a fresh interpreter whose global scope is prepared
//! the same way: the safe stdlib modules are pre-imported, dangerous
//! builtins are removed, `__import__` is replaced with an allow-list gate,
//! and `print`/`sys.stdout`/`sys.stderr` are wired to the capture buffers
//! in [`crate::sandbox::io`]. Variable bindings cross the host boundary as
//! JSON values so the engine can snapshot and commit them without holding
//! interpreter objects between executions.

use rustpython_vm::builtins::{
    PyBaseExceptionRef, PyDict, PyFloat, PyInt, PyList, PyModule, PyStr, PyTuple,
};
use rustpython_vm::compiler::Mode;
use rustpython_vm::function::FuncArgs;
use rustpython_vm::scope::Scope;
use rustpython_vm::{
    AsObject, Interpreter, Py, PyObjectRef, PyPayload, PyRef, PyResult, VirtualMachine,
};
use serde::Serialize;
use serde_json::Value;

use crate::sandbox::io;

/// Stdlib modules pre-imported into every execution namespace and the only
/// modules the gated `__import__` will resolve.
pub const SAFE_MODULES: &[&str] = &[
    "math",
    "random",
    "datetime",
    "json",
    "re",
    "collections",
    "itertools",
    "functools",
];

/// Names with this prefix are namespace bookkeeping; they are never listed
/// or committed as user variables.
pub const RESERVED_PREFIX: &str = "_";

/// One committed variable in the persistent store.
///
/// `value` is the JSON form used to re-seed later executions; listings show
/// only the rendered `printable_value` and type name.
#[derive(Debug, Clone, Serialize)]
pub struct VariableBinding {
    /// The Python global name.
    pub name: String,
    /// JSON form of the value, used to rebuild the binding in a fresh
    /// interpreter. Values without a JSON shape degrade to their string
    /// representation.
    #[serde(skip)]
    pub value: Value,
    /// `repr()` of the value at commit time.
    #[serde(rename = "printable_value")]
    pub repr: String,
    /// The Python type name (e.g. `int`, `list`).
    pub type_name: String,
}

/// Scope preparation run in every fresh interpreter before user code.
///
/// Internal names all carry the reserved `_` prefix so extraction can skip
/// them; the pre-imported safe modules are skipped by their module type.
const SETUP_CODE: &str = r#"
from _sandbox import _capture_print, _capture_stdout, _capture_stderr

import builtins
import sys
import math, random, datetime, json, re, collections, itertools, functools

builtins.print = _capture_print


class _StreamCapture:
    def __init__(self, hook):
        self._hook = hook

    def write(self, text):
        text = str(text)
        self._hook(text)
        return len(text)

    def flush(self):
        pass


sys.stdout = _StreamCapture(_capture_stdout)
sys.stderr = _StreamCapture(_capture_stderr)

# Aliased first: the loop below deletes the originals.
_hasattr = hasattr
_delattr = delattr

for _name in ('open', 'eval', 'exec', 'compile', 'input', 'breakpoint',
              'vars', 'globals', 'locals', 'memoryview', 'dir',
              'getattr', 'setattr', 'delattr', 'hasattr'):
    if _hasattr(builtins, _name):
        _delattr(builtins, _name)

_allowed = {'math', 'random', 'datetime', 'json', 're', 'collections',
            'itertools', 'functools', 'builtins', '_sandbox'}
_orig_import = builtins.__import__


def _guarded_import(name, globals=None, locals=None, fromlist=(), level=0):
    if name.split('.')[0] not in _allowed:
        raise ImportError(f"import of '{name}' is not allowed in the sandbox")
    return _orig_import(name, globals, locals, fromlist, level)


builtins.__import__ = _guarded_import
"#;

/// Build a fresh interpreter with the stdlib and the capture module loaded.
pub fn new_interpreter() -> Interpreter {
    Interpreter::with_init(Default::default(), |vm| {
        vm.add_native_modules(rustpython_stdlib::get_module_inits());
        vm.add_frozen(rustpython_pylib::FROZEN_STDLIB);
        vm.add_native_module("_sandbox".to_owned(), Box::new(make_capture_module));
    })
}

/// Run the setup code in a new scope and return it ready for user code.
pub fn prepare_scope(vm: &VirtualMachine) -> PyResult<Scope> {
    let scope = vm.new_scope_with_builtins();
    let code = vm
        .compile(SETUP_CODE, Mode::Exec, "<namespace_setup>".to_string())
        .map_err(|err| vm.new_runtime_error(format!("namespace setup failed to compile: {}", err)))?;
    vm.run_code_obj(code, scope.clone())?;
    Ok(scope)
}

/// Seed the scope's globals from committed bindings.
pub fn inject_bindings(
    vm: &VirtualMachine,
    scope: &Scope,
    bindings: &[VariableBinding],
) -> PyResult<()> {
    for binding in bindings {
        let value = json_to_pyobject(&binding.value, vm)?;
        scope.globals.set_item(binding.name.as_str(), value, vm)?;
    }
    Ok(())
}

/// Collect the user-visible globals after evaluation.
///
/// Reserved-prefix names and module objects (the pre-imported safe modules,
/// `builtins`, `sys`) are skipped; everything else is converted to its JSON
/// form plus a rendered preview. Entries that cannot be stringified at all
/// are dropped rather than aborting the commit.
pub fn extract_bindings(vm: &VirtualMachine, scope: &Scope) -> Vec<VariableBinding> {
    let globals: &Py<PyDict> = &scope.globals;
    let mut bindings = Vec::new();
    for (key, value) in globals {
        let name = match key.str(vm) {
            Ok(name) => name.as_str().to_string(),
            Err(_) => continue,
        };
        if name.starts_with(RESERVED_PREFIX) {
            continue;
        }
        if value.downcast_ref::<PyModule>().is_some() {
            continue;
        }
        let json = pyobject_to_json(&value, vm).unwrap_or(Value::Null);
        let repr = render_repr(&value, vm);
        let type_name = value.class().name().to_string();
        bindings.push(VariableBinding {
            name,
            value: json,
            repr,
            type_name,
        });
    }
    bindings.sort_by(|a, b| a.name.cmp(&b.name));
    bindings
}

/// Render the `name = repr` block shown for persistent-mode successes.
pub fn render_preview(bindings: &[VariableBinding]) -> Option<String> {
    if bindings.is_empty() {
        return None;
    }
    let lines: Vec<String> = bindings
        .iter()
        .map(|binding| format!("{} = {}", binding.name, binding.repr))
        .collect();
    Some(lines.join("\n"))
}

/// Format a raised Python exception as `"ExcType: message"`.
pub fn format_exception(vm: &VirtualMachine, exc: &PyBaseExceptionRef) -> String {
    let kind = exc.class().name().to_string();
    let args = exc.args();
    let detail = args
        .as_slice()
        .first()
        .and_then(|arg| arg.str(vm).ok())
        .map(|detail| detail.as_str().to_string());
    match detail {
        Some(detail) if !detail.is_empty() => format!("{}: {}", kind, detail),
        _ => kind,
    }
}

fn render_repr(value: &PyObjectRef, vm: &VirtualMachine) -> String {
    match value.repr(vm) {
        Ok(repr) => repr.as_str().to_string(),
        Err(_) => "<unprintable>".to_string(),
    }
}

/// The `_sandbox` native module holding the capture hooks.
fn make_capture_module(vm: &VirtualMachine) -> PyRef<PyModule> {
    let module = PyModule::new().into_ref(&vm.ctx);
    let dict = module.dict();
    let _ = dict.set_item(
        "_capture_print",
        vm.new_function("_capture_print", capture_print_impl).into(),
        vm,
    );
    let _ = dict.set_item(
        "_capture_stdout",
        vm.new_function("_capture_stdout", capture_stdout_impl)
            .into(),
        vm,
    );
    let _ = dict.set_item(
        "_capture_stderr",
        vm.new_function("_capture_stderr", capture_stderr_impl)
            .into(),
        vm,
    );
    module
}

/// `print` replacement: space-joined positional args plus a newline.
fn capture_print_impl(args: FuncArgs, vm: &VirtualMachine) -> PyResult<()> {
    let mut output = String::new();
    for (i, arg) in args.args.iter().enumerate() {
        if i > 0 {
            output.push(' ');
        }
        let text: String = arg.str(vm)?.to_string();
        output.push_str(&text);
    }
    output.push('\n');
    io::append_stdout(&output);
    Ok(())
}

fn capture_stdout_impl(args: FuncArgs, vm: &VirtualMachine) -> PyResult<()> {
    if let Some(arg) = args.args.first() {
        let text: String = arg.str(vm)?.to_string();
        io::append_stdout(&text);
    }
    Ok(())
}

fn capture_stderr_impl(args: FuncArgs, vm: &VirtualMachine) -> PyResult<()> {
    if let Some(arg) = args.args.first() {
        let text: String = arg.str(vm)?.to_string();
        io::append_stderr(&text);
    }
    Ok(())
}

/// Convert a Python object to its JSON form.
///
/// Bool is checked before int (bool subclasses int); anything outside the
/// JSON-representable set falls back to its string representation.
pub fn pyobject_to_json(obj: &PyObjectRef, vm: &VirtualMachine) -> PyResult<Value> {
    if obj.is(&vm.ctx.none) {
        return Ok(Value::Null);
    }

    if obj.class().is(vm.ctx.types.bool_type) {
        if let Ok(b) = obj.try_to_value::<bool>(vm) {
            return Ok(Value::Bool(b));
        }
    }

    if let Some(int) = obj.downcast_ref::<PyInt>() {
        if let Ok(n) = int.try_to_primitive::<i64>(vm) {
            return Ok(Value::Number(n.into()));
        }
    }

    if let Some(float) = obj.downcast_ref::<PyFloat>() {
        if let Some(n) = serde_json::Number::from_f64(float.to_f64()) {
            return Ok(Value::Number(n));
        }
        return Ok(Value::Null);
    }

    if let Some(s) = obj.downcast_ref::<PyStr>() {
        return Ok(Value::String(s.as_str().to_string()));
    }

    if let Some(list) = obj.downcast_ref::<PyList>() {
        let items: Result<Vec<Value>, _> = list
            .borrow_vec()
            .iter()
            .map(|item| pyobject_to_json(item, vm))
            .collect();
        return Ok(Value::Array(items?));
    }

    // Tuples and sets are JSON arrays; they re-seed as lists on the next
    // persistent call.
    if let Some(tuple) = obj.downcast_ref::<PyTuple>() {
        let items: Result<Vec<Value>, _> = tuple
            .as_slice()
            .iter()
            .map(|item| pyobject_to_json(item, vm))
            .collect();
        return Ok(Value::Array(items?));
    }

    if obj.class().is(vm.ctx.types.set_type) || obj.class().is(vm.ctx.types.frozenset_type) {
        let elements: Vec<PyObjectRef> = vm.extract_elements_with(obj, Ok)?;
        let items: Result<Vec<Value>, _> = elements
            .iter()
            .map(|item| pyobject_to_json(item, vm))
            .collect();
        return Ok(Value::Array(items?));
    }

    if let Some(dict) = obj.downcast_ref::<PyDict>() {
        let mut map = serde_json::Map::new();
        for (key, value) in dict {
            let key_str: String = key.str(vm)?.to_string();
            map.insert(key_str, pyobject_to_json(&value, vm)?);
        }
        return Ok(Value::Object(map));
    }

    let text: String = obj.str(vm)?.to_string();
    Ok(Value::String(text))
}

/// Convert a JSON value back into a Python object.
pub fn json_to_pyobject(value: &Value, vm: &VirtualMachine) -> PyResult {
    match value {
        Value::Null => Ok(vm.ctx.none()),
        Value::Bool(b) => Ok(vm.ctx.new_bool(*b).into()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(vm.ctx.new_int(i).into())
            } else if let Some(f) = n.as_f64() {
                Ok(vm.ctx.new_float(f).into())
            } else {
                Ok(vm.ctx.none())
            }
        }
        Value::String(s) => Ok(vm.ctx.new_str(s.clone()).into()),
        Value::Array(items) => {
            let items: Result<Vec<_>, _> =
                items.iter().map(|item| json_to_pyobject(item, vm)).collect();
            Ok(vm.ctx.new_list(items?).into())
        }
        Value::Object(entries) => {
            let dict = PyDict::new_ref(&vm.ctx);
            for (key, value) in entries {
                dict.set_item(key.as_str(), json_to_pyobject(value, vm)?, vm)?;
            }
            Ok(dict.into())
        }
    }
}
