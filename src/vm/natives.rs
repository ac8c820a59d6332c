// mathvm Native Functions
// Process-wide registry of host functions callable through CALLNATIVE

use super::value::Value;
use crate::compiler::ConstantPool;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::OnceLock;

/// Host function: arguments in declaration order, pool for string ids
///
/// Returns `None` for void natives.
pub type NativeFn = fn(&[Value], &ConstantPool) -> Result<Option<Value>, String>;

pub struct NativeRegistry {
    natives: RwLock<FxHashMap<String, NativeFn>>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self {
            natives: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register("sqrt", native_sqrt);
        registry.register("sin", native_sin);
        registry.register("cos", native_cos);
        registry.register("tan", native_tan);
        registry.register("exp", native_exp);
        registry.register("log", native_log);
        registry.register("pow", native_pow);
        registry.register("fabs", native_fabs);
        registry.register("floor", native_floor);
        registry.register("ceil", native_ceil);
        registry.register("abs", native_abs);
        registry.register("strlen", native_strlen);
        registry.register("atoi", native_atoi);
        registry
    }

    pub fn global() -> &'static Self {
        static REGISTRY: OnceLock<NativeRegistry> = OnceLock::new();
        REGISTRY.get_or_init(Self::with_builtins)
    }

    /// Register or replace a native under `name`
    pub fn register(&self, name: &str, function: NativeFn) {
        self.natives.write().insert(name.to_string(), function);
    }

    pub fn get(&self, name: &str) -> Option<NativeFn> {
        self.natives.read().get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.natives.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.natives.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for NativeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Register a native in the global registry
pub fn register_native(name: &str, function: NativeFn) {
    NativeRegistry::global().register(name, function);
}

fn double_arg(args: &[Value], index: usize) -> Result<f64, String> {
    match args.get(index) {
        Some(Value::Double(v)) => Ok(*v),
        Some(Value::Int(v)) => Ok(*v as f64),
        Some(other) => Err(format!("argument {} must be a number, got {}", index, other.kind())),
        None => Err(format!("missing argument {}", index)),
    }
}

fn string_arg<'a>(args: &[Value], index: usize, constants: &'a ConstantPool) -> Result<&'a str, String> {
    match args.get(index) {
        Some(Value::StringRef(id)) => constants
            .get(*id)
            .ok_or_else(|| format!("unknown string constant {}", id)),
        Some(other) => Err(format!("argument {} must be a string, got {}", index, other.kind())),
        None => Err(format!("missing argument {}", index)),
    }
}

fn unary_double(args: &[Value], f: fn(f64) -> f64) -> Result<Option<Value>, String> {
    Ok(Some(Value::Double(f(double_arg(args, 0)?))))
}

fn native_sqrt(args: &[Value], _: &ConstantPool) -> Result<Option<Value>, String> {
    unary_double(args, f64::sqrt)
}

fn native_sin(args: &[Value], _: &ConstantPool) -> Result<Option<Value>, String> {
    unary_double(args, f64::sin)
}

fn native_cos(args: &[Value], _: &ConstantPool) -> Result<Option<Value>, String> {
    unary_double(args, f64::cos)
}

fn native_tan(args: &[Value], _: &ConstantPool) -> Result<Option<Value>, String> {
    unary_double(args, f64::tan)
}

fn native_exp(args: &[Value], _: &ConstantPool) -> Result<Option<Value>, String> {
    unary_double(args, f64::exp)
}

fn native_log(args: &[Value], _: &ConstantPool) -> Result<Option<Value>, String> {
    unary_double(args, f64::ln)
}

fn native_fabs(args: &[Value], _: &ConstantPool) -> Result<Option<Value>, String> {
    unary_double(args, f64::abs)
}

fn native_floor(args: &[Value], _: &ConstantPool) -> Result<Option<Value>, String> {
    unary_double(args, f64::floor)
}

fn native_ceil(args: &[Value], _: &ConstantPool) -> Result<Option<Value>, String> {
    unary_double(args, f64::ceil)
}

fn native_pow(args: &[Value], _: &ConstantPool) -> Result<Option<Value>, String> {
    let base = double_arg(args, 0)?;
    let exponent = double_arg(args, 1)?;
    Ok(Some(Value::Double(base.powf(exponent))))
}

fn native_abs(args: &[Value], _: &ConstantPool) -> Result<Option<Value>, String> {
    match args.first() {
        Some(Value::Int(v)) => Ok(Some(Value::Int(v.wrapping_abs()))),
        Some(other) => Err(format!("abs expects an int, got {}", other.kind())),
        None => Err("missing argument 0".to_string()),
    }
}

fn native_strlen(args: &[Value], constants: &ConstantPool) -> Result<Option<Value>, String> {
    let s = string_arg(args, 0, constants)?;
    Ok(Some(Value::Int(s.chars().count() as i64)))
}

/// C-style: optional sign and leading digits, 0 when there are none
fn native_atoi(args: &[Value], constants: &ConstantPool) -> Result<Option<Value>, String> {
    let s = string_arg(args, 0, constants)?.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let mut value: i64 = 0;
    for c in digits.chars().take_while(char::is_ascii_digit) {
        value = value.wrapping_mul(10).wrapping_add(c as i64 - '0' as i64);
    }
    Ok(Some(Value::Int(if negative { value.wrapping_neg() } else { value })))
}
