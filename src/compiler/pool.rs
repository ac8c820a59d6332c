// mathvm Constant and Native Pools

use crate::ast::VarType;
use rustc_hash::FxHashMap;

/// Interned string constants shared by every function of a program
///
/// Entry 0 is always the empty string.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPool {
    strings: Vec<String>,
    index: FxHashMap<String, u16>,
}

impl ConstantPool {
    pub fn new() -> Self {
        let mut pool = Self {
            strings: Vec::new(),
            index: FxHashMap::default(),
        };
        pool.strings.push(String::new());
        pool.index.insert(String::new(), 0);
        pool
    }

    /// Rebuild a pool from stored entries; entry 0 must be "" and entries unique
    pub fn from_strings(strings: Vec<String>) -> Result<Self, String> {
        if strings.first().map(String::as_str) != Some("") {
            return Err("constant 0 must be the empty string".to_string());
        }
        if strings.len() > u16::MAX as usize + 1 {
            return Err(format!("too many constants: {}", strings.len()));
        }
        let mut index = FxHashMap::default();
        for (id, s) in strings.iter().enumerate() {
            if index.insert(s.clone(), id as u16).is_some() {
                return Err(format!("duplicate constant {:?}", s));
            }
        }
        Ok(Self { strings, index })
    }

    /// Id of `s`, adding it if needed; `None` once all 16-bit ids are taken
    pub fn intern(&mut self, s: &str) -> Option<u16> {
        if let Some(&id) = self.index.get(s) {
            return Some(id);
        }
        let id = u16::try_from(self.strings.len()).ok()?;
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), id);
        Some(id)
    }

    pub fn lookup(&self, s: &str) -> Option<u16> {
        self.index.get(s).copied()
    }

    pub fn get(&self, id: u16) -> Option<&str> {
        self.strings.get(id as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(String::as_str)
    }
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Typed signature of a native function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeSignature {
    pub return_type: VarType,
    pub params: Vec<VarType>,
}

impl NativeSignature {
    pub fn new(return_type: VarType, params: Vec<VarType>) -> Self {
        Self {
            return_type,
            params,
        }
    }
}

impl std::fmt::Display for NativeSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let params: Vec<&str> = self.params.iter().map(VarType::name).collect();
        write!(f, "{}({})", self.return_type, params.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeDescriptor {
    pub name: String,
    pub signature: NativeSignature,
}

/// Natives referenced by a program, in registration order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NativePool {
    natives: Vec<NativeDescriptor>,
    index: FxHashMap<String, u16>,
}

impl NativePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a native; a name seen before keeps its first id
    pub fn register(&mut self, name: &str, signature: NativeSignature) -> Option<u16> {
        if let Some(&id) = self.index.get(name) {
            return Some(id);
        }
        let id = u16::try_from(self.natives.len()).ok()?;
        self.natives.push(NativeDescriptor {
            name: name.to_string(),
            signature,
        });
        self.index.insert(name.to_string(), id);
        Some(id)
    }

    pub fn lookup(&self, name: &str) -> Option<u16> {
        self.index.get(name).copied()
    }

    pub fn get(&self, id: u16) -> Option<&NativeDescriptor> {
        self.natives.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.natives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.natives.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NativeDescriptor> {
        self.natives.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_idempotent() {
        let mut pool = ConstantPool::new();
        let a = pool.intern("hello").unwrap();
        let b = pool.intern("world").unwrap();
        assert_eq!(pool.intern("hello"), Some(a));
        assert_ne!(a, b);
        assert_eq!(pool.get(a), Some("hello"));
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn test_empty_string_is_zero() {
        let mut pool = ConstantPool::new();
        assert_eq!(pool.intern(""), Some(0));
        assert_eq!(pool.get(0), Some(""));
    }

    #[test]
    fn test_from_strings_validates() {
        assert!(ConstantPool::from_strings(vec!["x".into()]).is_err());
        assert!(ConstantPool::from_strings(vec!["".into(), "a".into(), "a".into()]).is_err());
        let pool = ConstantPool::from_strings(vec!["".into(), "a".into()]).unwrap();
        assert_eq!(pool.lookup("a"), Some(1));
    }

    #[test]
    fn test_native_dedup() {
        let mut natives = NativePool::new();
        let sig = NativeSignature::new(VarType::Double, vec![VarType::Double]);
        let a = natives.register("sqrt", sig.clone()).unwrap();
        let b = natives.register("sin", sig.clone()).unwrap();
        assert_eq!(natives.register("sqrt", sig), Some(a));
        assert_eq!((a, b), (0, 1));
        assert_eq!(natives.get(b).map(|d| d.name.as_str()), Some("sin"));
    }
}
