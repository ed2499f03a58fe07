//! Native operator registry
//!
//! Every native operator implements [`Opcode`]: a name, a static signature used by the
//! layout pass for type checking, and an `execute` body that reads its inputs and
//! stages its outputs through an [`OpContext`]. Adapters add their own operators to the
//! same [`OpcodeTable`].

pub mod basic;
pub mod context;
pub mod floats;
pub mod ints;
pub mod slices;
pub mod strings;

pub use context::{OpContext, Scalar};

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::ir::{OpCode, Operator, Signature};

/// Opcode trait - all native operators must implement this
pub trait Opcode: Send + Sync {
    /// Registered name, e.g. `i64.add`
    fn name(&self) -> &str;

    /// Static input/output types
    fn signature(&self) -> &Signature;

    /// Execute the operator against the node in `ctx`
    fn execute(&self, ctx: &mut OpContext<'_>) -> Result<()>;
}

/// Operator body
pub type OpFn = fn(&mut OpContext<'_>) -> Result<()>;

/// Operator backed by a plain function
#[derive(Clone)]
pub struct NativeFn {
    name: String,
    signature: Signature,
    func: OpFn,
}

impl NativeFn {
    /// Creates an operator named `name`
    pub fn new(name: impl Into<String>, signature: Signature, func: OpFn) -> Self {
        NativeFn {
            name: name.into(),
            signature,
            func,
        }
    }
}

impl Opcode for NativeFn {
    fn name(&self) -> &str {
        &self.name
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn execute(&self, ctx: &mut OpContext<'_>) -> Result<()> {
        (self.func)(ctx)
    }
}

/// Opcode registry
pub struct OpcodeTable {
    ops: Vec<Arc<dyn Opcode>>,
    by_name: HashMap<String, OpCode>,
}

impl OpcodeTable {
    /// Create new table with the native library
    pub fn new() -> Self {
        let mut table = Self::empty();
        basic::register(&mut table);
        ints::register(&mut table);
        floats::register(&mut table);
        strings::register(&mut table);
        slices::register(&mut table);
        table
    }

    /// Create empty table (for adapters and testing)
    pub fn empty() -> Self {
        OpcodeTable {
            ops: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Registers an operator and returns its code.
    /// Registering a name again replaces the operator and keeps its code.
    pub fn register<T: Opcode + 'static>(&mut self, op: T) -> OpCode {
        let op: Arc<dyn Opcode> = Arc::new(op);
        if let Some(&code) = self.by_name.get(op.name()) {
            self.ops[code.0 as usize] = op;
            return code;
        }
        let code = OpCode(self.ops.len() as u32);
        self.by_name.insert(op.name().to_string(), code);
        self.ops.push(op);
        code
    }

    /// Registers a function-backed operator
    pub fn register_fn(&mut self, name: impl Into<String>, signature: Signature, func: OpFn) -> OpCode {
        self.register(NativeFn::new(name, signature, func))
    }

    /// Code of the operator named `name`
    pub fn lookup(&self, name: &str) -> Result<OpCode> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::unresolved(format!("opcode {}", name)))
    }

    /// Operator by code
    pub fn get(&self, code: OpCode) -> Result<Arc<dyn Opcode>> {
        self.ops
            .get(code.0 as usize)
            .cloned()
            .ok_or_else(|| Error::unresolved(format!("opcode #{}", code.0)))
    }

    /// IR operator for the opcode named `name`
    pub fn operator(&self, name: &str) -> Result<Operator> {
        let code = self.lookup(name)?;
        let op = self.get(code)?;
        Ok(Operator::Native {
            code,
            name: op.name().to_string(),
            signature: op.signature().clone(),
        })
    }

    /// Check if an opcode exists
    pub fn has(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// List all opcode names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.by_name.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get opcode count
    pub fn count(&self) -> usize {
        self.ops.len()
    }
}

impl Default for OpcodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeKind;

    fn noop(_: &mut OpContext<'_>) -> Result<()> {
        Ok(())
    }

    #[test]
    fn test_registry_codes_are_stable() {
        let mut table = OpcodeTable::empty();
        let sig = Signature::new(vec![TypeKind::I64], vec![]);
        let first = table.register_fn("test.noop", sig.clone(), noop);
        let second = table.register_fn("test.other", sig.clone(), noop);
        assert_ne!(first, second);
        assert_eq!(table.register_fn("test.noop", Signature::default(), noop), first);
        assert_eq!(table.count(), 2);
        assert_eq!(table.get(first).unwrap().signature(), &Signature::default());
        assert!(matches!(
            table.lookup("test.missing"),
            Err(Error::UnresolvedSymbol { .. })
        ));
    }

    #[test]
    fn test_library_is_registered() {
        let table = OpcodeTable::new();
        for name in [
            "identity",
            "und.add",
            "i64.div",
            "u8.shl",
            "f64.sqrt",
            "bool.not",
            "str.concat",
            "[]i64.copy",
            "[]str.append",
            "i64.rand",
        ] {
            assert!(table.has(name), "missing {}", name);
        }
        assert!(matches!(
            table.operator("i64.add").unwrap(),
            Operator::Native { ref name, .. } if name == "i64.add"
        ));
    }
}
