//! VM configuration

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Options controlling arena sizing, call depth and diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmOptions {
    /// Bytes reserved for the call-frame stack segment
    pub stack_size: usize,
    /// Heap bytes reserved up front
    pub initial_heap_size: usize,
    /// Ceiling for the whole arena
    pub max_memory: usize,
    /// Maximum number of live frames
    pub max_call_depth: usize,
    /// Seed for the VM's random generator (entropy when unset)
    pub rng_seed: Option<u64>,
    /// Log every executed node at trace level
    pub trace_execution: bool,
    /// Package of the entry function
    pub entry_package: String,
    /// Name of the entry function
    pub entry_function: String,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            stack_size: 1024 * 1024,
            initial_heap_size: 64 * 1024,
            max_memory: 256 * 1024 * 1024,
            max_call_depth: 4096,
            rng_seed: None,
            trace_execution: false,
            entry_package: "main".to_string(),
            entry_function: "main".to_string(),
        }
    }
}

impl VmOptions {
    /// Parses options from JSON; missing fields take their defaults
    pub fn from_json(text: &str) -> Result<Self> {
        let options: VmOptions =
            serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Checks that the options describe a usable arena for a data segment of
    /// `data_size` bytes
    pub fn validate_for(&self, data_size: usize) -> Result<()> {
        if self.stack_size == 0 {
            return Err(Error::Config("stack_size must be greater than zero".into()));
        }
        if self.max_call_depth == 0 {
            return Err(Error::Config(
                "max_call_depth must be greater than zero".into(),
            ));
        }
        let initial = data_size + self.stack_size + self.initial_heap_size;
        if initial > self.max_memory {
            return Err(Error::Config(format!(
                "max_memory ({}) is below the initial layout ({} bytes)",
                self.max_memory, initial
            )));
        }
        Ok(())
    }

    /// Checks the options without a data segment
    pub fn validate(&self) -> Result<()> {
        self.validate_for(crate::memory::NIL_GUARD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options = VmOptions::from_json(r#"{"stack_size": 4096, "rng_seed": 7}"#).unwrap();
        assert_eq!(options.stack_size, 4096);
        assert_eq!(options.rng_seed, Some(7));
        assert_eq!(options.max_call_depth, 4096);
        assert_eq!(options.entry_function, "main");
    }

    #[test]
    fn test_invalid_options() {
        assert!(matches!(
            VmOptions::from_json(r#"{"stack_size": 0}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            VmOptions::from_json(r#"{"max_memory": 1024}"#),
            Err(Error::Config(_))
        ));
        assert!(VmOptions::from_json("not json").is_err());
    }
}
