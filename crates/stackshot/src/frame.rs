use stackshot_types::FrameRecord;
use std::fmt::Write as _;

/// One level of a captured stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    address: usize,
    symbol: Symbol,
}

/// What the resolver could say about an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Symbol {
    Resolved(ResolvedSymbol),
    /// Resolution failed; `raw` is the platform's description of the
    /// address and `reason` says what went wrong.
    Unresolved { raw: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSymbol {
    pub function: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub module: Option<String>,
}

impl Frame {
    pub fn new(address: usize, symbol: Symbol) -> Self {
        Self { address, symbol }
    }

    pub fn resolved(address: usize, symbol: ResolvedSymbol) -> Self {
        Self::new(address, Symbol::Resolved(symbol))
    }

    /// Fallback frame. An empty `raw` is replaced by the bare address so the
    /// description is never empty.
    pub fn unresolved(address: usize, raw: String, reason: impl Into<String>) -> Self {
        let raw = if raw.is_empty() {
            format!("[0x{address:x}]")
        } else {
            raw
        };
        Self::new(
            address,
            Symbol::Unresolved {
                raw,
                reason: reason.into(),
            },
        )
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.symbol, Symbol::Resolved(_))
    }

    pub fn function(&self) -> Option<&str> {
        match &self.symbol {
            Symbol::Resolved(resolved) => Some(resolved.function.as_str()),
            Symbol::Unresolved { .. } => None,
        }
    }

    /// Appends a single line (no trailing newline).
    pub fn render(&self, out: &mut String) {
        let _ = write!(out, "0x{:016x} ", self.address);
        match &self.symbol {
            Symbol::Resolved(resolved) => {
                out.push_str(&resolved.function);
                if let Some(file) = &resolved.file {
                    let _ = write!(out, " at {file}");
                    if let Some(line) = resolved.line {
                        let _ = write!(out, ":{line}");
                        if let Some(column) = resolved.column {
                            let _ = write!(out, ":{column}");
                        }
                    }
                } else if let Some(module) = &resolved.module {
                    let _ = write!(out, " in {module}");
                }
            }
            Symbol::Unresolved { raw, reason } => {
                let _ = write!(out, "{raw} ({reason})");
            }
        }
    }

    pub fn to_record(&self, index: u32) -> FrameRecord {
        let mut record = FrameRecord {
            index,
            address: self.address as u64,
            function: None,
            file: None,
            line: None,
            column: None,
            module: None,
            raw: None,
            unresolved_reason: None,
        };
        match &self.symbol {
            Symbol::Resolved(resolved) => {
                record.function = Some(resolved.function.clone());
                record.file = resolved.file.clone();
                record.line = resolved.line;
                record.column = resolved.column;
                record.module = resolved.module.clone();
            }
            Symbol::Unresolved { raw, reason } => {
                record.raw = Some(raw.clone());
                record.unresolved_reason = Some(reason.clone());
            }
        }
        record
    }
}
