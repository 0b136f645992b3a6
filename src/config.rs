// src/config.rs
//! Analysis feature flags. Read-only once analysis begins; hosts that
//! want different settings per module construct one config per module.

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Maximum AST recursion depth before `CodeTooComplex` is reported
    pub recursion_limit: usize,
    /// Give declared classes without a parent the root class type as
    /// their parent, so class guards can be negated
    pub negated_class_types: bool,
    /// Emit trace events for arena rebinds and refinement application
    pub solver_trace: bool,
    /// Record the source module of imported type bindings
    pub alias_declaration_metadata: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            recursion_limit: 300,
            negated_class_types: false,
            solver_trace: false,
            alias_declaration_metadata: false,
        }
    }
}
