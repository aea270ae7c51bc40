//! Pipeline-wide, read-only configuration (spec §5: "Configuration ... is
//! read-only within a pass"), threaded the way the teacher threads
//! `ConsensusParameters` into the `Interpreter`.

use crate::types::Space;

/// Tunables for kernel lowering and allocation. None of these affect
/// semantics — only layout and scheduling granularity — so a pass may read
/// them freely without becoming non-deterministic (spec §5: "a deterministic
/// function of input program plus name-source seed").
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Default space for a "new block" allocation when no hint is given.
    pub default_space: Space,
    /// Default workgroup size used by blocked reduction (C7) when the caller
    /// does not override it.
    pub default_group_size: u64,
    /// Default number of workgroups (chunks) for blocked reduction.
    pub default_num_chunks: u64,
    /// Multiplier bounding how many simplifier passes may run before the
    /// fixpoint loop is considered buggy and fails loudly (spec §9: "N
    /// proportional to the initial binding count").
    pub simplify_iters_per_binding: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_space: Space::Device,
            default_group_size: 256,
            default_num_chunks: 128,
            simplify_iters_per_binding: 4,
        }
    }
}

impl PipelineConfig {
    /// Cap on simplifier rewrite passes for a program with `binding_count`
    /// let-bindings. Exceeding this indicates a non-terminating rule and
    /// should fail loudly rather than loop (spec §9).
    pub fn simplify_iteration_cap(&self, binding_count: usize) -> usize {
        (binding_count.max(1)) * self.simplify_iters_per_binding
    }
}
