//! Usage tables: for a body, which names are used (read) and which pattern
//! results of a just-simplified expression are actually consumed downstream.
//! Bottom-up simplifier rules (spec §4.4) receive this to decide whether an
//! output is dead.

use crate::ir::kernels::KernelOp;
use crate::ir::mem::MemOp;
use crate::ir::soacs::SoacOp;
use crate::ir::{Body, Exp, LoopForm, SubExp};
use crate::name::Name;
use std::collections::HashSet;

/// The set of names a body (or a single expression) reads, ignoring names it
/// binds itself — i.e. its free variables.
#[derive(Debug, Clone, Default)]
pub struct UsageTable {
    used: HashSet<Name>,
}

impl UsageTable {
    pub fn is_used(&self, name: Name) -> bool {
        self.used.contains(&name)
    }

    pub fn names(&self) -> impl Iterator<Item = Name> + '_ {
        self.used.iter().copied()
    }

    fn mark(&mut self, se: SubExp) {
        if let Some(n) = se.as_name() {
            self.used.insert(n);
        }
    }

    fn mark_many(&mut self, ses: &[SubExp]) {
        for se in ses {
            self.mark(*se);
        }
    }
}

/// Trait letting [`usage_of_body`] walk any `Op` for its own sub-expression
/// uses (SOACs' inputs, kernels' inputs, allocation sizes, ...).
pub trait UsesNames {
    fn collect_uses(&self, table: &mut UsageTable);
}

impl UsesNames for SoacOp {
    fn collect_uses(&self, table: &mut UsageTable) {
        table.mark(self.width());
        table.mark_many(self.inputs());
        match self {
            SoacOp::Map { lambda, .. } | SoacOp::Filter { lambda, .. } => usage_into(&lambda.body, table),
            SoacOp::Reduce { lambda, nes, .. } | SoacOp::Scan { lambda, nes, .. } => {
                table.mark_many(nes);
                usage_into(&lambda.body, table);
            }
            SoacOp::Redomap { reduce_lambda, map_lambda, nes, .. } => {
                table.mark_many(nes);
                usage_into(&reduce_lambda.body, table);
                usage_into(&map_lambda.body, table);
            }
            SoacOp::Stream { lambda, accs, .. } => {
                table.mark_many(accs);
                usage_into(&lambda.body, table);
            }
        }
    }
}

impl UsesNames for KernelOp {
    fn collect_uses(&self, table: &mut UsageTable) {
        match self {
            KernelOp::Soac(s) => s.collect_uses(table),
            KernelOp::Kernel(k) => {
                table.mark(k.num_threads);
                for input in &k.inputs {
                    table.used.insert(input.array);
                }
                usage_into(&k.body, table);
            }
            KernelOp::ReduceKernel(rk) => {
                table.mark(rk.num_chunks);
                table.mark(rk.group_size);
                table.mark(rk.input_len);
                table.used.insert(rk.input);
                usage_into(&rk.op.body, table);
                usage_into(&rk.per_thread_body, table);
                usage_into(&rk.cross_thread_body, table);
            }
        }
    }
}

impl UsesNames for MemOp {
    fn collect_uses(&self, table: &mut UsageTable) {
        match self {
            MemOp::Alloc { size, .. } => table.mark(*size),
            MemOp::Kernel(k) => k.collect_uses(table),
        }
    }
}

/// Compute the usage table for an entire body: every name read by any
/// statement's expression, by the loop/branch conditions, and by the final
/// result tuple.
pub fn usage_into<Op: UsesNames, Dec>(body: &Body<Op, Dec>, table: &mut UsageTable) {
    for stm in &body.stms {
        for c in &stm.certs.0 {
            table.used.insert(*c);
        }
        match &stm.exp {
            Exp::SubExp(se) => table.mark(*se),
            Exp::BasicOp(b) => collect_basic_op_uses(b, table),
            Exp::Op(op) => op.collect_uses(table),
            Exp::If { cond, then_body, else_body } => {
                table.mark(*cond);
                usage_into(then_body, table);
                usage_into(else_body, table);
            }
            Exp::DoLoop { merge, form, body } => {
                for (_, init) in merge {
                    table.mark(*init);
                }
                if let LoopForm::For { bound, .. } = form {
                    table.mark(*bound);
                }
                usage_into(body, table);
            }
        }
    }
    table.mark_many(&body.result);
}

fn collect_basic_op_uses(op: &crate::ir::BasicOp, table: &mut UsageTable) {
    use crate::ir::BasicOp::*;
    match op {
        BinOp(_, a, b) => {
            table.mark(*a);
            table.mark(*b);
        }
        UnOp(_, a) => table.mark(*a),
        Index(arr, idx) => {
            table.used.insert(*arr);
            table.mark_many(idx);
        }
        Iota(n, _) => table.mark(*n),
        Replicate(n, v) => {
            table.mark(*n);
            table.mark(*v);
        }
        Reshape(dims, arr) => {
            table.mark_many(dims);
            table.used.insert(*arr);
        }
        Rearrange(_, arr) | Copy(arr) => {
            table.used.insert(*arr);
        }
        Concat(_, arrs) => {
            for a in arrs {
                table.used.insert(*a);
            }
        }
        Assert(c, _) => table.mark(*c),
        Partition(_, flags, arrs) => {
            table.used.insert(*flags);
            for a in arrs {
                table.used.insert(*a);
            }
        }
    }
}

/// Usage table for a whole body, as a convenience entry point.
pub fn usage_of_body<Op: UsesNames, Dec>(body: &Body<Op, Dec>) -> UsageTable {
    let mut table = UsageTable::default();
    usage_into(body, &mut table);
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::soacs::SoacsBody;
    use crate::ir::PrimValue;

    #[test]
    fn result_names_are_used() {
        let mut names = crate::name::NameSource::new();
        let x = names.fresh("x");
        let body: SoacsBody = Body::new(vec![SubExp::Var(x)]);
        let table = usage_of_body(&body);
        assert!(table.is_used(x));
    }

    #[test]
    fn unrelated_name_not_used() {
        let mut names = crate::name::NameSource::new();
        let x = names.fresh("x");
        let body: SoacsBody = Body::new(vec![SubExp::Constant(PrimValue::Bool(true))]);
        let table = usage_of_body(&body);
        assert!(!table.is_used(x));
    }
}
