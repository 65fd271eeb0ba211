//! Lowering of statement trees to the CFG IR.
//!
//! [`FunctionEmitContext`] is the emit-context interface the statement
//! and expression lowering code programs against: basic-block plumbing,
//! the internal/function mask pair, lexical scopes, and the loop and if
//! bookkeeping that makes `break`/`continue`/`return` work under both
//! uniform and varying control flow.
//!
//! Mask discipline (see the glossary in the language reference):
//!
//! - The *internal mask* is scoped to the innermost varying `if`/loop and
//!   is what tests and `break`/`continue` modify.
//! - The *function mask* is function-global; only `return` turns lanes
//!   off in it.
//! - The *full mask*, their conjunction, gates every observable effect.
//!
//! Because the all-on mask constant is interned by the builder, "is the
//! mask provably all on at compile time" is a [`ValueId`] comparison.

pub mod expr;
pub mod stmt;

use log::debug;

use crate::ast::SourcePos;
use crate::error::Result;
use crate::ir::builder::Builder;
use crate::ir::{BlockId, DebugVar, FuncId, IrType, Module, ValueId};
use crate::sym::SymbolTable;
use crate::types::Type;
use crate::{bail_lower, CompileContext};

pub use stmt::emit_stmt;

/// One entry of the control-flow bookkeeping stack.
#[derive(Debug)]
enum CfFrame {
    UniformIf,
    VaryingIf {
        saved_mask: ValueId,
    },
    Loop {
        break_target: BlockId,
        continue_target: BlockId,
        uniform: bool,
        saved_mask: ValueId,
        /// Lanes that executed `break` this trip, OR-accumulated. Only
        /// varying loops allocate the slots.
        break_lanes_ptr: Option<ValueId>,
        continued_lanes_ptr: Option<ValueId>,
        /// Mask on entry to the current iteration's body.
        loop_mask: Option<ValueId>,
        any_break_recorded: bool,
        any_continue_recorded: bool,
    },
}

pub struct FunctionEmitContext<'a, 'm> {
    pub cx: &'a mut CompileContext,
    pub symtab: &'a mut SymbolTable,
    pub b: Builder<'m>,
    width: u32,
    internal_mask: ValueId,
    function_mask: ValueId,
    full_mask_cache: Option<(ValueId, ValueId, ValueId)>,
    cf_stack: Vec<CfFrame>,
    scope_depth: u32,
    return_block: BlockId,
    return_value_ptr: Option<ValueId>,
    returned_lanes_ptr: ValueId,
    any_return_recorded: bool,
}

impl<'a, 'm> FunctionEmitContext<'a, 'm> {
    /// Start emitting a function with the given language-level return
    /// type. Both masks start all-on; the driver may overwrite them with
    /// an incoming mask argument for non-entry functions.
    pub fn new(
        cx: &'a mut CompileContext,
        symtab: &'a mut SymbolTable,
        module: &'m mut Module,
        name: impl Into<String>,
        ret: &Type,
    ) -> Result<Self> {
        let width = cx.target.vector_width;
        let ret_ir = match ret {
            Type::Void => IrType::Void,
            other => match other.lowered(&cx.target) {
                Some(t) => t,
                None => bail_lower!("return type \"{}\" has no lowered form", other),
            },
        };
        let mut b = Builder::new(module, name, ret_ir.clone());
        let all_on = b.mask_all_on(width);
        let all_off = b.mask_all_off(width);
        let returned_lanes_ptr = b.alloca(IrType::mask(width), "returned_lanes_memory");
        b.store(all_off, returned_lanes_ptr);
        let return_value_ptr = match ret_ir {
            IrType::Void => None,
            ty => Some(b.alloca(ty, "return_value_memory")),
        };
        let return_block = b.create_block("return");
        Ok(FunctionEmitContext {
            cx,
            symtab,
            b,
            width,
            internal_mask: all_on,
            function_mask: all_on,
            full_mask_cache: None,
            cf_stack: Vec::new(),
            scope_depth: 0,
            return_block,
            return_value_ptr,
            returned_lanes_ptr,
            any_return_recorded: false,
        })
    }

    pub fn vector_width(&self) -> u32 {
        self.width
    }

    pub fn mask_all_on(&mut self) -> ValueId {
        self.b.mask_all_on(self.width)
    }

    pub fn mask_all_off(&mut self) -> ValueId {
        self.b.mask_all_off(self.width)
    }

    // =========================================================================
    // Basic blocks
    // =========================================================================

    pub fn current_basic_block(&self) -> Option<BlockId> {
        self.b.current_block()
    }

    pub fn create_basic_block(&mut self, name: impl Into<String>) -> BlockId {
        self.b.create_block(name)
    }

    pub fn set_current_basic_block(&mut self, block: BlockId) {
        self.b.set_current_block(block);
    }

    pub fn branch_inst(&mut self, dest: BlockId) {
        self.b.branch(dest);
    }

    pub fn cond_branch_inst(&mut self, if_true: BlockId, if_false: BlockId, cond: ValueId) {
        self.b.cond_branch(cond, if_true, if_false);
    }

    // =========================================================================
    // Scopes and debug info
    // =========================================================================

    pub fn start_scope(&mut self) {
        self.scope_depth += 1;
    }

    pub fn end_scope(&mut self) {
        assert!(self.scope_depth > 0, "unbalanced scope brackets");
        self.scope_depth -= 1;
    }

    pub fn set_debug_pos(&mut self, pos: &SourcePos) {
        self.b.set_debug_pos(pos.clone());
    }

    pub fn emit_variable_debug_info(&mut self, name: &str, storage: ValueId, pos: &SourcePos) {
        let scope_depth = self.scope_depth;
        self.b.record_debug_var(DebugVar {
            name: name.to_string(),
            storage,
            scope_depth,
            pos: pos.clone(),
        });
    }

    /// Instrumentation hook at a control-flow point; a no-op unless the
    /// instrument switch is on.
    pub fn add_instrumentation_point(&mut self, label: &str) {
        if !self.cx.opts.instrument {
            return;
        }
        let note = self.b.string_ptr(label);
        let full = self.get_full_mask();
        let lanes = self.b.lane_mask(full);
        self.b
            .call("__do_instrument", vec![note, lanes], "", IrType::Void);
    }

    // =========================================================================
    // Masks
    // =========================================================================

    pub fn get_internal_mask(&self) -> ValueId {
        self.internal_mask
    }

    pub fn set_internal_mask(&mut self, mask: ValueId) {
        self.internal_mask = mask;
        self.full_mask_cache = None;
    }

    pub fn set_internal_mask_and(&mut self, old: ValueId, test: ValueId) {
        let m = self.b.mask_and(old, test);
        self.set_internal_mask(m);
    }

    pub fn set_internal_mask_and_not(&mut self, old: ValueId, test: ValueId) {
        let m = self.b.mask_and_not(old, test);
        self.set_internal_mask(m);
    }

    pub fn get_function_mask(&self) -> ValueId {
        self.function_mask
    }

    pub fn set_function_mask(&mut self, mask: ValueId) {
        self.function_mask = mask;
        self.full_mask_cache = None;
    }

    /// internal & function. The AND is emitted at most once per mask
    /// pair; when either side is the all-on constant the other side is
    /// returned directly, which is what makes the "provably all on"
    /// comparison in the `if` lowering work.
    pub fn get_full_mask(&mut self) -> ValueId {
        let all_on = self.b.mask_all_on(self.width);
        if self.internal_mask == all_on {
            return self.function_mask;
        }
        if self.function_mask == all_on {
            return self.internal_mask;
        }
        if let Some((i, f, full)) = self.full_mask_cache {
            if i == self.internal_mask && f == self.function_mask {
                return full;
            }
        }
        let full = self.b.mask_and(self.internal_mask, self.function_mask);
        self.full_mask_cache = Some((self.internal_mask, self.function_mask, full));
        full
    }

    pub fn all(&mut self, mask: ValueId) -> ValueId {
        self.b.all(mask)
    }

    pub fn any(&mut self, mask: ValueId) -> ValueId {
        self.b.any(mask)
    }

    pub fn lane_mask(&mut self, mask: ValueId) -> ValueId {
        self.b.lane_mask(mask)
    }

    pub fn branch_if_mask_all(&mut self, b_all: BlockId, b_mixed: BlockId) {
        let full = self.get_full_mask();
        let cond = self.b.all(full);
        self.b.cond_branch(cond, b_all, b_mixed);
    }

    pub fn branch_if_mask_any(&mut self, b_run: BlockId, b_skip: BlockId) {
        let full = self.get_full_mask();
        let cond = self.b.any(full);
        self.b.cond_branch(cond, b_run, b_skip);
    }

    /// Blend `value` into `*ptr` for the lanes on in `mask`. Degenerates
    /// to a plain store when the mask is provably all on.
    pub fn masked_store(&mut self, value: ValueId, ptr: ValueId, mask: ValueId) {
        if mask == self.b.mask_all_on(self.width) {
            self.b.store(value, ptr);
            return;
        }
        let old = self.b.load(ptr);
        let blended = self.b.select(mask, value, old);
        self.b.store(blended, ptr);
    }

    // =========================================================================
    // If bookkeeping
    // =========================================================================

    pub fn start_uniform_if(&mut self) {
        self.cf_stack.push(CfFrame::UniformIf);
    }

    pub fn start_varying_if(&mut self, old_mask: ValueId) {
        self.cf_stack.push(CfFrame::VaryingIf {
            saved_mask: old_mask,
        });
    }

    pub fn end_if(&mut self) {
        match self.cf_stack.pop() {
            Some(CfFrame::UniformIf) => {}
            Some(CfFrame::VaryingIf { saved_mask }) => {
                // Lanes that broke, continued, or returned inside the if
                // must stay off after it.
                let restored = self.remove_disabled_lanes(saved_mask);
                self.set_internal_mask(restored);
            }
            other => panic!("end_if without matching start (found {:?})", other),
        }
    }

    /// AND away any lanes recorded as returned, broken, or continued
    /// since the mask was saved.
    fn remove_disabled_lanes(&mut self, mask: ValueId) -> ValueId {
        let mut m = mask;
        if self.any_return_recorded {
            let returned = self.b.load(self.returned_lanes_ptr);
            m = self.b.mask_and_not(m, returned);
        }
        let loop_slots = self.cf_stack.iter().rev().find_map(|f| match f {
            CfFrame::Loop {
                break_lanes_ptr,
                continued_lanes_ptr,
                any_break_recorded,
                any_continue_recorded,
                ..
            } => Some((
                if *any_break_recorded { *break_lanes_ptr } else { None },
                if *any_continue_recorded { *continued_lanes_ptr } else { None },
            )),
            _ => None,
        });
        if let Some((break_ptr, continue_ptr)) = loop_slots {
            if let Some(p) = break_ptr {
                let broken = self.b.load(p);
                m = self.b.mask_and_not(m, broken);
            }
            if let Some(p) = continue_ptr {
                let continued = self.b.load(p);
                m = self.b.mask_and_not(m, continued);
            }
        }
        m
    }

    // =========================================================================
    // Loop bookkeeping
    // =========================================================================

    pub fn start_loop(&mut self, break_target: BlockId, continue_target: BlockId, uniform: bool) {
        let saved_mask = self.internal_mask;
        let (break_lanes_ptr, continued_lanes_ptr) = if uniform {
            (None, None)
        } else {
            let mask_ty = IrType::mask(self.width);
            let all_off = self.b.mask_all_off(self.width);
            let bp = self.b.alloca(mask_ty.clone(), "break_lanes_memory");
            self.b.store(all_off, bp);
            let cp = self.b.alloca(mask_ty, "continue_lanes_memory");
            self.b.store(all_off, cp);
            (Some(bp), Some(cp))
        };
        self.cf_stack.push(CfFrame::Loop {
            break_target,
            continue_target,
            uniform,
            saved_mask,
            break_lanes_ptr,
            continued_lanes_ptr,
            loop_mask: None,
            any_break_recorded: false,
            any_continue_recorded: false,
        });
    }

    pub fn end_loop(&mut self) {
        match self.cf_stack.pop() {
            Some(CfFrame::Loop {
                uniform,
                saved_mask,
                ..
            }) => {
                if !uniform {
                    // Lanes that left via break rejoin after the loop;
                    // returned lanes stay off.
                    let mut m = saved_mask;
                    if self.any_return_recorded {
                        let returned = self.b.load(self.returned_lanes_ptr);
                        m = self.b.mask_and_not(m, returned);
                    }
                    self.set_internal_mask(m);
                }
            }
            other => panic!("end_loop without matching start (found {:?})", other),
        }
    }

    pub fn set_loop_mask(&mut self, mask: ValueId) {
        match self.cf_stack.last_mut() {
            Some(CfFrame::Loop { loop_mask, .. }) => *loop_mask = Some(mask),
            other => panic!("set_loop_mask outside a loop (found {:?})", other),
        }
    }

    /// Bring lanes that executed `continue` this iteration back into the
    /// internal mask, ready for the next trip. Called at the top of the
    /// step/test block of varying loops.
    pub fn restore_continued_lanes(&mut self) {
        let Some((ptr, recorded)) = self.cf_stack.iter().rev().find_map(|f| match f {
            CfFrame::Loop {
                continued_lanes_ptr,
                any_continue_recorded,
                ..
            } => Some((*continued_lanes_ptr, *any_continue_recorded)),
            _ => None,
        }) else {
            panic!("restore_continued_lanes outside a loop");
        };
        let (Some(ptr), true) = (ptr, recorded) else {
            return;
        };
        let continued = self.b.load(ptr);
        let im = self.internal_mask;
        let restored = self.b.mask_or(im, continued);
        self.set_internal_mask(restored);
        let all_off = self.b.mask_all_off(self.width);
        self.b.store(all_off, ptr);
    }

    fn innermost_loop_index(&self) -> Option<usize> {
        self.cf_stack
            .iter()
            .rposition(|f| matches!(f, CfFrame::Loop { .. }))
    }

    /// Every frame between the innermost loop and here is a uniform if,
    /// so a branch terminator needs no lane management.
    fn ifs_in_loop_all_uniform(&self, loop_index: usize) -> bool {
        self.cf_stack[loop_index + 1..]
            .iter()
            .all(|f| matches!(f, CfFrame::UniformIf))
    }

    // =========================================================================
    // Control-flow terminators
    // =========================================================================

    pub fn emit_break(&mut self, coherent: bool) -> Result<()> {
        let Some(idx) = self.innermost_loop_index() else {
            bail_lower!("break statement not within a loop");
        };
        let (break_target, uniform, break_lanes_ptr) = match &self.cf_stack[idx] {
            CfFrame::Loop {
                break_target,
                uniform,
                break_lanes_ptr,
                ..
            } => (*break_target, *uniform, *break_lanes_ptr),
            _ => unreachable!(),
        };

        if uniform && self.ifs_in_loop_all_uniform(idx) {
            // Everything between here and the loop header is uniform:
            // every lane agrees, so just jump out.
            self.b.branch(break_target);
            return Ok(());
        }

        let Some(ptr) = break_lanes_ptr else {
            bail_lower!("varying break in a loop lowered as uniform");
        };
        let full = self.get_full_mask();
        let old = self.b.load(ptr);
        let accumulated = self.b.mask_or(old, full);
        self.b.store(accumulated, ptr);
        if let CfFrame::Loop {
            any_break_recorded, ..
        } = &mut self.cf_stack[idx]
        {
            *any_break_recorded = true;
        }

        // Every lane that reached this statement leaves the loop, so turn
        // them all off for the rest of this iteration.
        let im = self.internal_mask;
        self.set_internal_mask_and_not(im, full);

        if coherent {
            // If no lanes are left running, skip straight to the exit.
            let after = self.b.create_block("after_coherent_break");
            self.branch_if_mask_any(after, break_target);
            self.b.set_current_block(after);
        }
        Ok(())
    }

    pub fn emit_continue(&mut self, coherent: bool) -> Result<()> {
        let Some(idx) = self.innermost_loop_index() else {
            bail_lower!("continue statement not within a loop");
        };
        let (continue_target, uniform, continued_lanes_ptr) = match &self.cf_stack[idx] {
            CfFrame::Loop {
                continue_target,
                uniform,
                continued_lanes_ptr,
                ..
            } => (*continue_target, *uniform, *continued_lanes_ptr),
            _ => unreachable!(),
        };

        if uniform && self.ifs_in_loop_all_uniform(idx) {
            self.b.branch(continue_target);
            return Ok(());
        }

        let Some(ptr) = continued_lanes_ptr else {
            bail_lower!("varying continue in a loop lowered as uniform");
        };
        let full = self.get_full_mask();
        let old = self.b.load(ptr);
        let accumulated = self.b.mask_or(old, full);
        self.b.store(accumulated, ptr);
        if let CfFrame::Loop {
            any_continue_recorded,
            ..
        } = &mut self.cf_stack[idx]
        {
            *any_continue_recorded = true;
        }

        // Continued lanes sit out the rest of the iteration; the loop's
        // step/test block restores them.
        let im = self.internal_mask;
        self.set_internal_mask_and_not(im, full);

        if coherent {
            let after = self.b.create_block("after_coherent_continue");
            self.branch_if_mask_any(after, continue_target);
            self.b.set_current_block(after);
        }
        Ok(())
    }

    /// The lanes currently running return from the function. `value` has
    /// already been evaluated (and converted) by the caller.
    pub fn current_lanes_returned(&mut self, value: Option<ValueId>, coherent: bool) -> Result<()> {
        if self.varying_cf_depth() == 0 {
            // All lanes agree; store and jump to the function epilogue.
            if let (Some(v), Some(ptr)) = (value, self.return_value_ptr) {
                self.b.store(v, ptr);
            }
            self.b.branch(self.return_block);
            return Ok(());
        }

        let full = self.get_full_mask();
        if let (Some(v), Some(ptr)) = (value, self.return_value_ptr) {
            self.masked_store(v, ptr, full);
        }
        let old = self.b.load(self.returned_lanes_ptr);
        let accumulated = self.b.mask_or(old, full);
        self.b.store(accumulated, self.returned_lanes_ptr);
        self.any_return_recorded = true;

        // Returned lanes are done with the whole function, not just the
        // enclosing construct: turn them off in the function mask.
        let fm = self.function_mask;
        let new_fm = self.b.mask_and_not(fm, full);
        self.set_function_mask(new_fm);

        if coherent {
            let after = self.b.create_block("after_coherent_return");
            self.branch_if_mask_any(after, self.return_block);
            self.b.set_current_block(after);
        }
        Ok(())
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Nesting depth of varying control flow at the current emission
    /// point.
    pub fn varying_cf_depth(&self) -> u32 {
        self.cf_stack
            .iter()
            .filter(|f| {
                matches!(
                    f,
                    CfFrame::VaryingIf { .. } | CfFrame::Loop { uniform: false, .. }
                )
            })
            .count() as u32
    }

    pub fn get_function(&self) -> FuncId {
        self.b.func_id()
    }

    /// Seal the function: fall-through reaches the epilogue, which loads
    /// and returns the stored return value.
    pub fn finish(mut self) -> Result<FuncId> {
        assert!(
            self.cf_stack.is_empty(),
            "unclosed control-flow bracket at end of function"
        );
        if self.b.current_block().is_some() {
            self.b.branch(self.return_block);
        }
        self.b.set_current_block(self.return_block);
        match self.return_value_ptr {
            Some(ptr) => {
                let v = self.b.load(ptr);
                self.b.ret(Some(v));
            }
            None => self.b.ret(None),
        }
        debug!("finished emitting function");
        Ok(self.b.finish())
    }
}

/// Run the emit pass over a function body: wraps the statement in a
/// context, emits, and seals the function into `module`.
pub fn lower_function(
    name: &str,
    ret: &Type,
    body: &crate::ast::Stmt,
    symtab: &mut SymbolTable,
    cx: &mut CompileContext,
    module: &mut Module,
) -> Result<FuncId> {
    let mut ctx = FunctionEmitContext::new(cx, symtab, module, name, ret)?;
    emit_stmt(body, &mut ctx)?;
    ctx.finish()
}
