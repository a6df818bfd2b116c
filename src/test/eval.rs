//! A tiny evaluator for woven test bodies.
//!
//! Covers the integer subset of CIL the rewriter tests produce. Values are `i64`;
//! anything outside the subset panics, which fails the test that produced it.

use std::collections::HashMap;

use crate::assembly::{InstrId, MethodBody, OpCode, Operand};

const MAX_STEPS: usize = 10_000;

/// Runs `body` with the given arguments and returns the value left by `ret`.
pub fn run(body: &MethodBody, args: &[i64]) -> Option<i64> {
    let mut args = args.to_vec();
    let mut locals: HashMap<u16, i64> = HashMap::new();
    let mut stack: Vec<i64> = Vec::new();
    let mut pc = body.first();

    for _ in 0..MAX_STEPS {
        let id = pc?;
        let instruction = body.get(id).unwrap();
        let mut next = body.next(id);

        match instruction.opcode {
            OpCode::Nop => {}
            OpCode::Ret => return stack.pop(),
            OpCode::Dup => {
                let value = stack_pop(&mut stack, id);
                stack.push(value);
                stack.push(value);
            }
            OpCode::Pop => {
                stack_pop(&mut stack, id);
            }
            OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Ceq | OpCode::Clt | OpCode::Cgt => {
                let right = stack_pop(&mut stack, id);
                let left = stack_pop(&mut stack, id);
                stack.push(match instruction.opcode {
                    OpCode::Add => left + right,
                    OpCode::Sub => left - right,
                    OpCode::Mul => left * right,
                    OpCode::Ceq => i64::from(left == right),
                    OpCode::Clt => i64::from(left < right),
                    _ => i64::from(left > right),
                });
            }
            OpCode::Br | OpCode::BrS => next = Some(target(instruction.operand.clone())),
            OpCode::Brtrue | OpCode::BrtrueS => {
                if stack_pop(&mut stack, id) != 0 {
                    next = Some(target(instruction.operand.clone()));
                }
            }
            OpCode::Brfalse | OpCode::BrfalseS => {
                if stack_pop(&mut stack, id) == 0 {
                    next = Some(target(instruction.operand.clone()));
                }
            }
            OpCode::Ldarg0
            | OpCode::Ldarg1
            | OpCode::Ldarg2
            | OpCode::Ldarg3
            | OpCode::LdargS
            | OpCode::Ldarg => {
                let index = usize::from(instruction.argument_index().unwrap());
                stack.push(args[index]);
            }
            OpCode::StargS | OpCode::Starg => {
                let index = usize::from(instruction.argument_index().unwrap());
                args[index] = stack_pop(&mut stack, id);
            }
            OpCode::Ldloc0
            | OpCode::Ldloc1
            | OpCode::Ldloc2
            | OpCode::Ldloc3
            | OpCode::LdlocS
            | OpCode::Ldloc => {
                let value = locals
                    .get(&instruction.local_index().unwrap())
                    .copied()
                    .unwrap_or_default();
                stack.push(value);
            }
            OpCode::Stloc0
            | OpCode::Stloc1
            | OpCode::Stloc2
            | OpCode::Stloc3
            | OpCode::StlocS
            | OpCode::Stloc => {
                let value = stack_pop(&mut stack, id);
                locals.insert(instruction.local_index().unwrap(), value);
            }
            opcode => match instruction.ldc_i4() {
                Some(value) => stack.push(i64::from(value)),
                None => panic!("eval: unsupported instruction {opcode} at {id}"),
            },
        }
        pc = next;
    }

    panic!("eval: step limit exceeded");
}

fn stack_pop(stack: &mut Vec<i64>, at: InstrId) -> i64 {
    stack
        .pop()
        .unwrap_or_else(|| panic!("eval: stack underflow at {at}"))
}

fn target(operand: Operand) -> InstrId {
    match operand {
        Operand::Target(target) => target,
        other => panic!("eval: expected a branch target, found {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{BodyBuilder, Instruction};

    #[test]
    fn loops_and_locals() {
        // sum = 0; i = arg0; while (i != 0) { sum += i; i -= 1; } return sum;
        let mut builder = BodyBuilder::new();
        builder.local(crate::assembly::LocalVariable::new(crate::test::int32()));
        builder.emit(OpCode::LdcI40).unwrap();
        builder.emit(OpCode::Stloc0).unwrap();
        builder.define_label("loop").unwrap();
        builder.emit(OpCode::Ldarg0).unwrap();
        builder.emit_branch(OpCode::BrfalseS, "done").unwrap();
        builder.emit(OpCode::Ldloc0).unwrap();
        builder.emit(OpCode::Ldarg0).unwrap();
        builder.emit(OpCode::Add).unwrap();
        builder.emit(OpCode::Stloc0).unwrap();
        builder.emit(OpCode::Ldarg0).unwrap();
        builder.emit(OpCode::LdcI41).unwrap();
        builder.emit(OpCode::Sub).unwrap();
        builder.emit_with(OpCode::StargS, Operand::Argument(0)).unwrap();
        builder.emit_branch(OpCode::BrS, "loop").unwrap();
        builder.define_label("done").unwrap();
        builder.emit(OpCode::Ldloc0).unwrap();
        builder.emit(OpCode::Ret).unwrap();
        let body = builder.finish().unwrap();

        assert_eq!(run(&body, &[4]), Some(10));
        assert_eq!(run(&body, &[0]), Some(0));
    }

    #[test]
    #[should_panic(expected = "unsupported instruction")]
    fn unsupported_instructions_panic() {
        let mut body = MethodBody::new();
        body.push(Instruction::new(OpCode::Throw));
        run(&body, &[]);
    }
}
