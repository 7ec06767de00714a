//! Method bytecode, in the shape the evaluator consumes it
//!
//! Offsets are instruction indices rather than byte offsets: there is no encoding step, and
//! branch targets, call site positions, and frame program counters all count instructions.

use super::ConstantIndex;
use std::ops::Not;

/// Instruction offset within a method body
pub type Offset = usize;

/// Non-branching and branching instructions in one enum
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    AConstNull,
    IConst(i32),
    LConst(i64),
    Ldc(ConstantIndex),
    ILoad(u16),
    LLoad(u16),
    ALoad(u16),
    IStore(u16),
    LStore(u16),
    AStore(u16),
    IInc(u16, i16),
    Pop,
    Dup,
    Swap,
    IAdd,
    ISub,
    IMul,
    IDiv,
    INeg,
    LAdd,
    LSub,
    LMul,
    GetStatic(ConstantIndex),
    PutStatic(ConstantIndex),
    GetField(ConstantIndex),
    PutField(ConstantIndex),
    New(ConstantIndex),
    Invoke(InvokeType, ConstantIndex),
    InvokeDynamic(ConstantIndex),

    /// Compare the top of the stack against zero
    If(OrdComparison, Offset),
    IfICmp(OrdComparison, Offset),
    IfNull(EqComparison, Offset),
    IfACmp(EqComparison, Offset),
    Goto(Offset),

    Return,
    IReturn,
    LReturn,
    AReturn,
}

impl Instruction {
    /// Constant pool entry this instruction refers to, if any
    pub fn constant_operand(&self) -> Option<ConstantIndex> {
        match self {
            Instruction::Ldc(idx)
            | Instruction::GetStatic(idx)
            | Instruction::PutStatic(idx)
            | Instruction::GetField(idx)
            | Instruction::PutField(idx)
            | Instruction::New(idx)
            | Instruction::Invoke(_, idx)
            | Instruction::InvokeDynamic(idx) => Some(*idx),
            _ => None,
        }
    }

    /// Branch target, if this instruction can jump
    pub fn jump_target(&self) -> Option<Offset> {
        match self {
            Instruction::If(_, target)
            | Instruction::IfICmp(_, target)
            | Instruction::IfNull(_, target)
            | Instruction::IfACmp(_, target)
            | Instruction::Goto(target) => Some(*target),
            _ => None,
        }
    }

    /// Does this instruction end the method?
    pub fn is_return(&self) -> bool {
        matches!(
            self,
            Instruction::Return | Instruction::IReturn | Instruction::LReturn | Instruction::AReturn
        )
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface,
}

/// Ordering comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}

impl OrdComparison {
    pub fn holds<T: Ord>(self, lhs: T, rhs: T) -> bool {
        match self {
            OrdComparison::EQ => lhs == rhs,
            OrdComparison::GE => lhs >= rhs,
            OrdComparison::GT => lhs > rhs,
            OrdComparison::LE => lhs <= rhs,
            OrdComparison::LT => lhs < rhs,
            OrdComparison::NE => lhs != rhs,
        }
    }
}

impl Not for OrdComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            OrdComparison::EQ => OrdComparison::NE,
            OrdComparison::GE => OrdComparison::LT,
            OrdComparison::GT => OrdComparison::LE,
            OrdComparison::LE => OrdComparison::GT,
            OrdComparison::LT => OrdComparison::GE,
            OrdComparison::NE => OrdComparison::EQ,
        }
    }
}

/// Equality/inequality comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

impl EqComparison {
    pub fn holds(self, equal: bool) -> bool {
        match self {
            EqComparison::EQ => equal,
            EqComparison::NE => !equal,
        }
    }
}

impl Not for EqComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            EqComparison::EQ => EqComparison::NE,
            EqComparison::NE => EqComparison::EQ,
        }
    }
}

/// Code of a method
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Code {
    pub instructions: Vec<Instruction>,
}

impl Code {
    pub fn new(instructions: Vec<Instruction>) -> Code {
        Code { instructions }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// `invokedynamic` instructions, in order of appearance
    pub fn invoke_dynamic_sites(&self) -> impl Iterator<Item = (Offset, ConstantIndex)> + '_ {
        self.instructions
            .iter()
            .enumerate()
            .filter_map(|(offset, insn)| match insn {
                Instruction::InvokeDynamic(idx) => Some((offset, *idx)),
                _ => None,
            })
    }

    /// Check that every jump lands inside the method and that control can't fall off the end
    pub fn check_well_formed(&self) -> Result<(), String> {
        for (offset, insn) in self.instructions.iter().enumerate() {
            if let Some(target) = insn.jump_target() {
                if target >= self.instructions.len() {
                    return Err(format!(
                        "Jump at offset {} targets {}, past the end of the method",
                        offset, target
                    ));
                }
            }
        }
        match self.instructions.last() {
            Some(insn) if insn.is_return() || matches!(insn, Instruction::Goto(_)) => Ok(()),
            Some(_) => Err(String::from("Control falls off the end of the method")),
            None => Err(String::from("Method body is empty")),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn comparisons() {
        assert!(OrdComparison::LT.holds(1, 2));
        assert!((!OrdComparison::LT).holds(2, 2));
        assert!(EqComparison::NE.holds(false));
    }

    #[test]
    fn well_formed_code() {
        let looping = Code::new(vec![
            Instruction::IConst(0),
            Instruction::If(OrdComparison::EQ, 3),
            Instruction::Goto(0),
            Instruction::Return,
        ]);
        assert!(looping.check_well_formed().is_ok());

        let falls_off = Code::new(vec![Instruction::IConst(0)]);
        assert!(falls_off.check_well_formed().is_err());

        let bad_jump = Code::new(vec![Instruction::Goto(5), Instruction::Return]);
        assert!(bad_jump.check_well_formed().is_err());
    }

    #[test]
    fn invoke_dynamic_positions() {
        let code = Code::new(vec![
            Instruction::InvokeDynamic(ConstantIndex(4)),
            Instruction::Pop,
            Instruction::InvokeDynamic(ConstantIndex(7)),
            Instruction::IReturn,
        ]);
        let sites: Vec<_> = code.invoke_dynamic_sites().collect();
        assert_eq!(sites, vec![(0, ConstantIndex(4)), (2, ConstantIndex(7))]);
    }
}
