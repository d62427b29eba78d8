use std::collections::VecDeque;

use crate::{
    error::{ExecutionError, ExecutionErrorKind},
    memory::Memory,
    symbol::{Opcode, SkipCondition, OPERAND_MASK},
};

/// Largest magnitude accepted by an `INPUT` instruction.
pub const INPUT_MAX: u16 = 0x0FFF;

/// The MARIE register file. All registers are 16 bits wide; PC and MAR only use the low 12.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Registers {
    /// Accumulator, a 16-bit two's complement value
    pub ac: u16,
    /// Memory address register
    pub mar: u16,
    /// Memory buffer register
    pub mbr: u16,
    /// Program counter
    pub pc: u16,
    /// Instruction register
    pub ir: u16,
    pub in_reg: u16,
    pub out_reg: u16,
}

/// Supplies values for `INPUT` instructions.
pub trait InputSource {
    /// Block until a value of magnitude at most [`INPUT_MAX`] is available, in 16-bit two's
    /// complement. `None` means no input will ever arrive.
    fn read_input(&mut self) -> Option<u16>;
}

/// Pauses single-step execution after every instruction.
pub trait StepGate {
    /// Show the machine state and block until the user acknowledges it.
    fn step(&mut self, view: StepView<'_>);
}

/// Presents the output sequence once a run ends.
pub trait Display {
    fn show_output(&mut self, outputs: &[u16], hex: bool);
}

/// Machine state handed to a [`StepGate`].
pub struct StepView<'a> {
    pub regs: &'a Registers,
    pub mem: &'a Memory,
    /// Instruction just executed
    pub instr: Opcode,
    /// Register transfers performed by the last cycle
    pub trace: &'a [String],
    pub outputs: &'a [u16],
}

impl InputSource for VecDeque<u16> {
    fn read_input(&mut self) -> Option<u16> {
        self.pop_front()
    }
}

/// Console-facing collaborators of a single run.
pub struct Collaborators<'a> {
    pub input: &'a mut dyn InputSource,
    /// Run in single-step mode when present
    pub gate: Option<&'a mut dyn StepGate>,
    pub display: &'a mut dyn Display,
    /// Render output as hexadecimal
    pub hex: bool,
}

/// Record a register transfer, only while tracing.
macro_rules! trace {
    ( $self:ident, $fmt:literal $($tt:tt)* ) => {{
        if let Some(trace) = &mut $self.trace {
            trace.push(format!($fmt $($tt)*));
        }
    }};
}

/// Fetch-decode-execute engine over a caller-owned memory store.
pub struct RunState<'m> {
    mem: &'m mut Memory,
    regs: Registers,
    outputs: Vec<u16>,
    halted: bool,
    /// Address of the instruction in flight
    current: u16,
    /// Register transfers of the current cycle, when single-stepping
    trace: Option<Vec<String>>,
}

type Result<T> = std::result::Result<T, ExecutionError>;

impl<'m> RunState<'m> {
    pub fn new(mem: &'m mut Memory) -> Self {
        RunState {
            mem,
            regs: Registers::default(),
            outputs: Vec::new(),
            halted: false,
            current: 0,
            trace: None,
        }
    }

    pub fn registers(&self) -> &Registers {
        &self.regs
    }

    pub fn memory(&self) -> &Memory {
        &*self.mem
    }

    pub fn outputs(&self) -> &[u16] {
        &self.outputs
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Clear registers and output ahead of a new run.
    pub fn reset(&mut self) {
        self.regs = Registers::default();
        self.outputs.clear();
        self.halted = false;
        self.current = 0;
    }

    /// Run to `HALT` without pausing.
    ///
    /// Output collected before a fault stays available through [`RunState::outputs`].
    pub fn run(&mut self, input: &mut dyn InputSource) -> Result<()> {
        self.reset();
        while !self.halted {
            self.step(input)?;
        }
        Ok(())
    }

    /// Run to `HALT`, handing the machine state to `gate` after every instruction.
    pub fn run_stepwise(
        &mut self,
        input: &mut dyn InputSource,
        gate: &mut dyn StepGate,
    ) -> Result<()> {
        self.reset();
        self.trace = Some(Vec::new());
        let result = loop {
            if self.halted {
                break Ok(());
            }
            let instr = match self.step(input) {
                Ok(instr) => instr,
                Err(err) => break Err(err),
            };
            gate.step(StepView {
                regs: &self.regs,
                mem: &*self.mem,
                instr,
                trace: self.trace.as_deref().unwrap_or_default(),
                outputs: &self.outputs,
            });
            if let Some(trace) = &mut self.trace {
                trace.clear();
            }
        };
        self.trace = None;
        result
    }

    /// Run in the mode chosen by `io`, then show whatever output was collected.
    pub fn execute(&mut self, io: Collaborators<'_>) -> Result<()> {
        let result = match io.gate {
            Some(gate) => self.run_stepwise(io.input, gate),
            None => self.run(io.input),
        };
        io.display.show_output(&self.outputs, io.hex);
        result
    }

    /// Perform one full fetch-decode-execute cycle.
    pub fn step(&mut self, input: &mut dyn InputSource) -> Result<Opcode> {
        self.fetch()?;
        self.decode_execute(input)
    }

    #[inline]
    fn fault(&self, kind: ExecutionErrorKind) -> ExecutionError {
        ExecutionError {
            addr: self.current,
            kind,
        }
    }

    #[inline]
    fn load(&self, addr: u16) -> Result<u16> {
        self.mem
            .load(addr)
            .map_err(|err| self.fault(ExecutionErrorKind::Memory(err)))
    }

    #[inline]
    fn store(&mut self, value: u16, addr: u16) -> Result<()> {
        self.mem
            .store(value as u32, addr)
            .map_err(|err| self.fault(ExecutionErrorKind::Memory(err)))
    }

    fn fetch(&mut self) -> Result<()> {
        self.current = self.regs.pc;
        self.regs.mar = self.regs.pc;
        self.regs.mbr = self.load(self.regs.mar)?;
        self.regs.ir = self.regs.mbr;
        self.regs.pc = self.regs.pc.wrapping_add(1);
        trace!(self, "Fetch:");
        trace!(self, "    MAR ← PC (0x{:03X})", self.regs.mar);
        trace!(self, "    MBR ← M[MAR] (0x{:04X})", self.regs.mbr);
        trace!(self, "    IR ← MBR (0x{:04X})", self.regs.ir);
        trace!(self, "    PC ← PC + 1 (0x{:03X})", self.regs.pc);
        Ok(())
    }

    fn decode_execute(&mut self, input: &mut dyn InputSource) -> Result<Opcode> {
        let opcode = Opcode::try_from(self.regs.ir)
            .map_err(|code| self.fault(ExecutionErrorKind::UndecodableOpcode(code)))?;
        self.regs.mar = self.regs.ir & OPERAND_MASK;
        trace!(self, "Decode IR[15-12] (0x{:X}):", opcode as u16);
        trace!(self, "    MAR ← IR[11-0] (0x{:03X})", self.regs.mar);
        trace!(self, "{}:", opcode);

        match opcode {
            Opcode::Jns => self.jns()?,
            Opcode::Load => self.load_ac()?,
            Opcode::Store => self.store_ac()?,
            Opcode::Add => self.add()?,
            Opcode::Subt => self.subt()?,
            Opcode::Input => self.input(input)?,
            Opcode::Output => self.output(),
            Opcode::Halt => self.halt(),
            Opcode::Skipcond => self.skipcond(),
            Opcode::Jump => self.jump(),
            Opcode::Clear => self.clear(),
            Opcode::Addi => self.addi()?,
            Opcode::Jumpi => self.jumpi()?,
        }
        Ok(opcode)
    }

    fn jns(&mut self) -> Result<()> {
        // PC already points past the JNS, which is the return address
        self.store(self.regs.pc, self.regs.mar)?;
        self.regs.pc = self.regs.mar.wrapping_add(1);
        trace!(self, "    M[MAR] ← PC (0x{:03X})", self.regs.pc.wrapping_sub(1));
        trace!(self, "    PC ← MAR + 1 (0x{:03X})", self.regs.pc);
        Ok(())
    }

    fn load_ac(&mut self) -> Result<()> {
        self.regs.ac = self.load(self.regs.mar)?;
        trace!(self, "    AC ← M[MAR] (0x{:04X})", self.regs.ac);
        Ok(())
    }

    fn store_ac(&mut self) -> Result<()> {
        self.store(self.regs.ac, self.regs.mar)?;
        trace!(self, "    M[MAR] ← AC (0x{:04X})", self.regs.ac);
        Ok(())
    }

    fn add(&mut self) -> Result<()> {
        self.regs.mbr = self.load(self.regs.mar)?;
        self.regs.ac = self.regs.ac.wrapping_add(self.regs.mbr);
        trace!(self, "    MBR ← M[MAR] (0x{:04X})", self.regs.mbr);
        trace!(self, "    AC ← AC + MBR (0x{:04X})", self.regs.ac);
        Ok(())
    }

    fn subt(&mut self) -> Result<()> {
        self.regs.mbr = self.load(self.regs.mar)?;
        self.regs.ac = self.regs.ac.wrapping_sub(self.regs.mbr);
        trace!(self, "    MBR ← M[MAR] (0x{:04X})", self.regs.mbr);
        trace!(self, "    AC ← AC - MBR (0x{:04X})", self.regs.ac);
        Ok(())
    }

    fn addi(&mut self) -> Result<()> {
        self.regs.mbr = self.load(self.regs.mar)?;
        self.regs.mar = self.regs.mbr;
        self.regs.mbr = self.load(self.regs.mar)?;
        self.regs.ac = self.regs.ac.wrapping_add(self.regs.mbr);
        trace!(self, "    MBR ← M[MAR]");
        trace!(self, "    MAR ← MBR (0x{:03X})", self.regs.mar);
        trace!(self, "    MBR ← M[MAR] (0x{:04X})", self.regs.mbr);
        trace!(self, "    AC ← AC + MBR (0x{:04X})", self.regs.ac);
        Ok(())
    }

    fn input(&mut self, input: &mut dyn InputSource) -> Result<()> {
        let value = input
            .read_input()
            .ok_or_else(|| self.fault(ExecutionErrorKind::InputUnavailable))?;
        debug_assert!(
            (value as i16).unsigned_abs() <= INPUT_MAX,
            "input source returned out of range value 0x{value:04X}"
        );
        self.regs.in_reg = value;
        self.regs.ac = self.regs.in_reg;
        trace!(self, "    InReg ← input (0x{:04X})", self.regs.in_reg);
        trace!(self, "    AC ← InReg (0x{:04X})", self.regs.ac);
        Ok(())
    }

    fn output(&mut self) {
        self.regs.out_reg = self.regs.ac;
        self.outputs.push(self.regs.out_reg);
        trace!(self, "    OutReg ← AC (0x{:04X})", self.regs.out_reg);
        trace!(self, "    push OutReg to output");
    }

    fn halt(&mut self) {
        self.halted = true;
        trace!(self, "    program halted");
    }

    fn skipcond(&mut self) {
        // Conditions other than 000, 400 and 800 never skip
        let skip = SkipCondition::try_from(self.regs.mar).is_ok_and(|cond| cond.holds(self.regs.ac));
        if skip {
            self.regs.pc = self.regs.pc.wrapping_add(1);
        }
        trace!(self, "    condition 0x{:03X}, skip: {}", self.regs.mar, skip);
        trace!(self, "    PC (0x{:03X})", self.regs.pc);
    }

    fn jump(&mut self) {
        self.regs.pc = self.regs.mar;
        trace!(self, "    PC ← MAR (0x{:03X})", self.regs.pc);
    }

    fn clear(&mut self) {
        self.regs.ac = 0;
        trace!(self, "    AC ← 0");
    }

    fn jumpi(&mut self) -> Result<()> {
        self.regs.pc = self.load(self.regs.mar)?;
        trace!(self, "    PC ← M[MAR] (0x{:03X})", self.regs.pc);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;
    use crate::error::MemoryError;

    fn input(values: &[u16]) -> VecDeque<u16> {
        values.iter().copied().collect()
    }

    fn run(src: &str, values: &[u16]) -> (Result<()>, Vec<u16>) {
        let mut mem = assemble(src).unwrap();
        let mut cpu = RunState::new(&mut mem);
        let result = cpu.run(&mut input(values));
        (result, cpu.outputs().to_vec())
    }

    #[test]
    fn echo() {
        let src = "INPUT\nSTORE A\nLOAD A\nOUTPUT\nHALT\nA, HEX 0";
        let (result, outputs) = run(src, &[7]);
        assert_eq!(result, Ok(()));
        assert_eq!(outputs, [7]);
    }

    #[test]
    fn fetch_cycle() {
        let mut mem = assemble("CLEAR\nHALT").unwrap();
        let mut cpu = RunState::new(&mut mem);
        let mut none = input(&[]);
        assert_eq!(cpu.step(&mut none), Ok(Opcode::Clear));
        let regs = *cpu.registers();
        assert_eq!(regs.pc, 1);
        assert_eq!(regs.ir, 0xA000);
        assert_eq!(regs.mbr, 0xA000);
        assert_eq!(regs.mar, 0);
    }

    #[test]
    fn skipcond_zero_skips() {
        let mut mem = Memory::new();
        mem.store(Opcode::Skipcond.encode(0x400) as u32, 0).unwrap();
        let mut cpu = RunState::new(&mut mem);
        cpu.step(&mut input(&[])).unwrap();
        assert_eq!(cpu.registers().mar, 0x400);
        assert_eq!(cpu.registers().pc, 2);
    }

    #[test]
    fn skipcond_conditions() {
        // Outputs 1 when the skip happens, 0 otherwise
        let program = |cond: &str| {
            format!(
                "LOAD V\nSKIPCOND {cond}\nJUMP NO\nLOAD ONE\nOUTPUT\nHALT\n\
                 NO, LOAD ZERO\nOUTPUT\nHALT\nV, HEX 0\nONE, DEC 1\nZERO, DEC 0"
            )
        };
        let with_v = |cond: &str, v: u16| {
            let mut mem = assemble(&program(cond)).unwrap();
            mem.store(v as u32, 9).unwrap();
            let mut cpu = RunState::new(&mut mem);
            cpu.run(&mut input(&[])).unwrap();
            cpu.outputs()[0]
        };
        assert_eq!(with_v("000", 0xFFFF), 1);
        assert_eq!(with_v("000", 0), 0);
        assert_eq!(with_v("400", 0), 1);
        assert_eq!(with_v("400", 3), 0);
        assert_eq!(with_v("800", 3), 1);
        assert_eq!(with_v("800", 0x8000), 0);
    }

    #[test]
    fn subroutine_linkage() {
        let mut mem = Memory::new();
        // 10: JNS 20, 11: HALT, 20: return slot, 21: JUMPI 20
        mem.store(Opcode::Jns.encode(20) as u32, 10).unwrap();
        mem.store(Opcode::Halt.encode(0) as u32, 11).unwrap();
        mem.store(Opcode::Jumpi.encode(20) as u32, 21).unwrap();
        mem.store(Opcode::Jump.encode(10) as u32, 0).unwrap();
        let mut cpu = RunState::new(&mut mem);
        let mut none = input(&[]);

        assert_eq!(cpu.step(&mut none), Ok(Opcode::Jump));
        assert_eq!(cpu.step(&mut none), Ok(Opcode::Jns));
        assert_eq!(cpu.memory().load(20), Ok(11));
        assert_eq!(cpu.registers().pc, 21);
        assert_eq!(cpu.step(&mut none), Ok(Opcode::Jumpi));
        assert_eq!(cpu.registers().pc, 11);
        assert_eq!(cpu.step(&mut none), Ok(Opcode::Halt));
        assert!(cpu.is_halted());
    }

    #[test]
    fn subroutine_program() {
        let src = "\
            INPUT\nJNS DOUBLE\nOUTPUT\nHALT\n\
            DOUBLE, HEX 0\nSTORE T\nADD T\nJUMPI DOUBLE\nT, HEX 0";
        let (result, outputs) = run(src, &[21]);
        assert_eq!(result, Ok(()));
        assert_eq!(outputs, [42]);
    }

    #[test]
    fn indirect_add() {
        let src = "CLEAR\nADDI P\nOUTPUT\nHALT\nP, HEX 5\nV, DEC 9";
        let (result, outputs) = run(src, &[]);
        assert_eq!(result, Ok(()));
        assert_eq!(outputs, [9]);
    }

    #[test]
    fn arithmetic_wraps() {
        let src = "LOAD A\nSUBT B\nOUTPUT\nADD MAX\nOUTPUT\nHALT\nA, DEC 3\nB, DEC 5\nMAX, HEX FFFF";
        let (result, outputs) = run(src, &[]);
        assert_eq!(result, Ok(()));
        assert_eq!(outputs, [0xFFFE, 0xFFFD]);
    }

    #[test]
    fn countdown_loop() {
        let src = "\
            INPUT\nSTORE N\n\
            LOOP, LOAD N\nSKIPCOND 800\nJUMP END\nOUTPUT\nSUBT ONE\nSTORE N\nJUMP LOOP\n\
            END, HALT\nN, HEX 0\nONE, DEC 1";
        let (result, outputs) = run(src, &[3]);
        assert_eq!(result, Ok(()));
        assert_eq!(outputs, [3, 2, 1]);
    }

    #[test]
    fn undecodable_opcode_keeps_output() {
        let src = "LOAD A\nOUTPUT\nA, HEX F123";
        let (result, outputs) = run(src, &[]);
        assert_eq!(
            result,
            Err(ExecutionError {
                addr: 2,
                kind: ExecutionErrorKind::UndecodableOpcode(0xF)
            })
        );
        assert_eq!(outputs, [0xF123]);
    }

    #[test]
    fn memory_fault_is_preserved() {
        let src = "ADDI P\nHALT\nP, HEX 2000";
        let (result, _) = run(src, &[]);
        assert_eq!(
            result,
            Err(ExecutionError {
                addr: 0,
                kind: ExecutionErrorKind::Memory(MemoryError::AddressOutOfBounds(0x2000))
            })
        );
    }

    #[test]
    fn running_off_memory() {
        let mut mem = Memory::new();
        mem.store(Opcode::Jump.encode(0xFFF) as u32, 0).unwrap();
        mem.store(Opcode::Clear.encode(0) as u32, 0xFFF).unwrap();
        let mut cpu = RunState::new(&mut mem);
        let err = cpu.run(&mut input(&[])).unwrap_err();
        assert_eq!(
            err,
            ExecutionError {
                addr: 0x1000,
                kind: ExecutionErrorKind::Memory(MemoryError::AddressOutOfBounds(0x1000))
            }
        );
    }

    #[test]
    fn input_exhausted() {
        let (result, _) = run("INPUT\nINPUT\nHALT", &[1]);
        assert_eq!(
            result,
            Err(ExecutionError {
                addr: 1,
                kind: ExecutionErrorKind::InputUnavailable
            })
        );
    }

    #[test]
    fn rerun_resets_state() {
        let mut mem = assemble("INPUT\nOUTPUT\nHALT").unwrap();
        let mut cpu = RunState::new(&mut mem);
        cpu.run(&mut input(&[4])).unwrap();
        cpu.run(&mut input(&[5])).unwrap();
        assert_eq!(cpu.outputs(), [5]);
        assert_eq!(cpu.registers().pc, 3);
    }

    struct Recorder {
        steps: Vec<(Opcode, u16, usize)>,
    }

    impl StepGate for Recorder {
        fn step(&mut self, view: StepView<'_>) {
            self.steps.push((view.instr, view.regs.pc, view.trace.len()));
        }
    }

    struct Screen {
        shown: Vec<(Vec<u16>, bool)>,
    }

    impl Display for Screen {
        fn show_output(&mut self, outputs: &[u16], hex: bool) {
            self.shown.push((outputs.to_vec(), hex));
        }
    }

    #[test]
    fn single_step_visits_every_instruction() {
        let mut mem = assemble("INPUT\nOUTPUT\nHALT").unwrap();
        let mut cpu = RunState::new(&mut mem);
        let mut gate = Recorder { steps: Vec::new() };
        cpu.run_stepwise(&mut input(&[9]), &mut gate).unwrap();
        let visited: Vec<_> = gate.steps.iter().map(|(op, pc, _)| (*op, *pc)).collect();
        assert_eq!(
            visited,
            [(Opcode::Input, 1), (Opcode::Output, 2), (Opcode::Halt, 3)]
        );
        // Fetch and decode transfers are always recorded
        assert!(gate.steps.iter().all(|(_, _, len)| *len >= 8));
        assert_eq!(cpu.outputs(), [9]);
    }

    #[test]
    fn execute_shows_partial_output() {
        let mut mem = assemble("LOAD A\nOUTPUT\nA, HEX D000").unwrap();
        let mut cpu = RunState::new(&mut mem);
        let mut screen = Screen { shown: Vec::new() };
        let result = cpu.execute(Collaborators {
            input: &mut input(&[]),
            gate: None,
            display: &mut screen,
            hex: true,
        });
        assert!(result.is_err());
        assert_eq!(screen.shown, [(vec![0xD000], true)]);
    }
}
