//! End-to-end scenarios driving the assembler, disassembler and
//! interpreter together.

use stackvm::asm;
use stackvm::disasm;
use stackvm::vm::Vm;

fn run_source(source: &str, max_ops: u32) -> Vm<()> {
    let bytes = asm::assemble(source).unwrap();
    let mut vm = Vm::new(256, 1, ()).unwrap();
    vm.set_program(&bytes);
    vm.run(max_ops);
    vm
}

#[test]
fn s1_arithmetic_and_halt() {
    let bytes = asm::assemble(".name MAIN\n.offset 0\npush 2\npush 3\nadd_i\nhalt\n").unwrap();
    assert_eq!(bytes, vec![0x13, 0x02, 0x13, 0x03, 0x44, 0x0F]);

    let mut vm = Vm::new(256, 1, ()).unwrap();
    vm.set_program(&bytes);
    assert!(vm.run(100));
    assert_eq!(vm.sp(), 1);
    assert_eq!(vm.peek_i32(0), Some(5));
}

#[test]
fn s2_branch_on_comparison() {
    let source = "\
.name MAIN
.offset 0
push 0
cmp 0
jeq done
push 1
halt
done:
push 7
halt
";
    let vm = run_source(source, 100);
    assert!(vm.has_halted());
    assert_eq!(vm.sp(), 1);
    assert_eq!(vm.peek_i32(0), Some(7));
}

#[test]
fn s3_function_call() {
    let source = "\
.name MAIN
.offset 0
call f
halt
f:
push 9
ret 0
";
    let vm = run_source(source, 100);
    assert!(vm.has_halted());
    assert_eq!(vm.sp(), 1);
    assert_eq!(vm.peek_i32(0), Some(9));
}

#[test]
fn s3_far_function_call_exercises_lcall() {
    // The call target sits beyond the 16-bit delta a plain `call`
    // can encode, forcing `lcall`'s 24-bit pc-relative delta and
    // pinning down the open question over LCALL's target semantics
    // (spec.md S3 / SPEC_FULL.md's LCALL decision): the interpreter
    // must treat the immediate as relative to `lcall`'s own address,
    // not absolute, or this call would land nowhere near `f`.
    let mut source = String::from(".name MAIN\n.offset 0\nlcall f\nhalt\n");
    for _ in 0..40_000 {
        source.push_str("nop\n");
    }
    source.push_str("f:\npush 9\nret 0\n");
    assert!(asm::assemble(&source.replace("lcall f", "call f")).is_err());

    let vm = run_source(&source, 1000);
    assert!(vm.has_halted());
    assert_eq!(vm.peek_i32(0), Some(9));
}

#[test]
fn s4_short_jump_out_of_range_fails_long_jump_succeeds() {
    let mut short = String::from(".name MAIN\n.offset 0\njmp past\n");
    for _ in 0..200 {
        short.push_str("nop\n");
    }
    short.push_str("past:\nhalt\n");
    assert!(asm::assemble(&short).is_err());

    let long = short.replacen("jmp past", "ljmp past", 1);
    assert!(asm::assemble(&long).is_ok());
}

#[test]
fn s5_jump_table_dispatch() {
    let source = "\
.name MAIN
.offset 0
push 1
jtbl
.addr a
.addr b
.addr c
a:
halt
b:
push 42
halt
c:
halt
";
    let vm = run_source(source, 100);
    assert!(vm.has_halted());
    assert_eq!(vm.peek_i32(0), Some(42));
}

#[test]
fn s6_disassemble_then_reassemble_round_trips() {
    let bytes = asm::assemble(".name MAIN\n.offset 0\npush 2\npush 3\nadd_i\nhalt\n").unwrap();
    let instrs = disasm::disassemble(&bytes).unwrap();
    let text = disasm::to_text(&instrs);
    let reassembled = asm::assemble(&text).unwrap();
    assert_eq!(reassembled, bytes);
}

#[test]
fn invariant_halted_is_sticky_across_run_calls() {
    let bytes = asm::assemble(".name MAIN\n.offset 0\nhalt\n").unwrap();
    let mut vm = Vm::new(256, 1, ()).unwrap();
    vm.set_program(&bytes);
    assert!(vm.run(10));
    assert!(vm.has_halted());
    // A further run call with a halted vm performs no work and stays halted.
    assert!(vm.run(10));
    assert!(vm.has_halted());
}

#[test]
fn invariant_step_budget_is_resumable() {
    let bytes = asm::assemble(
        ".name MAIN\n.offset 0\npush 1\npush 1\npush 1\npush 1\nhalt\n",
    )
    .unwrap();
    let mut vm = Vm::new(256, 1, ()).unwrap();
    vm.set_program(&bytes);

    // Run exactly one instruction at a time; after four steps every
    // push has executed but halt has not yet, so the vm is neither
    // halted nor yielded.
    for _ in 0..4 {
        assert!(!vm.run(1));
    }
    assert_eq!(vm.sp(), 4);
    assert!(!vm.has_halted());
    assert!(vm.run(1));
    assert!(vm.has_halted());
}

#[test]
fn assembler_idempotent_after_round_trip() {
    let source = ".name MAIN\n.offset 0\npush 2\npush 3\nadd_i\nhalt\n";
    let once = asm::assemble(source).unwrap();
    let instrs = disasm::disassemble(&once).unwrap();
    let text = disasm::to_text(&instrs);
    let twice = asm::assemble(&text).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn push_encoding_is_minimal_width() {
    // -1/0/1 collapse to the zero-immediate forms; everything else
    // picks the narrowest width that fits.
    assert_eq!(asm::assemble(".name M\n.offset 0\npush -1\n").unwrap(), vec![0x12]);
    assert_eq!(asm::assemble(".name M\n.offset 0\npush 0\n").unwrap(), vec![0x10]);
    assert_eq!(asm::assemble(".name M\n.offset 0\npush 1\n").unwrap(), vec![0x11]);
    assert_eq!(asm::assemble(".name M\n.offset 0\npush 127\n").unwrap(), vec![0x13, 0x7F]);
    assert_eq!(
        asm::assemble(".name M\n.offset 0\npush 200\n").unwrap(),
        vec![0x14, 0xC8, 0x00]
    );
}

#[test]
fn sized_program_with_no_labels_matches_sum_of_instruction_sizes() {
    let bytes = asm::assemble(".name M\n.offset 0\npush 2\npush 3\nadd_i\nhalt\n").unwrap();
    // push_8i(2) + push_8i(2) + add_i(1) + halt(1)
    assert_eq!(bytes.len(), 2 + 2 + 1 + 1);
}
