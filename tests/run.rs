//! End-to-end tests over the public embedding surface: compile source,
//! run an entry, inspect values, output, and errors.

use cinder::{
    compile, CompileError, DiagnosticKind, FaultKind, Program, RunError, Value, Vm, VmConfig,
};

fn run(source: &str) -> Value {
    let program = compile(source).expect("program compiles");
    Vm::new(&program)
        .run("main", &[])
        .expect("program runs")
        .value
}

fn fault_kind(source: &str) -> FaultKind {
    let program = compile(source).expect("program compiles");
    match Vm::new(&program).run("main", &[]) {
        Err(RunError::Fault(fault)) => fault.kind,
        other => panic!("expected a runtime fault, got {:?}", other),
    }
}

fn diagnostics(source: &str) -> Vec<cinder::Diagnostic> {
    match compile(source) {
        Err(CompileError::Diagnostics(diags)) => diags,
        other => panic!("expected diagnostics, got {:?}", other.map(|_| "program")),
    }
}

#[test]
fn precedence_and_grouping() {
    assert_eq!(run("int main() { return 2 + 3 * 4; }"), Value::Int(14));
    assert_eq!(run("int main() { return (2 + 3) * 4; }"), Value::Int(20));
    assert_eq!(run("int main() { return 2 < 3 == 1; }"), Value::Int(1));
    assert_eq!(run("int main() { return 1 << 4 | 3; }"), Value::Int(19));
}

#[test]
fn divide_by_zero_is_a_fault_with_a_source_position() {
    let program = compile("int main() { return 1 / 0; }").unwrap();
    let Err(RunError::Fault(fault)) = Vm::new(&program).run("main", &[]) else {
        panic!("expected a fault");
    };
    assert_eq!(fault.kind, FaultKind::DivideByZero);
    assert_eq!((fault.pos.line, fault.pos.col), (1, 23));
}

#[test]
fn undeclared_identifier_is_a_semantic_diagnostic() {
    let diags = diagnostics("int main() { return x; }");
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].kind, DiagnosticKind::Semantic);
    assert!(diags[0].message.contains("x"));
}

#[test]
fn syntax_errors_are_batched_across_statements() {
    let diags = diagnostics(
        "int main() {
            int a = ;
            int b = 1;
            return b +;
        }",
    );
    assert!(diags.len() >= 2, "got {:?}", diags);
    assert!(diags.iter().all(|d| d.kind == DiagnosticKind::Syntax));
}

#[test]
fn semantic_errors_are_batched_across_functions() {
    let diags = diagnostics(
        "int f() { return missing_one; }
         int g() { return missing_two; }",
    );
    assert_eq!(diags.len(), 2);
}

#[test]
fn compilation_is_deterministic() {
    let source = "
        struct Pair { int a; long b; };
        long scale(struct Pair *p, int k) { return p->b * k + p->a; }
        int main() {
            struct Pair pair;
            pair.a = 7;
            pair.b = 100;
            return (int)scale(&pair, 3);
        }";
    let first = compile(source).unwrap();
    let second = compile(source).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.to_bytes().unwrap(), second.to_bytes().unwrap());
}

#[test]
fn execution_is_deterministic() {
    let source = "int main() {
        int acc;
        int i;
        acc = 1;
        for (i = 0; i < 20; i++) acc = acc * 31 + i;
        return acc;
    }";
    let program = compile(source).unwrap();
    let first = Vm::new(&program).run("main", &[]).unwrap();
    let second = Vm::new(&program).run("main", &[]).unwrap();
    assert_eq!(first, second);
}

#[test]
fn recursion_and_calls() {
    let source = "
        int fib(int n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); }
        int main() { return fib(20); }";
    assert_eq!(run(source), Value::Int(6765));
}

#[test]
fn entry_arguments_are_marshalled() {
    let program = compile("long mix(long a, double b) { return a + (long)b; }").unwrap();
    let outcome = Vm::new(&program)
        .run("mix", &[Value::Int(40), Value::Float(2.9)])
        .unwrap();
    assert_eq!(outcome.value, Value::Int(42));

    let err = Vm::new(&program)
        .run("mix", &[Value::Float(1.0), Value::Float(2.0)])
        .unwrap_err();
    assert!(matches!(err, RunError::ArgType { index: 0, .. }));
}

#[test]
fn budget_stops_infinite_loops() {
    let program = compile("int main() { while (1) {} return 0; }").unwrap();
    let config = VmConfig {
        step_budget: Some(50_000),
        ..VmConfig::default()
    };
    let err = Vm::with_config(&program, config).run("main", &[]).unwrap_err();
    let RunError::Fault(fault) = err else { panic!("expected fault") };
    assert_eq!(fault.kind, FaultKind::BudgetExceeded);
}

#[test]
fn deep_recursion_overflows_the_stack() {
    let source = "
        int down(int n) { return down(n + 1); }
        int main() { return down(0); }";
    assert_eq!(fault_kind(source), FaultKind::StackOverflow);
}

#[test]
fn null_and_wild_pointers_fault() {
    assert_eq!(
        fault_kind("int main() { int *p; p = 0; return *p; }"),
        FaultKind::NullDereference
    );
    assert_eq!(
        fault_kind("int main() { long a; int *p; a = 123456789; p = (int *)a; return *p; }"),
        FaultKind::OutOfBounds
    );
}

#[test]
fn arrays_pointers_and_strings() {
    let source = r#"
        int sum(int *xs, int n) {
            int total;
            int i;
            total = 0;
            for (i = 0; i < n; i++) total += xs[i];
            return total;
        }
        int main() {
            int xs[5];
            int i;
            for (i = 0; i < 5; i++) xs[i] = (i + 1) * (i + 1);
            return sum(xs, 5);
        }"#;
    assert_eq!(run(source), Value::Int(55));

    let source = r#"
        int length(char *s) {
            char *p;
            p = s;
            while (*p) p++;
            return (int)(p - s);
        }
        int main() { return length("four"); }"#;
    assert_eq!(run(source), Value::Int(4));
}

#[test]
fn structs_and_unions() {
    let source = "
        struct Node { int value; struct Node *next; };
        int main() {
            struct Node a;
            struct Node b;
            a.value = 1;
            b.value = 2;
            a.next = &b;
            b.next = 0;
            return a.value + a.next->value;
        }";
    assert_eq!(run(source), Value::Int(3));

    let source = "
        union Bits { int i; unsigned int u; };
        int main() {
            union Bits bits;
            bits.i = -1;
            return bits.u == 4294967295;
        }";
    assert_eq!(run(source), Value::Int(1));
}

#[test]
fn heap_allocation_and_reuse() {
    let source = "
        int main() {
            long *p;
            long *q;
            p = (long *)malloc(8 * sizeof(long));
            if (p == 0) return -1;
            p[7] = 99;
            free(p);
            q = (long *)malloc(8 * sizeof(long));
            q[0] = 1;
            free(q);
            return 0;
        }";
    assert_eq!(run(source), Value::Int(0));
}

#[test]
fn output_is_captured_per_invocation() {
    let source = r#"
        int main() {
            puts("first line");
            print_int(-42);
            putchar(10);
            return 0;
        }"#;
    let program = compile(source).unwrap();
    let outcome = Vm::new(&program).run("main", &[]).unwrap();
    assert_eq!(outcome.output, "first line\n-42\n");
    let again = Vm::new(&program).run("main", &[]).unwrap();
    assert_eq!(again.output, outcome.output);
}

#[test]
fn globals_reset_between_vms() {
    let source = "
        int counter = 100;
        int main() { counter = counter + 1; return counter; }";
    let program = compile(source).unwrap();
    assert_eq!(Vm::new(&program).run("main", &[]).unwrap().value, Value::Int(101));
    assert_eq!(Vm::new(&program).run("main", &[]).unwrap().value, Value::Int(101));
}

#[test]
fn program_image_round_trips_through_bytes() {
    let source = "
        int square(int n) { return n * n; }
        int main() { return square(12); }";
    let program = compile(source).unwrap();
    let bytes = program.to_bytes().unwrap();
    let loaded = Program::from_bytes(&bytes).unwrap();
    assert_eq!(loaded, program);
    let outcome = Vm::new(&loaded).run("main", &[]).unwrap();
    assert_eq!(outcome.value, Value::Int(144));
}

#[test]
fn unsigned_arithmetic_and_comparisons() {
    let source = "
        int main() {
            unsigned int a;
            a = 0;
            a = a - 1;
            return a > 2147483647;
        }";
    assert_eq!(run(source), Value::Int(1));

    let source = "
        int main() {
            unsigned int a;
            a = 3000000000;
            return (int)(a / 3);
        }";
    assert_eq!(run(source), Value::Int(1_000_000_000));
}

#[test]
fn float_conversions() {
    let source = "
        double average(int a, int b) { return (a + b) / 2.0; }
        double main() { return average(3, 4); }";
    assert_eq!(run(source), Value::Float(3.5));

    let source = "int main() { double d; d = 2.99; return (int)d; }";
    assert_eq!(run(source), Value::Int(2));
}

#[test]
fn compound_assignment_on_narrow_targets() {
    assert_eq!(
        run("int main() { char c; c = 1; c += 1; return c; }"),
        Value::Int(2)
    );
    assert_eq!(
        run("int main() { short s; s = 1000; s *= 3; return s; }"),
        Value::Int(3000)
    );
    assert_eq!(
        run("int main() { char c; c = 1; c <<= 4; return c; }"),
        Value::Int(16)
    );
    assert_eq!(
        run("int main() { char buf[3]; buf[1] = 10; buf[1] += 1; return buf[1]; }"),
        Value::Int(11)
    );
    // arithmetic runs at double width, the store rounds back to float
    assert_eq!(
        run("double main() { float f; f = 1.5; f += 1.25; return f; }"),
        Value::Float(2.75)
    );
    // narrow wrap-around on the store, as plain assignment does
    assert_eq!(
        run("int main() { char c; c = 100; c += 100; return c; }"),
        Value::Int(-56)
    );
}

#[test]
fn redefined_function_reports_instead_of_crashing() {
    let diags = diagnostics(
        "int f() { return 0; }
         int f(int a, int b) { return a; }
         int main() { return 0; }",
    );
    assert!(diags.iter().any(|d| d.to_string().contains("redefinition of 'f'")));
}

#[test]
fn void_conditional_arms_are_rejected() {
    let diags = diagnostics(
        "void f() { return; }
         void g() { return; }
         int main() { 1 ? f() : g(); return 0; }",
    );
    assert_eq!(diags[0].kind, DiagnosticKind::Semantic);
    assert!(diags[0].message.contains("'void' has no value"));
}

#[test]
fn compound_assignment_and_incdec() {
    let source = "
        int main() {
            int a;
            a = 10;
            a += 5;
            a *= 2;
            a -= ++a - a--;
            return a;
        }";
    // a = 30 after += and *=; ++a makes 31, a-- yields 31; 31 - 31 = 0
    assert_eq!(run(source), Value::Int(30));

    let source = "
        int main() {
            int xs[3];
            int *p;
            xs[0] = 1; xs[1] = 2; xs[2] = 3;
            p = xs;
            p += 2;
            return *p;
        }";
    assert_eq!(run(source), Value::Int(3));
}
