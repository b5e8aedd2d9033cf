use std::{env, fs, process};

use cinder::{compile, CompileError, RunError, Value, Vm, VmConfig};

fn main() {
    let args: Vec<String> = env::args().collect();

    let tokens_only = args.contains(&"--tokens".to_string());
    let ast_only = args.contains(&"--ast".to_string());
    let disasm = args.contains(&"--disasm".to_string());
    let entry = flag_value(&args, "--entry").unwrap_or("main");
    let budget = match flag_value(&args, "--budget") {
        Some(text) => match text.parse::<u64>() {
            Ok(n) => Some(n),
            Err(_) => {
                eprintln!("--budget expects a step count, got '{}'", text);
                process::exit(2);
            }
        },
        None => None,
    };

    // first non-flag argument is the filename
    let filename = args.iter().skip(1).find(|a| !a.starts_with('-'));

    let Some(filename) = filename else {
        print_usage();
        process::exit(if args.len() == 1 { 0 } else { 2 });
    };

    let source = match fs::read_to_string(filename) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Failed to read '{}': {}", filename, e);
            process::exit(1);
        }
    };

    if tokens_only {
        dump_tokens(&source);
        return;
    }
    if ast_only {
        dump_ast(&source);
        return;
    }

    let program = match compile(&source) {
        Ok(program) => program,
        Err(CompileError::Diagnostics(diags)) => {
            for diag in &diags {
                eprintln!("{}: {}", filename, diag);
            }
            process::exit(1);
        }
        Err(e) => {
            eprintln!("{}: {}", filename, e);
            process::exit(1);
        }
    };

    if disasm {
        print!("{}", cinder::disassemble(&program));
        return;
    }

    let config = VmConfig {
        step_budget: budget,
        ..VmConfig::default()
    };
    match Vm::with_config(&program, config).run(entry, &[]) {
        Ok(outcome) => {
            print!("{}", outcome.output);
            if let Value::Int(code) = outcome.value {
                process::exit((code & 0xff) as i32);
            }
        }
        Err(RunError::Fault(fault)) => {
            eprintln!("{}:{}", filename, fault);
            process::exit(1);
        }
        Err(e) => {
            eprintln!("{}: {}", filename, e);
            process::exit(1);
        }
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let at = args.iter().position(|a| a == flag)?;
    args.get(at + 1).map(String::as_str)
}

fn dump_tokens(source: &str) {
    for token in cinder::lexer::Lexer::new(source).tokenize() {
        println!("{} {}", token.pos, token.kind.describe());
    }
}

fn dump_ast(source: &str) {
    let tokens = cinder::lexer::Lexer::new(source).tokenize();
    match cinder::parser::Parser::new(tokens).parse() {
        Ok(unit) => println!("{:#?}", unit),
        Err(diags) => {
            for diag in &diags {
                eprintln!("{}", diag);
            }
            process::exit(1);
        }
    }
}

fn print_usage() {
    println!("CINDER - a small C compiled to stack bytecode");
    println!();
    println!("Usage:");
    println!("  cinder <file.c>                 Compile and run main()");
    println!("  cinder --entry <name> <file.c>  Call a different entry function");
    println!("  cinder --budget <n> <file.c>    Abort after n instructions");
    println!("  cinder --tokens <file.c>        Show tokens only");
    println!("  cinder --ast <file.c>           Show the parse tree only");
    println!("  cinder --disasm <file.c>        Disassemble the compiled program");
}
