use std::fs;
use std::io::Write;
use std::path::PathBuf;

use itertools::*;
use tracing::debug;

use crate::compiler::Compiler;
use crate::config::Options;
use crate::diagnostics::dump_symbols;
use crate::error::{C4Error, Result};
use crate::vm::VirtualMachine;

/// Concatenates the source files, in order, into one buffer of at most
/// `capacity` bytes.
pub fn load_sources(files: &[PathBuf], capacity: usize) -> Result<Vec<u8>> {
    let mut source = vec![];

    for path in files {
        let bytes = fs::read(path).map_err(|source| C4Error::Io {
            path: path.clone(),
            source,
        })?;
        source.extend_from_slice(&bytes);

        if source.len() > capacity {
            return Err(C4Error::SourceTooLarge { capacity });
        }
    }

    Ok(source)
}

/// Compiles `files` and, unless only a listing was requested, runs the
/// result. Everything the program or the diagnostics print goes to `out`.
/// Yields the status the program exited with.
pub fn run<W: Write>(
    options: &Options,
    files: &[PathBuf],
    args: &[String],
    out: &mut W,
) -> Result<i64> {
    let last = match files.last() {
        Some(last) => last,
        None => return Err(C4Error::Usage("c4 [-s] [-d] [-S] file ...".to_string())),
    };

    let limits = options.limits();
    debug!(
        files = %files.iter().map(|file| file.display()).join(", "),
        ?limits,
        "loading"
    );
    let source = load_sources(files, limits.source)?;

    let mut compiler = Compiler::new(&source, limits);
    if options.source {
        compiler = compiler.with_listing(Box::new(&mut *out));
    }
    let byte_code = compiler.compile()?;

    if options.symbols {
        dump_symbols(out, &byte_code.symbols)?;
    }
    if options.source {
        return Ok(0);
    }

    let argv: Vec<String> = std::iter::once(last.display().to_string())
        .chain(args.iter().cloned())
        .collect();

    let mut vm = VirtualMachine::new(byte_code, &limits, out).with_trace(options.debug);
    Ok(vm.run(&argv)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::compiler::Reason;

    use std::env;
    use std::process;

    fn write_source(name: &str, text: &str) -> PathBuf {
        let path = env::temp_dir().join(format!("c4-{}-{}.c", process::id(), name));
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn sources_are_concatenated() {
        let first = write_source("first", "int f() { return 40; }\n");
        let second = write_source("second", "int main() { return f() + 2; }\n");
        let mut out: Vec<u8> = vec![];

        let status = run(&Options::default(), &[first.clone(), second.clone()], &[], &mut out);

        assert_eq!(status.unwrap(), 42);
        fs::remove_file(first).unwrap();
        fs::remove_file(second).unwrap();
    }

    #[test]
    fn program_arguments_follow_the_file_name() {
        let path = write_source(
            "args",
            "int main(int argc, char **argv) { printf(\"%d %s\\n\", argc, argv[1]); return 0; }",
        );
        let mut out: Vec<u8> = vec![];

        let status = run(&Options::default(), &[path.clone()], &["x".to_string()], &mut out);

        assert_eq!(status.unwrap(), 0);
        assert_eq!(String::from_utf8(out).unwrap(), "2 x\n");
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn listing_skips_execution() {
        let path = write_source("listing", "int main()\n{\n  return 7;\n}\n");
        let options = Options {
            source: true,
            ..Options::default()
        };
        let mut out: Vec<u8> = vec![];

        let status = run(&options, &[path.clone()], &[], &mut out);
        let text = String::from_utf8(out).unwrap();

        assert_eq!(status.unwrap(), 0);
        assert!(text.starts_with("1: int main()\n"));
        assert!(text.contains("3:   return 7;\n"));
        assert!(text.contains("    IMM  7\n"));
        assert!(text.contains("    LEV \n"));
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn symbol_dump_precedes_execution() {
        let path = write_source("symbols", "int main() { printf(\"run\\n\"); return 0; }");
        let options = Options {
            symbols: true,
            ..Options::default()
        };
        let mut out: Vec<u8> = vec![];

        run(&options, &[path.clone()], &[], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("int main() [0x0]\nSymbol table: "));
        assert!(text.ends_with("entries\nrun\n"));
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn compile_errors_carry_the_line() {
        let path = write_source("error", "int main() {\n  return x;\n}\n");
        let mut out: Vec<u8> = vec![];

        match run(&Options::default(), &[path.clone()], &[], &mut out) {
            Err(C4Error::Compile(error)) => {
                assert_eq!(error.line, 2);
                assert_eq!(error.reason, Reason::UndefinedVariable("x".to_string()));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_file_is_reported() {
        let path = env::temp_dir().join("c4-definitely-missing.c");
        let mut out: Vec<u8> = vec![];

        assert!(matches!(
            run(&Options::default(), &[path], &[], &mut out),
            Err(C4Error::Io { .. })
        ));
    }

    #[test]
    fn oversized_source_is_rejected() {
        let path = write_source("large", &"int x;\n".repeat(100));
        let options = Options {
            pool_size: 256,
            ..Options::default()
        };
        let mut out: Vec<u8> = vec![];

        assert!(matches!(
            run(&options, &[path.clone()], &[], &mut out),
            Err(C4Error::SourceTooLarge { capacity: 255 })
        ));
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn no_files_is_a_usage_error() {
        let mut out: Vec<u8> = vec![];

        assert!(matches!(
            run(&Options::default(), &[], &[], &mut out),
            Err(C4Error::Usage(_))
        ));
    }
}
