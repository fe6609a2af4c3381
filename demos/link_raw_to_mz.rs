//! Links one or more flat raw-binary inputs into an MS-DOS MZ `.exe`,
//! exercising `LinkPipeline` end to end with the crate's one reference
//! `InputFormat`/`FormatDriver` pair.
//!
//! Usage: `link_raw_to_mz OUT.EXE IN1.BIN [IN2.BIN ...]`

use std::collections::HashMap;

use retrolinker::cpu::Cpu;
use retrolinker::diagnostics::LogDiagnostics;
use retrolinker::format_driver::InputFormat;
use retrolinker::formats::mz::MzDriver;
use retrolinker::formats::raw::RawInput;
use retrolinker::pipeline::LinkPipeline;

fn main() {
    stderrlog::new().verbosity(2).init().unwrap();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: link_raw_to_mz OUT.EXE IN1.BIN [IN2.BIN ...]");
        std::process::exit(1);
    }
    let output_path = &args[1];
    let inputs: Vec<Vec<u8>> = args[2..]
        .iter()
        .map(|path| std::fs::read(path).expect("read input file"))
        .collect();

    let diagnostics = LogDiagnostics;
    let pipeline = LinkPipeline::new(&diagnostics);
    let formats: Vec<Box<dyn InputFormat>> = vec![Box::new(RawInput::new(Cpu::I8086))];

    let mut module = pipeline
        .load_and_merge(&inputs, &formats)
        .expect("load and merge inputs");
    pipeline.allocate_commons(&mut module);

    let mut driver = MzDriver::new();
    let mut out = Vec::new();
    let written = pipeline
        .link(&mut module, &mut driver, None, HashMap::new(), &mut out)
        .expect("link module");

    std::fs::write(output_path, &out).expect("write output file");
    println!("wrote {written} bytes to {output_path}");
}
