use std::path::Path;

use dwarfsym::{CancelToken, Session};

fn main() {
    tracing_subscriber::fmt::init();
    let path = {
        let mut args: Vec<String> = std::env::args().collect();
        if args.len() != 2 {
            usage(args);
            std::process::exit(1);
        }
        args.swap_remove(1)
    };

    if let Err(err) = run(&path) {
        eprintln!("dwarfsym: {err}");
        std::process::exit(1);
    }
}

fn usage(args: Vec<String>) {
    println!("usage: {} FILENAME", args[0]);
}

fn run(path: &str) -> dwarfsym::Result<()> {
    let image = dwarfsym::elf::load_sections(Path::new(path))?;
    let base = image.image_base;
    let session = Session::parse(image.sections, &|a| a.wrapping_sub(base), &CancelToken::new());
    print!("{session}");
    for diagnostic in session.diagnostics() {
        println!("warning: {diagnostic}");
    }
    Ok(())
}
