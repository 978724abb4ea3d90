use std::path::PathBuf;

const USAGE: &str = "Usage: lenscast [--config <path>] [--verbose] [--print-config]";

fn main() {
    let mut options = lenscast::RunOptions::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => match args.next() {
                Some(path) => options.config_path = Some(PathBuf::from(path)),
                None => {
                    eprintln!("--config needs a path\n{}", USAGE);
                    std::process::exit(2);
                }
            },
            "--verbose" | "-v" => options.verbose = true,
            "--print-config" => options.print_config = true,
            "--help" | "-h" => {
                println!("{}", USAGE);
                return;
            }
            other => {
                eprintln!("Unknown argument '{}'\n{}", other, USAGE);
                std::process::exit(2);
            }
        }
    }

    if let Err(e) = lenscast::run(options) {
        eprintln!("lenscast: {:#}", e);
        std::process::exit(1);
    }
}
