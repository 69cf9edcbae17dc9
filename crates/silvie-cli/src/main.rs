//! `silvie`: asset extractor for Silver.
//!
//! Run: `silvie chr <chr_file> <pal_file> <prefix>`

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use silvie::ConvertRequest;
use tracing_subscriber::EnvFilter;

/// Supported formats with a one-line description each.
const FORMATS: &[(&str, &str)] = &[("chr", "3D model, saved as a glTF file and a PNG file")];

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some((format, rest)) = args.split_first() else {
        print_banner();
        return ExitCode::FAILURE;
    };

    println!(
        "Silvie v{}\nThis is free software; see the LICENSE file for copying conditions.\n",
        env!("CARGO_PKG_VERSION")
    );

    let result = match format.as_str() {
        "chr" => run_chr(rest),
        _ => {
            eprintln!("Unsupported format");
            return ExitCode::FAILURE;
        }
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn print_banner() {
    println!("This is Silvie, an asset extractor for Silver.");
    println!("The following formats are supported:\n");
    for (format, description) in FORMATS {
        println!("\t{format}\t{description}");
    }
    println!("\nFor usage information on a given format, type:\n");
    println!("\tsilvie format\n");
    println!("A prefix argument denotes the common part of the paths to the saved files.");
}

fn run_chr(args: &[String]) -> Result<(), String> {
    let [model, palette, prefix] = args else {
        return Err("Expected arguments:\n\n\tsilvie chr chr_file pal_file prefix".to_string());
    };
    let request = ConvertRequest {
        model: PathBuf::from(model),
        palette: PathBuf::from(palette),
        output_prefix: PathBuf::from(prefix),
    };

    tracing::debug!(?request, "converting CHR model");
    println!("Loading asset...");
    let loaded = silvie::load_chr(&request).map_err(|e| e.to_string())?;
    println!("Saving asset...");
    silvie::save_chr(&loaded, &request).map_err(|e| e.to_string())?;
    Ok(())
}
