//! Dumps the fields and metadata of a ROM or executable to stdout.

extern crate env_logger;
extern crate romprops;
extern crate structopt;

use romprops::crypto::KeyStore;
use romprops::rom::{self, SystemName};
use romprops::{FileSource, Options};
use structopt::StructOpt;

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, StructOpt)]
#[structopt(name = "rom-dump", about = "Dump fields and metadata of a ROM file to stdout.")]
struct Opts {
    /// Preferred language for titles (two-letter code such as `en` or `ja`).
    #[structopt(long = "lang")]
    lang: Option<String>,
    /// Key file with `name = hex` lines. Defaults to `$ROMPROPS_KEYS`.
    #[structopt(long = "keys", parse(from_os_str), env = "ROMPROPS_KEYS")]
    keys: Option<PathBuf>,
    /// Path to the file.
    #[structopt(parse(from_os_str))]
    input: PathBuf,
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext))
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let opts = Opts::from_args();

    let mut options = Options::default();
    if let Some(lang) = opts.lang {
        options = options.with_language(lang);
    }
    if let Some(keys) = &opts.keys {
        options = options.with_keys(KeyStore::load(keys)?);
    }

    let source = Arc::new(FileSource::open(&opts.input)?);
    let ext = extension(&opts.input);
    let mut reader = rom::open(source, ext.as_deref(), &options)?;

    if let Some(name) = reader.system_name(SystemName::Long) {
        println!("System: {}", name);
    }
    println!("File type: {:?}", reader.file_type());
    println!();
    print!("{}", reader.fields()?);

    match reader.metadata() {
        Ok(metadata) if !metadata.is_empty() => {
            println!();
            print!("{}", metadata);
        }
        Ok(_) => {}
        Err(e) => eprintln!("metadata unavailable: {}", e),
    }
    Ok(())
}
