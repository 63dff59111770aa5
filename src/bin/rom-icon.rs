//! Extracts an internal image of a ROM file and saves it as PNG.

extern crate env_logger;
extern crate png;
extern crate romprops;
extern crate structopt;

use romprops::crypto::KeyStore;
use romprops::{rom, DecodedImage, FileSource, ImageType, Options};
use structopt::StructOpt;

use std::error::Error;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, StructOpt)]
#[structopt(name = "rom-icon", about = "Extract an internal image of a ROM file as PNG.")]
struct Opts {
    /// Preferred language (two-letter code such as `en` or `ja`).
    #[structopt(long = "lang")]
    lang: Option<String>,
    /// Key file with `name = hex` lines. Defaults to `$ROMPROPS_KEYS`.
    #[structopt(long = "keys", parse(from_os_str), env = "ROMPROPS_KEYS")]
    keys: Option<PathBuf>,
    /// Image to extract: icon, banner, media or image.
    #[structopt(long = "kind", default_value = "icon", parse(try_from_str = parse_kind))]
    kind: ImageType,
    /// Where to write the PNG.
    #[structopt(short = "o", long = "output", parse(from_os_str))]
    output: PathBuf,
    /// Path to the file.
    #[structopt(parse(from_os_str))]
    input: PathBuf,
}

fn parse_kind(name: &str) -> Result<ImageType, String> {
    ImageType::from_name(name).ok_or_else(|| format!("unknown image kind `{}`", name))
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext))
}

fn write_png(path: &Path, image: &DecodedImage) -> Result<(), Box<dyn Error>> {
    let file = BufWriter::new(File::create(path)?);
    let mut encoder = png::Encoder::new(file, image.width(), image.height());
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&image.to_rgba8())?;
    Ok(())
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

    let image = reader.image(opts.kind)?;
    write_png(&opts.output, image)?;
    println!(
        "wrote {}x{} {} to {}",
        image.width(),
        image.height(),
        opts.kind.name(),
        opts.output.display()
    );
    Ok(())
}
