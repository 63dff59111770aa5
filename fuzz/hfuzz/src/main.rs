#[macro_use] extern crate honggfuzz;

use romprops::image::ImageType;
use romprops::{rom, MemSource, Options};
use std::sync::Arc;

fn main() {
    let options = Options::default();
    loop {
        fuzz!(|data: &[u8]| {
            let source = Arc::new(MemSource::new(data.to_vec()));
            for ext in &[None, Some(".cia")] {
                if let Ok(mut reader) = rom::open(source.clone(), *ext, &options) {
                    reader.fields().ok();
                    reader.metadata().ok();
                    for &kind in &ImageType::ALL {
                        reader.image(kind).ok();
                    }
                }
            }
        });
    }
}
