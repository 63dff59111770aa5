mod common;

use common::CountingSource;
use romprops::image::ImageType;
use romprops::metadata::{MetaValue, Property};
use romprops::rom::{self, FileType};
use romprops::sap::parse_tags;
use romprops::{Error, Options};

const FIXTURE: &[u8] = b"SAP\r\nAUTHOR \"Test Author\"\nNAME \"Song\"\nSONGS 3\nDEFSONG 1\n\xFF";

fn song() -> Vec<u8> {
    let mut data = b"SAP\r\n\
        AUTHOR \"Jane Doe\"\r\n\
        NAME \"Demo Tune\"\r\n\
        DATE \"24/12/1991\"\r\n\
        SONGS 2\r\n\
        NTSC\r\n\
        TYPE C\r\n\
        MUSIC 3000\r\n\
        PLAYER 0500\r\n\
        TIME 03:10.02\r\n\
        TIME 00:30 LOOP\r\n"
        .to_vec();
    data.extend_from_slice(&[0xFF, 0xFF, 0x00, 0x30, 0x03, 0x30, 0x60]);
    data
}

#[test]
fn fixture_header() {
    let tags = parse_tags(FIXTURE);
    assert!(tags.tags_read);
    assert_eq!(tags.author, "Test Author");
    assert_eq!(tags.name, "Song");
    assert_eq!(tags.songs, 3);
    assert_eq!(tags.def_song, 1);
}

#[test]
fn open_fixture() {
    let source = CountingSource::new(FIXTURE.to_vec());
    let mut reader = rom::open(source, Some(".sap"), &Options::default()).unwrap();
    assert_eq!(reader.file_type(), FileType::AudioFile);
    assert_eq!(reader.mime_types(), &["audio/x-sap"]);

    let fields = reader.fields().unwrap();
    assert_eq!(fields.tabs(), &["SAP".to_string()]);
    assert_eq!(fields.get_str("Author"), Some("Test Author"));
    assert_eq!(fields.get_str("# of Songs"), Some("3"));
    assert_eq!(fields.get_str("Default Song #"), Some("1"));
    assert_eq!(fields.get_str("Type"), Some("0x00"));
}

#[test]
fn fields_are_cached() {
    let source = CountingSource::new(song());
    let mut reader = rom::open(source.clone(), None, &Options::default()).unwrap();

    let first = reader.fields().unwrap().to_string();
    let reads = source.reads();
    let second = reader.fields().unwrap().to_string();
    assert_eq!(first, second);
    assert_eq!(source.reads(), reads);

    // metadata comes from the already parsed tags
    let metadata = reader.metadata().unwrap();
    assert_eq!(
        metadata.get(Property::Title),
        Some(&MetaValue::String("Demo Tune".to_string()))
    );
    assert_eq!(metadata.get(Property::ReleaseYear), Some(&MetaValue::Integer(1991)));
    assert_eq!(source.reads(), reads);
}

#[test]
fn music_player_fields() {
    let mut reader = rom::open(CountingSource::new(song()), None, &Options::default()).unwrap();
    let fields = reader.fields().unwrap();
    assert_eq!(fields.get_str("Fastplay"), Some("262"));
    assert_eq!(fields.get_str("Music Address"), Some("0x3000"));
    assert_eq!(fields.get_str("Player Address"), Some("0x0500"));
    assert!(fields.get("Init Address").is_none());
    assert!(fields.get("COVOX Address").is_none());

    let text = fields.to_string();
    assert!(text.contains("[x] NTSC"), "{}", text);
    assert!(text.contains("03:10.020"), "{}", text);
}

#[test]
fn images_are_not_found() {
    let mut reader = rom::open(CountingSource::new(song()), None, &Options::default()).unwrap();
    assert!(reader.supported_image_types().is_empty());
    for &kind in &ImageType::ALL {
        let err = reader.image(kind).unwrap_err();
        assert!(err.is_not_found(), "{:?}: {}", kind, err);
    }
}

#[test]
fn closed_reader() {
    let mut reader = rom::open(CountingSource::new(song()), None, &Options::default()).unwrap();
    reader.fields().unwrap();
    reader.close();
    reader.close();
    assert!(reader.fields().is_ok());
    match reader.metadata() {
        Err(Error::Closed) => {}
        other => panic!("expected Closed, got {:?}", other),
    }
}

#[test]
fn truncated_files_are_unsupported() {
    for len in 0..6 {
        let err = rom::open(CountingSource::new(FIXTURE[..len].to_vec()), None, &Options::default())
            .unwrap_err();
        assert_eq!(err.code(), Error::Unsupported.code(), "len {}", len);
    }
}
